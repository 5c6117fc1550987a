//! Service configuration

use crate::error::{Result, RetinaError};
use candle_core::Device;
use serde::Serialize;
use std::path::PathBuf;

/// Environment variable overriding the models directory
pub const MODELS_DIR_ENV: &str = "RETINASCOPE_MODELS_DIR";

/// Environment variable overriding the inference device
pub const DEVICE_ENV: &str = "RETINASCOPE_DEVICE";

/// Configuration of the screening service
///
/// Built with [`Default`] and refined with the builder methods, or read
/// from the environment with [`ServiceConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceConfig {
    /// Root directory holding every model artifact
    pub models_dir: PathBuf,

    /// Inference device: `cpu`, `cuda` or `cuda:N`
    pub device: String,

    /// Smallest accepted upload in bytes
    pub min_upload_bytes: u64,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,

    /// Smallest accepted image side in pixels
    pub min_image_dim: u32,

    /// Largest accepted image side in pixels
    pub max_image_dim: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            device: "cpu".to_string(),
            min_upload_bytes: 1024,
            max_upload_bytes: 50 * 1024 * 1024,
            min_image_dim: 50,
            max_image_dim: 4096,
        }
    }
}

impl ServiceConfig {
    /// Defaults overridden by `RETINASCOPE_MODELS_DIR` and `RETINASCOPE_DEVICE`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = std::env::var(MODELS_DIR_ENV) {
            config.models_dir = PathBuf::from(dir);
        }
        if let Ok(device) = std::env::var(DEVICE_ENV) {
            config.device = device;
        }
        config
    }

    /// Builder: Set the models directory
    ///
    /// # Example
    ///
    /// ```
    /// use retinascope_core::ServiceConfig;
    ///
    /// let config = ServiceConfig::default().with_models_dir("/srv/models");
    /// assert_eq!(config.models_dir.to_str(), Some("/srv/models"));
    /// ```
    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    /// Builder: Set the inference device
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// Builder: Set the accepted upload size range in bytes
    ///
    /// # Example
    ///
    /// ```
    /// use retinascope_core::ServiceConfig;
    ///
    /// let config = ServiceConfig::default().with_upload_limits(1, 10);
    /// assert_eq!(config.max_upload_bytes, 10);
    /// ```
    pub fn with_upload_limits(mut self, min: u64, max: u64) -> Self {
        self.min_upload_bytes = min;
        self.max_upload_bytes = max;
        self
    }

    /// Builder: Set the accepted image side range in pixels
    pub fn with_image_dims(mut self, min: u32, max: u32) -> Self {
        self.min_image_dim = min;
        self.max_image_dim = max;
        self
    }

    /// Resolves the configured device
    pub fn resolve_device(&self) -> Result<Device> {
        parse_device(&self.device)
    }
}

/// Parses `cpu`, `cuda` or `cuda:N`
///
/// # Errors
///
/// Returns [`RetinaError::ConfigError`] for unknown names, and for CUDA
/// devices when the crate was built without the `cuda` feature.
pub fn parse_device(device: &str) -> Result<Device> {
    let device = device.trim().to_lowercase();
    match device.as_str() {
        "cpu" => Ok(Device::Cpu),
        "cuda" | "gpu" => cuda_device(0),
        s if s.starts_with("cuda:") => {
            let ordinal = s["cuda:".len()..].parse::<usize>().map_err(|_| {
                RetinaError::ConfigError(format!("Invalid CUDA device ordinal in '{}'", s))
            })?;
            cuda_device(ordinal)
        }
        other => Err(RetinaError::ConfigError(format!(
            "Unknown device: '{}'. Use 'cpu', 'cuda', or 'cuda:N'",
            other
        ))),
    }
}

#[cfg(feature = "cuda")]
fn cuda_device(ordinal: usize) -> Result<Device> {
    Device::new_cuda(ordinal).map_err(|e| {
        RetinaError::ConfigError(format!("Failed to create CUDA device {}: {}", ordinal, e))
    })
}

#[cfg(not(feature = "cuda"))]
fn cuda_device(_ordinal: usize) -> Result<Device> {
    Err(RetinaError::ConfigError(
        "CUDA support not enabled. Rebuild with --features cuda".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.max_upload_bytes, 52_428_800);
        assert_eq!((config.min_image_dim, config.max_image_dim), (50, 4096));
        assert!(config.resolve_device().unwrap().is_cpu());
    }

    #[rstest]
    #[case("cpu")]
    #[case(" CPU ")]
    fn test_cpu_device(#[case] name: &str) {
        assert!(parse_device(name).unwrap().is_cpu());
    }

    #[rstest]
    #[case("tpu")]
    #[case("cuda:x")]
    fn test_bad_devices(#[case] name: &str) {
        assert!(matches!(parse_device(name), Err(RetinaError::ConfigError(_))));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_requires_feature() {
        assert!(parse_device("cuda:0").is_err());
    }

    #[test]
    fn test_builder() {
        let config = ServiceConfig::default()
            .with_device("cuda:1")
            .with_image_dims(10, 20);
        assert_eq!(config.device, "cuda:1");
        assert_eq!(config.max_image_dim, 20);
    }
}
