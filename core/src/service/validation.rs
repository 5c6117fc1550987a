//! Upload validation and filename sanitization

use crate::config::ServiceConfig;
use crate::error::{Result, RetinaError};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Accepted file extensions, lowercase
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "dcm", "dicom"];

/// Accepted declared content types
pub const ALLOWED_MIME_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "application/dicom",
    "application/dicom+json",
    "application/x-dicom",
    "application/octet-stream",
];

const MAX_STEM_LEN: usize = 100;

/// Outcome of a validation check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<(u32, u32)>,
}

impl ValidationReport {
    fn pass(message: &str) -> Self {
        Self {
            valid: true,
            message: message.to_string(),
            size: None,
            dimensions: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            size: None,
            dimensions: None,
        }
    }

    /// Converts a failed report into [`RetinaError::Validation`]
    pub fn into_result(self) -> Result<Self> {
        if self.valid {
            Ok(self)
        } else {
            Err(RetinaError::Validation(self.message))
        }
    }
}

/// Lowercased extension after the last dot, if any
pub fn extension(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Whether the file name carries an accepted extension
pub fn allowed_file(file_name: &str) -> bool {
    extension(file_name).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Content type implied by a file name's extension
pub fn content_type_for(file_name: &str) -> &'static str {
    match extension(file_name).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("dcm") | Some("dicom") => "application/dicom",
        _ => "application/octet-stream",
    }
}

/// Checks name, declared content type and size of an upload
pub fn validate_upload(
    file_name: &str,
    content_type: &str,
    size: u64,
    config: &ServiceConfig,
) -> ValidationReport {
    if file_name.is_empty() {
        return ValidationReport::fail("No file provided");
    }
    if !allowed_file(file_name) {
        return ValidationReport::fail(format!(
            "File type not allowed. Supported types: {}",
            ALLOWED_EXTENSIONS.join(", ")
        ));
    }
    if !ALLOWED_MIME_TYPES.contains(&content_type) {
        return ValidationReport::fail(format!(
            "Invalid file type. Content-Type: {}",
            content_type
        ));
    }
    if size > config.max_upload_bytes {
        return ValidationReport::fail(format!(
            "File too large. Maximum size: {}MB",
            config.max_upload_bytes / (1024 * 1024)
        ));
    }
    if size < config.min_upload_bytes {
        return ValidationReport::fail(format!(
            "File too small. Minimum size: {} bytes",
            config.min_upload_bytes
        ));
    }
    ValidationReport {
        size: Some(size),
        ..ValidationReport::pass("File validation passed")
    }
}

/// Checks decoded raster dimensions against the configured bounds
pub fn validate_image_dimensions(width: u32, height: u32, config: &ServiceConfig) -> ValidationReport {
    let (min, max) = (config.min_image_dim, config.max_image_dim);
    if width < min || height < min {
        return ValidationReport::fail(format!(
            "Image too small. Minimum dimensions: {}x{} pixels",
            min, min
        ));
    }
    if width > max || height > max {
        return ValidationReport::fail(format!(
            "Image too large. Maximum dimensions: {}x{} pixels",
            max, max
        ));
    }
    ValidationReport {
        dimensions: Some((width, height)),
        ..ValidationReport::pass("Image validation passed")
    }
}

/// Makes a client-supplied file name safe for logs and temp paths
///
/// Non-ASCII characters are dropped, anything outside `[a-zA-Z0-9._-]`
/// becomes `_`, and the stem is cut to 100 characters.
///
/// # Example
///
/// ```
/// use retinascope_core::service::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../scan 01.dcm"), ".._scan_01.dcm");
/// ```
pub fn sanitize_filename(file_name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let unsafe_chars =
        UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("Failed to compile regex"));

    let ascii: String = file_name.chars().filter(char::is_ascii).collect();
    let cleaned = unsafe_chars.replace_all(&ascii, "_");
    let (stem, ext) = match cleaned.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (&*cleaned, None),
    };
    let stem: String = stem.chars().take(MAX_STEM_LEN).collect();
    match ext {
        Some(ext) if !ext.is_empty() => format!("{}.{}", stem, ext),
        _ => stem,
    }
}
