pub mod report;

use crate::config::ServiceConfig;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Command-line arguments for retinascope
#[derive(Parser, Debug)]
#[command(name = "retinascope")]
#[command(about = "Retinal image screening: disease classifiers and systemic biomarker regressors")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Options shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Directory holding the model artifacts [env: RETINASCOPE_MODELS_DIR]
    #[arg(long, global = true, value_name = "DIR")]
    pub models_dir: Option<PathBuf>,

    /// Inference device: cpu, cuda or cuda:N [env: RETINASCOPE_DEVICE]
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Abort before decoding or preprocessing once this many milliseconds pass
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl GlobalArgs {
    /// Environment configuration overridden by the command-line flags
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::from_env();
        if let Some(dir) = &self.models_dir {
            config = config.with_models_dir(dir);
        }
        if let Some(device) = &self.device {
            config = config.with_device(device);
        }
        config
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one model on an image
    Predict {
        /// Model identifier, e.g. amd_oct or biomarker_BMI
        #[arg(value_name = "MODEL_ID")]
        model: String,

        /// PNG, JPEG or DICOM file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Run several biomarker regressors on one image
    Biomarkers {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Biomarker to predict; repeat for more. Defaults to all
        #[arg(short, long = "name", value_name = "NAME")]
        names: Vec<String>,
    },

    /// List the supported biomarkers
    ListBiomarkers,

    /// Print anonymized metadata of a DICOM file
    Metadata {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Render a DICOM file as PNG
    ExportPng {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[arg(value_name = "OUT")]
        out: PathBuf,
    },

    /// Load models and report their status
    Models {
        /// Model identifiers to load; defaults to every fixed model
        #[arg(long = "load", value_name = "MODEL_ID")]
        load: Vec<String>,
    },
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    Text,
    /// JSON format
    Json,
}

/// Initializes `env_logger`, honoring `RUST_LOG` on top of the default level
pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predict() {
        let cli = Cli::try_parse_from([
            "retinascope",
            "predict",
            "amd_oct",
            "scan.png",
            "--models-dir",
            "/srv/models",
            "--format",
            "json",
            "--timeout-ms",
            "500",
        ])
        .unwrap();
        match &cli.command {
            Command::Predict { model, file } => {
                assert_eq!(model, "amd_oct");
                assert_eq!(file, &PathBuf::from("scan.png"));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.global.format, OutputFormat::Json);
        assert_eq!(cli.global.timeout_ms, Some(500));
        assert_eq!(
            cli.global.service_config().models_dir,
            PathBuf::from("/srv/models")
        );
    }

    #[test]
    fn test_parse_biomarker_names() {
        let cli = Cli::try_parse_from([
            "retinascope",
            "biomarkers",
            "eye.jpg",
            "--name",
            "BMI",
            "-n",
            "HbA1C %",
        ])
        .unwrap();
        match cli.command {
            Command::Biomarkers { names, .. } => assert_eq!(names, vec!["BMI", "HbA1C %"]),
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.global.format, OutputFormat::Text);
    }

    #[test]
    fn test_parse_models_and_device() {
        let cli = Cli::try_parse_from([
            "retinascope",
            "models",
            "--load",
            "glaucoma",
            "--load",
            "dr_oct",
            "--device",
            "cpu",
        ])
        .unwrap();
        assert_eq!(cli.global.service_config().device, "cpu");
        match cli.command {
            Command::Models { load } => assert_eq!(load, vec!["glaucoma", "dr_oct"]),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_rejected() {
        assert!(Cli::try_parse_from(["retinascope", "predict", "amd_oct"]).is_err());
    }
}
