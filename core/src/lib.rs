pub mod adapter;
pub mod arch;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod error;
pub mod preprocessing;
pub mod registry;
pub mod service;
pub mod types;

pub use adapter::{AdapterInfo, LoadStatus, ModelAdapter, ModelArtifactDescriptor};
pub use cli::report::TextReport;
pub use config::ServiceConfig;
pub use error::{Result, RetinaError};
pub use preprocessing::{preprocess, Recipe};
pub use registry::ModelRegistry;
pub use service::{ClientInfo, Deadline, InferenceOutcome, ScreeningService, Upload};
pub use types::*;
