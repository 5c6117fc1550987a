use thiserror::Error;

/// Result type for retinascope operations
pub type Result<T> = std::result::Result<T, RetinaError>;

/// Error types for retinascope operations
#[derive(Error, Debug)]
pub enum RetinaError {
    /// DICOM reading error
    #[error("DICOM error: {0}")]
    DicomError(String),

    /// Tag not found in DICOM file
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// Invalid tag value
    #[error("Invalid tag value: {0}")]
    InvalidValue(String),

    /// Image or pixel data could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Input of a kind the pipeline does not accept
    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    /// Tensor or pixel layout that cannot be reconciled
    #[error("Unsupported shape: {0}")]
    UnsupportedShape(String),

    /// Model identifier that does not name any known artifact
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Preprocessing recipe name outside the fixed set
    #[error("Unknown recipe: {0}")]
    UnknownRecipe(String),

    /// Missing or malformed model artifact
    #[error("Artifact error: {0}")]
    ArtifactError(String),

    /// Tensor computation failure
    #[error("Tensor error: {0}")]
    TensorError(String),

    /// Standard raster image error
    #[error("Image error: {0}")]
    ImageError(String),

    /// Caller-supplied deadline passed before the named stage
    #[error("Deadline exceeded before {stage}")]
    DeadlineExceeded { stage: &'static str },

    /// Upload rejected by validation
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Invalid service configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// Helper conversions
impl From<String> for RetinaError {
    fn from(s: String) -> Self {
        RetinaError::DecodeError(s)
    }
}

impl From<&str> for RetinaError {
    fn from(s: &str) -> Self {
        RetinaError::DecodeError(s.to_string())
    }
}

// Convert dicom-object errors
impl From<dicom_object::ReadError> for RetinaError {
    fn from(e: dicom_object::ReadError) -> Self {
        RetinaError::DicomError(format!("{}", e))
    }
}

impl From<dicom_core::value::ConvertValueError> for RetinaError {
    fn from(e: dicom_core::value::ConvertValueError) -> Self {
        RetinaError::InvalidValue(format!("{}", e))
    }
}

impl From<dicom_pixeldata::Error> for RetinaError {
    fn from(e: dicom_pixeldata::Error) -> Self {
        RetinaError::DecodeError(format!("{}", e))
    }
}

impl From<image::ImageError> for RetinaError {
    fn from(e: image::ImageError) -> Self {
        RetinaError::ImageError(format!("{}", e))
    }
}

impl From<candle_core::Error> for RetinaError {
    fn from(e: candle_core::Error) -> Self {
        RetinaError::TensorError(format!("{}", e))
    }
}

impl From<ndarray::ShapeError> for RetinaError {
    fn from(e: ndarray::ShapeError) -> Self {
        RetinaError::UnsupportedShape(format!("{}", e))
    }
}

impl From<serde_json::Error> for RetinaError {
    fn from(e: serde_json::Error) -> Self {
        RetinaError::ArtifactError(format!("{}", e))
    }
}

impl From<zip::result::ZipError> for RetinaError {
    fn from(e: zip::result::ZipError) -> Self {
        RetinaError::ArtifactError(format!("{}", e))
    }
}
