//! Core type definitions shared across the pipeline
//!
//! - [`ModelId`] / [`ModelFamily`]: logical model identifiers and the families they belong to
//! - [`Framework`] / [`TensorLayout`]: artifact framework and the batch layout it consumes
//! - [`BiomarkerSpec`]: static per-biomarker configuration
//! - [`CanonicalImage`]: decoded pixel grid produced by the decoder
//! - [`PreprocessedBatch`]: model-ready tensor produced by a recipe
//! - [`PredictionResult`]: classification or regression output
//! - [`PixelSpacing`] / [`ImageType`]: decomposed DICOM attributes

pub mod biomarker;
mod batch;
mod image;
mod image_type;
mod model_id;
mod pixel_spacing;
mod prediction;

pub use batch::PreprocessedBatch;
pub use biomarker::{BiomarkerSpec, BIOMARKERS};
pub use image::{CanonicalImage, SourceFormat};
pub use image_type::ImageType;
pub use model_id::{Framework, ModelFamily, ModelId, TensorLayout};
pub use pixel_spacing::PixelSpacing;
pub use prediction::{BiomarkerResult, ClassificationResult, PredictionResult};
