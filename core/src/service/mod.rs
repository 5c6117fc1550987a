//! Request orchestration
//!
//! [`ScreeningService`] runs one upload through the whole pipeline:
//! validation, staging to a temporary file, decoding, preprocessing with the
//! family's recipe, and inference through the shared [`ModelRegistry`]. Every
//! call returns the prediction together with the audit records a
//! persistence layer would store.

mod audit;
mod deadline;
mod upload;
mod validation;

pub use audit::{AuditRecord, ClientInfo, DicomAuditRecord};
pub use deadline::Deadline;
pub use upload::{StagedUpload, Upload};
pub use validation::{
    allowed_file, content_type_for, sanitize_filename, validate_image_dimensions,
    validate_upload, ValidationReport, ALLOWED_EXTENSIONS, ALLOWED_MIME_TYPES,
};

use crate::config::ServiceConfig;
use crate::decoder::{self, DicomMetadata};
use crate::error::{Result, RetinaError};
use crate::preprocessing::{preprocess, Recipe};
use crate::registry::ModelRegistry;
use crate::types::{biomarker, CanonicalImage, ModelFamily, ModelId, PredictionResult};
use log::{error, info};
use serde::Serialize;
use std::time::Instant;

/// Result of a single-model request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceOutcome {
    pub prediction: PredictionResult,
    pub audit: AuditRecord,
    /// Raw metadata of DICOM uploads, for the audit store only
    #[serde(skip)]
    pub dicom: Option<DicomAuditRecord>,
}

/// Result of a multi-biomarker request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiomarkerOutcome {
    pub predictions: Vec<PredictionResult>,
    pub audit: Vec<AuditRecord>,
    pub processing_time_secs: f64,
    #[serde(skip)]
    pub dicom: Option<DicomAuditRecord>,
}

/// Result of a metadata request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataOutcome {
    /// Anonymized metadata, safe to return
    pub metadata: DicomMetadata,
    pub file_hash: String,
    #[serde(skip)]
    pub audit: DicomAuditRecord,
}

/// Decoded upload ready for preprocessing
struct Ingested {
    image: CanonicalImage,
    file_name: String,
    file_size: u64,
    dicom: Option<DicomAuditRecord>,
}

/// Thin dispatcher from uploads to model predictions
#[derive(Debug)]
pub struct ScreeningService {
    config: ServiceConfig,
    registry: ModelRegistry,
}

impl ScreeningService {
    /// Creates a service with its own registry
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let registry = ModelRegistry::from_config(&config)?;
        Ok(Self { config, registry })
    }

    pub fn with_registry(config: ServiceConfig, registry: ModelRegistry) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Runs one model on an upload
    ///
    /// # Errors
    ///
    /// Validation, decode and deadline failures are returned. Model
    /// failures are not: a broken artifact or inference error produces the
    /// family's default result.
    pub fn predict(
        &self,
        id: ModelId,
        upload: &Upload,
        client: &ClientInfo,
        deadline: Deadline,
    ) -> Result<InferenceOutcome> {
        let start = Instant::now();
        let ingested = self.ingest(upload, client, deadline)?;

        deadline.check("preprocessing")?;
        let batch = preprocess(&ingested.image, id.family().recipe());
        let model = self.registry.get(id)?;
        let prediction = model.predict(&batch);

        let audit = AuditRecord::new(
            id,
            &prediction,
            start.elapsed().as_secs_f64(),
            &ingested.file_name,
            ingested.file_size,
            client,
        );
        info!("Prediction: {}", audit);
        Ok(InferenceOutcome {
            prediction,
            audit,
            dicom: ingested.dicom,
        })
    }

    /// Parses `model` and runs it on an upload
    pub fn predict_named(
        &self,
        model: &str,
        upload: &Upload,
        client: &ClientInfo,
        deadline: Deadline,
    ) -> Result<InferenceOutcome> {
        self.predict(model.parse()?, upload, client, deadline)
    }

    /// Runs several biomarker regressors on one upload
    ///
    /// The image is preprocessed once. An empty `names` selects every
    /// biomarker. Unknown names are rejected before any work is done.
    pub fn predict_biomarkers(
        &self,
        names: &[String],
        upload: &Upload,
        client: &ClientInfo,
        deadline: Deadline,
    ) -> Result<BiomarkerOutcome> {
        let start = Instant::now();
        let ids = if names.is_empty() {
            biomarker::names()
                .into_iter()
                .map(ModelId::biomarker)
                .collect::<Result<Vec<_>>>()?
        } else {
            names
                .iter()
                .map(|name| ModelId::biomarker(name))
                .collect::<Result<Vec<_>>>()?
        };

        let ingested = self.ingest(upload, client, deadline)?;
        deadline.check("preprocessing")?;
        let batch = preprocess(&ingested.image, ModelFamily::Biomarker.recipe());

        let mut predictions = Vec::with_capacity(ids.len());
        let mut audit = Vec::with_capacity(ids.len());
        for id in ids {
            let model = match self.registry.get(id) {
                Ok(model) => model,
                Err(e) => {
                    error!("Error predicting {}: {}", id, e);
                    continue;
                }
            };
            let prediction = model.predict(&batch);
            let record = AuditRecord::new(
                id,
                &prediction,
                start.elapsed().as_secs_f64(),
                &ingested.file_name,
                ingested.file_size,
                client,
            );
            info!("Prediction: {}", record);
            predictions.push(prediction);
            audit.push(record);
        }

        Ok(BiomarkerOutcome {
            predictions,
            audit,
            processing_time_secs: start.elapsed().as_secs_f64(),
            dicom: ingested.dicom,
        })
    }

    /// Extracts anonymized metadata and the file hash of a DICOM upload
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::UnsupportedInput`] when the upload is not DICOM
    pub fn extract_metadata(&self, upload: &Upload, client: &ClientInfo) -> Result<MetadataOutcome> {
        validate_upload(&upload.file_name, &upload.content_type, upload.size(), &self.config)
            .into_result()?;
        let staged = StagedUpload::stage(upload)?;
        if !decoder::is_dicom(staged.path()) {
            return Err(RetinaError::UnsupportedInput(format!(
                "{} is not a DICOM file",
                upload.safe_name()
            )));
        }
        let obj = decoder::read_dicom_file(staged.path())?;
        let raw = DicomMetadata::extract(&obj);
        let file_hash = decoder::hash_file(staged.path())?;
        Ok(MetadataOutcome {
            metadata: raw.anonymize(),
            file_hash: file_hash.clone(),
            audit: DicomAuditRecord {
                metadata: raw,
                file_name: upload.safe_name(),
                file_size: upload.size(),
                file_hash,
                client: client.clone(),
            },
        })
    }

    /// Recipe applied before running `id`
    pub fn recipe_for(id: ModelId) -> Recipe {
        id.family().recipe()
    }

    fn ingest(&self, upload: &Upload, client: &ClientInfo, deadline: Deadline) -> Result<Ingested> {
        deadline.check("staging")?;
        let report =
            validate_upload(&upload.file_name, &upload.content_type, upload.size(), &self.config)
                .into_result()?;
        let file_size = report.size.unwrap_or_else(|| upload.size());
        let file_name = upload.safe_name();
        let staged = StagedUpload::stage(upload)?;

        deadline.check("decoding")?;
        if !decoder::is_dicom(staged.path()) {
            // Bounds come from the header alone, before the raster is decoded
            let (width, height) = decoder::image_dimensions(staged.path())?;
            validate_image_dimensions(width, height, &self.config).into_result()?;
        }
        let (image, metadata) = decoder::decode_with_metadata(staged.path())?;
        let dicom = match metadata {
            Some(metadata) => Some(DicomAuditRecord {
                metadata,
                file_name: file_name.clone(),
                file_size,
                file_hash: decoder::hash_file(staged.path())?,
                client: client.clone(),
            }),
            None => None,
        };
        Ok(Ingested {
            image,
            file_name,
            file_size,
            dicom,
        })
    }
}
