use crate::adapter::AdapterInfo;
use crate::service::{BiomarkerOutcome, InferenceOutcome, MetadataOutcome};
use crate::types::BiomarkerSpec;
use std::collections::BTreeMap;
use std::fmt;

/// Text report formatter for a single prediction
pub struct TextReport<'a> {
    outcome: &'a InferenceOutcome,
}

impl<'a> TextReport<'a> {
    /// Creates a new text report
    pub fn new(outcome: &'a InferenceOutcome) -> Self {
        Self { outcome }
    }
}

impl<'a> fmt::Display for TextReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let audit = &self.outcome.audit;
        writeln!(f, "{}", audit.model_name)?;
        writeln!(f, "{}", "=".repeat(audit.model_name.len()))?;
        writeln!(f)?;
        write!(f, "{}", self.outcome.prediction)?;
        writeln!(f)?;
        writeln!(f, "File:            {} ({} bytes)", audit.file_name, audit.file_size)?;
        writeln!(f, "Processing time: {:.3}s", audit.processing_time_secs)?;
        if let Some(dicom) = &self.outcome.dicom {
            writeln!(f, "DICOM modality:  {}", dicom.metadata.modality)?;
        }
        Ok(())
    }
}

/// Text report for a multi-biomarker run
pub struct BiomarkerReport<'a> {
    outcome: &'a BiomarkerOutcome,
}

impl<'a> BiomarkerReport<'a> {
    pub fn new(outcome: &'a BiomarkerOutcome) -> Self {
        Self { outcome }
    }
}

impl<'a> fmt::Display for BiomarkerReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Biomarker Predictions")?;
        writeln!(f, "=====================")?;
        writeln!(f)?;
        for prediction in &self.outcome.predictions {
            if let Some(r) = prediction.as_regression() {
                writeln!(
                    f,
                    "{:<30} {:>10.2} {:<10} (normal {})",
                    r.biomarker_name, r.predicted_value, r.unit, r.normal_range
                )?;
            }
        }
        writeln!(f)?;
        writeln!(
            f,
            "{} biomarkers in {:.3}s",
            self.outcome.predictions.len(),
            self.outcome.processing_time_secs
        )
    }
}

/// Text report for anonymized DICOM metadata
pub struct MetadataReport<'a> {
    outcome: &'a MetadataOutcome,
}

impl<'a> MetadataReport<'a> {
    pub fn new(outcome: &'a MetadataOutcome) -> Self {
        Self { outcome }
    }
}

impl<'a> fmt::Display for MetadataReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DICOM Metadata")?;
        writeln!(f, "==============")?;
        writeln!(f)?;
        writeln!(f, "{}", self.outcome.metadata)?;
        writeln!(f, "SHA-256:           {}", self.outcome.file_hash)
    }
}

/// Table of supported biomarkers
pub struct BiomarkerListReport<'a> {
    specs: &'a [BiomarkerSpec],
}

impl<'a> BiomarkerListReport<'a> {
    pub fn new(specs: &'a [BiomarkerSpec]) -> Self {
        Self { specs }
    }
}

impl<'a> fmt::Display for BiomarkerListReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for spec in self.specs {
            writeln!(f, "{:<30} {:<10} {}", spec.name, spec.unit, spec.normal_range)?;
        }
        write!(f, "{} biomarkers", self.specs.len())
    }
}

/// Status table of loaded models
pub struct ModelsReport<'a> {
    models: &'a BTreeMap<String, AdapterInfo>,
}

impl<'a> ModelsReport<'a> {
    pub fn new(models: &'a BTreeMap<String, AdapterInfo>) -> Self {
        Self { models }
    }
}

impl<'a> fmt::Display for ModelsReport<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.models.is_empty() {
            return write!(f, "No models loaded");
        }
        for info in self.models.values() {
            writeln!(f, "{}", info)?;
        }
        Ok(())
    }
}
