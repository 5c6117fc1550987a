//! Audit records handed to the persistence collaborator

use crate::decoder::DicomMetadata;
use crate::types::{ModelId, PredictionResult};
use serde::Serialize;
use std::fmt;

/// Request origin
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address,
            user_agent,
        }
    }

    /// Origin used for local command-line runs
    pub fn local() -> Self {
        Self::new(
            Some("127.0.0.1".to_string()),
            Some(format!("retinascope/{}", env!("CARGO_PKG_VERSION"))),
        )
    }
}

/// One inference, as recorded for audit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    pub model_type: String,
    pub model_name: String,
    pub prediction: String,
    pub confidence: f64,
    pub processing_time_secs: f64,
    pub file_name: String,
    pub file_size: u64,
    pub client: ClientInfo,
}

impl AuditRecord {
    pub fn new(
        id: ModelId,
        prediction: &PredictionResult,
        processing_time_secs: f64,
        file_name: &str,
        file_size: u64,
        client: &ClientInfo,
    ) -> Self {
        Self {
            model_type: id.to_string(),
            model_name: id.model_name(),
            prediction: prediction.prediction_text(),
            confidence: prediction.confidence(),
            processing_time_secs,
            file_name: file_name.to_string(),
            file_size,
            client: client.clone(),
        }
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:.3}) in {:.3}s [{} bytes, {}]",
            self.model_type,
            self.prediction,
            self.confidence,
            self.processing_time_secs,
            self.file_size,
            self.file_name
        )
    }
}

/// Raw DICOM metadata of an upload
///
/// Holds identifying attributes; never return it to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DicomAuditRecord {
    pub metadata: DicomMetadata,
    pub file_name: String,
    pub file_size: u64,
    pub file_hash: String,
    pub client: ClientInfo,
}
