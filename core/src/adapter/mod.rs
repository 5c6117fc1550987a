//! Model adapters
//!
//! A [`ModelAdapter`] owns one model family's graph and turns a
//! [`PreprocessedBatch`] into a [`PredictionResult`]. Loading never fails:
//! an artifact that is missing or malformed is replaced by a stand-in graph
//! and the adapter reports [`LoadStatus::LoadFailedFallback`]. Prediction
//! never fails either: an inference error yields the family's documented
//! default result.

mod amd;
mod biomarker;
mod channels;
mod descriptor;
mod dr;
mod glaucoma;
pub mod output;

pub use channels::reconcile;
pub use descriptor::{ModelArtifactDescriptor, BIOMARKER_FILE};

use crate::arch::{self, Graph, StandIn};
use crate::checkpoint::{self, Checkpoint, LoadPolicy, LoadReport};
use crate::error::{Result, RetinaError};
use crate::types::{BiomarkerSpec, ModelFamily, ModelId, PredictionResult, PreprocessedBatch};
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;

/// Lifecycle state of an adapter
///
/// `Loaded` and `LoadFailedFallback` are terminal; an adapter is loaded at
/// most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Unloaded,
    Loaded,
    LoadFailedFallback,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStatus::Unloaded => "unloaded",
            LoadStatus::Loaded => "loaded",
            LoadStatus::LoadFailedFallback => "fallback",
        };
        f.pad(name)
    }
}

/// Closed set of model families with their family-specific rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdapterKind {
    /// Four-grade OCT classifier, top-probability confidence
    AmdOct,
    /// Binary fundus classifier with a checkpoint-sized head
    AmdFundus,
    /// Two-class fundus layer graph
    Glaucoma,
    /// Three-grade fundus classifier, margin confidence
    DrFundus,
    /// Binary OCT layer graph
    DrOct,
    /// Scalar regressor for one biomarker
    Biomarker(&'static BiomarkerSpec),
}

impl AdapterKind {
    /// Returns the adapter kind serving `id`
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::UnknownModel`] for biomarker names outside the table
    pub fn for_model(id: ModelId) -> Result<Self> {
        Ok(match id {
            ModelId::AmdOct => AdapterKind::AmdOct,
            ModelId::AmdFundus => AdapterKind::AmdFundus,
            ModelId::Glaucoma => AdapterKind::Glaucoma,
            ModelId::DrFundus => AdapterKind::DrFundus,
            ModelId::DrOct => AdapterKind::DrOct,
            ModelId::Biomarker(name) => AdapterKind::Biomarker(
                id.biomarker_spec()
                    .ok_or_else(|| RetinaError::UnknownModel(name.to_string()))?,
            ),
        })
    }

    pub fn family(&self) -> ModelFamily {
        match self {
            AdapterKind::AmdOct => ModelFamily::AmdOct,
            AdapterKind::AmdFundus => ModelFamily::AmdFundus,
            AdapterKind::Glaucoma => ModelFamily::GlaucomaFundus,
            AdapterKind::DrFundus => ModelFamily::DrFundus,
            AdapterKind::DrOct => ModelFamily::DrOct,
            AdapterKind::Biomarker(_) => ModelFamily::Biomarker,
        }
    }

    fn build(&self, descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
        match self {
            AdapterKind::AmdOct => amd::build_oct(descriptor, device),
            AdapterKind::AmdFundus => amd::build_fundus(descriptor, device),
            AdapterKind::Glaucoma => glaucoma::build(descriptor, device),
            AdapterKind::DrFundus => dr::build_fundus(descriptor, device),
            AdapterKind::DrOct => dr::build_oct(descriptor, device),
            AdapterKind::Biomarker(_) => biomarker::build(descriptor, device),
        }
    }

    /// Neutral graph: zero logits for classifiers, the fallback value for regressors
    fn stand_in(&self, descriptor: &ModelArtifactDescriptor) -> Graph {
        let channels = descriptor.input_channels;
        let axis = descriptor.framework.layout().channel_axis();
        let standin = match self {
            AdapterKind::AmdOct => StandIn::zeros(channels, axis, amd::OCT_CLASSES.len()),
            AdapterKind::AmdFundus => StandIn::zeros(channels, axis, 1),
            AdapterKind::Glaucoma => StandIn::zeros(channels, axis, glaucoma::CLASSES.len()),
            AdapterKind::DrFundus => StandIn::zeros(channels, axis, dr::FUNDUS_CLASSES.len()),
            AdapterKind::DrOct => StandIn::zeros(channels, axis, dr::OCT_CLASSES.len()),
            AdapterKind::Biomarker(spec) => {
                StandIn::constant(channels, axis, 1, spec.fallback_value as f32)
            }
        };
        Graph::StandIn(standin)
    }

    fn decode(&self, output: &[f32]) -> Result<PredictionResult> {
        match self {
            AdapterKind::AmdOct => amd::decode_oct(output),
            AdapterKind::AmdFundus => amd::decode_fundus(output),
            AdapterKind::Glaucoma => glaucoma::decode(output),
            AdapterKind::DrFundus => dr::decode_fundus(output),
            AdapterKind::DrOct => dr::decode_oct(output),
            AdapterKind::Biomarker(spec) => biomarker::decode(spec, output),
        }
    }

    /// Result returned when inference fails
    pub fn default_result(&self) -> PredictionResult {
        match self {
            AdapterKind::AmdOct => amd::default_oct(),
            AdapterKind::AmdFundus => amd::default_fundus(),
            AdapterKind::Glaucoma => glaucoma::default_result(),
            AdapterKind::DrFundus => dr::default_fundus(),
            AdapterKind::DrOct => dr::default_oct(),
            AdapterKind::Biomarker(spec) => biomarker::default_result(spec),
        }
    }
}

/// Summary of an adapter for status reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterInfo {
    pub id: ModelId,
    pub family: ModelFamily,
    pub path: PathBuf,
    pub status: LoadStatus,
    pub graph: Option<&'static str>,
    pub device: String,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<40} {:<10} {:<20} {:<5} {}",
            self.id.to_string(),
            self.status,
            self.graph.unwrap_or("-"),
            self.device,
            self.path.display()
        )
    }
}

/// One model family bound to its artifact, device and graph
#[derive(Debug)]
pub struct ModelAdapter {
    kind: AdapterKind,
    descriptor: ModelArtifactDescriptor,
    device: Device,
    status: LoadStatus,
    graph: Option<Graph>,
}

impl ModelAdapter {
    /// Creates an unloaded adapter for `descriptor`
    pub fn new(descriptor: ModelArtifactDescriptor, device: Device) -> Result<Self> {
        Ok(Self {
            kind: AdapterKind::for_model(descriptor.id)?,
            descriptor,
            device,
            status: LoadStatus::Unloaded,
            graph: None,
        })
    }

    pub fn kind(&self) -> AdapterKind {
        self.kind
    }

    pub fn id(&self) -> ModelId {
        self.descriptor.id
    }

    pub fn descriptor(&self) -> &ModelArtifactDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn is_fallback(&self) -> bool {
        self.status == LoadStatus::LoadFailedFallback
    }

    pub fn info(&self) -> AdapterInfo {
        AdapterInfo {
            id: self.descriptor.id,
            family: self.kind.family(),
            path: self.descriptor.path.clone(),
            status: self.status,
            graph: self.graph.as_ref().map(Graph::kind),
            device: device_name(&self.device),
        }
    }

    /// Reads the artifact and builds the graph, substituting the stand-in on failure
    ///
    /// Calling `load` on an adapter that is already loaded (or fell back)
    /// does nothing.
    pub fn load(&mut self) -> LoadStatus {
        if self.status != LoadStatus::Unloaded {
            return self.status;
        }
        let id = self.descriptor.id;
        if !self.descriptor.exists() {
            warn!("Model file not found: {}", self.descriptor.path.display());
        }

        let started = Instant::now();
        match self.kind.build(&self.descriptor, &self.device) {
            Ok(graph) => {
                info!(
                    "{} loaded successfully from {} in {:.2?}",
                    id,
                    self.descriptor.path.display(),
                    started.elapsed()
                );
                self.graph = Some(graph);
                self.status = LoadStatus::Loaded;
            }
            Err(e) => {
                error!("Error loading {}: {}", id, e);
                warn!("Using stand-in model for {}", id);
                self.graph = Some(self.kind.stand_in(&self.descriptor));
                self.status = LoadStatus::LoadFailedFallback;
            }
        }
        self.status
    }

    /// Runs inference, returning the family default result on any failure
    pub fn predict(&self, batch: &PreprocessedBatch) -> PredictionResult {
        match self.try_predict(batch) {
            Ok(result) => result,
            Err(e) => {
                error!("Error during {} prediction: {}", self.descriptor.id, e);
                self.kind.default_result()
            }
        }
    }

    /// Runs inference, surfacing errors instead of substituting defaults
    pub fn try_predict(&self, batch: &PreprocessedBatch) -> Result<PredictionResult> {
        let graph = self.graph.as_ref().ok_or_else(|| {
            RetinaError::ArtifactError(format!("{} has not been loaded", self.descriptor.id))
        })?;
        let layout = self.descriptor.framework.layout();
        let input = reconcile(batch, graph.input_channels(), layout)?;
        let xs = arch::to_tensor(input.view(), &self.device)?;
        let output: Vec<f32> = graph.forward(&xs)?.to_dtype(DType::F32)?.flatten_all()?.to_vec1()?;
        debug!("{} raw output: {:?}", self.descriptor.id, output);
        self.kind.decode(&output)
    }
}

/// Builds a network on `device` and copies the checkpoint into it
pub(crate) fn load_network<N, F>(
    ckpt: &Checkpoint,
    device: &Device,
    policy: LoadPolicy,
    build: F,
) -> Result<(N, LoadReport)>
where
    F: FnOnce(VarBuilder) -> candle_core::Result<N>,
{
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let network = build(vb)?;
    let report = checkpoint::load_into(&varmap, ckpt.tensors(), policy)?;
    debug!("{}: {} via {}", ckpt.path().display(), report, ckpt.strategy());
    Ok((network, report))
}

/// Short name of a device for reports
pub fn device_name(device: &Device) -> String {
    match device {
        Device::Cpu => "cpu".to_string(),
        Device::Cuda(_) => "cuda".to_string(),
        Device::Metal(_) => "metal".to_string(),
    }
}
