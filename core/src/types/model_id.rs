use crate::error::{Result, RetinaError};
use crate::preprocessing::Recipe;
use crate::types::biomarker::{self, BiomarkerSpec};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Prefix of biomarker model identifiers (`biomarker_<name>`)
const BIOMARKER_PREFIX: &str = "biomarker_";

/// Inference framework an artifact was produced with
///
/// The framework fixes the tensor layout the network consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    /// Checkpoint-based networks consuming NCHW batches
    Torch,
    /// Layer-graph networks consuming NHWC batches
    Keras,
}

impl Framework {
    /// Returns the tensor layout this framework's graphs consume
    pub fn layout(&self) -> TensorLayout {
        match self {
            Framework::Torch => TensorLayout::Nchw,
            Framework::Keras => TensorLayout::Nhwc,
        }
    }

    /// Returns simple name for display
    pub fn simple_name(&self) -> &'static str {
        match self {
            Framework::Torch => "torch",
            Framework::Keras => "keras",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_name())
    }
}

/// Axis ordering of a 4-D image batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// batch, channel, height, width
    Nchw,
    /// batch, height, width, channel
    Nhwc,
}

impl TensorLayout {
    /// Index of the channel axis
    pub fn channel_axis(&self) -> usize {
        match self {
            TensorLayout::Nchw => 1,
            TensorLayout::Nhwc => 3,
        }
    }

    /// Returns the shape of a single-image batch in this layout
    pub fn batch_shape(&self, height: usize, width: usize, channels: usize) -> [usize; 4] {
        match self {
            TensorLayout::Nchw => [1, channels, height, width],
            TensorLayout::Nhwc => [1, height, width, channels],
        }
    }
}

/// Class of prediction task sharing one adapter implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    AmdOct,
    AmdFundus,
    GlaucomaFundus,
    DrFundus,
    DrOct,
    Biomarker,
}

impl ModelFamily {
    /// Short tag used in identifiers and audit records
    pub fn tag(&self) -> &'static str {
        match self {
            ModelFamily::AmdOct => "amd_oct",
            ModelFamily::AmdFundus => "amd_fundus",
            ModelFamily::GlaucomaFundus => "glaucoma",
            ModelFamily::DrFundus => "dr_fundus",
            ModelFamily::DrOct => "dr_oct",
            ModelFamily::Biomarker => "biomarker",
        }
    }

    /// Human-readable model name
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelFamily::AmdOct => "AMD OCT Classifier",
            ModelFamily::AmdFundus => "AMD Fundus Binary Classifier",
            ModelFamily::GlaucomaFundus => "Glaucoma Fundus Classifier",
            ModelFamily::DrFundus => "DR Fundus Classifier",
            ModelFamily::DrOct => "DR OCT Classifier",
            ModelFamily::Biomarker => "Biomarker Regressor",
        }
    }

    /// Framework the family's artifacts are produced with
    pub fn framework(&self) -> Framework {
        match self {
            ModelFamily::GlaucomaFundus | ModelFamily::DrOct => Framework::Keras,
            _ => Framework::Torch,
        }
    }

    /// Preprocessing recipe feeding this family
    pub fn recipe(&self) -> Recipe {
        match self {
            ModelFamily::AmdOct => Recipe::OctRgb224,
            ModelFamily::AmdFundus => Recipe::FundusAmd256,
            ModelFamily::GlaucomaFundus => Recipe::FundusRgb256Nhwc,
            ModelFamily::DrFundus => Recipe::FundusRgb224,
            ModelFamily::DrOct => Recipe::OctRgb224Nhwc,
            ModelFamily::Biomarker => Recipe::Biomarker540,
        }
    }

    /// Whether the family produces a scalar regression output
    pub fn is_regression(&self) -> bool {
        matches!(self, ModelFamily::Biomarker)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Stable key naming one loadable artifact
///
/// Parametrized families carry their instance discriminator; biomarker
/// names always come from the static biomarker table.
///
/// # Example
///
/// ```
/// use retinascope_core::ModelId;
///
/// let id: ModelId = "biomarker_HbA1C %".parse().unwrap();
/// assert_eq!(id.to_string(), "biomarker_HbA1C %");
/// assert_eq!("amd_oct".parse::<ModelId>().unwrap(), ModelId::AmdOct);
/// assert!("biomarker_Unobtainium".parse::<ModelId>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelId {
    AmdOct,
    AmdFundus,
    Glaucoma,
    DrFundus,
    DrOct,
    Biomarker(&'static str),
}

impl ModelId {
    /// Identifiers of every non-parametrized family
    pub const FIXED: [ModelId; 5] = [
        ModelId::AmdOct,
        ModelId::AmdFundus,
        ModelId::Glaucoma,
        ModelId::DrFundus,
        ModelId::DrOct,
    ];

    /// Creates a biomarker identifier, validating the name against the table
    ///
    /// # Errors
    ///
    /// Returns [`RetinaError::UnknownModel`] for names outside the biomarker table
    pub fn biomarker(name: &str) -> Result<Self> {
        biomarker::lookup(name)
            .map(|spec| ModelId::Biomarker(spec.name))
            .ok_or_else(|| {
                RetinaError::UnknownModel(format!(
                    "invalid biomarker name '{}'. Valid options: {}",
                    name,
                    biomarker::names().join(", ")
                ))
            })
    }

    /// Returns the model family of this identifier
    pub fn family(&self) -> ModelFamily {
        match self {
            ModelId::AmdOct => ModelFamily::AmdOct,
            ModelId::AmdFundus => ModelFamily::AmdFundus,
            ModelId::Glaucoma => ModelFamily::GlaucomaFundus,
            ModelId::DrFundus => ModelFamily::DrFundus,
            ModelId::DrOct => ModelFamily::DrOct,
            ModelId::Biomarker(_) => ModelFamily::Biomarker,
        }
    }

    /// Returns the biomarker configuration for biomarker identifiers
    pub fn biomarker_spec(&self) -> Option<&'static BiomarkerSpec> {
        match self {
            ModelId::Biomarker(name) => biomarker::lookup(name),
            _ => None,
        }
    }

    /// Display name recorded in audit logs
    pub fn model_name(&self) -> String {
        match self {
            ModelId::Biomarker(name) => format!("Biomarker Model - {}", name),
            other => other.family().display_name().to_string(),
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelId::Biomarker(name) => write!(f, "{}{}", BIOMARKER_PREFIX, name),
            other => write!(f, "{}", other.family().tag()),
        }
    }
}

impl FromStr for ModelId {
    type Err = RetinaError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix(BIOMARKER_PREFIX) {
            return ModelId::biomarker(name);
        }
        ModelId::FIXED
            .iter()
            .find(|id| id.family().tag() == s)
            .copied()
            .ok_or_else(|| RetinaError::UnknownModel(s.to_string()))
    }
}

impl Serialize for ModelId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
