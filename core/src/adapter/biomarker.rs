use super::output::round2;
use super::{load_network, ModelArtifactDescriptor};
use crate::arch::{Graph, MobileNetV3Regressor};
use crate::checkpoint::{Checkpoint, LoadPolicy};
use crate::error::{Result, RetinaError};
use crate::types::{BiomarkerResult, BiomarkerSpec, PredictionResult};
use candle_core::Device;

/// Confidence reported with every biomarker estimate
pub const CONFIDENCE: f64 = 0.85;

pub(super) fn build(descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
    let ckpt = Checkpoint::open(&descriptor.path, device)?;
    let (net, _) = load_network(&ckpt, device, LoadPolicy::Strict, MobileNetV3Regressor::new)?;
    Ok(Graph::MobileNet(net))
}

/// Scales the single regression output and rounds it to two decimals
pub(super) fn decode(spec: &BiomarkerSpec, output: &[f32]) -> Result<PredictionResult> {
    let raw = match output {
        [value] => *value as f64,
        other => {
            return Err(RetinaError::UnsupportedShape(format!(
                "{} regressor produced {} values",
                spec.name,
                other.len()
            )))
        }
    };
    Ok(result(spec, round2(raw * spec.scale_factor)))
}

pub(super) fn default_result(spec: &BiomarkerSpec) -> PredictionResult {
    result(spec, spec.fallback_value)
}

fn result(spec: &BiomarkerSpec, value: f64) -> PredictionResult {
    PredictionResult::Regression(BiomarkerResult {
        biomarker_name: spec.name.to_string(),
        predicted_value: value,
        unit: spec.unit.to_string(),
        normal_range: spec.normal_range.to_string(),
        confidence: CONFIDENCE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::biomarker;

    #[test]
    fn test_value_rounded_and_scaled() {
        let spec = BiomarkerSpec {
            scale_factor: 2.0,
            ..*biomarker::lookup("Glucose").unwrap()
        };
        let result = decode(&spec, &[2.3456]).unwrap();
        let regression = result.as_regression().unwrap();
        assert_eq!(regression.predicted_value, 4.69);
        assert_eq!(regression.unit, "mmol/L");
        assert_eq!(regression.confidence, CONFIDENCE);
    }

    #[test]
    fn test_wrong_output_width_rejected() {
        let spec = biomarker::lookup("Age").unwrap();
        assert!(decode(spec, &[1.0, 2.0]).is_err());
        assert!(decode(spec, &[]).is_err());
    }

    #[test]
    fn test_default_uses_fallback_value() {
        let spec = biomarker::lookup("HbA1C %").unwrap();
        let result = default_result(spec);
        let regression = result.as_regression().unwrap();
        assert_eq!(regression.predicted_value, 5.2);
        assert_eq!(regression.normal_range, "<5.7");
    }
}
