use super::output::{argmax, margin, softmax};
use super::{load_network, ModelArtifactDescriptor};
use crate::arch::{Graph, LayerGraph, ResNet, ResNetConfig};
use crate::checkpoint::{Checkpoint, LoadPolicy};
use crate::error::{Result, RetinaError};
use crate::types::{ClassificationResult, PredictionResult};
use candle_core::Device;

pub const FUNDUS_CLASSES: [&str; 3] = ["No DR", "Early pathology", "Advanced pathology"];

/// A single output is the probability of "No DR"
pub const OCT_CLASSES: [&str; 2] = ["DR Signs", "No DR"];

pub(super) fn build_fundus(descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
    let ckpt = Checkpoint::open(&descriptor.path, device)?;
    let config = ResNetConfig::resnet50(FUNDUS_CLASSES.len());
    let (net, _) = load_network(&ckpt, device, LoadPolicy::Strict, |vb| ResNet::new(&config, vb))?;
    Ok(Graph::ResNet(net))
}

pub(super) fn build_oct(descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
    Ok(Graph::Layers(LayerGraph::load(&descriptor.path, device)?))
}

/// Softmax over three grades with margin confidence (top minus runner-up)
pub(super) fn decode_fundus(output: &[f32]) -> Result<PredictionResult> {
    if output.len() != FUNDUS_CLASSES.len() {
        return Err(RetinaError::UnsupportedShape(format!(
            "DR fundus head produced {} values",
            output.len()
        )));
    }
    let logits: Vec<f64> = output.iter().map(|&v| v as f64).collect();
    let probs = softmax(&logits);
    let idx = argmax(&probs);
    Ok(PredictionResult::Classification(
        ClassificationResult::from_probabilities(&FUNDUS_CLASSES, &probs, idx, margin(&probs)),
    ))
}

/// Maps a scalar probability or a two-way head onto `[DR Signs, No DR]`
pub(super) fn decode_oct(output: &[f32]) -> Result<PredictionResult> {
    let probs = match output {
        [p] => {
            let p = *p as f64;
            vec![1.0 - p, p]
        }
        [a, b] => softmax(&[*a as f64, *b as f64]),
        other => {
            return Err(RetinaError::UnsupportedShape(format!(
                "unexpected DR OCT output of {} values",
                other.len()
            )))
        }
    };
    let idx = argmax(&probs);
    Ok(PredictionResult::Classification(
        ClassificationResult::from_probabilities(&OCT_CLASSES, &probs, idx, probs[idx]),
    ))
}

pub(super) fn default_fundus() -> PredictionResult {
    PredictionResult::Classification(ClassificationResult::from_probabilities(
        &FUNDUS_CLASSES,
        &[1.0, 0.0, 0.0],
        0,
        0.0,
    ))
}

pub(super) fn default_oct() -> PredictionResult {
    PredictionResult::Classification(ClassificationResult::from_probabilities(
        &OCT_CLASSES,
        &[0.5, 0.5],
        1,
        0.5,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(result: PredictionResult) -> ClassificationResult {
        result.as_classification().unwrap().clone()
    }

    #[test]
    fn test_fundus_margin_confidence() {
        let result = classification(decode_fundus(&[2.0, 1.0, -3.0]).unwrap());
        let probs = softmax(&[2.0, 1.0, -3.0]);
        assert_eq!(result.prediction, "No DR");
        assert!((result.confidence - (probs[0] - probs[1])).abs() < 1e-9);
        assert!((result.probability_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fundus_uniform_output_has_zero_margin() {
        let result = classification(decode_fundus(&[0.0, 0.0, 0.0]).unwrap());
        assert_eq!(result.prediction, "No DR");
        assert!(result.confidence.abs() < 1e-12);
    }

    #[test]
    fn test_oct_scalar_is_probability_of_no_dr() {
        let result = classification(decode_oct(&[0.8]).unwrap());
        assert_eq!(result.prediction, "No DR");
        assert!((result.confidence - 0.8).abs() < 1e-6);
        assert!((result.class_probabilities["DR Signs"] - 0.2).abs() < 1e-6);

        let result = classification(decode_oct(&[0.1]).unwrap());
        assert_eq!(result.prediction, "DR Signs");
    }

    #[test]
    fn test_oct_pair_softmaxed() {
        let result = classification(decode_oct(&[0.0, 2.0]).unwrap());
        assert_eq!(result.prediction, "No DR");
        assert!((result.probability_sum() - 1.0).abs() < 1e-9);
        assert!(decode_oct(&[0.1, 0.2, 0.7]).is_err());
        assert!(decode_oct(&[]).is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_fundus().prediction_text(), "No DR");
        assert_eq!(default_fundus().confidence(), 0.0);
        assert_eq!(default_oct().prediction_text(), "No DR");
    }
}
