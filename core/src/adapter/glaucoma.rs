use super::output::{argmax, is_distribution, softmax};
use super::ModelArtifactDescriptor;
use crate::arch::{Graph, LayerGraph};
use crate::error::{Result, RetinaError};
use crate::types::{ClassificationResult, PredictionResult};
use candle_core::Device;

pub const CLASSES: [&str; 2] = ["Glaucoma Suspected", "No Glaucoma"];

pub(super) fn build(descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
    Ok(Graph::Layers(LayerGraph::load(&descriptor.path, device)?))
}

/// Top-probability decision; raw scores are normalized only when they are
/// not already a distribution
pub(super) fn decode(output: &[f32]) -> Result<PredictionResult> {
    let values: Vec<f64> = output.iter().map(|&v| v as f64).collect();
    if values.is_empty() {
        return Err(RetinaError::UnsupportedShape(
            "glaucoma head produced no values".to_string(),
        ));
    }
    let probs = if is_distribution(&values) {
        values
    } else {
        softmax(&values)
    };
    let idx = argmax(&probs);
    if idx >= CLASSES.len() {
        return Err(RetinaError::UnsupportedShape(format!(
            "glaucoma head predicted class {} of {}",
            idx,
            CLASSES.len()
        )));
    }
    Ok(PredictionResult::Classification(
        ClassificationResult::from_probabilities(&CLASSES, &probs, idx, probs[idx]),
    ))
}

pub(super) fn default_result() -> PredictionResult {
    PredictionResult::Classification(ClassificationResult::from_probabilities(
        &CLASSES,
        &[0.12, 0.88],
        1,
        0.88,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(result: PredictionResult) -> ClassificationResult {
        result.as_classification().unwrap().clone()
    }

    #[test]
    fn test_distribution_kept_as_is() {
        let result = classification(decode(&[0.25, 0.75]).unwrap());
        assert_eq!(result.prediction, "No Glaucoma");
        assert_eq!(result.confidence, 0.75);
        assert_eq!(result.class_probabilities["Glaucoma Suspected"], 0.25);
    }

    #[test]
    fn test_logits_softmaxed() {
        let result = classification(decode(&[3.0, -1.0]).unwrap());
        assert_eq!(result.prediction, "Glaucoma Suspected");
        assert!((result.probability_sum() - 1.0).abs() < 1e-9);
        assert!(result.confidence > 0.9);
    }

    #[test]
    fn test_neutral_output() {
        let result = classification(decode(&[0.0, 0.0]).unwrap());
        assert_eq!(result.prediction, "Glaucoma Suspected");
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_default_result() {
        let result = classification(default_result());
        assert_eq!(result.prediction, "No Glaucoma");
        assert_eq!(result.class_probabilities["No Glaucoma"], 0.88);
    }
}
