use super::output::{argmax, binary_confidence, sigmoid, softmax};
use super::{load_network, ModelArtifactDescriptor};
use crate::arch::{Graph, ResNet, ResNetConfig, VisionTransformer, VitConfig};
use crate::checkpoint::{Checkpoint, LoadPolicy};
use crate::error::{Result, RetinaError};
use crate::types::{ClassificationResult, PredictionResult};
use candle_core::Device;
use log::info;

pub const OCT_CLASSES: [&str; 4] = ["Normal", "Early", "Intermediate", "Late"];
pub const FUNDUS_CLASSES: [&str; 2] = ["No AMD", "AMD Present"];

/// Positive-class threshold of the single-logit fundus head
const THRESHOLD: f64 = 0.5;

pub(super) fn build_oct(descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
    let ckpt = Checkpoint::open(&descriptor.path, device)?;
    let config = VitConfig::vit_b_16(OCT_CLASSES.len());
    let (net, _) = load_network(&ckpt, device, LoadPolicy::Strict, |vb| {
        VisionTransformer::new(&config, vb)
    })?;
    Ok(Graph::Vit(net))
}

pub(super) fn build_fundus(descriptor: &ModelArtifactDescriptor, device: &Device) -> Result<Graph> {
    let ckpt = Checkpoint::open(&descriptor.path, device)?;
    Ok(Graph::ResNet(fundus_network(&ckpt, ResNetConfig::resnet50(1), device)?))
}

/// Builds the fundus ResNet with a head as wide as the checkpoint's
fn fundus_network(ckpt: &Checkpoint, base: ResNetConfig, device: &Device) -> Result<ResNet> {
    let config = ResNetConfig {
        num_classes: ckpt.head_width("fc.weight"),
        ..base
    };
    info!("AMD fundus head width: {}", config.num_classes);
    let (net, report) = load_network(ckpt, device, LoadPolicy::StrictThenRelaxed, |vb| {
        ResNet::new(&config, vb)
    })?;
    if report.loaded == 0 {
        return Err(RetinaError::ArtifactError(
            "no checkpoint tensor matched the fundus network".to_string(),
        ));
    }
    Ok(net)
}

/// Top-probability decision over four severity grades
pub(super) fn decode_oct(output: &[f32]) -> Result<PredictionResult> {
    if output.len() != OCT_CLASSES.len() {
        return Err(RetinaError::UnsupportedShape(format!(
            "AMD OCT head produced {} values",
            output.len()
        )));
    }
    let logits: Vec<f64> = output.iter().map(|&v| v as f64).collect();
    let probs = softmax(&logits);
    let idx = argmax(&probs);
    Ok(PredictionResult::Classification(
        ClassificationResult::from_probabilities(&OCT_CLASSES, &probs, idx, probs[idx]),
    ))
}

/// Binary decision from a single sigmoid logit or a softmax head
///
/// Confidence is the probability of the predicted side for one or two
/// outputs and the positive-class probability otherwise.
pub(super) fn decode_fundus(output: &[f32]) -> Result<PredictionResult> {
    let logits: Vec<f64> = output.iter().map(|&v| v as f64).collect();
    let (idx, positive) = match logits.as_slice() {
        [] => {
            return Err(RetinaError::UnsupportedShape(
                "AMD fundus head produced no values".to_string(),
            ))
        }
        [logit] => {
            let p = sigmoid(*logit);
            (usize::from(p > THRESHOLD), p)
        }
        _ => {
            let probs = softmax(&logits);
            (argmax(&probs), probs[1])
        }
    };
    let confidence = if logits.len() <= 2 {
        binary_confidence(idx, positive)
    } else {
        positive
    };
    let mut result = ClassificationResult::from_probabilities(
        &FUNDUS_CLASSES,
        &[1.0 - positive, positive],
        idx,
        confidence,
    )
    .with_probability(positive);
    if idx >= FUNDUS_CLASSES.len() {
        result.prediction = idx.to_string();
    }
    Ok(PredictionResult::Classification(result))
}

pub(super) fn default_oct() -> PredictionResult {
    PredictionResult::Classification(ClassificationResult::from_probabilities(
        &OCT_CLASSES,
        &[0.85, 0.10, 0.03, 0.02],
        0,
        0.85,
    ))
}

pub(super) fn default_fundus() -> PredictionResult {
    PredictionResult::Classification(ClassificationResult::from_probabilities(
        &FUNDUS_CLASSES,
        &[0.92, 0.08],
        0,
        0.92,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Tensor};
    use candle_nn::{VarBuilder, VarMap};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn classification(result: PredictionResult) -> ClassificationResult {
        result.as_classification().unwrap().clone()
    }

    #[test]
    fn test_single_logit_uses_sigmoid_rule() {
        let result = classification(decode_fundus(&[2.0]).unwrap());
        let p = sigmoid(2.0);
        assert_eq!(result.prediction, "AMD Present");
        assert!((result.confidence - p).abs() < 1e-9);
        assert!((result.probability.unwrap() - p).abs() < 1e-9);

        let result = classification(decode_fundus(&[-1.0]).unwrap());
        assert_eq!(result.prediction, "No AMD");
        assert!((result.confidence - (1.0 - sigmoid(-1.0))).abs() < 1e-9);
        assert!((result.probability_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_logit_is_negative() {
        let result = classification(decode_fundus(&[0.0]).unwrap());
        assert_eq!(result.prediction, "No AMD");
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_two_logit_softmax() {
        let result = classification(decode_fundus(&[0.0, 1.0]).unwrap());
        let probs = softmax(&[0.0, 1.0]);
        assert_eq!(result.prediction, "AMD Present");
        assert!((result.confidence - probs[1]).abs() < 1e-9);
        assert!((result.class_probabilities["No AMD"] - probs[0]).abs() < 1e-9);
    }

    #[test]
    fn test_wide_head_label_falls_back_to_index() {
        let result = classification(decode_fundus(&[0.0, 0.0, 5.0]).unwrap());
        assert_eq!(result.prediction, "2");
    }

    #[test]
    fn test_oct_top_probability() {
        let result = classification(decode_oct(&[0.1, 3.0, 0.2, -1.0]).unwrap());
        assert_eq!(result.prediction, "Early");
        assert!((result.probability_sum() - 1.0).abs() < 1e-9);
        assert_eq!(result.confidence, result.class_probabilities["Early"]);
        assert!(decode_oct(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(default_oct().prediction_text(), "Normal");
        assert_eq!(default_oct().confidence(), 0.85);
        assert_eq!(default_fundus().prediction_text(), "No AMD");
        assert_eq!(default_fundus().confidence(), 0.92);
    }

    fn tiny_resnet() -> ResNetConfig {
        ResNetConfig {
            blocks: [1, 1, 1, 1],
            base_width: 4,
            num_classes: 1,
        }
    }

    /// Saves a freshly initialised tiny network with the given head width
    fn save_checkpoint(path: &std::path::Path, head: usize, extra: bool) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        ResNet::new(&ResNetConfig { num_classes: head, ..tiny_resnet() }, vb).unwrap();
        let mut tensors: HashMap<String, Tensor> = varmap
            .data()
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (format!("module.{}", k), v.as_tensor().clone()))
            .collect();
        if extra {
            tensors.insert(
                "module.aux_head.weight".to_string(),
                Tensor::zeros((2, 2), DType::F32, &Device::Cpu).unwrap(),
            );
        }
        candle_core::safetensors::save(&tensors, path).unwrap();
    }

    #[test]
    fn test_head_width_inferred_from_checkpoint() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fundus.safetensors");
        save_checkpoint(&path, 2, false);
        let ckpt = Checkpoint::open(&path, &Device::Cpu).unwrap();
        let net = fundus_network(&ckpt, tiny_resnet(), &Device::Cpu).unwrap();
        let xs = Tensor::zeros((1, 3, 32, 32), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(net.forward(&xs).unwrap().dims(), &[1, 2]);
    }

    #[test]
    fn test_relaxed_load_after_strict_failure() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("fundus.safetensors");
        save_checkpoint(&path, 1, true);
        let ckpt = Checkpoint::open(&path, &Device::Cpu).unwrap();
        let net = fundus_network(&ckpt, tiny_resnet(), &Device::Cpu).unwrap();
        let xs = Tensor::zeros((1, 3, 32, 32), DType::F32, &Device::Cpu).unwrap();
        assert_eq!(net.forward(&xs).unwrap().dims(), &[1, 1]);
    }
}
