use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Output of a classification family
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Predicted class label
    pub prediction: String,
    /// Confidence in [0, 1]; its exact meaning depends on the family
    pub confidence: f64,
    /// Positive-class probability, reported by binary fundus models only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    /// Probability per class label
    pub class_probabilities: BTreeMap<String, f64>,
    /// Class labels in output-index order
    pub classes: Vec<String>,
}

impl ClassificationResult {
    /// Builds a result from class labels aligned positionally with probabilities
    pub fn from_probabilities(
        classes: &[&str],
        probabilities: &[f64],
        predicted: usize,
        confidence: f64,
    ) -> Self {
        let class_probabilities = classes
            .iter()
            .zip(probabilities)
            .map(|(name, p)| (name.to_string(), *p))
            .collect();
        Self {
            prediction: classes.get(predicted).copied().unwrap_or_default().to_string(),
            confidence,
            probability: None,
            class_probabilities,
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Attaches the positive-class probability
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = Some(probability);
        self
    }

    /// Sum of the per-class probabilities
    pub fn probability_sum(&self) -> f64 {
        self.class_probabilities.values().sum()
    }
}

/// Output of a biomarker regressor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BiomarkerResult {
    pub biomarker_name: String,
    /// Predicted value rounded to two decimals
    pub predicted_value: f64,
    pub unit: String,
    pub normal_range: String,
    pub confidence: f64,
}

/// Family-dependent prediction payload forwarded to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictionResult {
    Classification(ClassificationResult),
    Regression(BiomarkerResult),
}

impl PredictionResult {
    /// Prediction serialized as text for audit records
    pub fn prediction_text(&self) -> String {
        match self {
            PredictionResult::Classification(c) => c.prediction.clone(),
            PredictionResult::Regression(r) => format!("{:.2}", r.predicted_value),
        }
    }

    pub fn confidence(&self) -> f64 {
        match self {
            PredictionResult::Classification(c) => c.confidence,
            PredictionResult::Regression(r) => r.confidence,
        }
    }

    pub fn as_classification(&self) -> Option<&ClassificationResult> {
        match self {
            PredictionResult::Classification(c) => Some(c),
            PredictionResult::Regression(_) => None,
        }
    }

    pub fn as_regression(&self) -> Option<&BiomarkerResult> {
        match self {
            PredictionResult::Regression(r) => Some(r),
            PredictionResult::Classification(_) => None,
        }
    }
}

impl fmt::Display for PredictionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionResult::Classification(c) => {
                writeln!(f, "Prediction: {}", c.prediction)?;
                writeln!(f, "Confidence: {:.4}", c.confidence)?;
                if let Some(p) = c.probability {
                    writeln!(f, "Probability: {:.4}", p)?;
                }
                writeln!(f, "Class probabilities:")?;
                for class in &c.classes {
                    let p = c.class_probabilities.get(class).copied().unwrap_or(0.0);
                    writeln!(f, "  {:<22} {:.4}", class, p)?;
                }
                Ok(())
            }
            PredictionResult::Regression(r) => {
                writeln!(f, "Biomarker:    {}", r.biomarker_name)?;
                writeln!(f, "Value:        {:.2} {}", r.predicted_value, r.unit)?;
                writeln!(f, "Normal range: {}", r.normal_range)?;
                writeln!(f, "Confidence:   {:.2}", r.confidence)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_probabilities_aligns_labels() {
        let result = ClassificationResult::from_probabilities(&["a", "b", "c"], &[0.2, 0.5, 0.3], 1, 0.5);
        assert_eq!(result.prediction, "b");
        assert_eq!(result.class_probabilities["c"], 0.3);
        assert!((result.probability_sum() - 1.0).abs() < 1e-9);
        assert_eq!(result.classes, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_serialize_regression_shape() {
        let result = PredictionResult::Regression(BiomarkerResult {
            biomarker_name: "Age".into(),
            predicted_value: 45.2,
            unit: "years".into(),
            normal_range: "18-80".into(),
            confidence: 0.85,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["biomarker_name"], "Age");
        assert_eq!(json["predicted_value"], 45.2);
        assert_eq!(result.prediction_text(), "45.20");
    }

    #[test]
    fn test_probability_omitted_when_absent() {
        let result = PredictionResult::Classification(ClassificationResult::from_probabilities(
            &["x", "y"],
            &[0.4, 0.6],
            1,
            0.6,
        ));
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("probability").is_none());
        assert_eq!(json["prediction"], "y");
    }
}
