//! Helpers for turning raw network outputs into probabilities

/// Tolerance on the sum of an already-normalized distribution
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-3;

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index of the largest value; ties resolve to the lowest index
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best, max), (i, &v)| {
            if v > max {
                (i, v)
            } else {
                (best, max)
            }
        })
        .0
}

/// True when values are already a probability distribution
pub fn is_distribution(values: &[f64]) -> bool {
    values.iter().all(|v| (0.0..=1.0).contains(v))
        && (values.iter().sum::<f64>() - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

/// Gap between the two largest values, or the largest when there is one
pub fn margin(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    match sorted.as_slice() {
        [first, second, ..] => first - second,
        [only] => *only,
        [] => 0.0,
    }
}

/// Confidence of a binary decision made on the positive-class probability
pub fn binary_confidence(predicted: usize, positive: f64) -> f64 {
    if predicted == 1 {
        positive
    } else {
        1.0 - positive
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
