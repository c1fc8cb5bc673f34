//! Statistics kernel shared by the estimator and the quantile fitter.
//!
//! Times are integer seconds; all derived statistics are `f64`. The sample
//! standard deviation uses the n−1 divisor and is `NaN` when fewer than two
//! values are present, which downstream code uses to detect single-sample
//! stops.

/// Computes the arithmetic mean of a slice of times. Returns 0.0 for empty input.
pub fn mean(values: &[i32]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
}

/// Computes the sample standard deviation (n−1 divisor) given a pre-computed
/// mean. Returns `NaN` when fewer than two values are present.
pub fn sample_std_dev(values: &[i32], mean: f64) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let sum_sq = values
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>();

    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Counts values strictly below `threshold`, the "early" predicate used when
/// fitting the per-route σ-multiplier.
pub fn count_early(values: &[i32], threshold: f64) -> usize {
    values.iter().filter(|&&v| (v as f64) < threshold).count()
}
