use serde::{Deserialize, Serialize};

/// Running mean and variance (Welford).
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    diff_2_sum: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: Option<f64>,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;

        let diff_a = val - self.mean;
        self.mean += diff_a / self.n_vals as f64;

        let diff_b = val - self.mean;
        self.diff_2_sum += diff_a * diff_b;
    }

    /// Mean is 0 with no values; the standard deviation needs at least two.
    pub fn report(&self) -> AccumulatorReport {
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: self.mean,
            std_dev: (self.n_vals > 1)
                .then(|| (self.diff_2_sum / (self.n_vals as f64 - 1.0)).sqrt()),
        }
    }
}

/// Arithmetic mean, `None` for an empty series.
pub fn compute_mean(series: &[f64]) -> Option<f64> {
    if series.is_empty() {
        return None;
    }
    Some(series.iter().sum::<f64>() / series.len() as f64)
}

/// The last `n` entries of `series` (all of it if shorter).
pub fn tail<T>(series: &[T], n: usize) -> &[T] {
    &series[series.len().saturating_sub(n)..]
}

/// Number of ticks covering `days`, never fewer than two.
pub fn window_steps(days: f64, dt: f64) -> usize {
    ((days / dt).round() as usize).max(2)
}

/// Exponential growth rate `ln(last / first) / span`.
///
/// Callers guarantee `first > 0` and `span > 0`; a zero `last` yields negative
/// infinity, which downstream clamping maps to the lower bound.
pub fn growth_exponent(first: f64, last: f64, span: f64) -> f64 {
    (last / first).ln() / span
}

/// Trailing moving average over `window` samples.
///
/// The window is clipped to the series length. The first `window - 1` entries,
/// which have no full window behind them, are passed through unchanged so the
/// output has the input's length.
pub fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    if series.is_empty() {
        return Vec::new();
    }
    let window = window.clamp(1, series.len());

    let mut smoothed = Vec::with_capacity(series.len());
    smoothed.extend_from_slice(&series[..window - 1]);

    let mut sum: f64 = series[..window].iter().sum();
    smoothed.push(sum / window as f64);
    for idx in window..series.len() {
        sum += series[idx] - series[idx - window];
        smoothed.push(sum / window as f64);
    }
    smoothed
}
