//! Small numeric helpers shared across the engine.

/// Mean / population σ / max summary of a series.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeriesStats {
    pub mean: f64,
    pub std_dev: f64,
    pub max: f64,
}

impl SeriesStats {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Self {
            mean,
            std_dev: var.sqrt(),
            max,
        }
    }

    /// Coefficient of variation. The epsilon keeps all-idle series at ~0
    /// instead of dividing by zero.
    pub fn cv(&self) -> f64 {
        self.std_dev / (self.mean + 1e-9)
    }
}

/// Percentile with linear interpolation between order statistics.
/// Empty input yields 0.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Round to `decimals` places (away from zero on ties, like `f64::round`).
pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

/// Sampling stride that keeps roughly `max_points` points of a series.
///
/// `len / max_points` floored, min 1 — the same stride the series' time
/// axis must use so samples stay aligned.
pub fn stride_for(len: usize, max_points: usize) -> usize {
    if max_points == 0 {
        return 1;
    }
    (len / max_points).max(1)
}

/// Stride-sample `values` down to roughly `max_points` points.
pub fn downsample(values: &[f64], max_points: usize) -> Vec<f64> {
    let step = stride_for(values.len(), max_points);
    values.iter().copied().step_by(step).collect()
}
