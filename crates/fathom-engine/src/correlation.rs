//! # Loss Correlation
//!
//! Cells that share a fronthaul link drop packets together when that link
//! congests. This module turns per-cell loss series into a pairwise
//! correlation matrix that survives clock misalignment between cells:
//!
//! - loss is averaged into coarse buckets (default 200 ms) on one grid
//!   spanning the union of all cells' observations,
//! - each pair is correlated at several relative shifts up to the
//!   configured misalignment bound, keeping the best coefficient,
//! - negative and undefined correlations floor at 0 — anti-correlated
//!   loss is no evidence of a shared link.

use std::collections::BTreeMap;

use fathom_model::models::{CellId, CellSeries, CorrelationMatrix};
use tracing::debug;

use crate::error::EngineError;

/// Fewer buckets than this cannot support a meaningful correlation.
const MIN_CORR_BUCKETS: usize = 10;

// ─── Bucketing ──────────────────────────────────────────────────────────────

/// Per-cell loss fractions on a shared bucket grid.
#[derive(Debug, Clone)]
pub struct BucketedLoss {
    /// Timestamp of the first bucket's start.
    pub t_base: f64,
    pub bucket_sec: f64,
    pub n_buckets: usize,
    /// Mean loss fraction per bucket, zero where a cell has no samples.
    pub cells: BTreeMap<CellId, Vec<f64>>,
    /// First and last bucket index that received samples, per cell.
    coverage: BTreeMap<CellId, (usize, usize)>,
}

impl BucketedLoss {
    /// Bucket start times, for plotting loss over time.
    pub fn time_axis(&self) -> Vec<f64> {
        (0..self.n_buckets)
            .map(|i| self.t_base + i as f64 * self.bucket_sec)
            .collect()
    }

    /// Buckets where both cells have observations, inclusive of endpoints.
    fn overlap_buckets(&self, a: CellId, b: CellId) -> usize {
        match (self.coverage.get(&a), self.coverage.get(&b)) {
            (Some(&(fa, la)), Some(&(fb, lb))) => {
                let first = fa.max(fb);
                let last = la.min(lb);
                if last >= first {
                    last - first + 1
                } else {
                    0
                }
            }
            _ => 0,
        }
    }
}

/// Average each cell's loss fraction into buckets on one shared grid.
pub fn bucket_loss(cells: &[CellSeries], bucket_sec: f64) -> Result<BucketedLoss, EngineError> {
    if cells.is_empty() {
        return Err(EngineError::Data("no cells to bucket".into()));
    }
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    for series in cells {
        let (first, last) = series.span().ok_or_else(|| {
            EngineError::Data(format!("cell {} has no loss samples", series.cell_id))
        })?;
        t_min = t_min.min(first);
        t_max = t_max.max(last);
    }

    let n_buckets = ((t_max - t_min) / bucket_sec) as usize + 1;
    let mut bucketed = BTreeMap::new();
    let mut coverage = BTreeMap::new();

    for series in cells {
        let mut sums = vec![0.0f64; n_buckets];
        let mut counts = vec![0u32; n_buckets];
        for (&t, &loss) in series.time_sec.iter().zip(&series.loss_fraction) {
            let idx = ((t - t_min) / bucket_sec) as usize;
            if idx < n_buckets {
                sums[idx] += loss;
                counts[idx] += 1;
            }
        }
        let mut first_seen = None;
        let mut last_seen = 0;
        let values: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .enumerate()
            .map(|(idx, (&sum, &count))| {
                if count > 0 {
                    first_seen.get_or_insert(idx);
                    last_seen = idx;
                    sum / count as f64
                } else {
                    0.0
                }
            })
            .collect();
        if let Some(first) = first_seen {
            coverage.insert(series.cell_id, (first, last_seen));
        }
        bucketed.insert(series.cell_id, values);
    }

    debug!(
        n_cells = cells.len(),
        n_buckets, bucket_sec, "bucketed loss series"
    );

    Ok(BucketedLoss {
        t_base: t_min,
        bucket_sec,
        n_buckets,
        cells: bucketed,
        coverage,
    })
}

// ─── Correlation ────────────────────────────────────────────────────────────

/// Pearson correlation of two equal-length series; 0 when either side
/// has no variance.
pub fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 0.0;
    }
    let nf = n as f64;
    let mean_a = a[..n].iter().sum::<f64>() / nf;
    let mean_b = b[..n].iter().sum::<f64>() / nf;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = (var_a * var_b).sqrt();
    if denom == 0.0 {
        return 0.0;
    }
    cov / denom
}

/// Best Pearson correlation of `b` against `a` over sampled relative
/// shifts in `-max_shift..=max_shift` buckets, floored at 0.
fn max_shifted_correlation(a: &[f64], b: &[f64], max_shift: usize) -> f64 {
    let len = a.len().min(b.len());
    if len < MIN_CORR_BUCKETS {
        return 0.0;
    }

    // Sample shifts to keep the pair scan cheap; always test the extremes.
    let step = (max_shift / 8).max(1);
    let max = max_shift as isize;
    let mut shifts: Vec<isize> = (-max..=max).step_by(step).collect();
    if shifts.last() != Some(&max) {
        shifts.push(max);
    }

    let mut best = -1.0f64;
    for shift in shifts {
        let offset = shift.unsigned_abs();
        if offset >= len {
            continue;
        }
        let (a_sub, b_sub) = if shift >= 0 {
            (&a[..len - offset], &b[offset..len])
        } else {
            (&a[offset..len], &b[..len - offset])
        };
        if a_sub.len() < MIN_CORR_BUCKETS {
            continue;
        }
        let r = pearson(a_sub, b_sub);
        if r.is_finite() && r > best {
            best = r;
        }
    }
    best.max(0.0)
}

/// Build the symmetric cell-to-cell correlation matrix.
///
/// Fails with a `Data` error when any pair of cells shares fewer than two
/// buckets of observations — there is nothing to correlate.
pub fn build_matrix(
    bucketed: &BucketedLoss,
    max_shift_sec: f64,
) -> Result<CorrelationMatrix, EngineError> {
    let cells: Vec<CellId> = bucketed.cells.keys().copied().collect();
    let n = cells.len();
    let max_shift = (max_shift_sec / bucketed.bucket_sec) as usize;

    let mut matrix = vec![vec![0.0f64; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let overlap = bucketed.overlap_buckets(cells[i], cells[j]);
            if overlap < 2 {
                return Err(EngineError::Data(format!(
                    "cells {} and {} share only {} bucket(s) of telemetry",
                    cells[i], cells[j], overlap
                )));
            }
            let r = max_shifted_correlation(
                &bucketed.cells[&cells[i]],
                &bucketed.cells[&cells[j]],
                max_shift,
            );
            matrix[i][j] = r;
            matrix[j][i] = r;
        }
    }

    Ok(CorrelationMatrix { cells, matrix })
}
