//! Cross-validation of the analysis against an independent predictor.
//!
//! The clustering and the capacity search stay the source of truth;
//! this module answers "would a second, unrelated estimator broadly
//! agree". [`CrossCheck`] is the seam for plugging in a learned
//! model; [`HeuristicCrossCheck`] ships a closed-form one.

use std::collections::BTreeMap;

use fathom_model::models::{CapacityResult, CorrelationMatrix, LinkId, LinkTopology};
use serde::{Deserialize, Serialize};

use crate::demand::LinkDemand;
use crate::stats::SeriesStats;

/// One-sided 99% quantile of the standard normal.
const NORMAL_Q99: f64 = 2.326;

/// Links need at least this many slots to be worth predicting.
const MIN_PREDICTION_SLOTS: usize = 10;

/// Agreement between clustering and a pairwise same-link predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyCheck {
    pub agreement_pct: f64,
    pub n_pairs: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Error of an independent capacity predictor against the search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityCheck {
    pub mae_gbps: f64,
    pub mape_pct: f64,
    pub n_links: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub topology: TopologyCheck,
    pub capacity: CapacityCheck,
}

/// An independent estimator the analysis can be checked against.
pub trait CrossCheck {
    fn check_topology(&self, matrix: &CorrelationMatrix, topology: &LinkTopology)
        -> TopologyCheck;
    fn check_capacity(
        &self,
        demand: &BTreeMap<LinkId, LinkDemand>,
        capacity: &CapacityResult,
    ) -> CapacityCheck;
}

/// Closed-form cross-checker.
///
/// Topology: a pair is predicted same-link when its correlation
/// reaches the mean of both cells' strongest affinities. Capacity:
/// a Gaussian p99 surrogate, mean + 2.326 sigma of aggregate demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCrossCheck;

impl HeuristicCrossCheck {
    fn strongest_affinity(matrix: &CorrelationMatrix, i: usize) -> f64 {
        (0..matrix.n_cells())
            .filter(|&j| j != i)
            .map(|j| matrix.matrix[i][j])
            .fold(0.0f64, f64::max)
    }
}

impl CrossCheck for HeuristicCrossCheck {
    fn check_topology(
        &self,
        matrix: &CorrelationMatrix,
        topology: &LinkTopology,
    ) -> TopologyCheck {
        let n = matrix.n_cells();
        let mut n_pairs = 0usize;
        let mut agree = 0usize;
        let mut same_seen = false;
        let mut different_seen = false;

        for i in 0..n {
            for j in (i + 1)..n {
                let actual_same =
                    topology.link_of(matrix.cells[i]) == topology.link_of(matrix.cells[j]);
                if actual_same {
                    same_seen = true;
                } else {
                    different_seen = true;
                }

                let bar = 0.5
                    * (Self::strongest_affinity(matrix, i)
                        + Self::strongest_affinity(matrix, j));
                let predicted_same = matrix.matrix[i][j] >= bar;

                n_pairs += 1;
                if predicted_same == actual_same {
                    agree += 1;
                }
            }
        }

        if n_pairs == 0 || !(same_seen && different_seen) {
            return TopologyCheck {
                agreement_pct: 100.0,
                n_pairs,
                note: Some("insufficient label diversity".to_string()),
            };
        }
        TopologyCheck {
            agreement_pct: 100.0 * agree as f64 / n_pairs as f64,
            n_pairs,
            note: None,
        }
    }

    fn check_capacity(
        &self,
        demand: &BTreeMap<LinkId, LinkDemand>,
        capacity: &CapacityResult,
    ) -> CapacityCheck {
        let mut abs_errors = Vec::new();
        let mut rel_errors = Vec::new();
        for (link_id, link_demand) in demand {
            if link_demand.n_slots() < MIN_PREDICTION_SLOTS {
                continue;
            }
            let Some(estimate) = capacity.get(link_id) else {
                continue;
            };
            if estimate.with_buffer_gbps <= 0.0 {
                continue;
            }
            let stats = SeriesStats::from_values(&link_demand.aggregate_gbps);
            let predicted = stats.mean + NORMAL_Q99 * stats.std_dev;
            let error = (predicted - estimate.with_buffer_gbps).abs();
            abs_errors.push(error);
            rel_errors.push(error / (estimate.with_buffer_gbps + 1e-9));
        }

        let n_links = abs_errors.len();
        if n_links == 0 {
            return CapacityCheck {
                mae_gbps: 0.0,
                mape_pct: 0.0,
                n_links: 0,
                note: Some("insufficient demand evidence".to_string()),
            };
        }
        CapacityCheck {
            mae_gbps: abs_errors.iter().sum::<f64>() / n_links as f64,
            mape_pct: 100.0 * rel_errors.iter().sum::<f64>() / n_links as f64,
            n_links,
            note: None,
        }
    }
}
