//! Property-based tests for the analysis engine.
//!
//! These verify structural invariants of the correlation matrix, the
//! capacity search, risk scoring, and what-if re-estimation across
//! randomized loss and demand series.

use std::collections::BTreeMap;

use fathom_engine::capacity::{estimate_link, simulate_lossy_slots};
use fathom_engine::config::{AnalysisConfig, RiskWeights};
use fathom_engine::correlation::{bucket_loss, build_matrix};
use fathom_engine::demand::LinkDemand;
use fathom_engine::risk::{overflow_share_pct, score_link};
use fathom_engine::stats::round_to;
use fathom_engine::whatif::Baseline;
use fathom_model::models::{
    CapacityResult, CellSeries, LinkCapacity, LinkTopology, RiskLevel, SLOT_DURATION_SEC,
};
use fathom_model::report::{WhatIfOutcome, WhatIfRequest};
use proptest::prelude::*;

// ─── Correlation Matrix ──────────────────────────────────────────────────────

/// Equal-length loss series for a small fleet, sampled every 50 ms on a
/// shared clock so every pair fully overlaps.
fn loss_fleet() -> impl Strategy<Value = Vec<Vec<f64>>> {
    (2usize..=5, 40usize..=120).prop_flat_map(|(n_cells, n_samples)| {
        prop::collection::vec(prop::collection::vec(0.0f64..=1.0, n_samples), n_cells)
    })
}

fn fleet_series(loss: &[Vec<f64>]) -> Vec<CellSeries> {
    loss.iter()
        .enumerate()
        .map(|(i, samples)| CellSeries {
            cell_id: (i + 1) as u32,
            time_sec: (0..samples.len()).map(|k| k as f64 * 0.05).collect(),
            loss_fraction: samples.clone(),
            demand_gbps: vec![0.0; samples.len()],
        })
        .collect()
}

proptest! {
    #[test]
    fn matrix_is_symmetric_with_unit_diagonal(loss in loss_fleet()) {
        let cells = fleet_series(&loss);
        let bucketed = bucket_loss(&cells, 0.2).unwrap();
        let matrix = build_matrix(&bucketed, 1.5).unwrap();

        let n = matrix.cells.len();
        prop_assert_eq!(n, loss.len());
        for i in 0..n {
            prop_assert!((matrix.matrix[i][i] - 1.0).abs() < 1e-12);
            for j in 0..n {
                prop_assert_eq!(matrix.matrix[i][j], matrix.matrix[j][i]);
                let r = matrix.matrix[i][j];
                prop_assert!((-1e-9..=1.0 + 1e-9).contains(&r), "r out of range: {}", r);
            }
        }
    }

    #[test]
    fn identical_series_correlate_perfectly(
        mut samples in prop::collection::vec(0.0f64..=1.0, 40..=120)
    ) {
        samples[0] = 0.0;
        samples[1] = 1.0;
        let cells = fleet_series(&[samples.clone(), samples]);
        let bucketed = bucket_loss(&cells, 0.2).unwrap();
        // bucket means must vary, or the coefficient is undefined
        let means = &bucketed.cells[&1];
        prop_assume!(means.iter().any(|&v| (v - means[0]).abs() > 1e-9));

        let matrix = build_matrix(&bucketed, 1.5).unwrap();
        prop_assert!(
            (matrix.matrix[0][1] - 1.0).abs() < 1e-9,
            "identical series should correlate at 1.0, got {}",
            matrix.matrix[0][1]
        );
    }

    #[test]
    fn bucket_grid_covers_every_cell(loss in loss_fleet()) {
        let cells = fleet_series(&loss);
        let bucketed = bucket_loss(&cells, 0.2).unwrap();

        let axis = bucketed.time_axis();
        prop_assert_eq!(axis.len(), bucketed.n_buckets);
        for w in axis.windows(2) {
            prop_assert!((w[1] - w[0] - 0.2).abs() < 1e-9);
        }
        for series in bucketed.cells.values() {
            prop_assert_eq!(series.len(), bucketed.n_buckets);
        }
    }
}

// ─── Capacity Search ─────────────────────────────────────────────────────────

/// Non-negative slot demand mixing idle slots, steady traffic, and
/// bursts. Traffic values stay above 0.1 Gbps so the idle floor
/// classifies slots identically under rescaling.
fn demand_series() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(
        prop_oneof![
            2 => Just(0.0f64),
            5 => 0.1f64..=10.0,
            1 => 10.0f64..=25.0,
        ],
        64..=400,
    )
}

fn one_cell_link(series: Vec<f64>) -> LinkDemand {
    let slot_ts = (0..series.len())
        .map(|i| (i as f64 + 0.5) * SLOT_DURATION_SEC)
        .collect();
    let mut per_cell = BTreeMap::new();
    per_cell.insert(1u32, series.clone());
    LinkDemand {
        link_id: 1,
        slot_ts,
        aggregate_gbps: series,
        per_cell_gbps: per_cell,
    }
}

proptest! {
    #[test]
    fn buffered_capacity_never_exceeds_bufferless(series in demand_series()) {
        let cap = estimate_link(&one_cell_link(series), &AnalysisConfig::default()).unwrap();
        prop_assert!(cap.no_buffer_gbps >= 0.0);
        prop_assert!(cap.with_buffer_gbps >= 0.0);
        prop_assert!(
            cap.with_buffer_gbps <= cap.no_buffer_gbps + 1e-12,
            "with-buffer {} above no-buffer {}",
            cap.with_buffer_gbps,
            cap.no_buffer_gbps
        );
        prop_assert!(cap.savings_pct <= 100);
    }

    #[test]
    fn more_capacity_never_sheds_more(
        series in demand_series(),
        low in 0.5f64..=10.0,
        extra in 0.1f64..=10.0,
    ) {
        // Raising capacity can only shrink the lossy-slot set: the
        // buffer bound grows with the service rate, so headroom at the
        // higher rate dominates headroom at the lower rate slot by slot.
        let at_low = simulate_lossy_slots(&series, low);
        let at_high = simulate_lossy_slots(&series, low + extra);
        for (slot, (&l, &h)) in at_low.iter().zip(&at_high).enumerate() {
            prop_assert!(
                !h || l,
                "slot {} sheds at {} Gbps but not at {} Gbps",
                slot,
                low + extra,
                low
            );
        }
    }

    #[test]
    fn overflow_share_is_a_percentage(
        series in demand_series(),
        capacity in 0.0f64..=30.0,
    ) {
        let pct = overflow_share_pct(&series, capacity);
        prop_assert!((0.0..=100.0).contains(&pct), "share: {}", pct);
    }

    #[test]
    fn risk_score_stays_on_the_scale(
        series in demand_series(),
        capacity in 0.1f64..=30.0,
        stress in 0.0f64..=100.0,
    ) {
        let risk = score_link(&series, capacity, stress, &RiskWeights::default());
        prop_assert!((0.0..=100.0).contains(&risk.score), "score: {}", risk.score);
        let band = match risk.level() {
            RiskLevel::High => "High:",
            RiskLevel::Medium => "Medium:",
            RiskLevel::Low => "Low:",
        };
        prop_assert!(
            risk.reason.starts_with(band),
            "reason {:?} does not match band {:?}",
            risk.reason,
            band
        );
    }
}

// ─── What-If Re-Estimation ───────────────────────────────────────────────────

/// Wrap one link's demand in a baseline the way the pipeline does,
/// returning the capacity the baseline was built against.
fn baseline_from(demand: LinkDemand, config: &AnalysisConfig) -> (Baseline, LinkCapacity) {
    let cap = estimate_link(&demand, config).unwrap();
    let mut members = BTreeMap::new();
    members.insert(demand.link_id, demand.per_cell_gbps.keys().copied().collect());
    let topology = LinkTopology {
        members,
        ..Default::default()
    };
    let mut capacity = CapacityResult::new();
    capacity.insert(demand.link_id, cap.clone());
    let mut demands = BTreeMap::new();
    demands.insert(demand.link_id, demand);
    (Baseline::new(topology, capacity, demands, config.clone()), cap)
}

fn two_cell_link(a: Vec<f64>, b: Vec<f64>) -> LinkDemand {
    let n = a.len().min(b.len());
    let mut per_cell = BTreeMap::new();
    per_cell.insert(1u32, a[..n].to_vec());
    per_cell.insert(2u32, b[..n].to_vec());
    // cell-major sum, matching how the pipeline builds the aggregate
    let mut aggregate = vec![0.0f64; n];
    for arr in per_cell.values() {
        for (acc, v) in aggregate.iter_mut().zip(arr) {
            *acc += v;
        }
    }
    let slot_ts = (0..n)
        .map(|i| (i as f64 + 0.5) * SLOT_DURATION_SEC)
        .collect();
    LinkDemand {
        link_id: 1,
        slot_ts,
        aggregate_gbps: aggregate,
        per_cell_gbps: per_cell,
    }
}

proptest! {
    #[test]
    fn identity_rescale_reproduces_the_baseline(
        a in demand_series(),
        b in demand_series(),
    ) {
        let config = AnalysisConfig::default();
        let (baseline, cap) = baseline_from(two_cell_link(a, b), &config);

        let mut request = WhatIfRequest::default();
        request.traffic_multipliers.insert("1".into(), 1.0);
        match baseline.what_if(&request) {
            WhatIfOutcome::Ready(report) => {
                prop_assert_eq!(
                    report.capacity_no_buf.get(&1).copied(),
                    Some(round_to(cap.no_buffer_gbps, 2))
                );
                prop_assert_eq!(
                    report.capacity_with_buf.get(&1).copied(),
                    Some(round_to(cap.with_buffer_gbps, 2))
                );
                prop_assert_eq!(
                    report.bandwidth_savings_pct.get(&1).copied(),
                    Some(cap.savings_pct)
                );
            }
            WhatIfOutcome::Unavailable { reason } => {
                prop_assert!(false, "per-cell baseline declined what-if: {}", reason);
            }
        }
    }

    #[test]
    fn uniform_rescale_scales_capacity_linearly(
        series in demand_series(),
        lambda in 0.5f64..=2.0,
    ) {
        let config = AnalysisConfig::default();
        let (baseline, cap) = baseline_from(one_cell_link(series), &config);

        let mut request = WhatIfRequest::default();
        request.traffic_multipliers.insert("1".into(), lambda);
        match baseline.what_if(&request) {
            WhatIfOutcome::Ready(report) => {
                let nb = report.capacity_no_buf[&1];
                let wb = report.capacity_with_buf[&1];
                prop_assert!(
                    (nb - lambda * cap.no_buffer_gbps).abs() < 0.02,
                    "no-buffer {} vs scaled baseline {}",
                    nb,
                    lambda * cap.no_buffer_gbps
                );
                prop_assert!(
                    (wb - lambda * cap.with_buffer_gbps).abs() < 0.02,
                    "with-buffer {} vs scaled baseline {}",
                    wb,
                    lambda * cap.with_buffer_gbps
                );
            }
            WhatIfOutcome::Unavailable { reason } => {
                prop_assert!(false, "per-cell baseline declined what-if: {}", reason);
            }
        }
    }

    #[test]
    fn arbitrary_multiplier_maps_never_break_the_estimate(
        series in demand_series(),
        multipliers in prop::collection::btree_map("[0-9a-z]{0,4}", any::<f64>(), 0..6),
    ) {
        let config = AnalysisConfig::default();
        let (baseline, _) = baseline_from(one_cell_link(series), &config);

        // Unparseable keys and non-finite or non-positive factors are
        // dropped; whatever survives must still yield ordered capacities.
        let request = WhatIfRequest {
            traffic_multipliers: multipliers,
        };
        match baseline.what_if(&request) {
            WhatIfOutcome::Ready(report) => {
                for (link_id, &wb) in &report.capacity_with_buf {
                    let nb = report.capacity_no_buf[link_id];
                    prop_assert!(
                        wb <= nb + 1e-9,
                        "link {}: with-buffer {} above no-buffer {}",
                        link_id,
                        wb,
                        nb
                    );
                }
            }
            WhatIfOutcome::Unavailable { reason } => {
                prop_assert!(false, "per-cell baseline declined what-if: {}", reason);
            }
        }
    }
}
