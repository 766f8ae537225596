//! # Analysis Pipeline
//!
//! One batch run over a fleet's telemetry: bucket losses, correlate,
//! cluster cells onto links, then fan per-link capacity, attribution,
//! risk, and recommendation work out to worker threads. Per-link
//! failures drop that link from the result maps and keep the rest.
//!
//! The run yields a display-ready [`AnalysisReport`] plus a
//! [`Baseline`] that later what-if questions are answered against.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;

use crossbeam_channel::bounded;
use fathom_model::models::{
    CapacityResult, CellSeries, CongestionEvent, CongestionFingerprint, Contributor,
    CorrelationMatrix, LinkCapacity, LinkId, RiskScore,
};
use fathom_model::report::{AnalysisReport, LossTrace, TrafficTrace};
use tracing::{debug, info, warn};

use crate::attribution::{classify_fingerprint, find_events};
use crate::capacity::estimate_link;
use crate::config::AnalysisConfig;
use crate::correlation::{bucket_loss, build_matrix};
use crate::demand::{aggregate_link_demand, LinkDemand};
use crate::error::EngineError;
use crate::recommend::recommend_link;
use crate::risk::{overflow_share_pct, score_link};
use crate::stats::{round_to, stride_for};
use crate::topology::cluster;
use crate::validate::{CrossCheck, ValidationReport};
use crate::whatif::Baseline;

/// Sparkline points kept per link in the report.
const TRAFFIC_SUMMARY_POINTS: usize = 100;

/// Bucketed-loss points kept per link in the report.
const LOSS_TRACE_POINTS: usize = 150;

/// Everything one pipeline run produces.
#[derive(Debug)]
pub struct Analysis {
    /// Display-ready document, values rounded and downsampled.
    pub report: AnalysisReport,
    /// Full-precision correlation matrix.
    pub matrix: CorrelationMatrix,
    /// Cached state for what-if questions.
    pub baseline: Baseline,
}

impl Analysis {
    /// Run an independent estimator over this analysis.
    pub fn cross_check(&self, checker: &dyn CrossCheck) -> ValidationReport {
        let empty = BTreeMap::new();
        let demand = self.baseline.per_cell_demand().unwrap_or(&empty);
        ValidationReport {
            topology: checker.check_topology(&self.matrix, self.baseline.topology()),
            capacity: checker.check_capacity(demand, self.baseline.capacity()),
        }
    }
}

/// Per-link results computed by one worker.
struct LinkAnalysis {
    capacity: LinkCapacity,
    risk: RiskScore,
    fingerprint: CongestionFingerprint,
    events: Vec<CongestionEvent>,
    actions: Vec<String>,
}

pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Run the full analysis over one fleet's telemetry.
    pub fn run(&self, cells: &[CellSeries]) -> Result<Analysis, EngineError> {
        validate_cells(cells)?;
        info!(n_cells = cells.len(), "starting analysis run");

        let bucketed = bucket_loss(cells, self.config.bucket_sec)?;
        let matrix = build_matrix(&bucketed, self.config.max_shift_sec)?;
        let topology = cluster(&matrix, &self.config.anchors, self.config.outlier_threshold)?;
        debug!(
            links = topology.members.len(),
            outliers = topology.outliers.len(),
            "topology inferred"
        );

        let demands = aggregate_link_demand(&topology, cells, self.config.window_sec);

        // Links are disjoint, so capacity, attribution, and risk run in
        // parallel, one worker per link. A failed link is dropped from
        // the result maps; the rest of the run survives.
        let mut outputs: BTreeMap<LinkId, LinkAnalysis> = BTreeMap::new();
        let (tx, rx) = bounded(demands.len());
        thread::scope(|scope| {
            for (&link_id, demand) in &demands {
                let tx = tx.clone();
                let config = &self.config;
                let n_cells = topology.members.get(&link_id).map_or(0, Vec::len);
                scope.spawn(move || {
                    let _ = tx.send((link_id, analyze_link(demand, n_cells, config)));
                });
            }
            drop(tx);
            for (link_id, result) in rx.iter() {
                match result {
                    Ok(output) => {
                        outputs.insert(link_id, output);
                    }
                    Err(error) => warn!(link_id, %error, "dropping link from analysis"),
                }
            }
        });

        let mut report = AnalysisReport::new();
        report.topology = topology.members.clone();
        report.topology_confidence = topology.confidence.clone();
        report.outliers = topology.outliers.clone();
        report.correlation_matrix = Some(matrix.rounded(4));

        let mut capacity = CapacityResult::new();
        for (&link_id, output) in &outputs {
            let estimate = &output.capacity;
            report
                .capacity_no_buf
                .insert(link_id, round_to(estimate.no_buffer_gbps, 2));
            report
                .capacity_with_buf
                .insert(link_id, round_to(estimate.with_buffer_gbps, 2));
            report
                .bandwidth_savings_pct
                .insert(link_id, estimate.savings_pct);
            if estimate.approximate {
                report.approximate_capacity.push(link_id);
            }
            report.risk_scores.insert(link_id, output.risk.clone());
            report
                .recommendations
                .insert(link_id, output.actions.clone());
            report
                .congestion_fingerprint
                .insert(link_id, output.fingerprint.to_string());
            report.root_cause_attribution.insert(
                link_id,
                display_events(&output.events, self.config.max_events_per_link),
            );
            capacity.insert(link_id, estimate.clone());
        }

        for (&link_id, demand) in &demands {
            if demand.is_empty() {
                continue;
            }
            let step = stride_for(demand.n_slots(), TRAFFIC_SUMMARY_POINTS);
            report.traffic_summary.insert(
                link_id,
                TrafficTrace {
                    time_sec: demand
                        .slot_ts
                        .iter()
                        .step_by(step)
                        .map(|&t| round_to(t, 2))
                        .collect(),
                    demand_gbps: demand
                        .aggregate_gbps
                        .iter()
                        .step_by(step)
                        .map(|&d| round_to(d, 2))
                        .collect(),
                },
            );
        }

        let bucket_axis = bucketed.time_axis();
        let step = stride_for(bucket_axis.len(), LOSS_TRACE_POINTS);
        let stepped_axis: Vec<f64> = bucket_axis
            .iter()
            .step_by(step)
            .map(|&t| round_to(t, 2))
            .collect();
        for (&link_id, members) in &topology.members {
            let mut traces = BTreeMap::new();
            for cell_id in members {
                if let Some(series) = bucketed.cells.get(cell_id) {
                    traces.insert(
                        *cell_id,
                        series.iter().step_by(step).map(|&v| round_to(v, 3)).collect(),
                    );
                }
            }
            report.loss_correlation_over_time.insert(
                link_id,
                LossTrace {
                    time_sec: stepped_axis.clone(),
                    cells: traces,
                },
            );
        }

        info!(
            links = capacity.len(),
            outliers = report.outliers.len(),
            "analysis run complete"
        );
        let baseline = Baseline::new(topology, capacity, demands, self.config.clone());
        Ok(Analysis {
            report,
            matrix,
            baseline,
        })
    }
}

fn analyze_link(
    demand: &LinkDemand,
    n_cells: usize,
    config: &AnalysisConfig,
) -> Result<LinkAnalysis, EngineError> {
    let capacity = estimate_link(demand, config)?;
    let stress_pct = overflow_share_pct(&demand.aggregate_gbps, capacity.with_buffer_gbps);
    let risk = score_link(
        &demand.aggregate_gbps,
        capacity.with_buffer_gbps,
        stress_pct,
        &config.risk,
    );
    let fingerprint = classify_fingerprint(&demand.aggregate_gbps, capacity.with_buffer_gbps);
    let events = find_events(demand, capacity.with_buffer_gbps);
    let actions = recommend_link(demand.link_id, &risk, &events, &capacity, n_cells, config);
    Ok(LinkAnalysis {
        capacity,
        risk,
        fingerprint,
        events,
        actions,
    })
}

/// Cap and round events for the report.
fn display_events(events: &[CongestionEvent], max_events: usize) -> Vec<CongestionEvent> {
    events
        .iter()
        .take(max_events)
        .map(|event| CongestionEvent {
            link_id: event.link_id,
            time_sec: round_to(event.time_sec, 2),
            contributors: event
                .contributors
                .iter()
                .map(|c| Contributor {
                    cell_id: c.cell_id,
                    pct: round_to(c.pct, 1),
                })
                .collect(),
        })
        .collect()
}

fn validate_cells(cells: &[CellSeries]) -> Result<(), EngineError> {
    if cells.is_empty() {
        return Err(EngineError::Data("no cell telemetry provided".into()));
    }
    let mut seen = BTreeSet::new();
    for series in cells {
        let cell_id = series.cell_id;
        if cell_id == 0 {
            return Err(EngineError::Data("cell id 0 is not a valid cell".into()));
        }
        if !seen.insert(cell_id) {
            return Err(EngineError::Data(format!(
                "duplicate telemetry for cell {cell_id}"
            )));
        }
        if series.is_empty() {
            return Err(EngineError::Data(format!("cell {cell_id} has no samples")));
        }
        if series.time_sec.len() != series.loss_fraction.len()
            || series.time_sec.len() != series.demand_gbps.len()
        {
            return Err(EngineError::Data(format!(
                "cell {cell_id} series lengths differ"
            )));
        }
        if series.time_sec.iter().any(|t| !t.is_finite()) {
            return Err(EngineError::Data(format!(
                "cell {cell_id} has a non-finite timestamp"
            )));
        }
        if series.time_sec.windows(2).any(|w| w[1] < w[0]) {
            return Err(EngineError::Data(format!(
                "cell {cell_id} timestamps are not monotonic"
            )));
        }
        if series
            .loss_fraction
            .iter()
            .any(|l| !(0.0..=1.0).contains(l))
        {
            return Err(EngineError::Data(format!(
                "cell {cell_id} loss fraction outside [0, 1]"
            )));
        }
    }
    Ok(())
}
