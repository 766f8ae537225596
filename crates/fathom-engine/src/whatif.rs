//! # What-If Re-Estimation
//!
//! Answers "what if cell 7 sent 40% more traffic" against a cached
//! baseline, without raw telemetry. The baseline carries the richest
//! demand evidence available:
//!
//! * per-cell slot series (a live pipeline run): multipliers scale
//!   each member series and the full capacity search reruns;
//! * an aggregate profile per link (reloaded from a report's traffic
//!   summary): each link's profile scales by the equal-weight mean of
//!   its members' multipliers, and the search reruns against the
//!   scaled shape;
//! * scalars only: no distribution to replay, so the question is
//!   answered with an explicit unavailable outcome instead of a
//!   fabricated number.

use std::collections::{BTreeMap, BTreeSet};

use fathom_model::models::{CapacityResult, CellId, LinkCapacity, LinkId, LinkTopology, RiskScore};
use fathom_model::report::{AnalysisReport, WhatIfOutcome, WhatIfReport, WhatIfRequest};
use tracing::{debug, warn};

use crate::attribution::find_events;
use crate::capacity::estimate_link;
use crate::config::AnalysisConfig;
use crate::demand::LinkDemand;
use crate::recommend::recommend_link;
use crate::risk::{overflow_share_pct, score_link};
use crate::stats::round_to;

/// Demand evidence retained by a baseline, in decreasing fidelity.
#[derive(Debug)]
enum BaselineDemand {
    PerCell(BTreeMap<LinkId, LinkDemand>),
    Profile(BTreeMap<LinkId, Vec<f64>>),
    None,
}

/// A cached analysis result that what-if questions are answered against.
#[derive(Debug)]
pub struct Baseline {
    topology: LinkTopology,
    capacity: CapacityResult,
    demand: BaselineDemand,
    config: AnalysisConfig,
}

impl Baseline {
    /// Baseline from a live pipeline run, keeping per-cell series.
    pub fn new(
        topology: LinkTopology,
        capacity: CapacityResult,
        demand: BTreeMap<LinkId, LinkDemand>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            topology,
            capacity,
            demand: BaselineDemand::PerCell(demand),
            config,
        }
    }

    /// Baseline reloaded from a serialized report. Links keep their
    /// downsampled aggregate profile when the report carries one;
    /// otherwise only scalars survive and what-if is unavailable.
    pub fn from_report(report: &AnalysisReport, config: AnalysisConfig) -> Self {
        let topology = LinkTopology {
            members: report.topology.clone(),
            confidence: report.topology_confidence.clone(),
            outliers: report.outliers.clone(),
        };

        let mut capacity = CapacityResult::new();
        let link_ids: BTreeSet<LinkId> = report
            .capacity_no_buf
            .keys()
            .chain(report.capacity_with_buf.keys())
            .copied()
            .collect();
        for link_id in link_ids {
            let with_buffer = report.capacity_with_buf.get(&link_id).copied();
            let no_buffer = report
                .capacity_no_buf
                .get(&link_id)
                .copied()
                .or(with_buffer)
                .unwrap_or(0.0);
            let approximate = report.approximate_capacity.contains(&link_id);
            capacity.insert(
                link_id,
                LinkCapacity::new(no_buffer, with_buffer.unwrap_or(no_buffer), approximate),
            );
        }

        let profiles: BTreeMap<LinkId, Vec<f64>> = report
            .traffic_summary
            .iter()
            .filter(|(_, trace)| !trace.demand_gbps.is_empty())
            .map(|(&link_id, trace)| (link_id, trace.demand_gbps.clone()))
            .collect();
        let demand = if profiles.is_empty() {
            BaselineDemand::None
        } else {
            BaselineDemand::Profile(profiles)
        };

        Self {
            topology,
            capacity,
            demand,
            config,
        }
    }

    pub fn topology(&self) -> &LinkTopology {
        &self.topology
    }

    pub fn capacity(&self) -> &CapacityResult {
        &self.capacity
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Per-cell demand series, when this baseline came from a live run.
    pub fn per_cell_demand(&self) -> Option<&BTreeMap<LinkId, LinkDemand>> {
        match &self.demand {
            BaselineDemand::PerCell(demand) => Some(demand),
            _ => None,
        }
    }

    /// Answer a what-if question against this baseline.
    pub fn what_if(&self, request: &WhatIfRequest) -> WhatIfOutcome {
        let multipliers = parse_multipliers(request);
        match &self.demand {
            BaselineDemand::PerCell(demand) => self.reestimate_per_cell(demand, &multipliers),
            BaselineDemand::Profile(profiles) => self.reestimate_profiles(profiles, &multipliers),
            BaselineDemand::None => WhatIfOutcome::Unavailable {
                reason: "baseline has no demand distribution; \
                         re-run the analysis on raw telemetry to simulate"
                    .to_string(),
            },
        }
    }

    fn reestimate_per_cell(
        &self,
        demand: &BTreeMap<LinkId, LinkDemand>,
        multipliers: &BTreeMap<CellId, f64>,
    ) -> WhatIfOutcome {
        let mut report = WhatIfReport {
            topology: self.topology.members.clone(),
            ..Default::default()
        };
        for (&link_id, link_demand) in demand {
            let scaled = link_demand.scaled(multipliers);
            let capacity = match estimate_link(&scaled, &self.config) {
                Ok(capacity) => capacity,
                Err(error) => {
                    warn!(link_id, %error, "skipping link in what-if re-estimation");
                    continue;
                }
            };
            let stress_pct =
                overflow_share_pct(&scaled.aggregate_gbps, capacity.with_buffer_gbps);
            let risk = score_link(
                &scaled.aggregate_gbps,
                capacity.with_buffer_gbps,
                stress_pct,
                &self.config.risk,
            );
            let events = find_events(&scaled, capacity.with_buffer_gbps);
            let n_cells = self
                .topology
                .members
                .get(&link_id)
                .map_or(0, Vec::len);
            let actions = recommend_link(link_id, &risk, &events, &capacity, n_cells, &self.config);

            debug!(
                link_id,
                with_buffer = capacity.with_buffer_gbps,
                score = risk.score,
                "what-if re-estimated link"
            );
            insert_link(&mut report, link_id, &capacity, risk, actions);
        }
        WhatIfOutcome::Ready(report)
    }

    fn reestimate_profiles(
        &self,
        profiles: &BTreeMap<LinkId, Vec<f64>>,
        multipliers: &BTreeMap<CellId, f64>,
    ) -> WhatIfOutcome {
        let mut report = WhatIfReport {
            topology: self.topology.members.clone(),
            ..Default::default()
        };
        for (&link_id, profile) in profiles {
            // Equal per-cell contribution: without member series the
            // link scales by the mean of its members' multipliers.
            let factor = match self.topology.members.get(&link_id) {
                Some(members) if !members.is_empty() => {
                    members
                        .iter()
                        .map(|cell| multipliers.get(cell).copied().unwrap_or(1.0))
                        .sum::<f64>()
                        / members.len() as f64
                }
                _ => 1.0,
            };
            let scaled: Vec<f64> = profile.iter().map(|d| d * factor).collect();
            let as_demand = LinkDemand {
                link_id,
                aggregate_gbps: scaled,
                ..Default::default()
            };
            let capacity = match estimate_link(&as_demand, &self.config) {
                Ok(capacity) => capacity,
                Err(error) => {
                    warn!(link_id, %error, "skipping link in what-if re-estimation");
                    continue;
                }
            };
            let stress_pct =
                overflow_share_pct(&as_demand.aggregate_gbps, capacity.with_buffer_gbps);
            let risk = score_link(
                &as_demand.aggregate_gbps,
                capacity.with_buffer_gbps,
                stress_pct,
                &self.config.risk,
            );
            let n_cells = self
                .topology
                .members
                .get(&link_id)
                .map_or(0, Vec::len);
            let actions = recommend_link(link_id, &risk, &[], &capacity, n_cells, &self.config);

            debug!(link_id, factor, "what-if scaled link profile");
            insert_link(&mut report, link_id, &capacity, risk, actions);
        }
        WhatIfOutcome::Ready(report)
    }
}

fn insert_link(
    report: &mut WhatIfReport,
    link_id: LinkId,
    capacity: &LinkCapacity,
    risk: RiskScore,
    actions: Vec<String>,
) {
    report
        .capacity_no_buf
        .insert(link_id, round_to(capacity.no_buffer_gbps, 2));
    report
        .capacity_with_buf
        .insert(link_id, round_to(capacity.with_buffer_gbps, 2));
    report
        .bandwidth_savings_pct
        .insert(link_id, capacity.savings_pct);
    report.risk_scores.insert(link_id, risk);
    report.recommendations.insert(link_id, actions);
}

/// Parse and validate request multipliers, dropping entries that
/// cannot be applied.
fn parse_multipliers(request: &WhatIfRequest) -> BTreeMap<CellId, f64> {
    let mut out = BTreeMap::new();
    for (key, &mult) in &request.traffic_multipliers {
        let Ok(cell_id) = key.parse::<CellId>() else {
            warn!(key = %key, "ignoring multiplier with unparseable cell id");
            continue;
        };
        if !mult.is_finite() || mult <= 0.0 {
            warn!(cell_id, mult, "ignoring non-positive traffic multiplier");
            continue;
        }
        out.insert(cell_id, mult);
    }
    out
}
