//! # Buffer-Aware Capacity Estimation
//!
//! Two provisioning answers per link, both at the ≤1% loss target:
//!
//! * **No buffer**: the demand percentile a bufferless link must be
//!   provisioned at, p(100 − max_loss) of the aggregate series.
//! * **With buffer**: the smallest capacity `C` that still meets the
//!   loss target once the switch egress buffer (4 symbol-times of
//!   traffic at rate `C`) absorbs short bursts. Found by bisecting
//!   `C` over `[0, no_buffer]` and replaying the demand series through
//!   a bounded-queue model at each probe.
//!
//! The queue model: each slot, `(demand − C) · slot` enters or leaves
//! a backlog bounded by `C · buffer_window`. A slot is lossy when the
//! backlog would exceed the bound, i.e. when instantaneous demand
//! exceeds capacity plus the remaining buffer headroom. Idle slots
//! drain the backlog at the full service rate.

use fathom_model::models::{
    LinkCapacity, BUFFER_WINDOW_SEC, SLOT_DURATION_SEC, TRAFFIC_FLOOR_GBPS,
};
use tracing::{debug, warn};

use crate::config::AnalysisConfig;
use crate::demand::LinkDemand;
use crate::error::EngineError;
use crate::stats::percentile;

/// Bufferless provisioning for the loss target.
pub fn no_buffer_capacity(aggregate_gbps: &[f64], max_loss_pct: f64) -> f64 {
    percentile(aggregate_gbps, 100.0 - max_loss_pct)
}

/// Replay the demand series through the bounded queue at capacity
/// `capacity_gbps`, marking the slots that shed traffic.
pub fn simulate_lossy_slots(aggregate_gbps: &[f64], capacity_gbps: f64) -> Vec<bool> {
    let bound_gb = capacity_gbps * BUFFER_WINDOW_SEC;
    let mut queue_gb = 0.0f64;
    let mut lossy = vec![false; aggregate_gbps.len()];
    for (slot, &demand) in aggregate_gbps.iter().enumerate() {
        let backlog = queue_gb + (demand - capacity_gbps) * SLOT_DURATION_SEC;
        if backlog > bound_gb {
            lossy[slot] = true;
            queue_gb = bound_gb;
        } else {
            queue_gb = backlog.max(0.0);
        }
    }
    lossy
}

/// True when some cell (or, lacking per-cell series, the aggregate)
/// loses more than `max_loss_pct` of its traffic slots.
fn loss_exceeds_budget(demand: &LinkDemand, lossy: &[bool], max_loss_pct: f64) -> bool {
    let mut measured = false;
    let mut worst_pct = 0.0f64;
    for series in demand.per_cell_gbps.values() {
        let mut traffic = 0usize;
        let mut lost = 0usize;
        for (slot, &d) in series.iter().enumerate() {
            if d > TRAFFIC_FLOOR_GBPS {
                traffic += 1;
                if lossy[slot] {
                    lost += 1;
                }
            }
        }
        if traffic == 0 {
            continue;
        }
        measured = true;
        worst_pct = worst_pct.max(100.0 * lost as f64 / traffic as f64);
    }
    if measured {
        return worst_pct > max_loss_pct;
    }

    // Profile-only demand: budget the aggregate's traffic slots instead.
    let traffic = demand.aggregate_gbps.iter().filter(|&&d| d > 0.0).count();
    if traffic == 0 {
        return false;
    }
    let lost = lossy.iter().filter(|&&l| l).count();
    100.0 * lost as f64 / traffic as f64 > max_loss_pct
}

/// Estimate both capacities for one link.
///
/// An idle link yields zeros. Non-finite or negative demand is a data
/// error scoped to this link; callers drop the link and keep the rest
/// of the analysis.
pub fn estimate_link(
    demand: &LinkDemand,
    config: &AnalysisConfig,
) -> Result<LinkCapacity, EngineError> {
    for &v in &demand.aggregate_gbps {
        if !v.is_finite() || v < 0.0 {
            return Err(EngineError::Data(format!(
                "link {} demand contains a non-finite or negative sample",
                demand.link_id
            )));
        }
    }
    if demand.is_empty() {
        return Ok(LinkCapacity::new(0.0, 0.0, false));
    }

    let no_buffer = no_buffer_capacity(&demand.aggregate_gbps, config.max_loss_pct);
    if no_buffer <= 0.0 {
        return Ok(LinkCapacity::new(0.0, 0.0, false));
    }

    let mut lo = 0.0f64;
    let mut hi = no_buffer;
    let mut iterations = 0u32;
    while hi - lo > config.capacity_epsilon_gbps && iterations < config.max_search_iterations {
        let mid = 0.5 * (lo + hi);
        let lossy = simulate_lossy_slots(&demand.aggregate_gbps, mid);
        if loss_exceeds_budget(demand, &lossy, config.max_loss_pct) {
            lo = mid;
        } else {
            hi = mid;
        }
        iterations += 1;
    }

    let approximate = hi - lo > config.capacity_epsilon_gbps;
    if approximate {
        warn!(
            link_id = demand.link_id,
            lo,
            hi,
            iterations,
            "capacity search stopped before converging; reporting the upper bound"
        );
    }
    debug!(
        link_id = demand.link_id,
        no_buffer,
        with_buffer = hi,
        iterations,
        "capacity estimate"
    );
    Ok(LinkCapacity::new(no_buffer, hi, approximate))
}
