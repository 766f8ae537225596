//! Prescriptive actions per link.
//!
//! A deterministic rule table over risk, attribution, and capacity
//! state. Reassignment of a dominant congestion driver outranks a
//! blanket capacity upgrade; a crowded link additionally gets a
//! load-balancing note.

use fathom_model::models::{CellId, CongestionEvent, LinkCapacity, LinkId, RiskLevel, RiskScore};

use crate::config::AnalysisConfig;

/// Links with more member cells than this get a load-balancing note.
const CROWDED_LINK_CELLS: usize = 8;

/// Upgrade is only worth recommending past this shortfall ratio.
const UPGRADE_SHORTFALL_RATIO: f64 = 1.05;

/// The single strongest event contributor, if it clears the
/// dominance threshold.
fn dominant_contributor(
    events: &[CongestionEvent],
    threshold_pct: f64,
) -> Option<(CellId, f64)> {
    events
        .iter()
        .filter_map(|event| event.contributors.first())
        .max_by(|a, b| a.pct.partial_cmp(&b.pct).unwrap_or(std::cmp::Ordering::Equal))
        .filter(|top| top.pct >= threshold_pct)
        .map(|top| (top.cell_id, top.pct))
}

/// Ordered recommendations for one link.
pub fn recommend_link(
    link_id: LinkId,
    risk: &RiskScore,
    events: &[CongestionEvent],
    capacity: &LinkCapacity,
    n_cells: usize,
    config: &AnalysisConfig,
) -> Vec<String> {
    let mut actions = Vec::new();

    if risk.level() == RiskLevel::High {
        if let Some((cell_id, share)) =
            dominant_contributor(events, config.dominant_contributor_pct)
        {
            actions.push(format!(
                "Cell {cell_id} drives {share:.0}% of congestion on Link {link_id}. \
                 Consider reassigning it to a less loaded link."
            ));
        }
    }

    let shortfall =
        capacity.no_buffer_gbps > capacity.with_buffer_gbps * UPGRADE_SHORTFALL_RATIO;
    if actions.is_empty() && risk.level() != RiskLevel::Low && shortfall {
        actions.push(format!(
            "Increase Link {link_id} from {:.1} Gbps to {:.1} Gbps to keep packet loss \u{2264}{}%",
            capacity.with_buffer_gbps, capacity.no_buffer_gbps, config.max_loss_pct
        ));
    }

    if n_cells > CROWDED_LINK_CELLS {
        actions.push(format!(
            "Link {link_id} has {n_cells} cells. \
             Consider load balancing by reassigning cells to other links."
        ));
    }

    if actions.is_empty() {
        actions.push(format!(
            "Link {link_id} capacity is adequate. No action required."
        ));
    }
    actions
}
