//! Congestion root-cause attribution.
//!
//! Consecutive slots whose aggregate demand exceeds the buffered
//! capacity form one congestion window. Each window is attributed to
//! the cells whose demand at the window's peak slot exceeds a
//! pro-rata share of capacity, ranked by their share of the total
//! excess.

use fathom_model::models::{CongestionEvent, CongestionFingerprint, Contributor};

use crate::demand::LinkDemand;
use crate::stats::SeriesStats;

/// Contributors reported per event.
const MAX_CONTRIBUTORS: usize = 3;

/// Longest run of consecutive slots above capacity.
fn longest_overflow_run(aggregate_gbps: &[f64], capacity_gbps: f64) -> usize {
    let mut longest = 0usize;
    let mut current = 0usize;
    for &d in aggregate_gbps {
        if d > capacity_gbps {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Classify a link's congestion shape.
pub fn classify_fingerprint(
    aggregate_gbps: &[f64],
    capacity_gbps: f64,
) -> CongestionFingerprint {
    if aggregate_gbps.is_empty() || capacity_gbps <= 0.0 {
        return CongestionFingerprint::NoTraffic;
    }
    let max_burst = longest_overflow_run(aggregate_gbps, capacity_gbps);
    if max_burst == 0 {
        return CongestionFingerprint::NoCongestion;
    }
    let stats = SeriesStats::from_values(aggregate_gbps);
    if max_burst >= 5 && stats.cv() > 0.8 {
        CongestionFingerprint::SynchronizedPeaks
    } else {
        CongestionFingerprint::BufferBottleneck
    }
}

/// Contributors at one slot: cells above their pro-rata capacity
/// share, ranked by share of the total excess.
fn contributors_at(demand: &LinkDemand, slot: usize, capacity_gbps: f64) -> Vec<Contributor> {
    let n_members = demand.per_cell_gbps.len();
    if n_members == 0 {
        return Vec::new();
    }
    let pro_rata = capacity_gbps / n_members as f64;

    let mut excess: Vec<(u32, f64)> = demand
        .per_cell_gbps
        .iter()
        .filter_map(|(&cell_id, series)| {
            let over = series[slot] - pro_rata;
            (over > 0.0).then_some((cell_id, over))
        })
        .collect();
    let total: f64 = excess.iter().map(|(_, over)| over).sum();
    if total <= 0.0 {
        return Vec::new();
    }

    excess.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    excess
        .into_iter()
        .take(MAX_CONTRIBUTORS)
        .map(|(cell_id, over)| Contributor {
            cell_id,
            pct: 100.0 * over / total,
        })
        .collect()
}

/// Find congestion windows on one link, in time order.
///
/// Attribution needs member series; profile-only demand yields no
/// events.
pub fn find_events(demand: &LinkDemand, capacity_gbps: f64) -> Vec<CongestionEvent> {
    if capacity_gbps <= 0.0 || demand.per_cell_gbps.is_empty() {
        return Vec::new();
    }

    let mut events = Vec::new();
    let mut window: Option<(usize, usize)> = None; // (start, peak)
    for (slot, &d) in demand.aggregate_gbps.iter().enumerate() {
        if d > capacity_gbps {
            window = Some(match window {
                None => (slot, slot),
                Some((start, peak)) => {
                    if d > demand.aggregate_gbps[peak] {
                        (start, slot)
                    } else {
                        (start, peak)
                    }
                }
            });
        } else if let Some((start, peak)) = window.take() {
            events.push(CongestionEvent {
                link_id: demand.link_id,
                time_sec: demand.slot_ts[start],
                contributors: contributors_at(demand, peak, capacity_gbps),
            });
        }
    }
    if let Some((start, peak)) = window {
        events.push(CongestionEvent {
            link_id: demand.link_id,
            time_sec: demand.slot_ts[start],
            contributors: contributors_at(demand, peak, capacity_gbps),
        });
    }
    events
}
