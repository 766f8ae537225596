//! Per-link demand aggregation on the slot grid.
//!
//! Member cells' slot samples are regridded onto one shared axis per link
//! (origin = earliest member sample, optionally clamped to the observation
//! window) and summed elementwise. Per-cell series are retained for the
//! capacity search's per-cell loss budget and for congestion attribution.

use std::collections::BTreeMap;

use fathom_model::models::{
    CellId, CellSeries, LinkId, LinkTopology, SLOT_DURATION_SEC, TRAFFIC_FLOOR_GBPS,
};
use tracing::debug;

/// One link's demand on its slot grid.
#[derive(Debug, Clone, Default)]
pub struct LinkDemand {
    pub link_id: LinkId,
    /// Slot midpoint timestamps.
    pub slot_ts: Vec<f64>,
    /// Elementwise sum of member cells' demand, Gbps.
    pub aggregate_gbps: Vec<f64>,
    /// Member demand on the same grid, Gbps.
    pub per_cell_gbps: BTreeMap<CellId, Vec<f64>>,
}

impl LinkDemand {
    pub fn n_slots(&self) -> usize {
        self.aggregate_gbps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregate_gbps.is_empty()
    }

    /// Slots where a cell is actually sending (above the idle floor).
    pub fn cell_traffic_mask(&self, cell: CellId) -> Option<Vec<bool>> {
        self.per_cell_gbps
            .get(&cell)
            .map(|arr| arr.iter().map(|&d| d > TRAFFIC_FLOOR_GBPS).collect())
    }

    /// Copy with per-cell demand scaled by the given multipliers
    /// (unlisted cells keep 1.0) and the aggregate rebuilt.
    pub fn scaled(&self, multipliers: &BTreeMap<CellId, f64>) -> LinkDemand {
        let mut aggregate = vec![0.0f64; self.n_slots()];
        let per_cell_gbps: BTreeMap<CellId, Vec<f64>> = self
            .per_cell_gbps
            .iter()
            .map(|(&cell_id, arr)| {
                let mult = multipliers.get(&cell_id).copied().unwrap_or(1.0);
                let scaled: Vec<f64> = arr.iter().map(|v| v * mult).collect();
                for (acc, v) in aggregate.iter_mut().zip(&scaled) {
                    *acc += v;
                }
                (cell_id, scaled)
            })
            .collect();
        LinkDemand {
            link_id: self.link_id,
            slot_ts: self.slot_ts.clone(),
            aggregate_gbps: aggregate,
            per_cell_gbps,
        }
    }
}

/// Build each link's [`LinkDemand`] from its member cells.
///
/// Links whose members carry no samples yield an empty demand rather
/// than an error; downstream stages treat them as idle.
pub fn aggregate_link_demand(
    topology: &LinkTopology,
    cells: &[CellSeries],
    window_sec: Option<f64>,
) -> BTreeMap<LinkId, LinkDemand> {
    let by_id: BTreeMap<CellId, &CellSeries> =
        cells.iter().map(|series| (series.cell_id, series)).collect();

    let mut out = BTreeMap::new();
    for (&link_id, members) in &topology.members {
        let mut t0 = f64::INFINITY;
        let mut t1 = f64::NEG_INFINITY;
        for cell_id in members {
            if let Some((first, last)) = by_id.get(cell_id).and_then(|s| s.span()) {
                t0 = t0.min(first);
                t1 = t1.max(last);
            }
        }
        if !t0.is_finite() || !t1.is_finite() {
            out.insert(link_id, LinkDemand { link_id, ..Default::default() });
            continue;
        }
        if let Some(window) = window_sec {
            t1 = t1.min(t0 + window);
        }

        let n_slots = ((t1 - t0) / SLOT_DURATION_SEC) as usize + 1;
        let mut per_cell_gbps: BTreeMap<CellId, Vec<f64>> = BTreeMap::new();
        for &cell_id in members {
            let mut slots = vec![0.0f64; n_slots];
            if let Some(series) = by_id.get(&cell_id) {
                for (&t, &d) in series.time_sec.iter().zip(&series.demand_gbps) {
                    if t < t0 || t > t1 {
                        continue;
                    }
                    let idx = (((t - t0) / SLOT_DURATION_SEC).round() as usize).min(n_slots - 1);
                    slots[idx] += d;
                }
            }
            per_cell_gbps.insert(cell_id, slots);
        }

        // Aggregate as the cell-major sum of the retained series so that
        // rescaling by 1.0 reproduces it exactly.
        let mut aggregate = vec![0.0f64; n_slots];
        for arr in per_cell_gbps.values() {
            for (acc, v) in aggregate.iter_mut().zip(arr) {
                *acc += v;
            }
        }

        let slot_ts: Vec<f64> = (0..n_slots)
            .map(|i| t0 + (i as f64 + 0.5) * SLOT_DURATION_SEC)
            .collect();

        debug!(link_id, n_slots, t0, t1, "aggregated link demand");
        out.insert(
            link_id,
            LinkDemand {
                link_id,
                slot_ts,
                aggregate_gbps: aggregate,
                per_cell_gbps,
            },
        );
    }
    out
}
