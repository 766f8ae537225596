//! # Topology Inference
//!
//! Partitions cells into exactly [`NUM_LINKS`] clusters — one per shared
//! Ethernet link — from the loss-correlation matrix:
//!
//! 1. seed one cluster per link, either from operator anchor hints or by
//!    farthest-point selection (most mutually dissimilar cells),
//! 2. assign every remaining cell to the seed it correlates with most
//!    strongly (ties break toward the lower link id),
//! 3. score per-link confidence and flag cells that match no cluster well.
//!
//! Distance between cells is `1 - correlation` clamped to `[0, 1]`.

use std::collections::BTreeMap;

use fathom_model::models::{
    CellId, CorrelationMatrix, LinkId, LinkTopology, OutlierCell, NUM_LINKS,
};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Cluster cells into links.
///
/// Fails with a `Topology` error when fewer cells than links are observed,
/// or when anchor hints leave some link impossible to seed.
pub fn cluster(
    matrix: &CorrelationMatrix,
    anchors: &BTreeMap<CellId, LinkId>,
    outlier_threshold: f64,
) -> Result<LinkTopology, EngineError> {
    let n = matrix.n_cells();
    if n < NUM_LINKS {
        return Err(EngineError::Topology(format!(
            "need at least {} cells to infer {} links, got {}",
            NUM_LINKS, NUM_LINKS, n
        )));
    }

    let corr = |i: usize, j: usize| matrix.matrix[i][j];
    let dist = |i: usize, j: usize| 1.0 - matrix.matrix[i][j].clamp(0.0, 1.0);

    // ─── Seeding ────────────────────────────────────────────────────────

    // First anchored cell per link becomes that link's seed; extra cells
    // anchored to the same link are pre-assigned members.
    let mut seed_of_link: BTreeMap<LinkId, usize> = BTreeMap::new();
    let mut forced: BTreeMap<usize, LinkId> = BTreeMap::new();
    for (&cell, &link) in anchors {
        let Some(idx) = matrix.index_of(cell) else {
            warn!(cell, link, "anchor cell not present in telemetry, ignoring");
            continue;
        };
        if link < 1 || link > NUM_LINKS as LinkId {
            warn!(cell, link, "anchor link outside deployment, ignoring");
            continue;
        }
        forced.insert(idx, link);
        seed_of_link.entry(link).or_insert(idx);
    }

    let mut seeds: Vec<usize> = seed_of_link.values().copied().collect();
    let is_candidate =
        |idx: usize, seeds: &[usize], forced: &BTreeMap<usize, LinkId>| -> bool {
            !seeds.contains(&idx) && !forced.contains_key(&idx)
        };

    // No anchors at all: start from the most dissimilar pair.
    if seeds.is_empty() {
        let mut best = (0usize, 1usize);
        let mut best_d = f64::NEG_INFINITY;
        for i in 0..n {
            for j in (i + 1)..n {
                let d = dist(i, j);
                if d > best_d {
                    best_d = d;
                    best = (i, j);
                }
            }
        }
        seeds.push(best.0);
        seeds.push(best.1);
    }

    // Greedy farthest-point fill for the remaining links.
    while seeds.len() < NUM_LINKS {
        let mut pick = None;
        let mut pick_d = f64::NEG_INFINITY;
        for idx in 0..n {
            if !is_candidate(idx, &seeds, &forced) {
                continue;
            }
            let min_d = seeds
                .iter()
                .map(|&s| dist(idx, s))
                .fold(f64::INFINITY, f64::min);
            if min_d > pick_d {
                pick_d = min_d;
                pick = Some(idx);
            }
        }
        match pick {
            Some(idx) => seeds.push(idx),
            None => {
                return Err(EngineError::Topology(
                    "anchor hints leave no free cell to seed every link".into(),
                ))
            }
        }
    }

    // Unanchored seeds take the unused link ids in pick order.
    let mut seed_links: Vec<(usize, LinkId)> =
        seed_of_link.iter().map(|(&link, &idx)| (idx, link)).collect();
    let mut unused: Vec<LinkId> = (1..=NUM_LINKS as LinkId)
        .filter(|l| !seed_of_link.contains_key(l))
        .collect();
    for &seed in &seeds {
        if seed_links.iter().any(|&(idx, _)| idx == seed) {
            continue;
        }
        seed_links.push((seed, unused.remove(0)));
    }
    seed_links.sort_by_key(|&(_, link)| link);

    debug!(?seed_links, "seeded link clusters");

    // ─── Assignment ─────────────────────────────────────────────────────

    let mut members: BTreeMap<LinkId, Vec<CellId>> = BTreeMap::new();
    for &(idx, link) in &seed_links {
        members.entry(link).or_default().push(matrix.cells[idx]);
    }
    for (&idx, &link) in &forced {
        if seeds.contains(&idx) {
            continue;
        }
        members.entry(link).or_default().push(matrix.cells[idx]);
    }
    for idx in 0..n {
        if seeds.contains(&idx) || forced.contains_key(&idx) {
            continue;
        }
        // seed_links is sorted by link id, so a strict `>` keeps the
        // lowest link on ties.
        let mut best_link = seed_links[0].1;
        let mut best_r = f64::NEG_INFINITY;
        for &(seed, link) in &seed_links {
            let r = corr(idx, seed);
            if r > best_r {
                best_r = r;
                best_link = link;
            }
        }
        members.entry(best_link).or_default().push(matrix.cells[idx]);
    }
    for cells in members.values_mut() {
        cells.sort_unstable();
    }

    // ─── Confidence & outliers ──────────────────────────────────────────

    let index_of = |cell: CellId| matrix.index_of(cell);
    let mut confidence = BTreeMap::new();
    for (&link, cells) in &members {
        let score = match cells.len() {
            0 => 0,
            1 => {
                // Lone cell: confidence tracks its best match anywhere —
                // weakly matched loners are low-confidence placements.
                let Some(i0) = index_of(cells[0]) else { continue };
                let best = max_correlation_to_others(matrix, i0);
                (100.0 * best).round() as u32
            }
            _ => {
                // Each member scores by its strongest match within its
                // own cluster; the link reports the mean of those bests.
                let mut sum = 0.0;
                let mut count = 0u32;
                for &a in cells {
                    let Some(i) = index_of(a) else { continue };
                    let mut best = f64::NEG_INFINITY;
                    for &b in cells {
                        if b == a {
                            continue;
                        }
                        if let Some(j) = index_of(b) {
                            best = best.max(corr(i, j));
                        }
                    }
                    if best.is_finite() {
                        sum += best;
                        count += 1;
                    }
                }
                if count == 0 {
                    0
                } else {
                    (100.0 * sum / count as f64).round() as u32
                }
            }
        };
        confidence.insert(link, score);
    }

    let mut outliers = Vec::new();
    let topo_lookup = members.clone();
    for (idx, &cell) in matrix.cells.iter().enumerate() {
        let best = max_correlation_to_others(matrix, idx);
        if best < outlier_threshold {
            let link = topo_lookup
                .iter()
                .find(|(_, cells)| cells.contains(&cell))
                .map(|(&link, _)| link)
                .unwrap_or(0);
            outliers.push(OutlierCell {
                link_id: link,
                cell_id: cell,
                max_correlation: best,
            });
        }
    }

    Ok(LinkTopology {
        members,
        confidence,
        outliers,
    })
}

/// Highest correlation between `idx` and any other cell.
fn max_correlation_to_others(matrix: &CorrelationMatrix, idx: usize) -> f64 {
    matrix.matrix[idx]
        .iter()
        .enumerate()
        .filter(|&(j, _)| j != idx)
        .map(|(_, &r)| r)
        .fold(0.0, f64::max)
}
