//! # Canned Fleet Scenarios
//!
//! Pre-built fleet templates that exercise analysis edge cases:
//! - **Paired loss** — three cell pairs with skewed clocks, for topology recovery
//! - **Steady demand** — flat traffic where buffering buys nothing
//! - **Microbursts** — single-slot spikes the switch buffer absorbs
//! - **Hog cell** — one cell driving sustained congestion on its link
//! - **Stray cell** — a cell whose loss matches no link
//!
//! All templates produce a [`FleetConfig`] for [`FleetSim`].

use crate::fleet::{FleetConfig, FleetSim, LinkProfile};

/// Three cell pairs with distinct staggered loss episodes and ~1 s of
/// per-cell clock skew. Phases sit 5 s apart, far beyond the 1.5 s
/// correlation alignment bound, so lag scanning cannot confuse links.
pub fn paired_loss_fleet(seed: u64) -> FleetConfig {
    let links = (0..3)
        .map(|k| LinkProfile {
            n_cells: 2,
            base_gbps: 1.0 + 0.5 * k as f64,
            noise_gbps: 0.05,
            loss_every_sec: 15.0,
            loss_len_sec: 1.5,
            loss_phase_sec: 5.0 * k as f64,
            clock_skew_sec: 1.0,
            ..Default::default()
        })
        .collect();
    FleetConfig {
        seed,
        duration_sec: 30.0,
        links,
    }
}

/// Three pairs carrying perfectly flat demand. The buffered and
/// unbuffered estimates coincide and every link is healthy.
pub fn steady_fleet(seed: u64) -> FleetConfig {
    let bases = [2.5, 1.5, 2.0];
    let links = bases
        .iter()
        .enumerate()
        .map(|(k, &base)| LinkProfile {
            n_cells: 2,
            base_gbps: base,
            noise_gbps: 0.0,
            loss_phase_sec: 4.0 * k as f64,
            ..Default::default()
        })
        .collect();
    FleetConfig {
        seed,
        duration_sec: 30.0,
        links,
    }
}

/// One link whose two cells spike together for a single 500 µs slot
/// every 25 ms, i.e. 2% of slots at ~8 Gbps over a ~0.7 Gbps floor.
/// The switch buffer absorbs each spike at well below peak capacity.
pub fn microburst_fleet(seed: u64) -> FleetConfig {
    let bursty = LinkProfile {
        n_cells: 2,
        base_gbps: 0.35,
        noise_gbps: 0.02,
        burst_gbps: 3.65,
        burst_every_sec: 0.025,
        burst_slots: 1,
        ..Default::default()
    };
    let mut links = vec![bursty];
    for (k, base) in [1.0, 1.25].into_iter().enumerate() {
        links.push(LinkProfile {
            n_cells: 2,
            base_gbps: base,
            noise_gbps: 0.0,
            loss_phase_sec: 4.0 * (k + 1) as f64,
            ..Default::default()
        });
    }
    FleetConfig {
        seed,
        duration_sec: 30.0,
        links,
    }
}

/// One link where the third cell bursts +7 Gbps for 100 ms every 2 s
/// while its neighbours idle at base load. That cell owns essentially
/// all of the link's congestion.
pub fn hog_fleet(seed: u64) -> FleetConfig {
    let hogged = LinkProfile {
        n_cells: 3,
        base_gbps: 1.0,
        noise_gbps: 0.02,
        burst_gbps: 7.0,
        burst_every_sec: 2.0,
        burst_slots: 200,
        hog: Some(2),
        ..Default::default()
    };
    let mut links = vec![hogged];
    for (k, base) in [1.0, 1.5].into_iter().enumerate() {
        links.push(LinkProfile {
            n_cells: 2,
            base_gbps: base,
            noise_gbps: 0.0,
            loss_phase_sec: 4.0 * (k + 1) as f64,
            ..Default::default()
        });
    }
    FleetConfig {
        seed,
        duration_sec: 30.0,
        links,
    }
}

/// The paired fleet plus one silent cell that never reports loss.
/// It correlates with nothing and should surface as an outlier.
pub fn stray_cell_fleet(seed: u64) -> FleetConfig {
    let mut cfg = paired_loss_fleet(seed);
    cfg.links.push(LinkProfile {
        n_cells: 1,
        base_gbps: 0.5,
        loss_every_sec: 0.0,
        clock_skew_sec: 0.0,
        ..Default::default()
    });
    cfg
}

/// Generate the cells for any of the canned configs.
pub fn generate(cfg: FleetConfig) -> Vec<fathom_model::models::CellSeries> {
    FleetSim::new(cfg).generate()
}
