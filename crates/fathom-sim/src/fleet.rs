use fathom_model::models::{CellId, CellSeries, SLOT_DURATION_SEC};
use rand::RngExt as _;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Configuration for a deterministic synthetic fleet.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    pub seed: u64,
    pub duration_sec: f64,
    /// One profile per group of cells sharing a fronthaul link.
    pub links: Vec<LinkProfile>,
}

/// Shape of one link group's demand and loss behaviour.
#[derive(Debug, Clone)]
pub struct LinkProfile {
    /// Number of cells riding this link.
    pub n_cells: usize,
    /// Steady per-cell demand, Gbps.
    pub base_gbps: f64,
    /// Uniform demand jitter amplitude around the base, Gbps.
    pub noise_gbps: f64,
    /// Extra demand during a burst, Gbps per bursting cell.
    pub burst_gbps: f64,
    /// Seconds between burst starts; 0 disables bursts.
    pub burst_every_sec: f64,
    /// Burst length in slots.
    pub burst_slots: usize,
    /// Index of the one cell in this group that carries the bursts;
    /// `None` makes every cell burst together.
    pub hog: Option<usize>,
    /// Seconds between shared loss episode starts; 0 disables episodes.
    pub loss_every_sec: f64,
    /// Loss episode length, seconds.
    pub loss_len_sec: f64,
    /// Start of the first loss episode, seconds. Links staggered by
    /// more than the correlation alignment bound stay distinguishable.
    pub loss_phase_sec: f64,
    /// Loss fraction reported during an episode.
    pub loss_level: f64,
    /// Largest per-cell clock offset, seconds.
    pub clock_skew_sec: f64,
}

impl Default for LinkProfile {
    fn default() -> Self {
        LinkProfile {
            n_cells: 2,
            base_gbps: 1.0,
            noise_gbps: 0.05,
            burst_gbps: 0.0,
            burst_every_sec: 0.0,
            burst_slots: 0,
            hog: None,
            loss_every_sec: 12.0,
            loss_len_sec: 1.0,
            loss_phase_sec: 0.0,
            loss_level: 0.8,
            clock_skew_sec: 0.0,
        }
    }
}

/// Deterministic fleet telemetry generator.
///
/// Given a seed, produces reproducible per-cell demand and loss series
/// on the 500 µs slot grid. Cells of one group share loss episodes
/// (their link's congestion) and optionally burst together; per-cell
/// clock offsets shift the reported timestamps without changing the
/// underlying behaviour.
#[derive(Debug)]
pub struct FleetSim {
    cfg: FleetConfig,
    rng: StdRng,
}

impl FleetSim {
    pub fn new(cfg: FleetConfig) -> Self {
        let rng = StdRng::seed_from_u64(cfg.seed);
        Self { cfg, rng }
    }

    /// Generate every cell's series. Cell ids are assigned sequentially
    /// across groups, starting at 1.
    pub fn generate(&mut self) -> Vec<CellSeries> {
        let n_slots = (self.cfg.duration_sec / SLOT_DURATION_SEC).ceil() as usize;
        let mut cells = Vec::new();
        let mut next_cell: CellId = 1;

        for link_idx in 0..self.cfg.links.len() {
            let profile = self.cfg.links[link_idx].clone();
            let burst_period_slots = if profile.burst_every_sec > 0.0 {
                (profile.burst_every_sec / SLOT_DURATION_SEC).round() as usize
            } else {
                0
            };

            for cell_pos in 0..profile.n_cells {
                let cell_id = next_cell;
                next_cell += 1;
                let skew = if profile.clock_skew_sec > 0.0 {
                    self.rng.random::<f64>() * profile.clock_skew_sec
                } else {
                    0.0
                };
                let bursts = profile.hog.is_none_or(|h| h == cell_pos);

                let mut time_sec = Vec::with_capacity(n_slots);
                let mut demand_gbps = Vec::with_capacity(n_slots);
                let mut loss_fraction = Vec::with_capacity(n_slots);
                for slot in 0..n_slots {
                    let t = slot as f64 * SLOT_DURATION_SEC;

                    let mut demand = profile.base_gbps
                        + profile.noise_gbps * (self.rng.random::<f64>() - 0.5);
                    if bursts
                        && burst_period_slots > 0
                        && slot % burst_period_slots < profile.burst_slots
                    {
                        demand += profile.burst_gbps;
                    }
                    demand_gbps.push(demand.max(0.0));

                    let in_episode = profile.loss_every_sec > 0.0
                        && t >= profile.loss_phase_sec
                        && (t - profile.loss_phase_sec).rem_euclid(profile.loss_every_sec)
                            < profile.loss_len_sec;
                    loss_fraction.push(if in_episode { profile.loss_level } else { 0.0 });

                    time_sec.push(t + skew);
                }

                cells.push(CellSeries {
                    cell_id,
                    time_sec,
                    loss_fraction,
                    demand_gbps,
                });
            }
        }

        cells
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_group_config(seed: u64) -> FleetConfig {
        FleetConfig {
            seed,
            duration_sec: 2.0,
            links: vec![
                LinkProfile {
                    n_cells: 2,
                    base_gbps: 1.5,
                    loss_phase_sec: 0.0,
                    loss_len_sec: 0.4,
                    ..Default::default()
                },
                LinkProfile {
                    n_cells: 3,
                    base_gbps: 0.8,
                    loss_every_sec: 5.0,
                    loss_phase_sec: 0.7,
                    loss_len_sec: 0.3,
                    ..Default::default()
                },
            ],
        }
    }

    #[test]
    fn fleet_is_deterministic_for_seed() {
        let mut a = FleetSim::new(two_group_config(42));
        let mut b = FleetSim::new(two_group_config(42));
        let cells_a = a.generate();
        let cells_b = b.generate();

        assert_eq!(cells_a.len(), cells_b.len());
        for (ca, cb) in cells_a.iter().zip(&cells_b) {
            assert_eq!(ca.cell_id, cb.cell_id);
            assert_eq!(ca.time_sec, cb.time_sec);
            assert_eq!(ca.demand_gbps, cb.demand_gbps);
            assert_eq!(ca.loss_fraction, cb.loss_fraction);
        }
    }

    #[test]
    fn cells_are_numbered_sequentially_across_groups() {
        let cells = FleetSim::new(two_group_config(7)).generate();
        let ids: Vec<CellId> = cells.iter().map(|c| c.cell_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(cells[0].len(), 4000, "2 s of 500 µs slots");
    }

    #[test]
    fn timestamps_sit_on_the_slot_grid_plus_skew() {
        let mut cfg = two_group_config(3);
        cfg.links[0].clock_skew_sec = 0.8;
        let cells = FleetSim::new(cfg).generate();

        let skewed = &cells[0];
        let skew = skewed.time_sec[0];
        assert!((0.0..=0.8).contains(&skew), "skew within bound, got {skew}");
        for (i, &t) in skewed.time_sec.iter().enumerate() {
            let expected = skew + i as f64 * SLOT_DURATION_SEC;
            assert!((t - expected).abs() < 1e-12);
        }

        let unskewed = &cells[2];
        assert_eq!(unskewed.time_sec[0], 0.0);
    }

    #[test]
    fn loss_episodes_are_shared_within_a_group() {
        let cells = FleetSim::new(two_group_config(11)).generate();
        // group 2: episodes of 0.3 s starting at 0.7 s
        let in_episode = (0.8 / SLOT_DURATION_SEC) as usize;
        let outside = (0.5 / SLOT_DURATION_SEC) as usize;
        for cell in &cells[2..] {
            assert_eq!(cell.loss_fraction[in_episode], 0.8);
            assert_eq!(cell.loss_fraction[outside], 0.0);
        }
        // group 1 uses a different phase and is clean at 0.8 s
        assert_eq!(cells[0].loss_fraction[in_episode], 0.0);
        assert_eq!(cells[0].loss_fraction[0], 0.8, "episode at its own phase");
    }

    #[test]
    fn hog_carries_bursts_alone() {
        let cfg = FleetConfig {
            seed: 5,
            duration_sec: 1.0,
            links: vec![LinkProfile {
                n_cells: 3,
                base_gbps: 1.0,
                noise_gbps: 0.02,
                burst_gbps: 6.0,
                burst_every_sec: 0.25,
                burst_slots: 4,
                hog: Some(2),
                ..Default::default()
            }],
        };
        let cells = FleetSim::new(cfg).generate();
        let burst_slot = (0.25 / SLOT_DURATION_SEC) as usize; // second burst start
        assert!(
            cells[2].demand_gbps[burst_slot] > 6.5,
            "hog bursts: {}",
            cells[2].demand_gbps[burst_slot]
        );
        for cell in &cells[..2] {
            assert!(
                cell.demand_gbps[burst_slot] < 1.1,
                "non-hog stays at base: {}",
                cell.demand_gbps[burst_slot]
            );
        }
        // off-burst the hog returns to base
        assert!(cells[2].demand_gbps[burst_slot + 4] < 1.1);
    }

    #[test]
    fn zero_noise_demand_is_exact() {
        let cfg = FleetConfig {
            seed: 1,
            duration_sec: 0.5,
            links: vec![LinkProfile {
                n_cells: 1,
                base_gbps: 2.5,
                noise_gbps: 0.0,
                ..Default::default()
            }],
        };
        let cells = FleetSim::new(cfg).generate();
        assert!(cells[0].demand_gbps.iter().all(|&d| d == 2.5));
    }
}
