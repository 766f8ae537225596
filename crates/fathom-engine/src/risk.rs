//! Composite congestion-risk scoring.
//!
//! Three weighted terms on a 0–100 scale: overflow propensity (share
//! of traffic slots above capacity), buffer stress, and demand
//! burstiness (coefficient of variation). The overflow term is left
//! uncapped so sustained overload saturates the score; the other two
//! terms cap at their weight.

use fathom_model::models::{RiskLevel, RiskScore};

use crate::config::RiskWeights;
use crate::stats::{round_to, SeriesStats};

/// Share of traffic slots whose demand exceeds capacity, in percent.
pub fn overflow_share_pct(aggregate_gbps: &[f64], capacity_gbps: f64) -> f64 {
    let overflow = aggregate_gbps.iter().filter(|&&d| d > capacity_gbps).count();
    let traffic = aggregate_gbps.iter().filter(|&&d| d > 0.0).count();
    100.0 * overflow as f64 / traffic.max(1) as f64
}

/// Score one link.
///
/// `buffer_stress_pct` is the caller's measure of how often bursts
/// lean on the switch buffer, normalized like the overflow share.
pub fn score_link(
    aggregate_gbps: &[f64],
    capacity_gbps: f64,
    buffer_stress_pct: f64,
    weights: &RiskWeights,
) -> RiskScore {
    if aggregate_gbps.is_empty() || capacity_gbps <= 0.0 {
        return RiskScore::new(0.0, "No traffic");
    }

    let overflow_pct = overflow_share_pct(aggregate_gbps, capacity_gbps);
    let cv = SeriesStats::from_values(aggregate_gbps).cv();

    let raw = 100.0
        * (weights.overflow * (overflow_pct / weights.overflow_norm_pct)
            + weights.exhaustion * (buffer_stress_pct / weights.exhaustion_norm_pct).min(1.0)
            + weights.burstiness * cv.min(1.0));
    let score = round_to(raw.clamp(0.0, 100.0), 1);

    let reason = match RiskLevel::from_score(score) {
        RiskLevel::High => format!(
            "High: Demand exceeds capacity in {overflow_pct:.1}% of traffic slots. \
             Buffer exhaustion contributes to congestion risk."
        ),
        RiskLevel::Medium => format!(
            "Medium: Moderate overflow ({overflow_pct:.1}% of slots). \
             Consider capacity increase for headroom."
        ),
        RiskLevel::Low => {
            "Low: Link has adequate headroom. Current capacity sufficient for observed traffic."
                .to_string()
        }
    };
    RiskScore::new(score, reason)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_traffic_scores_zero() {
        let weights = RiskWeights::default();
        let empty = score_link(&[], 5.0, 0.0, &weights);
        assert_eq!(empty.score, 0.0);
        assert_eq!(empty.reason, "No traffic");
        assert_eq!(empty.level(), RiskLevel::Low);

        let no_capacity = score_link(&[1.0, 2.0], 0.0, 0.0, &weights);
        assert_eq!(no_capacity.reason, "No traffic");
    }

    #[test]
    fn steady_demand_under_capacity_is_low() {
        let risk = score_link(&[4.0; 1000], 5.0, 0.0, &RiskWeights::default());
        assert_eq!(risk.score, 0.0);
        assert_eq!(risk.level(), RiskLevel::Low);
        assert!(
            risk.reason.starts_with("Low: Link has adequate headroom"),
            "reason: {}",
            risk.reason
        );
    }

    #[test]
    fn sparse_overflow_with_stress_is_medium() {
        // 2% of slots overflow; the stress input mirrors that share.
        let mut demand = vec![4.0; 1000];
        for slot in 0..20 {
            demand[slot] = 12.0;
        }
        let risk = score_link(&demand, 11.9, 2.0, &RiskWeights::default());
        // 30*(2/5) + 40*min(1, 2/3) + 30*cv(=0.269) = 46.7
        assert!(
            (risk.score - 46.7).abs() < 0.05,
            "score: {}",
            risk.score
        );
        assert_eq!(risk.level(), RiskLevel::Medium);
        assert!(
            risk.reason.starts_with("Medium: Moderate overflow (2.0% of slots)"),
            "reason: {}",
            risk.reason
        );
    }

    #[test]
    fn sustained_overflow_saturates_the_score() {
        let risk = score_link(&[8.0; 500], 5.0, 100.0, &RiskWeights::default());
        assert_eq!(risk.score, 100.0, "overflow term is uncapped, total clamps");
        assert_eq!(risk.level(), RiskLevel::High);
        assert!(
            risk.reason.starts_with("High: Demand exceeds capacity in 100.0%"),
            "reason: {}",
            risk.reason
        );
    }

    #[test]
    fn burstiness_term_caps_at_its_weight() {
        // one huge spike: cv far above 1, no overflow at this capacity
        let mut demand = vec![0.0; 100];
        demand[50] = 1000.0;
        let risk = score_link(&demand, 2000.0, 0.0, &RiskWeights::default());
        assert_eq!(risk.score, 30.0);
        assert_eq!(risk.level(), RiskLevel::Low);
    }

    #[test]
    fn zero_weights_zero_the_score() {
        let weights = RiskWeights {
            overflow: 0.0,
            exhaustion: 0.0,
            burstiness: 0.0,
            ..RiskWeights::default()
        };
        let risk = score_link(&[9.0; 100], 5.0, 50.0, &weights);
        assert_eq!(risk.score, 0.0);
    }

    #[test]
    fn overflow_share_ignores_idle_slots() {
        let demand = [0.0, 0.0, 6.0, 4.0];
        // two traffic slots, one above capacity
        assert!((overflow_share_pct(&demand, 5.0) - 50.0).abs() < 1e-9);
        assert_eq!(overflow_share_pct(&[0.0; 4], 5.0), 0.0);
    }
}
