//! Engine tuning knobs with a versioned TOML input layer.
//!
//! Every analysis parameter has a documented default matching the studied
//! deployment; a config file only needs to name what it overrides.

use std::collections::BTreeMap;

use fathom_model::models::{CellId, LinkId};
use serde::Deserialize;

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnalysisConfigInput {
    pub version: u32,
    pub max_loss_pct: Option<f64>,
    pub bucket_sec: Option<f64>,
    pub max_shift_sec: Option<f64>,
    pub outlier_threshold: Option<f64>,
    pub window_sec: Option<f64>,
    pub capacity_epsilon_gbps: Option<f64>,
    pub max_search_iterations: Option<u32>,
    pub max_events_per_link: Option<usize>,
    pub dominant_contributor_pct: Option<f64>,
    /// Anchor hints as `cell id → link id`; TOML keys are strings.
    pub anchors: BTreeMap<String, LinkId>,
    pub risk: RiskWeightsInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RiskWeightsInput {
    pub overflow: Option<f64>,
    pub exhaustion: Option<f64>,
    pub burstiness: Option<f64>,
    pub overflow_norm_pct: Option<f64>,
    pub exhaustion_norm_pct: Option<f64>,
}

/// Weights and normalizers of the composite risk score.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskWeights {
    pub overflow: f64,
    pub exhaustion: f64,
    pub burstiness: f64,
    /// Overflow percentage that saturates its sub-score.
    pub overflow_norm_pct: f64,
    /// Buffer-exhaustion percentage that saturates its sub-score.
    pub exhaustion_norm_pct: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            overflow: 0.30,
            exhaustion: 0.40,
            burstiness: 0.30,
            overflow_norm_pct: 5.0,
            exhaustion_norm_pct: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub version: u32,
    /// Per-cell lossy-slot budget the capacity search must meet, percent.
    pub max_loss_pct: f64,
    /// Loss bucketing interval for correlation, seconds.
    pub bucket_sec: f64,
    /// Largest clock misalignment tolerated when correlating, seconds.
    pub max_shift_sec: f64,
    /// Below this best correlation a cell is flagged an outlier.
    pub outlier_threshold: f64,
    /// Observation window for capacity analysis; `None` analyzes everything.
    pub window_sec: Option<f64>,
    /// Binary-search convergence width, Gbps.
    pub capacity_epsilon_gbps: f64,
    pub max_search_iterations: u32,
    /// Congestion events serialized per link in the report.
    pub max_events_per_link: usize,
    /// A top contributor at or above this share makes a reassignment
    /// recommendation, percent.
    pub dominant_contributor_pct: f64,
    /// A-priori cell→link assignments that seed the clustering.
    pub anchors: BTreeMap<CellId, LinkId>,
    pub risk: RiskWeights,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            max_loss_pct: 1.0,
            bucket_sec: 0.2,
            max_shift_sec: 1.5,
            outlier_threshold: 0.3,
            window_sec: Some(60.0),
            capacity_epsilon_gbps: 1e-3,
            max_search_iterations: 60,
            max_events_per_link: 5,
            dominant_contributor_pct: 60.0,
            anchors: BTreeMap::new(),
            risk: RiskWeights::default(),
        }
    }
}

impl AnalysisConfigInput {
    pub fn resolve(self) -> Result<AnalysisConfig, String> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(format!("Unsupported config version {}", version));
        }

        let defaults = AnalysisConfig::default();

        let bucket_sec = self.bucket_sec.unwrap_or(defaults.bucket_sec);
        if bucket_sec <= 0.0 {
            return Err(format!("bucket_sec must be positive, got {}", bucket_sec));
        }
        let epsilon = self
            .capacity_epsilon_gbps
            .unwrap_or(defaults.capacity_epsilon_gbps);
        if epsilon <= 0.0 {
            return Err(format!(
                "capacity_epsilon_gbps must be positive, got {}",
                epsilon
            ));
        }

        let mut anchors = BTreeMap::new();
        for (key, link_id) in self.anchors {
            let cell_id: CellId = key
                .trim()
                .parse()
                .map_err(|_| format!("anchor key is not a cell id: {:?}", key))?;
            anchors.insert(cell_id, link_id);
        }

        let rd = RiskWeights::default();
        let risk = RiskWeights {
            overflow: self.risk.overflow.unwrap_or(rd.overflow),
            exhaustion: self.risk.exhaustion.unwrap_or(rd.exhaustion),
            burstiness: self.risk.burstiness.unwrap_or(rd.burstiness),
            overflow_norm_pct: self.risk.overflow_norm_pct.unwrap_or(rd.overflow_norm_pct),
            exhaustion_norm_pct: self
                .risk
                .exhaustion_norm_pct
                .unwrap_or(rd.exhaustion_norm_pct),
        };

        // window_sec = 0 in a file means "no window"
        let window_sec = match self.window_sec {
            Some(w) if w <= 0.0 => None,
            Some(w) => Some(w),
            None => defaults.window_sec,
        };

        Ok(AnalysisConfig {
            version,
            max_loss_pct: self.max_loss_pct.unwrap_or(defaults.max_loss_pct),
            bucket_sec,
            max_shift_sec: self.max_shift_sec.unwrap_or(defaults.max_shift_sec),
            outlier_threshold: self.outlier_threshold.unwrap_or(defaults.outlier_threshold),
            window_sec,
            capacity_epsilon_gbps: epsilon,
            max_search_iterations: self
                .max_search_iterations
                .unwrap_or(defaults.max_search_iterations),
            max_events_per_link: self
                .max_events_per_link
                .unwrap_or(defaults.max_events_per_link),
            dominant_contributor_pct: self
                .dominant_contributor_pct
                .unwrap_or(defaults.dominant_contributor_pct),
            anchors,
            risk,
        })
    }
}

impl AnalysisConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(AnalysisConfig::default());
        }
        let parsed: AnalysisConfigInput =
            toml::from_str(input).map_err(|e| format!("Invalid config TOML: {}", e))?;
        parsed.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_defaults() {
        let cfg = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AnalysisConfig::default());
        assert_eq!(cfg.max_loss_pct, 1.0);
        assert_eq!(cfg.window_sec, Some(60.0));
        assert!(cfg.anchors.is_empty());
    }

    #[test]
    fn parse_toml_config_basic() {
        let toml = r#"
            version = 1
            max_loss_pct = 0.5
            window_sec = 30.0
            max_events_per_link = 3

            [anchors]
            1 = 2
            2 = 3

            [risk]
            exhaustion = 0.5
        "#;

        let cfg = AnalysisConfig::from_toml_str(toml).unwrap();
        assert_eq!(cfg.max_loss_pct, 0.5);
        assert_eq!(cfg.window_sec, Some(30.0));
        assert_eq!(cfg.max_events_per_link, 3);
        assert_eq!(cfg.anchors.get(&1), Some(&2));
        assert_eq!(cfg.anchors.get(&2), Some(&3));
        assert_eq!(cfg.risk.exhaustion, 0.5);
        // untouched weights keep their defaults
        assert_eq!(cfg.risk.overflow, 0.30);
    }

    #[test]
    fn zero_window_disables_the_window() {
        let cfg = AnalysisConfig::from_toml_str("window_sec = 0.0").unwrap();
        assert_eq!(cfg.window_sec, None);
    }

    #[test]
    fn unsupported_version_rejected() {
        let err = AnalysisConfig::from_toml_str("version = 99").unwrap_err();
        assert!(err.contains("Unsupported config version"), "err: {err}");
    }

    #[test]
    fn bad_anchor_key_rejected() {
        let toml = r#"
            [anchors]
            "cell-seven" = 1
        "#;
        let err = AnalysisConfig::from_toml_str(toml).unwrap_err();
        assert!(err.contains("anchor key"), "err: {err}");
    }

    #[test]
    fn nonpositive_bucket_rejected() {
        assert!(AnalysisConfig::from_toml_str("bucket_sec = 0.0").is_err());
    }
}
