//! The versioned analysis report and what-if documents.
//!
//! All documents are JSON-encoded. Decoding is tolerant: every field has a
//! default so older or partial documents still load, and unknown fields are
//! ignored. Map keys are link ids (serialized as strings in JSON).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{CellId, CongestionEvent, CorrelationMatrix, LinkId, OutlierCell, RiskScore};

/// Current report schema version.
pub const REPORT_VERSION: u32 = 1;

// ── Report sections ─────────────────────────────────────────────────

/// Downsampled aggregate demand for one link, for sparkline rendering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficTrace {
    pub time_sec: Vec<f64>,
    pub demand_gbps: Vec<f64>,
}

/// Downsampled bucketed loss per member cell of one link, on a shared
/// time axis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LossTrace {
    pub time_sec: Vec<f64>,
    pub cells: BTreeMap<CellId, Vec<f64>>,
}

// ── Analysis report ─────────────────────────────────────────────────

/// The complete analysis document produced by one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisReport {
    pub version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,

    /// Member cells per link, sorted ascending.
    pub topology: BTreeMap<LinkId, Vec<CellId>>,
    /// Per-link clustering confidence in percent.
    pub topology_confidence: BTreeMap<LinkId, u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outliers: Vec<OutlierCell>,

    /// p99 provisioning per link, Gbps, rounded to 2 decimals.
    pub capacity_no_buf: BTreeMap<LinkId, f64>,
    /// Buffer-aware provisioning per link, Gbps, rounded to 2 decimals.
    pub capacity_with_buf: BTreeMap<LinkId, f64>,
    pub bandwidth_savings_pct: BTreeMap<LinkId, u32>,
    /// Links whose capacity search stopped before converging.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub approximate_capacity: Vec<LinkId>,

    pub risk_scores: BTreeMap<LinkId, RiskScore>,
    pub recommendations: BTreeMap<LinkId, Vec<String>>,
    /// Human-readable congestion fingerprint per link.
    pub congestion_fingerprint: BTreeMap<LinkId, String>,
    /// Congestion event windows per link, capped and rounded for display.
    pub root_cause_attribution: BTreeMap<LinkId, Vec<CongestionEvent>>,

    pub traffic_summary: BTreeMap<LinkId, TrafficTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_matrix: Option<CorrelationMatrix>,
    pub loss_correlation_over_time: BTreeMap<LinkId, LossTrace>,
}

impl AnalysisReport {
    /// Create an empty report stamped with the current schema version
    /// and generation time.
    pub fn new() -> Self {
        Self {
            version: REPORT_VERSION,
            generated_at: Some(Utc::now()),
            ..Default::default()
        }
    }
}

// ── What-if documents ───────────────────────────────────────────────

/// A what-if question: per-cell traffic multipliers, keyed by cell id.
///
/// Keys are strings so hand-written JSON like `{"7": 1.4}` decodes
/// directly; the engine parses and validates them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatIfRequest {
    pub traffic_multipliers: BTreeMap<String, f64>,
}

/// The restricted re-analysis returned for a what-if question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatIfReport {
    pub topology: BTreeMap<LinkId, Vec<CellId>>,
    pub capacity_no_buf: BTreeMap<LinkId, f64>,
    pub capacity_with_buf: BTreeMap<LinkId, f64>,
    pub bandwidth_savings_pct: BTreeMap<LinkId, u32>,
    pub risk_scores: BTreeMap<LinkId, RiskScore>,
    pub recommendations: BTreeMap<LinkId, Vec<String>>,
}

/// Outcome of a what-if question against a baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WhatIfOutcome {
    /// The baseline held enough demand evidence to re-estimate.
    Ready(WhatIfReport),
    /// The baseline lacks a demand distribution; scalars alone cannot
    /// support the queue simulation.
    Unavailable { reason: String },
}

impl WhatIfOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, WhatIfOutcome::Ready(_))
    }
}
