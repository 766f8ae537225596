//! Analysis models for the Fathom digital twin.
//!
//! These types flow between the loaders (which produce telemetry series),
//! the engine (which produces topology/capacity/risk results), and the
//! report document in [`crate::report`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Fronthaul timing ────────────────────────────────────────────────

/// One 5G slot (TTI) on the fronthaul, in seconds.
pub const SLOT_DURATION_SEC: f64 = 500.0e-6;

/// OFDM symbols per slot.
pub const SYMBOLS_PER_SLOT: f64 = 14.0;

/// One OFDM symbol, in seconds (~35.7 µs).
pub const SYMBOL_DURATION_SEC: f64 = SLOT_DURATION_SEC / SYMBOLS_PER_SLOT;

/// Switch egress buffer depth, in symbols.
pub const BUFFER_SYMBOLS: f64 = 4.0;

/// Switch egress buffer depth as a time window (~143 µs).
pub const BUFFER_WINDOW_SEC: f64 = BUFFER_SYMBOLS * SYMBOL_DURATION_SEC;

/// Fronthaul links in the deployment under study.
pub const NUM_LINKS: usize = 3;

/// Demand below this is treated as an idle slot (Gbps).
pub const TRAFFIC_FLOOR_GBPS: f64 = 0.01;

/// A fronthaul link identifier (1-based).
pub type LinkId = u32;

/// A radio cell identifier (1-based).
pub type CellId = u32;

// ── Telemetry ───────────────────────────────────────────────────────

/// Time-aligned per-cell telemetry on the slot grid.
///
/// The three vectors share one index: `time_sec[i]` is the slot timestamp,
/// `loss_fraction[i]` the fraction of that slot's packets lost (0..=1,
/// binary for loaders that only see a lost/clean flag), and
/// `demand_gbps[i]` the offered fronthaul load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellSeries {
    pub cell_id: CellId,
    pub time_sec: Vec<f64>,
    pub loss_fraction: Vec<f64>,
    pub demand_gbps: Vec<f64>,
}

impl CellSeries {
    pub fn len(&self) -> usize {
        self.time_sec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_sec.is_empty()
    }

    /// First and last sample timestamps, if any samples exist.
    pub fn span(&self) -> Option<(f64, f64)> {
        match (self.time_sec.first(), self.time_sec.last()) {
            (Some(&first), Some(&last)) => Some((first, last)),
            _ => None,
        }
    }
}

// ── Correlation ─────────────────────────────────────────────────────

/// Symmetric pairwise loss-correlation matrix over all observed cells.
///
/// `matrix[i][j]` is the shift-tolerant correlation between
/// `cells[i]` and `cells[j]`; the diagonal is 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub cells: Vec<CellId>,
    pub matrix: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Row/column index of a cell in the matrix.
    pub fn index_of(&self, cell: CellId) -> Option<usize> {
        self.cells.iter().position(|&c| c == cell)
    }

    /// Correlation between two cells by id.
    pub fn get(&self, a: CellId, b: CellId) -> Option<f64> {
        let i = self.index_of(a)?;
        let j = self.index_of(b)?;
        Some(self.matrix[i][j])
    }

    /// Copy with every entry rounded to `decimals` places, for reports.
    pub fn rounded(&self, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        Self {
            cells: self.cells.clone(),
            matrix: self
                .matrix
                .iter()
                .map(|row| row.iter().map(|v| (v * factor).round() / factor).collect())
                .collect(),
        }
    }
}

// ── Topology ────────────────────────────────────────────────────────

/// A cell whose loss pattern matches no link cluster well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierCell {
    pub link_id: LinkId,
    pub cell_id: CellId,
    pub max_correlation: f64,
}

/// Inferred cell→link assignment with per-link confidence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkTopology {
    /// Member cells per link, sorted ascending.
    pub members: BTreeMap<LinkId, Vec<CellId>>,
    /// Per-link confidence in percent (0..=100).
    pub confidence: BTreeMap<LinkId, u32>,
    /// Cells flagged as poorly matched to their assigned cluster.
    pub outliers: Vec<OutlierCell>,
}

impl LinkTopology {
    /// The link a cell was assigned to, if any.
    pub fn link_of(&self, cell: CellId) -> Option<LinkId> {
        self.members
            .iter()
            .find(|(_, cells)| cells.contains(&cell))
            .map(|(&link, _)| link)
    }

    pub fn n_cells(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ── Capacity ────────────────────────────────────────────────────────

/// Capacity estimates for one link at the ≤1% loss target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCapacity {
    /// Provisioning needed with no buffering: p99 of aggregate demand.
    pub no_buffer_gbps: f64,
    /// Minimal capacity that meets the loss target with the switch buffer.
    pub with_buffer_gbps: f64,
    /// Rounded savings of buffered vs unbuffered provisioning.
    pub savings_pct: u32,
    /// True when the capacity search stopped before converging.
    pub approximate: bool,
}

impl LinkCapacity {
    /// Build a result, deriving the savings percentage.
    pub fn new(no_buffer_gbps: f64, with_buffer_gbps: f64, approximate: bool) -> Self {
        let savings_pct = if no_buffer_gbps > 0.0 {
            let pct = 100.0 * (no_buffer_gbps - with_buffer_gbps) / no_buffer_gbps;
            pct.round().max(0.0) as u32
        } else {
            0
        };
        Self {
            no_buffer_gbps,
            with_buffer_gbps,
            savings_pct,
            approximate,
        }
    }
}

/// Per-link capacity estimates keyed by link id.
pub type CapacityResult = BTreeMap<LinkId, LinkCapacity>;

// ── Congestion ──────────────────────────────────────────────────────

/// One cell's share of the demand excess during a congestion event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub cell_id: CellId,
    /// Share of total excess demand, in percent.
    pub pct: f64,
}

/// A contiguous window in which aggregate demand exceeded link capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionEvent {
    pub link_id: LinkId,
    /// Timestamp of the first overloaded slot in the window.
    pub time_sec: f64,
    /// Contributing cells ordered by descending share.
    pub contributors: Vec<Contributor>,
}

/// Coarse shape of a link's congestion, for operator triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CongestionFingerprint {
    NoTraffic,
    NoCongestion,
    BufferBottleneck,
    SynchronizedPeaks,
}

impl std::fmt::Display for CongestionFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CongestionFingerprint::NoTraffic => write!(f, "No traffic"),
            CongestionFingerprint::NoCongestion => write!(f, "No congestion"),
            CongestionFingerprint::BufferBottleneck => write!(f, "Switch buffer bottleneck"),
            CongestionFingerprint::SynchronizedPeaks => write!(f, "Synchronized traffic peaks"),
        }
    }
}

impl std::str::FromStr for CongestionFingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "No traffic" => Ok(CongestionFingerprint::NoTraffic),
            "No congestion" => Ok(CongestionFingerprint::NoCongestion),
            "Switch buffer bottleneck" => Ok(CongestionFingerprint::BufferBottleneck),
            "Synchronized traffic peaks" => Ok(CongestionFingerprint::SynchronizedPeaks),
            other => Err(format!("unknown congestion fingerprint: {other}")),
        }
    }
}

// ── Risk ────────────────────────────────────────────────────────────

/// Risk band derived from the 0–100 composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Banding: `< 40` Low, `40..70` Medium, `>= 70` High.
    pub fn from_score(score: f64) -> Self {
        if score >= 70.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "Low"),
            RiskLevel::Medium => write!(f, "Medium"),
            RiskLevel::High => write!(f, "High"),
        }
    }
}

/// Composite congestion-risk score for one link.
///
/// The document stores score and reason only; the band is always
/// derivable, so [`RiskScore::level`] recomputes it on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    /// 0–100, already rounded to one decimal.
    pub score: f64,
    /// Names the dominant risk driver.
    pub reason: String,
}

impl RiskScore {
    pub fn new(score: f64, reason: impl Into<String>) -> Self {
        Self {
            score,
            reason: reason.into(),
        }
    }

    /// Risk band for this score.
    pub fn level(&self) -> RiskLevel {
        RiskLevel::from_score(self.score)
    }
}
