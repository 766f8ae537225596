//! Engine error taxonomy.
//!
//! Only unrecoverable input problems are errors. A capacity search that
//! stops before converging is logged and flagged `approximate` on the
//! result, and a what-if question the baseline cannot answer returns
//! [`fathom_model::report::WhatIfOutcome::Unavailable`] — neither is an
//! `Err`.

use thiserror::Error;

/// Errors surfaced by the analysis engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input telemetry is unusable: empty series, misaligned vectors,
    /// out-of-range values, or too little pairwise overlap to correlate.
    #[error("telemetry error: {0}")]
    Data(String),

    /// Clustering preconditions are not met (e.g. fewer cells than links).
    #[error("topology error: {0}")]
    Topology(String),
}
