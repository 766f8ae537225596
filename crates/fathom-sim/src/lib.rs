//! Synthetic fleet generation for analysis testing.
//!
//! Provides deterministic per-cell telemetry on the 500 µs slot grid
//! and canned fleet templates for exercising topology recovery,
//! capacity estimation, and congestion attribution.

pub mod fleet;
pub mod scenarios;
