//! Shared types for the Fathom fronthaul digital twin.
//!
//! This crate contains:
//! - **Fronthaul timing** — O-RAN slot/symbol durations and the switch buffer window
//! - **Telemetry models** — per-cell demand/loss series as produced by the loaders
//! - **Analysis models** — correlation matrix, link topology, capacity, congestion, risk
//! - **Report documents** — the versioned JSON analysis report and what-if types

pub mod models;
pub mod report;
