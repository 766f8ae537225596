//! Analysis engine for the Fathom fronthaul digital twin.
//!
//! This crate contains:
//! - **Correlation & topology** — bucketed loss correlation and cell→link clustering
//! - **Demand & capacity** — slot-grid demand aggregation and buffer-aware capacity search
//! - **Congestion analysis** — root-cause attribution, risk scoring, recommendations
//! - **What-if** — approximate re-estimation against a cached baseline
//! - **Validation** — independent cross-checks of topology and capacity estimates

pub mod attribution;
pub mod capacity;
pub mod config;
pub mod correlation;
pub mod demand;
pub mod error;
pub mod pipeline;
pub mod recommend;
pub mod risk;
pub mod stats;
pub mod topology;
pub mod validate;
pub mod whatif;
