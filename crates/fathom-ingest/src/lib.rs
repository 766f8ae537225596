//! Telemetry capture ingestion.
//!
//! Parses per-cell `.dat` capture pairs (symbol-level throughput and
//! slot-level packet stats) into [`fathom_model::models::CellSeries`]
//! records for the analysis pipeline.

pub mod error;
pub mod loader;
