//! Fathom Analysis CLI
//!
//! Batch digital-twin analysis of a fronthaul deployment.
//!
//! - Loads per-cell telemetry captures, or generates a synthetic fleet
//! - Runs the pipeline: topology → capacity → attribution → risk
//! - Prints a staged human summary, optionally writing the JSON report
//! - Answers what-if traffic questions against the run or a saved report

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use fathom_engine::config::AnalysisConfig;
use fathom_engine::pipeline::Pipeline;
use fathom_engine::validate::{HeuristicCrossCheck, ValidationReport};
use fathom_engine::whatif::Baseline;
use fathom_model::models::CellSeries;
use fathom_model::report::{AnalysisReport, WhatIfOutcome, WhatIfRequest};

/// Fathom fronthaul analysis pipeline.
#[derive(Parser, Debug)]
#[command(name = "fathom", about = "Fronthaul digital-twin analysis")]
struct Cli {
    /// Directory of per-cell capture pairs
    /// (throughput-cell-<id>.dat / pkt-stats-cell-<id>.dat).
    #[arg(long, value_name = "DIR")]
    captures: Option<PathBuf>,

    /// Generate a synthetic fleet instead of reading captures.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Synthetic scenario: paired, steady, microburst, hog, stray.
    #[arg(long, default_value = "paired")]
    scenario: String,

    /// Seed for the synthetic fleet.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Analysis configuration TOML; defaults apply when omitted.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the full analysis report as JSON.
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Scale one cell's traffic in a what-if re-estimation,
    /// e.g. `--what-if 7=1.4`. Repeatable.
    #[arg(long = "what-if", value_name = "CELL=MULT")]
    what_if: Vec<String>,

    /// Answer what-if questions against a saved report instead of
    /// running the pipeline.
    #[arg(long, value_name = "FILE")]
    baseline: Option<PathBuf>,

    /// Cross-check topology and capacity against the independent
    /// heuristic estimator.
    #[arg(long, default_value_t = false)]
    validate: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let request = what_if_request(&cli.what_if)?;

    // Saved-report mode: no telemetry needed, what-if only.
    if let Some(path) = &cli.baseline {
        if request.traffic_multipliers.is_empty() {
            bail!("--baseline needs at least one --what-if CELL=MULT to answer");
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading baseline report {}", path.display()))?;
        let report: AnalysisReport = serde_json::from_str(&text)
            .with_context(|| format!("decoding baseline report {}", path.display()))?;
        let baseline = Baseline::from_report(&report, config);
        print_what_if(&baseline.what_if(&request));
        return Ok(());
    }

    let cells = load_cells(&cli)?;
    let analysis = Pipeline::new(config).run(&cells)?;
    print_summary(&analysis.report);

    if cli.validate {
        print_validation(&analysis.cross_check(&HeuristicCrossCheck));
    }

    if let Some(path) = &cli.output {
        let json = serde_json::to_string_pretty(&analysis.report)?;
        fs::write(path, json).with_context(|| format!("writing report {}", path.display()))?;
        println!("\nReport written to {}", path.display());
    }

    if !request.traffic_multipliers.is_empty() {
        print_what_if(&analysis.baseline.what_if(&request));
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<AnalysisConfig> {
    let Some(path) = path else {
        return Ok(AnalysisConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    AnalysisConfig::from_toml_str(&text).map_err(|e| anyhow::anyhow!(e))
}

fn load_cells(cli: &Cli) -> anyhow::Result<Vec<CellSeries>> {
    if cli.simulate && cli.captures.is_some() {
        bail!("--simulate and --captures are mutually exclusive");
    }
    if cli.simulate {
        use fathom_sim::scenarios;
        let fleet = match cli.scenario.as_str() {
            "paired" => scenarios::paired_loss_fleet(cli.seed),
            "steady" => scenarios::steady_fleet(cli.seed),
            "microburst" => scenarios::microburst_fleet(cli.seed),
            "hog" => scenarios::hog_fleet(cli.seed),
            "stray" => scenarios::stray_cell_fleet(cli.seed),
            other => bail!(
                "unknown scenario {other:?}; expected paired, steady, microburst, hog, or stray"
            ),
        };
        let cells = scenarios::generate(fleet);
        tracing::info!(
            scenario = %cli.scenario,
            seed = cli.seed,
            n_cells = cells.len(),
            "generated synthetic fleet"
        );
        return Ok(cells);
    }
    let Some(dir) = &cli.captures else {
        bail!("either --captures <DIR> or --simulate is required");
    };
    // Full span: correlation needs every loss episode; the capacity
    // stage applies its own observation window.
    fathom_ingest::loader::load_fleet(dir, None)
        .with_context(|| format!("loading captures from {}", dir.display()))
}

/// Parse repeated `CELL=MULT` arguments into a what-if request.
///
/// Cell ids stay strings; the engine validates them against the
/// baseline topology.
fn what_if_request(entries: &[String]) -> anyhow::Result<WhatIfRequest> {
    let mut traffic_multipliers = BTreeMap::new();
    for entry in entries {
        let Some((cell, mult)) = entry.split_once('=') else {
            bail!("--what-if expects CELL=MULT, got {entry:?}");
        };
        let mult: f64 = mult
            .trim()
            .parse()
            .with_context(|| format!("--what-if {entry:?}: multiplier is not a number"))?;
        traffic_multipliers.insert(cell.trim().to_string(), mult);
    }
    Ok(WhatIfRequest {
        traffic_multipliers,
    })
}

// ─── Summary printing ───────────────────────────────────────────────────────

fn print_summary(report: &AnalysisReport) {
    println!("Step 1: Inferring fronthaul topology (correlated packet loss)...");
    println!("  Topology:");
    for (link_id, members) in &report.topology {
        println!("    Link {link_id}: cells {members:?}");
    }
    println!("  Topology Confidence:");
    for (link_id, confidence) in &report.topology_confidence {
        println!("    Link {link_id}: {confidence}%");
    }
    if !report.outliers.is_empty() {
        println!("  Topology Outlier Detection:");
        for outlier in &report.outliers {
            println!(
                "    Cell {} (Link {}): <{:.2} correlation with any group",
                outlier.cell_id, outlier.link_id, outlier.max_correlation
            );
        }
    }

    println!("\nStep 2: Estimating link capacity for <=1% packet loss...");
    println!("  Capacity (Gbps):");
    for (link_id, no_buf) in &report.capacity_no_buf {
        let with_buf = report
            .capacity_with_buf
            .get(link_id)
            .copied()
            .unwrap_or(*no_buf);
        let approx = if report.approximate_capacity.contains(link_id) {
            " (approximate)"
        } else {
            ""
        };
        println!("    Link {link_id}: no buffer = {no_buf:.2}, with buffer = {with_buf:.2}{approx}");
    }
    println!("  Bandwidth Savings via Buffering:");
    for (link_id, pct) in &report.bandwidth_savings_pct {
        println!("    Link {link_id}: {pct}%");
    }
    if report.root_cause_attribution.values().any(|e| !e.is_empty()) {
        println!("  Root-Cause Attribution (sample congestion events):");
        for (link_id, events) in &report.root_cause_attribution {
            for event in events.iter().take(2) {
                let contributors = event
                    .contributors
                    .iter()
                    .map(|c| format!("Cell {}: {:.0}%", c.cell_id, c.pct))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "    Congestion @ t={:.1}s (Link {link_id}): {contributors}",
                    event.time_sec
                );
            }
        }
    }

    println!("\nStep 3: Scoring link risk...");
    println!("  Risk Scores:");
    for (link_id, risk) in &report.risk_scores {
        println!(
            "    Link {link_id}: {:.0}/100 ({}) - {}",
            risk.score, risk.level(), risk.reason
        );
    }
    println!("  Congestion Fingerprint:");
    for (link_id, fingerprint) in &report.congestion_fingerprint {
        println!("    Link {link_id}: {fingerprint}");
    }
    println!("  Recommendations:");
    for actions in report.recommendations.values() {
        for action in actions {
            println!("    - {action}");
        }
    }
}

fn print_what_if(outcome: &WhatIfOutcome) {
    println!("\nWhat-if re-estimation:");
    match outcome {
        WhatIfOutcome::Ready(report) => {
            println!("  Capacity with buffer (Gbps):");
            for (link_id, with_buf) in &report.capacity_with_buf {
                println!("    Link {link_id}: {with_buf:.2}");
            }
            println!("  Risk Scores:");
            for (link_id, risk) in &report.risk_scores {
                println!(
                    "    Link {link_id}: {:.0}/100 ({}) - {}",
                    risk.score, risk.level(), risk.reason
                );
            }
            println!("  Recommendations:");
            for actions in report.recommendations.values() {
                for action in actions {
                    println!("    - {action}");
                }
            }
        }
        WhatIfOutcome::Unavailable { reason } => {
            println!("  Unavailable: {reason}");
        }
    }
}

fn print_validation(validation: &ValidationReport) {
    println!("\nCross-check (independent heuristic estimator):");
    let topology = &validation.topology;
    println!(
        "  Topology agreement: {:.0}% over {} cell pairs{}",
        topology.agreement_pct,
        topology.n_pairs,
        note(&topology.note)
    );
    let capacity = &validation.capacity;
    println!(
        "  Capacity error: {:.2} Gbps MAE, {:.0}% MAPE over {} links{}",
        capacity.mae_gbps,
        capacity.mape_pct,
        capacity.n_links,
        note(&capacity.note)
    );
}

fn note(note: &Option<String>) -> String {
    note.as_ref()
        .map_or_else(String::new, |n| format!(" ({n})"))
}
