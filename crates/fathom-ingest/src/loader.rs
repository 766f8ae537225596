//! # Telemetry Loading
//!
//! Turns a directory of per-cell capture pairs into [`CellSeries`]
//! records on the 500 µs slot grid:
//!
//! * `throughput-cell-<id>.dat` — whitespace-separated `timestamp kbit`
//!   rows, one per OFDM symbol that carried data;
//! * `pkt-stats-cell-<id>.dat` — one header row, then whitespace-
//!   separated `timestamp tx rx too_late` rows, one per slot.
//!
//! Rows are sorted by timestamp, implausibly high throughput readings
//! (metering glitches) are zeroed, symbol bits are accumulated onto the
//! slot grid 14 symbols at a time, and a slot is flagged lossy when its
//! packet statistics show `tx − rx + too_late > 0`. An optional window
//! trims long captures; by default the whole span is kept so the
//! correlation stage sees every loss episode.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fathom_model::models::{
    CellId, CellSeries, SLOT_DURATION_SEC, SYMBOLS_PER_SLOT, SYMBOL_DURATION_SEC,
};
use tracing::{debug, info, warn};

use crate::error::IngestError;

// ─── Discovery ──────────────────────────────────────────────────────────────

/// Cell ids with both capture files present in `dir`, ascending.
///
/// Cells with only one of the two files are skipped with a warning; the
/// pipeline needs demand and loss evidence together.
pub fn discover_cells(dir: &Path) -> Result<Vec<CellId>, IngestError> {
    let mut throughput = BTreeSet::new();
    let mut pkt_stats = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(id) = capture_id(name, "throughput-cell-") {
            throughput.insert(id);
        } else if let Some(id) = capture_id(name, "pkt-stats-cell-") {
            pkt_stats.insert(id);
        }
    }
    for &cell_id in throughput.symmetric_difference(&pkt_stats) {
        warn!(cell_id, "cell has only one of its two capture files; skipping");
    }
    Ok(throughput.intersection(&pkt_stats).copied().collect())
}

fn capture_id(name: &str, prefix: &str) -> Option<CellId> {
    name.strip_prefix(prefix)?.strip_suffix(".dat")?.parse().ok()
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Load one cell's capture pair from `dir`.
///
/// The returned series is empty when both files parse but hold no rows.
pub fn load_cell(
    dir: &Path,
    cell_id: CellId,
    window_sec: Option<f64>,
) -> Result<CellSeries, IngestError> {
    let throughput_path = capture_path(dir, "throughput-cell-", cell_id)?;
    let pkt_path = capture_path(dir, "pkt-stats-cell-", cell_id)?;

    let mut throughput = parse_throughput(&fs::read_to_string(&throughput_path)?, &throughput_path)?;
    let scrubbed = scrub_outliers(&mut throughput);
    let pkt_stats = parse_pkt_stats(&fs::read_to_string(&pkt_path)?, &pkt_path)?;

    let series = assemble(cell_id, &throughput, &pkt_stats, window_sec);
    debug!(
        cell_id,
        throughput_rows = throughput.len(),
        pkt_rows = pkt_stats.len(),
        scrubbed,
        n_slots = series.len(),
        "loaded cell captures"
    );
    Ok(series)
}

/// Load every discovered cell in `dir`, skipping cells whose captures
/// carry no samples.
pub fn load_fleet(dir: &Path, window_sec: Option<f64>) -> Result<Vec<CellSeries>, IngestError> {
    let ids = discover_cells(dir)?;
    let mut fleet = Vec::with_capacity(ids.len());
    for cell_id in ids {
        let series = load_cell(dir, cell_id, window_sec)?;
        if series.is_empty() {
            warn!(cell_id, "capture pair holds no samples; skipping cell");
            continue;
        }
        fleet.push(series);
    }
    info!(n_cells = fleet.len(), dir = %dir.display(), "loaded telemetry fleet");
    Ok(fleet)
}

fn capture_path(dir: &Path, prefix: &str, cell_id: CellId) -> Result<PathBuf, IngestError> {
    let path = dir.join(format!("{prefix}{cell_id}.dat"));
    if !path.is_file() {
        return Err(IngestError::MissingFile(path));
    }
    Ok(path)
}

// ─── Parsing ────────────────────────────────────────────────────────────────

/// Parse `timestamp kbit` rows, sorted by timestamp.
fn parse_throughput(input: &str, path: &Path) -> Result<Vec<(f64, f64)>, IngestError> {
    let mut rows = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(ts), Some(kbit)) = (fields.next(), fields.next()) else {
            return Err(parse_error(path, idx + 1, "expected `timestamp kbit`"));
        };
        let ts = parse_field(ts, path, idx + 1, "timestamp")?;
        let kbit = parse_field(kbit, path, idx + 1, "kbit reading")?;
        if kbit < 0.0 {
            return Err(parse_error(path, idx + 1, "negative throughput reading"));
        }
        rows.push((ts, kbit));
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(rows)
}

/// Parse `timestamp tx rx too_late` rows after the header row, sorted
/// by timestamp. The second element is the lost-packet count
/// `tx − rx + too_late`.
fn parse_pkt_stats(input: &str, path: &Path) -> Result<Vec<(f64, f64)>, IngestError> {
    let mut rows = Vec::new();
    for (idx, line) in input.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(ts), Some(tx), Some(rx), Some(late)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(parse_error(path, idx + 1, "expected `timestamp tx rx too_late`"));
        };
        let ts = parse_field(ts, path, idx + 1, "timestamp")?;
        let tx = parse_field(tx, path, idx + 1, "tx count")?;
        let rx = parse_field(rx, path, idx + 1, "rx count")?;
        let late = parse_field(late, path, idx + 1, "too-late count")?;
        rows.push((ts, tx - rx + late));
    }
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));
    Ok(rows)
}

fn parse_field(raw: &str, path: &Path, line: usize, what: &str) -> Result<f64, IngestError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| parse_error(path, line, &format!("unreadable {what}: {raw:?}")))?;
    if !value.is_finite() {
        return Err(parse_error(path, line, &format!("non-finite {what}")));
    }
    Ok(value)
}

fn parse_error(path: &Path, line: usize, message: &str) -> IngestError {
    IngestError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}

// ─── Preprocessing ──────────────────────────────────────────────────────────

/// Zero readings above max(2 × q99, 10 × median); symbols reporting
/// that much traffic are metering glitches, not demand. Returns the
/// number of readings zeroed.
fn scrub_outliers(rows: &mut [(f64, f64)]) -> usize {
    if rows.is_empty() {
        return 0;
    }
    let values: Vec<f64> = rows.iter().map(|r| r.1).collect();
    let q99 = quantile(&values, 0.99);
    let threshold = if q99 > 0.0 {
        (q99 * 2.0).max(quantile(&values, 0.5) * 10.0)
    } else {
        1e9
    };
    let mut scrubbed = 0;
    for row in rows.iter_mut() {
        if row.1 > threshold {
            row.1 = 0.0;
            scrubbed += 1;
        }
    }
    scrubbed
}

/// Linear-interpolation quantile (`q` in 0..=1) of unsorted values.
fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// ─── Grid assembly ──────────────────────────────────────────────────────────

/// Place both capture series on one slot grid starting at the earliest
/// sample of either file.
///
/// Symbol bits accumulate at their nearest symbol index and fold into
/// slots 14 at a time (a trailing partial slot is dropped); a slot's
/// loss flag is set when any packet-stats row inside it counted lost
/// packets.
fn assemble(
    cell_id: CellId,
    throughput: &[(f64, f64)],
    pkt_stats: &[(f64, f64)],
    window_sec: Option<f64>,
) -> CellSeries {
    let mut t0 = f64::INFINITY;
    let mut t1 = f64::NEG_INFINITY;
    for &(ts, _) in throughput.iter().chain(pkt_stats) {
        t0 = t0.min(ts);
        t1 = t1.max(ts);
    }
    if !t0.is_finite() || !t1.is_finite() {
        return empty_series(cell_id);
    }
    if let Some(window) = window_sec {
        t1 = t1.min(t0 + window);
    }

    let symbols_per_slot = SYMBOLS_PER_SLOT as usize;
    let n_symbols = ((t1 - t0) / SYMBOL_DURATION_SEC) as usize + 1;
    let n_slots = n_symbols / symbols_per_slot;
    if n_slots == 0 {
        return empty_series(cell_id);
    }

    let mut symbol_bits = vec![0.0f64; n_symbols];
    for &(ts, kbit) in throughput {
        if ts < t0 || ts > t1 {
            continue;
        }
        let idx = (((ts - t0) / SYMBOL_DURATION_SEC).round() as usize).min(n_symbols - 1);
        symbol_bits[idx] += kbit * 1000.0;
    }
    let demand_gbps: Vec<f64> = symbol_bits
        .chunks_exact(symbols_per_slot)
        .map(|slot| slot.iter().sum::<f64>() / (SLOT_DURATION_SEC * 1e9))
        .collect();

    let mut loss_fraction = vec![0.0f64; n_slots];
    for &(ts, lost) in pkt_stats {
        if ts < t0 || ts > t1 || lost <= 0.0 {
            continue;
        }
        let idx = ((ts - t0) / SLOT_DURATION_SEC).round() as usize;
        if idx < n_slots {
            loss_fraction[idx] = 1.0;
        }
    }

    let time_sec: Vec<f64> = (0..n_slots)
        .map(|i| t0 + (i as f64 + 0.5) * SLOT_DURATION_SEC)
        .collect();

    CellSeries {
        cell_id,
        time_sec,
        loss_fraction,
        demand_gbps,
    }
}

fn empty_series(cell_id: CellId) -> CellSeries {
    CellSeries {
        cell_id,
        time_sec: Vec::new(),
        loss_fraction: Vec::new(),
        demand_gbps: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn throughput_rows_are_sorted() {
        let rows = parse_throughput("2.0 5\n0.5 1\n1.0 3\n", Path::new("x.dat")).unwrap();
        assert_eq!(rows, vec![(0.5, 1.0), (1.0, 3.0), (2.0, 5.0)]);
    }

    #[test]
    fn malformed_row_names_its_line() {
        let err = parse_throughput("0.0 1.0\n0.5 banana\n", Path::new("cap/x.dat")).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("x.dat"), "path in message: {text}");
        assert!(text.contains(":2:"), "line number in message: {text}");
    }

    #[test]
    fn glitch_readings_are_zeroed() {
        let mut rows: Vec<(f64, f64)> = (0..100).map(|i| (i as f64, 10.0)).collect();
        rows.push((100.0, 1e6));
        // threshold = max(2 * 10, 10 * 10) = 100
        let scrubbed = scrub_outliers(&mut rows);
        assert_eq!(scrubbed, 1);
        assert_eq!(rows[100].1, 0.0);
        assert!(rows[..100].iter().all(|r| r.1 == 10.0));
    }

    #[test]
    fn zero_heavy_captures_keep_their_readings() {
        // q99 collapses to zero; the fallback threshold keeps real data
        let mut rows: Vec<(f64, f64)> = (0..100).map(|i| (i as f64, 0.0)).collect();
        rows.push((100.0, 5.0));
        assert_eq!(scrub_outliers(&mut rows), 0);
        assert_eq!(rows[100].1, 5.0);
    }

    #[test]
    fn pkt_stats_header_is_skipped_and_late_counts_as_lost() {
        let input = "slotStart txPackets rxPackets tooLateRxPackets\n\
                     0.0 100 100 0\n\
                     0.0005 100 100 2\n\
                     0.001 50 40 0\n";
        let rows = parse_pkt_stats(input, Path::new("p.dat")).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].1, 0.0, "clean slot");
        assert_eq!(rows[1].1, 2.0, "too-late packets count as lost");
        assert_eq!(rows[2].1, 10.0);
    }

    #[test]
    fn symbol_bits_sum_into_slots() {
        // 28 symbols of data plus an anchor past the second slot
        let mut throughput: Vec<(f64, f64)> = (0..28)
            .map(|i| {
                let kbit = if i < 14 { 1.0 } else { 2.0 };
                (i as f64 * SYMBOL_DURATION_SEC, kbit)
            })
            .collect();
        throughput.push((28.2 * SYMBOL_DURATION_SEC, 0.0));

        let series = assemble(1, &throughput, &[], None);
        assert_eq!(series.len(), 2);
        // 14 kbit over 500 µs = 0.028 Gbps
        assert!((series.demand_gbps[0] - 0.028).abs() < 1e-12);
        assert!((series.demand_gbps[1] - 0.056).abs() < 1e-12);
        assert!(series.loss_fraction.iter().all(|&l| l == 0.0));
        assert!((series.time_sec[0] - 0.5 * SLOT_DURATION_SEC).abs() < 1e-12);
    }

    #[test]
    fn trailing_partial_slot_is_dropped() {
        let mut throughput: Vec<(f64, f64)> =
            (0..20).map(|i| (i as f64 * SYMBOL_DURATION_SEC, 1.0)).collect();
        throughput.push((20.4 * SYMBOL_DURATION_SEC, 0.0));

        let series = assemble(1, &throughput, &[], None);
        assert_eq!(series.len(), 1, "six leftover symbols do not make a slot");
        assert!((series.demand_gbps[0] - 0.028).abs() < 1e-12);
    }

    #[test]
    fn loss_lands_on_its_slot() {
        let mut throughput: Vec<(f64, f64)> =
            (0..42).map(|i| (i as f64 * SYMBOL_DURATION_SEC, 1.0)).collect();
        throughput.push((42.3 * SYMBOL_DURATION_SEC, 0.0));
        let pkt = vec![
            (0.0, 0.0),
            (2.0 * SLOT_DURATION_SEC, 7.0),
        ];

        let series = assemble(1, &throughput, &pkt, None);
        assert_eq!(series.len(), 3);
        assert_eq!(series.loss_fraction, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn window_trims_the_tail() {
        let throughput = vec![(0.0, 5.0), (1.0, 7.0)];
        let series = assemble(1, &throughput, &[], Some(0.25));
        assert_eq!(series.len(), 500);
        assert!((series.demand_gbps[0] - 0.01).abs() < 1e-12);
        assert!(
            series.demand_gbps[1..].iter().all(|&d| d == 0.0),
            "the reading past the window contributes nothing"
        );
        assert!(*series.time_sec.last().unwrap() < 0.25);
    }

    #[test]
    fn empty_captures_yield_an_empty_series() {
        let series = assemble(9, &[], &[], None);
        assert!(series.is_empty());
        assert_eq!(series.cell_id, 9);
    }

    #[test]
    fn missing_capture_file_is_reported() {
        let err = load_cell(Path::new("/nonexistent-fathom-captures"), 7, None).unwrap_err();
        assert!(matches!(err, IngestError::MissingFile(_)));
        assert!(err.to_string().contains("throughput-cell-7.dat"), "err: {err}");
    }

    // ─── Filesystem round trip ──────────────────────────────────────────

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fathom-ingest-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn fleet_discovery_requires_both_files() {
        let dir = scratch_dir("discover");
        // the second pkt row extends each cell's span to one full slot
        let pkt = "slotStart txPackets rxPackets tooLateRxPackets\n\
                   0.0 100 100 0\n\
                   0.0005 100 95 0\n";
        std::fs::write(dir.join("throughput-cell-1.dat"), "0.0 12.5\n0.000036 8.0\n").unwrap();
        std::fs::write(dir.join("pkt-stats-cell-1.dat"), pkt).unwrap();
        std::fs::write(dir.join("throughput-cell-2.dat"), "0.0 4.0\n").unwrap();
        std::fs::write(dir.join("pkt-stats-cell-2.dat"), pkt).unwrap();
        // cell 9 has throughput only, and stray files are ignored
        std::fs::write(dir.join("throughput-cell-9.dat"), "0.0 1.0\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "capture session 4\n").unwrap();

        assert_eq!(discover_cells(&dir).unwrap(), vec![1, 2]);

        let fleet = load_fleet(&dir, None).unwrap();
        assert_eq!(fleet.len(), 2);
        assert_eq!(fleet[0].cell_id, 1);
        assert!(fleet.iter().all(|s| !s.is_empty()));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn sampleless_cells_are_skipped_by_the_fleet_loader() {
        let dir = scratch_dir("sampleless");
        std::fs::write(dir.join("throughput-cell-4.dat"), "").unwrap();
        std::fs::write(
            dir.join("pkt-stats-cell-4.dat"),
            "slotStart txPackets rxPackets tooLateRxPackets\n",
        )
        .unwrap();

        assert_eq!(discover_cells(&dir).unwrap(), vec![4]);
        assert!(load_cell(&dir, 4, None).unwrap().is_empty());
        assert!(load_fleet(&dir, None).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }
}
