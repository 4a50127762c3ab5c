//! Output formatting and persistence for discrepancy reports.
//!
//! Supports logging the report, writing it as JSON or HTML, and appending a
//! per-source summary to a CSV history.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::report::text::{TracingSink, emit_text};
use crate::report::{DiscrepancyReport, SourceStatus};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One CSV row: the outcome of one source in one pass.
///
/// Class counts are empty when they could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    pub timestamp: String,
    pub source: String,
    pub source_status: String,
    pub baseline_valid: bool,
    pub active_trips: usize,
    pub records: usize,
    pub orphans: usize,
    pub malformed: usize,
    pub trips_seen: Option<usize>,
    pub trips_matched: Option<usize>,
    pub missing_active: Option<usize>,
    pub invalid: Option<usize>,
    pub without_detail: Option<usize>,
}

impl SummaryRow {
    pub fn rows(report: &DiscrepancyReport) -> Vec<SummaryRow> {
        let timestamp = report.now.format("%Y-%m-%dT%H:%M:%S").to_string();
        report
            .sources
            .iter()
            .map(|source| {
                let d = source.trips.computed();
                SummaryRow {
                    timestamp: timestamp.clone(),
                    source: source.source.as_str().to_string(),
                    source_status: match source.status {
                        SourceStatus::Ok => "ok".to_string(),
                        SourceStatus::Unavailable { .. } => "unavailable".to_string(),
                    },
                    baseline_valid: report.baseline_valid,
                    active_trips: report.baseline.active_trips.len(),
                    records: source.total_records,
                    orphans: source.orphan_count,
                    malformed: source.malformed_count,
                    trips_seen: d.map(|d| d.trips_seen),
                    trips_matched: d.map(|d| d.trips_matched),
                    missing_active: d.map(|d| d.missing_active.len()),
                    invalid: d.map(|d| d.invalid.len()),
                    without_detail: d.map(|d| d.without_detail.len()),
                }
            })
            .collect()
    }
}

/// Logs the report line by line.
pub fn print_text(report: &DiscrepancyReport) -> Result<()> {
    emit_text(report, &mut TracingSink)?;
    Ok(())
}

/// Logs the report using Rust's debug pretty-print format.
pub fn print_pretty(report: &DiscrepancyReport) {
    debug!("{:#?}", report);
}

/// Logs the report as pretty-printed JSON.
pub fn print_json(report: &DiscrepancyReport) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

/// Writes the report as pretty-printed JSON, replacing any existing file.
pub fn write_json(path: &Path, report: &DiscrepancyReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "JSON report written");
    Ok(())
}

/// Writes an HTML page, creating the parent directory if needed.
pub fn write_html(path: &Path, html: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, html).with_context(|| format!("writing {}", path.display()))?;
    debug!(path = %path.display(), "HTML report written");
    Ok(())
}

/// Appends one [`SummaryRow`] per source to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_summary(path: &Path, report: &DiscrepancyReport) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending CSV summary");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    for row in SummaryRow::rows(report) {
        writer.serialize(row)?;
    }
    writer.flush()?;

    Ok(())
}
