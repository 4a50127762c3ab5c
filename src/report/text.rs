//! Line-oriented rendering of a [`DiscrepancyReport`].

use std::io::Write;

use super::{AlertsReport, BaselineStatus, DiscrepancyReport, SourceReport, SourceStatus, TripCheck};

/// Destination of rendered report lines.
pub trait ReportSink {
    fn line(&mut self, line: &str) -> std::io::Result<()>;
}

impl ReportSink for Vec<String> {
    fn line(&mut self, line: &str) -> std::io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }
}

/// Writes each line, newline-terminated, to any [`Write`].
pub struct WriterSink<W: Write>(pub W);

impl<W: Write> ReportSink for WriterSink<W> {
    fn line(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.0, "{line}")
    }
}

/// Sends each line to the log at info level.
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn line(&mut self, line: &str) -> std::io::Result<()> {
        tracing::info!("{line}");
        Ok(())
    }
}

const RULE: &str = "------------------------------------------------------";
const SECTION: &str = "--------";

/// Renders the report as one line per discrepancy plus summary counts.
pub fn emit_text(report: &DiscrepancyReport, sink: &mut dyn ReportSink) -> std::io::Result<()> {
    sink.line(RULE)?;
    sink.line(&report.now.format("%Y-%m-%d %H:%M").to_string())?;
    sink.line(&format!(
        "window {} to {}",
        report.window_start.format("%H:%M"),
        report.window_end.format("%H:%M")
    ))?;
    sink.line(SECTION)?;
    sink.line("GTFS")?;

    match &report.baseline.status {
        BaselineStatus::Valid => {
            sink.line(&format!(
                "{} total active trip ids",
                report.baseline.active_trips.len()
            ))?;
            for trip in &report.baseline.active_trips {
                sink.line(&format!(
                    "trip_id: {} start: {} end: {}",
                    trip.trip_id,
                    trip.start.format("%H:%M"),
                    trip.end.format("%H:%M")
                ))?;
            }
        }
        BaselineStatus::Empty => {
            sink.line("WARNING: no trips are scheduled in the window, baseline is not valid")?;
        }
        BaselineStatus::Invalid { reason } => {
            sink.line(&format!("schedule baseline unavailable: {reason}"))?;
        }
    }

    for source in &report.sources {
        emit_source(source, sink)?;
    }

    match &report.alerts {
        AlertsReport::NotRequested => {}
        AlertsReport::Ok { alerts } => {
            sink.line(SECTION)?;
            sink.line("GTFS-RT Alerts")?;
            sink.line(&format!("{} alerts", alerts.len()))?;
            for alert in alerts {
                let header = if alert.header.is_empty() {
                    "(no text)"
                } else {
                    alert.header.as_str()
                };
                sink.line(&format!(
                    "alert {}: {header} ({} informed entities)",
                    alert.entity_id, alert.informed_entities
                ))?;
            }
        }
        AlertsReport::Unavailable { reason } => {
            sink.line(SECTION)?;
            sink.line("GTFS-RT Alerts")?;
            sink.line(&format!("source unavailable: {reason}"))?;
        }
    }

    sink.line(RULE)
}

fn emit_source(source: &SourceReport, sink: &mut dyn ReportSink) -> std::io::Result<()> {
    let title = source.source.title();
    sink.line(SECTION)?;
    sink.line(title)?;

    if let SourceStatus::Unavailable { reason } = &source.status {
        return sink.line(&format!("source unavailable: {reason}"));
    }

    if let Some(total) = source.extras.total_entities {
        sink.line(&format!("{total} total entities"))?;
    }
    if let Some(total) = source.extras.total_vehicles {
        sink.line(&format!("{total} total vehicles"))?;
    }
    if let Some(with_stops) = source.extras.with_stop_info {
        sink.line(&format!("{with_stops} vehicles with stop info"))?;
    }
    if let Some(working) = source.extras.with_current_work {
        sink.line(&format!("{working} vehicles with current work"))?;
    }
    sink.line(&format!("{} total records in source", source.total_records))?;
    sink.line(&format!("{} records without a trip id", source.orphan_count))?;

    if source.malformed_count > 0 {
        sink.line(&format!("{} malformed records skipped", source.malformed_count))?;
        for reason in &source.malformed {
            sink.line(&format!("skipped {reason}"))?;
        }
    }

    match &source.trips {
        TripCheck::NotComputable { reason } => {
            sink.line(&format!("trip checks not computed: {}", reason.as_str()))?;
        }
        TripCheck::Computed(d) => {
            sink.line(&format!(
                "{} trips seen, {} matched, {} missing, {} invalid, {} without {}",
                d.trips_seen,
                d.trips_matched,
                d.missing_active.len(),
                d.invalid.len(),
                d.without_detail.len(),
                source.source.detail_label()
            ))?;
            for id in &d.missing_active {
                sink.line(&format!("active trip id {id} not in {title}"))?;
            }
            for id in &d.invalid {
                sink.line(&format!("trip id {id} in {title} is invalid"))?;
            }
            for id in &d.without_detail {
                sink.line(&format!(
                    "trip id {id} in {title} without {}",
                    source.source.detail_label()
                ))?;
            }
            for raw_ref in &d.orphan {
                sink.line(&format!("record {raw_ref} in {title} has no trip id"))?;
            }
        }
    }
    Ok(())
}
