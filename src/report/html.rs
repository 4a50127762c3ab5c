//! HTML rendering of a [`DiscrepancyReport`].

use html_escape::{encode_double_quoted_attribute, encode_text};

use super::{AlertsReport, BaselineStatus, DiscrepancyReport, SourceReport, SourceStatus, TripCheck};

fn list(html: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    html.push_str(&format!("<h3>{} ({})</h3>\n<ul>\n", encode_text(heading), items.len()));
    for item in items {
        html.push_str(&format!("<li>{}</li>\n", encode_text(item)));
    }
    html.push_str("</ul>\n");
}

fn render_source(html: &mut String, source: &SourceReport) {
    let title = source.source.title();
    html.push_str(&format!(
        "<h2 id=\"{}\">{}</h2>\n",
        encode_double_quoted_attribute(source.source.as_str()),
        encode_text(title)
    ));

    if let SourceStatus::Unavailable { reason } = &source.status {
        html.push_str(&format!(
            "<p class=\"error\">Source unavailable: {}</p>\n",
            encode_text(reason)
        ));
        return;
    }

    html.push_str("<table>\n");
    let mut row = |label: &str, value: usize| {
        html.push_str(&format!("<tr><th>{label}</th><td>{value}</td></tr>\n"));
    };
    row("records", source.total_records);
    row("records without trip id", source.orphan_count);
    row("malformed records", source.malformed_count);
    if let Some(total) = source.extras.total_entities {
        row("entities", total);
    }
    if let Some(total) = source.extras.total_vehicles {
        row("vehicles", total);
    }
    if let Some(n) = source.extras.with_stop_info {
        row("vehicles with stop info", n);
    }
    if let Some(n) = source.extras.with_current_work {
        row("vehicles with current work", n);
    }
    if let Some(d) = source.trips.computed() {
        row("trips seen", d.trips_seen);
        row("trips matched", d.trips_matched);
    }
    html.push_str("</table>\n");

    match &source.trips {
        TripCheck::NotComputable { reason } => {
            html.push_str(&format!(
                "<p class=\"warning\">Trip checks not computed: {}</p>\n",
                reason.as_str()
            ));
        }
        TripCheck::Computed(d) => {
            let missing: Vec<String> = d.missing_active.iter().cloned().collect();
            let invalid: Vec<String> = d.invalid.iter().cloned().collect();
            let without: Vec<String> = d.without_detail.iter().cloned().collect();
            let orphan: Vec<String> = d.orphan.iter().cloned().collect();
            list(html, &format!("Active trips not in {title}"), &missing);
            list(html, "Invalid trip ids", &invalid);
            list(
                html,
                &format!("Trips without {}", source.source.detail_label()),
                &without,
            );
            list(html, "Records without trip id", &orphan);
        }
    }
    list(html, "Malformed records", &source.malformed);
}

/// Renders the report as a standalone HTML page.
pub fn render_html(report: &DiscrepancyReport) -> String {
    let mut html = String::new();
    let stamp = report.now.format("%Y-%m-%d %H:%M");
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>Feed inspection {stamp}</title>\n</head>\n<body>\n"));
    html.push_str(&format!(
        "<h1>Feed inspection {stamp}</h1>\n<p>Window {} to {}, {} discrepancies.</p>\n",
        report.window_start.format("%Y-%m-%d %H:%M"),
        report.window_end.format("%Y-%m-%d %H:%M"),
        report.discrepancy_count()
    ));

    html.push_str("<h2>GTFS</h2>\n");
    match &report.baseline.status {
        BaselineStatus::Valid => {
            html.push_str(&format!(
                "<p>{} active trips.</p>\n<table>\n<tr><th>trip_id</th><th>start</th><th>end</th></tr>\n",
                report.baseline.active_trips.len()
            ));
            for trip in &report.baseline.active_trips {
                html.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    encode_text(&trip.trip_id),
                    trip.start.format("%H:%M"),
                    trip.end.format("%H:%M")
                ));
            }
            html.push_str("</table>\n");
        }
        BaselineStatus::Empty => {
            html.push_str("<p class=\"warning\">No trips are scheduled in the window.</p>\n");
        }
        BaselineStatus::Invalid { reason } => {
            html.push_str(&format!(
                "<p class=\"error\">Schedule baseline unavailable: {}</p>\n",
                encode_text(reason)
            ));
        }
    }

    for source in &report.sources {
        render_source(&mut html, source);
    }

    match &report.alerts {
        AlertsReport::NotRequested => {}
        AlertsReport::Ok { alerts } => {
            html.push_str(&format!("<h2>GTFS-RT Alerts ({})</h2>\n<ul>\n", alerts.len()));
            for alert in alerts {
                html.push_str(&format!(
                    "<li>{}: {}</li>\n",
                    encode_text(&alert.entity_id),
                    encode_text(&alert.header)
                ));
            }
            html.push_str("</ul>\n");
        }
        AlertsReport::Unavailable { reason } => {
            html.push_str(&format!(
                "<h2>GTFS-RT Alerts</h2>\n<p class=\"error\">Source unavailable: {}</p>\n",
                encode_text(reason)
            ));
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}
