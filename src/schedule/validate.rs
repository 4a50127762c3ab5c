//! Static feed checks run by `validate-gtfs`, rendered as an HTML page.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;

use super::model::{GtfsSchedule, Schedule};
use html_escape::encode_text;

/// At most this many problems of one kind are listed; the rest are counted.
pub const DEFAULT_LIMIT_PER_KIND: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProblemKind {
    NullHeadsign,
    UnknownService,
    UnknownRoute,
    TripWithoutStopTimes,
    UnknownStop,
    ServiceWithoutTrips,
    ExpiredCalendar,
}

impl ProblemKind {
    pub fn severity(self) -> Severity {
        match self {
            ProblemKind::UnknownService
            | ProblemKind::UnknownRoute
            | ProblemKind::UnknownStop => Severity::Error,
            ProblemKind::NullHeadsign
            | ProblemKind::TripWithoutStopTimes
            | ProblemKind::ServiceWithoutTrips
            | ProblemKind::ExpiredCalendar => Severity::Warning,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProblemKind::NullHeadsign => "null_headsign",
            ProblemKind::UnknownService => "unknown_service",
            ProblemKind::UnknownRoute => "unknown_route",
            ProblemKind::TripWithoutStopTimes => "trip_without_stop_times",
            ProblemKind::UnknownStop => "unknown_stop",
            ProblemKind::ServiceWithoutTrips => "service_without_trips",
            ProblemKind::ExpiredCalendar => "expired_calendar",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProblemGroup {
    pub total: usize,
    pub messages: Vec<String>,
}

/// Problems found in a schedule, grouped by kind.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub checked_on: NaiveDate,
    pub limit_per_kind: usize,
    pub groups: BTreeMap<ProblemKind, ProblemGroup>,
}

impl ValidationReport {
    fn new(checked_on: NaiveDate, limit_per_kind: usize) -> Self {
        Self {
            checked_on,
            limit_per_kind,
            groups: BTreeMap::new(),
        }
    }

    fn push(&mut self, kind: ProblemKind, message: String) {
        let group = self.groups.entry(kind).or_default();
        group.total += 1;
        if group.messages.len() < self.limit_per_kind {
            group.messages.push(message);
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.groups
            .iter()
            .filter(|(kind, _)| kind.severity() == severity)
            .map(|(_, g)| g.total)
            .sum()
    }

    pub fn is_clean(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Checks trips and calendars for references that do not resolve and for
/// values the realtime sources cannot be compared against.
pub fn validate(schedule: &GtfsSchedule, today: NaiveDate, limit_per_kind: usize) -> ValidationReport {
    let mut report = ValidationReport::new(today, limit_per_kind);
    let service_ids: HashSet<&str> = schedule.service_ids().into_iter().collect();

    let mut trips: Vec<_> = schedule
        .trips
        .iter()
        .chain(schedule.untimed_trips.iter())
        .collect();
    trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));

    let mut used_services = HashSet::new();
    for trip in &trips {
        used_services.insert(trip.service_id.as_str());

        if trip.trip_headsign.as_deref() == Some("null") {
            report.push(
                ProblemKind::NullHeadsign,
                format!("trip {} has trip_headsign \"null\"", trip.trip_id),
            );
        }
        if !service_ids.contains(trip.service_id.as_str()) {
            report.push(
                ProblemKind::UnknownService,
                format!(
                    "trip {} references unknown service_id {}",
                    trip.trip_id, trip.service_id
                ),
            );
        }
        if !schedule.route_ids.is_empty() && !schedule.route_ids.contains(&trip.route_id) {
            report.push(
                ProblemKind::UnknownRoute,
                format!(
                    "trip {} references unknown route_id {}",
                    trip.trip_id, trip.route_id
                ),
            );
        }
    }

    for trip in &schedule.untimed_trips {
        report.push(
            ProblemKind::TripWithoutStopTimes,
            format!("trip {} has no timed stop_times", trip.trip_id),
        );
    }

    for (trip_id, stop_id) in &schedule.unknown_stop_refs {
        report.push(
            ProblemKind::UnknownStop,
            format!("stop_times for trip {trip_id} reference unknown stop_id {stop_id}"),
        );
    }

    for service_id in &service_ids {
        if !used_services.contains(service_id) {
            report.push(
                ProblemKind::ServiceWithoutTrips,
                format!("service_id {service_id} is not used by any trip"),
            );
        }
    }

    let mut calendars: Vec<_> = schedule.calendars.values().collect();
    calendars.sort_by(|a, b| a.service_id.cmp(&b.service_id));
    for cal in calendars {
        if cal.end_date < today {
            report.push(
                ProblemKind::ExpiredCalendar,
                format!("service_id {} ended on {}", cal.service_id, cal.end_date),
            );
        }
    }

    report
}

/// Renders the validation report as a standalone HTML page.
pub fn render_html(report: &ValidationReport, feed_name: &str) -> String {
    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!(
        "<title>GTFS validation: {}</title>\n</head>\n<body>\n",
        encode_text(feed_name)
    ));
    html.push_str(&format!(
        "<h1>GTFS validation of {}</h1>\n<p>Checked on {}: {} errors, {} warnings.</p>\n",
        encode_text(feed_name),
        report.checked_on,
        report.count(Severity::Error),
        report.count(Severity::Warning),
    ));

    if report.is_clean() {
        html.push_str("<p>No problems found.</p>\n");
    }

    for (kind, group) in &report.groups {
        let severity = match kind.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        html.push_str(&format!(
            "<h2 class=\"{severity}\">{} ({})</h2>\n<ul>\n",
            kind.as_str(),
            group.total
        ));
        for message in &group.messages {
            html.push_str(&format!("<li>{}</li>\n", encode_text(message)));
        }
        if group.total > group.messages.len() {
            html.push_str(&format!(
                "<li>... and {} more</li>\n",
                group.total - group.messages.len()
            ));
        }
        html.push_str("</ul>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}
