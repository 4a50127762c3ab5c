//! Structured discrepancy report and its emitters.
//!
//! [`assemble_report`] turns the baseline and the per-source fetch outcomes of
//! one pass into a [`DiscrepancyReport`]. Rendering lives in [`text`] and
//! [`html`]; both write to a sink chosen by the caller.

pub mod html;
pub mod text;

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::error::{ScheduleError, SourceUnavailable};
use crate::reconcile::{TripDiscrepancies, reconcile};
use crate::schedule::{ActiveTrip, ActiveTripSet};
use crate::sources::alerts::AlertSummary;
use crate::sources::{SourceBatch, SourceExtras, SourceKind};

/// Malformed records listed by reference in the report; the rest are counted.
const MALFORMED_SAMPLE_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BaselineStatus {
    Valid,
    /// The schedule loaded but nothing is scheduled inside the window.
    Empty,
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Baseline {
    #[serde(flatten)]
    pub status: BaselineStatus,
    pub active_trips: Vec<ActiveTrip>,
}

impl Baseline {
    pub fn is_valid(&self) -> bool {
        self.status == BaselineStatus::Valid
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok,
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotComputable {
    NoBaseline,
    SourceUnavailable,
}

impl NotComputable {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotComputable::NoBaseline => "no schedule baseline",
            NotComputable::SourceUnavailable => "source unavailable",
        }
    }
}

/// Trip-level classes of a source, or why they could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum TripCheck {
    Computed(TripDiscrepancies),
    NotComputable { reason: NotComputable },
}

impl TripCheck {
    pub fn computed(&self) -> Option<&TripDiscrepancies> {
        match self {
            TripCheck::Computed(d) => Some(d),
            TripCheck::NotComputable { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source: SourceKind,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub total_records: usize,
    pub orphan_count: usize,
    pub malformed_count: usize,
    pub malformed: Vec<String>,
    pub extras: SourceExtras,
    pub trips: TripCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AlertsReport {
    NotRequested,
    Ok { alerts: Vec<AlertSummary> },
    Unavailable { reason: String },
}

/// Everything one reconciliation pass found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscrepancyReport {
    pub now: NaiveDateTime,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
    pub baseline_valid: bool,
    pub baseline: Baseline,
    pub sources: Vec<SourceReport>,
    pub alerts: AlertsReport,
}

impl DiscrepancyReport {
    pub fn source(&self, kind: SourceKind) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == kind)
    }

    /// Total discrepancy entries across all computed sources.
    pub fn discrepancy_count(&self) -> usize {
        self.sources
            .iter()
            .filter_map(|s| s.trips.computed())
            .map(|d| d.missing_active.len() + d.invalid.len() + d.without_detail.len())
            .sum()
    }
}

/// The fetch outcome of one source.
#[derive(Debug)]
pub struct SourceOutcome {
    pub kind: SourceKind,
    pub result: Result<SourceBatch, SourceUnavailable>,
}

fn baseline_from(active: &Result<ActiveTripSet, ScheduleError>) -> Baseline {
    match active {
        Ok(set) if set.is_empty() => Baseline {
            status: BaselineStatus::Empty,
            active_trips: Vec::new(),
        },
        Ok(set) => Baseline {
            status: BaselineStatus::Valid,
            active_trips: set.sorted().into_iter().cloned().collect(),
        },
        Err(e) => Baseline {
            status: BaselineStatus::Invalid {
                reason: e.to_string(),
            },
            active_trips: Vec::new(),
        },
    }
}

fn source_report(
    active: Option<&ActiveTripSet>,
    outcome: SourceOutcome,
) -> SourceReport {
    let batch = match outcome.result {
        Ok(batch) => batch,
        Err(e) => {
            return SourceReport {
                source: outcome.kind,
                status: SourceStatus::Unavailable {
                    reason: e.to_string(),
                },
                total_records: 0,
                orphan_count: 0,
                malformed_count: 0,
                malformed: Vec::new(),
                extras: SourceExtras::default(),
                trips: TripCheck::NotComputable {
                    reason: NotComputable::SourceUnavailable,
                },
            };
        }
    };

    let orphan_count = batch.records.iter().filter(|r| r.is_orphan()).count();
    let trips = match active {
        Some(set) => TripCheck::Computed(reconcile(&set.ids(), &batch.records)),
        None => TripCheck::NotComputable {
            reason: NotComputable::NoBaseline,
        },
    };

    SourceReport {
        source: outcome.kind,
        status: SourceStatus::Ok,
        total_records: batch.records.len(),
        orphan_count,
        malformed_count: batch.skipped.len(),
        malformed: batch
            .skipped
            .iter()
            .take(MALFORMED_SAMPLE_LIMIT)
            .map(ToString::to_string)
            .collect(),
        extras: batch.extras,
        trips,
    }
}

/// Builds the report of one pass.
///
/// Never fails: an invalid baseline marks every trip-level class as not
/// computable, an unavailable source marks its own classes as not
/// computable, and an empty baseline is computed but flagged invalid.
pub fn assemble_report(
    now: NaiveDateTime,
    window_back: Duration,
    window_fwd: Duration,
    active: &Result<ActiveTripSet, ScheduleError>,
    outcomes: Vec<SourceOutcome>,
    alerts: Option<Result<Vec<AlertSummary>, SourceUnavailable>>,
) -> DiscrepancyReport {
    let baseline = baseline_from(active);
    let active_set = active.as_ref().ok();

    let mut sources: Vec<SourceReport> = outcomes
        .into_iter()
        .map(|outcome| source_report(active_set, outcome))
        .collect();
    sources.sort_by_key(|s| s.source);

    let alerts = match alerts {
        None => AlertsReport::NotRequested,
        Some(Ok(alerts)) => AlertsReport::Ok { alerts },
        Some(Err(e)) => AlertsReport::Unavailable {
            reason: e.to_string(),
        },
    };

    DiscrepancyReport {
        now,
        window_start: now - window_back,
        window_end: now + window_fwd,
        baseline_valid: baseline.is_valid(),
        baseline,
        sources,
        alerts,
    }
}
