//! Source adapters: each one fetches a single external source and normalizes
//! it into [`SourceRecord`]s keyed by trip id.

pub mod alerts;
pub mod onebusaway;
pub mod streets;
pub mod trip_updates;
pub mod vehicle_positions;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{SourceError, SourceUnavailable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    TripUpdates,
    VehiclePositions,
    LiveTracking,
    Streets,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::TripUpdates => "trip_updates",
            SourceKind::VehiclePositions => "vehicle_positions",
            SourceKind::LiveTracking => "live_tracking",
            SourceKind::Streets => "streets",
        }
    }

    /// Heading used by the report emitters.
    pub fn title(&self) -> &'static str {
        match self {
            SourceKind::TripUpdates => "GTFS-RT Trip Updates",
            SourceKind::VehiclePositions => "GTFS-RT Vehicles",
            SourceKind::LiveTracking => "OneBusAway",
            SourceKind::Streets => "Streets Webservice",
        }
    }

    /// What `has_detail` means for this source.
    pub fn detail_label(&self) -> &'static str {
        match self {
            SourceKind::TripUpdates => "stop_time_updates",
            SourceKind::VehiclePositions => "stop info",
            SourceKind::LiveTracking => "trip status",
            SourceKind::Streets => "NextStops data",
        }
    }
}

/// One normalized unit of a source.
///
/// An empty `trip_id` means the record has no trip association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    pub trip_id: String,
    pub has_detail: bool,
    /// Source-specific handle for drill-down (entity id, vehicle id).
    pub raw_ref: String,
}

impl SourceRecord {
    pub fn new(trip_id: impl Into<String>, has_detail: bool, raw_ref: impl Into<String>) -> Self {
        Self {
            trip_id: trip_id.into(),
            has_detail,
            raw_ref: raw_ref.into(),
        }
    }

    pub fn is_orphan(&self) -> bool {
        self.trip_id.is_empty()
    }
}

/// Counters reported alongside the records, specific to each source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceExtras {
    /// Vehicles seen in the payload before normalization.
    pub total_vehicles: Option<usize>,
    /// Feed entities of a trip-updates payload, before per-trip dedupe.
    pub total_entities: Option<usize>,
    /// Vehicles carrying stop information.
    pub with_stop_info: Option<usize>,
    /// Streets vehicles currently assigned to work.
    pub with_current_work: Option<usize>,
    /// Feed header timestamp, seconds since the epoch.
    pub feed_timestamp: Option<u64>,
}

/// The outcome of one successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceBatch {
    pub records: Vec<SourceRecord>,
    /// Records skipped because they could not be interpreted.
    pub skipped: Vec<SourceError>,
    pub extras: SourceExtras,
}

/// A source that can be reconciled against the schedule baseline.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Fetches and normalizes the source. A failure marks the source
    /// unavailable for this pass only.
    async fn fetch(&self) -> Result<SourceBatch, SourceUnavailable>;
}
