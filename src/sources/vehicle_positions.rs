//! GTFS-realtime vehicle-position feed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{SourceAdapter, SourceBatch, SourceExtras, SourceKind, SourceRecord};
use crate::error::{SourceError, SourceUnavailable};
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::FeedMessage;
use crate::parser::parse_feed;

pub struct VehiclePositionsAdapter {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl VehiclePositionsAdapter {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for VehiclePositionsAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::VehiclePositions
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<SourceBatch, SourceUnavailable> {
        let bytes = fetch_bytes(self.client.as_ref(), &self.url).await?;
        let feed = parse_feed(&bytes)?;
        debug!(entity_count = feed.entity.len(), "Vehicle position feed parsed");
        Ok(normalize(&feed))
    }
}

/// One record per vehicle entity. The trip id comes from the vehicle's trip
/// descriptor; detail means the vehicle reports a stop id.
pub fn normalize(feed: &FeedMessage) -> SourceBatch {
    let mut records = Vec::new();
    let mut skipped = Vec::new();
    let mut with_stop_info = 0usize;

    for entity in &feed.entity {
        if entity.is_deleted() {
            continue;
        }
        let Some(vehicle) = &entity.vehicle else {
            skipped.push(SourceError::new(&entity.id, "entity has no vehicle position"));
            continue;
        };

        let trip_id = vehicle
            .trip
            .as_ref()
            .and_then(|t| t.trip_id.as_deref())
            .unwrap_or("");
        let has_stop = vehicle.stop_id.as_deref().is_some_and(|s| !s.is_empty());
        if has_stop {
            with_stop_info += 1;
        }

        let raw_ref = vehicle
            .vehicle
            .as_ref()
            .and_then(|v| v.id.as_deref())
            .filter(|id| !id.is_empty())
            .unwrap_or(&entity.id);
        records.push(SourceRecord::new(trip_id, has_stop, raw_ref));
    }

    SourceBatch {
        extras: SourceExtras {
            total_vehicles: Some(records.len()),
            with_stop_info: Some(with_stop_info),
            feed_timestamp: feed.header.timestamp,
            ..Default::default()
        },
        records,
        skipped,
    }
}
