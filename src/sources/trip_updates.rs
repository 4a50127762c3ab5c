//! GTFS-realtime trip-update feed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{SourceAdapter, SourceBatch, SourceExtras, SourceKind, SourceRecord};
use crate::error::{SourceError, SourceUnavailable};
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::FeedMessage;
use crate::parser::parse_feed;

pub struct TripUpdatesAdapter {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl TripUpdatesAdapter {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for TripUpdatesAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::TripUpdates
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<SourceBatch, SourceUnavailable> {
        let bytes = fetch_bytes(self.client.as_ref(), &self.url).await?;
        let feed = parse_feed(&bytes)?;
        debug!(entity_count = feed.entity.len(), "Trip update feed parsed");
        Ok(normalize(&feed))
    }
}

/// One record per distinct trip id; a trip has detail when any of its
/// entities carries a stop-time update.
///
/// Trip updates without a trip id become orphan records keyed by entity id.
pub fn normalize(feed: &FeedMessage) -> SourceBatch {
    let mut by_trip: BTreeMap<&str, SourceRecord> = BTreeMap::new();
    let mut orphans = Vec::new();
    let mut skipped = Vec::new();

    for entity in &feed.entity {
        if entity.is_deleted() {
            continue;
        }
        let Some(trip_update) = &entity.trip_update else {
            if entity.vehicle.is_none() && entity.alert.is_none() {
                skipped.push(SourceError::new(&entity.id, "entity carries no payload"));
            }
            continue;
        };

        let has_detail = !trip_update.stop_time_update.is_empty();
        match trip_update.trip.trip_id.as_deref().filter(|id| !id.is_empty()) {
            Some(trip_id) => {
                by_trip
                    .entry(trip_id)
                    .and_modify(|record| record.has_detail |= has_detail)
                    .or_insert_with(|| SourceRecord::new(trip_id, has_detail, &entity.id));
            }
            None => orphans.push(SourceRecord::new("", has_detail, &entity.id)),
        }
    }

    SourceBatch {
        records: by_trip.into_values().chain(orphans).collect(),
        skipped,
        extras: SourceExtras {
            total_entities: Some(feed.entity.len()),
            feed_timestamp: feed.header.timestamp,
            ..Default::default()
        },
    }
}
