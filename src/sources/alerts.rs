//! GTFS-realtime service alerts. Summarized only; alerts carry no trip-level
//! reconciliation.

use std::sync::Arc;

use serde::Serialize;

use crate::error::SourceUnavailable;
use crate::fetch::{HttpClient, fetch_bytes};
use crate::gtfs_rt::{FeedMessage, TranslatedString};
use crate::parser::parse_feed;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    pub entity_id: String,
    pub header: String,
    pub informed_entities: usize,
}

pub struct AlertsAdapter {
    client: Arc<dyn HttpClient>,
    url: String,
}

impl AlertsAdapter {
    pub fn new(client: Arc<dyn HttpClient>, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<Vec<AlertSummary>, SourceUnavailable> {
        let bytes = fetch_bytes(self.client.as_ref(), &self.url).await?;
        Ok(summarize(&parse_feed(&bytes)?))
    }
}

/// English translation when present, otherwise the first one.
fn pick_text(text: Option<&TranslatedString>) -> Option<&str> {
    let translations = &text?.translation;
    translations
        .iter()
        .find(|t| t.language.as_deref().is_some_and(|l| l.starts_with("en")))
        .or_else(|| translations.first())
        .map(|t| t.text.as_str())
}

pub fn summarize(feed: &FeedMessage) -> Vec<AlertSummary> {
    feed.entity
        .iter()
        .filter(|e| !e.is_deleted())
        .filter_map(|e| {
            let alert = e.alert.as_ref()?;
            let header = pick_text(alert.header_text.as_ref())
                .or_else(|| pick_text(alert.description_text.as_ref()))
                .unwrap_or("")
                .to_string();
            Some(AlertSummary {
                entity_id: e.id.clone(),
                header,
                informed_entities: alert.informed_entity.len(),
            })
        })
        .collect()
}
