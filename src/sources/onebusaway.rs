//! Live vehicle-tracking API (OneBusAway `vehicles-for-agency`).
//!
//! The response wraps the vehicles in `data.list`; each entry carries a
//! `tripId` qualified with the agency id (`1739_12345`). The qualifier is
//! configured as a prefix and stripped before comparison with the schedule.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{SourceAdapter, SourceBatch, SourceExtras, SourceKind, SourceRecord};
use crate::error::{SourceError, SourceUnavailable};
use crate::fetch::{HttpClient, fetch_bytes};

pub struct OneBusAwayAdapter {
    client: Arc<dyn HttpClient>,
    url: String,
    trip_id_prefix: Option<String>,
}

impl OneBusAwayAdapter {
    pub fn new(
        client: Arc<dyn HttpClient>,
        url: impl Into<String>,
        trip_id_prefix: Option<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            trip_id_prefix,
        }
    }
}

#[async_trait]
impl SourceAdapter for OneBusAwayAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::LiveTracking
    }

    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<SourceBatch, SourceUnavailable> {
        let bytes = fetch_bytes(self.client.as_ref(), &self.url).await?;
        let body: Value = serde_json::from_slice(&bytes)?;
        let batch = normalize(&body, self.trip_id_prefix.as_deref())?;
        debug!(vehicles = batch.records.len(), "Live-tracking vehicles parsed");
        Ok(batch)
    }
}

/// Strips `prefix` from the front of `trip_id` when it is there.
pub fn strip_trip_prefix<'a>(trip_id: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(p) if !p.is_empty() => trip_id.strip_prefix(p).unwrap_or(trip_id),
        _ => trip_id,
    }
}

/// One record per entry of `data.list`; detail means the entry carries a
/// non-null `tripStatus`.
///
/// # Errors
///
/// [`SourceUnavailable::Payload`] when the body has no `data.list` array,
/// which means the API answered with something other than a vehicle list.
pub fn normalize(body: &Value, prefix: Option<&str>) -> Result<SourceBatch, SourceUnavailable> {
    if let Some(code) = body.get("code").and_then(Value::as_i64) {
        if code != 200 {
            let text = body.get("text").and_then(Value::as_str).unwrap_or("");
            return Err(SourceUnavailable::Payload(format!(
                "API response code {code}: {text}"
            )));
        }
    }

    let list = body
        .pointer("/data/list")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceUnavailable::Payload("missing data.list array".into()))?;

    let mut records = Vec::with_capacity(list.len());
    let mut skipped = Vec::new();

    for (index, vehicle) in list.iter().enumerate() {
        let vehicle_id = vehicle
            .get("vehicleId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{index}"));

        let Some(entry) = vehicle.as_object() else {
            skipped.push(SourceError::new(vehicle_id, "vehicle entry is not an object"));
            continue;
        };
        let trip_id = match entry.get("tripId") {
            None | Some(Value::Null) => "",
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                skipped.push(SourceError::new(vehicle_id, "tripId is not a string"));
                continue;
            }
        };
        let has_detail = entry.get("tripStatus").is_some_and(|s| !s.is_null());

        records.push(SourceRecord::new(
            strip_trip_prefix(trip_id, prefix),
            has_detail,
            vehicle_id,
        ));
    }

    Ok(SourceBatch {
        extras: SourceExtras {
            total_vehicles: Some(list.len()),
            ..Default::default()
        },
        records,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_trip_prefix() {
        assert_eq!(strip_trip_prefix("1739_T1", Some("1739_")), "T1");
        assert_eq!(strip_trip_prefix("T1", Some("1739_")), "T1");
        assert_eq!(strip_trip_prefix("X_1739_T1", Some("1739_")), "X_1739_T1");
        assert_eq!(strip_trip_prefix("1739_T1", None), "1739_T1");
        assert_eq!(strip_trip_prefix("1739_T1", Some("")), "1739_T1");
    }

    #[test]
    fn test_normalize_vehicle_list() {
        let body = json!({
            "code": 200,
            "data": {
                "list": [
                    { "vehicleId": "1739_101", "tripId": "1739_A", "tripStatus": { "phase": "in_progress" } },
                    { "vehicleId": "1739_102", "tripId": "1739_B", "tripStatus": null },
                    { "vehicleId": "1739_103", "tripId": "" },
                    { "vehicleId": "1739_104", "tripId": 42 },
                    "garbage"
                ]
            }
        });

        let batch = normalize(&body, Some("1739_")).unwrap();

        assert_eq!(
            batch.records,
            vec![
                SourceRecord::new("A", true, "1739_101"),
                SourceRecord::new("B", false, "1739_102"),
                SourceRecord::new("", false, "1739_103"),
            ]
        );
        assert_eq!(
            batch.skipped,
            vec![
                SourceError::new("1739_104", "tripId is not a string"),
                SourceError::new("#4", "vehicle entry is not an object"),
            ]
        );
        assert_eq!(batch.extras.total_vehicles, Some(5));
    }

    #[test]
    fn test_missing_list_is_unavailable() {
        let err = normalize(&json!({ "data": {} }), None).unwrap_err();
        assert!(matches!(err, SourceUnavailable::Payload(_)));
    }

    #[test]
    fn test_error_code_is_unavailable() {
        let body = json!({ "code": 401, "text": "permission denied", "data": null });
        let err = normalize(&body, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected payload: API response code 401: permission denied"
        );
    }
}
