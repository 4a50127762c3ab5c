//! One reconciliation pass: fetch every source concurrently, compute the
//! schedule baseline and assemble the report.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{ScheduleError, SourceUnavailable};
use crate::report::{DiscrepancyReport, SourceOutcome, assemble_report};
use crate::schedule::{Schedule, active_trips};
use crate::sources::SourceAdapter;
use crate::sources::alerts::AlertsAdapter;

/// Time parameters of a pass. `now` is agency-local.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassWindow {
    pub now: NaiveDateTime,
    pub back: Duration,
    pub fwd: Duration,
}

/// Fetches all adapters concurrently.
///
/// Each adapter runs on its own task; a panicking task marks only its own
/// source unavailable. Dropping the returned future aborts pending fetches.
pub async fn fetch_all(adapters: &[Arc<dyn SourceAdapter>]) -> Vec<SourceOutcome> {
    let mut set = JoinSet::new();
    let mut kinds = HashMap::new();

    for adapter in adapters {
        let adapter = Arc::clone(adapter);
        let kind = adapter.kind();
        let handle = set.spawn(async move { adapter.fetch().await });
        kinds.insert(handle.id(), kind);
    }

    let mut outcomes = Vec::with_capacity(adapters.len());
    while let Some(joined) = set.join_next_with_id().await {
        let (id, result) = match joined {
            Ok((id, result)) => (id, result),
            Err(e) => (e.id(), Err(SourceUnavailable::Task(e.to_string()))),
        };
        let Some(kind) = kinds.get(&id).copied() else {
            continue;
        };
        match &result {
            Ok(batch) => debug!(
                source = kind.as_str(),
                records = batch.records.len(),
                skipped = batch.skipped.len(),
                "Source fetched"
            ),
            Err(e) => warn!(source = kind.as_str(), error = %e, "Source unavailable"),
        }
        outcomes.push(SourceOutcome { kind, result });
    }
    outcomes
}

/// Runs one pass against an already loaded schedule, or against the error
/// that prevented loading it. Always produces a report.
#[tracing::instrument(skip_all, fields(now = %window.now))]
pub async fn run_pass<S: Schedule + ?Sized>(
    schedule: Result<&S, ScheduleError>,
    window: PassWindow,
    adapters: &[Arc<dyn SourceAdapter>],
    alerts: Option<&AlertsAdapter>,
) -> DiscrepancyReport {
    let baseline =
        schedule.and_then(|s| active_trips(s, window.now, window.back, window.fwd));
    match &baseline {
        Ok(set) => info!(active_trips = set.len(), "Schedule baseline computed"),
        Err(e) => warn!(error = %e, "No schedule baseline for this pass"),
    }

    let alerts_fut = async {
        match alerts {
            Some(adapter) => Some(adapter.fetch().await),
            None => None,
        }
    };
    let (outcomes, alerts) = tokio::join!(fetch_all(adapters), alerts_fut);

    let report = assemble_report(
        window.now,
        window.back,
        window.fwd,
        &baseline,
        outcomes,
        alerts,
    );
    info!(
        baseline_valid = report.baseline_valid,
        sources = report.sources.len(),
        discrepancies = report.discrepancy_count(),
        "Pass complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{BaselineStatus, NotComputable, SourceStatus, TripCheck};
    use crate::schedule::{GtfsSchedule, ScheduledTrip, ServiceCalendar};
    use crate::sources::{SourceBatch, SourceKind, SourceRecord};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;
    use tokio::sync::oneshot;

    enum Behaviour {
        Records(Vec<SourceRecord>),
        Fail,
        Panic,
        /// Never completes; signals when the in-flight fetch is dropped.
        Hang(Mutex<Option<oneshot::Sender<()>>>),
    }

    struct DropSignal(Option<oneshot::Sender<()>>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    struct StubAdapter {
        kind: SourceKind,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self) -> Result<SourceBatch, SourceUnavailable> {
            match &self.behaviour {
                Behaviour::Records(records) => Ok(SourceBatch {
                    records: records.clone(),
                    ..Default::default()
                }),
                Behaviour::Fail => Err(SourceUnavailable::Payload("stub failure".into())),
                Behaviour::Panic => panic!("adapter blew up"),
                Behaviour::Hang(signal) => {
                    let _guard = DropSignal(signal.lock().unwrap().take());
                    std::future::pending().await
                }
            }
        }
    }

    fn stub(kind: SourceKind, behaviour: Behaviour) -> Arc<dyn SourceAdapter> {
        Arc::new(StubAdapter { kind, behaviour })
    }

    fn schedule() -> GtfsSchedule {
        let trip = |id: &str| ScheduledTrip {
            trip_id: id.to_string(),
            route_id: "R".to_string(),
            service_id: "D".to_string(),
            trip_headsign: None,
            start: 7 * 3600 + 1800,
            end: 8 * 3600 + 1800,
        };
        let calendar = ServiceCalendar {
            service_id: "D".to_string(),
            days: [true; 7],
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        };
        GtfsSchedule::new(vec![trip("A"), trip("B")], vec![calendar], vec![])
    }

    fn window() -> PassWindow {
        PassWindow {
            now: NaiveDate::from_ymd_opt(2024, 3, 4)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            back: Duration::minutes(10),
            fwd: Duration::minutes(10),
        }
    }

    #[tokio::test]
    async fn test_failing_and_panicking_sources_do_not_stop_the_pass() {
        let schedule = schedule();
        let adapters = vec![
            stub(
                SourceKind::TripUpdates,
                Behaviour::Records(vec![SourceRecord::new("A", true, "e1")]),
            ),
            stub(SourceKind::VehiclePositions, Behaviour::Fail),
            stub(SourceKind::LiveTracking, Behaviour::Panic),
        ];

        let report = run_pass(Ok(&schedule), window(), &adapters, None).await;

        assert!(report.baseline_valid);
        assert_eq!(report.sources.len(), 3);

        let tu = report.source(SourceKind::TripUpdates).unwrap();
        let d = tu.trips.computed().unwrap();
        assert_eq!(d.missing_active.iter().collect::<Vec<_>>(), vec!["B"]);

        for kind in [SourceKind::VehiclePositions, SourceKind::LiveTracking] {
            let source = report.source(kind).unwrap();
            assert!(matches!(source.status, SourceStatus::Unavailable { .. }));
            assert_eq!(
                source.trips,
                TripCheck::NotComputable {
                    reason: NotComputable::SourceUnavailable
                }
            );
        }
        let SourceStatus::Unavailable { reason } =
            &report.source(SourceKind::LiveTracking).unwrap().status
        else {
            unreachable!()
        };
        assert!(reason.starts_with("fetch task failed"));
    }

    #[tokio::test]
    async fn test_schedule_error_still_produces_report() {
        let adapters = vec![stub(
            SourceKind::VehiclePositions,
            Behaviour::Records(vec![
                SourceRecord::new("A", true, "bus-1"),
                SourceRecord::new("", false, "bus-2"),
            ]),
        )];

        let report = run_pass::<GtfsSchedule>(
            Err(ScheduleError::Parse("trips.txt missing".into())),
            window(),
            &adapters,
            None,
        )
        .await;

        assert!(!report.baseline_valid);
        assert!(matches!(report.baseline.status, BaselineStatus::Invalid { .. }));
        let source = &report.sources[0];
        assert_eq!(source.orphan_count, 1);
        assert_eq!(
            source.trips,
            TripCheck::NotComputable {
                reason: NotComputable::NoBaseline
            }
        );
    }

    #[tokio::test]
    async fn test_fetch_all_with_no_adapters() {
        assert!(fetch_all(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn test_dropping_fetch_all_aborts_pending_fetches() {
        let (tx, rx) = oneshot::channel();
        let adapters = vec![stub(
            SourceKind::Streets,
            Behaviour::Hang(Mutex::new(Some(tx))),
        )];

        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(50), fetch_all(&adapters)).await;
        assert!(timed_out.is_err());

        let dropped = tokio::time::timeout(std::time::Duration::from_secs(5), rx).await;
        assert!(matches!(dropped, Ok(Ok(()))));
    }
}
