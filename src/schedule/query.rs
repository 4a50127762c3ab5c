use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use super::model::{SECONDS_PER_DAY, Schedule};
use crate::error::ScheduleError;

/// A scheduled trip anchored to a concrete service date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveTrip {
    pub trip_id: String,
    pub service_date: NaiveDate,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Trips expected in service during one inspection window, keyed by trip id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveTripSet {
    trips: HashMap<String, ActiveTrip>,
}

impl ActiveTripSet {
    pub fn contains(&self, trip_id: &str) -> bool {
        self.trips.contains_key(trip_id)
    }

    pub fn len(&self) -> usize {
        self.trips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trips.is_empty()
    }

    pub fn ids(&self) -> HashSet<&str> {
        self.trips.keys().map(String::as_str).collect()
    }

    pub fn get(&self, trip_id: &str) -> Option<&ActiveTrip> {
        self.trips.get(trip_id)
    }

    /// Trips ordered by start time, then trip id.
    pub fn sorted(&self) -> Vec<&ActiveTrip> {
        let mut trips: Vec<&ActiveTrip> = self.trips.values().collect();
        trips.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.trip_id.cmp(&b.trip_id)));
        trips
    }
}

/// Anchors a seconds-after-midnight offset to `date`; offsets past 24h roll
/// into the following days.
pub(crate) fn anchor(date: NaiveDate, offset_secs: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN) + Duration::seconds(i64::from(offset_secs))
}

/// Computes the trips scheduled to be in service within
/// `[now - window_back, now + window_fwd]`.
///
/// `now` is agency-local wall-clock time and its date is the service date.
/// Every date whose trips could still reach into the window is considered, so
/// post-midnight service of the previous day and early trips of the next day
/// are not dropped when the window crosses midnight. A trip is active when
/// `start < window_end && end > window_start`.
///
/// # Errors
///
/// [`ScheduleError::NoServicePeriods`] when no service id runs on the
/// service date.
pub fn active_trips<S: Schedule + ?Sized>(
    schedule: &S,
    now: NaiveDateTime,
    window_back: Duration,
    window_fwd: Duration,
) -> Result<ActiveTripSet, ScheduleError> {
    let service_date = now.date();
    if schedule.active_service_ids(service_date).is_empty() {
        return Err(ScheduleError::NoServicePeriods(service_date));
    }

    let window_start = now - window_back;
    let window_end = now + window_fwd;

    let max_end = schedule.trips().iter().map(|t| t.end).max().unwrap_or(0);
    let days_back = i64::from(max_end / SECONDS_PER_DAY) + 1;

    let mut active = HashMap::new();
    let mut date = window_start.date() - Duration::days(days_back);
    while date <= window_end.date() {
        let services = schedule.active_service_ids(date);
        for trip in schedule.trips() {
            if !services.contains(trip.service_id.as_str()) {
                continue;
            }
            let start = anchor(date, trip.start);
            let end = anchor(date, trip.end);
            if start < window_end && end > window_start {
                active.entry(trip.trip_id.clone()).or_insert(ActiveTrip {
                    trip_id: trip.trip_id.clone(),
                    service_date: date,
                    start,
                    end,
                });
            }
        }
        date += Duration::days(1);
    }

    Ok(ActiveTripSet { trips: active })
}
