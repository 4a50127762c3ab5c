use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike, NaiveDate, Utc};

pub const SECONDS_PER_DAY: u32 = 86_400;

/// A trip of the published schedule with its time span.
///
/// `start` and `end` are seconds after midnight of the service date and may
/// exceed 24h for service running past midnight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTrip {
    pub trip_id: String,
    pub route_id: String,
    pub service_id: String,
    pub trip_headsign: Option<String>,
    pub start: u32,
    pub end: u32,
}

/// A weekly service pattern (calendar.txt).
#[derive(Debug, Clone)]
pub struct ServiceCalendar {
    pub service_id: String,
    pub days: [bool; 7], // mon, tue, wed, thu, fri, sat, sun
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionType {
    Added,
    Removed,
}

/// A single-date override of a service pattern (calendar_dates.txt).
#[derive(Debug, Clone)]
pub struct CalendarException {
    pub date: NaiveDate,
    pub exception_type: ExceptionType,
}

/// Query surface the active-trip computation needs from a loaded schedule.
pub trait Schedule {
    /// All trips that carry a time span.
    fn trips(&self) -> &[ScheduledTrip];

    /// Every service id known to the calendar tables.
    fn service_ids(&self) -> BTreeSet<&str>;

    fn is_service_active(&self, service_id: &str, date: NaiveDate) -> bool;

    fn active_service_ids(&self, date: NaiveDate) -> HashSet<&str> {
        self.service_ids()
            .into_iter()
            .filter(|id| self.is_service_active(id, date))
            .collect()
    }
}

/// A GTFS feed loaded into memory.
///
/// Besides the timed trips it keeps the reference data the validator checks
/// trips against.
#[derive(Debug, Clone)]
pub struct GtfsSchedule {
    pub trips: Vec<ScheduledTrip>,
    /// Trips present in trips.txt without any usable stop time.
    pub untimed_trips: Vec<ScheduledTrip>,
    pub calendars: HashMap<String, ServiceCalendar>,
    /// service_id -> list of exceptions
    pub calendar_dates: HashMap<String, Vec<CalendarException>>,
    pub route_ids: HashSet<String>,
    pub stop_ids: HashSet<String>,
    /// (trip_id, stop_id) pairs from stop_times.txt whose stop is not in stops.txt
    pub unknown_stop_refs: Vec<(String, String)>,
    pub loaded_at: DateTime<Utc>,
}

impl GtfsSchedule {
    /// Builds a schedule from trips and calendar tables alone.
    pub fn new(
        trips: Vec<ScheduledTrip>,
        calendars: Vec<ServiceCalendar>,
        calendar_dates: Vec<(String, CalendarException)>,
    ) -> Self {
        let route_ids = trips.iter().map(|t| t.route_id.clone()).collect();
        let mut exceptions: HashMap<String, Vec<CalendarException>> = HashMap::new();
        for (service_id, exception) in calendar_dates {
            exceptions.entry(service_id).or_default().push(exception);
        }

        Self {
            trips,
            untimed_trips: Vec::new(),
            calendars: calendars
                .into_iter()
                .map(|c| (c.service_id.clone(), c))
                .collect(),
            calendar_dates: exceptions,
            route_ids,
            stop_ids: HashSet::new(),
            unknown_stop_refs: Vec::new(),
            loaded_at: Utc::now(),
        }
    }
}

impl Schedule for GtfsSchedule {
    fn trips(&self) -> &[ScheduledTrip] {
        &self.trips
    }

    fn service_ids(&self) -> BTreeSet<&str> {
        self.calendars
            .keys()
            .chain(self.calendar_dates.keys())
            .map(String::as_str)
            .collect()
    }

    fn is_service_active(&self, service_id: &str, date: NaiveDate) -> bool {
        // calendar_dates exceptions override the weekly pattern
        if let Some(exceptions) = self.calendar_dates.get(service_id) {
            if let Some(exc) = exceptions.iter().find(|e| e.date == date) {
                return exc.exception_type == ExceptionType::Added;
            }
        }

        match self.calendars.get(service_id) {
            Some(cal) if date >= cal.start_date && date <= cal.end_date => {
                cal.days[date.weekday().num_days_from_monday() as usize]
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn weekday_calendar() -> ServiceCalendar {
        ServiceCalendar {
            service_id: "WKDY".to_string(),
            days: [true, true, true, true, true, false, false],
            start_date: date(2024, 1, 1),
            end_date: date(2024, 12, 31),
        }
    }

    #[test]
    fn test_is_service_active_weekly_pattern() {
        let schedule = GtfsSchedule::new(vec![], vec![weekday_calendar()], vec![]);

        // 2024-03-04 is a Monday, 2024-03-09 a Saturday
        assert!(schedule.is_service_active("WKDY", date(2024, 3, 4)));
        assert!(!schedule.is_service_active("WKDY", date(2024, 3, 9)));
        assert!(!schedule.is_service_active("OTHER", date(2024, 3, 4)));
    }

    #[test]
    fn test_is_service_active_outside_date_range() {
        let schedule = GtfsSchedule::new(vec![], vec![weekday_calendar()], vec![]);

        assert!(!schedule.is_service_active("WKDY", date(2023, 12, 29)));
        assert!(!schedule.is_service_active("WKDY", date(2025, 1, 1)));
    }

    #[test]
    fn test_exception_removes_and_adds_service() {
        let schedule = GtfsSchedule::new(
            vec![],
            vec![weekday_calendar()],
            vec![
                (
                    "WKDY".to_string(),
                    CalendarException {
                        date: date(2024, 3, 4),
                        exception_type: ExceptionType::Removed,
                    },
                ),
                (
                    "HOLIDAY".to_string(),
                    CalendarException {
                        date: date(2024, 3, 4),
                        exception_type: ExceptionType::Added,
                    },
                ),
            ],
        );

        assert!(!schedule.is_service_active("WKDY", date(2024, 3, 4)));
        assert!(schedule.is_service_active("HOLIDAY", date(2024, 3, 4)));
        assert!(!schedule.is_service_active("HOLIDAY", date(2024, 3, 5)));

        let active = schedule.active_service_ids(date(2024, 3, 4));
        assert_eq!(active, HashSet::from(["HOLIDAY"]));
    }

    #[test]
    fn test_service_ids_union_of_tables() {
        let schedule = GtfsSchedule::new(
            vec![],
            vec![weekday_calendar()],
            vec![(
                "EXTRA".to_string(),
                CalendarException {
                    date: date(2024, 7, 4),
                    exception_type: ExceptionType::Added,
                },
            )],
        );

        let ids: Vec<&str> = schedule.service_ids().into_iter().collect();
        assert_eq!(ids, vec!["EXTRA", "WKDY"]);
    }
}
