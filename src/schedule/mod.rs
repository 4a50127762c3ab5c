//! Static schedule: in-memory model, GTFS zip loader, active-trip query and
//! feed validation.

mod loader;
mod model;
mod query;
pub mod validate;

pub use loader::{download_schedule, load_schedule, load_schedule_from_reader};
pub use model::{
    CalendarException, ExceptionType, GtfsSchedule, Schedule, ScheduledTrip, ServiceCalendar,
};
pub use query::{ActiveTrip, ActiveTripSet, active_trips};
