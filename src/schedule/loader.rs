use std::collections::{HashMap, HashSet};
use std::io::{Cursor, Read, Seek};
use std::path::Path;

use chrono::{NaiveDate, Utc};
use csv::StringRecord;
use tracing::{info, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use super::model::{
    CalendarException, ExceptionType, GtfsSchedule, ScheduledTrip, ServiceCalendar,
};
use crate::error::ScheduleError;
use crate::fetch::{HttpClient, fetch_bytes};

/// Maximum allowed total decompressed size for a GTFS zip (2 GB)
const MAX_DECOMPRESSED_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Downloads the static GTFS zip and writes it to `path`.
#[tracing::instrument(skip(client))]
pub async fn download_schedule<C: HttpClient + ?Sized>(
    client: &C,
    url: &str,
    path: &Path,
) -> anyhow::Result<u64> {
    let bytes = fetch_bytes(client, url).await?;
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(path, &bytes).await?;

    info!(bytes = bytes.len(), path = %path.display(), "Downloaded static GTFS feed");
    Ok(bytes.len() as u64)
}

/// Loads a GTFS zip from disk.
pub fn load_schedule(path: &Path) -> Result<GtfsSchedule, ScheduleError> {
    let file = std::fs::File::open(path)?;
    load_schedule_from_reader(file)
}

/// Loads a GTFS zip from any seekable reader.
pub fn load_schedule_from_reader<R: Read + Seek>(reader: R) -> Result<GtfsSchedule, ScheduleError> {
    let mut archive = ZipArchive::new(reader)?;

    let mut total_uncompressed: u64 = 0;
    for i in 0..archive.len() {
        total_uncompressed += archive.by_index(i)?.size();
    }
    if total_uncompressed > MAX_DECOMPRESSED_SIZE {
        return Err(ScheduleError::Parse(format!(
            "GTFS zip decompressed size {total_uncompressed} bytes exceeds limit {MAX_DECOMPRESSED_SIZE} bytes"
        )));
    }

    let route_ids = parse_ids(&mut archive, "routes.txt", "route_id")?;
    let stop_ids = parse_ids(&mut archive, "stops.txt", "stop_id")?;
    let spans = parse_stop_times(&mut archive, &stop_ids)?;
    let (trips, untimed_trips) = parse_trips(&mut archive, &spans.by_trip)?;
    let calendars = parse_calendar(&mut archive)?;
    let calendar_dates = parse_calendar_dates(&mut archive)?;

    info!(
        trips = trips.len(),
        untimed_trips = untimed_trips.len(),
        routes = route_ids.len(),
        stops = stop_ids.len(),
        calendars = calendars.len(),
        services_with_exceptions = calendar_dates.len(),
        "Loaded GTFS schedule"
    );

    Ok(GtfsSchedule {
        trips,
        untimed_trips,
        calendars,
        calendar_dates,
        route_ids,
        stop_ids,
        unknown_stop_refs: spans.unknown_stop_refs,
        loaded_at: Utc::now(),
    })
}

// --- Helpers ---

/// Parses a GTFS time "HH:MM:SS" into seconds after midnight. Hours may exceed 23.
pub(crate) fn parse_gtfs_time(time_str: &str) -> Option<u32> {
    let mut parts = time_str.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
        return None;
    }
    hours
        .checked_mul(3600)?
        .checked_add(minutes * 60 + seconds)
}

/// Parses a GTFS date "YYYYMMDD".
pub(crate) fn parse_gtfs_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y%m%d").ok()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

struct Columns {
    file: &'static str,
    headers: StringRecord,
}

impl Columns {
    fn required(&self, name: &str) -> Result<usize, ScheduleError> {
        self.optional(name)
            .ok_or_else(|| ScheduleError::Parse(format!("{} missing {}", self.file, name)))
    }

    fn optional(&self, name: &str) -> Option<usize> {
        // some producers prefix the first header with a UTF-8 BOM
        self.headers
            .iter()
            .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
    }
}

fn open_csv<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    file: &'static str,
) -> Result<Option<(csv::Reader<Cursor<Vec<u8>>>, Columns)>, ScheduleError> {
    let mut entry = match archive.by_name(file) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut contents = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut contents)?;

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(Cursor::new(contents));
    let headers = rdr.headers()?.clone();
    Ok(Some((rdr, Columns { file, headers })))
}

fn field<'r>(record: &'r StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).unwrap_or("").trim()
}

// --- CSV parsing ---

fn parse_ids<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    file: &'static str,
    column: &str,
) -> Result<HashSet<String>, ScheduleError> {
    let Some((mut rdr, cols)) = open_csv(archive, file)? else {
        warn!(file, "GTFS file missing");
        return Ok(HashSet::new());
    };
    let idx = Some(cols.required(column)?);

    let mut ids = HashSet::new();
    for result in rdr.records() {
        let record = result?;
        if let Some(id) = non_empty(field(&record, idx)) {
            ids.insert(id);
        }
    }
    Ok(ids)
}

#[derive(Default)]
struct StopTimeSpans {
    /// trip_id -> (first stop sequence, start), (last stop sequence, end)
    by_trip: HashMap<String, TripSpan>,
    unknown_stop_refs: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy)]
struct TripSpan {
    first: (u32, Option<u32>),
    last: (u32, Option<u32>),
}

fn parse_stop_times<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    stop_ids: &HashSet<String>,
) -> Result<StopTimeSpans, ScheduleError> {
    let (mut rdr, cols) = open_csv(archive, "stop_times.txt")?
        .ok_or_else(|| ScheduleError::Parse("stop_times.txt missing from feed".into()))?;
    let idx_trip = Some(cols.required("trip_id")?);
    let idx_seq = Some(cols.required("stop_sequence")?);
    let idx_stop = cols.optional("stop_id");
    let idx_arr = cols.optional("arrival_time");
    let idx_dep = cols.optional("departure_time");

    let mut spans = StopTimeSpans::default();
    let mut skipped = 0usize;

    for result in rdr.records() {
        let record = result?;
        let trip_id = field(&record, idx_trip);
        let Ok(seq) = field(&record, idx_seq).parse::<u32>() else {
            skipped += 1;
            continue;
        };
        if trip_id.is_empty() {
            skipped += 1;
            continue;
        }

        let stop_id = field(&record, idx_stop);
        if !stop_ids.is_empty() && !stop_id.is_empty() && !stop_ids.contains(stop_id) {
            spans
                .unknown_stop_refs
                .push((trip_id.to_string(), stop_id.to_string()));
        }

        let arrival = parse_gtfs_time(field(&record, idx_arr));
        let departure = parse_gtfs_time(field(&record, idx_dep));
        let start = departure.or(arrival);
        let end = arrival.or(departure);

        spans
            .by_trip
            .entry(trip_id.to_string())
            .and_modify(|span| {
                if seq < span.first.0 {
                    span.first = (seq, start);
                }
                if seq > span.last.0 {
                    span.last = (seq, end);
                }
            })
            .or_insert(TripSpan {
                first: (seq, start),
                last: (seq, end),
            });
    }

    if skipped > 0 {
        warn!(skipped, "Skipped stop_times.txt records without trip_id or stop_sequence");
    }
    Ok(spans)
}

fn parse_trips<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    spans: &HashMap<String, TripSpan>,
) -> Result<(Vec<ScheduledTrip>, Vec<ScheduledTrip>), ScheduleError> {
    let (mut rdr, cols) = open_csv(archive, "trips.txt")?
        .ok_or_else(|| ScheduleError::Parse("trips.txt missing from feed".into()))?;
    let idx_trip = Some(cols.required("trip_id")?);
    let idx_route = Some(cols.required("route_id")?);
    let idx_service = Some(cols.required("service_id")?);
    let idx_headsign = cols.optional("trip_headsign");

    let mut trips = Vec::new();
    let mut untimed = Vec::new();
    let mut seen = HashSet::new();
    let mut skipped = 0usize;

    for result in rdr.records() {
        let record = result?;
        let trip_id = field(&record, idx_trip);
        if trip_id.is_empty() || !seen.insert(trip_id.to_string()) {
            skipped += 1;
            continue;
        }

        let mut trip = ScheduledTrip {
            trip_id: trip_id.to_string(),
            route_id: field(&record, idx_route).to_string(),
            service_id: field(&record, idx_service).to_string(),
            trip_headsign: non_empty(field(&record, idx_headsign)),
            start: 0,
            end: 0,
        };

        match spans.get(trip_id).and_then(|s| Some((s.first.1?, s.last.1?))) {
            Some((start, end)) => {
                trip.start = start;
                trip.end = end.max(start);
                trips.push(trip);
            }
            None => untimed.push(trip),
        }
    }

    if skipped > 0 {
        warn!(skipped, "Skipped trips.txt records with empty or duplicate trip_id");
    }
    Ok((trips, untimed))
}

fn parse_calendar<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<HashMap<String, ServiceCalendar>, ScheduleError> {
    let Some((mut rdr, cols)) = open_csv(archive, "calendar.txt")? else {
        info!("No calendar.txt, relying on calendar_dates.txt");
        return Ok(HashMap::new());
    };
    let idx_service = Some(cols.required("service_id")?);
    let day_idx = [
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
    ]
    .map(|day| cols.optional(day));
    let idx_start = Some(cols.required("start_date")?);
    let idx_end = Some(cols.required("end_date")?);

    let mut calendars = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let service_id = field(&record, idx_service);
        let (Some(start_date), Some(end_date)) = (
            parse_gtfs_date(field(&record, idx_start)),
            parse_gtfs_date(field(&record, idx_end)),
        ) else {
            skipped += 1;
            continue;
        };
        if service_id.is_empty() {
            skipped += 1;
            continue;
        }

        calendars.insert(
            service_id.to_string(),
            ServiceCalendar {
                service_id: service_id.to_string(),
                days: day_idx.map(|idx| field(&record, idx) == "1"),
                start_date,
                end_date,
            },
        );
    }

    if skipped > 0 {
        warn!(skipped, "Skipped calendar.txt records with invalid service_id or dates");
    }
    Ok(calendars)
}

fn parse_calendar_dates<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<HashMap<String, Vec<CalendarException>>, ScheduleError> {
    let Some((mut rdr, cols)) = open_csv(archive, "calendar_dates.txt")? else {
        return Ok(HashMap::new());
    };
    let idx_service = Some(cols.required("service_id")?);
    let idx_date = Some(cols.required("date")?);
    let idx_type = Some(cols.required("exception_type")?);

    let mut exceptions: HashMap<String, Vec<CalendarException>> = HashMap::new();
    let mut skipped = 0usize;
    for result in rdr.records() {
        let record = result?;
        let service_id = field(&record, idx_service);
        let exception_type = match field(&record, idx_type) {
            "1" => ExceptionType::Added,
            "2" => ExceptionType::Removed,
            _ => {
                skipped += 1;
                continue;
            }
        };
        let Some(date) = parse_gtfs_date(field(&record, idx_date)) else {
            skipped += 1;
            continue;
        };
        if service_id.is_empty() {
            skipped += 1;
            continue;
        }

        exceptions
            .entry(service_id.to_string())
            .or_default()
            .push(CalendarException {
                date,
                exception_type,
            });
    }

    if skipped > 0 {
        warn!(skipped, "Skipped calendar_dates.txt records with invalid fields");
    }
    Ok(exceptions)
}
