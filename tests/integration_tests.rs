use std::io::{Cursor, Write};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use gtfs_rt_monitor::gtfs_rt::{
    FeedEntity, FeedHeader, FeedMessage, TripDescriptor, TripUpdate, VehicleDescriptor,
    VehiclePosition, trip_update::StopTimeUpdate,
};
use gtfs_rt_monitor::parser::parse_feed;
use gtfs_rt_monitor::report::text::emit_text;
use gtfs_rt_monitor::report::{SourceOutcome, TripCheck, assemble_report, html::render_html};
use gtfs_rt_monitor::schedule::{active_trips, load_schedule_from_reader};
use gtfs_rt_monitor::sources::{SourceKind, trip_updates, vehicle_positions};
use prost::Message;
use zip::write::SimpleFileOptions;

fn gtfs_zip() -> Cursor<Vec<u8>> {
    let files = [
        ("routes.txt", "route_id\nR1\n"),
        ("stops.txt", "stop_id\nS1\nS2\n"),
        (
            "trips.txt",
            "route_id,service_id,trip_id\nR1,WKDY,T1\nR1,WKDY,T2\nR1,WKDY,LATE\n",
        ),
        (
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,07:00:00,07:00:00,S1,1\n\
             T1,07:45:00,07:45:00,S2,2\n\
             T2,07:20:00,07:20:00,S1,1\n\
             T2,08:10:00,08:10:00,S2,2\n\
             LATE,23:50:00,23:50:00,S1,1\n\
             LATE,25:00:00,25:00:00,S2,2\n",
        ),
        (
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             WKDY,1,1,1,1,1,0,0,20240101,20241231\n",
        ),
    ];

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in files {
        writer.start_file(name, SimpleFileOptions::default()).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    let mut cursor = writer.finish().unwrap();
    cursor.set_position(0);
    cursor
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 5)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn header() -> FeedHeader {
    FeedHeader {
        gtfs_realtime_version: "2.0".to_string(),
        ..Default::default()
    }
}

fn trip_updates_feed() -> Vec<u8> {
    let entity = |id: &str, trip_id: &str, updates: u32| FeedEntity {
        id: id.to_string(),
        trip_update: Some(TripUpdate {
            trip: TripDescriptor {
                trip_id: Some(trip_id.to_string()),
                ..Default::default()
            },
            stop_time_update: (1..=updates)
                .map(|seq| StopTimeUpdate {
                    stop_sequence: Some(seq),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        ..Default::default()
    };
    FeedMessage {
        header: header(),
        entity: vec![entity("1", "T1", 2), entity("2", "T2", 0), entity("3", "GHOST", 1)],
    }
    .encode_to_vec()
}

fn vehicle_positions_feed() -> Vec<u8> {
    FeedMessage {
        header: header(),
        entity: vec![
            FeedEntity {
                id: "v1".to_string(),
                vehicle: Some(VehiclePosition {
                    trip: Some(TripDescriptor {
                        trip_id: Some("T2".to_string()),
                        ..Default::default()
                    }),
                    vehicle: Some(VehicleDescriptor {
                        id: Some("bus-7".to_string()),
                        ..Default::default()
                    }),
                    stop_id: Some("S2".to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            FeedEntity {
                id: "v2".to_string(),
                vehicle: Some(VehiclePosition {
                    vehicle: Some(VehicleDescriptor {
                        id: Some("bus-8".to_string()),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ],
    }
    .encode_to_vec()
}

#[test]
fn test_full_pipeline() {
    let schedule = load_schedule_from_reader(gtfs_zip()).expect("Failed to load schedule");
    let now = at(7, 30);
    let back = Duration::minutes(10);
    let fwd = Duration::minutes(10);

    let active = active_trips(&schedule, now, back, fwd);
    let ids = active.as_ref().unwrap().ids();
    assert!(ids.contains("T1") && ids.contains("T2"));
    assert!(!ids.contains("LATE"));

    let tu = trip_updates::normalize(&parse_feed(&trip_updates_feed()).unwrap());
    let vp = vehicle_positions::normalize(&parse_feed(&vehicle_positions_feed()).unwrap());

    let report = assemble_report(
        now,
        back,
        fwd,
        &active,
        vec![
            SourceOutcome {
                kind: SourceKind::VehiclePositions,
                result: Ok(vp),
            },
            SourceOutcome {
                kind: SourceKind::TripUpdates,
                result: Ok(tu),
            },
        ],
        None,
    );

    assert!(report.baseline_valid);
    let tu = report.source(SourceKind::TripUpdates).unwrap();
    let TripCheck::Computed(d) = &tu.trips else {
        panic!("trip updates should be computed");
    };
    assert!(d.missing_active.is_empty());
    assert_eq!(d.invalid.iter().collect::<Vec<_>>(), vec!["GHOST"]);
    assert_eq!(d.without_detail.iter().collect::<Vec<_>>(), vec!["T2"]);

    let vp = report.source(SourceKind::VehiclePositions).unwrap();
    let d = vp.trips.computed().unwrap();
    assert_eq!(d.missing_active.iter().collect::<Vec<_>>(), vec!["T1"]);
    assert_eq!(d.orphan.iter().collect::<Vec<_>>(), vec!["bus-8"]);
    assert_eq!(vp.orphan_count, 1);

    let mut lines: Vec<String> = Vec::new();
    emit_text(&report, &mut lines).unwrap();
    assert!(lines.contains(&"active trip id T1 not in GTFS-RT Vehicles".to_string()));
    assert!(lines.contains(&"trip id GHOST in GTFS-RT Trip Updates is invalid".to_string()));

    let html = render_html(&report);
    assert!(html.contains("<h2 id=\"trip_updates\">GTFS-RT Trip Updates</h2>"));
    assert!(html.contains("<li>GHOST</li>"));
}

#[test]
fn test_previous_day_service_is_active_after_midnight() {
    let schedule = load_schedule_from_reader(gtfs_zip()).unwrap();

    // LATE runs 23:50 to 25:00 on Tuesday's service day.
    let now = NaiveDate::from_ymd_opt(2024, 3, 6)
        .unwrap()
        .and_hms_opt(0, 30, 0)
        .unwrap();
    let active = active_trips(&schedule, now, Duration::minutes(10), Duration::minutes(10)).unwrap();

    let late = active.get("LATE").unwrap();
    assert_eq!(late.service_date, NaiveDate::from_ymd_opt(2024, 3, 5).unwrap());
    assert_eq!(active.len(), 1);
}

#[test]
fn test_unavailable_source_does_not_affect_others() {
    let schedule = load_schedule_from_reader(gtfs_zip()).unwrap();
    let now = at(7, 30);
    let active = active_trips(&schedule, now, Duration::minutes(10), Duration::minutes(10));

    let report = assemble_report(
        now,
        Duration::minutes(10),
        Duration::minutes(10),
        &active,
        vec![
            SourceOutcome {
                kind: SourceKind::TripUpdates,
                result: parse_feed(&[0xFF, 0xFE, 0x00, 0x01]).map(|f| trip_updates::normalize(&f)),
            },
            SourceOutcome {
                kind: SourceKind::VehiclePositions,
                result: Ok(vehicle_positions::normalize(
                    &parse_feed(&vehicle_positions_feed()).unwrap(),
                )),
            },
        ],
        None,
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["sources"][0]["status"], "unavailable");
    assert_eq!(json["sources"][1]["status"], "ok");
    assert_eq!(json["sources"][1]["trips"]["result"], "computed");
}
