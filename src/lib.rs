pub mod config;
pub mod error;
pub mod fetch;
pub mod inspect;
pub mod output;
pub mod parser;
pub mod reconcile;
pub mod report;
pub mod schedule;
pub mod sources;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
