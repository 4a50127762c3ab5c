//! Runtime configuration read from the environment (and `.env`).

use std::path::PathBuf;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use chrono_tz::Tz;
use thiserror::Error;

use crate::sources::streets::StreetsConfig;

pub const DEFAULT_GTFS_URL: &str = "http://feed.rvtd.org/googleFeeds/static/google_transit.zip";
pub const DEFAULT_TRIP_UPDATES_URL: &str =
    "http://feed.rvtd.org/googleFeeds/realtime/trip_updates.proto";
pub const DEFAULT_VEHICLE_POSITIONS_URL: &str =
    "http://feed.rvtd.org/googleFeeds/realtime/vehicle_positions.proto";
pub const DEFAULT_ALERTS_URL: &str =
    "http://feed.rvtd.org/googleFeeds/realtime/service_alerts.proto";
pub const DEFAULT_OBA_VEHICLES_URL: &str =
    "http://localhost:8080/onebusaway-api-webapp/api/where/vehicles-for-agency/1739.json";
pub const DEFAULT_OBA_API_KEY: &str = "TEST";
pub const DEFAULT_OBA_TRIP_ID_PREFIX: &str = "1739_";
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Los_Angeles;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}={value:?} is not valid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything the monitor needs to know about where its inputs live.
///
/// Source URLs set to an empty string disable that source.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub gtfs_url: String,
    pub gtfs_path: PathBuf,
    pub trip_updates_url: Option<String>,
    pub vehicle_positions_url: Option<String>,
    pub alerts_url: Option<String>,
    pub oba_vehicles_url: Option<String>,
    pub oba_api_key: Option<String>,
    pub oba_trip_id_prefix: Option<String>,
    /// Present only when `STREETS_HOST_NAME` is set.
    pub streets: Option<StreetsConfig>,
    pub window_back: Duration,
    pub window_fwd: Duration,
    pub timezone: Tz,
    pub reports_dir: PathBuf,
    pub http_timeout: std::time::Duration,
}

impl MonitorConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let optional = |key: &str, default: &str| {
            let value = string(key, default);
            (!value.is_empty()).then_some(value)
        };

        let streets = lookup("STREETS_HOST_NAME")
            .filter(|host| !host.is_empty())
            .map(|host| {
                let mut config = StreetsConfig::for_host(&host);
                if let Some(action) = lookup("STREETS_SOAP_ACTION") {
                    config.soap_action = action;
                }
                if let Some(ns) = lookup("STREETS_NAMESPACE") {
                    config.namespace = ns;
                }
                config
            });

        let timezone = match lookup("AGENCY_TIMEZONE") {
            Some(name) => name.parse::<Tz>().map_err(|e| ConfigError::Invalid {
                key: "AGENCY_TIMEZONE",
                value: name.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_TIMEZONE,
        };

        Ok(Self {
            gtfs_url: string("GTFS_URL", DEFAULT_GTFS_URL),
            gtfs_path: PathBuf::from(string("GTFS_PATH", "data/downloads/google_transit.zip")),
            trip_updates_url: optional("GTFS_RT_TRIP_UPDATES_URL", DEFAULT_TRIP_UPDATES_URL),
            vehicle_positions_url: optional(
                "GTFS_RT_VEHICLE_POSITIONS_URL",
                DEFAULT_VEHICLE_POSITIONS_URL,
            ),
            alerts_url: optional("GTFS_RT_ALERTS_URL", DEFAULT_ALERTS_URL),
            oba_vehicles_url: optional("OBA_VEHICLES_URL", DEFAULT_OBA_VEHICLES_URL),
            oba_api_key: optional("OBA_API_KEY", DEFAULT_OBA_API_KEY),
            oba_trip_id_prefix: optional("OBA_TRIP_ID_PREFIX", DEFAULT_OBA_TRIP_ID_PREFIX),
            streets,
            window_back: minutes(&lookup, "WINDOW_BACK_MINUTES", 10)?,
            window_fwd: minutes(&lookup, "WINDOW_FWD_MINUTES", 10)?,
            timezone,
            reports_dir: PathBuf::from(string("REPORTS_DIR", "data/reports")),
            http_timeout: std::time::Duration::from_secs(number(
                &lookup,
                "HTTP_TIMEOUT_SECS",
                30,
            )?),
        })
    }

    /// Agency-local wall-clock time for `instant`.
    pub fn local_time(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.timezone).naive_local()
    }
}

fn number<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: std::num::ParseIntError| {
            ConfigError::Invalid {
                key,
                value,
                reason: e.to_string(),
            }
        }),
    }
}

/// Longest window accepted on either side of `now`.
const MAX_WINDOW_MINUTES: u64 = 24 * 60;

fn minutes<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let n = number(lookup, key, default)?;
    if n > MAX_WINDOW_MINUTES {
        return Err(ConfigError::Invalid {
            key,
            value: n.to_string(),
            reason: format!("must be at most {MAX_WINDOW_MINUTES} minutes"),
        });
    }
    Ok(Duration::minutes(n as i64))
}
