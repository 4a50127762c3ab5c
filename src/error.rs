//! Error types shared by the schedule, the source adapters and the pass.

use chrono::NaiveDate;
use thiserror::Error;

/// The static schedule could not provide a baseline.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no service periods active on {0}")]
    NoServicePeriods(NaiveDate),
    #[error("GTFS parse error: {0}")]
    Parse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// A whole source could not be checked during this pass.
///
/// Raised by an adapter's fetch when the network call, the decoding of the
/// payload or the remote service itself fails. Never aborts the pass.
#[derive(Debug, Error)]
pub enum SourceUnavailable {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("HTTP status {0}")]
    Status(reqwest::StatusCode),
    #[error("protobuf decode error: {0}")]
    Protobuf(#[from] prost::DecodeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("SOAP fault: {0}")]
    SoapFault(String),
    #[error("unexpected payload: {0}")]
    Payload(String),
    #[error("fetch task failed: {0}")]
    Task(String),
}

impl From<quick_xml::Error> for SourceUnavailable {
    fn from(err: quick_xml::Error) -> Self {
        SourceUnavailable::Xml(err.to_string())
    }
}

/// One malformed record inside an otherwise successful fetch.
///
/// The record is skipped and counted against its source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("record {reference}: {reason}")]
pub struct SourceError {
    pub reference: String,
    pub reason: String,
}

impl SourceError {
    pub fn new(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}
