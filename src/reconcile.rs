//! Trip reconciliation of one source against the schedule baseline.
//!
//! Pure functions only: no I/O and no logging, so identical inputs always
//! produce identical output.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::sources::SourceRecord;

/// The four discrepancy classes for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TripDiscrepancies {
    /// Active trips the source does not mention.
    pub missing_active: BTreeSet<String>,
    /// Trip ids the source reports that are not active.
    pub invalid: BTreeSet<String>,
    /// Active trips the source reports without the expected detail.
    pub without_detail: BTreeSet<String>,
    /// References of records that carry no trip id, sorted. One entry per
    /// record, so a repeated reference appears more than once.
    pub orphan: Vec<String>,
    /// Distinct trip ids reported by the source.
    pub trips_seen: usize,
    /// Distinct active trip ids reported by the source.
    pub trips_matched: usize,
}

/// Splits `records` into orphans and distinct trip ids, OR-ing `has_detail`
/// over every record of the same trip.
pub fn dedupe(records: &[SourceRecord]) -> (HashMap<&str, bool>, Vec<&SourceRecord>) {
    let mut seen: HashMap<&str, bool> = HashMap::new();
    let mut orphans = Vec::new();

    for record in records {
        if record.is_orphan() {
            orphans.push(record);
        } else {
            *seen.entry(record.trip_id.as_str()).or_insert(false) |= record.has_detail;
        }
    }

    (seen, orphans)
}

/// Compares one source's records against the active trips.
///
/// Every record lands in exactly one of orphan, invalid, matched with detail
/// or matched without detail; every active trip is either matched or missing.
pub fn reconcile(active_trips: &HashSet<&str>, records: &[SourceRecord]) -> TripDiscrepancies {
    let (seen, orphans) = dedupe(records);

    let invalid = seen
        .keys()
        .filter(|id| !active_trips.contains(*id))
        .map(|id| id.to_string())
        .collect();

    let missing_active = active_trips
        .iter()
        .filter(|id| !seen.contains_key(*id))
        .map(|id| id.to_string())
        .collect();

    let matched: Vec<(&str, bool)> = seen
        .iter()
        .filter(|(id, _)| active_trips.contains(*id))
        .map(|(id, detail)| (*id, *detail))
        .collect();

    let without_detail = matched
        .iter()
        .filter(|(_, detail)| !detail)
        .map(|(id, _)| id.to_string())
        .collect();

    let mut orphan: Vec<String> = orphans.iter().map(|r| r.raw_ref.clone()).collect();
    orphan.sort();

    TripDiscrepancies {
        missing_active,
        invalid,
        without_detail,
        orphan,
        trips_seen: seen.len(),
        trips_matched: matched.len(),
    }
}
