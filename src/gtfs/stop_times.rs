//! The `stop_times.txt` table, loaded in source order.
//!
//! Output files should diff cleanly against the input, so the original row
//! order is kept whenever possible. Order is repaired (a full sort by
//! trip_id then stop_sequence) only when a trip's rows are interleaved or a
//! stop_sequence decreases, since first-stop-of-trip detection depends on
//! trips being contiguous and ascending.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use indexmap::IndexMap;
use log::{info, warn};
use serde::Deserialize;

use crate::error::GtfsError;
use crate::gtfs::parse_time_of_day;
use crate::observations::ObsKind;

/// Identity of one schedule slot: a (trip, stop) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TripStopKey {
    pub trip_id: String,
    pub stop_id: String,
}

impl TripStopKey {
    pub fn new(trip_id: &str, stop_id: &str) -> Self {
        Self {
            trip_id: trip_id.to_string(),
            stop_id: stop_id.to_string(),
        }
    }
}

/// Ordered stop-times table. Iteration order is output row order.
pub type StopTimesTable = IndexMap<TripStopKey, StopTime>;

/// One row of `stop_times.txt`. Times are seconds from midnight of the
/// service day and may exceed 86400 for after-midnight service; `None`
/// means the field was blank (untimed stop). The remaining GTFS columns are
/// passed through untouched.
#[derive(Debug, Clone)]
pub struct StopTime {
    pub trip_id: String,
    pub stop_id: String,
    pub stop_sequence: u32,
    pub arrival_sec: Option<i32>,
    pub departure_sec: Option<i32>,
    pub stop_headsign: Option<String>,
    pub pickup_type: Option<String>,
    pub drop_off_type: Option<String>,
    pub shape_dist_traveled: Option<String>,
    pub timepoint: Option<String>,
}

impl StopTime {
    pub fn key(&self) -> TripStopKey {
        TripStopKey::new(&self.trip_id, &self.stop_id)
    }

    /// The scheduled time for the given observation kind.
    pub fn time_for(&self, kind: ObsKind) -> Option<i32> {
        match kind {
            ObsKind::Arrival => self.arrival_sec,
            ObsKind::Departure => self.departure_sec,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawStopTime {
    trip_id: String,
    arrival_time: Option<String>,
    departure_time: Option<String>,
    stop_id: String,
    stop_sequence: u32,
    #[serde(default)]
    stop_headsign: Option<String>,
    #[serde(default)]
    pickup_type: Option<String>,
    #[serde(default)]
    drop_off_type: Option<String>,
    #[serde(default)]
    shape_dist_traveled: Option<String>,
    #[serde(default)]
    timepoint: Option<String>,
}

fn parse_optional_time(
    raw: Option<String>,
    path: &Path,
) -> Result<Option<i32>, GtfsError> {
    match raw {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_time_of_day(&s)
            .map(Some)
            .ok_or_else(|| GtfsError::BadTimeOfDay {
                value: s,
                path: path.to_path_buf(),
            }),
    }
}

/// Loads `stop_times.txt` into an ordered table keyed by (trip, stop).
pub fn read_stop_times(path: &Path) -> Result<StopTimesTable, GtfsError> {
    info!("Reading in original stop_times file {}...", path.display());

    let file = File::open(path).map_err(|source| GtfsError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(file);

    let mut rows: Vec<StopTime> = Vec::new();
    for result in rdr.deserialize() {
        let raw: RawStopTime = result.map_err(|source| GtfsError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        rows.push(StopTime {
            arrival_sec: parse_optional_time(raw.arrival_time, path)?,
            departure_sec: parse_optional_time(raw.departure_time, path)?,
            trip_id: raw.trip_id,
            stop_id: raw.stop_id,
            stop_sequence: raw.stop_sequence,
            stop_headsign: raw.stop_headsign,
            pickup_type: raw.pickup_type,
            drop_off_type: raw.drop_off_type,
            shape_dist_traveled: raw.shape_dist_traveled,
            timepoint: raw.timepoint,
        });
    }

    if has_order_violation(&rows) {
        warn!(
            "stop_times rows are out of order; sorting by trip_id and \
             stop_sequence. Output files will not match the input row order."
        );
        rows.sort_by(|a, b| {
            a.trip_id
                .cmp(&b.trip_id)
                .then(a.stop_sequence.cmp(&b.stop_sequence))
        });
    }

    let mut table = StopTimesTable::with_capacity(rows.len());
    for row in rows {
        table.insert(row.key(), row);
    }
    info!("Read {} stop_times rows", table.len());

    Ok(table)
}

/// True when a trip's rows reappear after the trip was left, or a
/// stop_sequence decreases within a contiguous run of one trip.
fn has_order_violation(rows: &[StopTime]) -> bool {
    let mut completed_trips: HashSet<&str> = HashSet::new();
    let mut previous: Option<&StopTime> = None;

    for row in rows {
        match previous {
            Some(prev) if prev.trip_id == row.trip_id => {
                if row.stop_sequence < prev.stop_sequence {
                    return true;
                }
            }
            _ => {
                if !completed_trips.insert(row.trip_id.as_str()) {
                    // Trip id seen before, left, and now reappearing.
                    return true;
                }
            }
        }
        previous = Some(row);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn stop_time(trip: &str, stop: &str, seq: u32) -> StopTime {
        StopTime {
            trip_id: trip.to_string(),
            stop_id: stop.to_string(),
            stop_sequence: seq,
            arrival_sec: Some(25200),
            departure_sec: Some(25260),
            stop_headsign: None,
            pickup_type: None,
            drop_off_type: None,
            shape_dist_traveled: None,
            timepoint: None,
        }
    }

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_ordered_rows_not_flagged() {
        let rows = vec![
            stop_time("t1", "a", 1),
            stop_time("t1", "b", 2),
            stop_time("t2", "a", 1),
        ];
        assert!(!has_order_violation(&rows));
    }

    #[test]
    fn test_decreasing_sequence_flagged() {
        let rows = vec![stop_time("t1", "a", 2), stop_time("t1", "b", 1)];
        assert!(has_order_violation(&rows));
    }

    #[test]
    fn test_reappearing_trip_flagged() {
        let rows = vec![
            stop_time("t1", "a", 1),
            stop_time("t2", "a", 1),
            stop_time("t1", "b", 2),
        ];
        assert!(has_order_violation(&rows));
    }

    #[test]
    fn test_read_preserves_source_order() {
        let f = write_fixture(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t2,07:00:00,07:01:00,a,1\n\
             t2,07:05:00,07:06:00,b,2\n\
             t1,08:00:00,08:01:00,a,1\n",
        );
        let table = read_stop_times(f.path()).unwrap();
        let trips: Vec<&str> = table.values().map(|st| st.trip_id.as_str()).collect();
        // t2 stays first: no violation, so no sort
        assert_eq!(trips, vec!["t2", "t2", "t1"]);
    }

    #[test]
    fn test_read_repairs_broken_order() {
        let f = write_fixture(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t2,07:00:00,07:01:00,a,1\n\
             t1,08:00:00,08:01:00,a,1\n\
             t2,07:05:00,07:06:00,b,2\n",
        );
        let table = read_stop_times(f.path()).unwrap();
        let keys: Vec<(&str, u32)> = table
            .values()
            .map(|st| (st.trip_id.as_str(), st.stop_sequence))
            .collect();
        assert_eq!(keys, vec![("t1", 1), ("t2", 1), ("t2", 2)]);
    }

    #[test]
    fn test_read_blank_times_become_none() {
        let f = write_fixture(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t1,,,a,1\n",
        );
        let table = read_stop_times(f.path()).unwrap();
        let st = table.values().next().unwrap();
        assert_eq!(st.arrival_sec, None);
        assert_eq!(st.departure_sec, None);
    }

    #[test]
    fn test_read_rejects_bad_time() {
        let f = write_fixture(
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             t1,7 am,07:01:00,a,1\n",
        );
        assert!(matches!(
            read_stop_times(f.path()),
            Err(GtfsError::BadTimeOfDay { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        assert!(matches!(
            read_stop_times(Path::new("/nonexistent/stop_times.txt")),
            Err(GtfsError::Open { .. })
        ));
    }
}
