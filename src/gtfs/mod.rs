//! GTFS reading and writing, limited to the two files the engine cares
//! about: `stop_times.txt` (read and rewritten) and `frequencies.txt`
//! (read for the set of frequency-based trips).

mod frequencies;
mod stop_times;
mod writer;

pub use frequencies::{read_frequency_trips, FrequencyRecord};
pub use stop_times::{read_stop_times, StopTime, StopTimesTable, TripStopKey};
pub use writer::{DirScheduleWriter, ScheduleWriter, EXTENDED_FILE, NEW_FILE};

use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::GtfsError;

/// Parses a GTFS time-of-day (`HH:MM:SS`, hours may exceed 24 for
/// after-midnight service) into seconds from midnight. Returns `None` for
/// anything that is not three colon-separated non-negative numbers with
/// in-range minutes and seconds.
pub fn parse_time_of_day(s: &str) -> Option<i32> {
    let mut parts = s.splitn(3, ':');
    let h: i32 = parts.next()?.trim().parse().ok()?;
    let m: i32 = parts.next()?.parse().ok()?;
    let sec: i32 = parts.next()?.parse().ok()?;
    if h < 0 || !(0..60).contains(&m) || !(0..60).contains(&sec) {
        return None;
    }
    Some(h * 3600 + m * 60 + sec)
}

/// Formats seconds from midnight as GTFS `HH:MM:SS`. Hours are not wrapped
/// at 24, matching GTFS after-midnight conventions.
pub fn format_time_of_day(sec: i32) -> String {
    format!("{:02}:{:02}:{:02}", sec / 3600, (sec % 3600) / 60, sec % 60)
}

/// Reads the schedule inputs out of a GTFS directory.
pub trait GtfsReader: Send + Sync {
    /// The current stop-times table, in source order (repaired if needed).
    fn read_stop_times(&self) -> Result<StopTimesTable, GtfsError>;

    /// Trip ids of all frequency-based trips.
    fn read_frequency_trips(&self) -> Result<HashSet<String>, GtfsError>;
}

/// [`GtfsReader`] over a plain GTFS directory on disk.
pub struct DirGtfsReader {
    dir: PathBuf,
}

impl DirGtfsReader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl GtfsReader for DirGtfsReader {
    fn read_stop_times(&self) -> Result<StopTimesTable, GtfsError> {
        read_stop_times(&self.dir.join("stop_times.txt"))
    }

    fn read_frequency_trips(&self) -> Result<HashSet<String>, GtfsError> {
        read_frequency_trips(&self.dir.join("frequencies.txt"))
    }
}
