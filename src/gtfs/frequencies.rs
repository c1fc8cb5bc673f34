//! The `frequencies.txt` table. Only the set of trip ids matters to the
//! engine: a trip listed here is frequency-based, so its observed times are
//! measured relative to the run's terminal departure rather than the clock.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

use log::info;
use serde::Deserialize;

use crate::error::GtfsError;

/// One row of `frequencies.txt`, kept whole so malformed files fail loudly
/// even though the engine only uses the trip id.
#[derive(Debug, Deserialize)]
pub struct FrequencyRecord {
    pub trip_id: String,
    pub start_time: String,
    pub end_time: String,
    pub headway_secs: u32,
    #[serde(default)]
    pub exact_times: Option<u8>,
}

/// Returns the trip ids of all frequency-based trips. A missing
/// `frequencies.txt` is normal (most agencies are purely schedule-based)
/// and yields an empty set.
pub fn read_frequency_trips(path: &Path) -> Result<HashSet<String>, GtfsError> {
    if !path.exists() {
        info!("No frequencies file at {}; no frequency-based trips", path.display());
        return Ok(HashSet::new());
    }
    info!("Reading in frequencies file {}...", path.display());

    let file = File::open(path).map_err(|source| GtfsError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let mut rdr = csv::Reader::from_reader(file);

    let mut trips = HashSet::new();
    for result in rdr.deserialize() {
        let record: FrequencyRecord = result.map_err(|source| GtfsError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        trips.insert(record.trip_id);
    }

    Ok(trips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_is_empty_set() {
        let trips =
            read_frequency_trips(Path::new("/nonexistent/frequencies.txt")).unwrap();
        assert!(trips.is_empty());
    }

    #[test]
    fn test_trip_ids_collected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(
            b"trip_id,start_time,end_time,headway_secs,exact_times\n\
              freq-1,06:00:00,22:00:00,600,0\n\
              freq-2,06:00:00,22:00:00,900,\n\
              freq-1,22:00:00,25:00:00,1200,0\n",
        )
        .unwrap();

        let trips = read_frequency_trips(f.path()).unwrap();
        assert_eq!(trips.len(), 2);
        assert!(trips.contains("freq-1"));
        assert!(trips.contains("freq-2"));
    }

    #[test]
    fn test_malformed_row_rejected() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(
            b"trip_id,start_time,end_time,headway_secs\n\
              freq-1,06:00:00,22:00:00,not-a-number\n",
        )
        .unwrap();

        assert!(matches!(
            read_frequency_trips(f.path()),
            Err(GtfsError::Malformed { .. })
        ));
    }
}
