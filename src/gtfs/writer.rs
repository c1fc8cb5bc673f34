//! Emission of the revised stop-times files.
//!
//! Two files go into the GTFS directory: `stop_times.txt_new` in strict
//! GTFS format and `stop_times.txt_extended` with diagnostic columns. Both
//! are built in temporary files and renamed into place only once complete,
//! so a failed or cancelled run never leaves a partial output. The original
//! `stop_times.txt` is never overwritten.

use std::io::Write;
use std::path::PathBuf;

use tempfile::NamedTempFile;

use crate::error::WriteError;
use crate::gtfs::format_time_of_day;
use crate::refine::estimator::TripStopStats;
use crate::refine::RefinedStopTime;

pub const NEW_FILE: &str = "stop_times.txt_new";
pub const EXTENDED_FILE: &str = "stop_times.txt_extended";

const GTFS_COLUMNS: [&str; 10] = [
    "trip_id",
    "arrival_time",
    "departure_time",
    "stop_id",
    "stop_sequence",
    "stop_headsign",
    "pickup_type",
    "drop_off_type",
    "shape_dist_traveled",
    "timepoint",
];

const DIAGNOSTIC_COLUMNS: [&str; 14] = [
    "original_arrival_time",
    "arrival_min",
    "arrival_max",
    "arrival_mean",
    "arrival_std_dev",
    "arrival_n_filtered",
    "arrival_n_unfiltered",
    "original_departure_time",
    "departure_min",
    "departure_max",
    "departure_mean",
    "departure_std_dev",
    "departure_n_filtered",
    "departure_n_unfiltered",
];

/// Writes the revised schedule rows out.
pub trait ScheduleWriter: Send + Sync {
    fn write(&self, rows: &[RefinedStopTime]) -> Result<(), WriteError>;
}

/// [`ScheduleWriter`] that writes both files into a GTFS directory.
pub struct DirScheduleWriter {
    dir: PathBuf,
}

impl DirScheduleWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl ScheduleWriter for DirScheduleWriter {
    fn write(&self, rows: &[RefinedStopTime]) -> Result<(), WriteError> {
        let mut new_tmp = self.temp_file()?;
        let mut extended_tmp = self.temp_file()?;

        write_new(new_tmp.as_file_mut(), rows)?;
        write_extended(extended_tmp.as_file_mut(), rows)?;

        self.persist(new_tmp, NEW_FILE)?;
        self.persist(extended_tmp, EXTENDED_FILE)?;
        Ok(())
    }
}

impl DirScheduleWriter {
    fn temp_file(&self) -> Result<NamedTempFile, WriteError> {
        NamedTempFile::new_in(&self.dir).map_err(|source| WriteError::Create {
            dir: self.dir.clone(),
            source,
        })
    }

    fn persist(&self, tmp: NamedTempFile, name: &str) -> Result<(), WriteError> {
        let path = self.dir.join(name);
        tmp.persist(&path).map_err(|e| WriteError::Persist {
            path,
            source: e.error,
        })?;
        Ok(())
    }
}

fn opt_time(sec: Option<i32>) -> String {
    sec.map(format_time_of_day).unwrap_or_default()
}

fn opt_str(s: &Option<String>) -> &str {
    s.as_deref().unwrap_or("")
}

fn gtfs_fields(row: &RefinedStopTime) -> [String; 10] {
    let st = &row.stop_time;
    [
        st.trip_id.clone(),
        opt_time(row.new_arrival_sec()),
        opt_time(row.new_departure_sec()),
        st.stop_id.clone(),
        st.stop_sequence.to_string(),
        opt_str(&st.stop_headsign).to_string(),
        opt_str(&st.pickup_type).to_string(),
        opt_str(&st.drop_off_type).to_string(),
        opt_str(&st.shape_dist_traveled).to_string(),
        opt_str(&st.timepoint).to_string(),
    ]
}

/// Diagnostics for one kind: original time plus min/max/mean/σ/counts.
/// Empty strings when no statistics exist for the stop.
fn diagnostic_fields(original: Option<i32>, stats: &Option<TripStopStats>) -> [String; 7] {
    match stats {
        None => [
            opt_time(original),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ],
        Some(s) => [
            opt_time(original),
            format_time_of_day(s.min),
            format_time_of_day(s.max),
            format!("{:.1}", s.mean),
            if s.std_dev.is_nan() {
                String::new()
            } else {
                format!("{:.1}", s.std_dev)
            },
            s.filtered.len().to_string(),
            s.unfiltered.len().to_string(),
        ],
    }
}

fn write_new<W: Write>(out: W, rows: &[RefinedStopTime]) -> Result<(), WriteError> {
    let mut w = csv::WriterBuilder::new().from_writer(out);
    w.write_record(GTFS_COLUMNS)?;
    for row in rows {
        w.write_record(gtfs_fields(row))?;
    }
    w.flush().map_err(csv::Error::from)?;
    Ok(())
}

fn write_extended<W: Write>(out: W, rows: &[RefinedStopTime]) -> Result<(), WriteError> {
    let mut w = csv::WriterBuilder::new().from_writer(out);

    let header: Vec<&str> = GTFS_COLUMNS
        .iter()
        .chain(DIAGNOSTIC_COLUMNS.iter())
        .copied()
        .collect();
    w.write_record(header)?;

    for row in rows {
        let mut record: Vec<String> = gtfs_fields(row).to_vec();
        record.extend(diagnostic_fields(row.stop_time.arrival_sec, &row.arrival));
        record.extend(diagnostic_fields(
            row.stop_time.departure_sec,
            &row.departure,
        ));
        w.write_record(record)?;
    }
    w.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::StopTime;

    fn stop_time(trip: &str, stop: &str, seq: u32) -> StopTime {
        StopTime {
            trip_id: trip.to_string(),
            stop_id: stop.to_string(),
            stop_sequence: seq,
            arrival_sec: Some(25200),
            departure_sec: Some(25260),
            stop_headsign: None,
            pickup_type: Some("0".to_string()),
            drop_off_type: None,
            shape_dist_traveled: None,
            timepoint: None,
        }
    }

    fn stats(best_value: i32, times: Vec<i32>) -> TripStopStats {
        let mean = crate::stats::mean(&times);
        let std_dev = crate::stats::sample_std_dev(&times, mean);
        let min = *times.iter().min().unwrap();
        let max = *times.iter().max().unwrap();
        TripStopStats {
            best_value,
            filtered: times.clone(),
            unfiltered: times,
            mean,
            std_dev,
            min,
            max,
        }
    }

    fn read_lines(path: &std::path::Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_writes_both_files_without_touching_original() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("stop_times.txt"), "sentinel").unwrap();

        let rows = vec![RefinedStopTime {
            stop_time: stop_time("t1", "s1", 1),
            arrival: Some(stats(25100, vec![25050, 25150])),
            departure: None,
            keep_original_times: false,
        }];

        let writer = DirScheduleWriter::new(dir.path().to_path_buf());
        writer.write(&rows).unwrap();

        assert!(dir.path().join(NEW_FILE).exists());
        assert!(dir.path().join(EXTENDED_FILE).exists());
        assert_eq!(
            std::fs::read_to_string(dir.path().join("stop_times.txt")).unwrap(),
            "sentinel"
        );
    }

    #[test]
    fn test_new_file_row_content() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![RefinedStopTime {
            stop_time: stop_time("t1", "s1", 1),
            arrival: Some(stats(25100, vec![25050, 25150])),
            departure: None,
            keep_original_times: false,
        }];

        DirScheduleWriter::new(dir.path().to_path_buf())
            .write(&rows)
            .unwrap();

        let lines = read_lines(&dir.path().join(NEW_FILE));
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("trip_id,arrival_time,departure_time"));
        // Refined arrival 25100 → 06:58:20; departure falls back to 07:01:00.
        assert_eq!(lines[1], "t1,06:58:20,07:01:00,s1,1,,0,,,");
    }

    #[test]
    fn test_extended_file_diagnostics() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![RefinedStopTime {
            stop_time: stop_time("t1", "s1", 1),
            arrival: Some(stats(25100, vec![25050, 25150])),
            departure: None,
            keep_original_times: false,
        }];

        DirScheduleWriter::new(dir.path().to_path_buf())
            .write(&rows)
            .unwrap();

        let lines = read_lines(&dir.path().join(EXTENDED_FILE));
        let header: Vec<&str> = lines[0].split(',').collect();
        assert_eq!(header.len(), 24);
        assert_eq!(header[10], "original_arrival_time");
        assert_eq!(header[17], "original_departure_time");

        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(fields[10], "07:00:00"); // original arrival
        assert_eq!(fields[11], "06:57:30"); // arrival min
        assert_eq!(fields[12], "06:59:10"); // arrival max
        assert_eq!(fields[13], "25100.0"); // arrival mean
        assert_eq!(fields[15], "2"); // n filtered
        assert_eq!(fields[16], "2"); // n unfiltered
        // No departure stats: original passes through, diagnostics blank.
        assert_eq!(fields[17], "07:01:00");
        assert_eq!(fields[18], "");
    }

    #[test]
    fn test_row_count_matches_input() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<RefinedStopTime> = (1..=5)
            .map(|seq| RefinedStopTime {
                stop_time: stop_time("t1", &format!("s{seq}"), seq),
                arrival: None,
                departure: None,
                keep_original_times: false,
            })
            .collect();

        DirScheduleWriter::new(dir.path().to_path_buf())
            .write(&rows)
            .unwrap();

        let lines = read_lines(&dir.path().join(NEW_FILE));
        assert_eq!(lines.len(), 1 + 5);
    }
}
