//! Schedule-adherence comparison between the original and revised schedule.
//!
//! Scores every raw (unfiltered) observation against both schedules so the
//! improvement from adopting the revised stop times can be read directly
//! off the report. Mid-trip rows are judged on departures; the last stop of
//! a trip is judged on its arrival, since nothing departs a terminal.

use std::collections::HashMap;

use log::info;

use crate::gtfs::{StopTimesTable, TripStopKey};
use crate::refine::estimator::TripStopStats;

/// Early/late counts for the original and revised schedules over the same
/// observations. All comparisons are strict: an observation exactly on the
/// edge of a band is on time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdherenceReport {
    pub total_points: usize,
    pub early_orig: usize,
    pub late_orig: usize,
    pub early_new: usize,
    pub late_new: usize,
}

impl AdherenceReport {
    pub fn on_time_fraction_orig(&self) -> f64 {
        if self.total_points == 0 {
            return 0.0;
        }
        (self.total_points - self.early_orig - self.late_orig) as f64 / self.total_points as f64
    }

    pub fn on_time_fraction_new(&self) -> f64 {
        if self.total_points == 0 {
            return 0.0;
        }
        (self.total_points - self.early_new - self.late_new) as f64 / self.total_points as f64
    }

    pub fn log_summary(&self) {
        info!(
            "For original schedule numDataPoints={} early={} late={} \
             percentageOnTime={:.2}",
            self.total_points,
            self.early_orig,
            self.late_orig,
            100.0 * self.on_time_fraction_orig()
        );
        info!(
            "For new schedule numDataPoints={} early={} late={} \
             percentageOnTime={:.2}",
            self.total_points,
            self.early_new,
            self.late_new,
            100.0 * self.on_time_fraction_new()
        );
    }
}

/// Walks the ordered stop-time table and scores every unfiltered
/// observation against the original and the fitted schedule time.
pub fn score(
    stop_times: &StopTimesTable,
    arrival_stats: &HashMap<TripStopKey, TripStopStats>,
    departure_stats: &HashMap<TripStopKey, TripStopStats>,
    allowable_early_sec: i32,
    allowable_late_sec: i32,
) -> AdherenceReport {
    info!("Processing schedule adherence information...");

    let mut report = AdherenceReport::default();
    let rows: Vec<_> = stop_times.values().collect();

    for (i, current) in rows.iter().enumerate() {
        let next = rows.get(i + 1);
        let last_of_trip = next.map_or(true, |n| n.trip_id != current.trip_id);

        let key = current.key();
        let (stats, original) = if last_of_trip {
            (arrival_stats.get(&key), current.arrival_sec)
        } else {
            (departure_stats.get(&key), current.departure_sec)
        };

        let (Some(stats), Some(original)) = (stats, original) else {
            continue;
        };
        let revised = stats.best_value;

        report.total_points += stats.unfiltered.len();
        for &t in &stats.unfiltered {
            if t < original - allowable_early_sec {
                report.early_orig += 1;
            } else if t > original + allowable_late_sec {
                report.late_orig += 1;
            }
            if t < revised - allowable_early_sec {
                report.early_new += 1;
            } else if t > revised + allowable_late_sec {
                report.late_new += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs::StopTime;
    use indexmap::IndexMap;

    fn stop_time(trip: &str, stop: &str, seq: u32, arrival: i32, departure: i32) -> StopTime {
        StopTime {
            trip_id: trip.to_string(),
            stop_id: stop.to_string(),
            stop_sequence: seq,
            arrival_sec: Some(arrival),
            departure_sec: Some(departure),
            stop_headsign: None,
            pickup_type: None,
            drop_off_type: None,
            shape_dist_traveled: None,
            timepoint: None,
        }
    }

    fn stats(best_value: i32, unfiltered: Vec<i32>) -> TripStopStats {
        let mean = crate::stats::mean(&unfiltered);
        let std_dev = crate::stats::sample_std_dev(&unfiltered, mean);
        let min = *unfiltered.iter().min().unwrap();
        let max = *unfiltered.iter().max().unwrap();
        TripStopStats {
            best_value,
            filtered: unfiltered.clone(),
            unfiltered,
            mean,
            std_dev,
            min,
            max,
        }
    }

    fn table(rows: Vec<StopTime>) -> StopTimesTable {
        let mut t = IndexMap::new();
        for row in rows {
            t.insert(row.key(), row);
        }
        t
    }

    #[test]
    fn test_strict_band_counts() {
        // Departure scheduled at 600, revised down to 540, observations
        // {480,540,600,660,720}, bands ±60. Strict comparisons make 660
        // on-time for the original and 540 on-time against itself.
        let rows = table(vec![
            stop_time("t1", "s1", 1, 590, 600),
            stop_time("t1", "s2", 2, 900, 910),
        ]);
        let mut departures = HashMap::new();
        departures.insert(
            TripStopKey::new("t1", "s1"),
            stats(540, vec![480, 540, 600, 660, 720]),
        );

        let report = score(&rows, &HashMap::new(), &departures, 60, 60);

        assert_eq!(report.total_points, 5);
        assert_eq!(report.early_orig, 1); // only 480 < 540
        assert_eq!(report.late_orig, 1); // only 720 > 660
        assert_eq!(report.early_new, 0); // nothing < 480
        assert_eq!(report.late_new, 2); // 660 and 720 > 600
        assert!((report.on_time_fraction_orig() - 0.6).abs() < 1e-10);
        assert!((report.on_time_fraction_new() - 0.6).abs() < 1e-10);
    }

    #[test]
    fn test_last_stop_uses_arrival() {
        let rows = table(vec![
            stop_time("t1", "s1", 1, 100, 110),
            stop_time("t1", "s2", 2, 500, 510),
        ]);
        // Departure stats exist for s2 but must be ignored; arrival stats
        // drive the last stop.
        let mut arrivals = HashMap::new();
        arrivals.insert(TripStopKey::new("t1", "s2"), stats(500, vec![700]));
        let mut departures = HashMap::new();
        departures.insert(TripStopKey::new("t1", "s2"), stats(510, vec![400]));

        let report = score(&rows, &arrivals, &departures, 60, 60);

        assert_eq!(report.total_points, 1);
        // 700 > 500 + 60 against the original arrival
        assert_eq!(report.late_orig, 1);
    }

    #[test]
    fn test_trip_boundary_is_last_stop() {
        let rows = table(vec![
            stop_time("t1", "s1", 1, 100, 110),
            stop_time("t2", "s1", 1, 200, 210),
        ]);
        // t1/s1 is the last stop of t1 even though more rows follow.
        let mut arrivals = HashMap::new();
        arrivals.insert(TripStopKey::new("t1", "s1"), stats(100, vec![100]));

        let report = score(&rows, &arrivals, &HashMap::new(), 60, 60);
        assert_eq!(report.total_points, 1);
        assert_eq!(report.early_orig, 0);
        assert_eq!(report.late_orig, 0);
    }

    #[test]
    fn test_rows_without_stats_skipped() {
        let rows = table(vec![stop_time("t1", "s1", 1, 100, 110)]);
        let report = score(&rows, &HashMap::new(), &HashMap::new(), 60, 60);
        assert_eq!(report, AdherenceReport::default());
        assert_eq!(report.on_time_fraction_orig(), 0.0);
    }
}
