//! Robust per-(trip,stop) statistics.
//!
//! Observed times are filtered through two bands before anything is
//! computed from them: distance from the empirical mean rejects genuine
//! outliers, and distance from the existing schedule time keeps a
//! systematic labeling error from dragging the whole stop arbitrarily far
//! from its published value.

use log::debug;

use crate::gtfs::{format_time_of_day, TripStopKey};
use crate::observations::ObsKind;
use crate::stats;

/// Statistics for one (trip, stop), computed from the filtered observation
/// times. `std_dev` is `NaN` when only one observation survived filtering.
#[derive(Debug, Clone)]
pub struct TripStopStats {
    /// The μ − k·σ quantile chosen by the per-route fitter, rounded to
    /// integer seconds. Zero until the fitter has run.
    pub best_value: i32,
    /// Times that survived both filters. Never empty.
    pub filtered: Vec<i32>,
    /// Every observed time, outliers included.
    pub unfiltered: Vec<i32>,
    /// Mean of the filtered times.
    pub mean: f64,
    /// Sample standard deviation of the filtered times; `NaN` when n < 2.
    pub std_dev: f64,
    pub min: i32,
    pub max: i32,
}

/// Filters the observed times for one (trip, stop) and computes its
/// statistics. Returns `None` when there are no observations or every one
/// of them was filtered out; the stop then falls through to its original
/// schedule time downstream.
///
/// `original_sec` is the existing schedule time for the pass's kind; when
/// it is absent (untimed stop, or a trip unknown to the schedule) only the
/// deviation-from-mean filter applies.
pub fn estimate(
    times: Vec<i32>,
    original_sec: Option<i32>,
    key: &TripStopKey,
    kind: ObsKind,
    max_deviation_from_mean_sec: i32,
    max_deviation_from_original_sec: i32,
) -> Option<TripStopStats> {
    if times.is_empty() {
        return None;
    }

    let unfiltered_mean = stats::mean(&times);

    let mut filtered: Vec<i32> = Vec::with_capacity(times.len());
    for &t in &times {
        let dev_from_mean = (t as f64 - unfiltered_mean).abs();
        if dev_from_mean > max_deviation_from_mean_sec as f64 {
            debug!(
                "For trip={} stop={} filtering out {} time={} because it is \
                 {:.1} secs from the mean={}, more than the allowable {} secs",
                key.trip_id,
                key.stop_id,
                kind,
                format_time_of_day(t),
                dev_from_mean,
                format_time_of_day(unfiltered_mean.round() as i32),
                max_deviation_from_mean_sec
            );
            continue;
        }
        if let Some(original) = original_sec {
            if (t - original).abs() > max_deviation_from_original_sec {
                debug!(
                    "For trip={} stop={} filtering out {} time={} because it \
                     is {} secs from the original time={}, more than the \
                     allowable {} secs",
                    key.trip_id,
                    key.stop_id,
                    kind,
                    format_time_of_day(t),
                    t - original,
                    format_time_of_day(original),
                    max_deviation_from_original_sec
                );
                continue;
            }
        }
        filtered.push(t);
    }

    if filtered.is_empty() {
        return None;
    }

    let mean = stats::mean(&filtered);
    let std_dev = stats::sample_std_dev(&filtered, mean);
    let min = *filtered.iter().min().unwrap();
    let max = *filtered.iter().max().unwrap();

    Some(TripStopStats {
        best_value: 0,
        filtered,
        unfiltered: times,
        mean,
        std_dev,
        min,
        max,
    })
}
