//! Per-route quantile fitting.
//!
//! Each stop's times are roughly Gaussian, so μ − k·σ would be an exact
//! quantile if they were Gaussian-exact. They are not, so k is found by
//! bisection: the empirical fraction of observations early with respect to
//! μ − k·σ, pooled across the route, is driven toward the configured
//! target. Routes are fit independently because their distributions differ
//! (express vs. local, terminal-heavy vs. midroute).

use std::collections::HashMap;

use log::debug;

use crate::gtfs::TripStopKey;
use crate::refine::estimator::TripStopStats;
use crate::stats::count_early;

/// Fraction of pooled observations that fall strictly below μ − k·σ of
/// their own stop. Stops with fewer than two filtered observations have no
/// usable σ and contribute nothing. Returns 0.0 when no stop qualifies,
/// which makes the bisection converge k toward 0.
pub fn fraction_early<'a, I>(stats: I, k: f64) -> f64
where
    I: IntoIterator<Item = &'a TripStopStats>,
{
    let mut total_times = 0usize;
    let mut total_early = 0usize;
    for s in stats {
        if s.filtered.len() >= 2 {
            total_times += s.filtered.len();
            total_early += count_early(&s.filtered, s.mean - s.std_dev * k);
        }
    }

    if total_times == 0 {
        return 0.0;
    }
    total_early as f64 / total_times as f64
}

/// Finds the σ-multiplier for one route by bisection on k ∈ [0, 2]
/// starting at 1.0, then fills in each stop's `best_value` as
/// `round(μ − k·σ)` (just `round(μ)` when σ is undefined). Returns the k
/// that was used.
pub fn fit_route(
    route_id: &str,
    stats: &mut HashMap<TripStopKey, TripStopStats>,
    desired_fraction_early: f64,
    iterations: u32,
) -> f64 {
    let mut low = 0.0f64;
    let mut high = 2.0f64;
    let mut current = 1.0f64;

    for iteration in 0..iterations {
        let achieved = fraction_early(stats.values(), current);
        debug!(
            "For route={} iteration={} stdDevs={:.4} desiredFractionEarly={} \
             fractionEarly={:.3}",
            route_id, iteration, current, desired_fraction_early, achieved
        );
        if achieved < desired_fraction_early {
            // Too few early: the subtracted quantile is too aggressive.
            high = current;
            current = (current + low) / 2.0;
        } else {
            low = current;
            current = (current + high) / 2.0;
        }
    }

    for s in stats.values_mut() {
        let mut best = s.mean;
        if !s.std_dev.is_nan() {
            best -= s.std_dev * current;
        }
        s.best_value = best.round() as i32;
    }

    current
}
