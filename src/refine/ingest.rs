//! Observation ingestion: paging, frequency-trip reframing, and the
//! per-route accumulator.
//!
//! The query window is split into day-sized sub-windows and each sub-window
//! is paged with offset/limit. Both levels matter: one offset/limit scan
//! over the whole window degrades as the offset grows, and row-at-a-time
//! iteration costs a round-trip per row. A failed or timed-out page
//! abandons its sub-window only; the run continues and simply sees less
//! data.

use std::cmp;
use std::collections::{HashMap, HashSet};

use chrono::Duration;
use log::{debug, error, info};

use crate::calendar::Calendar;
use crate::config::RefinementConfig;
use crate::error::RefineError;
use crate::gtfs::{format_time_of_day, TripStopKey};
use crate::observations::{ObsKind, Observation, ObservationSource};
use crate::refine::CancelToken;

/// Identity of a single physical run of a block on one service day.
/// vehicle_id is part of the key because multiple vehicles may cover the
/// same block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TerminalKey {
    pub vehicle_id: String,
    pub block_id: String,
    pub day_of_year: u32,
}

impl TerminalKey {
    pub fn for_observation(obs: &Observation, calendar: &dyn Calendar) -> Self {
        Self {
            vehicle_id: obs.vehicle_id.clone(),
            block_id: obs.block_id.clone(),
            day_of_year: calendar.day_of_year(obs.time),
        }
    }
}

/// Measured first-stop departure time per run, keyed by [`TerminalKey`].
/// Holds at most one entry per key; a later departure for the same run
/// overwrites the earlier one. Lives for a single `process()` invocation.
#[derive(Debug, Default)]
pub struct TerminalIndex(HashMap<TerminalKey, i32>);

impl TerminalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: TerminalKey, seconds_into_day: i32) {
        self.0.insert(key, seconds_into_day);
    }

    pub fn get(&self, key: &TerminalKey) -> Option<i32> {
        self.0.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Observed times for one (trip, stop): seconds into the day, or seconds
/// since the measured trip start for frequency-based trips.
pub type TimesByTripStop = HashMap<TripStopKey, Vec<i32>>;

/// The accumulator: route → (trip, stop) → observed times.
pub type TimesByRoute = HashMap<String, TimesByTripStop>;

/// Reads one kind of observation over the configured window into the
/// accumulator. The departures pass must run before the arrivals pass so
/// `terminals` is fully populated before arrivals on frequency trips are
/// reframed.
pub async fn read_observation_times(
    source: &dyn ObservationSource,
    calendar: &dyn Calendar,
    config: &RefinementConfig,
    frequency_trips: &HashSet<String>,
    terminals: &mut TerminalIndex,
    kind: ObsKind,
    cancel: &CancelToken,
) -> Result<TimesByRoute, RefineError> {
    info!(
        "Reading {} between {} and {}",
        kind, config.begin_time, config.end_time
    );

    let mut times_by_route = TimesByRoute::new();
    let chunk = Duration::days(config.window_chunk_days);

    let mut window_start = config.begin_time;
    while window_start < config.end_time {
        let window_end = cmp::min(window_start + chunk, config.end_time);
        info!(
            "Reading a window of {} between {} and {}",
            kind, window_start, window_end
        );

        let mut offset = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(RefineError::Cancelled);
            }

            let fetch = source.fetch(window_start, window_end, kind, offset, config.page_size);
            let page = match tokio::time::timeout(config.page_timeout, fetch).await {
                Err(_) => {
                    error!(
                        "Page fetch of {} timed out after {:?}; abandoning \
                         window {}..{}",
                        kind, config.page_timeout, window_start, window_end
                    );
                    break;
                }
                Ok(Err(e)) => {
                    error!(
                        "Observation source failed for window {}..{}: {}; \
                         abandoning window",
                        window_start, window_end, e
                    );
                    break;
                }
                Ok(Ok(page)) => page,
            };

            let page_len = page.len();
            for obs in page {
                record_terminal_departure(&obs, calendar, frequency_trips, terminals);
                accumulate(obs, calendar, frequency_trips, terminals, &mut times_by_route);
            }

            offset += page_len;
            info!("Read in total of {} {}", offset, kind);

            if page_len < config.page_size {
                break;
            }
        }

        window_start = window_end;
    }

    Ok(times_by_route)
}

/// A departure from the first stop of a frequency-based trip is that run's
/// measured start; remember it for reframing the rest of the run.
fn record_terminal_departure(
    obs: &Observation,
    calendar: &dyn Calendar,
    frequency_trips: &HashSet<String>,
    terminals: &mut TerminalIndex,
) {
    if obs.kind == ObsKind::Departure
        && obs.stop_path_index == 0
        && frequency_trips.contains(&obs.trip_id)
    {
        let seconds = calendar.seconds_into_day(obs.time);
        terminals.record(TerminalKey::for_observation(obs, calendar), seconds);
    }
}

/// Converts one observation into its stored seconds value and appends it to
/// the accumulator. The observation is consumed; nothing beyond the seconds
/// value (and the routing keys) is kept.
fn accumulate(
    obs: Observation,
    calendar: &dyn Calendar,
    frequency_trips: &HashSet<String>,
    terminals: &TerminalIndex,
    times_by_route: &mut TimesByRoute,
) {
    let mut t = calendar.seconds_into_day(obs.time);

    if frequency_trips.contains(&obs.trip_id) {
        let terminal_key = TerminalKey::for_observation(&obs, calendar);
        match terminals.get(&terminal_key) {
            None => {
                debug!(
                    "No terminal departure recorded for vehicle={} block={} \
                     day={}; dropping {} observation for trip={} stop={}",
                    obs.vehicle_id,
                    obs.block_id,
                    terminal_key.day_of_year,
                    obs.kind,
                    obs.trip_id,
                    obs.stop_id
                );
                return;
            }
            Some(terminal) if terminal > t => {
                // An observation before the run even started means the data
                // for this run is inconsistent (most likely duplicate
                // arrivals/departures for the vehicle/trip/stop).
                error!(
                    "Got an arrival or departure at {} before the start of \
                     the trip at {}; dropping {} observation for trip={} \
                     stop={} vehicle={}",
                    format_time_of_day(t),
                    format_time_of_day(terminal),
                    obs.kind,
                    obs.trip_id,
                    obs.stop_id,
                    obs.vehicle_id
                );
                return;
            }
            Some(terminal) => t -= terminal,
        }
    }

    let key = TripStopKey::new(&obs.trip_id, &obs.stop_id);
    times_by_route
        .entry(obs.route_id)
        .or_default()
        .entry(key)
        // Sized for the usual 5-14 day observation window rather than the
        // default capacity.
        .or_insert_with(|| Vec::with_capacity(5))
        .push(t);
}
