//! Orchestration of a full refinement run.
//!
//! `process()` reads the current schedule, ingests departures then arrivals
//! (the terminal-departure index built from departures is needed to reframe
//! frequency-trip arrivals), fits the per-route σ-multiplier for each pass,
//! and finally emits the revised stop-times files plus the adherence
//! comparison. Everything it allocates lives for the one invocation.

use std::collections::{HashMap, HashSet};

use log::{debug, info};

use crate::calendar::Calendar;
use crate::config::RefinementConfig;
use crate::error::RefineError;
use crate::gtfs::{GtfsReader, ScheduleWriter, StopTime, StopTimesTable, TripStopKey};
use crate::observations::{ObsKind, ObservationSource};
use crate::refine::adherence::{self, AdherenceReport};
use crate::refine::estimator::{self, TripStopStats};
use crate::refine::fitter;
use crate::refine::ingest::{self, TerminalIndex, TimesByRoute};
use crate::refine::CancelToken;

/// One output row: the original stop time plus whatever statistics were
/// fitted for it. Either kind of stats may be absent, in which case the
/// original time flows through to the output.
#[derive(Debug)]
pub struct RefinedStopTime {
    pub stop_time: StopTime,
    pub arrival: Option<TripStopStats>,
    pub departure: Option<TripStopStats>,
    /// True on the first stop of a trip when the configuration pins
    /// first-stop times, so published line-up times stay stable.
    pub keep_original_times: bool,
}

impl RefinedStopTime {
    pub fn new_arrival_sec(&self) -> Option<i32> {
        if self.keep_original_times {
            return self.stop_time.arrival_sec;
        }
        self.arrival
            .as_ref()
            .map(|s| s.best_value)
            .or(self.stop_time.arrival_sec)
    }

    pub fn new_departure_sec(&self) -> Option<i32> {
        if self.keep_original_times {
            return self.stop_time.departure_sec;
        }
        self.departure
            .as_ref()
            .map(|s| s.best_value)
            .or(self.stop_time.departure_sec)
    }
}

/// The refinement engine, wired to its four injected capabilities.
pub struct RefineEngine<'a> {
    config: &'a RefinementConfig,
    reader: &'a dyn GtfsReader,
    writer: &'a dyn ScheduleWriter,
    source: &'a dyn ObservationSource,
    calendar: &'a dyn Calendar,
}

impl<'a> RefineEngine<'a> {
    pub fn new(
        config: &'a RefinementConfig,
        reader: &'a dyn GtfsReader,
        writer: &'a dyn ScheduleWriter,
        source: &'a dyn ObservationSource,
        calendar: &'a dyn Calendar,
    ) -> Self {
        Self {
            config,
            reader,
            writer,
            source,
            calendar,
        }
    }

    /// Runs the whole pipeline. On success both output files exist and the
    /// returned report has been logged; on any error (or cancellation) no
    /// output file has been touched.
    pub async fn process(&self, cancel: &CancelToken) -> Result<AdherenceReport, RefineError> {
        self.config.validate()?;

        let stop_times = self.reader.read_stop_times()?;
        let frequency_trips = self.reader.read_frequency_trips()?;
        info!("{} frequency-based trips", frequency_trips.len());

        // Terminal departures are discovered during the departures pass and
        // consumed when reframing frequency-trip arrivals, so departures
        // must be ingested first.
        let mut terminals = TerminalIndex::new();
        let departure_times = self
            .read_times(&frequency_trips, &mut terminals, ObsKind::Departure, cancel)
            .await?;
        let arrival_times = self
            .read_times(&frequency_trips, &mut terminals, ObsKind::Arrival, cancel)
            .await?;
        info!(
            "{} terminal departures recorded for frequency-based trips",
            terminals.len()
        );

        let departure_stats =
            self.fit_stats(departure_times, &stop_times, ObsKind::Departure, cancel)?;
        let arrival_stats = self.fit_stats(arrival_times, &stop_times, ObsKind::Arrival, cancel)?;

        if cancel.is_cancelled() {
            return Err(RefineError::Cancelled);
        }

        let report = adherence::score(
            &stop_times,
            &arrival_stats,
            &departure_stats,
            self.config.allowable_early_sec,
            self.config.allowable_late_sec,
        );

        let rows = build_rows(
            stop_times,
            arrival_stats,
            departure_stats,
            self.config.do_not_update_first_stop_of_trip,
        );
        self.writer.write(&rows)?;

        report.log_summary();
        info!("Done creating new GTFS stop_times files");
        Ok(report)
    }

    async fn read_times(
        &self,
        frequency_trips: &HashSet<String>,
        terminals: &mut TerminalIndex,
        kind: ObsKind,
        cancel: &CancelToken,
    ) -> Result<TimesByRoute, RefineError> {
        ingest::read_observation_times(
            self.source,
            self.calendar,
            self.config,
            frequency_trips,
            terminals,
            kind,
            cancel,
        )
        .await
    }

    /// Estimates per-stop statistics and fits the σ-multiplier route by
    /// route, flattening the results into one map keyed by (trip, stop).
    fn fit_stats(
        &self,
        times_by_route: TimesByRoute,
        stop_times: &StopTimesTable,
        kind: ObsKind,
        cancel: &CancelToken,
    ) -> Result<HashMap<TripStopKey, TripStopStats>, RefineError> {
        let mut all_stats = HashMap::new();

        for (route_id, times_by_stop) in times_by_route {
            if cancel.is_cancelled() {
                return Err(RefineError::Cancelled);
            }
            debug!("Processing {} data for route={}", kind, route_id);

            let mut route_stats = HashMap::with_capacity(times_by_stop.len());
            for (key, times) in times_by_stop {
                let original = stop_times.get(&key).and_then(|st| st.time_for(kind));
                if let Some(stats) = estimator::estimate(
                    times,
                    original,
                    &key,
                    kind,
                    self.config.allowable_deviation_from_mean_sec,
                    self.config.allowable_deviation_from_original_sec,
                ) {
                    route_stats.insert(key, stats);
                }
            }

            let k = fitter::fit_route(
                &route_id,
                &mut route_stats,
                self.config.desired_fraction_early,
                self.config.fit_iterations,
            );
            info!(
                "For route={} {}: sigma multiplier {:.4} over {} trip/stops",
                route_id,
                kind,
                k,
                route_stats.len()
            );

            all_stats.extend(route_stats);
        }

        Ok(all_stats)
    }
}

/// Pairs each schedule row with its fitted statistics, in table order. The
/// stats maps are drained; each `TripStopStats` is moved into its row.
fn build_rows(
    stop_times: StopTimesTable,
    mut arrival_stats: HashMap<TripStopKey, TripStopStats>,
    mut departure_stats: HashMap<TripStopKey, TripStopStats>,
    do_not_update_first_stop_of_trip: bool,
) -> Vec<RefinedStopTime> {
    let mut rows = Vec::with_capacity(stop_times.len());
    let mut previous_trip_id: Option<String> = None;

    for (key, stop_time) in stop_times {
        let first_of_trip = previous_trip_id.as_deref() != Some(stop_time.trip_id.as_str());
        previous_trip_id = Some(stop_time.trip_id.clone());

        rows.push(RefinedStopTime {
            arrival: arrival_stats.remove(&key),
            departure: departure_stats.remove(&key),
            keep_original_times: do_not_update_first_stop_of_trip && first_of_trip,
            stop_time,
        });
    }

    rows
}
