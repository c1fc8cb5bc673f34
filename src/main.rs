//! CLI entry point for the schedule refiner.
//!
//! Reads historical arrival/departure observations, fits robust per-stop
//! statistics, and writes revised `stop_times.txt_new` and
//! `stop_times.txt_extended` files into the GTFS directory, logging a
//! schedule-adherence comparison of the old and new schedules.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::warn;

use schedule_refiner::calendar::AgencyCalendar;
use schedule_refiner::config::RefinementConfig;
use schedule_refiner::gtfs::{DirGtfsReader, DirScheduleWriter};
use schedule_refiner::observations::CsvObservationSource;
use schedule_refiner::refine::{CancelToken, RefineEngine};

#[derive(Parser)]
#[command(name = "schedule_refiner")]
#[command(about = "Refines a GTFS schedule from historical AVL observations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit per-stop statistics and write the revised stop_times files
    Refine {
        /// Directory containing stop_times.txt; outputs are written next to it
        #[arg(long)]
        gtfs_dir: PathBuf,

        /// CSV file of arrival/departure observations
        #[arg(long)]
        observations: PathBuf,

        /// Agency timezone (e.g. America/New_York)
        #[arg(long, default_value = "UTC")]
        timezone: chrono_tz::Tz,

        /// Inclusive start of the observation window (RFC 3339)
        #[arg(long)]
        begin: DateTime<Utc>,

        /// Exclusive end of the observation window (RFC 3339)
        #[arg(long)]
        end: DateTime<Utc>,

        /// Target fraction of observations early against the new schedule
        #[arg(long, default_value_t = 0.2)]
        desired_fraction_early: f64,

        /// Outlier rejection band around the empirical mean, in seconds
        #[arg(long, default_value_t = 1200)]
        allowable_deviation_from_mean_sec: i32,

        /// Outlier rejection band around the existing schedule time, in seconds
        #[arg(long, default_value_t = 1800)]
        allowable_deviation_from_original_sec: i32,

        /// Keep the original times for the first stop of every trip
        #[arg(long)]
        do_not_update_first_stop_of_trip: bool,

        /// Adherence band below the scheduled time, in seconds
        #[arg(long, default_value_t = 60)]
        allowable_early_sec: i32,

        /// Adherence band above the scheduled time, in seconds
        #[arg(long, default_value_t = 300)]
        allowable_late_sec: i32,

        /// Observations requested per page
        #[arg(long, default_value_t = 500_000)]
        page_size: usize,

        /// Days per ingest sub-window
        #[arg(long, default_value_t = 1)]
        window_chunk_days: i64,

        /// Bisection depth for the per-route quantile fit
        #[arg(long, default_value_t = 5)]
        fit_iterations: u32,

        /// Deadline in seconds for a single page fetch
        #[arg(long, default_value_t = 120)]
        page_timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file
    env_logger::init(); // Initialize logger

    let cli = Cli::parse();

    match cli.command {
        Commands::Refine {
            gtfs_dir,
            observations,
            timezone,
            begin,
            end,
            desired_fraction_early,
            allowable_deviation_from_mean_sec,
            allowable_deviation_from_original_sec,
            do_not_update_first_stop_of_trip,
            allowable_early_sec,
            allowable_late_sec,
            page_size,
            window_chunk_days,
            fit_iterations,
            page_timeout_secs,
        } => {
            let config = RefinementConfig {
                gtfs_dir: gtfs_dir.clone(),
                begin_time: begin,
                end_time: end,
                desired_fraction_early,
                allowable_deviation_from_mean_sec,
                allowable_deviation_from_original_sec,
                do_not_update_first_stop_of_trip,
                allowable_early_sec,
                allowable_late_sec,
                page_size,
                window_chunk_days,
                fit_iterations,
                page_timeout: Duration::from_secs(page_timeout_secs),
            };

            let reader = DirGtfsReader::new(gtfs_dir.clone());
            let writer = DirScheduleWriter::new(gtfs_dir);
            let source = CsvObservationSource::open(&observations).with_context(|| {
                format!("cannot load observations from {}", observations.display())
            })?;
            let calendar = AgencyCalendar::new(timezone);

            let cancel = CancelToken::new();
            let cancel_on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received; cancelling after the current page");
                    cancel_on_signal.cancel();
                }
            });

            let engine = RefineEngine::new(&config, &reader, &writer, &source, &calendar);
            engine.process(&cancel).await?;
        }
    }

    Ok(())
}
