//! Error taxonomy for the refinement pipeline.
//!
//! Fatal conditions ([`ConfigError`], [`GtfsError`], [`WriteError`]) bubble up
//! through [`RefineError`]. Observation-source failures ([`SourceError`]) are
//! deliberately *not* part of [`RefineError`]: a failed page fetch abandons
//! the current day window and ingestion continues, so those errors are
//! consumed at the call site rather than propagated.

use std::io;
use std::path::PathBuf;

/// Top-level error for a refinement run. The job either completes and writes
/// both output files, or fails with one of these before writing anything.
#[derive(thiserror::Error, Debug)]
pub enum RefineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read GTFS data: {0}")]
    Gtfs(#[from] GtfsError),
    #[error("failed to write schedule output: {0}")]
    Write(#[from] WriteError),
    #[error("refinement cancelled")]
    Cancelled,
}

/// Rejected configuration, surfaced at startup before any work is done.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("desired_fraction_early must be within [0, 1], got {0}")]
    FractionOutOfRange(f64),
    #[error("{name} must be positive, got {value}")]
    NonPositiveThreshold { name: &'static str, value: i64 },
    #[error("begin_time {begin} is not before end_time {end}")]
    EmptyWindow { begin: String, end: String },
    #[error("GTFS directory does not exist: {}", .0.display())]
    MissingGtfsDir(PathBuf),
}

/// Missing or malformed GTFS input. Fatal for `stop_times.txt`.
#[derive(thiserror::Error, Debug)]
pub enum GtfsError {
    #[error("cannot open {}: {}", .path.display(), .source)]
    Open { path: PathBuf, source: io::Error },
    #[error("malformed row in {}: {}", .path.display(), .source)]
    Malformed { path: PathBuf, source: csv::Error },
    #[error("bad time-of-day value {:?} in {}", .value, .path.display())]
    BadTimeOfDay { value: String, path: PathBuf },
}

/// A single page fetch from the observation source failed. Non-fatal: the
/// surrounding day window is abandoned and the next one is attempted.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("observation source I/O failure: {0}")]
    Io(#[from] io::Error),
    #[error("malformed observation record: {0}")]
    Malformed(#[from] csv::Error),
    #[error("page fetch timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Could not produce the output stop-times files. Fatal after ingestion.
#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("cannot create output file in {}: {}", .dir.display(), .source)]
    Create { dir: PathBuf, source: io::Error },
    #[error("cannot encode output row: {0}")]
    Encode(#[from] csv::Error),
    #[error("cannot move output into place at {}: {}", .path.display(), .source)]
    Persist { path: PathBuf, source: io::Error },
}
