//! AVL arrival/departure observations and the source they are fetched from.
//!
//! [`ObservationSource`] is the capability the engine pages observations out
//! of. Implement it over a database for production use; the bundled
//! [`CsvObservationSource`] reads an exported CSV file, which is plenty for
//! offline analysis of a single agency.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::path::Path;

use crate::error::SourceError;

/// Whether an observation records a vehicle arriving at or departing a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObsKind {
    Arrival,
    Departure,
}

impl std::fmt::Display for ObsKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObsKind::Arrival => write!(f, "arrivals"),
            ObsKind::Departure => write!(f, "departures"),
        }
    }
}

/// A single AVL observation: one vehicle detected arriving at or departing
/// one scheduled stop.
#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
    pub route_id: String,
    pub trip_id: String,
    pub stop_id: String,
    /// Index of the stop within the trip's path; 0 is the terminal.
    pub stop_path_index: u32,
    pub vehicle_id: String,
    pub block_id: String,
    /// Absolute wall-clock instant of the detection.
    pub time: DateTime<Utc>,
    pub kind: ObsKind,
}

/// Pages observations out of storage.
///
/// A returned page shorter than `limit` signals the end of the window.
/// Implementations must treat `window_start` as inclusive and `window_end`
/// as exclusive.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    async fn fetch(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        kind: ObsKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Observation>, SourceError>;
}

/// File-backed [`ObservationSource`] over an exported observations CSV.
///
/// The whole file is loaded once at construction; `fetch` then filters and
/// slices in memory. Columns: `route_id,trip_id,stop_id,stop_path_index,
/// vehicle_id,block_id,time,kind` with `time` in RFC 3339 and `kind` one of
/// `arrival`/`departure`.
pub struct CsvObservationSource {
    observations: Vec<Observation>,
}

impl CsvObservationSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let mut rdr = csv::Reader::from_reader(file);

        let mut observations = Vec::new();
        for result in rdr.deserialize() {
            let obs: Observation = result?;
            observations.push(obs);
        }

        Ok(Self { observations })
    }

    /// Builds a source directly from records, used by tests.
    pub fn from_records(observations: Vec<Observation>) -> Self {
        Self { observations }
    }
}

#[async_trait]
impl ObservationSource for CsvObservationSource {
    async fn fetch(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        kind: ObsKind,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Observation>, SourceError> {
        let page = self
            .observations
            .iter()
            .filter(|o| o.kind == kind && o.time >= window_start && o.time < window_end)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(page)
    }
}
