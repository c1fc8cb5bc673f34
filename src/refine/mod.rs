//! The schedule refinement core: observation ingestion, robust per-stop
//! estimation, per-route quantile fitting, and adherence scoring.

pub mod adherence;
pub mod engine;
pub mod estimator;
pub mod fitter;
pub mod ingest;

pub use adherence::AdherenceReport;
pub use engine::{RefineEngine, RefinedStopTime};
pub use estimator::TripStopStats;
pub use ingest::{TerminalIndex, TerminalKey, TimesByRoute, TimesByTripStop};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation signal, checked between observation pages and
/// between route fits. Cancelling never leaves a partial output file since
/// outputs are only written at the very end of a run.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
