//! Configuration for a refinement run.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ConfigError;

/// All knobs for one refinement run. Built from CLI flags in the binary;
/// tests construct it directly.
#[derive(Debug, Clone)]
pub struct RefinementConfig {
    /// Directory holding `stop_times.txt` and (optionally) `frequencies.txt`;
    /// the two output files are written next to them.
    pub gtfs_dir: PathBuf,
    /// Inclusive start of the observation window.
    pub begin_time: DateTime<Utc>,
    /// Exclusive end of the observation window.
    pub end_time: DateTime<Utc>,
    /// Target fraction of observations that should be early with respect to
    /// the revised schedule. 0.2 means roughly one vehicle in five.
    pub desired_fraction_early: f64,
    /// Outlier rejection band around the empirical mean.
    pub allowable_deviation_from_mean_sec: i32,
    /// Outlier rejection band around the existing schedule time.
    pub allowable_deviation_from_original_sec: i32,
    /// Keep the original arrival/departure for the first stop of each trip
    /// so published line-up times stay stable.
    pub do_not_update_first_stop_of_trip: bool,
    /// Adherence band below the scheduled time. Early is worse than late for
    /// passengers, so this is typically much tighter than the late band.
    pub allowable_early_sec: i32,
    /// Adherence band above the scheduled time.
    pub allowable_late_sec: i32,
    /// Rows requested per observation-source page.
    pub page_size: usize,
    /// Days per ingest sub-window.
    pub window_chunk_days: i64,
    /// Bisection depth when fitting the per-route σ-multiplier.
    pub fit_iterations: u32,
    /// Deadline for a single page fetch. A timeout abandons the current day
    /// window but not the job.
    pub page_timeout: Duration,
}

impl RefinementConfig {
    /// Rejects configurations that cannot produce a meaningful run. Called
    /// once at startup; all failures here are fatal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.desired_fraction_early) {
            return Err(ConfigError::FractionOutOfRange(
                self.desired_fraction_early,
            ));
        }
        if self.begin_time >= self.end_time {
            return Err(ConfigError::EmptyWindow {
                begin: self.begin_time.to_rfc3339(),
                end: self.end_time.to_rfc3339(),
            });
        }

        let positive = [
            (
                "allowable_deviation_from_mean_sec",
                self.allowable_deviation_from_mean_sec as i64,
            ),
            (
                "allowable_deviation_from_original_sec",
                self.allowable_deviation_from_original_sec as i64,
            ),
            ("allowable_early_sec", self.allowable_early_sec as i64),
            ("allowable_late_sec", self.allowable_late_sec as i64),
            ("page_size", self.page_size as i64),
            ("window_chunk_days", self.window_chunk_days),
            ("fit_iterations", self.fit_iterations as i64),
        ];
        for (name, value) in positive {
            if value <= 0 {
                return Err(ConfigError::NonPositiveThreshold { name, value });
            }
        }

        if !self.gtfs_dir.is_dir() {
            return Err(ConfigError::MissingGtfsDir(self.gtfs_dir.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn base_config(dir: &std::path::Path) -> RefinementConfig {
        RefinementConfig {
            gtfs_dir: dir.to_path_buf(),
            begin_time: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 3, 8, 0, 0, 0).unwrap(),
            desired_fraction_early: 0.2,
            allowable_deviation_from_mean_sec: 1200,
            allowable_deviation_from_original_sec: 1800,
            do_not_update_first_stop_of_trip: true,
            allowable_early_sec: 60,
            allowable_late_sec: 300,
            page_size: 500_000,
            window_chunk_days: 1,
            fit_iterations: 5,
            page_timeout: Duration::from_secs(120),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        assert!(base_config(dir.path()).validate().is_ok());
    }

    #[test]
    fn test_fraction_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.desired_fraction_early = 1.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::FractionOutOfRange(_))
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.end_time = cfg.begin_time;
        assert!(matches!(cfg.validate(), Err(ConfigError::EmptyWindow { .. })));
    }

    #[test]
    fn test_nonpositive_threshold_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = base_config(dir.path());
        cfg.allowable_early_sec = 0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositiveThreshold { name, .. }) if name == "allowable_early_sec"
        ));
    }

    #[test]
    fn test_missing_gtfs_dir_rejected() {
        let mut cfg = base_config(std::path::Path::new("/nonexistent/gtfs"));
        cfg.gtfs_dir = PathBuf::from("/nonexistent/gtfs");
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingGtfsDir(_))));
    }
}
