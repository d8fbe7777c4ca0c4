//! Core simulation types: run configuration and completion records.

use serde::{Deserialize, Serialize};

use crate::units::{TICKS_PER_HOUR, Tick};

/// Timing parameters of a single simulation run.
///
/// # Examples
///
/// ```
/// use deferrable_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(720, 48, 60);
/// assert_eq!(cfg.total_ticks(), 34_560);
/// assert_eq!(cfg.num_windows(), 576);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Ticks per simulated hour.
    pub ticks_per_hour: usize,
    /// Length of the observed horizon in hours.
    pub duration_hours: usize,
    /// Width of one aggregation window in ticks.
    pub window_ticks: usize,
}

impl SimConfig {
    /// Creates a new run configuration.
    ///
    /// # Panics
    ///
    /// Panics if any parameter is zero or the window exceeds the horizon.
    pub fn new(ticks_per_hour: usize, duration_hours: usize, window_ticks: usize) -> Self {
        assert!(ticks_per_hour > 0, "ticks_per_hour must be > 0");
        assert!(duration_hours > 0, "duration_hours must be > 0");
        assert!(window_ticks > 0, "window_ticks must be > 0");
        let cfg = Self {
            ticks_per_hour,
            duration_hours,
            window_ticks,
        };
        assert!(
            window_ticks <= cfg.total_ticks(),
            "window must fit in the horizon"
        );
        cfg
    }

    /// Ticks in the observed horizon.
    pub fn total_ticks(&self) -> usize {
        self.ticks_per_hour * self.duration_hours
    }

    /// Number of complete aggregation windows in the horizon.
    pub fn num_windows(&self) -> usize {
        self.total_ticks() / self.window_ticks
    }

    /// Windows per simulated hour (at least one).
    pub fn windows_per_hour(&self) -> usize {
        (self.ticks_per_hour / self.window_ticks).max(1)
    }
}

impl Default for SimConfig {
    /// 48 hours of 5-second ticks in 5-minute windows.
    fn default() -> Self {
        Self::new(TICKS_PER_HOUR, 48, TICKS_PER_HOUR / 12)
    }
}

/// One finished job, as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub task_id: u64,
    /// Arrival of the (sub-)task as submitted to the cluster.
    pub arrival_tick: Tick,
    pub start_tick: Tick,
    /// First tick after the job stopped running.
    pub end_tick: Tick,
    /// Queueing delay plus any idle time scheduled before the job.
    pub wait_ticks: usize,
    pub cpus: f64,
    /// Portion of `wait_ticks` the policy deliberately scheduled.
    pub scheduled_wait: usize,
}

impl CompletionRecord {
    /// Ticks the job spent running.
    pub fn run_ticks(&self) -> usize {
        self.end_tick - self.start_tick
    }

    /// Whether the job was running during tick `t`.
    pub fn is_running_at(&self, t: Tick) -> bool {
        t >= self.start_tick && t < self.end_tick
    }
}
