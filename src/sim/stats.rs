//! Post-hoc aggregation of a finished run into fixed-width windows.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::cluster::{Cluster, UsageSummary};
use super::types::{CompletionRecord, SimConfig};
use crate::units::ticks_to_hours;

/// Per-window statistics derived from a complete simulation run.
///
/// Computed after the run from the cluster's completion records and
/// allocation series, so the windows always agree with the raw data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Mean CPU allocation in each window.
    pub cpu_windows: Vec<f64>,
    /// Job-ticks of presence in each window.
    pub job_counts: Vec<u64>,
    /// Sum of per-job wait, in hours.
    pub total_wait_hours: f64,
    /// Number of completion records.
    pub scheduled_jobs: usize,
    /// CPU-hours served from reserved capacity over the whole run.
    #[serde(default)]
    pub reserved_cpu_hours: f64,
    /// CPU-hours above the reserved capacity over the whole run.
    #[serde(default)]
    pub on_demand_cpu_hours: f64,
}

impl RunStats {
    pub fn from_cluster<C: Cluster + ?Sized>(cluster: &C, config: &SimConfig) -> Self {
        Self::from_records(cluster.details(), cluster.runtime_allocation(), config)
            .with_usage(cluster.usage(), config.ticks_per_hour)
    }

    /// Attaches the reserved/on-demand split, converted to CPU-hours.
    pub fn with_usage(mut self, usage: UsageSummary, ticks_per_hour: usize) -> Self {
        let tph = ticks_per_hour.max(1) as f64;
        self.reserved_cpu_hours = usage.reserved_cpu_ticks / tph;
        self.on_demand_cpu_hours = usage.on_demand_cpu_ticks / tph;
        self
    }

    /// Aggregates `records` and the tick-indexed `allocation` over the
    /// configured horizon. Activity past the horizon is ignored; allocation
    /// shorter than the horizon counts as zero.
    pub fn from_records(
        records: &[CompletionRecord],
        allocation: &[f64],
        config: &SimConfig,
    ) -> Self {
        let horizon = config.total_ticks();
        let width = config.window_ticks;
        let windows = config.num_windows();

        // presence per tick via a difference array over [start, min(end, horizon))
        let mut delta = vec![0i64; horizon + 1];
        for r in records.iter().filter(|r| r.start_tick < horizon) {
            delta[r.start_tick] += 1;
            delta[r.end_tick.min(horizon)] -= 1;
        }
        let mut present = 0i64;
        let per_tick: Vec<u64> = delta[..horizon]
            .iter()
            .map(|d| {
                present += d;
                present.max(0) as u64
            })
            .collect();

        let job_counts = (0..windows)
            .map(|w| per_tick[w * width..(w + 1) * width].iter().sum())
            .collect();

        let cpu_windows = (0..windows)
            .map(|w| {
                let sum: f64 = (w * width..(w + 1) * width)
                    .map(|t| allocation.get(t).copied().unwrap_or(0.0))
                    .sum();
                sum / width as f64
            })
            .collect();

        let wait_ticks: u64 = records.iter().map(|r| r.wait_ticks as u64).sum();

        Self {
            cpu_windows,
            job_counts,
            total_wait_hours: ticks_to_hours(wait_ticks, config.ticks_per_hour),
            scheduled_jobs: records.len(),
            reserved_cpu_hours: 0.0,
            on_demand_cpu_hours: 0.0,
        }
    }

    /// Mean of the CPU windows falling in each hour.
    pub fn hourly_cpu(&self, windows_per_hour: usize) -> Vec<f64> {
        self.cpu_windows
            .chunks(windows_per_hour.max(1))
            .map(|c| c.iter().sum::<f64>() / c.len() as f64)
            .collect()
    }

    /// Peak of the per-window mean CPU allocation.
    pub fn peak_cpu(&self) -> f64 {
        self.cpu_windows.iter().copied().fold(0.0, f64::max)
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mean_cpu = if self.cpu_windows.is_empty() {
            0.0
        } else {
            self.cpu_windows.iter().sum::<f64>() / self.cpu_windows.len() as f64
        };
        writeln!(f, "--- Run Summary ---")?;
        writeln!(f, "Scheduled jobs:   {}", self.scheduled_jobs)?;
        writeln!(f, "Total wait:       {:.2} h", self.total_wait_hours)?;
        writeln!(f, "Mean CPU:         {mean_cpu:.2}")?;
        writeln!(
            f,
            "CPU-hours:        {:.2} reserved, {:.2} on-demand",
            self.reserved_cpu_hours, self.on_demand_cpu_hours
        )?;
        write!(f, "Peak window CPU:  {:.2}", self.peak_cpu())
    }
}
