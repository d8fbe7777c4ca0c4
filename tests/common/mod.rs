//! Shared test fixtures for integration tests.
#![allow(dead_code)]

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use deferrable_sim::carbon::{CarbonModel, TRACE_OFFSET_HOURS};
use deferrable_sim::scheduling::{PolicyKey, create_scheduler};
use deferrable_sim::sim::cluster::SimulationCluster;
use deferrable_sim::sim::driver::Driver;
use deferrable_sim::sim::stats::RunStats;
use deferrable_sim::sim::types::SimConfig;
use deferrable_sim::task::{Task, TaskClass, WaitingTimes};

/// Small time base: 4 ticks per hour, 12 hours, 2-tick windows.
pub fn small_config() -> SimConfig {
    SimConfig::new(4, 12, 2)
}

/// Hourly intensities with a daily dip, stretched to 4 ticks per hour.
///
/// Hours 10-15 of every day are cheap, the rest expensive.
pub fn daily_carbon() -> CarbonModel {
    let hourly: Vec<f64> = (0..72)
        .map(|h| if (10..16).contains(&(h % 24)) { 0.1 } else { 0.5 + (h % 3) as f64 * 0.1 })
        .collect();
    CarbonModel::from_values("daily", hourly).stretched(4)
}

/// Ten jobs spread over the first eight hours, alternating short and long.
///
/// Waiting budgets are one hour for short jobs and three for long ones.
pub fn mixed_tasks() -> Vec<Task> {
    let mut tasks: Vec<Task> = (0..10u64)
        .map(|i| {
            let arrival = (i as usize) * 3;
            let (len, class) = if i % 2 == 0 {
                (2, TaskClass::Short)
            } else {
                (9, TaskClass::Long)
            };
            Task::new(i, arrival, len, 1.0 + (i % 3) as f64).with_class(class)
        })
        .collect();
    WaitingTimes::new(1, 3).assign(&mut tasks, 4);
    tasks
}

/// Runs `tasks` under `key` and returns the stats and the finished cluster.
pub fn run_policy(
    key: PolicyKey,
    tasks: Vec<Task>,
    carbon: &CarbonModel,
    cpu_limits: Vec<f64>,
) -> (RunStats, SimulationCluster) {
    let config = small_config();
    let policy = create_scheduler(key, carbon.clone(), config.ticks_per_hour, cpu_limits);
    let mut driver = Driver::new(config, policy, SimulationCluster::new(1_000));
    let stats = driver.run(tasks).expect("run should complete");
    (stats, driver.into_cluster())
}

/// Writes a task trace CSV with `n` jobs arriving every ten minutes.
pub fn write_task_trace(dir: &Path, name: &str, n: usize) -> PathBuf {
    let mut body = String::from("job_id,arrival_s,length_s,cpus\n");
    for i in 0..n {
        let length = 60 + (i % 7) * 90;
        let cpus = 1 + i % 4;
        writeln!(body, "{i},{},{length},{cpus}", i * 600).expect("string write");
    }
    let path = dir.join(format!("{name}.csv"));
    fs::write(&path, body).expect("write task trace");
    path
}

/// Writes a carbon trace CSV whose usable rows start at the file offset.
///
/// `hours` readings follow the skipped prefix, cycling through a ramp.
pub fn write_carbon_trace(dir: &Path, name: &str, hours: usize) -> PathBuf {
    let mut body = String::from("datetime,carbon_intensity_avg\n");
    for row in 0..TRACE_OFFSET_HOURS + hours {
        let value = 100 + (row % 12) * 25;
        writeln!(body, "{row},{value}").expect("string write");
    }
    let path = dir.join(format!("{name}.csv"));
    fs::write(&path, body).expect("write carbon trace");
    path
}
