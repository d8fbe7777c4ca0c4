//! Dataset generation: paired baseline/policy runs over random samples.
//!
//! Each sample draws a carbon start index and a task subset, runs the
//! no-deferral reference and the policy under study on identical inputs, and
//! records the per-window power difference and the extra waiting time.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::carbon::{CarbonError, CarbonModel};
use crate::config::ScenarioConfig;
use crate::error::Error;
use crate::scheduling::{PolicyKey, SchedPolicy, create_scheduler};
use crate::sim::cluster::SimulationCluster;
use crate::sim::driver::Driver;
use crate::sim::stats::RunStats;
use crate::sim::types::SimConfig;
use crate::task::{Task, WaitingTimes, load_tasks};

/// Reserved capacity that never binds.
pub const UNLIMITED_CPUS: u64 = 1_000_000_000;

/// Which policy keys a generation pass covers.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicySelection {
    /// Every family crossed with every sweep selector.
    All,
    /// The fixed comparison set; keys with existing output are skipped.
    Baseline,
    Explicit(Vec<PolicyKey>),
}

impl PolicySelection {
    pub fn keys(&self) -> Vec<PolicyKey> {
        match self {
            PolicySelection::All => PolicyKey::all(),
            PolicySelection::Baseline => PolicyKey::baseline(),
            PolicySelection::Explicit(keys) => keys.clone(),
        }
    }

    pub fn skips_existing(&self) -> bool {
        matches!(self, PolicySelection::Baseline)
    }
}

impl FromStr for PolicySelection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(PolicySelection::All),
            "baseline" => Ok(PolicySelection::Baseline),
            list => list
                .split(',')
                .filter(|k| !k.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<PolicyKey>, _>>()
                .and_then(|keys| {
                    if keys.is_empty() {
                        Err(Error::Policy("empty policy list".to_string()))
                    } else {
                        Ok(PolicySelection::Explicit(keys))
                    }
                }),
        }
    }
}

impl fmt::Display for PolicySelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySelection::All => f.write_str("all"),
            PolicySelection::Baseline => f.write_str("baseline"),
            PolicySelection::Explicit(keys) => {
                let names: Vec<String> = keys.iter().map(PolicyKey::to_string).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

/// Where each sample's hourly carbon series comes from.
#[derive(Debug, Clone)]
pub enum CarbonSource {
    /// CSV trace read per sample at the drawn start index.
    Trace { path: PathBuf, name: String },
    /// Built-in constant series.
    Custom,
    /// Pre-loaded hourly series, rebased to the drawn start index.
    Series(CarbonModel),
}

impl CarbonSource {
    /// Hourly model beginning at `start_index`.
    ///
    /// # Errors
    ///
    /// Returns loader errors for traces, `OutOfRange` for a series that
    /// ends before `start_index`.
    pub fn hourly(&self, start_index: usize) -> Result<CarbonModel, Error> {
        match self {
            CarbonSource::Trace { path, name } => {
                CarbonModel::from_csv_path(path, name, start_index, CarbonError::Oracle)
            }
            CarbonSource::Custom => Ok(CarbonModel::custom(start_index)),
            CarbonSource::Series(model) => Ok(model
                .rebased(start_index)?
                .with_origin(start_index, model.error())),
        }
    }
}

/// Read-only inputs shared by every sample of a generation pass.
#[derive(Debug, Clone)]
pub struct SampleContext {
    pub sim: SimConfig,
    /// Full trace, sorted by arrival.
    pub tasks: Arc<[Task]>,
    pub carbon: CarbonSource,
    pub waiting: WaitingTimes,
    pub reserved_instances: u64,
    /// Tasks drawn per sample.
    pub num_tasks: usize,
    /// Trace size below which sampling is refused.
    pub min_tasks: usize,
    /// Largest carbon start index drawn (inclusive).
    pub max_carbon_start: usize,
}

impl SampleContext {
    /// Loads traces and settings named by a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns trace-loading errors or an invalid waiting-time spec.
    pub fn from_config(cfg: &ScenarioConfig) -> Result<Self, Error> {
        let d = &cfg.dataset;
        let task_path = d.trace_dir.join(format!("{}.csv", d.task_trace));
        let tasks = load_tasks(&task_path)?;
        let carbon = if d.custom_carbon {
            CarbonSource::Custom
        } else {
            CarbonSource::Trace {
                path: d.trace_dir.join(format!("{}.csv", d.carbon_trace)),
                name: d.carbon_trace.clone(),
            }
        };
        info!(
            tasks = tasks.len(),
            trace = %d.task_trace,
            carbon = %d.carbon_trace,
            custom = d.custom_carbon,
            "loaded dataset inputs"
        );
        Ok(Self {
            sim: cfg.simulation.sim_config(),
            tasks: Arc::from(tasks),
            carbon,
            waiting: d.waiting_times.parse()?,
            reserved_instances: d.reserved_instances,
            num_tasks: d.num_tasks,
            min_tasks: d.min_tasks,
            max_carbon_start: d.max_carbon_start,
        })
    }
}

/// One dataset row: policy run compared with the no-deferral reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Policy minus reference mean CPU, per window.
    pub d_power: Vec<f64>,
    /// Policy minus reference total wait, in hours.
    pub waiting_time: f64,
    pub sched_policy: String,
    pub carbon_policy: String,
    pub carbon_start_index: usize,
    pub num_tasks: usize,
    pub base_wait: f64,
    pub base_usage: Vec<f64>,
    pub pol_usage: Vec<f64>,
    pub pol_wait: f64,
    pub base_job_counts: Vec<u64>,
    pub job_counts: Vec<u64>,
    pub scheduled_jobs: usize,
    pub pol_scheduled_jobs: usize,
    /// Reference CPU-hours above the reserved capacity.
    #[serde(default)]
    pub base_on_demand: f64,
    /// Policy CPU-hours above the reserved capacity.
    #[serde(default)]
    pub pol_on_demand: f64,
    #[serde(default)]
    pub base_reserved: f64,
    #[serde(default)]
    pub pol_reserved: f64,
    /// Hourly CPU limits used by an EDD run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpu_limits: Vec<f64>,
}

/// Runs `tasks` under `key` on a fresh cluster and returns its statistics.
///
/// # Errors
///
/// Returns the driver's submission failure.
pub fn simulate(
    sim: &SimConfig,
    key: PolicyKey,
    carbon: &CarbonModel,
    mut tasks: Vec<Task>,
    waiting: WaitingTimes,
    reserved_instances: u64,
    cpu_limits: Vec<f64>,
) -> Result<RunStats, Error> {
    waiting.assign(&mut tasks, sim.ticks_per_hour);
    let policy = create_scheduler(key, carbon.clone(), sim.ticks_per_hour, cpu_limits);
    let mut driver = Driver::new(sim.clone(), policy, SimulationCluster::new(reserved_instances));
    Ok(driver.run(tasks)?)
}

/// Draws `num_tasks` tasks, folds their arrivals into the horizon and
/// re-sorts them.
///
/// # Errors
///
/// Returns `Sample` if the trace is smaller than the requested subset or
/// the configured minimum.
pub fn sample_tasks<R: Rng + ?Sized>(ctx: &SampleContext, rng: &mut R) -> Result<Vec<Task>, Error> {
    let needed = ctx.num_tasks.max(ctx.min_tasks);
    if ctx.tasks.len() < needed {
        return Err(Error::Sample(format!(
            "trace has {} tasks, need at least {needed}",
            ctx.tasks.len()
        )));
    }
    let horizon = ctx.sim.total_ticks();
    let mut subset: Vec<Task> = rand::seq::index::sample(rng, ctx.tasks.len(), ctx.num_tasks)
        .into_iter()
        .map(|i| {
            let mut t = ctx.tasks[i].clone();
            t.arrival_time %= horizon;
            t
        })
        .collect();
    subset.sort_by_key(|t| t.arrival_time);
    Ok(subset)
}

/// Bounded random walk of hourly CPU limits around the reference run's
/// hourly mean usage.
pub fn edd_cpu_limits<R: Rng + ?Sized>(hourly: &[f64], hours: usize, rng: &mut R) -> Vec<f64> {
    if hours == 0 {
        return Vec::new();
    }
    let n = hourly.len().max(1) as f64;
    let mean = hourly.iter().sum::<f64>() / n;
    let std = (hourly.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();

    let start = (mean * rng.random_range(0.9..1.1)) as i64;
    let step = 5.max((std * 0.2) as i64);
    let floor = (mean * 0.7) as i64;
    let steps = [
        (-step).div_euclid(2),
        (-step).div_euclid(4),
        0,
        step.div_euclid(4),
        step.div_euclid(2),
    ];

    let mut limits = Vec::with_capacity(hours);
    let mut current = start;
    limits.push(current as f64);
    for _ in 1..hours {
        let delta = steps.choose(rng).copied().unwrap_or(0);
        current = floor.max(current + delta);
        limits.push(current as f64);
    }
    limits
}

/// Generates one dataset row for `key`.
///
/// # Errors
///
/// Propagates sampling, carbon-loading and simulation failures.
pub fn run_sample<R: Rng + ?Sized>(
    ctx: &SampleContext,
    key: PolicyKey,
    rng: &mut R,
) -> Result<SampleResult, Error> {
    let carbon_start_index = rng.random_range(0..=ctx.max_carbon_start);
    let subset = sample_tasks(ctx, rng)?;
    let carbon = ctx
        .carbon
        .hourly(carbon_start_index)?
        .stretched(ctx.sim.ticks_per_hour);

    let base = simulate(
        &ctx.sim,
        PolicyKey::reference(),
        &carbon,
        subset.clone(),
        WaitingTimes::default(),
        ctx.reserved_instances,
        Vec::new(),
    )?;

    let cpu_limits = if key.sched == SchedPolicy::Edd {
        let hourly = base.hourly_cpu(ctx.sim.windows_per_hour());
        edd_cpu_limits(&hourly, ctx.sim.duration_hours, rng)
    } else {
        Vec::new()
    };

    let policy = simulate(
        &ctx.sim,
        key,
        &carbon,
        subset,
        ctx.waiting,
        ctx.reserved_instances,
        cpu_limits.clone(),
    )?;

    let d_power = policy
        .cpu_windows
        .iter()
        .zip(&base.cpu_windows)
        .map(|(p, b)| p - b)
        .collect();

    Ok(SampleResult {
        d_power,
        waiting_time: policy.total_wait_hours - base.total_wait_hours,
        sched_policy: key.sched.to_string(),
        carbon_policy: key.carbon.to_string(),
        carbon_start_index,
        num_tasks: ctx.num_tasks,
        base_wait: base.total_wait_hours,
        base_usage: base.cpu_windows,
        pol_usage: policy.cpu_windows,
        pol_wait: policy.total_wait_hours,
        base_job_counts: base.job_counts,
        job_counts: policy.job_counts,
        scheduled_jobs: base.scheduled_jobs,
        pol_scheduled_jobs: policy.scheduled_jobs,
        base_on_demand: base.on_demand_cpu_hours,
        pol_on_demand: policy.on_demand_cpu_hours,
        base_reserved: base.reserved_cpu_hours,
        pol_reserved: policy.reserved_cpu_hours,
        cpu_limits,
    })
}

/// Generates `num_samples` rows for `key` on up to `threads` workers.
///
/// Sample `i` draws from `StdRng::seed_from_u64(seed + i)`, so the output
/// is independent of the worker count and every key sees the same inputs.
///
/// # Errors
///
/// Returns the first failing sample's error, in sample order.
pub fn generate(
    ctx: &SampleContext,
    key: PolicyKey,
    num_samples: usize,
    seed: u64,
    threads: usize,
) -> Result<Vec<SampleResult>, Error> {
    let workers = threads.clamp(1, num_samples.max(1));
    info!(%key, samples = num_samples, workers, "generating dataset");

    let mut slots: Vec<Option<Result<SampleResult, Error>>> =
        (0..num_samples).map(|_| None).collect();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|w| {
                scope.spawn(move || {
                    (w..num_samples)
                        .step_by(workers)
                        .map(|i| {
                            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                            let row = run_sample(ctx, key, &mut rng);
                            debug!(%key, sample = i, ok = row.is_ok(), "sample finished");
                            (i, row)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            match handle.join() {
                Ok(rows) => {
                    for (i, row) in rows {
                        slots[i] = Some(row);
                    }
                }
                Err(_) => {
                    return Err(Error::Sample(format!("worker for {key} panicked")));
                }
            }
        }
        Ok(())
    })?;

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(Error::Sample("sample was not run".to_string()))))
        .collect()
}
