//! Tick loop that feeds arrivals to a scheduling policy and advances the cluster.

use std::collections::VecDeque;

use tracing::debug;

use super::clock::Clock;
use super::cluster::Cluster;
use super::stats::RunStats;
use super::types::SimConfig;
use crate::error::SimulationError;
use crate::scheduling::SchedulingPolicy;
use crate::task::Task;
use crate::units::Tick;

/// Single-run simulation driver owning its policy and cluster.
///
/// Generic over `C: Cluster` for static dispatch; the policy is a trait
/// object because the dataset generator picks it at runtime.
pub struct Driver<C: Cluster> {
    config: SimConfig,
    policy: Box<dyn SchedulingPolicy>,
    cluster: C,
    clock: Clock,
}

impl<C: Cluster> Driver<C> {
    pub fn new(config: SimConfig, policy: Box<dyn SchedulingPolicy>, cluster: C) -> Self {
        Self {
            config,
            policy,
            cluster,
            clock: Clock::new(),
        }
    }

    /// Executes one tick.
    ///
    /// Order within the tick: arrivals due by now are submitted (zero-length
    /// jobs are dropped), the policy releases ready work into the cluster,
    /// then the cluster clock advances.
    ///
    /// # Errors
    ///
    /// Returns `Submission` for the first job the policy cannot schedule.
    pub fn step(&mut self, arrivals: &mut VecDeque<Task>) -> Result<Tick, SimulationError> {
        let now = self.clock.now();

        while arrivals.front().is_some_and(|t| t.arrival_time <= now) {
            let Some(task) = arrivals.pop_front() else {
                break;
            };
            if task.task_length == 0 {
                continue;
            }
            let task_id = task.id;
            self.policy
                .submit(now, task)
                .map_err(|source| SimulationError::Submission {
                    task_id,
                    tick: now,
                    source,
                })?;
        }

        self.policy.execute(now, &mut self.cluster);
        self.cluster.sleep();
        Ok(self.clock.tick())
    }

    /// Runs until every arrival is consumed and the policy queue is empty,
    /// then lets the cluster finish whatever is still running.
    ///
    /// `tasks` must be sorted by arrival time.
    ///
    /// # Errors
    ///
    /// Aborts on the first failed submission.
    pub fn run(&mut self, tasks: Vec<Task>) -> Result<RunStats, SimulationError> {
        let total = tasks.len();
        let mut arrivals = VecDeque::from(tasks);
        debug!(tasks = total, "run started");

        loop {
            self.step(&mut arrivals)?;
            if arrivals.is_empty() && self.policy.is_idle() {
                break;
            }
        }

        while self.cluster.running() > 0 {
            self.cluster.sleep();
        }
        self.cluster.refresh_data(self.cluster.now());

        let stats = RunStats::from_cluster(&self.cluster, &self.config);
        debug!(
            ticks = self.clock.now(),
            completed = stats.scheduled_jobs,
            wait_hours = stats.total_wait_hours,
            "run finished"
        );
        Ok(stats)
    }

    /// Current scheduling tick.
    pub fn now(&self) -> Tick {
        self.clock.now()
    }

    pub fn cluster(&self) -> &C {
        &self.cluster
    }

    pub fn into_cluster(self) -> C {
        self.cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon::CarbonModel;
    use crate::error::SchedulingError;
    use crate::scheduling::{CarbonPolicy, CarbonWaitingPolicy, EddSchedulingPolicy};
    use crate::sim::cluster::SimulationCluster;

    fn cfg() -> SimConfig {
        SimConfig::new(2, 4, 2)
    }

    fn immediate(values: Vec<f64>) -> Box<dyn SchedulingPolicy> {
        Box::new(CarbonWaitingPolicy::new(
            CarbonModel::from_values("flat", values),
            CarbonPolicy::Fixed,
            2,
        ))
    }

    #[test]
    fn arrivals_run_in_tick_order() {
        let mut driver = Driver::new(cfg(), immediate(vec![1.0; 16]), SimulationCluster::new(10));
        let tasks = vec![Task::new(1, 0, 2, 1.0), Task::new(2, 3, 1, 2.0)];
        let stats = driver.run(tasks).expect("runs");
        assert_eq!(stats.scheduled_jobs, 2);

        let records = driver.cluster().details();
        assert_eq!((records[0].start_tick, records[0].end_tick), (0, 2));
        assert_eq!((records[1].start_tick, records[1].end_tick), (3, 4));
        assert!(records.iter().all(|r| r.wait_ticks == 0));
    }

    #[test]
    fn zero_length_jobs_are_dropped() {
        let mut driver = Driver::new(cfg(), immediate(vec![1.0; 16]), SimulationCluster::new(10));
        let stats = driver
            .run(vec![Task::new(1, 0, 0, 1.0), Task::new(2, 1, 1, 1.0)])
            .expect("runs");
        assert_eq!(stats.scheduled_jobs, 1);
        assert_eq!(driver.cluster().details()[0].task_id, 2);
    }

    #[test]
    fn loop_stops_when_arrivals_and_queue_are_empty() {
        let mut driver = Driver::new(cfg(), immediate(vec![1.0; 16]), SimulationCluster::new(10));
        driver.run(vec![Task::new(1, 2, 1, 1.0)]).expect("runs");
        // ticks 0, 1, 2 are simulated; the job is released at 2
        assert_eq!(driver.now(), 3);
    }

    #[test]
    fn empty_trace_still_executes_once() {
        let mut driver = Driver::new(cfg(), immediate(vec![1.0; 16]), SimulationCluster::new(10));
        let stats = driver.run(Vec::new()).expect("runs");
        assert_eq!(driver.now(), 1);
        assert_eq!(stats.scheduled_jobs, 0);
    }

    #[test]
    fn running_jobs_are_drained_after_the_loop() {
        let mut driver = Driver::new(cfg(), immediate(vec![1.0; 16]), SimulationCluster::new(10));
        driver.run(vec![Task::new(1, 0, 20, 1.0)]).expect("runs");
        assert_eq!(driver.cluster().running(), 0);
        assert_eq!(driver.cluster().details()[0].end_tick, 20);
    }

    #[test]
    fn demand_above_reserve_is_on_demand() {
        let mut driver = Driver::new(cfg(), immediate(vec![1.0; 16]), SimulationCluster::new(1));
        let stats = driver
            .run(vec![Task::new(1, 0, 2, 3.0), Task::new(2, 4, 4, 1.0)])
            .expect("runs");
        // 2 + 4 reserved CPU-ticks, 2 * 2 on-demand, at 2 ticks per hour
        assert_eq!(stats.reserved_cpu_hours, 3.0);
        assert_eq!(stats.on_demand_cpu_hours, 2.0);
    }

    #[test]
    fn submission_failure_aborts_the_run() {
        let mut driver = Driver::new(
            cfg(),
            immediate(vec![1.0; 2]),
            SimulationCluster::new(10),
        );
        let err = driver
            .run(vec![Task::new(1, 0, 1, 1.0), Task::new(9, 5, 1, 1.0)])
            .expect_err("job 9 arrives past the carbon data");
        let SimulationError::Submission {
            task_id,
            tick,
            source,
        } = err;
        assert_eq!((task_id, tick), (9, 5));
        assert!(matches!(source, SchedulingError::OutOfRange { .. }));
    }

    #[test]
    fn edd_limit_delays_second_job() {
        let policy = Box::new(EddSchedulingPolicy::new(vec![1.0; 4], 2));
        let mut driver = Driver::new(cfg(), policy, SimulationCluster::new(10));
        let stats = driver
            .run(vec![
                Task::new(1, 0, 2, 1.0).with_waiting_time(4),
                Task::new(2, 0, 2, 1.0).with_waiting_time(4),
            ])
            .expect("runs");
        let records = driver.cluster().details();
        assert_eq!(records[1].start_tick, 2);
        assert_eq!(records[1].wait_ticks, 2);
        // 2 ticks of waiting at 2 ticks per hour
        assert_eq!(stats.total_wait_hours, 1.0);
    }
}
