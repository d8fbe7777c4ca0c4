//! Cluster boundary consumed by the scheduling policies.
//!
//! Policies only ever see a cluster through [`Cluster`]; the driver hands
//! them a `&mut dyn Cluster` for the duration of one `execute` call, which is
//! the critical section around cluster bookkeeping.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::clock::Clock;
use super::types::CompletionRecord;
use crate::task::Task;
use crate::units::Tick;

/// Physical cluster as seen by the scheduling core.
pub trait Cluster {
    /// Admits a task for execution at `tick`.
    fn submit(&mut self, tick: Tick, task: Task);

    /// Advances the cluster clock by one tick, completing finished jobs.
    fn sleep(&mut self);

    /// Refreshes any cached view of allocation up to and including `tick`.
    fn refresh_data(&mut self, tick: Tick);

    /// Total CPU demand allocated per tick.
    fn runtime_allocation(&self) -> &[f64];

    /// Completion records, in completion order.
    fn details(&self) -> &[CompletionRecord];

    /// Current physical time.
    fn now(&self) -> Tick;

    /// Number of admitted jobs that have not finished yet.
    fn running(&self) -> usize;

    /// Reserved and on-demand usage accounted up to the last refresh.
    fn usage(&self) -> UsageSummary;

    /// CPU demand allocated at `tick`, zero past the known allocation.
    fn allocated_at(&self, tick: Tick) -> f64 {
        self.runtime_allocation().get(tick).copied().unwrap_or(0.0)
    }
}

/// CPU-tick usage split between reserved and on-demand capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub reserved_cpu_ticks: f64,
    pub on_demand_cpu_ticks: f64,
}

/// Reference cluster that admits every job at once.
///
/// There is no packing: a job submitted at `t` runs over `[t, t + length)`
/// and its CPU demand is booked into [`Cluster::runtime_allocation`] up
/// front. Demand beyond `reserved_instances` is accounted as on-demand.
#[derive(Debug, Clone)]
pub struct SimulationCluster {
    clock: Clock,
    reserved_instances: f64,
    runtime_allocation: Vec<f64>,
    running: Vec<CompletionRecord>,
    details: Vec<CompletionRecord>,
    usage: UsageSummary,
    refreshed_until: Tick,
}

impl SimulationCluster {
    /// Creates an idle cluster at tick 0.
    pub fn new(reserved_instances: u64) -> Self {
        Self {
            clock: Clock::new(),
            reserved_instances: reserved_instances as f64,
            runtime_allocation: Vec::new(),
            running: Vec::new(),
            details: Vec::new(),
            usage: UsageSummary::default(),
            refreshed_until: 0,
        }
    }

    fn complete_finished(&mut self) {
        let now = self.clock.now();
        let (done, still): (Vec<_>, Vec<_>) =
            self.running.drain(..).partition(|r| r.end_tick <= now);
        self.running = still;
        self.details.extend(done);
    }
}

impl Cluster for SimulationCluster {
    fn submit(&mut self, tick: Tick, task: Task) {
        let start = tick.max(self.clock.now());
        let end = start + task.task_length;
        if self.runtime_allocation.len() < end {
            self.runtime_allocation.resize(end, 0.0);
        }
        for slot in &mut self.runtime_allocation[start..end] {
            *slot += task.cpus;
        }

        let record = CompletionRecord {
            task_id: task.id,
            arrival_tick: task.arrival_time,
            start_tick: start,
            end_tick: end,
            wait_ticks: start.saturating_sub(task.arrival_time) + task.scheduled_wait,
            cpus: task.cpus,
            scheduled_wait: task.scheduled_wait,
        };
        trace!(task = task.id, start, end, "admitted");
        if end <= self.clock.now() {
            self.details.push(record);
        } else {
            self.running.push(record);
        }
    }

    fn sleep(&mut self) {
        self.clock.tick();
        self.complete_finished();
    }

    fn refresh_data(&mut self, tick: Tick) {
        while self.refreshed_until <= tick {
            let allocated = self.allocated_at(self.refreshed_until);
            let reserved = allocated.min(self.reserved_instances);
            self.usage.reserved_cpu_ticks += reserved;
            self.usage.on_demand_cpu_ticks += allocated - reserved;
            self.refreshed_until += 1;
        }
    }

    fn runtime_allocation(&self) -> &[f64] {
        &self.runtime_allocation
    }

    fn details(&self) -> &[CompletionRecord] {
        &self.details
    }

    fn now(&self) -> Tick {
        self.clock.now()
    }

    fn running(&self) -> usize {
        self.running.len()
    }

    fn usage(&self) -> UsageSummary {
        self.usage
    }
}
