use tracing::{debug, trace};

use super::SchedulingPolicy;
use super::queue::StableQueue;
use crate::error::SchedulingError;
use crate::sim::cluster::Cluster;
use crate::task::Task;
use crate::units::Tick;

/// Earliest-due-date release under an hourly CPU budget.
///
/// `cpu_limits[h]` caps the total CPU demand allocated during hour `h`.
/// Past the end of the schedule nothing is limited.
pub struct EddSchedulingPolicy {
    cpu_limits: Vec<f64>,
    ticks_per_hour: usize,
    queue: StableQueue<Tick, Task>,
}

impl EddSchedulingPolicy {
    pub fn new(cpu_limits: Vec<f64>, ticks_per_hour: usize) -> Self {
        Self {
            cpu_limits,
            ticks_per_hour: ticks_per_hour.max(1),
            queue: StableQueue::new(),
        }
    }

    /// Budget for the hour containing `now`, `None` past the schedule.
    pub fn limit_at(&self, now: Tick) -> Option<f64> {
        self.cpu_limits.get(now / self.ticks_per_hour).copied()
    }
}

impl SchedulingPolicy for EddSchedulingPolicy {
    fn submit(&mut self, _now: Tick, task: Task) -> Result<(), SchedulingError> {
        trace!(task = task.id, due = task.due_time(), "queued");
        self.queue.push(task.due_time(), task);
        Ok(())
    }

    fn execute(&mut self, now: Tick, cluster: &mut dyn Cluster) {
        if self.queue.is_empty() {
            return;
        }

        let released = match self.limit_at(now) {
            None => self.queue.drain_where(|_, _| true),
            Some(limit) => {
                let mut usage = cluster.allocated_at(now);
                self.queue.drain_where(|_, task| {
                    if usage + task.cpus <= limit {
                        usage += task.cpus;
                        true
                    } else {
                        false
                    }
                })
            }
        };

        if !released.is_empty() {
            debug!(
                now,
                released = released.len(),
                queued = self.queue.len(),
                "edd release"
            );
        }
        for task in released {
            cluster.submit(now, task);
        }
        cluster.refresh_data(now);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
