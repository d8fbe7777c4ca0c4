use tracing::{debug, error};

use super::queue::StableQueue;
use super::{CarbonPolicy, SchedulingPolicy};
use crate::carbon::CarbonModel;
use crate::error::SchedulingError;
use crate::sim::cluster::Cluster;
use crate::task::Task;
use crate::units::Tick;

/// Defers each whole job to the start chosen by a slot selector.
///
/// On submission the selector runs on the carbon model rebased to `now`;
/// the job is held until `now + schedule.start` and then released intact.
pub struct CarbonWaitingPolicy {
    carbon: CarbonModel,
    selector: CarbonPolicy,
    ticks_per_hour: usize,
    queue: StableQueue<Tick, Task>,
}

impl CarbonWaitingPolicy {
    pub fn new(carbon: CarbonModel, selector: CarbonPolicy, ticks_per_hour: usize) -> Self {
        Self {
            carbon,
            selector,
            ticks_per_hour,
            queue: StableQueue::new(),
        }
    }
}

impl SchedulingPolicy for CarbonWaitingPolicy {
    fn submit(&mut self, now: Tick, task: Task) -> Result<(), SchedulingError> {
        let schedule = self
            .carbon
            .rebased(now)
            .and_then(|window| self.selector.select(&task, &window, self.ticks_per_hour))
            .inspect_err(|e| error!(task = task.id, now, error = %e, "slot selection failed"))?;

        let release = schedule.actual_start(now);
        debug!(
            task = task.id,
            release,
            carbon = schedule.carbon_cost,
            "deferred job"
        );
        self.queue.push(release, task);
        Ok(())
    }

    fn execute(&mut self, now: Tick, cluster: &mut dyn Cluster) {
        while self.queue.peek().is_some_and(|(release, _)| *release <= now) {
            if let Some((_, task)) = self.queue.pop() {
                cluster.submit(now, task);
            }
        }
        cluster.refresh_data(now);
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }
}
