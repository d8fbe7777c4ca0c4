//! Slot-selection policies.
//!
//! Pure functions that pick when a whole job should start inside a carbon
//! window. Offsets in a [`Schedule`] are relative to the decision point;
//! callers convert with [`Schedule::actual_start`].

use crate::carbon::CarbonModel;
use crate::error::SchedulingError;
use crate::task::Task;
use crate::units::Tick;

/// Result of a slot-selection decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    /// Start offset from the decision point (ticks).
    pub start: usize,
    /// Finish offset from the decision point (ticks).
    pub finish: usize,
    /// Carbon emitted running the job in this window.
    pub carbon_cost: f64,
}

impl Schedule {
    pub fn actual_start(&self, now: Tick) -> Tick {
        now + self.start
    }

    pub fn actual_finish(&self, now: Tick) -> Tick {
        now + self.finish
    }
}

/// Carbon cost of running `task` from offset `start`, with cyclic lookup.
pub fn carbon_cost(task: &Task, start: usize, carbon: &CarbonModel) -> Schedule {
    let intensity: f64 = (start..start + task.task_length)
        .map(|i| carbon.value_at(i))
        .sum();
    Schedule {
        start,
        finish: start + task.task_length,
        carbon_cost: intensity * task.cpus,
    }
}

/// Carbon cost from `start`, failing when the run leaves the window.
fn bounded_carbon_cost(
    task: &Task,
    start: usize,
    carbon: &CarbonModel,
) -> Result<Schedule, SchedulingError> {
    let end = start + task.task_length;
    if end > carbon.len() {
        return Err(SchedulingError::OutOfRange {
            start,
            end,
            len: carbon.len(),
        });
    }
    Ok(carbon_cost(task, start, carbon))
}

/// Starts the job at the single lowest-intensity slot within its budget.
///
/// The first minimum wins; a zero budget always starts at offset 0.
pub fn lowest_carbon_slot(task: &Task, carbon: &CarbonModel) -> Schedule {
    let start = if task.waiting_time == 0 {
        0
    } else {
        let horizon = (task.waiting_time + 1).min(carbon.len());
        carbon.values()[..horizon]
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
                Some((_, b)) if b <= v => best,
                _ => Some((i, v)),
            })
            .map_or(0, |(i, _)| i)
    };
    carbon_cost(task, start, carbon)
}

/// Candidate schedules at `step`-tick granularity across `[0, waiting]`.
///
/// Candidates whose run would leave the window are dropped.
fn candidates(task: &Task, carbon: &CarbonModel, step: usize) -> Vec<Schedule> {
    (0..=task.waiting_time)
        .step_by(step.max(1))
        .filter_map(|start| bounded_carbon_cost(task, start, carbon).ok())
        .collect()
}

/// Picks the hourly candidate start with the lowest total carbon cost.
///
/// # Errors
///
/// Returns `InsufficientData` when no candidate fits in the window.
pub fn oracle_carbon_slot(
    task: &Task,
    carbon: &CarbonModel,
    step: usize,
) -> Result<Schedule, SchedulingError> {
    candidates(task, carbon, step)
        .into_iter()
        .fold(None, |best: Option<Schedule>, s| match best {
            Some(b) if b.carbon_cost <= s.carbon_cost => Some(b),
            _ => Some(s),
        })
        .ok_or(SchedulingError::InsufficientData {
            need: task.task_length,
            got: carbon.len(),
        })
}

/// Picks the candidate start that saves the most carbon per tick consumed.
///
/// Savings are measured against starting immediately and divided by
/// `start + task_length` (wait plus run).
///
/// # Errors
///
/// Returns `InsufficientData` when the immediate start does not fit.
pub fn oracle_carbon_slot_waiting(
    task: &Task,
    carbon: &CarbonModel,
    step: usize,
) -> Result<Schedule, SchedulingError> {
    let all = candidates(task, carbon, step);
    let baseline = match all.first() {
        Some(s) if s.start == 0 => s.carbon_cost,
        _ => {
            return Err(SchedulingError::InsufficientData {
                need: task.task_length,
                got: carbon.len(),
            });
        }
    };
    let rate = |s: &Schedule| {
        (baseline - s.carbon_cost) / (s.start + task.task_length).max(1) as f64
    };
    all.into_iter()
        .fold(None, |best: Option<(Schedule, f64)>, s| {
            let r = rate(&s);
            match best {
                Some((_, br)) if br >= r => best,
                _ => Some((s, r)),
            }
        })
        .map(|(s, _)| s)
        .ok_or(SchedulingError::InsufficientData {
            need: task.task_length,
            got: carbon.len(),
        })
}

/// Reference task with the class-expected length in place of the real one.
fn reference_task(task: &Task) -> Task {
    let expected = if task.expected_time > 0 {
        task.expected_time
    } else {
        task.task_length
    };
    Task::new(task.id, task.arrival_time, expected, task.cpus).with_waiting_time(task.waiting_time)
}

/// Average-oracle: chooses the start on a reference task of expected length
/// with [`oracle_carbon_slot`], then costs the real task at that start.
///
/// # Errors
///
/// Propagates the oracle's `InsufficientData`.
pub fn best_waiting_time(
    task: &Task,
    carbon: &CarbonModel,
    step: usize,
) -> Result<Schedule, SchedulingError> {
    let common = oracle_carbon_slot(&reference_task(task), carbon, step)?;
    Ok(carbon_cost(task, common.start, carbon))
}

/// Like [`best_waiting_time`] but choosing the start with
/// [`oracle_carbon_slot_waiting`].
///
/// # Errors
///
/// Propagates the oracle's `InsufficientData`.
pub fn average_carbon_slot_waiting(
    task: &Task,
    carbon: &CarbonModel,
    step: usize,
) -> Result<Schedule, SchedulingError> {
    let common = oracle_carbon_slot_waiting(&reference_task(task), carbon, step)?;
    Ok(carbon_cost(task, common.start, carbon))
}
