//! Jobs, waiting-time budgets, and task-trace loading.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::units::{SECONDS_PER_TICK, TICKS_PER_HOUR, Tick, seconds_to_ticks};

/// Jobs at or below this length (ticks) fall in the short queue when the
/// trace carries no explicit class.
pub const SHORT_TASK_MAX_TICKS: usize = 2 * TICKS_PER_HOUR;

/// Task-length class used to pick a waiting budget and an expected length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskClass {
    Short,
    Long,
}

impl TaskClass {
    /// Classifies a job by its length when the trace does not say.
    pub fn for_length(length: usize) -> Self {
        if length <= SHORT_TASK_MAX_TICKS {
            TaskClass::Short
        } else {
            TaskClass::Long
        }
    }
}

/// A unit of work submitted to a scheduling policy.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: u64,
    /// Tick at which the job becomes known to the scheduler.
    pub arrival_time: Tick,
    /// Run length in ticks.
    pub task_length: usize,
    pub cpus: f64,
    /// Maximum delay past arrival, in ticks.
    pub waiting_time: usize,
    pub task_length_class: Option<TaskClass>,
    /// Class-average length, used by the average-oracle slot selectors.
    pub expected_time: usize,
    /// Idle ticks scheduled right before this (sub-)task.
    pub scheduled_wait: usize,
}

impl Task {
    /// Creates a task with no waiting budget and no class.
    pub fn new(id: u64, arrival_time: Tick, task_length: usize, cpus: f64) -> Self {
        Self {
            id,
            arrival_time,
            task_length,
            cpus,
            waiting_time: 0,
            task_length_class: None,
            expected_time: task_length,
            scheduled_wait: 0,
        }
    }

    pub fn with_waiting_time(mut self, waiting_time: usize) -> Self {
        self.waiting_time = waiting_time;
        self
    }

    pub fn with_class(mut self, class: TaskClass) -> Self {
        self.task_length_class = Some(class);
        self
    }

    pub fn with_expected_time(mut self, expected_time: usize) -> Self {
        self.expected_time = expected_time;
        self
    }

    /// Arrival plus waiting budget; the EDD ordering key.
    pub fn due_time(&self) -> Tick {
        self.arrival_time + self.waiting_time
    }

    /// Derives a contiguous piece of this job starting at `arrival_time`.
    ///
    /// Identifier, CPU demand and class are inherited.
    pub fn sub_task(&self, arrival_time: Tick, task_length: usize, scheduled_wait: usize) -> Self {
        Self {
            id: self.id,
            arrival_time,
            task_length,
            cpus: self.cpus,
            waiting_time: 0,
            task_length_class: self.task_length_class,
            expected_time: task_length,
            scheduled_wait,
        }
    }
}

/// Waiting budgets per task class, parsed from `"<short>x<long>"` hours.
///
/// # Examples
///
/// ```
/// use deferrable_sim::task::{TaskClass, WaitingTimes};
///
/// let w: WaitingTimes = "6x24".parse().unwrap();
/// assert_eq!(w.hours_for(TaskClass::Short), 6);
/// assert_eq!(w.ticks_for(TaskClass::Long, 720), 24 * 720);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitingTimes {
    short_hours: usize,
    long_hours: usize,
}

impl WaitingTimes {
    pub fn new(short_hours: usize, long_hours: usize) -> Self {
        Self {
            short_hours,
            long_hours,
        }
    }

    pub fn hours_for(&self, class: TaskClass) -> usize {
        match class {
            TaskClass::Short => self.short_hours,
            TaskClass::Long => self.long_hours,
        }
    }

    pub fn ticks_for(&self, class: TaskClass, ticks_per_hour: usize) -> usize {
        self.hours_for(class) * ticks_per_hour
    }

    /// Assigns every task its class budget. Tasks without a class are
    /// classified by length first.
    pub fn assign(&self, tasks: &mut [Task], ticks_per_hour: usize) {
        for task in tasks {
            let class = *task
                .task_length_class
                .get_or_insert_with(|| TaskClass::for_length(task.task_length));
            task.waiting_time = self.ticks_for(class, ticks_per_hour);
        }
    }
}

impl FromStr for WaitingTimes {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (short, long) = s
            .trim()
            .split_once('x')
            .ok_or_else(|| Error::WaitingTimes(s.to_string()))?;
        let short = short
            .trim()
            .parse()
            .map_err(|_| Error::WaitingTimes(s.to_string()))?;
        let long = long
            .trim()
            .parse()
            .map_err(|_| Error::WaitingTimes(s.to_string()))?;
        Ok(Self::new(short, long))
    }
}

impl fmt::Display for WaitingTimes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.short_hours, self.long_hours)
    }
}

#[derive(Debug, Deserialize)]
struct TaskRow {
    job_id: u64,
    arrival_s: u64,
    length_s: u64,
    cpus: f64,
    #[serde(default)]
    class: Option<TaskClass>,
}

/// Loads a task trace CSV (`job_id,arrival_s,length_s,cpus[,class]`).
///
/// Times are converted to ticks, tasks are sorted by arrival, and each task's
/// `expected_time` is set to the mean length of its class in the trace.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or holds no rows.
pub fn load_tasks(path: &Path) -> Result<Vec<Task>, Error> {
    let mut rdr = csv::Reader::from_path(path).map_err(|source| Error::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tasks = Vec::new();
    for record in rdr.deserialize::<TaskRow>() {
        let row = record.map_err(|source| Error::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let length = seconds_to_ticks(row.length_s);
        let class = row.class.unwrap_or_else(|| TaskClass::for_length(length));
        tasks.push(
            Task::new(
                row.job_id,
                (row.arrival_s / SECONDS_PER_TICK) as Tick,
                length,
                row.cpus,
            )
            .with_class(class),
        );
    }

    if tasks.is_empty() {
        return Err(Error::EmptyTrace {
            path: path.to_path_buf(),
        });
    }

    assign_expected_times(&mut tasks);
    tasks.sort_by_key(|t| t.arrival_time);
    debug!(path = %path.display(), tasks = tasks.len(), "loaded task trace");
    Ok(tasks)
}

/// Sets `expected_time` to the rounded mean length of each task's class.
pub fn assign_expected_times(tasks: &mut [Task]) {
    let mut sums = [(0usize, 0usize); 2];
    for t in tasks.iter() {
        let slot = &mut sums[class_slot(t)];
        slot.0 += t.task_length;
        slot.1 += 1;
    }
    for t in tasks.iter_mut() {
        let (sum, n) = sums[class_slot(t)];
        if n > 0 {
            t.expected_time = (sum as f64 / n as f64).round() as usize;
        }
    }
}

fn class_slot(task: &Task) -> usize {
    match task
        .task_length_class
        .unwrap_or_else(|| TaskClass::for_length(task.task_length))
    {
        TaskClass::Short => 0,
        TaskClass::Long => 1,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn waiting_times_parse() {
        let w: WaitingTimes = "6x24".parse().expect("valid spec");
        assert_eq!(w, WaitingTimes::new(6, 24));
        assert_eq!(w.to_string(), "6x24");
        assert!("6-24".parse::<WaitingTimes>().is_err());
        assert!("ax2".parse::<WaitingTimes>().is_err());
    }

    #[test]
    fn assign_uses_class_budget() {
        let mut tasks = vec![
            Task::new(1, 0, 10, 1.0),
            Task::new(2, 0, SHORT_TASK_MAX_TICKS + 1, 1.0),
            Task::new(3, 0, 10, 1.0).with_class(TaskClass::Long),
        ];
        WaitingTimes::new(1, 2).assign(&mut tasks, 10);
        assert_eq!(tasks[0].waiting_time, 10);
        assert_eq!(tasks[1].waiting_time, 20);
        assert_eq!(tasks[2].waiting_time, 20);
        assert_eq!(tasks[0].task_length_class, Some(TaskClass::Short));
    }

    #[test]
    fn sub_task_inherits_identity() {
        let parent = Task::new(9, 3, 10, 2.5)
            .with_waiting_time(4)
            .with_class(TaskClass::Long);
        let sub = parent.sub_task(7, 2, 1);
        assert_eq!(sub.id, 9);
        assert_eq!(sub.cpus, 2.5);
        assert_eq!(sub.task_length_class, Some(TaskClass::Long));
        assert_eq!(sub.arrival_time, 7);
        assert_eq!(sub.task_length, 2);
        assert_eq!(sub.scheduled_wait, 1);
        assert_eq!(parent.due_time(), 7);
    }

    #[test]
    fn expected_times_are_class_means() {
        let mut tasks = vec![
            Task::new(1, 0, 10, 1.0).with_class(TaskClass::Short),
            Task::new(2, 0, 20, 1.0).with_class(TaskClass::Short),
            Task::new(3, 0, 100, 1.0).with_class(TaskClass::Long),
        ];
        assign_expected_times(&mut tasks);
        assert_eq!(tasks[0].expected_time, 15);
        assert_eq!(tasks[1].expected_time, 15);
        assert_eq!(tasks[2].expected_time, 100);
    }

    #[test]
    fn trace_loads_sorted_in_ticks() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "job_id,arrival_s,length_s,cpus,class").expect("header");
        writeln!(file, "2,100,60,4,long").expect("row");
        writeln!(file, "1,10,7,1,").expect("row");
        let tasks = load_tasks(file.path()).expect("trace loads");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].id, 1);
        assert_eq!(tasks[0].arrival_time, 2);
        assert_eq!(tasks[0].task_length, 2);
        assert_eq!(tasks[0].task_length_class, Some(TaskClass::Short));
        assert_eq!(tasks[1].arrival_time, 20);
        assert_eq!(tasks[1].task_length, 12);
        assert_eq!(tasks[1].task_length_class, Some(TaskClass::Long));
    }
}
