//! Scheduling policies: when a submitted job is released to the cluster.

/// Whole-job deferral driven by a slot selector.
pub mod carbon_waiting;
/// Earliest-due-date release under hourly CPU limits.
pub mod edd;
pub mod queue;
/// Pure slot-selection functions.
pub mod slot;
/// Suspend/resume splitting of jobs into sub-tasks.
pub mod suspend;

use std::fmt;
use std::str::FromStr;

use crate::carbon::CarbonModel;
use crate::error::{Error, SchedulingError};
use crate::sim::cluster::Cluster;
use crate::task::Task;
use crate::units::Tick;

pub use carbon_waiting::CarbonWaitingPolicy;
pub use edd::EddSchedulingPolicy;
pub use suspend::{SuspendMode, SuspendSchedulingPolicy};

/// A stateful policy fed by the simulation driver.
///
/// `submit` is called for every arrival, `execute` exactly once per tick.
pub trait SchedulingPolicy {
    /// Accepts a newly arrived job at tick `now`.
    ///
    /// # Errors
    ///
    /// Returns the scheduling failure unchanged; the job is not queued.
    fn submit(&mut self, now: Tick, task: Task) -> Result<(), SchedulingError>;

    /// Releases every queued job that is ready at `now` into `cluster`.
    fn execute(&mut self, now: Tick, cluster: &mut dyn Cluster);

    /// Number of queued items not yet released.
    fn pending(&self) -> usize;

    fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

/// Scheduling family, the part of a policy key before `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchedPolicy {
    Carbon,
    SuspendResume,
    SuspendResumeThreshold,
    Edd,
}

impl SchedPolicy {
    pub const ALL: [SchedPolicy; 4] = [
        SchedPolicy::Carbon,
        SchedPolicy::SuspendResume,
        SchedPolicy::SuspendResumeThreshold,
        SchedPolicy::Edd,
    ];
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchedPolicy::Carbon => "carbon",
            SchedPolicy::SuspendResume => "suspend-resume",
            SchedPolicy::SuspendResumeThreshold => "suspend-resume-threshold",
            SchedPolicy::Edd => "edd",
        })
    }
}

impl FromStr for SchedPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.to_string() == s)
            .ok_or_else(|| Error::Policy(format!("unknown scheduling policy \"{s}\"")))
    }
}

/// Slot selector, the part of a policy key after `_`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarbonPolicy {
    /// Average-oracle best slot on the class-expected length.
    Waiting,
    /// Single lowest-intensity slot.
    Lowest,
    /// Hourly candidate with the lowest total cost.
    Oracle,
    /// Hourly candidate with the best carbon saving per tick.
    CstOracle,
    /// Saving-per-tick choice made on the class-expected length.
    CstAverage,
    /// No carbon input; start as soon as the policy allows.
    Fixed,
}

impl CarbonPolicy {
    /// Selectors crossed with every family by the `all` selection.
    pub const SWEEP: [CarbonPolicy; 5] = [
        CarbonPolicy::Waiting,
        CarbonPolicy::Lowest,
        CarbonPolicy::Oracle,
        CarbonPolicy::CstOracle,
        CarbonPolicy::CstAverage,
    ];

    /// Picks a start for `task` inside `carbon`, offsets relative to its origin.
    ///
    /// # Errors
    ///
    /// Propagates `InsufficientData` from the oracle selectors.
    pub fn select(
        &self,
        task: &Task,
        carbon: &CarbonModel,
        ticks_per_hour: usize,
    ) -> Result<slot::Schedule, SchedulingError> {
        match self {
            CarbonPolicy::Waiting => slot::best_waiting_time(task, carbon, ticks_per_hour),
            CarbonPolicy::Lowest => Ok(slot::lowest_carbon_slot(task, carbon)),
            CarbonPolicy::Oracle => slot::oracle_carbon_slot(task, carbon, ticks_per_hour),
            CarbonPolicy::CstOracle => {
                slot::oracle_carbon_slot_waiting(task, carbon, ticks_per_hour)
            }
            CarbonPolicy::CstAverage => {
                slot::average_carbon_slot_waiting(task, carbon, ticks_per_hour)
            }
            CarbonPolicy::Fixed => Ok(slot::carbon_cost(task, 0, carbon)),
        }
    }
}

impl fmt::Display for CarbonPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CarbonPolicy::Waiting => "waiting",
            CarbonPolicy::Lowest => "lowest",
            CarbonPolicy::Oracle => "oracle",
            CarbonPolicy::CstOracle => "cst_oracle",
            CarbonPolicy::CstAverage => "cst_average",
            CarbonPolicy::Fixed => "fixed",
        })
    }
}

impl FromStr for CarbonPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SWEEP
            .into_iter()
            .chain([CarbonPolicy::Fixed])
            .find(|p| p.to_string() == s)
            .ok_or_else(|| Error::Policy(format!("unknown carbon policy \"{s}\"")))
    }
}

/// A `sched_carbon` policy combination, e.g. `suspend-resume_oracle`.
///
/// # Examples
///
/// ```
/// use deferrable_sim::scheduling::{CarbonPolicy, PolicyKey, SchedPolicy};
///
/// let key: PolicyKey = "carbon_cst_average".parse().unwrap();
/// assert_eq!(key.sched, SchedPolicy::Carbon);
/// assert_eq!(key.carbon, CarbonPolicy::CstAverage);
/// assert_eq!(key.to_string(), "carbon_cst_average");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PolicyKey {
    pub sched: SchedPolicy,
    pub carbon: CarbonPolicy,
}

impl PolicyKey {
    pub fn new(sched: SchedPolicy, carbon: CarbonPolicy) -> Self {
        Self { sched, carbon }
    }

    /// Combination used for the no-deferral reference run.
    pub fn reference() -> Self {
        Self::new(SchedPolicy::Carbon, CarbonPolicy::Waiting)
    }

    /// Every family crossed with every sweep selector.
    pub fn all() -> Vec<Self> {
        SchedPolicy::ALL
            .into_iter()
            .flat_map(|s| CarbonPolicy::SWEEP.into_iter().map(move |c| Self::new(s, c)))
            .collect()
    }

    /// The fixed comparison set.
    pub fn baseline() -> Vec<Self> {
        use CarbonPolicy as C;
        use SchedPolicy as S;
        vec![
            Self::new(S::SuspendResumeThreshold, C::Oracle),
            Self::new(S::SuspendResume, C::Oracle),
            Self::new(S::Carbon, C::Lowest),
            Self::new(S::Carbon, C::Waiting),
            Self::new(S::Carbon, C::CstAverage),
            Self::new(S::Edd, C::Fixed),
        ]
    }
}

impl fmt::Display for PolicyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.sched, self.carbon)
    }
}

impl FromStr for PolicyKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (sched, carbon) = s.trim().split_once('_').ok_or_else(|| {
            Error::Policy(format!(
                "invalid policy format \"{s}\", expected \"<sched>_<carbon>\""
            ))
        })?;
        Ok(Self::new(sched.parse()?, carbon.parse()?))
    }
}

/// Builds the policy instance for `key`.
///
/// `cpu_limits` is only read by the EDD family; an empty schedule there
/// means no limit applies.
pub fn create_scheduler(
    key: PolicyKey,
    carbon: CarbonModel,
    ticks_per_hour: usize,
    cpu_limits: Vec<f64>,
) -> Box<dyn SchedulingPolicy> {
    match key.sched {
        SchedPolicy::Carbon => Box::new(CarbonWaitingPolicy::new(
            carbon,
            key.carbon,
            ticks_per_hour,
        )),
        SchedPolicy::SuspendResume => Box::new(SuspendSchedulingPolicy::new(
            carbon,
            SuspendMode::Optimal,
            ticks_per_hour,
        )),
        SchedPolicy::SuspendResumeThreshold => Box::new(SuspendSchedulingPolicy::new(
            carbon,
            SuspendMode::Threshold,
            ticks_per_hour,
        )),
        SchedPolicy::Edd => Box::new(EddSchedulingPolicy::new(cpu_limits, ticks_per_hour)),
    }
}
