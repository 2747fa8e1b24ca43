//! Values exchanged between the scheduler and task bodies

use crate::error::{SchedError, SchedResult};
use crate::rate::Rate;
use crate::scheduler::SchedulerHandle;
use crate::task::TaskId;
use std::time::Duration;

/// How an exit wait resolved
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The watched task (or, for wait-all, the last of them) exited
    Exited(TaskId),
    /// A target did not exist; nothing was registered
    Missing(TaskId),
    /// No target existed at all
    Empty,
}

/// Value injected into a task on resume
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Nothing to report
    #[default]
    None,
    /// Success flag
    Bool(bool),
    /// A single task id
    Id(TaskId),
    /// A list of task ids
    Ids(Vec<TaskId>),
    /// Resolution of an exit wait
    Wait(WaitOutcome),
    /// Scheduler time (elapsed since the clock's origin)
    Time(Duration),
    /// Signed seconds; remaining sleep of a rate period
    Seconds(f64),
    /// A rate helper
    Rate(Rate),
    /// Access to the scheduler's shared state
    Scheduler(SchedulerHandle),
}

impl Value {
    /// Name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Id(_) => "id",
            Value::Ids(_) => "ids",
            Value::Wait(_) => "wait",
            Value::Time(_) => "time",
            Value::Seconds(_) => "seconds",
            Value::Rate(_) => "rate",
            Value::Scheduler(_) => "scheduler",
        }
    }

    fn mismatch<T>(&self, request: &'static str) -> SchedResult<T> {
        Err(SchedError::UnexpectedResume {
            request,
            found: self.kind(),
        })
    }

    pub(crate) fn into_bool(self, request: &'static str) -> SchedResult<bool> {
        match self {
            Value::Bool(flag) => Ok(flag),
            other => other.mismatch(request),
        }
    }

    pub(crate) fn into_id(self, request: &'static str) -> SchedResult<TaskId> {
        match self {
            Value::Id(id) => Ok(id),
            other => other.mismatch(request),
        }
    }

    pub(crate) fn into_ids(self, request: &'static str) -> SchedResult<Vec<TaskId>> {
        match self {
            Value::Ids(ids) => Ok(ids),
            other => other.mismatch(request),
        }
    }

    pub(crate) fn into_wait(self, request: &'static str) -> SchedResult<WaitOutcome> {
        match self {
            Value::Wait(outcome) => Ok(outcome),
            other => other.mismatch(request),
        }
    }

    pub(crate) fn into_time(self, request: &'static str) -> SchedResult<Duration> {
        match self {
            Value::Time(t) => Ok(t),
            other => other.mismatch(request),
        }
    }

    pub(crate) fn into_seconds(self, request: &'static str) -> SchedResult<f64> {
        match self {
            Value::Seconds(s) => Ok(s),
            other => other.mismatch(request),
        }
    }

    pub(crate) fn into_scheduler(self, request: &'static str) -> SchedResult<SchedulerHandle> {
        match self {
            Value::Scheduler(handle) => Ok(handle),
            other => other.mismatch(request),
        }
    }
}
