//! Task structure and the suspension protocol

use crate::syscall::Request;
use crate::value::Value;
use rustc_hash::FxHashSet;
use std::fmt;

/// Unique identifier for a Task
///
/// Ids are handed out by the owning scheduler, start at 1 and are never reused
/// within one scheduler instance.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Create a TaskId from a u64 value
    pub fn from_u64(id: u64) -> Self {
        TaskId(id)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling state of a live Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// Queued in the ready queue
    Ready,
    /// Popped by the trampoline; body executing or its request being handled
    Running,
    /// Waiting on an exit, a condition or a timer
    Parked,
    /// Paused while it was runnable; resuming puts it at the front of the queue
    PausedReady,
    /// Paused while parked; its wait still fires but the wakeup is withheld
    PausedParked,
}

impl TaskState {
    /// Whether the task is in one of the two pause sets
    pub fn is_paused(self) -> bool {
        matches!(self, TaskState::PausedReady | TaskState::PausedParked)
    }
}

/// Policy for multi-target exit waits
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Wake on the first watched exit
    #[default]
    Any,
    /// Wake once every watched task has exited
    All,
}

/// Outcome of resuming a task body once
pub enum Step {
    /// The body has no more work
    Complete,
    /// Plain suspension; the task goes to the back of the ready queue
    Yield,
    /// The body asks the scheduler for a service
    Request(Request),
    /// The body failed; handled according to the fault policy
    Fault(anyhow::Error),
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Complete => write!(f, "Complete"),
            Step::Yield => write!(f, "Yield"),
            Step::Request(request) => write!(f, "Request({:?})", request),
            Step::Fault(err) => write!(f, "Fault({})", err),
        }
    }
}

/// A resumable computation driven by the scheduler
///
/// Each call to `resume` runs the body up to its next suspension point. The
/// value passed in is whatever the previous request resolved to (`Value::None`
/// on the very first resume and after a plain yield).
pub trait TaskBody {
    /// Name used in lifecycle reports
    fn name(&self) -> &str {
        "task"
    }

    /// Run until the next suspension point
    fn resume(&mut self, input: Value) -> Step;

    /// Deliver the cancellation signal; the body will not be resumed again
    fn cancel(&mut self) {}
}

/// Task body backed by a closure, for explicit state machines
pub struct FnBody<F> {
    name: String,
    step: F,
}

impl<F> TaskBody for FnBody<F>
where
    F: FnMut(Value) -> Step,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, input: Value) -> Step {
        (self.step)(input)
    }
}

/// Wrap a closure as a task body
pub fn from_fn<F>(name: impl Into<String>, step: F) -> FnBody<F>
where
    F: FnMut(Value) -> Step,
{
    FnBody {
        name: name.into(),
        step,
    }
}

/// A task as held in the scheduler's task table
pub(crate) struct Task {
    id: TaskId,
    name: String,
    /// Taken out while the body executes
    body: Option<Box<dyn TaskBody>>,
    /// Value to inject on next resume
    pub(crate) resume_value: Value,
    pub(crate) state: TaskState,
    pub(crate) wait_mode: WaitMode,
    /// Task ids this task is registered as an exit-watcher of
    pub(crate) watching: FxHashSet<TaskId>,
}

impl Task {
    pub(crate) fn new(id: TaskId, body: Box<dyn TaskBody>) -> Self {
        Self {
            id,
            name: body.name().to_string(),
            body: Some(body),
            resume_value: Value::None,
            state: TaskState::Ready,
            wait_mode: WaitMode::Any,
            watching: FxHashSet::default(),
        }
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn take_body(&mut self) -> Option<Box<dyn TaskBody>> {
        self.body.take()
    }

    pub(crate) fn restore_body(&mut self, body: Box<dyn TaskBody>) {
        self.body = Some(body);
    }

    /// Send the cancellation signal into the body and drop it
    pub(crate) fn cancel(&mut self) {
        if let Some(mut body) = self.body.take() {
            body.cancel();
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("wait_mode", &self.wait_mode)
            .finish()
    }
}
