//! Scheduler core: task table, ready queue, wait bookkeeping and the trampoline

use crate::clock::{Clock, SystemClock};
use crate::condition::{ConditionBoard, ConditionVariable, ConditionWaits};
use crate::config::{FaultPolicy, SchedulerConfig};
use crate::error::{SchedError, SchedResult};
use crate::observer::{LogObserver, TaskObserver, Termination};
use crate::syscall;
use crate::task::{Step, Task, TaskBody, TaskId, TaskState, WaitMode};
use crate::timer::TimerQueue;
use crate::value::{Value, WaitOutcome};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Shared view of a scheduler handed to tasks by the get-scheduler request
///
/// Gives access to the clock and to condition variables by name; it cannot
/// touch the task table.
#[derive(Clone)]
pub struct SchedulerHandle {
    board: Rc<ConditionBoard>,
    clock: Rc<dyn Clock>,
}

impl SchedulerHandle {
    /// Current scheduler time
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Look up a condition variable by name and value type
    pub fn condition<T: Clone + 'static>(&self, name: &str) -> Option<ConditionVariable<T>> {
        self.board.lookup(name)
    }
}

impl fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("variables", &self.board.len())
            .finish_non_exhaustive()
    }
}

/// Single-threaded cooperative scheduler
pub struct Scheduler {
    /// Every live task
    tasks: BTreeMap<TaskId, Task>,

    /// Tasks waiting to run
    ready: VecDeque<TaskId>,

    /// watched task -> tasks waiting on its exit
    exit_waiting: FxHashMap<TaskId, Vec<TaskId>>,

    /// Named condition variables and the waits on them
    board: Rc<ConditionBoard>,

    /// Deadline-ordered callbacks
    pub(crate) timers: TimerQueue,

    clock: Rc<dyn Clock>,
    observer: Box<dyn TaskObserver>,
    config: SchedulerConfig,

    /// Last id handed out
    last_id: u64,
}

impl Scheduler {
    /// Create a scheduler on the wall clock with the default configuration
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default(), SystemClock::new())
    }

    /// Create a scheduler on a custom clock
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self::with_config(SchedulerConfig::default(), clock)
    }

    /// Create a scheduler with a configuration and a clock
    pub fn with_config(config: SchedulerConfig, clock: impl Clock + 'static) -> Self {
        Self {
            tasks: BTreeMap::new(),
            ready: VecDeque::new(),
            exit_waiting: FxHashMap::default(),
            board: Rc::new(ConditionBoard::default()),
            timers: TimerQueue::default(),
            clock: Rc::new(clock),
            observer: Box::new(LogObserver::new(config.echo_prints)),
            config,
            last_id: 0,
        }
    }

    /// Replace the lifecycle observer
    pub fn with_observer(mut self, observer: impl TaskObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub(crate) fn conditions(&self) -> &ConditionWaits {
        self.board.waits()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn observer_mut(&mut self) -> &mut dyn TaskObserver {
        self.observer.as_mut()
    }

    /// Current scheduler time
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Handle exposing the clock and condition variables
    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            board: self.board.clone(),
            clock: self.clock.clone(),
        }
    }

    /// Register a named condition variable
    pub fn condition_variable<T: Clone + 'static>(
        &self,
        name: &str,
        initial: T,
    ) -> SchedResult<ConditionVariable<T>> {
        self.board.register(name, initial)
    }

    // ========================================================================
    // Task table
    // ========================================================================

    /// Create a task and queue it; returns its id
    pub fn create(&mut self, body: impl TaskBody + 'static) -> TaskId {
        self.create_boxed(Box::new(body))
    }

    /// Create a task from an already boxed body
    pub fn create_boxed(&mut self, body: Box<dyn TaskBody>) -> TaskId {
        self.last_id += 1;
        let id = TaskId::from_u64(self.last_id);
        let task = Task::new(id, body);
        self.observer.on_created(id, task.name());
        self.tasks.insert(id, task);
        self.ready.push_back(id);
        id
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is alive
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether `id` is alive
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// All live ids, ascending
    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.keys().copied().collect()
    }

    /// Scheduling state of a live task
    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|task| task.state)
    }

    /// Name of a live task
    pub fn name_of(&self, id: TaskId) -> Option<&str> {
        self.tasks.get(&id).map(|task| task.name())
    }

    /// Ready queue, front first
    pub fn ready_ids(&self) -> Vec<TaskId> {
        self.ready.iter().copied().collect()
    }

    /// Number of queued tasks
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Tasks paused while runnable
    pub fn paused_ready(&self) -> Vec<TaskId> {
        self.ids_in(TaskState::PausedReady)
    }

    /// Tasks paused while parked
    pub fn paused_parked(&self) -> Vec<TaskId> {
        self.ids_in(TaskState::PausedParked)
    }

    fn ids_in(&self, state: TaskState) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|task| task.state == state)
            .map(|task| task.id())
            .collect()
    }

    /// Number of pending condition waits
    pub fn condition_waiters(&self) -> usize {
        self.conditions().len()
    }

    /// Tasks registered as waiting on `id`'s exit
    pub fn exit_watchers(&self, id: TaskId) -> Vec<TaskId> {
        self.exit_waiting.get(&id).cloned().unwrap_or_default()
    }

    pub(crate) fn set_resume_value(&mut self, id: TaskId, value: Value) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.resume_value = value;
        }
    }

    pub(crate) fn set_wait_mode(&mut self, id: TaskId, mode: WaitMode) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.wait_mode = mode;
        }
    }

    // ========================================================================
    // Trampoline
    // ========================================================================

    /// Run ready tasks until the ready queue is empty
    ///
    /// Tasks queued by handlers during the drain run in the same call. With
    /// `FaultPolicy::Abort` the first body fault ends the drain and is
    /// returned; the faulting task has already been removed.
    pub fn step(&mut self) -> SchedResult<()> {
        self.flush_conditions();

        while let Some(id) = self.ready.pop_front() {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            if task.state != TaskState::Ready {
                continue;
            }
            let Some(mut body) = task.take_body() else {
                continue;
            };
            task.state = TaskState::Running;
            let input = std::mem::take(&mut task.resume_value);

            match body.resume(input) {
                Step::Complete => {
                    drop(body);
                    self.exit(id, Termination::Completed);
                }
                Step::Fault(err) => {
                    drop(body);
                    self.fault(id, err)?;
                }
                Step::Yield => {
                    self.restore_body(id, body);
                    self.enqueue(id);
                }
                Step::Request(request) => {
                    self.restore_body(id, body);
                    syscall::dispatch(self, id, request);
                    // The handler did not reschedule: the task stays parked
                    if let Some(task) = self.tasks.get_mut(&id) {
                        if task.state == TaskState::Running {
                            task.state = TaskState::Parked;
                        }
                    }
                }
            }

            self.flush_conditions();
        }

        Ok(())
    }

    fn restore_body(&mut self, id: TaskId, body: Box<dyn TaskBody>) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.restore_body(body);
        }
    }

    fn fault(&mut self, id: TaskId, err: anyhow::Error) -> SchedResult<()> {
        let name = self.name_of(id).unwrap_or("task").to_string();
        self.exit(id, Termination::Failed(format!("{:#}", err)));
        match self.config.fault_policy {
            FaultPolicy::Abort => Err(SchedError::TaskFailed {
                id,
                name,
                source: err,
            }),
            FaultPolicy::Isolate => {
                log::error!("Task {} (tid {}) failed: {:#}", name, id, err);
                Ok(())
            }
        }
    }

    // ========================================================================
    // Exit protocol
    // ========================================================================

    /// Remove a task and notify its exit-watchers
    ///
    /// The task's own registrations (exit waits, condition waits, timers) go
    /// with it. WAIT_ANY watchers wake with this id and drop their other
    /// registrations; WAIT_ALL watchers wake once nothing else they watch is
    /// alive.
    fn exit(&mut self, id: TaskId, reason: Termination) -> bool {
        let Some(mut task) = self.tasks.remove(&id) else {
            return false;
        };
        if task.state == TaskState::Ready {
            self.ready.retain(|queued| *queued != id);
        }
        for watched in task.watching.drain() {
            self.unwatch(watched, id);
        }
        self.conditions().remove_task(id);
        self.timers.cancel_owned(id);
        self.observer.on_terminated(id, task.name(), &reason);

        let watchers = self.exit_waiting.remove(&id).unwrap_or_default();
        for watcher in watchers {
            let Some(waiting) = self.tasks.get_mut(&watcher) else {
                continue;
            };
            waiting.watching.remove(&id);
            let wake = match waiting.wait_mode {
                WaitMode::Any => {
                    let others: Vec<TaskId> = waiting.watching.drain().collect();
                    for other in others {
                        self.unwatch(other, watcher);
                    }
                    true
                }
                WaitMode::All => waiting.watching.is_empty(),
            };
            if wake {
                self.set_resume_value(watcher, Value::Wait(WaitOutcome::Exited(id)));
                self.enqueue(watcher);
            }
        }
        true
    }

    fn unwatch(&mut self, watched: TaskId, watcher: TaskId) {
        if let Some(list) = self.exit_waiting.get_mut(&watched) {
            list.retain(|w| *w != watcher);
            if list.is_empty() {
                self.exit_waiting.remove(&watched);
            }
        }
    }

    /// Cancel a task's body and run the exit protocol for it
    ///
    /// The body's cancellation path runs first. Returns whether the task
    /// existed.
    pub fn kill(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        task.cancel();
        self.exit(id, Termination::Killed)
    }

    /// Register `task` as a watcher of `watched`'s exit
    ///
    /// Returns false if `watched` is not alive (or is `task` itself); the
    /// caller should then resolve the wait immediately.
    pub fn wait_for_exit(&mut self, task: TaskId, watched: TaskId) -> bool {
        if task == watched || !self.tasks.contains_key(&watched) {
            return false;
        }
        let Some(waiting) = self.tasks.get_mut(&task) else {
            return false;
        };
        if waiting.watching.insert(watched) {
            self.exit_waiting.entry(watched).or_default().push(task);
        }
        true
    }

    // ========================================================================
    // Ready queue and pausing
    // ========================================================================

    /// Queue a task at the back of the ready queue
    ///
    /// A task paused while parked records the wakeup instead and becomes
    /// paused-while-ready. Returns whether the task's state changed.
    pub fn enqueue(&mut self, id: TaskId) -> bool {
        self.wake(id, false)
    }

    /// Queue a task at the front of the ready queue
    pub fn enqueue_front(&mut self, id: TaskId) -> bool {
        self.wake(id, true)
    }

    fn wake(&mut self, id: TaskId, front: bool) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        match task.state {
            TaskState::Running | TaskState::Parked => {
                task.state = TaskState::Ready;
                if front {
                    self.ready.push_front(id);
                } else {
                    self.ready.push_back(id);
                }
                true
            }
            TaskState::PausedParked => {
                task.state = TaskState::PausedReady;
                self.conditions().set_held(id, false);
                true
            }
            TaskState::Ready | TaskState::PausedReady => false,
        }
    }

    /// Pause a task
    ///
    /// A ready task leaves the ready queue; a parked (or running) task keeps
    /// its wait registration but will not be woken until resumed. Returns
    /// false if the task is absent or already paused.
    pub fn pause(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        match task.state {
            TaskState::Ready => {
                task.state = TaskState::PausedReady;
                self.ready.retain(|queued| *queued != id);
                true
            }
            TaskState::Running | TaskState::Parked => {
                task.state = TaskState::PausedParked;
                self.conditions().set_held(id, true);
                true
            }
            TaskState::PausedReady | TaskState::PausedParked => false,
        }
    }

    /// Reverse `pause`
    ///
    /// A task paused while ready goes to the front of the ready queue; one
    /// paused while parked becomes eligible for its wait again. Returns false
    /// if the task is absent or not paused.
    pub fn resume(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        match task.state {
            TaskState::PausedReady => {
                task.state = TaskState::Ready;
                self.ready.push_front(id);
                true
            }
            TaskState::PausedParked => {
                task.state = TaskState::Parked;
                self.conditions().set_held(id, false);
                true
            }
            _ => false,
        }
    }

    // ========================================================================
    // Condition waits
    // ========================================================================

    /// Queue the tasks whose conditions were satisfied since the last flush
    ///
    /// Writes resolve waits immediately; this moves the woken tasks to the
    /// front of the ready queue in the order they were woken. Called by
    /// `step()` before the drain and after every task step. Returns the number
    /// of tasks queued.
    pub fn flush_conditions(&mut self) -> usize {
        let woken = self.conditions().take_woken();
        for task in woken.iter().rev() {
            self.set_resume_value(*task, Value::None);
            self.enqueue_front(*task);
        }
        woken.len()
    }

    /// Re-evaluate predicates registered under `name` without a write
    ///
    /// Satisfied waits are removed from every name they were registered under
    /// and their tasks go to the front of the ready queue, keeping their
    /// registration order. Tasks paused while parked are skipped and stay
    /// registered. Returns the number of waits satisfied.
    pub fn notify(&mut self, name: &str) -> usize {
        let satisfied = self.conditions().notify(name);
        self.flush_conditions();
        satisfied
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("ready", &self.ready)
            .field("condition_waiters", &self.conditions().len())
            .field("timers", &self.timers.len())
            .field("config", &self.config)
            .finish()
    }
}
