//! Timer-ordered scheduling
//!
//! Deadline-ordered callbacks on top of the scheduler core, plus the two run
//! loops: `run()` sleeps through the clock until the next deadline, while
//! `tick_now()` fires whatever is already due and returns, for hosts that
//! advance time themselves.

use crate::config::StallPolicy;
use crate::error::{SchedError, SchedResult};
use crate::scheduler::Scheduler;
use crate::task::TaskId;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

/// Callback fired when a timer expires
pub type TimerCallback = Box<dyn FnOnce(&mut Scheduler)>;

/// Entry in the timer heap
pub(crate) struct TimerEntry {
    /// When to fire
    pub(crate) deadline: Duration,
    /// Insertion order; breaks deadline ties
    seq: u64,
    /// Task the timer will wake, if any; dropped when that task exits
    owner: Option<TaskId>,
    pub(crate) callback: TimerCallback,
}

// Reverse ordering for min-heap (earliest deadline, then earliest insertion, first)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

/// Deadline-ordered priority queue of callbacks
#[derive(Default)]
pub(crate) struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub(crate) fn push(&mut self, deadline: Duration, owner: Option<TaskId>, callback: TimerCallback) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerEntry {
            deadline,
            seq,
            owner,
            callback,
        });
    }

    /// Earliest entry regardless of deadline
    pub(crate) fn pop(&mut self) -> Option<TimerEntry> {
        self.heap.pop()
    }

    /// Earliest entry if its deadline is at or before `now`
    pub(crate) fn pop_due(&mut self, now: Duration) -> Option<TimerEntry> {
        if self.heap.peek()?.deadline <= now {
            self.heap.pop()
        } else {
            None
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    /// Drop every timer owned by `task`
    pub(crate) fn cancel_owned(&mut self, task: TaskId) -> usize {
        let before = self.heap.len();
        self.heap.retain(|entry| entry.owner != Some(task));
        before - self.heap.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }
}

impl Scheduler {
    /// Run `callback` once scheduler time reaches `deadline`
    ///
    /// Timers with equal deadlines fire in the order they were scheduled.
    pub fn schedule_at(&mut self, deadline: Duration, callback: impl FnOnce(&mut Scheduler) + 'static) {
        self.timers.push(deadline, None, Box::new(callback));
    }

    /// Like `schedule_at`, but the timer is dropped if `owner` exits first
    pub(crate) fn schedule_owned(
        &mut self,
        deadline: Duration,
        owner: TaskId,
        callback: impl FnOnce(&mut Scheduler) + 'static,
    ) {
        self.timers.push(deadline, Some(owner), Box::new(callback));
    }

    /// Number of pending timers
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Run until no timers, ready tasks or condition waiters remain
    ///
    /// Sleeps through the clock until each deadline. If only condition
    /// waiters are left, nothing can change their variables any more and the
    /// configured `StallPolicy` decides the outcome.
    pub fn run(&mut self) -> SchedResult<()> {
        loop {
            self.step()?;

            match self.timers.pop() {
                Some(entry) => {
                    let now = self.now();
                    if entry.deadline > now {
                        self.clock().sleep(entry.deadline - now);
                    }
                    (entry.callback)(self);
                }
                None => {
                    if self.conditions().is_empty() {
                        return Ok(());
                    }
                    let waiting = self.conditions().len();
                    log::warn!("run() stalled with {} condition waiter(s)", waiting);
                    return match self.config().stall_policy {
                        StallPolicy::Error => Err(SchedError::Stalled { waiting }),
                        StallPolicy::Return => Ok(()),
                    };
                }
            }
        }
    }

    /// Fire every timer already due, then drain the ready queue once
    ///
    /// Never sleeps. Returns the number of timers fired.
    pub fn tick_now(&mut self) -> SchedResult<usize> {
        let mut fired = 0;
        loop {
            let now = self.now();
            match self.timers.pop_due(now) {
                Some(entry) => {
                    (entry.callback)(self);
                    fired += 1;
                }
                None => break,
            }
        }
        self.step()?;
        Ok(fired)
    }
}
