//! Request vocabulary and request handlers
//!
//! A task suspends with `Step::Request`; the trampoline hands the request to
//! `dispatch`, which performs the effect and decides when the caller runs
//! again. Handlers that resolve immediately store the resume value and queue
//! the caller at the back; the others leave it parked until an exit, a timer
//! or a condition wakes it.

use crate::condition::Condition;
use crate::rate::Rate;
use crate::scheduler::Scheduler;
use crate::task::{TaskBody, TaskId, WaitMode};
use crate::value::{Value, WaitOutcome};
use std::fmt;
use std::time::Duration;

/// A service requested by a suspended task
pub enum Request {
    /// Handle to the scheduler's clock and condition variables
    GetScheduler,
    /// The caller's own id
    GetOwnId,
    /// Every live id, ascending
    ListIds,
    /// Create a task
    Spawn(Box<dyn TaskBody>),
    /// Kill one task
    Kill(TaskId),
    /// Kill each listed task that exists
    KillMany(Vec<TaskId>),
    /// Kill every live task not listed
    KillAllExcept(Vec<TaskId>),
    /// Wait for one task to exit
    Wait(TaskId),
    /// Wait for the first of several tasks to exit
    WaitAny(Vec<TaskId>),
    /// Wait for every listed task to exit
    WaitAll(Vec<TaskId>),
    Pause(TaskId),
    PauseMany(Vec<TaskId>),
    Resume(TaskId),
    ResumeMany(Vec<TaskId>),
    /// Current scheduler time
    GetTime,
    /// Park for a fixed duration
    WaitDuration(Duration),
    /// Park until a predicate holds
    WaitCondition(Condition),
    /// Build a rate helper of the given frequency (Hz)
    CreateRate(f64),
    /// Park for the rest of the rate's current period
    Sleep(Rate),
    /// Diagnostic output routed to the observer
    Print(String),
}

impl Request {
    /// Short kebab-case name, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Request::GetScheduler => "get-scheduler",
            Request::GetOwnId => "get-own-id",
            Request::ListIds => "list-ids",
            Request::Spawn(_) => "spawn",
            Request::Kill(_) => "kill",
            Request::KillMany(_) => "kill-many",
            Request::KillAllExcept(_) => "kill-all-except",
            Request::Wait(_) => "wait",
            Request::WaitAny(_) => "wait-any",
            Request::WaitAll(_) => "wait-all",
            Request::Pause(_) => "pause",
            Request::PauseMany(_) => "pause-many",
            Request::Resume(_) => "resume",
            Request::ResumeMany(_) => "resume-many",
            Request::GetTime => "get-time",
            Request::WaitDuration(_) => "wait-duration",
            Request::WaitCondition(_) => "wait-condition",
            Request::CreateRate(_) => "create-rate",
            Request::Sleep(_) => "sleep",
            Request::Print(_) => "print",
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Spawn(body) => write!(f, "Spawn({})", body.name()),
            Request::Kill(id) | Request::Wait(id) | Request::Pause(id) | Request::Resume(id) => {
                write!(f, "{}({})", self.kind(), id)
            }
            Request::KillMany(ids)
            | Request::KillAllExcept(ids)
            | Request::WaitAny(ids)
            | Request::WaitAll(ids)
            | Request::PauseMany(ids)
            | Request::ResumeMany(ids) => write!(f, "{}({:?})", self.kind(), ids),
            Request::WaitDuration(d) => write!(f, "wait-duration({:?})", d),
            Request::WaitCondition(cond) => write!(f, "wait-condition({:?})", cond),
            Request::CreateRate(hz) => write!(f, "create-rate({})", hz),
            Request::Sleep(rate) => write!(f, "sleep({:?})", rate.period()),
            Request::Print(msg) => write!(f, "print({:?})", msg),
            _ => f.write_str(self.kind()),
        }
    }
}

/// Store the resume value and queue the caller at the back
fn resolve(sched: &mut Scheduler, caller: TaskId, value: Value) {
    sched.set_resume_value(caller, value);
    sched.enqueue(caller);
}

fn kill_each(sched: &mut Scheduler, ids: impl IntoIterator<Item = TaskId>) -> Vec<TaskId> {
    ids.into_iter().filter(|id| sched.kill(*id)).collect()
}

/// Perform `request` on behalf of `caller`
pub(crate) fn dispatch(sched: &mut Scheduler, caller: TaskId, request: Request) {
    log::trace!("tid {} dispatch {:?}", caller, request);

    match request {
        Request::GetScheduler => {
            let handle = sched.handle();
            resolve(sched, caller, Value::Scheduler(handle));
        }
        Request::GetOwnId => resolve(sched, caller, Value::Id(caller)),
        Request::ListIds => {
            let ids = sched.task_ids();
            resolve(sched, caller, Value::Ids(ids));
        }
        Request::Spawn(body) => {
            let id = sched.create_boxed(body);
            resolve(sched, caller, Value::Id(id));
        }

        Request::Kill(target) => {
            let existed = sched.kill(target);
            resolve(sched, caller, Value::Bool(existed));
        }
        Request::KillMany(ids) => {
            let killed = kill_each(sched, ids);
            resolve(sched, caller, Value::Ids(killed));
        }
        Request::KillAllExcept(keep) => {
            let targets: Vec<TaskId> = sched
                .task_ids()
                .into_iter()
                .filter(|id| !keep.contains(id))
                .collect();
            let killed = kill_each(sched, targets);
            resolve(sched, caller, Value::Ids(killed));
        }

        Request::Wait(target) => {
            sched.set_wait_mode(caller, WaitMode::Any);
            if !sched.wait_for_exit(caller, target) {
                resolve(sched, caller, Value::Wait(WaitOutcome::Missing(target)));
            }
        }
        Request::WaitAny(ids) => {
            sched.set_wait_mode(caller, WaitMode::Any);
            if ids.is_empty() {
                resolve(sched, caller, Value::Wait(WaitOutcome::Empty));
                return;
            }
            let missing = ids
                .iter()
                .copied()
                .find(|id| *id == caller || !sched.contains(*id));
            match missing {
                Some(id) => resolve(sched, caller, Value::Wait(WaitOutcome::Missing(id))),
                None => {
                    for id in ids {
                        sched.wait_for_exit(caller, id);
                    }
                }
            }
        }
        Request::WaitAll(ids) => {
            sched.set_wait_mode(caller, WaitMode::All);
            let mut any = false;
            for id in ids {
                any |= sched.wait_for_exit(caller, id);
            }
            if !any {
                resolve(sched, caller, Value::Wait(WaitOutcome::Empty));
            }
        }

        Request::Pause(target) => {
            let paused = sched.pause(target);
            resolve(sched, caller, Value::Bool(paused));
        }
        Request::PauseMany(ids) => {
            let paused: Vec<TaskId> = ids.into_iter().filter(|id| sched.pause(*id)).collect();
            resolve(sched, caller, Value::Ids(paused));
        }
        Request::Resume(target) => {
            let resumed = sched.resume(target);
            resolve(sched, caller, Value::Bool(resumed));
        }
        Request::ResumeMany(ids) => {
            let resumed: Vec<TaskId> = ids.into_iter().filter(|id| sched.resume(*id)).collect();
            resolve(sched, caller, Value::Ids(resumed));
        }

        Request::GetTime => {
            let now = sched.now();
            resolve(sched, caller, Value::Time(now));
        }
        Request::WaitDuration(duration) => {
            sched.set_resume_value(caller, Value::None);
            let deadline = sched.now() + duration;
            sched.schedule_owned(deadline, caller, move |s| {
                s.enqueue_front(caller);
            });
        }
        Request::WaitCondition(condition) => {
            sched.set_resume_value(caller, Value::None);
            if condition.evaluate() {
                sched.enqueue_front(caller);
            } else {
                sched.conditions().register(caller, condition);
            }
        }
        Request::CreateRate(hz) => match Rate::from_frequency(hz, sched.now()) {
            Ok(rate) => resolve(sched, caller, Value::Rate(rate)),
            Err(err) => {
                log::warn!("tid {}: {}", caller, err);
                resolve(sched, caller, Value::None);
            }
        },
        Request::Sleep(rate) => {
            let remaining = rate.sleep(sched, caller);
            sched.set_resume_value(caller, Value::Seconds(remaining));
        }
        Request::Print(message) => {
            sched.observer_mut().on_print(caller, &message);
            resolve(sched, caller, Value::None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::task::{from_fn, Step, TaskState};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Body that issues one request, records the resume value and completes
    fn ask(
        sched: &mut Scheduler,
        request: Request,
    ) -> (TaskId, Rc<RefCell<Option<Value>>>) {
        let answer = Rc::new(RefCell::new(None));
        let slot = answer.clone();
        let mut pending = Some(request);
        let id = sched.create(from_fn("asker", move |input| match pending.take() {
            Some(request) => Step::Request(request),
            None => {
                *slot.borrow_mut() = Some(input);
                Step::Complete
            }
        }));
        (id, answer)
    }

    fn idle(sched: &mut Scheduler) -> TaskId {
        sched.create(from_fn("idle", |_| Step::Yield))
    }

    #[test]
    fn test_request_kind_and_debug() {
        let id = TaskId::from_u64(3);
        assert_eq!(Request::KillAllExcept(vec![id]).kind(), "kill-all-except");
        assert_eq!(format!("{:?}", Request::Wait(id)), "wait(3)");
        assert_eq!(format!("{:?}", Request::GetOwnId), "get-own-id");
    }

    #[test]
    fn test_get_own_id() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let (id, answer) = ask(&mut sched, Request::GetOwnId);
        sched.step().unwrap();
        assert!(matches!(*answer.borrow(), Some(Value::Id(got)) if got == id));
    }

    #[test]
    fn test_wait_on_self_is_missing() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let caller = idle(&mut sched);
        sched.pause(caller);
        dispatch(&mut sched, caller, Request::Wait(caller));
        assert!(sched.exit_watchers(caller).is_empty());
    }

    #[test]
    fn test_wait_all_with_no_live_targets() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let gone = TaskId::from_u64(50);
        let (caller, answer) = ask(&mut sched, Request::WaitAll(vec![gone]));
        sched.step().unwrap();
        assert!(!sched.contains(caller));
        assert!(matches!(*answer.borrow(), Some(Value::Wait(WaitOutcome::Empty))));
    }

    #[test]
    fn test_wait_any_empty_list() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let (_, answer) = ask(&mut sched, Request::WaitAny(Vec::new()));
        sched.step().unwrap();
        assert!(matches!(*answer.borrow(), Some(Value::Wait(WaitOutcome::Empty))));
    }

    #[test]
    fn test_kill_many_reports_existing() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let a = idle(&mut sched);
        let b = idle(&mut sched);
        let (_, answer) = ask(
            &mut sched,
            Request::KillMany(vec![a, TaskId::from_u64(77), b]),
        );
        sched.step().unwrap();
        match answer.borrow().as_ref() {
            Some(Value::Ids(killed)) => assert_eq!(killed, &vec![a, b]),
            other => panic!("Expected Ids, got {:?}", other),
        }
        assert!(sched.is_empty());
    }

    #[test]
    fn test_pause_many_skips_already_paused() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let a = idle(&mut sched);
        let b = idle(&mut sched);
        sched.pause(b);
        let (_, answer) = ask(&mut sched, Request::PauseMany(vec![a, b]));
        sched.step().unwrap();
        match answer.borrow().as_ref() {
            Some(Value::Ids(paused)) => assert_eq!(paused, &vec![a]),
            other => panic!("Expected Ids, got {:?}", other),
        }
        assert_eq!(sched.state_of(a), Some(TaskState::PausedReady));
    }

    #[test]
    fn test_create_rate_invalid_resolves_none() {
        let mut sched = Scheduler::with_clock(ManualClock::new());
        let (_, answer) = ask(&mut sched, Request::CreateRate(-1.0));
        sched.step().unwrap();
        assert!(matches!(*answer.borrow(), Some(Value::None)));
    }

    #[test]
    fn test_wait_duration_parks_behind_owned_timer() {
        let clock = ManualClock::new();
        let mut sched = Scheduler::with_clock(clock.clone());
        let (caller, answer) = ask(&mut sched, Request::WaitDuration(Duration::from_secs(2)));
        sched.step().unwrap();
        assert_eq!(sched.state_of(caller), Some(TaskState::Parked));
        assert_eq!(sched.next_deadline(), Some(Duration::from_secs(2)));

        clock.advance(Duration::from_secs(2));
        assert_eq!(sched.tick_now().unwrap(), 1);
        assert!(!sched.contains(caller));
        assert!(matches!(*answer.borrow(), Some(Value::None)));
    }
}
