//! `async` task bodies
//!
//! `Coroutine` drives an `async` block as a `TaskBody`. The block receives a
//! `Co` and suspends by awaiting requests on it; the scheduler is the only
//! executor, polling with a no-op waker whenever it resumes the task. Awaiting
//! a future that is not a scheduler request leaves the body with nothing to
//! report and is treated as a fault.

use crate::condition::Condition;
use crate::error::{SchedError, SchedResult};
use crate::rate::Rate;
use crate::scheduler::SchedulerHandle;
use crate::syscall::Request;
use crate::task::{Step, TaskBody, TaskId};
use crate::value::{Value, WaitOutcome};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

enum Outgoing {
    Request(Request),
    Yield,
}

/// Mailbox between a coroutine body and its driver
#[derive(Default)]
struct Channel {
    outbox: RefCell<Option<Outgoing>>,
    inbox: RefCell<Option<Value>>,
}

type BodyFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>>>>;

/// Task body backed by an `async` block
pub struct Coroutine {
    name: String,
    channel: Rc<Channel>,
    /// `None` once finished or cancelled
    future: Option<BodyFuture>,
}

impl Coroutine {
    /// Build a coroutine from a closure producing the body future
    ///
    /// ```ignore
    /// let body = Coroutine::new("child", |co| async move {
    ///     co.print("hello").await;
    ///     Ok(())
    /// });
    /// ```
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(Co) -> Fut,
        Fut: Future<Output = anyhow::Result<()>> + 'static,
    {
        let channel = Rc::new(Channel::default());
        let co = Co {
            channel: channel.clone(),
        };
        Self {
            name: name.into(),
            channel,
            future: Some(Box::pin(body(co))),
        }
    }
}

impl TaskBody for Coroutine {
    fn name(&self) -> &str {
        &self.name
    }

    fn resume(&mut self, input: Value) -> Step {
        let Some(future) = self.future.as_mut() else {
            return Step::Complete;
        };
        *self.channel.inbox.borrow_mut() = Some(input);

        let mut cx = Context::from_waker(Waker::noop());
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(result) => {
                self.future = None;
                match result {
                    Ok(()) => Step::Complete,
                    Err(err) => Step::Fault(err),
                }
            }
            Poll::Pending => {
                let outgoing = self.channel.outbox.borrow_mut().take();
                match outgoing {
                    Some(Outgoing::Request(request)) => Step::Request(request),
                    Some(Outgoing::Yield) => Step::Yield,
                    None => {
                        self.future = None;
                        Step::Fault(anyhow::anyhow!(
                            "{} suspended on a future that is not a scheduler request",
                            self.name
                        ))
                    }
                }
            }
        }
    }

    fn cancel(&mut self) {
        self.future = None;
    }
}

/// Future returned by `Co::call`; resolves to the request's resume value
#[must_use = "requests do nothing unless awaited"]
pub struct Syscall {
    channel: Rc<Channel>,
    outgoing: Option<Outgoing>,
}

impl Future for Syscall {
    type Output = Value;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Value> {
        if let Some(outgoing) = self.outgoing.take() {
            *self.channel.outbox.borrow_mut() = Some(outgoing);
            return Poll::Pending;
        }
        Poll::Ready(self.channel.inbox.borrow_mut().take().unwrap_or_default())
    }
}

/// Task-side handle for issuing requests from a coroutine body
pub struct Co {
    channel: Rc<Channel>,
}

impl Co {
    fn send(&self, outgoing: Outgoing) -> Syscall {
        Syscall {
            channel: self.channel.clone(),
            outgoing: Some(outgoing),
        }
    }

    /// Suspend with a raw request
    pub fn call(&self, request: Request) -> Syscall {
        self.send(Outgoing::Request(request))
    }

    /// Plain suspension; the task goes to the back of the ready queue
    pub async fn yield_now(&self) {
        self.send(Outgoing::Yield).await;
    }

    pub async fn scheduler(&self) -> SchedResult<SchedulerHandle> {
        self.call(Request::GetScheduler)
            .await
            .into_scheduler("get-scheduler")
    }

    pub async fn own_id(&self) -> SchedResult<TaskId> {
        self.call(Request::GetOwnId).await.into_id("get-own-id")
    }

    /// Every live id, ascending
    pub async fn list_ids(&self) -> SchedResult<Vec<TaskId>> {
        self.call(Request::ListIds).await.into_ids("list-ids")
    }

    pub async fn spawn(&self, body: impl TaskBody + 'static) -> SchedResult<TaskId> {
        self.call(Request::Spawn(Box::new(body)))
            .await
            .into_id("spawn")
    }

    /// Kill a task; false if it did not exist
    pub async fn kill(&self, id: TaskId) -> SchedResult<bool> {
        self.call(Request::Kill(id)).await.into_bool("kill")
    }

    /// Kill several tasks; returns the ids that existed
    pub async fn kill_many(&self, ids: Vec<TaskId>) -> SchedResult<Vec<TaskId>> {
        self.call(Request::KillMany(ids)).await.into_ids("kill-many")
    }

    /// Kill every live task not in `keep`; the caller is killed too unless listed
    pub async fn kill_all_except(&self, keep: Vec<TaskId>) -> SchedResult<Vec<TaskId>> {
        self.call(Request::KillAllExcept(keep))
            .await
            .into_ids("kill-all-except")
    }

    /// Wait for a task to exit
    pub async fn wait(&self, id: TaskId) -> SchedResult<WaitOutcome> {
        self.call(Request::Wait(id)).await.into_wait("wait")
    }

    /// Wait for the first of `ids` to exit
    ///
    /// Resolves at once with `Missing` if any id is not alive.
    pub async fn wait_any(&self, ids: Vec<TaskId>) -> SchedResult<WaitOutcome> {
        self.call(Request::WaitAny(ids)).await.into_wait("wait-any")
    }

    /// Wait until every live task among `ids` has exited
    pub async fn wait_all(&self, ids: Vec<TaskId>) -> SchedResult<WaitOutcome> {
        self.call(Request::WaitAll(ids)).await.into_wait("wait-all")
    }

    pub async fn pause(&self, id: TaskId) -> SchedResult<bool> {
        self.call(Request::Pause(id)).await.into_bool("pause")
    }

    pub async fn pause_many(&self, ids: Vec<TaskId>) -> SchedResult<Vec<TaskId>> {
        self.call(Request::PauseMany(ids)).await.into_ids("pause-many")
    }

    pub async fn resume(&self, id: TaskId) -> SchedResult<bool> {
        self.call(Request::Resume(id)).await.into_bool("resume")
    }

    pub async fn resume_many(&self, ids: Vec<TaskId>) -> SchedResult<Vec<TaskId>> {
        self.call(Request::ResumeMany(ids))
            .await
            .into_ids("resume-many")
    }

    /// Current scheduler time
    pub async fn now(&self) -> SchedResult<Duration> {
        self.call(Request::GetTime).await.into_time("get-time")
    }

    /// Park for `duration`
    pub async fn sleep_for(&self, duration: Duration) {
        self.call(Request::WaitDuration(duration)).await;
    }

    /// Park until `condition` holds; returns at once if it already does
    pub async fn wait_until(&self, condition: Condition) {
        self.call(Request::WaitCondition(condition)).await;
    }

    /// Rate helper of `hz` iterations per second, anchored now
    pub async fn create_rate(&self, hz: f64) -> SchedResult<Rate> {
        match self.call(Request::CreateRate(hz)).await {
            Value::Rate(rate) => Ok(rate),
            Value::None => Err(SchedError::InvalidRate(hz)),
            other => Err(SchedError::UnexpectedResume {
                request: "create-rate",
                found: other.kind(),
            }),
        }
    }

    /// Park for the rest of the rate's period; returns the remaining seconds
    /// at call time (zero or negative on overrun)
    pub async fn sleep(&self, rate: &Rate) -> SchedResult<f64> {
        self.call(Request::Sleep(rate.clone()))
            .await
            .into_seconds("sleep")
    }

    /// Diagnostic output through the scheduler's observer
    pub async fn print(&self, message: impl Into<String>) {
        self.call(Request::Print(message.into())).await;
    }
}
