//! Condition variable tests
//!
//! Reactive wakeups: which writes re-evaluate which predicates, wakeup order,
//! pausing, and access to variables from inside tasks.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use strand_kernel::{
    Condition, ConditionVariable, Coroutine, ManualClock, SchedError, Scheduler, TaskState,
};

type Trace = Rc<RefCell<Vec<String>>>;

fn setup() -> Scheduler {
    Scheduler::with_clock(ManualClock::new())
}

fn wait_until(name: &'static str, condition: Condition, trace: Trace) -> Coroutine {
    Coroutine::new(name, move |co| async move {
        co.wait_until(condition).await;
        trace.borrow_mut().push(name.to_string());
        Ok(())
    })
}

#[test]
fn test_unrelated_write_does_not_reevaluate() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 0i32).unwrap();
    let y = sched.condition_variable("y", 0i32).unwrap();
    let evaluations = Rc::new(Cell::new(0));
    let trace: Trace = Rc::default();

    let counter = evaluations.clone();
    let xv = x.clone();
    let cond = Condition::new(move || {
        counter.set(counter.get() + 1);
        xv.read() > 2
    })
    .depends_on_var(&x);
    let a = sched.create(wait_until("a", cond, trace.clone()));

    sched.step().unwrap();
    assert_eq!(evaluations.get(), 1);
    assert_eq!(sched.condition_waiters(), 1);

    y.write(10);
    sched.step().unwrap();
    assert_eq!(evaluations.get(), 1);
    assert_eq!(sched.state_of(a), Some(TaskState::Parked));

    x.write(1);
    sched.step().unwrap();
    assert_eq!(evaluations.get(), 2);
    assert!(trace.borrow().is_empty());

    x.write(3);
    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["a"]);
    assert_eq!(sched.condition_waiters(), 0);
}

#[test]
fn test_transient_write_wakes_waiter() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 0i32).unwrap();
    let trace: Trace = Rc::default();

    let a = sched.create(wait_until("a", x.when(|v| *v > 5), trace.clone()));
    sched.step().unwrap();
    assert_eq!(sched.state_of(a), Some(TaskState::Parked));

    // True only between the two writes
    x.write(10);
    assert_eq!(sched.condition_waiters(), 0);
    x.write(0);

    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["a"]);
    assert!(sched.is_empty());
}

#[test]
fn test_transient_write_from_task_wakes_waiter() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 0i32).unwrap();
    let trace: Trace = Rc::default();

    sched.create(wait_until("a", x.when(|v| *v > 5), trace.clone()));
    let writes = trace.clone();
    let xv = x.clone();
    sched.create(Coroutine::new("pulse", move |co| async move {
        co.yield_now().await;
        xv.write(10);
        xv.write(0);
        writes.borrow_mut().push("pulse".to_string());
        Ok(())
    }));

    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["pulse", "a"]);
    assert_eq!(x.read(), 0);
}

#[test]
fn test_already_true_condition_does_not_park() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 5i32).unwrap();
    let trace: Trace = Rc::default();

    sched.create(wait_until("a", x.when(|v| *v == 5), trace.clone()));
    sched.step().unwrap();

    assert_eq!(*trace.borrow(), vec!["a"]);
    assert_eq!(sched.condition_waiters(), 0);
}

#[test]
fn test_woken_batch_runs_ahead_of_ready_tasks_in_order() {
    let mut sched = setup();
    let x = sched.condition_variable("x", false).unwrap();
    let trace: Trace = Rc::default();

    sched.create(wait_until("a", x.when(|v| *v), trace.clone()));
    sched.create(wait_until("b", x.when(|v| *v), trace.clone()));
    sched.step().unwrap();

    let ready = trace.clone();
    sched.create(Coroutine::new("r", move |_co| async move {
        ready.borrow_mut().push("r".to_string());
        Ok(())
    }));

    x.write(true);
    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["a", "b", "r"]);
}

#[test]
fn test_write_from_task_wakes_waiter() {
    let mut sched = setup();
    let level = sched.condition_variable("level", 0u32).unwrap();
    let trace: Trace = Rc::default();

    sched.create(wait_until("watcher", level.when(|v| *v >= 3), trace.clone()));

    let writes = trace.clone();
    sched.create(Coroutine::new("writer", move |co| async move {
        let handle = co.scheduler().await?;
        let level: ConditionVariable<u32> = handle
            .condition("level")
            .ok_or_else(|| anyhow::anyhow!("level is not registered"))?;
        for _ in 0..3 {
            level.update(|v| *v += 1);
            writes.borrow_mut().push(format!("wrote {}", level.read()));
            co.yield_now().await;
        }
        Ok(())
    }));

    sched.step().unwrap();
    assert_eq!(
        *trace.borrow(),
        vec!["wrote 1", "wrote 2", "wrote 3", "watcher"]
    );
}

#[test]
fn test_multi_dependency_condition() {
    let mut sched = setup();
    let temp = sched.condition_variable("temp", 20.0f64).unwrap();
    let fan = sched.condition_variable("fan", false).unwrap();
    let trace: Trace = Rc::default();

    let (t, f) = (temp.clone(), fan.clone());
    let cond = Condition::new(move || t.read() > 30.0 && !f.read())
        .depends_on_var(&temp)
        .depends_on_var(&fan);
    sched.create(wait_until("alarm", cond, trace.clone()));
    sched.step().unwrap();

    fan.write(true);
    temp.write(35.0);
    sched.step().unwrap();
    assert!(trace.borrow().is_empty());

    fan.write(false);
    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["alarm"]);
}

#[test]
fn test_catch_all_condition_reevaluated_on_any_write() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 0i32).unwrap();
    let trace: Trace = Rc::default();

    let xv = x.clone();
    sched.create(wait_until("a", Condition::new(move || xv.read() == 7), trace.clone()));
    sched.step().unwrap();

    x.write(7);
    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["a"]);
}

#[test]
fn test_paused_waiter_is_skipped_and_stays_registered() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 0i32).unwrap();
    let trace: Trace = Rc::default();

    let a = sched.create(wait_until("a", x.when(|v| *v > 0), trace.clone()));
    sched.step().unwrap();
    assert!(sched.pause(a));

    x.write(1);
    sched.step().unwrap();
    assert!(trace.borrow().is_empty());
    assert_eq!(sched.condition_waiters(), 1);

    assert!(sched.resume(a));
    x.write(2);
    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["a"]);
}

#[test]
fn test_kill_removes_condition_waits() {
    let mut sched = setup();
    let x = sched.condition_variable("x", 0i32).unwrap();
    let trace: Trace = Rc::default();

    let a = sched.create(wait_until("a", x.when(|v| *v > 0), trace.clone()));
    sched.step().unwrap();
    assert_eq!(sched.condition_waiters(), 1);

    sched.kill(a);
    assert_eq!(sched.condition_waiters(), 0);
    x.write(1);
    sched.step().unwrap();
    assert!(trace.borrow().is_empty());
}

#[test]
fn test_notify_reevaluates_without_write() {
    let mut sched = setup();
    let external = Rc::new(Cell::new(false));
    let trace: Trace = Rc::default();

    let flag = external.clone();
    let cond = Condition::new(move || flag.get()).depends_on("external");
    sched.create(wait_until("a", cond, trace.clone()));
    sched.step().unwrap();

    external.set(true);
    assert_eq!(sched.notify("external"), 1);
    sched.step().unwrap();
    assert_eq!(*trace.borrow(), vec!["a"]);
}

#[test]
fn test_duplicate_variable_name() {
    let sched = setup();
    sched.condition_variable("energy", 100u32).unwrap();
    let result = sched.condition_variable("energy", 0u32);
    assert!(matches!(result, Err(SchedError::DuplicateCondition(name)) if name == "energy"));
}
