//! Strand Kernel
//!
//! A single-threaded cooperative task kernel. Tasks are resumable bodies that
//! run until they suspend, either with a plain yield or with a request for a
//! kernel service:
//! - **Tasks**: create, kill, pause and resume tasks, wait for one, any or all
//!   of a set of tasks to exit (`scheduler`, `syscall`)
//! - **Conditions**: named reactive variables; tasks park until a predicate
//!   over them holds (`condition`)
//! - **Time**: timers, fixed-duration waits and drift-corrected periodic
//!   loops over a pluggable clock (`timer`, `rate`, `clock`)
//! - **Bodies**: explicit state machines (`task::from_fn`) or `async` blocks
//!   (`coroutine`)
//!
//! # Example
//!
//! ```rust,ignore
//! use strand_kernel::{Coroutine, Scheduler};
//! use std::time::Duration;
//!
//! let mut sched = Scheduler::new();
//! sched.create(Coroutine::new("main", |co| async move {
//!     let child = co
//!         .spawn(Coroutine::new("child", |co| async move {
//!             co.sleep_for(Duration::from_millis(50)).await;
//!             Ok(())
//!         }))
//!         .await?;
//!     co.wait(child).await?;
//!     co.print("child done").await;
//!     Ok(())
//! }));
//! sched.run()?;
//! ```

#![warn(rust_2018_idioms)]

pub mod clock;
pub mod condition;
pub mod config;
pub mod coroutine;
pub mod error;
pub mod observer;
pub mod rate;
pub mod scheduler;
pub mod syscall;
pub mod task;
pub mod timer;
pub mod value;

pub use clock::{Clock, ManualClock, SystemClock};
pub use condition::{Condition, ConditionVariable};
pub use config::{FaultPolicy, SchedulerConfig, StallPolicy};
pub use coroutine::{Co, Coroutine, Syscall};
pub use error::{SchedError, SchedResult};
pub use observer::{LogObserver, TaskObserver, Termination};
pub use rate::Rate;
pub use scheduler::{Scheduler, SchedulerHandle};
pub use syscall::Request;
pub use task::{from_fn, FnBody, Step, TaskBody, TaskId, TaskState, WaitMode};
pub use timer::TimerCallback;
pub use value::{Value, WaitOutcome};
