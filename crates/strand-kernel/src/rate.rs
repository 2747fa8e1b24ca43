//! Drift-corrected periodic sleep

use crate::error::{SchedError, SchedResult};
use crate::scheduler::Scheduler;
use crate::task::TaskId;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

struct RateState {
    period: Duration,
    last_wake: Cell<Duration>,
}

/// Helper for loops that should run at a fixed frequency
///
/// The task keeps one `Rate` across iterations and sleeps on it at the end of
/// each one. The sleep only covers what is left of the period, so processing
/// time does not accumulate into drift.
#[derive(Clone)]
pub struct Rate {
    inner: Rc<RateState>,
}

impl Rate {
    /// Create a rate with the given period, anchored at `now`
    pub fn new(period: Duration, now: Duration) -> Self {
        Self {
            inner: Rc::new(RateState {
                period,
                last_wake: Cell::new(now),
            }),
        }
    }

    /// Create a rate of `hz` iterations per second, anchored at `now`
    pub fn from_frequency(hz: f64, now: Duration) -> SchedResult<Self> {
        if !hz.is_finite() || hz <= 0.0 {
            return Err(SchedError::InvalidRate(hz));
        }
        Ok(Self::new(Duration::from_secs_f64(1.0 / hz), now))
    }

    /// Configured period
    pub fn period(&self) -> Duration {
        self.inner.period
    }

    /// Time of the last wakeup
    pub fn last_wake(&self) -> Duration {
        self.inner.last_wake.get()
    }

    /// Park `task` for the rest of the current period
    ///
    /// Returns the remaining time in seconds at call time; zero or negative
    /// means the period already elapsed, in which case the task is woken
    /// immediately and the rate re-anchors at the current time.
    pub fn sleep(&self, sched: &mut Scheduler, task: TaskId) -> f64 {
        let now = sched.now();
        let elapsed = now.saturating_sub(self.last_wake());
        let remaining = self.period().as_secs_f64() - elapsed.as_secs_f64();

        if remaining > 0.0 {
            let deadline = now + (self.period() - elapsed);
            let rate = self.clone();
            sched.schedule_owned(deadline, task, move |s| {
                rate.inner.last_wake.set(s.now());
                s.enqueue_front(task);
            });
        } else {
            self.inner.last_wake.set(now);
            sched.enqueue_front(task);
        }
        remaining
    }
}

impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rate")
            .field("period", &self.period())
            .field("last_wake", &self.last_wake())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_frequency() {
        let rate = Rate::from_frequency(4.0, Duration::from_secs(1)).unwrap();
        assert_eq!(rate.period(), Duration::from_millis(250));
        assert_eq!(rate.last_wake(), Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_frequency() {
        assert!(matches!(
            Rate::from_frequency(0.0, Duration::ZERO),
            Err(SchedError::InvalidRate(_))
        ));
        assert!(Rate::from_frequency(-2.0, Duration::ZERO).is_err());
        assert!(Rate::from_frequency(f64::NAN, Duration::ZERO).is_err());
        assert!(Rate::from_frequency(f64::INFINITY, Duration::ZERO).is_err());
    }

    #[test]
    fn test_clones_share_anchor() {
        let rate = Rate::new(Duration::from_secs(1), Duration::ZERO);
        let other = rate.clone();
        other.inner.last_wake.set(Duration::from_secs(3));
        assert_eq!(rate.last_wake(), Duration::from_secs(3));
    }
}
