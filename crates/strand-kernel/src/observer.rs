//! Lifecycle observer hooks

use crate::task::TaskId;
use std::fmt;

/// Why a task left the task table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// The body ran to completion
    Completed,
    /// Another task (or the host) killed it
    Killed,
    /// The body returned an error
    Failed(String),
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Completed => write!(f, "completed"),
            Termination::Killed => write!(f, "killed"),
            Termination::Failed(msg) => write!(f, "failed: {}", msg),
        }
    }
}

/// Receives task lifecycle events and diagnostic prints
///
/// All methods have defaults so an observer only overrides what it needs.
pub trait TaskObserver {
    /// A task was created and queued
    fn on_created(&mut self, _id: TaskId, _name: &str) {}

    /// A task left the task table
    fn on_terminated(&mut self, _id: TaskId, _name: &str, _reason: &Termination) {}

    /// A task issued a diagnostic print request
    fn on_print(&mut self, _id: TaskId, _message: &str) {}
}

/// Default observer: reports through the `log` facade
#[derive(Debug, Clone, Default)]
pub struct LogObserver {
    /// Also write diagnostic prints to stdout
    echo_prints: bool,
}

impl LogObserver {
    /// Create an observer; `echo_prints` mirrors print requests on stdout
    pub fn new(echo_prints: bool) -> Self {
        Self { echo_prints }
    }
}

impl TaskObserver for LogObserver {
    fn on_created(&mut self, id: TaskId, name: &str) {
        log::info!("Task {} (tid {}) created", name, id);
    }

    fn on_terminated(&mut self, id: TaskId, name: &str, reason: &Termination) {
        match reason {
            Termination::Failed(_) => log::warn!("Task {} (tid {}) {}", name, id, reason),
            _ => log::info!("Task {} (tid {}) {}", name, id, reason),
        }
    }

    fn on_print(&mut self, id: TaskId, message: &str) {
        if self.echo_prints {
            println!("[tid {}] {}", id, message);
        }
        log::info!(target: "strand::print", "[tid {}] {}", id, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::Completed.to_string(), "completed");
        assert_eq!(Termination::Killed.to_string(), "killed");
        assert_eq!(
            Termination::Failed("boom".to_string()).to_string(),
            "failed: boom"
        );
    }

    #[test]
    fn test_default_hooks_are_noops() {
        struct Silent;
        impl TaskObserver for Silent {}

        let mut observer = Silent;
        observer.on_created(TaskId::from_u64(1), "t");
        observer.on_print(TaskId::from_u64(1), "hello");
        observer.on_terminated(TaskId::from_u64(1), "t", &Termination::Completed);
    }
}
