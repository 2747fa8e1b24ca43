//! Kernel error types

use crate::task::TaskId;
use thiserror::Error;

/// Errors surfaced by the scheduler to its host
#[derive(Debug, Error)]
pub enum SchedError {
    /// A task body faulted and the fault policy is `Abort`
    #[error("Task {id} ({name}) failed: {source}")]
    TaskFailed {
        /// Id of the faulting task
        id: TaskId,
        /// Name of the faulting task
        name: String,
        /// Error returned by the body
        #[source]
        source: anyhow::Error,
    },

    /// `run()` has only condition waiters left and nothing that could wake them
    #[error("Scheduler stalled: {waiting} task(s) parked on conditions with no timers or ready tasks")]
    Stalled {
        /// Number of tasks still parked on conditions
        waiting: usize,
    },

    /// A condition variable with this name is already registered
    #[error("Condition variable '{0}' is already registered")]
    DuplicateCondition(String),

    /// A typed request helper received a resume value of the wrong kind
    #[error("Unexpected resume value for {request}: got {found}")]
    UnexpectedResume {
        /// Request that was issued
        request: &'static str,
        /// Kind of value that came back
        found: &'static str,
    },

    /// Rate frequency must be finite and strictly positive
    #[error("Invalid rate frequency: {0}")]
    InvalidRate(f64),

    /// Failed to parse a configuration file
    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    /// Failed to read a configuration file
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
}

/// Kernel result type
pub type SchedResult<T> = Result<T, SchedError>;
