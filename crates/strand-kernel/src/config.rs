//! Scheduler configuration (TOML)
//!
//! ```toml
//! fault_policy = "isolate"   # or "abort" (default)
//! stall_policy = "return"    # or "error" (default)
//! echo_prints = true
//! ```

use crate::error::SchedResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the trampoline does when a task body faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Terminate the task and return the error from `step()`
    #[default]
    Abort,
    /// Terminate the task, log the error and keep scheduling
    Isolate,
}

/// What `run()` does when only condition waiters remain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StallPolicy {
    /// Return `SchedError::Stalled`
    #[default]
    Error,
    /// Return `Ok(())` leaving the waiters parked
    Return,
}

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Body fault handling
    pub fault_policy: FaultPolicy,

    /// Behavior of `run()` on a condition-only stall
    pub stall_policy: StallPolicy,

    /// Mirror diagnostic prints on stdout (default observer only)
    pub echo_prints: bool,
}

impl SchedulerConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> SchedResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file
    pub fn from_path(path: impl AsRef<Path>) -> SchedResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedError;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.fault_policy, FaultPolicy::Abort);
        assert_eq!(config.stall_policy, StallPolicy::Error);
        assert!(!config.echo_prints);
    }

    #[test]
    fn test_parse_partial() {
        let config = SchedulerConfig::from_toml_str("fault_policy = \"isolate\"").unwrap();
        assert_eq!(config.fault_policy, FaultPolicy::Isolate);
        assert_eq!(config.stall_policy, StallPolicy::Error);
    }

    #[test]
    fn test_parse_full() {
        let config = SchedulerConfig::from_toml_str(
            r#"
            fault_policy = "abort"
            stall_policy = "return"
            echo_prints = true
            "#,
        )
        .unwrap();
        assert_eq!(config.stall_policy, StallPolicy::Return);
        assert!(config.echo_prints);
    }

    #[test]
    fn test_parse_invalid_policy() {
        let result = SchedulerConfig::from_toml_str("fault_policy = \"ignore\"");
        assert!(matches!(result, Err(SchedError::Config(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stall_policy = \"return\"").unwrap();

        let config = SchedulerConfig::from_path(file.path()).unwrap();
        assert_eq!(config.stall_policy, StallPolicy::Return);
    }

    #[test]
    fn test_from_missing_path() {
        let result = SchedulerConfig::from_path("/nonexistent/strand.toml");
        assert!(matches!(result, Err(SchedError::Io(_))));
    }
}
