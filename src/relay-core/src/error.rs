//! Error types for task orchestration.
//!
//! Errors here are local to a single task or to configuration loading.
//! A failing task is reported in its thread and never affects other tasks.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single agent run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The run exceeded its wall-clock budget.
    #[error("Task timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The agent reported a failure.
    #[error("Agent failed: {0}")]
    Failed(String),

    /// The agent produced output we could not understand.
    #[error("Invalid agent output: {0}")]
    Protocol(String),

    /// The agent process could not be started.
    #[error("Failed to start agent: {0}")]
    Spawn(String),

    /// The agent task panicked or was aborted.
    #[error("Agent crashed: {0}")]
    Panicked(String),
}

impl AgentError {
    /// Whether this failure is a budget overrun.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout(_))
    }
}

/// Errors returned by [`crate::TaskOrchestrator::submit`] and task execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Empty or malformed task text. Reported in-thread, never retried.
    #[error("Invalid task: {0}")]
    Validation(String),

    /// The automation run failed or exceeded its budget.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("Missing configuration: {0}")]
    Missing(String),

    /// A setting is present but unusable.
    #[error("Invalid configuration for {key}: {message}")]
    Invalid { key: String, message: String },

    /// Configuration file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML.
    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = AgentError::Timeout(Duration::from_secs(90));
        assert_eq!(err.to_string(), "Task timed out after 90s");
        assert!(err.is_timeout());
    }

    #[test]
    fn test_task_error_wraps_agent_error() {
        let err: TaskError = AgentError::Failed("page not found".to_string()).into();
        assert_eq!(err.to_string(), "Agent failed: page not found");
        assert!(!matches!(err, TaskError::Validation(_)));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::invalid("BU_MAX_STEPS", "not a number");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for BU_MAX_STEPS: not a number"
        );
    }
}
