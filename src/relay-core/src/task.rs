//! Task data model.
//!
//! A [`TaskRequest`] is created when a command is classified. It becomes a
//! [`TaskSession`] when execution begins; the session then moves through
//! `Pending -> Running -> Succeeded | Failed`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies a conversation thread: a channel plus the timestamp of the
/// thread's root message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId {
    /// Channel the thread lives in.
    pub channel: String,
    /// Timestamp of the root message.
    pub thread_ts: String,
}

impl ThreadId {
    pub fn new(channel: impl Into<String>, thread_ts: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            thread_ts: thread_ts.into(),
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.thread_ts)
    }
}

/// A request to run one task in one thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub thread_id: ThreadId,
    pub requester_id: String,
    pub task_text: String,
    pub submitted_at: DateTime<Utc>,
}

impl TaskRequest {
    pub fn new(
        thread_id: ThreadId,
        requester_id: impl Into<String>,
        task_text: impl Into<String>,
    ) -> Self {
        Self {
            thread_id,
            requester_id: requester_id.into(),
            task_text: task_text.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Running)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid task transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// One execution of a [`TaskRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSession {
    pub id: Uuid,
    pub request: TaskRequest,
    pub status: TaskStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error_detail: Option<String>,
}

impl TaskSession {
    /// Create a pending session for a request.
    pub fn new(request: TaskRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            status: TaskStatus::Pending,
            started_at: None,
            finished_at: None,
            error_detail: None,
        }
    }

    /// Move to `next`, stamping start/finish times.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        match next {
            TaskStatus::Running => self.started_at = Some(now),
            TaskStatus::Succeeded | TaskStatus::Failed => self.finished_at = Some(now),
            TaskStatus::Pending => {}
        }
        self.status = next;
        Ok(())
    }

    /// Mark the session failed with a detail message.
    pub fn fail(&mut self, detail: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Failed)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.request.thread_id
    }
}

/// Outcome of a successful run, ready to be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub session: TaskSession,
    pub output_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_trace: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TaskRequest {
        TaskRequest::new(ThreadId::new("C123", "1700000000.000100"), "U42", "open example.com")
    }

    #[test]
    fn test_thread_id_display() {
        let id = ThreadId::new("C123", "1700000000.000100");
        assert_eq!(id.to_string(), "C123:1700000000.000100");
    }

    #[test]
    fn test_session_happy_path() {
        let mut session = TaskSession::new(request());
        assert_eq!(session.status, TaskStatus::Pending);

        session.transition(TaskStatus::Running).unwrap();
        assert!(session.started_at.is_some());

        session.transition(TaskStatus::Succeeded).unwrap();
        assert!(session.finished_at.is_some());
        assert!(session.status.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut session = TaskSession::new(request());
        session.transition(TaskStatus::Running).unwrap();
        session.fail("boom").unwrap();
        assert_eq!(session.error_detail.as_deref(), Some("boom"));

        let err = session.transition(TaskStatus::Running).unwrap_err();
        assert_eq!(err.from, TaskStatus::Failed);
        assert_eq!(err.to, TaskStatus::Running);
        assert!(session.transition(TaskStatus::Succeeded).is_err());
    }

    #[test]
    fn test_cannot_skip_running() {
        let mut session = TaskSession::new(request());
        assert!(session.transition(TaskStatus::Succeeded).is_err());
        assert!(session.fail("never ran").is_err());
        assert_eq!(session.status, TaskStatus::Pending);
    }
}
