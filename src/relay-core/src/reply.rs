//! Outbound replies.
//!
//! The orchestrator never talks to the chat platform directly. It pushes
//! [`Reply`] values into an unbounded channel that the gateway drains.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

use crate::task::{TaskRequest, TaskResult, TaskSession, ThreadId};

/// Text used when the agent finished without extracting anything.
pub const EMPTY_RESULT_TEXT: &str = "Task completed, but no specific result was returned.";

/// Sending half of the reply channel.
pub type ReplySender = mpsc::UnboundedSender<Reply>;

/// Receiving half of the reply channel.
pub type ReplyReceiver = mpsc::UnboundedReceiver<Reply>;

/// Create a reply channel.
pub fn reply_channel() -> (ReplySender, ReplyReceiver) {
    mpsc::unbounded_channel()
}

/// Queue a reply, logging if the gateway side is gone.
pub(crate) fn send_reply(replies: &ReplySender, reply: Reply) {
    if let Err(mpsc::error::SendError(reply)) = replies.send(reply) {
        warn!(thread = %reply.thread_id, kind = ?reply.kind, "Reply channel closed, dropping reply");
    }
}

/// What a reply is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    /// Usage text.
    Help,
    /// Task rejected before scheduling.
    Rejected,
    /// Task accepted and starting.
    Accepted,
    /// Task waiting behind another in the same thread.
    Queued,
    /// Task finished successfully.
    Completed,
    /// Task failed or timed out.
    Failed,
}

impl ReplyKind {
    /// Whether this is the single final reply of a session.
    pub fn is_terminal(self) -> bool {
        matches!(self, ReplyKind::Completed | ReplyKind::Failed)
    }
}

/// A message to post into a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub thread_id: ThreadId,
    pub kind: ReplyKind,
    pub text: String,
}

fn mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

impl Reply {
    pub fn new(thread_id: ThreadId, kind: ReplyKind, text: impl Into<String>) -> Self {
        Self {
            thread_id,
            kind,
            text: text.into(),
        }
    }

    pub fn help(thread_id: ThreadId, usage: String) -> Self {
        Self::new(thread_id, ReplyKind::Help, usage)
    }

    pub fn rejected(request: &TaskRequest, reason: &str, prefix: &str) -> Self {
        Self::new(
            request.thread_id.clone(),
            ReplyKind::Rejected,
            format!(
                "{} {reason}. Usage: `{prefix} <task>`",
                mention(&request.requester_id)
            ),
        )
    }

    pub fn accepted(request: &TaskRequest) -> Self {
        Self::new(
            request.thread_id.clone(),
            ReplyKind::Accepted,
            format!(
                "{} I'm working on: *{}*\nThis may take a few minutes...",
                mention(&request.requester_id),
                request.task_text
            ),
        )
    }

    pub fn queued(request: &TaskRequest, position: usize) -> Self {
        Self::new(
            request.thread_id.clone(),
            ReplyKind::Queued,
            format!(
                "{} Queued: *{}*\nIt will start when the {} ahead of it in this thread finish{}.",
                mention(&request.requester_id),
                request.task_text,
                if position == 1 {
                    "task".to_string()
                } else {
                    format!("{position} tasks")
                },
                if position == 1 { "es" } else { "" }
            ),
        )
    }

    pub fn completed(result: &TaskResult) -> Self {
        let request = &result.session.request;
        Self::new(
            request.thread_id.clone(),
            ReplyKind::Completed,
            format!(
                "{} Task completed:\n\n{}",
                mention(&request.requester_id),
                result.output_summary
            ),
        )
    }

    pub fn failed(session: &TaskSession) -> Self {
        let request = &session.request;
        Self::new(
            request.thread_id.clone(),
            ReplyKind::Failed,
            format!(
                "{} Error during task execution: {}",
                mention(&request.requester_id),
                session.error_detail.as_deref().unwrap_or("unknown error")
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use pretty_assertions::assert_eq;

    fn request(text: &str) -> TaskRequest {
        TaskRequest::new(ThreadId::new("C1", "1.0"), "U7", text)
    }

    #[test]
    fn test_accepted_text() {
        let reply = Reply::accepted(&request("find the capital of France"));
        assert_eq!(reply.kind, ReplyKind::Accepted);
        assert_eq!(
            reply.text,
            "<@U7> I'm working on: *find the capital of France*\nThis may take a few minutes..."
        );
    }

    #[test]
    fn test_queued_text_pluralizes() {
        let one = Reply::queued(&request("b"), 1);
        assert!(one.text.contains("the task ahead of it in this thread finishes."));
        let three = Reply::queued(&request("b"), 3);
        assert!(three.text.contains("the 3 tasks ahead of it in this thread finish."));
    }

    #[test]
    fn test_terminal_texts() {
        let mut session = TaskSession::new(request("a"));
        session.transition(TaskStatus::Running).unwrap();
        session.transition(TaskStatus::Succeeded).unwrap();
        let result = TaskResult {
            session: session.clone(),
            output_summary: "Paris".to_string(),
            step_trace: None,
        };
        let reply = Reply::completed(&result);
        assert!(reply.kind.is_terminal());
        assert_eq!(reply.text, "<@U7> Task completed:\n\nParis");

        let mut failed = TaskSession::new(request("a"));
        failed.transition(TaskStatus::Running).unwrap();
        failed.fail("Task timed out after 5s").unwrap();
        let reply = Reply::failed(&failed);
        assert!(reply.kind.is_terminal());
        assert_eq!(
            reply.text,
            "<@U7> Error during task execution: Task timed out after 5s"
        );
    }

    #[test]
    fn test_rejected_text() {
        let reply = Reply::rejected(&request(""), "Please describe a task", "$bu");
        assert!(!reply.kind.is_terminal());
        assert_eq!(
            reply.text,
            "<@U7> Please describe a task. Usage: `$bu <task>`"
        );
    }
}
