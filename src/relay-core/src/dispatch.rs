//! Inbound message dispatch.
//!
//! A single loop consumes inbound messages from the gateway, classifies them
//! and routes tasks to the orchestrator. Nothing here waits on an agent run,
//! so intake keeps flowing while tasks execute.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::command::{Command, parse, usage_text};
use crate::error::TaskError;
use crate::orchestrator::{SubmitAck, TaskOrchestrator};
use crate::reply::{Reply, ReplySender, send_reply};
use crate::task::{TaskRequest, ThreadId};

/// A chat message as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub thread_id: ThreadId,
    pub requester_id: String,
    pub text: String,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not addressed to the bot.
    Ignored,
    /// Usage text was sent.
    HelpSent,
    /// A task was accepted.
    Submitted(SubmitAck),
    /// A task was rejected.
    Rejected(TaskError),
}

/// Routes classified commands.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    orchestrator: TaskOrchestrator,
    replies: ReplySender,
}

impl Dispatcher {
    pub fn new(orchestrator: TaskOrchestrator, replies: ReplySender) -> Self {
        Self {
            orchestrator,
            replies,
        }
    }

    fn prefix(&self) -> &str {
        &self.orchestrator.config().command_prefix
    }

    /// Handle one inbound message.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        match parse(&message.text, self.prefix()) {
            Command::Unrecognized { .. } => DispatchOutcome::Ignored,
            Command::Help => {
                debug!(thread = %message.thread_id, "Sending usage text");
                send_reply(
                    &self.replies,
                    Reply::help(message.thread_id, usage_text(self.prefix())),
                );
                DispatchOutcome::HelpSent
            }
            Command::Task { text } => {
                info!(
                    thread = %message.thread_id,
                    user = %message.requester_id,
                    "Received task: {}",
                    text
                );
                let request = TaskRequest::new(message.thread_id, message.requester_id, text);
                match self.orchestrator.submit(request).await {
                    Ok(ack) => DispatchOutcome::Submitted(ack),
                    Err(e) => DispatchOutcome::Rejected(e),
                }
            }
        }
    }

    /// Consume inbound messages until the channel closes.
    pub async fn run(self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            self.dispatch(message).await;
        }
        debug!("Inbound channel closed, dispatcher stopping");
    }
}
