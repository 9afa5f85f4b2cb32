//! Task orchestration core for browser-relay.
//!
//! This crate turns chat commands into bounded, per-thread-serialized runs of
//! an external browser automation agent:
//! - [`command`] classifies raw message text
//! - [`prompt`] composes the agent's system prompt (default, extend, override)
//! - [`threads`] keeps per-thread state behind per-thread locks
//! - [`orchestrator`] schedules runs and reports outcomes
//! - [`runner`] is the seam to the agent itself
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relay_core::{BotConfig, Dispatcher, ProcessRunner, TaskOrchestrator, reply_channel};
//!
//! let (replies, reply_rx) = reply_channel();
//! let runner = Arc::new(ProcessRunner::from_command_line("browser-use-runner")?);
//! let orchestrator = TaskOrchestrator::new(BotConfig::default(), runner, replies.clone());
//! let dispatcher = Dispatcher::new(orchestrator, replies);
//! ```

pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod reply;
pub mod runner;
pub mod task;
pub mod threads;

// Re-export main types
pub use command::{Command, DEFAULT_PREFIX, parse, usage_text};
pub use config::{AgentConfig, BotConfig};
pub use dispatch::{DispatchOutcome, Dispatcher, InboundMessage};
pub use error::{AgentError, ConfigError, TaskError};
pub use orchestrator::{SubmitAck, TaskEvent, TaskOrchestrator, ThreadSnapshot};
pub use prompt::{SystemPromptConfig, compose};
pub use reply::{Reply, ReplyKind, ReplyReceiver, ReplySender, reply_channel};
pub use runner::{AgentOutput, AgentRequest, AgentRunner, ProcessRunner};
pub use task::{TaskRequest, TaskResult, TaskSession, TaskStatus, ThreadId};
pub use threads::{ThreadContext, ThreadStore};
