//! Task orchestration.
//!
//! The [`TaskOrchestrator`] turns task requests into agent runs:
//! - at most one running session per thread, later requests wait in FIFO order
//! - different threads run fully in parallel
//! - every run is bounded by the configured wall-clock budget
//! - every session gets exactly one terminal reply
//!
//! `submit` only touches the thread's queue and returns immediately. The
//! run itself happens on a per-thread worker task that drains the queue and
//! exits once the thread is idle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::BotConfig;
use crate::error::{AgentError, TaskError};
use crate::prompt::compose;
use crate::reply::{EMPTY_RESULT_TEXT, Reply, ReplySender, send_reply};
use crate::runner::{AgentOutput, AgentRequest, AgentRunner};
use crate::task::{TaskRequest, TaskResult, TaskSession, TaskStatus, ThreadId};
use crate::threads::{SharedContext, ThreadStore};

/// Finished sessions kept per thread for inspection.
const MAX_FINISHED_PER_THREAD: usize = 20;

/// Capacity of the lifecycle event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Immediate answer to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitAck {
    /// The task started right away.
    Started { session_id: Uuid },
    /// The task waits behind `position` tasks in the same thread.
    Queued { position: usize },
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Queued {
        thread_id: ThreadId,
        position: usize,
    },
    Started {
        thread_id: ThreadId,
        session_id: Uuid,
        at: DateTime<Utc>,
    },
    Finished {
        thread_id: ThreadId,
        session_id: Uuid,
        status: TaskStatus,
        /// Agent steps reported for the run.
        steps: usize,
        at: DateTime<Utc>,
    },
}

/// Point-in-time view of one thread.
#[derive(Debug, Clone)]
pub struct ThreadSnapshot {
    pub active: Option<TaskSession>,
    pub pending: Vec<TaskRequest>,
    pub finished: Vec<TaskSession>,
}

struct Inner {
    config: BotConfig,
    store: ThreadStore,
    runner: Arc<dyn AgentRunner>,
    replies: ReplySender,
    events: broadcast::Sender<TaskEvent>,
    in_flight: AtomicUsize,
}

/// Schedules and supervises task execution. Cheap to clone.
#[derive(Clone)]
pub struct TaskOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TaskOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskOrchestrator")
            .field("threads", &self.inner.store.len())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl TaskOrchestrator {
    pub fn new(config: BotConfig, runner: Arc<dyn AgentRunner>, replies: ReplySender) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                store: ThreadStore::new(),
                runner,
                replies,
                events,
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn config(&self) -> &BotConfig {
        &self.inner.config
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Number of threads with a worker currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Number of threads with retained state.
    pub fn thread_count(&self) -> usize {
        self.inner.store.len()
    }

    /// Accept a task for execution.
    ///
    /// Returns without waiting for the agent. Empty task text is rejected
    /// with a reply in the thread.
    pub async fn submit(&self, request: TaskRequest) -> Result<SubmitAck, TaskError> {
        let inner = &self.inner;

        if request.task_text.trim().is_empty() {
            debug!(thread = %request.thread_id, "Rejecting empty task");
            inner.reply(Reply::rejected(
                &request,
                "Please describe a task",
                &inner.config.command_prefix,
            ));
            return Err(TaskError::Validation("task text is empty".to_string()));
        }

        let (context, mut ctx) = inner.store.lock(&request.thread_id).await;
        ctx.touch();

        if ctx.active.is_some() {
            ctx.pending.push_back(request.clone());
            let position = ctx.pending.len();
            drop(ctx);

            info!(
                thread = %request.thread_id,
                user = %request.requester_id,
                position,
                "Task queued"
            );
            inner.emit(TaskEvent::Queued {
                thread_id: request.thread_id.clone(),
                position,
            });
            inner.reply(Reply::queued(&request, position));
            return Ok(SubmitAck::Queued { position });
        }

        let session = TaskSession::new(request);
        let session_id = session.id;
        ctx.active = Some(session);
        drop(ctx);

        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let worker = Arc::clone(inner);
        tokio::spawn(async move {
            worker.drive_thread(context).await;
            worker.in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(SubmitAck::Started { session_id })
    }

    /// Current state of a thread, if it is known.
    pub async fn snapshot(&self, thread_id: &ThreadId) -> Option<ThreadSnapshot> {
        let context = self.inner.store.get(thread_id)?;
        let ctx = context.lock().await;
        Some(ThreadSnapshot {
            active: ctx.active.clone(),
            pending: ctx.pending.iter().cloned().collect(),
            finished: ctx.finished.clone(),
        })
    }

    /// Drop idle thread state older than the configured retention.
    pub fn evict_idle(&self) -> usize {
        self.inner
            .store
            .evict_idle(self.inner.config.thread_retention())
    }

    /// Periodically evict idle thread state.
    pub fn spawn_janitor(&self, every: Duration) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = orchestrator.evict_idle();
                if evicted > 0 {
                    debug!(evicted, "Evicted idle thread contexts");
                }
            }
        })
    }
}

impl Inner {
    fn reply(&self, reply: Reply) {
        send_reply(&self.replies, reply);
    }

    fn emit(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Run the thread's sessions one after another until its queue is empty.
    async fn drive_thread(&self, context: SharedContext) {
        loop {
            let session = {
                let mut ctx = context.lock().await;
                let Some(session) = ctx.active.as_mut() else {
                    return;
                };
                if let Err(e) = session.transition(TaskStatus::Running) {
                    error!(session = %session.id, "{}", e);
                }
                session.clone()
            };

            let thread_id = session.thread_id().clone();
            info!(
                thread = %thread_id,
                session = %session.id,
                user = %session.request.requester_id,
                "Task started"
            );
            self.emit(TaskEvent::Started {
                thread_id: thread_id.clone(),
                session_id: session.id,
                at: session.started_at.unwrap_or_else(Utc::now),
            });
            if self.config.send_ack {
                self.reply(Reply::accepted(&session.request));
            }

            let outcome = self.execute(&session.request).await;

            let (finished, steps, has_next) = {
                let mut ctx = context.lock().await;
                let mut finished = ctx.active.take().unwrap_or(session);
                let steps = self.finish(&mut finished, outcome);

                ctx.finished.push(finished.clone());
                if ctx.finished.len() > MAX_FINISHED_PER_THREAD {
                    let excess = ctx.finished.len() - MAX_FINISHED_PER_THREAD;
                    ctx.finished.drain(..excess);
                }
                ctx.touch();

                let next = ctx.pending.pop_front();
                let has_next = next.is_some();
                ctx.active = next.map(TaskSession::new);
                (finished, steps, has_next)
            };

            self.emit(TaskEvent::Finished {
                thread_id,
                session_id: finished.id,
                status: finished.status,
                steps,
                at: finished.finished_at.unwrap_or_else(Utc::now),
            });

            if !has_next {
                return;
            }
        }
    }

    /// Record the outcome on the session and post the terminal reply.
    ///
    /// Returns the number of agent steps in the run.
    fn finish(
        &self,
        session: &mut TaskSession,
        outcome: Result<AgentOutput, AgentError>,
    ) -> usize {
        match outcome {
            Ok(output) => {
                if let Err(e) = session.transition(TaskStatus::Succeeded) {
                    error!(session = %session.id, "{}", e);
                }
                info!(
                    thread = %session.thread_id(),
                    session = %session.id,
                    steps = output.steps.len(),
                    done = output.is_done,
                    "Task succeeded"
                );
                let result = TaskResult {
                    session: session.clone(),
                    output_summary: summarize(&output),
                    step_trace: (!output.steps.is_empty()).then_some(output.steps),
                };
                let steps = match &result.step_trace {
                    Some(trace) => {
                        debug!(session = %session.id, trace = ?trace, "Agent step trace");
                        trace.len()
                    }
                    None => 0,
                };
                self.reply(Reply::completed(&result));
                steps
            }
            Err(e) => {
                if let Err(transition) = session.fail(e.to_string()) {
                    error!(session = %session.id, "{}", transition);
                }
                warn!(
                    thread = %session.thread_id(),
                    session = %session.id,
                    timeout = e.is_timeout(),
                    "Task failed: {}",
                    e
                );
                self.reply(Reply::failed(session));
                0
            }
        }
    }

    /// Run the agent under the time budget.
    ///
    /// The agent runs on its own task so that a panic inside it becomes a
    /// failed session instead of killing this thread's worker.
    async fn execute(&self, request: &TaskRequest) -> Result<AgentOutput, AgentError> {
        let agent_request = AgentRequest {
            task: request.task_text.clone(),
            system_prompt: compose(&self.config.prompt),
            max_steps: self.config.max_steps,
            headless: self.config.headless,
        };
        let budget = self.config.task_timeout();
        let runner = Arc::clone(&self.runner);

        let handle = tokio::spawn(async move { runner.run(&agent_request).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(budget, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AgentError::Panicked(join_error.to_string())),
            Err(_) => {
                abort.abort();
                Err(AgentError::Timeout(budget))
            }
        }
    }
}

fn summarize(output: &AgentOutput) -> String {
    output
        .final_result
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .unwrap_or(EMPTY_RESULT_TEXT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize() {
        assert_eq!(summarize(&AgentOutput::done("  Paris ")), "Paris");
        assert_eq!(summarize(&AgentOutput::default()), EMPTY_RESULT_TEXT);
        assert_eq!(summarize(&AgentOutput::done("")), EMPTY_RESULT_TEXT);
    }
}
