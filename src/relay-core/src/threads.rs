//! Per-thread session state.
//!
//! The store maps each [`ThreadId`] to its own mutex-guarded
//! [`ThreadContext`]. Lookups and insertions for different threads proceed
//! in parallel; mutation of a single context is serialized by its mutex.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::task::{TaskRequest, TaskSession, ThreadId};

/// Shared handle to one thread's context.
pub type SharedContext = Arc<Mutex<ThreadContext>>;

/// State of one conversation thread.
#[derive(Debug, Clone)]
pub struct ThreadContext {
    pub thread_id: ThreadId,
    /// Session currently executing, if any.
    pub active: Option<TaskSession>,
    /// Requests waiting for the active session to finish.
    pub pending: VecDeque<TaskRequest>,
    /// Sessions that reached a terminal state, oldest first.
    pub finished: Vec<TaskSession>,
    pub last_activity: DateTime<Utc>,
}

impl ThreadContext {
    pub fn new(thread_id: ThreadId) -> Self {
        Self {
            thread_id,
            active: None,
            pending: VecDeque::new(),
            finished: Vec::new(),
            last_activity: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// No running task and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.active.is_none() && self.pending.is_empty()
    }

    fn idle_longer_than(&self, retention: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(retention) {
            Ok(retention) => self.is_idle() && now - self.last_activity >= retention,
            Err(_) => false,
        }
    }
}

/// Concurrent map of thread contexts.
#[derive(Debug, Default)]
pub struct ThreadStore {
    contexts: DashMap<ThreadId, SharedContext>,
}

impl ThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the context for a thread, creating an empty one if absent.
    pub fn get_or_create(&self, thread_id: &ThreadId) -> SharedContext {
        if let Some(existing) = self.contexts.get(thread_id) {
            return Arc::clone(existing.value());
        }

        let entry = self
            .contexts
            .entry(thread_id.clone())
            .or_insert_with(|| {
                debug!(thread = %thread_id, "Creating thread context");
                Arc::new(Mutex::new(ThreadContext::new(thread_id.clone())))
            });
        Arc::clone(entry.value())
    }

    /// Lock a thread's context, creating it if absent.
    ///
    /// The returned guard is for the context currently registered in the
    /// store. A context evicted while we waited for its lock is discarded
    /// and the lookup retried, so two live contexts never exist for one
    /// thread.
    pub async fn lock(
        &self,
        thread_id: &ThreadId,
    ) -> (SharedContext, OwnedMutexGuard<ThreadContext>) {
        loop {
            let context = self.get_or_create(thread_id);
            let guard = Arc::clone(&context).lock_owned().await;
            if self.is_current(thread_id, &context) {
                return (context, guard);
            }
            debug!(thread = %thread_id, "Thread context was evicted while locking, retrying");
        }
    }

    fn is_current(&self, thread_id: &ThreadId, context: &SharedContext) -> bool {
        self.contexts
            .get(thread_id)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), context))
    }

    pub fn get(&self, thread_id: &ThreadId) -> Option<SharedContext> {
        self.contexts
            .get(thread_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Drop an idle thread's context. Returns whether it was removed.
    ///
    /// A context that is locked or still has a running or queued task is
    /// kept, so a thread never ends up with two live contexts.
    pub fn remove(&self, thread_id: &ThreadId) -> bool {
        self.contexts
            .remove_if(thread_id, |_, context| {
                context.try_lock().is_ok_and(|guard| guard.is_idle())
            })
            .is_some()
    }

    /// Remove contexts idle for at least `retention`.
    ///
    /// Contexts whose lock is currently held are in use and are skipped.
    pub fn evict_idle(&self, retention: Duration) -> usize {
        let now = Utc::now();
        let before = self.contexts.len();

        self.contexts.retain(|thread_id, context| match context.try_lock() {
            Ok(guard) => {
                let evict = guard.idle_longer_than(retention, now);
                if evict {
                    debug!(thread = %thread_id, "Evicting idle thread context");
                }
                !evict
            }
            Err(_) => true,
        });

        before.saturating_sub(self.contexts.len())
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
