//! Reply delivery.
//!
//! Replies produced by the orchestrator are posted in the order they were
//! produced. When Slack cannot be reached the reply stays at the head of the
//! buffer and the worker waits for the Socket Mode link to come back before
//! trying again, so every reply is posted once, late rather than never.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use relay_core::{Reply, ReplyReceiver};
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::api::MessagePoster;
use crate::backoff::Backoff;
use crate::error::SlackError;
use crate::gateway::ConnectionState;
use crate::messages::OutgoingMessage;

/// Counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    /// Replies posted.
    pub delivered: usize,
    /// Replies dropped after a non-retryable API error.
    pub dropped: usize,
    /// Replies still buffered at shutdown.
    pub undelivered: usize,
}

/// Outcome of one delivery attempt.
enum Attempt {
    Delivered,
    Dropped,
    Retry(Duration),
}

/// Posts replies into their threads.
pub struct Outbox {
    poster: Arc<dyn MessagePoster>,
    connection: watch::Receiver<ConnectionState>,
    buffer: VecDeque<Reply>,
    retry: Backoff,
    stats: DeliveryStats,
}

impl Outbox {
    pub fn new(
        poster: Arc<dyn MessagePoster>,
        connection: watch::Receiver<ConnectionState>,
        retry_initial: Duration,
        retry_max: Duration,
    ) -> Self {
        Self {
            poster,
            connection,
            buffer: VecDeque::new(),
            retry: Backoff::new(retry_initial, retry_max),
            stats: DeliveryStats::default(),
        }
    }

    /// Deliver replies until the reply channel closes or shutdown is
    /// signalled.
    pub async fn run(
        mut self,
        mut replies: ReplyReceiver,
        mut shutdown: broadcast::Receiver<()>,
    ) -> DeliveryStats {
        loop {
            if self.buffer.is_empty() {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    reply = replies.recv() => match reply {
                        Some(reply) => self.buffer.push_back(reply),
                        None => break,
                    },
                }
            }
            while let Ok(reply) = replies.try_recv() {
                self.buffer.push_back(reply);
            }

            tokio::select! {
                _ = shutdown.recv() => break,
                connected = self.wait_connected() => {
                    if !connected {
                        warn!("Connection state unavailable, stopping delivery");
                        break;
                    }
                }
            }

            let Some(reply) = self.buffer.front().cloned() else {
                continue;
            };
            match self.attempt(&reply).await {
                Attempt::Delivered => {
                    self.buffer.pop_front();
                    self.stats.delivered += 1;
                    self.retry.reset();
                }
                Attempt::Dropped => {
                    self.buffer.pop_front();
                    self.stats.dropped += 1;
                }
                Attempt::Retry(delay) => {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.stats.undelivered = self.buffer.len();
        if self.stats.undelivered > 0 {
            warn!(
                undelivered = self.stats.undelivered,
                "Reply delivery stopped with replies still buffered"
            );
        }
        info!(
            delivered = self.stats.delivered,
            dropped = self.stats.dropped,
            "Reply delivery stopped"
        );
        self.stats
    }

    /// Returns `false` if the gateway is gone.
    async fn wait_connected(&mut self) -> bool {
        self.connection
            .wait_for(|state| *state == ConnectionState::Connected)
            .await
            .is_ok()
    }

    async fn attempt(&mut self, reply: &Reply) -> Attempt {
        let message = OutgoingMessage::from(reply);
        match self.poster.post_message(&message).await {
            Ok(ts) => {
                debug!(thread = %reply.thread_id, ts = %ts, kind = ?reply.kind, "Reply posted");
                Attempt::Delivered
            }
            Err(SlackError::RateLimited { retry_after_secs }) => {
                warn!(
                    thread = %reply.thread_id,
                    "Rate limited, retrying in {}s", retry_after_secs
                );
                Attempt::Retry(Duration::from_secs(retry_after_secs))
            }
            Err(e) if e.is_transport() => {
                let delay = self.retry.next_delay();
                warn!(
                    thread = %reply.thread_id,
                    attempt = self.retry.attempts(),
                    "Failed to post reply: {}; retrying in {:?}", e, delay
                );
                Attempt::Retry(delay)
            }
            Err(e) => {
                error!(thread = %reply.thread_id, kind = ?reply.kind, "Dropping reply: {}", e);
                Attempt::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::{ReplyKind, ThreadId, reply_channel};
    use std::sync::Mutex;

    use crate::error::SlackResult;

    /// Poster that fails according to a script, then succeeds.
    struct ScriptedPoster {
        script: Mutex<VecDeque<SlackError>>,
        posted: Mutex<Vec<OutgoingMessage>>,
    }

    impl ScriptedPoster {
        fn new(script: Vec<SlackError>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                posted: Mutex::new(Vec::new()),
            })
        }

        fn posted(&self) -> Vec<String> {
            self.posted
                .lock()
                .unwrap()
                .iter()
                .map(|m| m.text.clone())
                .collect()
        }
    }

    #[async_trait]
    impl MessagePoster for ScriptedPoster {
        async fn post_message(&self, message: &OutgoingMessage) -> SlackResult<String> {
            if let Some(err) = self.script.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut posted = self.posted.lock().unwrap();
            posted.push(message.clone());
            Ok(format!("{}.0", posted.len()))
        }
    }

    fn reply(text: &str) -> Reply {
        Reply::new(ThreadId::new("C1", "1.0"), ReplyKind::Completed, text)
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_keeps_order_and_delivers_once() {
        let poster = ScriptedPoster::new(vec![
            SlackError::Network("connection reset".into()),
            SlackError::Unavailable("503".into()),
        ]);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (reply_tx, reply_rx) = reply_channel();

        let outbox = Outbox::new(
            poster.clone(),
            state_rx,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let worker = tokio::spawn(outbox.run(reply_rx, shutdown_rx));

        reply_tx.send(reply("first")).unwrap();
        reply_tx.send(reply("second")).unwrap();
        drop(reply_tx);

        let stats = worker.await.unwrap();
        assert_eq!(poster.posted(), vec!["first", "second"]);
        assert_eq!(
            stats,
            DeliveryStats {
                delivered: 2,
                dropped: 0,
                undelivered: 0
            }
        );
        drop(state_tx);
        drop(shutdown_tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_reconnect_before_posting() {
        let poster = ScriptedPoster::new(Vec::new());
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (reply_tx, reply_rx) = reply_channel();

        let outbox = Outbox::new(
            poster.clone(),
            state_rx,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let worker = tokio::spawn(outbox.run(reply_rx, shutdown_rx));

        reply_tx.send(reply("<@U1> Task completed:\n\nParis")).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(poster.posted().is_empty());

        state_tx.send_replace(ConnectionState::Connected);
        drop(reply_tx);

        let stats = worker.await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(poster.posted(), vec!["<@U1> Task completed:\n\nParis"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_transport_errors_are_dropped() {
        let poster = ScriptedPoster::new(vec![SlackError::Channel(
            "chat.postMessage failed: channel_not_found".into(),
        )]);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (reply_tx, reply_rx) = reply_channel();

        let outbox = Outbox::new(
            poster.clone(),
            state_rx,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let worker = tokio::spawn(outbox.run(reply_rx, shutdown_rx));

        reply_tx.send(reply("lost")).unwrap();
        reply_tx.send(reply("kept")).unwrap();
        drop(reply_tx);

        let stats = worker.await.unwrap();
        assert_eq!(poster.posted(), vec!["kept"]);
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_retry_after() {
        let poster = ScriptedPoster::new(vec![SlackError::RateLimited {
            retry_after_secs: 20,
        }]);
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Connected);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (reply_tx, reply_rx) = reply_channel();

        let outbox = Outbox::new(
            poster.clone(),
            state_rx,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let started = tokio::time::Instant::now();
        let worker = tokio::spawn(outbox.run(reply_rx, shutdown_rx));

        reply_tx.send(reply("later")).unwrap();
        drop(reply_tx);

        worker.await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(20));
        assert_eq!(poster.posted(), vec!["later"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reports_undelivered() {
        let poster = ScriptedPoster::new(Vec::new());
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (reply_tx, reply_rx) = reply_channel();

        let outbox = Outbox::new(
            poster.clone(),
            state_rx,
            Duration::from_millis(100),
            Duration::from_secs(1),
        );
        let worker = tokio::spawn(outbox.run(reply_rx, shutdown_rx));

        reply_tx.send(reply("stuck")).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        shutdown_tx.send(()).unwrap();

        let stats = worker.await.unwrap();
        assert_eq!(stats.undelivered, 1);
        assert!(poster.posted().is_empty());
    }
}
