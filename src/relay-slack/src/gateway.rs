//! Socket Mode gateway.
//!
//! The gateway keeps one Socket Mode connection alive for the life of the
//! process:
//! - verifies the bot token once at startup
//! - acknowledges every envelope before looking at it
//! - forwards user messages to the inbound channel
//! - reconnects with exponential backoff after any transport failure or a
//!   server-requested disconnect
//!
//! Connection health is published on a [`watch`] channel so that reply
//! delivery can wait for the link to come back.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use relay_core::InboundMessage;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{Instant, interval_at};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::api::{AuthIdentity, SlackApi};
use crate::backoff::Backoff;
use crate::config::GatewayOptions;
use crate::error::{SlackError, SlackResult};
use crate::events::{EventDeduper, SocketModeAck, SocketModeEnvelope, parse_message_event};

/// State of the Socket Mode link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Opening a connection, or waiting to.
    Connecting,
    /// Slack said hello on the current connection.
    Connected,
    /// The last connection was lost.
    Disconnected,
}

/// What to do after a frame was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameAction {
    /// The connection is ready.
    Hello,
    /// Slack asked us to reconnect.
    Disconnect { reason: String },
    /// A user message to dispatch.
    Message(InboundMessage),
    /// Nothing to do.
    Ignore,
}

/// Result of handling one text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Acknowledgment to send back, if the frame carried an envelope id.
    pub ack: Option<String>,
    pub action: FrameAction,
}

impl FrameOutcome {
    fn ignore(ack: Option<String>) -> Self {
        Self {
            ack,
            action: FrameAction::Ignore,
        }
    }
}

/// Parse a Socket Mode text frame and decide what to do with it.
pub fn handle_frame(text: &str, deduper: &mut EventDeduper) -> FrameOutcome {
    let envelope: SocketModeEnvelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            warn!("Failed to parse Socket Mode envelope: {}", e);
            return FrameOutcome::ignore(None);
        }
    };

    let ack = envelope.envelope_id.as_deref().and_then(|id| {
        serde_json::to_string(&SocketModeAck::new(id))
            .map_err(|e| error!("Failed to encode acknowledgment: {}", e))
            .ok()
    });

    let action = match envelope.envelope_type.as_str() {
        "hello" => FrameAction::Hello,
        "disconnect" => FrameAction::Disconnect {
            reason: envelope.reason.unwrap_or_else(|| "unspecified".to_string()),
        },
        "events_api" => match envelope.payload {
            Some(payload) => {
                if let Some(event_id) = payload.event_id.as_deref()
                    && !deduper.first_sighting(event_id)
                {
                    debug!(event_id, "Event already processed");
                    return FrameOutcome::ignore(ack);
                }
                match parse_message_event(&payload) {
                    Ok(Some(event)) => match event.into_inbound() {
                        Some(message) => FrameAction::Message(message),
                        None => FrameAction::Ignore,
                    },
                    Ok(None) => FrameAction::Ignore,
                    Err(e) => {
                        warn!("Failed to parse event: {}", e);
                        FrameAction::Ignore
                    }
                }
            }
            None => FrameAction::Ignore,
        },
        other => {
            debug!("Unhandled envelope type: {}", other);
            FrameAction::Ignore
        }
    };

    FrameOutcome { ack, action }
}

/// How a connection ended.
#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    Reconnect(String),
}

/// Socket Mode connection manager.
pub struct SocketModeGateway {
    api: Arc<SlackApi>,
    options: GatewayOptions,
    state: watch::Sender<ConnectionState>,
}

impl SocketModeGateway {
    pub fn new(api: Arc<SlackApi>, options: GatewayOptions) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            api,
            options,
            state,
        }
    }

    /// Watch the connection state.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Run until shutdown or a fatal error.
    ///
    /// Only authentication and configuration failures end the loop with an
    /// error; everything else is retried.
    pub async fn run(
        &self,
        inbound: mpsc::Sender<InboundMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SlackResult<()> {
        let mut backoff = Backoff::new(self.options.reconnect_initial(), self.options.reconnect_max());

        let Some(identity) = self.authenticate(&mut backoff, &mut shutdown).await? else {
            return Ok(());
        };
        debug!(user_id = %identity.user_id, "Starting Socket Mode loop");

        let mut deduper = EventDeduper::new(self.options.dedupe_capacity);

        loop {
            self.set_state(ConnectionState::Connecting);

            let result = match self.api.open_socket_url().await {
                Ok(url) => {
                    info!("Connecting to Socket Mode...");
                    self.connect_and_run(&url, &inbound, &mut deduper, &mut backoff, &mut shutdown)
                        .await
                }
                Err(e) => Err(e),
            };

            self.set_state(ConnectionState::Disconnected);

            match result {
                Ok(SessionEnd::Shutdown) => {
                    info!("Socket Mode gateway stopped");
                    return Ok(());
                }
                Ok(SessionEnd::Reconnect(reason)) => {
                    info!("Socket Mode connection closed: {}", reason);
                }
                Err(e) if e.is_fatal() => {
                    error!("Socket Mode gateway cannot continue: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Socket Mode connection error: {}", e);
                }
            }

            let delay = backoff.next_delay();
            info!(attempt = backoff.attempts(), "Reconnecting in {:?}...", delay);
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Call `auth.test`, retrying transient failures.
    ///
    /// Returns `Ok(None)` if shutdown was requested first.
    async fn authenticate(
        &self,
        backoff: &mut Backoff,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SlackResult<Option<AuthIdentity>> {
        loop {
            match self.api.auth_test().await {
                Ok(identity) => {
                    backoff.reset();
                    return Ok(Some(identity));
                }
                Err(e) if e.is_transport() || matches!(e, SlackError::RateLimited { .. }) => {
                    let delay = match &e {
                        SlackError::RateLimited { retry_after_secs } => {
                            Duration::from_secs(*retry_after_secs)
                        }
                        _ => backoff.next_delay(),
                    };
                    warn!("auth.test failed: {}; retrying in {:?}", e, delay);
                    tokio::select! {
                        _ = shutdown.recv() => return Ok(None),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run one WebSocket connection until it ends.
    async fn connect_and_run(
        &self,
        ws_url: &str,
        inbound: &mpsc::Sender<InboundMessage>,
        deduper: &mut EventDeduper,
        backoff: &mut Backoff,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SlackResult<SessionEnd> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (mut write, mut read) = ws_stream.split();

        let period = self.options.ping_interval();
        let mut ping = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("Received shutdown signal");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
                _ = ping.tick() => {
                    write.send(WsMessage::Ping(Vec::new())).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            let outcome = handle_frame(&text, deduper);
                            // Ack before acting so Slack does not redeliver.
                            if let Some(ack) = outcome.ack {
                                write.send(WsMessage::Text(ack)).await?;
                            }
                            match outcome.action {
                                FrameAction::Hello => {
                                    info!("Socket Mode connection established");
                                    backoff.reset();
                                    self.set_state(ConnectionState::Connected);
                                }
                                FrameAction::Disconnect { reason } => {
                                    info!("Received disconnect request from Slack");
                                    return Ok(SessionEnd::Reconnect(format!("disconnect requested ({})", reason)));
                                }
                                FrameAction::Message(message) => {
                                    if inbound.send(message).await.is_err() {
                                        warn!("Inbound channel closed, stopping gateway");
                                        return Ok(SessionEnd::Shutdown);
                                    }
                                }
                                FrameAction::Ignore => {}
                            }
                        }
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Some(Ok(WsMessage::Close(_))) => {
                            return Ok(SessionEnd::Reconnect("closed by server".to_string()));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(SlackError::WebSocket(e.to_string()));
                        }
                        None => {
                            return Ok(SessionEnd::Reconnect("stream ended".to_string()));
                        }
                    }
                }
            }
        }
    }
}
