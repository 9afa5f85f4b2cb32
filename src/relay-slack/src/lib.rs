//! Slack gateway for browser-relay.
//!
//! Connects to Slack through Socket Mode (WebSocket), so no public HTTP
//! endpoint is needed:
//! - [`gateway`] keeps the connection alive and turns messages into
//!   [`relay_core::InboundMessage`]s
//! - [`outbox`] posts orchestrator replies back into their threads
//! - [`api`] is the Web API client both of them use
//!
//! # Setup
//!
//! 1. Create a Slack app with Socket Mode enabled
//! 2. Subscribe to the `message.channels` bot event
//! 3. Grant the `chat:write` and `channels:history` scopes
//! 4. Set `SLACK_BOT_TOKEN` (xoxb-) and `SLACK_APP_TOKEN` (xapp-)

pub mod api;
pub mod backoff;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod messages;
pub mod outbox;

pub use api::{AuthIdentity, MessagePoster, SlackApi};
pub use backoff::Backoff;
pub use config::{GatewayOptions, SlackConfig};
pub use error::{SlackError, SlackResult};
pub use events::{EventDeduper, MessageEvent, SocketModeAck, SocketModeEnvelope};
pub use gateway::{ConnectionState, FrameAction, FrameOutcome, SocketModeGateway, handle_frame};
pub use messages::{OutgoingMessage, markdown_to_mrkdwn};
pub use outbox::{DeliveryStats, Outbox};
