//! Socket Mode frames and event translation.
//!
//! Only plain `message` events are turned into [`InboundMessage`]s. Bot
//! messages, edits, deletions and events without a user or channel are
//! dropped here, before they reach the dispatcher.

use std::collections::{HashSet, VecDeque};

use relay_core::{InboundMessage, ThreadId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SlackError, SlackResult};

/// Socket Mode envelope wrapping events.
///
/// `hello` and `disconnect` frames carry no envelope id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeEnvelope {
    /// Envelope ID for acknowledgment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_id: Option<String>,
    /// Type of payload.
    #[serde(rename = "type")]
    pub envelope_type: String,
    /// Actual payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    /// Reason given with a `disconnect` frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Event callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    /// The actual event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<u64>,
}

/// Event payload for messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageEvent {
    /// User who sent the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Timestamp of the message.
    #[serde(default)]
    pub ts: String,
    /// Parent timestamp when the message is a thread reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    /// Subtype of message (e.g., "bot_message").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Bot ID (if message is from a bot).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
}

impl MessageEvent {
    /// Check if this is a bot message (should be ignored).
    pub fn is_bot_message(&self) -> bool {
        self.bot_id.is_some() || self.subtype.as_deref() == Some("bot_message")
    }

    /// Check if this is an edit or deletion of an earlier message.
    pub fn is_edit_or_delete(&self) -> bool {
        matches!(
            self.subtype.as_deref(),
            Some("message_changed") | Some("message_deleted")
        )
    }

    /// Thread the message belongs to. A top-level message starts its own.
    pub fn thread_id(&self) -> Option<ThreadId> {
        let channel = self.channel.as_deref().filter(|c| !c.is_empty())?;
        let ts = self
            .thread_ts
            .as_deref()
            .filter(|ts| !ts.is_empty())
            .unwrap_or(&self.ts);
        if ts.is_empty() {
            return None;
        }
        Some(ThreadId::new(channel, ts))
    }

    /// Convert to an inbound message, or `None` if it must be ignored.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        if self.is_bot_message() || self.is_edit_or_delete() {
            return None;
        }
        let thread_id = self.thread_id()?;
        let requester_id = self.user.filter(|u| !u.is_empty())?;
        Some(InboundMessage {
            thread_id,
            requester_id,
            text: self.text,
        })
    }
}

/// Socket Mode acknowledgment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketModeAck {
    /// Envelope ID being acknowledged.
    pub envelope_id: String,
}

impl SocketModeAck {
    pub fn new(envelope_id: impl Into<String>) -> Self {
        Self {
            envelope_id: envelope_id.into(),
        }
    }
}

/// Extract the message event from an `events_api` payload.
///
/// Returns `Ok(None)` for other event types.
pub fn parse_message_event(payload: &EventPayload) -> SlackResult<Option<MessageEvent>> {
    let event_json = payload
        .event
        .as_ref()
        .ok_or_else(|| SlackError::InvalidPayload("Missing event field".to_string()))?;

    let event_type = event_json
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown");

    if event_type != "message" {
        debug!("Ignoring event type: {}", event_type);
        return Ok(None);
    }

    let event: MessageEvent = serde_json::from_value(event_json.clone())?;
    Ok(Some(event))
}

/// Remembers recently seen event ids.
///
/// Slack redelivers events that were not acknowledged in time, most often
/// around reconnects. The oldest ids are forgotten once `capacity` is hit.
#[derive(Debug)]
pub struct EventDeduper {
    seen: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl EventDeduper {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record `event_id`; returns `false` if it was already seen.
    pub fn first_sighting(&mut self, event_id: &str) -> bool {
        if self.seen.contains(event_id) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.seen.insert(event_id.to_string());
        self.order.push_back(event_id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user_message() -> MessageEvent {
        MessageEvent {
            user: Some("U12345".to_string()),
            text: "$bu find the capital of France".to_string(),
            channel: Some("C12345".to_string()),
            ts: "1700000000.000100".to_string(),
            ..MessageEvent::default()
        }
    }

    #[test]
    fn test_top_level_message_starts_own_thread() {
        let inbound = user_message().into_inbound().unwrap();
        assert_eq!(
            inbound.thread_id,
            ThreadId::new("C12345", "1700000000.000100")
        );
        assert_eq!(inbound.requester_id, "U12345");
        assert_eq!(inbound.text, "$bu find the capital of France");
    }

    #[test]
    fn test_thread_reply_uses_parent_ts() {
        let event = MessageEvent {
            thread_ts: Some("1699999999.000001".to_string()),
            ..user_message()
        };
        assert_eq!(
            event.into_inbound().unwrap().thread_id,
            ThreadId::new("C12345", "1699999999.000001")
        );
    }

    #[test]
    fn test_bot_and_edited_messages_ignored() {
        let bot = MessageEvent {
            bot_id: Some("B1".to_string()),
            ..user_message()
        };
        assert!(bot.is_bot_message());
        assert!(bot.into_inbound().is_none());

        let bot_subtype = MessageEvent {
            subtype: Some("bot_message".to_string()),
            ..user_message()
        };
        assert!(bot_subtype.into_inbound().is_none());

        let edited = MessageEvent {
            subtype: Some("message_changed".to_string()),
            ..user_message()
        };
        assert!(edited.into_inbound().is_none());
    }

    #[test]
    fn test_missing_user_or_channel_ignored() {
        let no_user = MessageEvent {
            user: None,
            ..user_message()
        };
        assert!(no_user.into_inbound().is_none());

        let no_channel = MessageEvent {
            channel: None,
            ..user_message()
        };
        assert!(no_channel.into_inbound().is_none());
    }

    #[test]
    fn test_parse_message_event() {
        let payload = EventPayload {
            team_id: Some("T1".to_string()),
            event: Some(serde_json::json!({
                "type": "message",
                "user": "U1",
                "text": "hi",
                "channel": "C1",
                "ts": "1.0"
            })),
            event_id: Some("Ev1".to_string()),
            event_time: None,
        };
        let event = parse_message_event(&payload).unwrap().unwrap();
        assert_eq!(event.user.as_deref(), Some("U1"));

        let reaction = EventPayload {
            event: Some(serde_json::json!({ "type": "reaction_added" })),
            ..payload.clone()
        };
        assert!(parse_message_event(&reaction).unwrap().is_none());

        let empty = EventPayload {
            event: None,
            ..payload
        };
        assert!(matches!(
            parse_message_event(&empty),
            Err(SlackError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_envelope_without_id() {
        let hello: SocketModeEnvelope =
            serde_json::from_str(r#"{"type":"hello","num_connections":1}"#).unwrap();
        assert_eq!(hello.envelope_type, "hello");
        assert!(hello.envelope_id.is_none());
    }

    #[test]
    fn test_socket_mode_ack() {
        let ack = serde_json::to_string(&SocketModeAck::new("env-123")).unwrap();
        assert_eq!(ack, r#"{"envelope_id":"env-123"}"#);
    }

    #[test]
    fn test_deduper_is_bounded() {
        let mut deduper = EventDeduper::new(2);
        assert!(deduper.first_sighting("a"));
        assert!(!deduper.first_sighting("a"));
        assert!(deduper.first_sighting("b"));
        assert!(deduper.first_sighting("c"));
        assert_eq!(deduper.len(), 2);
        // "a" was evicted to make room for "c".
        assert!(deduper.first_sighting("a"));
        assert!(!deduper.first_sighting("c"));
    }
}
