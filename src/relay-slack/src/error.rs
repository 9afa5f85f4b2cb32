//! Error types for the Slack gateway.
//!
//! Errors are split by what the caller should do about them: fatal errors
//! (bad credentials, bad configuration) stop the process, transport errors
//! are retried once the connection is back, and everything else is reported
//! and dropped.

use thiserror::Error;

/// Errors that can occur during Slack operations.
#[derive(Error, Debug)]
pub enum SlackError {
    /// Configuration error (missing or invalid config).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication error (invalid token, revoked, etc.).
    #[error("Authentication error: {0}")]
    Auth(String),

    /// API request failed.
    #[error("Slack API error: {0}")]
    Api(String),

    /// API rate limited.
    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// Slack reported a temporary server-side problem.
    #[error("Slack unavailable: {0}")]
    Unavailable(String),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// WebSocket connection error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Channel not found or bot not in channel.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Invalid payload received from Slack.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl SlackError {
    /// Whether the failure is about reaching Slack rather than the request
    /// itself. Such requests can be retried once the connection is back.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SlackError::Network(_)
                | SlackError::WebSocket(_)
                | SlackError::Timeout(_)
                | SlackError::Unavailable(_)
        )
    }

    /// Whether the process cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SlackError::Auth(_) | SlackError::Config(_))
    }
}

impl From<reqwest::Error> for SlackError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SlackError::Timeout(err.to_string())
        } else if err.is_connect() {
            SlackError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            SlackError::Json(err.to_string())
        } else {
            SlackError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SlackError {
    fn from(err: serde_json::Error) -> Self {
        SlackError::Json(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SlackError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SlackError::WebSocket(err.to_string())
    }
}

/// Result type for Slack operations.
pub type SlackResult<T> = std::result::Result<T, SlackError>;

/// An `ok: false` response from the Web API.
#[derive(Debug, Clone)]
pub struct SlackApiError {
    /// Error code from Slack (e.g., "channel_not_found").
    pub code: String,
    /// Web API method that failed.
    pub method: String,
    /// Whether this error is retryable.
    pub retryable: bool,
}

impl SlackApiError {
    pub fn new(method: impl Into<String>, code: impl Into<String>) -> Self {
        let code = code.into();
        let retryable = Self::is_retryable_code(&code);
        Self {
            code,
            method: method.into(),
            retryable,
        }
    }

    fn is_retryable_code(code: &str) -> bool {
        matches!(
            code,
            "rate_limited"
                | "service_unavailable"
                | "internal_error"
                | "request_timeout"
                | "fatal_error"
        )
    }
}

impl From<SlackApiError> for SlackError {
    fn from(err: SlackApiError) -> Self {
        let detail = format!("{} failed: {}", err.method, err.code);
        match err.code.as_str() {
            "rate_limited" | "ratelimited" => SlackError::RateLimited {
                retry_after_secs: 30,
            },
            "invalid_auth" | "not_authed" | "account_inactive" | "token_revoked"
            | "token_expired" => SlackError::Auth(detail),
            "channel_not_found" | "not_in_channel" | "is_archived" => SlackError::Channel(detail),
            _ if err.retryable => SlackError::Unavailable(detail),
            _ => SlackError::Api(detail),
        }
    }
}
