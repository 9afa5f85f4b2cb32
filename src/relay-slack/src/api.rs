//! Slack Web API client.
//!
//! Covers the three methods the relay needs: `auth.test` to verify the bot
//! token, `apps.connections.open` to obtain a Socket Mode URL, and
//! `chat.postMessage` to reply in threads.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{GatewayOptions, SlackConfig};
use crate::error::{SlackApiError, SlackError, SlackResult};
use crate::messages::OutgoingMessage;

/// Retry-After fallback when Slack does not send the header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Identity returned by `auth.test`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthIdentity {
    pub user_id: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

/// Something that can post a message into Slack.
#[async_trait]
pub trait MessagePoster: Send + Sync {
    /// Post a message; returns the new message's timestamp.
    async fn post_message(&self, message: &OutgoingMessage) -> SlackResult<String>;
}

/// Which token a call authenticates with.
#[derive(Debug, Clone, Copy)]
enum Token {
    Bot,
    App,
}

/// Web API client.
#[derive(Debug, Clone)]
pub struct SlackApi {
    config: SlackConfig,
    client: reqwest::Client,
    base_url: String,
}

impl SlackApi {
    pub fn new(config: SlackConfig, options: &GatewayOptions) -> SlackResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout())
            .build()
            .map_err(|e| SlackError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            base_url: options.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Verify the bot token.
    pub async fn auth_test(&self) -> SlackResult<AuthIdentity> {
        debug!("Testing Slack authentication...");
        let response = self.call("auth.test", Token::Bot, None).await?;
        let identity: AuthIdentity = serde_json::from_value(response)?;
        info!(
            user_id = %identity.user_id,
            team = identity.team.as_deref().unwrap_or("unknown"),
            "Authenticated as bot user"
        );
        Ok(identity)
    }

    /// Obtain a fresh Socket Mode WebSocket URL.
    pub async fn open_socket_url(&self) -> SlackResult<String> {
        let response = self
            .call("apps.connections.open", Token::App, None)
            .await?;
        response
            .get("url")
            .and_then(|u| u.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SlackError::InvalidPayload("Missing url in response".to_string()))
    }

    /// Make an API call and check the `ok` flag.
    async fn call(&self, method: &str, token: Token, body: Option<&Value>) -> SlackResult<Value> {
        let url = format!("{}/{}", self.base_url, method);
        let token = match token {
            Token::Bot => self.config.bot_token(),
            Token::App => self.config.app_token(),
        };

        let mut request = self.client.post(&url).bearer_auth(token);
        request = match body {
            Some(body) => request.json(body),
            None => request.header("Content-Type", "application/x-www-form-urlencoded"),
        };
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(SlackError::RateLimited {
                retry_after_secs: retry_after,
            });
        }
        if status.is_server_error() {
            return Err(SlackError::Unavailable(format!("{} returned {}", method, status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SlackError::Api(format!("{} returned {}: {}", method, status, body)));
        }

        let json: Value = response.json().await?;
        if json.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let code = json
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown");
            return Err(SlackApiError::new(method, code).into());
        }
        Ok(json)
    }
}

#[async_trait]
impl MessagePoster for SlackApi {
    async fn post_message(&self, message: &OutgoingMessage) -> SlackResult<String> {
        let body = serde_json::to_value(message)?;
        let response = self.call("chat.postMessage", Token::Bot, Some(&body)).await?;
        response
            .get("ts")
            .and_then(|ts| ts.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| SlackError::InvalidPayload("Missing ts in response".to_string()))
    }
}
