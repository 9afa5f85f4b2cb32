//! Configuration for the Slack gateway.
//!
//! Credentials come from the environment (`SLACK_BOT_TOKEN`,
//! `SLACK_APP_TOKEN`). Connection tuning lives in [`GatewayOptions`], which
//! is read from the `[gateway]` table of the config file.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{SlackError, SlackResult};

/// Default Web API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://slack.com/api";

/// Slack credentials.
#[derive(Clone)]
pub struct SlackConfig {
    /// Bot OAuth token (xoxb-...).
    bot_token: SecretString,
    /// App-level token for Socket Mode (xapp-...).
    app_token: SecretString,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .finish()
    }
}

impl SlackConfig {
    pub fn new(bot_token: impl Into<String>, app_token: impl Into<String>) -> Self {
        Self {
            bot_token: SecretString::new(bot_token.into().into()),
            app_token: SecretString::new(app_token.into().into()),
        }
    }

    /// Load credentials from the process environment.
    pub fn from_env() -> SlackResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through a variable lookup.
    ///
    /// Both `SLACK_BOT_TOKEN` and `SLACK_APP_TOKEN` are required.
    pub fn from_lookup<F>(lookup: F) -> SlackResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| SlackError::Auth(format!("{} must be set", key)))
        };

        let config = Self::new(required("SLACK_BOT_TOKEN")?, required("SLACK_APP_TOKEN")?);
        config.validate()?;
        Ok(config)
    }

    pub fn bot_token(&self) -> &str {
        self.bot_token.expose_secret()
    }

    pub fn app_token(&self) -> &str {
        self.app_token.expose_secret()
    }

    /// Check token formats.
    pub fn validate(&self) -> SlackResult<()> {
        if !self.bot_token().starts_with("xoxb-") {
            return Err(SlackError::Auth(
                "Bot token must start with 'xoxb-'".to_string(),
            ));
        }
        if !self.app_token().starts_with("xapp-") {
            return Err(SlackError::Auth(
                "App token must start with 'xapp-'".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection tuning for the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOptions {
    /// Web API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Timeout for Web API requests in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// WebSocket keep-alive ping interval in seconds.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,

    /// First reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Upper bound on the reconnect delay in milliseconds.
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Number of recent event ids remembered for de-duplication.
    #[serde(default = "default_dedupe_capacity")]
    pub dedupe_capacity: usize,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_ping_interval_secs() -> u64 {
    30
}

fn default_reconnect_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_dedupe_capacity() -> usize {
    1_024
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            dedupe_capacity: default_dedupe_capacity(),
        }
    }
}

impl GatewayOptions {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn validate(&self) -> SlackResult<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(SlackError::Config(format!(
                "api_base_url must be an http(s) URL, got '{}'",
                self.api_base_url
            )));
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(SlackError::Config(
                "reconnect_max_ms must not be smaller than reconnect_initial_ms".to_string(),
            ));
        }
        if self.dedupe_capacity == 0 {
            return Err(SlackError::Config(
                "dedupe_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
