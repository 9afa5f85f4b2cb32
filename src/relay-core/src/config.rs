//! Orchestration and agent configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//! - `BU_COMMAND_PREFIX`, `BU_MAX_STEPS`, `BU_TASK_TIMEOUT_SECS`
//! - `BU_HEADLESS`, `BU_SEND_ACK`, `BU_THREAD_RETENTION_SECS`
//! - `BU_SYSTEM_PROMPT`, `BU_SYSTEM_PROMPT_EXTEND`, `BU_SYSTEM_PROMPT_OVERRIDE`
//! - `BU_AGENT_COMMAND`, `OPENAI_API_KEY`

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::command::DEFAULT_PREFIX;
use crate::error::ConfigError;
use crate::prompt::SystemPromptConfig;

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_max_steps() -> u32 {
    100
}

fn default_task_timeout_secs() -> u64 {
    900 // 15 minutes
}

fn default_thread_retention_secs() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

fn default_agent_command() -> String {
    "browser-use-runner".to_string()
}

/// How tasks are accepted and executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    /// Prefix that marks a message as a command.
    #[serde(default = "default_prefix")]
    pub command_prefix: String,

    /// Step budget handed to the agent.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Wall-clock budget per task in seconds.
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,

    /// Run the browser without a window.
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Post an acknowledgment before a task starts.
    #[serde(default = "default_true")]
    pub send_ack: bool,

    /// How long an idle thread's state is kept, in seconds.
    #[serde(default = "default_thread_retention_secs")]
    pub thread_retention_secs: u64,

    /// System prompt sources.
    #[serde(default)]
    pub prompt: SystemPromptConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: default_prefix(),
            max_steps: default_max_steps(),
            task_timeout_secs: default_task_timeout_secs(),
            headless: true,
            send_ack: true,
            thread_retention_secs: default_thread_retention_secs(),
            prompt: SystemPromptConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn thread_retention(&self) -> Duration {
        Duration::from_secs(self.thread_retention_secs)
    }

    /// Override fields from environment variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(prefix) = lookup("BU_COMMAND_PREFIX") {
            self.command_prefix = prefix;
        }
        if let Some(value) = lookup("BU_MAX_STEPS") {
            self.max_steps = parse_number("BU_MAX_STEPS", &value)?;
        }
        if let Some(value) = lookup("BU_TASK_TIMEOUT_SECS") {
            self.task_timeout_secs = parse_number("BU_TASK_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("BU_THREAD_RETENTION_SECS") {
            self.thread_retention_secs = parse_number("BU_THREAD_RETENTION_SECS", &value)?;
        }
        if let Some(value) = lookup("BU_HEADLESS") {
            self.headless = parse_bool("BU_HEADLESS", &value)?;
        }
        if let Some(value) = lookup("BU_SEND_ACK") {
            self.send_ack = parse_bool("BU_SEND_ACK", &value)?;
        }
        if let Some(default) = lookup("BU_SYSTEM_PROMPT") {
            self.prompt.default = default;
        }
        if let Some(extend) = lookup("BU_SYSTEM_PROMPT_EXTEND") {
            self.prompt.extend = Some(extend);
        }
        if let Some(override_prompt) = lookup("BU_SYSTEM_PROMPT_OVERRIDE") {
            self.prompt.override_prompt = Some(override_prompt);
        }
        Ok(())
    }

    /// Check values that would make the bot unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_prefix.trim().is_empty() {
            return Err(ConfigError::invalid(
                "command_prefix",
                "must not be empty",
            ));
        }
        if self.command_prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::invalid(
                "command_prefix",
                "must not contain whitespace",
            ));
        }
        if self.max_steps == 0 {
            return Err(ConfigError::invalid("max_steps", "must be at least 1"));
        }
        if self.task_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "task_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.prompt.has_conflict() {
            warn!("Both a system prompt extension and an override are set; the override wins");
        }
        Ok(())
    }
}

/// How the external agent is launched.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Command line of the agent program.
    #[serde(default = "default_agent_command")]
    pub command: String,

    /// Key for the agent's language model.
    #[serde(skip)]
    pub api_key: Option<SecretString>,
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("command", &self.command)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            api_key: None,
        }
    }
}

impl AgentConfig {
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(command) = lookup("BU_AGENT_COMMAND") {
            self.command = command;
        }
        if let Some(api_key) = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()) {
            self.api_key = Some(SecretString::new(api_key.into()));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY not set".to_string()));
        }
        if self.command.trim().is_empty() {
            return Err(ConfigError::invalid("agent.command", "must not be empty"));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("expected a number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(
            key,
            format!("expected a boolean, got '{value}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BotConfig::default();
        assert_eq!(config.command_prefix, "$bu");
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.task_timeout(), Duration::from_secs(900));
        assert!(config.headless);
        assert!(config.send_ack);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = BotConfig::default();
        config
            .apply_env(env(&[
                ("BU_COMMAND_PREFIX", "!web"),
                ("BU_MAX_STEPS", "25"),
                ("BU_TASK_TIMEOUT_SECS", "60"),
                ("BU_HEADLESS", "false"),
                ("BU_SEND_ACK", "no"),
                ("BU_SYSTEM_PROMPT_EXTEND", "Prefer English sites."),
            ]))
            .unwrap();

        assert_eq!(config.command_prefix, "!web");
        assert_eq!(config.max_steps, 25);
        assert_eq!(config.task_timeout_secs, 60);
        assert!(!config.headless);
        assert!(!config.send_ack);
        assert_eq!(config.prompt.extend.as_deref(), Some("Prefer English sites."));
    }

    #[test]
    fn test_apply_env_rejects_garbage() {
        let mut config = BotConfig::default();
        let err = config
            .apply_env(env(&[("BU_MAX_STEPS", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("BU_MAX_STEPS"));

        let err = config
            .apply_env(env(&[("BU_HEADLESS", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("BU_HEADLESS"));
    }

    #[test]
    fn test_validate() {
        let config = BotConfig {
            command_prefix: "$ bu".to_string(),
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());

        let config = BotConfig {
            max_steps: 0,
            ..BotConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_with_defaults() {
        let config: BotConfig = toml::from_str(
            r#"
            command_prefix = "!bot"
            task_timeout_secs = 120

            [prompt]
            extend = "Never submit payment forms."
            "#,
        )
        .unwrap();
        assert_eq!(config.command_prefix, "!bot");
        assert_eq!(config.max_steps, 100);
        assert_eq!(config.task_timeout_secs, 120);
        assert!(config.headless);
        assert_eq!(
            config.prompt.extend.as_deref(),
            Some("Never submit payment forms.")
        );
    }

    #[test]
    fn test_agent_config_requires_api_key() {
        let mut agent = AgentConfig::default();
        assert!(matches!(agent.validate(), Err(ConfigError::Missing(_))));

        agent.apply_env(env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("BU_AGENT_COMMAND", "python runner.py"),
        ]));
        assert!(agent.validate().is_ok());
        assert_eq!(agent.command, "python runner.py");
        assert!(!format!("{agent:?}").contains("sk-test"));
    }
}
