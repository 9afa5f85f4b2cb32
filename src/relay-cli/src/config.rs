//! Layered configuration for the `browser-relay` binary.
//!
//! A TOML file with `[bot]`, `[agent]` and `[gateway]` tables is read first,
//! then environment variables are applied on top. Slack tokens and the
//! agent key are only ever taken from the environment.

use std::path::Path;

use relay_core::{AgentConfig, BotConfig, ConfigError};
use relay_slack::GatewayOptions;
use serde::Deserialize;

/// Everything the relay needs except secrets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bot: BotConfig,
    pub agent: AgentConfig,
    pub gateway: GatewayOptions,
}

impl RelayConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load the optional file, then apply environment overrides.
    pub fn resolve<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.bot.apply_env(&lookup)?;
        config.agent.apply_env(&lookup);
        Ok(config)
    }

    /// Reject configurations the relay cannot start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.bot.validate()?;
        self.agent.validate()?;
        self.gateway.validate()?;
        Ok(())
    }
}
