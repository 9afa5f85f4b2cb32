//! System prompt composition.
//!
//! The effective instruction set handed to the agent is built from a baseline
//! default plus either an appended extension or a full override. An override
//! always wins; blank values count as unset so an operator cannot disable the
//! agent's instructions by accident.

use serde::{Deserialize, Serialize};

/// Separator placed between the baseline prompt and an extension.
pub const EXTEND_SEPARATOR: &str = "\n\n";

/// Baseline instructions used when the operator supplies none.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a browser automation agent. \
Complete the user's task by navigating web pages and interacting with them. \
Work step by step, verify the outcome of each action, and stop as soon as the task is done. \
When finished, reply with a concise summary of the result, including any data the user asked for. \
If the task cannot be completed, explain what blocked you.";

/// Sources for the agent's system prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPromptConfig {
    /// Baseline instructions.
    #[serde(default = "default_prompt")]
    pub default: String,
    /// Rules appended after the baseline.
    #[serde(default)]
    pub extend: Option<String>,
    /// Full replacement for the baseline.
    #[serde(default, rename = "override")]
    pub override_prompt: Option<String>,
}

fn default_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for SystemPromptConfig {
    fn default() -> Self {
        Self {
            default: default_prompt(),
            extend: None,
            override_prompt: None,
        }
    }
}

impl SystemPromptConfig {
    /// Create a config with the given baseline and no customisation.
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            extend: None,
            override_prompt: None,
        }
    }

    /// Append extra rules to the baseline.
    pub fn with_extend(mut self, extend: impl Into<String>) -> Self {
        self.extend = Some(extend.into());
        self
    }

    /// Replace the baseline entirely.
    pub fn with_override(mut self, override_prompt: impl Into<String>) -> Self {
        self.override_prompt = Some(override_prompt.into());
        self
    }

    /// Whether both an extension and an override are set, in which case the
    /// extension is ignored.
    pub fn has_conflict(&self) -> bool {
        non_blank(&self.extend).is_some() && non_blank(&self.override_prompt).is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

/// Build the effective system prompt.
///
/// # Example
///
/// ```rust
/// use relay_core::prompt::{SystemPromptConfig, compose};
///
/// let config = SystemPromptConfig::new("Be careful.").with_extend("Never log in.");
/// assert_eq!(compose(&config), "Be careful.\n\nNever log in.");
/// ```
pub fn compose(config: &SystemPromptConfig) -> String {
    if let Some(override_prompt) = non_blank(&config.override_prompt) {
        return override_prompt.to_string();
    }

    match non_blank(&config.extend) {
        Some(extend) => {
            let mut prompt =
                String::with_capacity(config.default.len() + EXTEND_SEPARATOR.len() + extend.len());
            prompt.push_str(&config.default);
            prompt.push_str(EXTEND_SEPARATOR);
            prompt.push_str(extend);
            prompt
        }
        None => config.default.clone(),
    }
}
