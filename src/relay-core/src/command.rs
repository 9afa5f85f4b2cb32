//! Chat command parsing.
//!
//! Messages addressed to the bot start with a configurable prefix:
//! - `<prefix> help` - show usage
//! - `<prefix> <task>` - run a browser task
//!
//! Anything else is not for us.

use serde::{Deserialize, Serialize};

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "$bu";

/// Tokens that request the usage text.
const HELP_TOKENS: [&str; 3] = ["help", "--help", "-h"];

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Usage request.
    Help,
    /// Task invocation. The text may be empty; the orchestrator rejects that.
    Task { text: String },
    /// Message without the command prefix.
    Unrecognized { raw: String },
}

impl Command {
    /// Whether this command should be acted on.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Command::Unrecognized { .. })
    }
}

/// Classify raw message text.
///
/// # Example
///
/// ```rust
/// use relay_core::command::{Command, parse};
///
/// assert_eq!(
///     parse("  $bu find the capital of France ", "$bu"),
///     Command::Task { text: "find the capital of France".to_string() }
/// );
/// assert_eq!(parse("$bu HELP", "$bu"), Command::Help);
/// ```
pub fn parse(raw_text: &str, prefix: &str) -> Command {
    let trimmed = raw_text.trim();

    // The prefix must be a whole token: `$bush` is not `$bu sh`.
    let rest = match trimmed.strip_prefix(prefix) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => rest,
        _ => {
            return Command::Unrecognized {
                raw: raw_text.to_string(),
            };
        }
    };

    let payload = rest.trim();
    if HELP_TOKENS
        .iter()
        .any(|token| payload.eq_ignore_ascii_case(token))
    {
        return Command::Help;
    }

    Command::Task {
        text: payload.to_string(),
    }
}

/// Static usage text for the given prefix.
pub fn usage_text(prefix: &str) -> String {
    format!(
        "*Browser Use Slack Bot*\n\n\
         Use `{prefix} <task>` to run a browser task.\n\n\
         Examples:\n\
         • `{prefix} Compare the price of gpt-4o and DeepSeek-V3`\n\
         • `{prefix} Find the latest news about AI on techcrunch.com`\n\
         • `{prefix} Search for job openings at OpenAI and summarize the requirements`"
    )
}
