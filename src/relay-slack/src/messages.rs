//! Message formatting for Slack.

use relay_core::{Reply, ReplyKind};
use serde::{Deserialize, Serialize};

/// Convert Markdown to Slack mrkdwn format.
///
/// Slack uses its own markup, which differs from standard Markdown:
/// - Bold: `**text**` becomes `*text*`
/// - Strikethrough: `~~text~~` becomes `~text~`
/// - Links: `[text](url)` becomes `<url|text>`
/// - Code spans and fenced blocks are left untouched
///
/// # Example
///
/// ```rust
/// use relay_slack::markdown_to_mrkdwn;
///
/// let md = "**Paris** is the capital, see [wiki](https://en.wikipedia.org/wiki/Paris)";
/// let mrkdwn = markdown_to_mrkdwn(md);
/// assert_eq!(mrkdwn, "*Paris* is the capital, see <https://en.wikipedia.org/wiki/Paris|wiki>");
/// ```
pub fn markdown_to_mrkdwn(md: &str) -> String {
    let mut out = String::with_capacity(md.len());
    let mut in_code_block = false;
    let mut rest = md;

    while let Some(c) = rest.chars().next() {
        if rest.starts_with("```") {
            in_code_block = !in_code_block;
            out.push_str("```");
            rest = &rest[3..];
            continue;
        }

        if !in_code_block && let Some((converted, consumed)) = convert_span(rest) {
            out.push_str(&converted);
            rest = &rest[consumed..];
            continue;
        }

        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Convert one markup span at the start of `s`, returning the converted text
/// and the number of bytes consumed.
fn convert_span(s: &str) -> Option<(String, usize)> {
    // Inline code is copied verbatim.
    if let Some(body) = s.strip_prefix('`') {
        let end = body.find('`')?;
        return Some((s[..end + 2].to_string(), end + 2));
    }

    for (marker, replacement) in [("**", "*"), ("~~", "~")] {
        if let Some(body) = s.strip_prefix(marker)
            && let Some(end) = body.find(marker)
            && end > 0
        {
            let converted = format!("{replacement}{}{replacement}", &body[..end]);
            return Some((converted, end + 2 * marker.len()));
        }
    }

    if s.starts_with('[')
        && let Some(bracket_end) = s.find("](")
        && !s[1..bracket_end].contains('\n')
    {
        let text = &s[1..bracket_end];
        let url_start = bracket_end + 2;
        let url_end = s[url_start..].find(')')?;
        let url = &s[url_start..url_start + url_end];
        if url.contains(char::is_whitespace) {
            return None;
        }
        return Some((format!("<{url}|{text}>"), url_start + url_end + 1));
    }

    None
}

/// A `chat.postMessage` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    /// Thread timestamp (for replies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl OutgoingMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            thread_ts: None,
        }
    }

    /// Set thread timestamp (for replies).
    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }
}

impl From<&Reply> for OutgoingMessage {
    /// Agent output in completed replies is Markdown and gets converted.
    fn from(reply: &Reply) -> Self {
        let text = match reply.kind {
            ReplyKind::Completed => markdown_to_mrkdwn(&reply.text),
            _ => reply.text.clone(),
        };
        OutgoingMessage::new(&reply.thread_id.channel, text).in_thread(&reply.thread_id.thread_ts)
    }
}
