//! Agent execution seam.
//!
//! The browser agent is an external collaborator. [`AgentRunner`] is the only
//! thing the orchestrator knows about it: hand over a task and a composed
//! system prompt, get back a result or a failure.
//!
//! [`ProcessRunner`] drives an agent that lives in a separate program. It
//! writes one JSON request to the child's stdin and reads one JSON response
//! from its stdout.

use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AgentError;

/// Maximum bytes of stderr kept in an error message.
const MAX_STDERR_DETAIL: usize = 2000;

/// Everything an agent needs for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub task: String,
    pub system_prompt: String,
    pub max_steps: u32,
    pub headless: bool,
}

/// What an agent returns after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Extracted result of the final step, if the agent produced one.
    #[serde(default)]
    pub final_result: Option<String>,
    /// Short description of each step taken.
    #[serde(default)]
    pub steps: Vec<String>,
    /// Whether the agent considered the task done.
    #[serde(default)]
    pub is_done: bool,
}

impl AgentOutput {
    /// Output of a finished run.
    pub fn done(final_result: impl Into<String>) -> Self {
        Self {
            final_result: Some(final_result.into()),
            steps: Vec::new(),
            is_done: true,
        }
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps = steps;
        self
    }
}

/// Executes a task with a composed system prompt.
///
/// Implementations may take minutes. The orchestrator enforces the
/// wall-clock budget, so a runner does not need its own timeout.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError>;
}

/// Wire format of the child's response.
#[derive(Debug, Deserialize)]
struct ProcessResponse {
    #[serde(default)]
    final_result: Option<String>,
    #[serde(default)]
    steps: Vec<String>,
    #[serde(default)]
    is_done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Runs the agent as a child process.
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
    api_key: Option<SecretString>,
}

impl std::fmt::Debug for ProcessRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRunner")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            api_key: None,
        }
    }

    /// Build a runner from a shell-style command line.
    pub fn from_command_line(command_line: &str) -> Result<Self, AgentError> {
        let mut parts = shlex::split(command_line)
            .ok_or_else(|| AgentError::Spawn(format!("Cannot parse command: {command_line}")))?
            .into_iter();
        let program = parts
            .next()
            .ok_or_else(|| AgentError::Spawn("Agent command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// API key exported to the child as `OPENAI_API_KEY`.
    pub fn with_api_key(mut self, api_key: SecretString) -> Self {
        self.api_key = Some(api_key);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl AgentRunner for ProcessRunner {
    async fn run(&self, request: &AgentRequest) -> Result<AgentOutput, AgentError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true); // a timed-out run must not leave a browser behind

        if let Some(api_key) = &self.api_key {
            cmd.env("OPENAI_API_KEY", api_key.expose_secret());
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| AgentError::Spawn(format!("{}: {}", self.program, e)))?;
        debug!(program = %self.program, pid = ?child.id(), "Spawned agent process");

        let payload = serde_json::to_vec(request)
            .map_err(|e| AgentError::Protocol(format!("Failed to encode request: {e}")))?;
        if let Some(mut stdin) = child.stdin.take() {
            // The exit status below is more informative than a broken pipe.
            if let Err(e) = stdin.write_all(&payload).await {
                debug!("Failed to write agent request: {}", e);
            }
            // Dropping stdin closes it so the child sees EOF.
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut out_pipe = child.stdout.take();
        let mut err_pipe = child.stderr.take();
        let read_out = async {
            if let Some(out) = out_pipe.as_mut() {
                let _ = out.read_to_end(&mut stdout).await;
            }
        };
        let read_err = async {
            if let Some(err) = err_pipe.as_mut() {
                let _ = err.read_to_end(&mut stderr).await;
            }
        };
        tokio::join!(read_out, read_err);

        let status = child
            .wait()
            .await
            .map_err(|e| AgentError::Failed(format!("Failed to wait for agent: {e}")))?;

        if !status.success() {
            let detail = stderr_detail(&stderr);
            warn!(program = %self.program, ?status, "Agent process exited with failure");
            return Err(AgentError::Failed(if detail.is_empty() {
                format!("agent exited with {status}")
            } else {
                detail
            }));
        }

        parse_response(&stdout)
    }
}

fn parse_response(stdout: &[u8]) -> Result<AgentOutput, AgentError> {
    let response: ProcessResponse = serde_json::from_slice(stdout)
        .map_err(|e| AgentError::Protocol(format!("Expected JSON on stdout: {e}")))?;

    if let Some(error) = response.error.filter(|e| !e.trim().is_empty()) {
        return Err(AgentError::Failed(error));
    }

    Ok(AgentOutput {
        final_result: response.final_result,
        steps: response.steps,
        is_done: response.is_done,
    })
}

fn stderr_detail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= MAX_STDERR_DETAIL {
        return text.to_string();
    }
    let mut start = text.len() - MAX_STDERR_DETAIL;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}
