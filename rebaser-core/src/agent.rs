//! Operator-supervised loop that lets a remote planner drive the rebase tools.
//!
//! Each turn sends one directive, expects exactly one named tool call back, runs it through a
//! [`ToolHandler`] and shows the planner's text plus the tool result to an [`Operator`], whose
//! answer decides the next directive.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use rebaser_kernel::{CONTINUE_DIRECTIVE, UNNAMED_OPERATION_NUDGE};
use serde_json::Value;
use thiserror::Error;

use crate::planner::{PlannerError, PlannerFuture, RetryPolicy};
use crate::tools::{ToolHandler, ToolOutput};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: Option<String>,
    pub args: Value,
}

/// One planner reply in a chat: free text plus at most the first requested tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentTurn {
    pub text: String,
    pub call: Option<ToolCall>,
}

/// Outcome of the previous tool call, returned to the planner alongside the next directive.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub name: String,
    pub output: ToolOutput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub directive: String,
    pub tool_result: Option<ToolResult>,
}

/// A stateful planner conversation. A failed `send` must leave the history untouched so the
/// same request can be retried.
pub trait ChatBackend: Send {
    fn send<'a>(&'a mut self, request: &'a ChatRequest) -> PlannerFuture<'a, AgentTurn>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorInput {
    Continue,
    Stop,
    Feedback(String),
}

pub trait Operator {
    /// Show `response` and wait for a decision.
    fn review(&mut self, response: &str) -> io::Result<OperatorInput>;
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("planner conversation failed: {0}")]
    Planner(#[from] PlannerError),
    #[error("could not read operator input: {0}")]
    Operator(#[from] io::Error),
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct AgentSummary {
    pub tool_calls: usize,
    pub last_output: Option<ToolOutput>,
}

/// Append-only log of planner responses and operator feedback for one run.
pub struct Transcript {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl Transcript {
    /// Create `agent-<timestamp>.log` under `dir`.
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("agent-{}.log", Local::now().format("%Y%m%d-%H%M%S")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path: Some(path),
            file: Some(file),
        })
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            file: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn record(&mut self, speaker: &str, text: &str) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        if let Err(err) = writeln!(file, "[{stamp}] {speaker}:\n{}\n", text.trim_end()) {
            tracing::warn!(error = %err, "could not write agent transcript");
        }
    }
}

async fn send_with_retry(
    chat: &mut dyn ChatBackend,
    request: &ChatRequest,
    policy: &RetryPolicy,
) -> Result<AgentTurn, PlannerError> {
    let mut attempt = 0;
    loop {
        match chat.send(request).await {
            Ok(turn) => return Ok(turn),
            Err(err) => match policy.backoff(attempt, &err) {
                Some(delay) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "chat call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err),
            },
        }
    }
}

/// Send until the planner names a tool to call. Unnamed replies are answered with a nudge.
async fn next_named_call(
    chat: &mut dyn ChatBackend,
    request: ChatRequest,
    policy: &RetryPolicy,
) -> Result<(String, String, Value), PlannerError> {
    let mut turn = send_with_retry(chat, &request, policy).await?;
    loop {
        if let Some(ToolCall {
            name: Some(name),
            args,
        }) = turn.call.take()
            && !name.trim().is_empty()
        {
            return Ok((turn.text, name, args));
        }
        tracing::debug!(text = %turn.text, "planner reply named no operation");
        let nudge = ChatRequest {
            directive: UNNAMED_OPERATION_NUDGE.to_string(),
            tool_result: None,
        };
        turn = send_with_retry(chat, &nudge, policy).await?;
    }
}

fn compose_response(text: &str, output: &ToolOutput) -> String {
    let text = text.trim_end();
    if text.is_empty() {
        output.message.clone()
    } else {
        format!("{text}\n{}", output.message)
    }
}

/// Run turns until the operator stops the loop or the planner fails for good.
pub async fn run_agent_loop(
    chat: &mut dyn ChatBackend,
    tools: &mut dyn ToolHandler,
    operator: &mut dyn Operator,
    transcript: &mut Transcript,
    initial_directive: String,
    policy: &RetryPolicy,
) -> Result<AgentSummary, AgentError> {
    let mut summary = AgentSummary::default();
    let mut request = ChatRequest {
        directive: initial_directive,
        tool_result: None,
    };

    loop {
        let (text, name, args) = next_named_call(chat, request, policy).await?;
        let output = tools.call(&name, &args);
        summary.tool_calls += 1;

        let response = compose_response(&text, &output);
        transcript.record("planner", &response);

        let directive = match operator.review(&response)? {
            OperatorInput::Stop => {
                summary.last_output = Some(output);
                tracing::info!(tool_calls = summary.tool_calls, "agent loop stopped by operator");
                return Ok(summary);
            }
            OperatorInput::Continue => CONTINUE_DIRECTIVE.to_string(),
            OperatorInput::Feedback(feedback) => {
                transcript.record("operator", &feedback);
                feedback
            }
        };

        request = ChatRequest {
            directive,
            tool_result: Some(ToolResult {
                name,
                output: output.clone(),
            }),
        };
        summary.last_output = Some(output);
    }
}
