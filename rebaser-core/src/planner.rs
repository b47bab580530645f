use std::{fs, future::Future, io, path::Path, pin::Pin, time::Duration};

use rebaser_kernel::{
    CommitSummary, PlanError, RebasePlan,
    prompt::{PlanPromptOptions, build_plan_prompt},
};
use serde_json::Value;
use thiserror::Error;

pub type PlannerFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, PlannerError>> + Send + 'a>>;

/// What a planner returned for one request. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlannerReply {
    pub structured: Option<Value>,
    pub text: Option<String>,
}

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner is temporarily unavailable: {message}")]
    Transient {
        message: String,
        retry_after: Option<Duration>,
    },
    #[error("planner request failed: {0}")]
    Fatal(String),
}

impl PlannerError {
    pub fn transient(message: impl Into<String>) -> Self {
        PlannerError::Transient {
            message: message.into(),
            retry_after: None,
        }
    }
}

/// A remote model that answers a prompt with a value shaped by `schema`, or with text.
pub trait PlannerBackend: Send + Sync {
    fn backend_name(&self) -> &'static str;

    fn generate<'a>(&'a self, prompt: &'a str, schema: &'a Value) -> PlannerFuture<'a, PlannerReply>;
}

/// Bounded retry for transient planner failures. The wait after failed attempt `n`
/// (counting from zero) is `n² × backoff_unit`, or the planner's retry-after hint when longer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, or `None` when `err` must propagate.
    pub fn backoff(&self, attempt: u32, err: &PlannerError) -> Option<Duration> {
        let PlannerError::Transient { retry_after, .. } = err else {
            return None;
        };
        if attempt + 1 >= self.max_attempts {
            return None;
        }
        let scheduled = self.backoff_unit * attempt.saturating_mul(attempt);
        Some(match retry_after {
            Some(hint) if *hint > scheduled => *hint,
            _ => scheduled,
        })
    }
}

#[derive(Debug, Error)]
pub enum PlanGenerationError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error("planner response failed validation: {0}")]
    PlanValidation(#[from] PlanError),
}

/// Ask `backend` for a rebase plan over `history`.
///
/// Transient backend errors are retried per `policy`. The structured reply is preferred;
/// when it is missing or invalid the JSON array embedded in the text reply is used instead.
pub async fn generate_plan(
    backend: &dyn PlannerBackend,
    history: &[CommitSummary],
    instructions: &str,
    options: &PlanPromptOptions<'_>,
    policy: &RetryPolicy,
) -> Result<RebasePlan, PlanGenerationError> {
    let prompt = build_plan_prompt(history, instructions, options);
    let schema = RebasePlan::response_schema();
    tracing::debug!(
        backend = backend.backend_name(),
        commits = history.len(),
        chars = prompt.len(),
        "requesting rebase plan"
    );
    tracing::trace!(%prompt, "plan prompt");

    let mut attempt = 0;
    let reply = loop {
        match backend.generate(&prompt, &schema).await {
            Ok(reply) => break reply,
            Err(err) => match policy.backoff(attempt, &err) {
                Some(delay) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "planner call failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => return Err(err.into()),
            },
        }
    };

    let plan = parse_reply(reply)?;
    tracing::debug!(actions = plan.len(), "planner returned a valid plan");
    Ok(plan)
}

fn parse_reply(reply: PlannerReply) -> Result<RebasePlan, PlanError> {
    if let Some(value) = reply.structured {
        match RebasePlan::from_value(value) {
            Ok(plan) => return Ok(plan),
            Err(err) => tracing::debug!(error = %err, "structured reply rejected; trying text"),
        }
    }
    match reply.text {
        Some(text) => RebasePlan::from_response_text(&text),
        None => Err(PlanError::Unparsable(
            "planner returned neither a structured value nor text".to_string(),
        )),
    }
}

#[derive(Debug, Error)]
pub enum PlanFileError {
    #[error("cannot access plan file {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("plan file {path} is invalid: {source}")]
    Invalid { path: String, source: PlanError },
}

/// Persist `plan` in sequencer form, one `<action> <sha>[ # <message>]` line per step.
pub fn write_plan_file(plan: &RebasePlan, path: &Path) -> Result<(), PlanFileError> {
    let io_err = |source| PlanFileError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, plan.to_sequencer()).map_err(io_err)
}

pub fn read_plan_file(path: &Path) -> Result<RebasePlan, PlanFileError> {
    let contents = fs::read_to_string(path).map_err(|source| PlanFileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    RebasePlan::from_sequencer(&contents).map_err(|source| PlanFileError::Invalid {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebaser_kernel::{ActionKind, FileChange};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned results and records the prompts it saw.
    struct ScriptedPlanner {
        replies: Mutex<VecDeque<Result<PlannerReply, PlannerError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedPlanner {
        fn new(replies: Vec<Result<PlannerReply, PlannerError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl PlannerBackend for ScriptedPlanner {
        fn backend_name(&self) -> &'static str {
            "scripted"
        }

        fn generate<'a>(
            &'a self,
            prompt: &'a str,
            _schema: &'a Value,
        ) -> PlannerFuture<'a, PlannerReply> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(PlannerError::Fatal("script exhausted".to_string())));
            Box::pin(async move { next })
        }
    }

    fn instant() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            backoff_unit: Duration::ZERO,
        }
    }

    fn history() -> Vec<CommitSummary> {
        vec![
            CommitSummary {
                id: "abc1234000000000000000000000000000000000".to_string(),
                message: "init".to_string(),
                diff: vec![FileChange::initial()],
            },
            CommitSummary {
                id: "def5678000000000000000000000000000000000".to_string(),
                message: "fix tpyo".to_string(),
                diff: Vec::new(),
            },
        ]
    }

    fn structured(value: Value) -> Result<PlannerReply, PlannerError> {
        Ok(PlannerReply {
            structured: Some(value),
            text: None,
        })
    }

    #[test]
    fn backoff_grows_quadratically_and_stops_after_the_fourth_attempt() {
        let policy = RetryPolicy::default();
        let err = PlannerError::transient("busy");
        let delays: Vec<_> = (0..4).map(|attempt| policy.backoff(attempt, &err)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::ZERO),
                Some(Duration::from_secs(1)),
                Some(Duration::from_secs(4)),
                None
            ]
        );
    }

    #[test]
    fn retry_after_hint_wins_when_longer() {
        let policy = RetryPolicy::default();
        let err = PlannerError::Transient {
            message: "rate limited".to_string(),
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(policy.backoff(1, &err), Some(Duration::from_secs(30)));
        assert_eq!(policy.backoff(0, &PlannerError::Fatal("no".into())), None);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_a_plan_arrives() {
        let backend = ScriptedPlanner::new(vec![
            Err(PlannerError::transient("503")),
            Err(PlannerError::transient("503")),
            structured(json!([
                {"sha": "abc1234", "action": "PICK"},
                {"sha": "def5678", "action": "REWORD", "message": "fix: typo"}
            ])),
        ]);

        let plan = generate_plan(
            &backend,
            &history(),
            PLAN,
            &PlanPromptOptions::default(),
            &instant(),
        )
        .await
        .expect("plan");

        assert_eq!(backend.calls(), 3);
        assert_eq!(plan.actions()[1].action, ActionKind::Reword);
        let prompt = &backend.prompts.lock().unwrap()[0];
        assert!(prompt.starts_with(PLAN));
        assert!(prompt.contains("Commit Hash: def5678"));
    }

    #[tokio::test]
    async fn fourth_transient_failure_propagates() {
        let backend = ScriptedPlanner::new(
            (0..5).map(|_| Err(PlannerError::transient("503"))).collect(),
        );

        let err = generate_plan(
            &backend,
            &history(),
            PLAN,
            &PlanPromptOptions::default(),
            &instant(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PlanGenerationError::Planner(PlannerError::Transient { .. })
        ));
        assert_eq!(backend.calls(), 4);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let backend = ScriptedPlanner::new(vec![Err(PlannerError::Fatal("bad key".into()))]);

        let err = generate_plan(
            &backend,
            &history(),
            PLAN,
            &PlanPromptOptions::default(),
            &instant(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PlanGenerationError::Planner(PlannerError::Fatal(_))));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn text_reply_is_used_when_structured_value_is_unusable() {
        let backend = ScriptedPlanner::new(vec![Ok(PlannerReply {
            structured: Some(json!({"unexpected": true})),
            text: Some(
                "Sure: [{\"sha\": \"abc1234\", \"action\": \"PICK\"}, {\"sha\": \"def5678\", \"action\": \"FIXUP\"}]"
                    .to_string(),
            ),
        })]);

        let plan = generate_plan(
            &backend,
            &history(),
            PLAN,
            &PlanPromptOptions::default(),
            &instant(),
        )
        .await
        .expect("plan from text");

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions()[1].action, ActionKind::Fixup);
    }

    #[tokio::test]
    async fn invalid_reply_is_a_terminal_validation_error() {
        let backend = ScriptedPlanner::new(vec![Ok(PlannerReply {
            structured: None,
            text: Some("[{\"sha\": \"abc1234\", \"action\": \"REWORD\"}]".to_string()),
        })]);

        let err = generate_plan(
            &backend,
            &history(),
            PLAN,
            &PlanPromptOptions::default(),
            &instant(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            PlanGenerationError::PlanValidation(PlanError::MissingRewordMessage { .. })
        ));
        assert_eq!(backend.calls(), 1);
    }

    #[test]
    fn plan_files_round_trip_through_sequencer_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plans").join("plan.txt");
        let plan = RebasePlan::from_sequencer("pick abc1234\nreword def5678 # fix: typo\n").unwrap();

        write_plan_file(&plan, &path).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "pick abc1234\nreword def5678 # fix: typo\n"
        );
        assert_eq!(read_plan_file(&path).unwrap(), plan);

        fs::write(&path, "squash abc1234\n").unwrap();
        assert!(matches!(
            read_plan_file(&path),
            Err(PlanFileError::Invalid { .. })
        ));
        assert!(matches!(
            read_plan_file(&dir.path().join("missing.txt")),
            Err(PlanFileError::Io { .. })
        ));
    }

    const PLAN: &str = "Plan the rebase.";
}
