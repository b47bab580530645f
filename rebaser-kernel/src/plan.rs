use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const MIN_SHA_LEN: usize = 7;
pub const MAX_SHA_LEN: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ActionKind {
    #[serde(rename = "PICK", alias = "pick")]
    Pick,
    #[serde(rename = "REWORD", alias = "reword")]
    Reword,
    #[serde(rename = "EDIT", alias = "edit")]
    Edit,
    #[serde(rename = "SQUASH", alias = "squash")]
    Squash,
    #[serde(rename = "FIXUP", alias = "fixup")]
    Fixup,
    #[serde(rename = "DROP", alias = "drop")]
    Drop,
}

impl ActionKind {
    /// Command word understood by `git rebase -i` todo lists.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Pick => "pick",
            ActionKind::Reword => "reword",
            ActionKind::Edit => "edit",
            ActionKind::Squash => "squash",
            ActionKind::Fixup => "fixup",
            ActionKind::Drop => "drop",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Pick => "PICK",
            ActionKind::Reword => "REWORD",
            ActionKind::Edit => "EDIT",
            ActionKind::Squash => "SQUASH",
            ActionKind::Fixup => "FIXUP",
            ActionKind::Drop => "DROP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "p" | "pick" => Some(ActionKind::Pick),
            "r" | "reword" => Some(ActionKind::Reword),
            "e" | "edit" => Some(ActionKind::Edit),
            "s" | "squash" => Some(ActionKind::Squash),
            "f" | "fixup" => Some(ActionKind::Fixup),
            "d" | "drop" => Some(ActionKind::Drop),
            _ => None,
        }
    }

    /// Squash and fixup fold into the commit replayed before them.
    pub fn folds_into_previous(&self) -> bool {
        matches!(self, ActionKind::Squash | ActionKind::Fixup)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single rebasing action proposed by the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RebaseAction {
    /// Commit hash (7-40 hex characters) the action applies to.
    pub sha: String,
    pub action: ActionKind,
    /// Replacement commit message; only meaningful for REWORD.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RebaseAction {
    pub fn new(sha: impl Into<String>, action: ActionKind) -> Self {
        Self {
            sha: sha.into(),
            action,
            message: None,
        }
    }

    pub fn reword(sha: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sha: sha.into(),
            action: ActionKind::Reword,
            message: Some(message.into()),
        }
    }

    /// Render this action as one sequencer line: `<action> <sha>[ # <message>]`.
    pub fn sequencer_line(&self) -> String {
        let mut line = format!("{} {}", self.action.as_str(), self.sha);
        if self.action == ActionKind::Reword
            && let Some(message) = self.message.as_deref()
        {
            let subject = single_line(message);
            if !subject.is_empty() {
                line.push_str(" # ");
                line.push_str(&subject);
            }
        }
        line
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("rebase plan is empty")]
    Empty,
    #[error("action {index}: `{sha}` is not a 7-40 character hex commit id")]
    InvalidSha { index: usize, sha: String },
    #[error("action {index}: REWORD of {sha} requires a non-empty message not starting with `#`")]
    MissingRewordMessage { index: usize, sha: String },
    #[error("plan cannot start with {action} {sha}; there is no earlier commit to fold into")]
    LeadingFold { action: ActionKind, sha: String },
    #[error("cannot validate planner response: {0}")]
    Unparsable(String),
    #[error("sequencer line {line_no} is malformed: `{line}`")]
    MalformedLine { line_no: usize, line: String },
}

/// An ordered, validated list of rebase actions. Order is replay order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RebasePlan {
    actions: Vec<RebaseAction>,
}

impl RebasePlan {
    /// Validate raw actions into a plan. Messages on non-REWORD actions are dropped.
    pub fn from_actions(actions: Vec<RebaseAction>) -> Result<Self, PlanError> {
        if actions.is_empty() {
            return Err(PlanError::Empty);
        }

        let mut validated = Vec::with_capacity(actions.len());
        for (index, mut action) in actions.into_iter().enumerate() {
            action.sha = action.sha.trim().to_string();
            if !is_valid_sha(&action.sha) {
                return Err(PlanError::InvalidSha {
                    index,
                    sha: action.sha,
                });
            }

            if action.action == ActionKind::Reword {
                let message = action
                    .message
                    .as_deref()
                    .map(str::trim)
                    // git strips a leading `#` line as a comment, leaving no message.
                    .filter(|value| !value.is_empty() && !value.starts_with('#'))
                    .map(str::to_string);
                match message {
                    Some(message) => action.message = Some(message),
                    None => {
                        return Err(PlanError::MissingRewordMessage {
                            index,
                            sha: action.sha,
                        });
                    }
                }
            } else {
                action.message = None;
            }

            validated.push(action);
        }

        if let Some(first) = validated.first()
            && first.action.folds_into_previous()
        {
            return Err(PlanError::LeadingFold {
                action: first.action,
                sha: first.sha.clone(),
            });
        }

        Ok(Self { actions: validated })
    }

    /// Accepts either a bare array of actions or an object wrapping one under `plan`.
    pub fn from_value(value: Value) -> Result<Self, PlanError> {
        let array = match value {
            Value::Array(_) => value,
            Value::Object(mut map) => map
                .remove("plan")
                .ok_or_else(|| PlanError::Unparsable("object has no `plan` field".to_string()))?,
            other => {
                return Err(PlanError::Unparsable(format!(
                    "expected a JSON array, got {other}"
                )));
            }
        };

        let actions: Vec<RebaseAction> =
            serde_json::from_value(array).map_err(|err| PlanError::Unparsable(err.to_string()))?;
        Self::from_actions(actions)
    }

    /// Fallback for free-text responses: the JSON array between the first `[` and the last `]`.
    pub fn from_response_text(text: &str) -> Result<Self, PlanError> {
        let start = text.find('[');
        let end = text.rfind(']');
        let (start, end) = match (start, end) {
            (Some(start), Some(end)) if end > start => (start, end),
            _ => {
                return Err(PlanError::Unparsable(
                    "response contains no JSON array".to_string(),
                ));
            }
        };

        let actions: Vec<RebaseAction> = serde_json::from_str(&text[start..=end])
            .map_err(|err| PlanError::Unparsable(err.to_string()))?;
        Self::from_actions(actions)
    }

    /// Parse sequencer text as written by [`RebasePlan::to_sequencer`].
    pub fn from_sequencer(text: &str) -> Result<Self, PlanError> {
        let mut actions = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let malformed = || PlanError::MalformedLine {
                line_no: idx + 1,
                line: line.to_string(),
            };

            let (command, rest) = line.split_once(char::is_whitespace).ok_or_else(malformed)?;
            let kind = ActionKind::parse(command).ok_or_else(malformed)?;
            let rest = rest.trim_start();
            let (sha, tail) = match rest.split_once(char::is_whitespace) {
                Some((sha, tail)) => (sha, tail.trim()),
                None => (rest, ""),
            };
            if sha.is_empty() {
                return Err(malformed());
            }

            let message = tail
                .strip_prefix('#')
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty());

            actions.push(RebaseAction {
                sha: sha.to_string(),
                action: kind,
                message: if kind == ActionKind::Reword {
                    message
                } else {
                    None
                },
            });
        }

        Self::from_actions(actions)
    }

    pub fn to_sequencer(&self) -> String {
        let mut out = String::new();
        for action in &self.actions {
            out.push_str(&action.sequencer_line());
            out.push('\n');
        }
        out
    }

    /// Same plan with each sha replaced through `resolve`, typically to full ids.
    pub fn map_shas<E>(
        &self,
        mut resolve: impl FnMut(&str) -> Result<String, E>,
    ) -> Result<Self, E> {
        let mut actions = Vec::with_capacity(self.actions.len());
        for action in &self.actions {
            actions.push(RebaseAction {
                sha: resolve(&action.sha)?,
                action: action.action,
                message: action.message.clone(),
            });
        }
        Ok(Self { actions })
    }

    pub fn actions(&self) -> &[RebaseAction] {
        &self.actions
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// JSON schema for a list of actions, used to constrain planner responses.
    pub fn response_schema() -> Value {
        let root = schemars::schema_for!(Vec<RebaseAction>);
        let raw = serde_json::to_value(root).unwrap_or(Value::Null);
        crate::schema::clean_schema(&raw)
    }
}

impl<'de> Deserialize<'de> for RebasePlan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let actions = Vec::<RebaseAction>::deserialize(deserializer)?;
        RebasePlan::from_actions(actions).map_err(serde::de::Error::custom)
    }
}

fn is_valid_sha(sha: &str) -> bool {
    (MIN_SHA_LEN..=MAX_SHA_LEN).contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit())
}

fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sequencer_line_carries_reword_message_as_comment() {
        let plan = RebasePlan::from_actions(vec![
            RebaseAction::new("abc1234", ActionKind::Pick),
            RebaseAction::reword("def5678", "fix: typo"),
        ])
        .unwrap();

        assert_eq!(plan.to_sequencer(), "pick abc1234\nreword def5678 # fix: typo\n");
    }

    #[test]
    fn multi_line_reword_collapses_to_one_comment_line() {
        let action = RebaseAction::reword("def5678", "feat: add parser\n\nwith a body");
        assert_eq!(
            action.sequencer_line(),
            "reword def5678 # feat: add parser with a body"
        );
    }

    #[test]
    fn messages_on_non_reword_actions_are_dropped() {
        let plan = RebasePlan::from_actions(vec![RebaseAction {
            sha: "abc1234".to_string(),
            action: ActionKind::Pick,
            message: Some("ignored".to_string()),
        }])
        .unwrap();

        assert_eq!(plan.actions()[0].message, None);
        assert_eq!(plan.to_sequencer(), "pick abc1234\n");
    }

    #[test]
    fn reword_without_message_is_rejected() {
        let err = RebasePlan::from_actions(vec![
            RebaseAction::new("abc1234", ActionKind::Pick),
            RebaseAction {
                sha: "def5678".to_string(),
                action: ActionKind::Reword,
                message: Some("   ".to_string()),
            },
        ])
        .unwrap_err();

        assert_eq!(
            err,
            PlanError::MissingRewordMessage {
                index: 1,
                sha: "def5678".to_string()
            }
        );
    }

    #[test]
    fn reword_message_cannot_open_with_a_comment_line() {
        for message in ["# fix: typo", "\n  #wip\nbody"] {
            let err =
                RebasePlan::from_actions(vec![RebaseAction::reword("abc1234", message)]).unwrap_err();
            assert_eq!(
                err,
                PlanError::MissingRewordMessage {
                    index: 0,
                    sha: "abc1234".to_string()
                },
                "{message:?}"
            );
        }

        let plan =
            RebasePlan::from_actions(vec![RebaseAction::reword("abc1234", "fix: issue #12")]).unwrap();
        assert_eq!(plan.actions()[0].message.as_deref(), Some("fix: issue #12"));
    }

    #[test]
    fn sha_length_and_charset_are_enforced() {
        for bad in ["abc12", "zzzzzzz", &"a".repeat(41)] {
            let err = RebasePlan::from_actions(vec![RebaseAction::new(bad, ActionKind::Pick)])
                .unwrap_err();
            assert!(matches!(err, PlanError::InvalidSha { index: 0, .. }), "{bad}");
        }
    }

    #[test]
    fn plan_cannot_open_with_squash_or_fixup() {
        let err = RebasePlan::from_actions(vec![
            RebaseAction::new("abc1234", ActionKind::Fixup),
            RebaseAction::new("def5678", ActionKind::Pick),
        ])
        .unwrap_err();
        assert!(matches!(err, PlanError::LeadingFold { .. }));
        assert!(matches!(
            RebasePlan::from_actions(Vec::new()),
            Err(PlanError::Empty)
        ));
    }

    #[test]
    fn response_text_fallback_extracts_the_outer_array() {
        let text = r#"Here is the plan you asked for:
```json
[{"sha": "abc1234", "action": "PICK"}, {"sha": "def5678", "action": "REWORD", "message": "fix: typo"}]
```
Let me know if [anything] changes."#;

        // The last `]` belongs to the trailing prose, so the slice is not valid JSON.
        assert!(RebasePlan::from_response_text(text).is_err());

        let text = r#"Plan: [{"sha": "abc1234", "action": "pick"}, {"sha": "def5678", "action": "DROP"}] done"#;
        let plan = RebasePlan::from_response_text(text).unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.actions()[1].action, ActionKind::Drop);
    }

    #[test]
    fn response_text_without_array_is_unparsable() {
        let err = RebasePlan::from_response_text("I could not decide").unwrap_err();
        assert!(matches!(err, PlanError::Unparsable(_)));
    }

    #[test]
    fn from_value_accepts_wrapped_plan() {
        let plan = RebasePlan::from_value(json!({
            "plan": [{"sha": "abc1234", "action": "EDIT"}]
        }))
        .unwrap();
        assert_eq!(plan.actions()[0].action, ActionKind::Edit);

        let err = RebasePlan::from_value(json!({"steps": []})).unwrap_err();
        assert!(matches!(err, PlanError::Unparsable(_)));
    }

    #[test]
    fn sequencer_text_parses_back_into_the_same_plan() {
        let text = "# generated plan\npick abc1234\n\nreword def5678 # fix: typo\nf 0123abcd\n";
        let plan = RebasePlan::from_sequencer(text).unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.actions()[1].message.as_deref(), Some("fix: typo"));
        assert_eq!(plan.actions()[2].action, ActionKind::Fixup);
        assert_eq!(
            plan.to_sequencer(),
            "pick abc1234\nreword def5678 # fix: typo\nfixup 0123abcd\n"
        );
    }

    #[test]
    fn malformed_sequencer_line_reports_its_position() {
        let err = RebasePlan::from_sequencer("pick abc1234\nshuffle def5678\n").unwrap_err();
        assert_eq!(
            err,
            PlanError::MalformedLine {
                line_no: 2,
                line: "shuffle def5678".to_string()
            }
        );
    }

    #[test]
    fn response_schema_describes_an_array_of_actions() {
        let schema = RebasePlan::response_schema();
        assert_eq!(schema["type"], "array");
        let item = &schema["items"];
        assert_eq!(item["type"], "object");
        assert_eq!(item["properties"]["action"]["enum"][0], "PICK");
        assert_eq!(item["properties"]["message"]["nullable"], true);
        assert!(schema.get("$schema").is_none());
    }
}
