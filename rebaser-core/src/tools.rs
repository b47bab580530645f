use std::fs;
use std::path::{Path, PathBuf};

use rebaser_kernel::schema::clean_schema;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

use crate::planner::{PlanFileError, read_plan_file};
use crate::rebase::{
    FileOperation, MergeResolution, RebaseError, RebaseState, Session, StepOutcome,
};

/// Result of one named operation, as reported back to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub message: String,
}

impl ToolOutput {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// Anything that can execute named operations on behalf of the agent loop.
pub trait ToolHandler: Send {
    fn declarations(&self) -> Vec<ToolDeclaration>;

    fn call(&mut self, name: &str, args: &Value) -> ToolOutput;
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StartArgs {
    /// Commit the rewritten history is replayed onto.
    pub base_commit: String,
    /// Path of a sequencer-format plan file. Defaults to the plan generated for this run.
    #[serde(default)]
    pub rebase_plan: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EditArgs {
    /// Commit to amend; usually the commit the rebase is paused on.
    pub commit_sha: String,
    pub file_operations: Vec<FileOperation>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ResolveConflictsArgs {
    pub file_resolutions: Vec<MergeResolution>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NoArgs {}

pub const START: &str = "start";
pub const EDIT: &str = "edit";
pub const RESOLVE_CONFLICTS: &str = "resolve_conflicts";
pub const RESUME: &str = "resume";
pub const ABORT: &str = "abort";
pub const FINISH: &str = "finish";

pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        declare::<StartArgs>(
            START,
            "Start an interactive rebase onto base_commit using the rebase plan.",
        ),
        declare::<EditArgs>(
            EDIT,
            "Apply file operations (modify, restore, delete, rename) to a commit and amend it in place.",
        ),
        declare::<ResolveConflictsArgs>(
            RESOLVE_CONFLICTS,
            "Write and stage resolved content for conflicted files. Does not continue the rebase.",
        ),
        declare::<NoArgs>(RESUME, "Continue the rebase past the current stop."),
        declare::<NoArgs>(
            ABORT,
            "Abort the rebase and restore the branch to its original state.",
        ),
        declare::<NoArgs>(
            FINISH,
            "Continue the rebase until every step has been replayed and close the session.",
        ),
    ]
}

fn declare<T: JsonSchema>(name: &'static str, description: &'static str) -> ToolDeclaration {
    let raw = serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null);
    let parameters = clean_schema(&raw);
    let has_properties = parameters
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());
    ToolDeclaration {
        name,
        description,
        parameters: has_properties.then_some(parameters),
    }
}

/// Text block listing each tool with its argument schema, for the agent's first directive.
pub fn describe_tools(declarations: &[ToolDeclaration]) -> String {
    declarations
        .iter()
        .map(|decl| {
            let params = decl
                .parameters
                .as_ref()
                .and_then(|p| serde_json::to_string_pretty(p).ok())
                .unwrap_or_else(|| "(no arguments)".to_string());
            format!("- {}: {}\n{}", decl.name, decl.description, params)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
enum ToolError {
    #[error("Invalid arguments for {tool}: {message}")]
    Arguments { tool: String, message: String },
    #[error("Unknown operation: {0}")]
    Unknown(String),
    #[error(transparent)]
    Rebase(#[from] RebaseError),
    #[error(transparent)]
    Plan(#[from] PlanFileError),
}

/// The six rebase operations exposed to the agent loop, backed by one [`Session`].
pub struct RebaseToolbox {
    repo_root: PathBuf,
    plan_file: PathBuf,
    session: Option<Session>,
}

impl RebaseToolbox {
    pub fn new(repo_root: impl Into<PathBuf>, plan_file: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            plan_file: plan_file.into(),
            session: None,
        }
    }

    /// Continue driving a session recovered from disk.
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn state(&self) -> RebaseState {
        self.session
            .as_ref()
            .map(Session::state)
            .unwrap_or(RebaseState::UnStarted)
    }

    fn dispatch(&mut self, name: &str, args: &Value) -> Result<String, ToolError> {
        match name {
            START => self.start(parse_args(name, args)?),
            EDIT => self.edit(parse_args(name, args)?),
            RESOLVE_CONFLICTS => self.resolve_conflicts(parse_args(name, args)?),
            RESUME => {
                parse_args::<NoArgs>(name, args)?;
                let outcome = self.active()?.resume()?;
                Ok(self.describe(&outcome))
            }
            ABORT => {
                parse_args::<NoArgs>(name, args)?;
                self.active()?.abort()?;
                Ok("Rebase aborted; the branch is back where it started".to_string())
            }
            FINISH => {
                parse_args::<NoArgs>(name, args)?;
                let outcome = self.active()?.finish()?;
                Ok(self.describe(&outcome))
            }
            other => Err(ToolError::Unknown(other.to_string())),
        }
    }

    fn start(&mut self, args: StartArgs) -> Result<String, ToolError> {
        let plan_path = args
            .rebase_plan
            .as_deref()
            .map(|path| resolve_plan_path(&self.repo_root, path))
            .unwrap_or_else(|| self.plan_file.clone());
        let plan = read_plan_file(&plan_path)?;
        let (session, outcome) = Session::start(&self.repo_root, &args.base_commit, &plan)?;
        self.session = Some(session);
        Ok(format!(
            "Rebase of {} step(s) started onto {}. {}",
            plan.len(),
            args.base_commit,
            self.describe(&outcome)
        ))
    }

    fn edit(&mut self, args: EditArgs) -> Result<String, ToolError> {
        let count = args.file_operations.len();
        let amended = self.active()?.edit(&args.commit_sha, args.file_operations)?;
        Ok(format!(
            "Applied {count} file operation(s) to {}; amended as {}",
            args.commit_sha,
            &amended[..7.min(amended.len())]
        ))
    }

    fn resolve_conflicts(&mut self, args: ResolveConflictsArgs) -> Result<String, ToolError> {
        let session = self
            .session
            .as_mut()
            .ok_or(RebaseError::NoActiveConflict)?;
        let outcome = session.resolve(&args.file_resolutions)?;
        let prefix = if args.file_resolutions.is_empty() {
            "No resolutions supplied.".to_string()
        } else {
            format!("Staged {} resolution(s).", args.file_resolutions.len())
        };
        Ok(format!("{prefix} {}", self.describe(&outcome)))
    }

    fn active(&mut self) -> Result<&mut Session, RebaseError> {
        self.session.as_mut().ok_or(RebaseError::NoActiveSession)
    }

    fn describe(&self, outcome: &StepOutcome) -> String {
        match outcome {
            StepOutcome::Conflicted { paths } => {
                let mut message = outcome.to_string();
                for path in paths {
                    let content = fs::read_to_string(self.repo_root.join(path))
                        .unwrap_or_else(|_| "(unreadable)".to_string());
                    message.push_str(&format!("\n\n--- {path} ---\n{content}"));
                }
                message
            }
            _ => outcome.to_string(),
        }
    }
}

impl ToolHandler for RebaseToolbox {
    fn declarations(&self) -> Vec<ToolDeclaration> {
        declarations()
    }

    fn call(&mut self, name: &str, args: &Value) -> ToolOutput {
        tracing::debug!(tool = name, %args, "tool call");
        match self.dispatch(name, args) {
            Ok(message) => {
                tracing::info!(tool = name, state = %self.state(), "tool succeeded");
                ToolOutput::ok(message)
            }
            Err(err) => {
                tracing::warn!(tool = name, error = %err, "tool failed");
                ToolOutput::failed(err.to_string())
            }
        }
    }
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(args).map_err(|err| ToolError::Arguments {
        tool: tool.to_string(),
        message: err.to_string(),
    })
}

fn resolve_plan_path(repo_root: &Path, path: &str) -> PathBuf {
    let candidate = PathBuf::from(path);
    if candidate.is_absolute() {
        candidate
    } else {
        repo_root.join(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::write_plan_file;
    use git2::{IndexAddOption, Oid, Repository, Signature};
    use rebaser_kernel::{ActionKind, RebaseAction, RebasePlan};
    use serde_json::json;

    struct Fixture {
        tempdir: tempfile::TempDir,
        repo: Repository,
        base: Oid,
        first: Oid,
        second: Oid,
    }

    impl Fixture {
        fn new() -> Self {
            let tempdir = tempfile::TempDir::new().expect("tempdir");
            let repo = Repository::init(tempdir.path()).expect("init repo");
            {
                let mut config = repo.config().unwrap();
                config.set_str("user.name", "Tester").unwrap();
                config.set_str("user.email", "tester@example.com").unwrap();
            }
            fs::write(tempdir.path().join("a.txt"), "alpha\n").unwrap();
            let base = commit(&repo, "base");
            fs::write(tempdir.path().join("b.txt"), "bravo\n").unwrap();
            let first = commit(&repo, "add b");
            fs::write(tempdir.path().join("a.txt"), "alpha\nfixed\n").unwrap();
            let second = commit(&repo, "fix tpyo");
            Self {
                tempdir,
                repo,
                base,
                first,
                second,
            }
        }

        fn path(&self) -> &Path {
            self.tempdir.path()
        }

        fn toolbox(&self, actions: Vec<RebaseAction>) -> RebaseToolbox {
            let plan = RebasePlan::from_actions(actions).unwrap();
            let plan_file = self.path().join(".git").join("plan.txt");
            write_plan_file(&plan, &plan_file).unwrap();
            RebaseToolbox::new(self.path(), plan_file)
        }

        fn blob_at(&self, oid: Oid, rel: &str) -> Option<String> {
            let tree = self.repo.find_commit(oid).unwrap().tree().unwrap();
            let entry = tree.get_path(Path::new(rel)).ok()?;
            let blob = self.repo.find_blob(entry.id()).unwrap();
            Some(String::from_utf8_lossy(blob.content()).to_string())
        }

        fn head(&self) -> Oid {
            self.repo.head().unwrap().target().unwrap()
        }
    }

    fn commit(repo: &Repository, msg: &str) -> Oid {
        let mut idx = repo.index().unwrap();
        idx.add_all(["."], IndexAddOption::DEFAULT, None).unwrap();
        idx.write().unwrap();
        let tree = repo.find_tree(idx.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Tester", "tester@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parents)
            .unwrap()
    }

    fn short(oid: Oid) -> String {
        oid.to_string()[..7].to_string()
    }

    #[test]
    fn declarations_cover_every_operation_with_clean_schemas() {
        let decls = declarations();
        let names: Vec<_> = decls.iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![START, EDIT, RESOLVE_CONFLICTS, RESUME, ABORT, FINISH]
        );

        let start = decls[0].parameters.as_ref().expect("start takes arguments");
        assert_eq!(start["required"], json!(["base_commit"]));
        assert_eq!(start["properties"]["rebase_plan"]["nullable"], json!(true));
        assert!(start.get("$schema").is_none());
        assert!(start.get("title").is_none());

        let edit = decls[1].parameters.as_ref().unwrap();
        let op = &edit["properties"]["file_operations"]["items"];
        assert_eq!(op["type"], json!("object"));
        assert!(op["properties"].get("operation_type").is_some());
        assert!(op.get("additionalProperties").is_none());

        assert!(decls[3].parameters.is_none());
        assert!(describe_tools(&decls).contains("- resume: Continue the rebase"));
    }

    #[test]
    fn unknown_fields_and_operations_fail_without_panicking() {
        let fx = Fixture::new();
        let mut toolbox = fx.toolbox(vec![RebaseAction::new(short(fx.first), ActionKind::Pick)]);

        let out = toolbox.call(START, &json!({"base_commit": "HEAD~2", "force": true}));
        assert!(!out.success);
        assert!(out.message.starts_with("Invalid arguments for start:"));
        assert!(out.message.contains("force"));

        let out = toolbox.call("rewrite_everything", &json!({}));
        assert_eq!(out, ToolOutput::failed("Unknown operation: rewrite_everything"));

        let out = toolbox.call(RESUME, &Value::Null);
        assert_eq!(out, ToolOutput::failed("no rebase session is active"));
        let out = toolbox.call(RESOLVE_CONFLICTS, &json!({"file_resolutions": []}));
        assert_eq!(out, ToolOutput::failed("no conflicts to resolve"));
    }

    #[test]
    fn failed_edit_reports_every_failure_and_keeps_the_commit() {
        let fx = Fixture::new();
        let mut toolbox = fx.toolbox(vec![
            RebaseAction::new(short(fx.first), ActionKind::Edit),
            RebaseAction::new(short(fx.second), ActionKind::Pick),
        ]);

        let out = toolbox.call(START, &json!({"base_commit": fx.base.to_string()}));
        assert!(out.success, "{}", out.message);
        assert!(out.message.contains("Rebase paused"));
        let paused_at = fx.head();

        let out = toolbox.call(
            EDIT,
            &json!({
                "commit_sha": paused_at.to_string(),
                "file_operations": [
                    {"file_path": "a.txt", "operation_type": "modify", "content": "changed\n"},
                    {"file_path": "missing.txt", "operation_type": "delete"}
                ]
            }),
        );
        assert_eq!(
            out,
            ToolOutput::failed("Cannot delete missing.txt: file does not exist")
        );
        assert_eq!(fx.head(), paused_at);
        assert_eq!(fx.blob_at(paused_at, "a.txt").as_deref(), Some("alpha\n"));

        let out = toolbox.call(
            EDIT,
            &json!({
                "commit_sha": paused_at.to_string(),
                "file_operations": [
                    {"file_path": "a.txt", "operation_type": "modify", "content": "changed\n"}
                ]
            }),
        );
        assert!(out.success, "{}", out.message);
        assert_eq!(fx.blob_at(fx.head(), "a.txt").as_deref(), Some("changed\n"));

        let out = toolbox.call(ABORT, &json!({}));
        assert!(out.success);
        assert_eq!(fx.head(), fx.second);
        assert_eq!(toolbox.state(), RebaseState::UnStarted);
    }

    #[test]
    fn failed_edit_leaves_a_rebase_that_can_still_be_finished() {
        let fx = Fixture::new();
        let mut toolbox = fx.toolbox(vec![
            RebaseAction::new(short(fx.first), ActionKind::Edit),
            RebaseAction::new(short(fx.second), ActionKind::Pick),
        ]);

        let out = toolbox.call(START, &json!({"base_commit": fx.base.to_string()}));
        assert!(out.success, "{}", out.message);

        let out = toolbox.call(
            EDIT,
            &json!({
                "commit_sha": fx.first.to_string(),
                "file_operations": [
                    {"file_path": "missing.txt", "operation_type": "delete", "content": ""}
                ]
            }),
        );
        assert_eq!(
            out,
            ToolOutput::failed("Cannot delete missing.txt: file does not exist")
        );
        assert_eq!(toolbox.state(), RebaseState::InProgress);

        let recovered = Session::recover(fx.path()).unwrap().expect("session on disk");
        assert_eq!(recovered.state(), RebaseState::InProgress);

        let out = toolbox.call(FINISH, &json!({}));
        assert_eq!(out, ToolOutput::ok("Rebase finished"));
        assert_eq!(fx.head(), fx.second);
        assert_eq!(toolbox.state(), RebaseState::UnStarted);
    }

    #[test]
    fn conflicts_are_reported_with_file_content() {
        let fx = Fixture::new();
        fs::write(fx.path().join("a.txt"), "alpha\nother\n").unwrap();
        let third = commit(&fx.repo, "rewrite a");
        // Replaying "rewrite a" straight onto base conflicts on a.txt.
        let mut toolbox = fx.toolbox(vec![
            RebaseAction::new(short(third), ActionKind::Pick),
            RebaseAction::new(short(fx.first), ActionKind::Pick),
            RebaseAction::new(short(fx.second), ActionKind::Drop),
        ]);

        let out = toolbox.call(START, &json!({"base_commit": fx.base.to_string()}));
        assert!(out.success, "{}", out.message);
        assert!(out.message.contains("Rebase stopped with conflicts in: a.txt"));
        assert!(out.message.contains("--- a.txt ---\n"));
        assert!(out.message.contains("<<<<<<<"));
        assert_eq!(toolbox.state(), RebaseState::Conflict);

        let out = toolbox.call(
            RESOLVE_CONFLICTS,
            &json!({"file_resolutions": [{"file_path": "a.txt", "content": "alpha\nother\n"}]}),
        );
        assert!(out.success, "{}", out.message);
        assert!(out.message.starts_with("Staged 1 resolution(s)."));

        let out = toolbox.call(FINISH, &json!({}));
        assert_eq!(out, ToolOutput::ok("Rebase finished"));
        assert_eq!(toolbox.state(), RebaseState::UnStarted);
        assert_eq!(
            fs::read_to_string(fx.path().join("a.txt")).unwrap(),
            "alpha\nother\n"
        );
        assert_eq!(fs::read_to_string(fx.path().join("b.txt")).unwrap(), "bravo\n");
    }

    #[test]
    fn start_reads_an_explicit_plan_path_relative_to_the_repository() {
        let fx = Fixture::new();
        let mut toolbox = RebaseToolbox::new(fx.path(), fx.path().join("unused.txt"));
        let plan = RebasePlan::from_actions(vec![
            RebaseAction::new(short(fx.first), ActionKind::Pick),
            RebaseAction::reword(short(fx.second), "fix: typo"),
        ])
        .unwrap();
        write_plan_file(&plan, &fx.path().join(".git").join("custom.txt")).unwrap();

        let out = toolbox.call(
            START,
            &json!({"base_commit": short(fx.base), "rebase_plan": ".git/custom.txt"}),
        );
        assert_eq!(
            out.message,
            format!("Rebase of 2 step(s) started onto {}. Rebase finished", short(fx.base))
        );
        assert_eq!(toolbox.state(), RebaseState::Finished);
        let message = fx.repo.head().unwrap().peel_to_commit().unwrap();
        assert_eq!(message.summary(), Some("fix: typo"));

        let out = toolbox.call(START, &json!({"base_commit": "nope"}));
        assert!(!out.success);
        assert!(out.message.contains("unused.txt"));
    }
}
