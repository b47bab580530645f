use std::path::Path;
use std::process::Command;

use super::RebaseError;
use super::artifacts::{Artifacts, shell_quote};

#[derive(Debug, Clone)]
pub(crate) struct GitOutput {
    pub(crate) command: String,
    pub(crate) success: bool,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

impl GitOutput {
    pub(crate) fn into_error(self) -> RebaseError {
        let detail = if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        };
        RebaseError::Command {
            command: self.command,
            stderr: detail,
        }
    }
}

/// `git rebase -i <base>` with the session's sequencer copied in as the todo list.
pub(crate) fn rebase_start(
    repo_root: &Path,
    base: &str,
    artifacts: &Artifacts,
) -> Result<GitOutput, RebaseError> {
    let sequence_editor = format!("cp {}", shell_quote(&artifacts.sequence_path()));
    run(
        repo_root,
        &["rebase", "-i", base],
        &[("GIT_SEQUENCE_EDITOR", sequence_editor.as_str())],
        artifacts,
    )
}

pub(crate) fn rebase_continue(
    repo_root: &Path,
    artifacts: &Artifacts,
) -> Result<GitOutput, RebaseError> {
    run(repo_root, &["rebase", "--continue"], &[], artifacts)
}

pub(crate) fn rebase_abort(repo_root: &Path, artifacts: &Artifacts) -> Result<GitOutput, RebaseError> {
    run(repo_root, &["rebase", "--abort"], &[], artifacts)
}

fn run(
    repo_root: &Path,
    args: &[&str],
    envs: &[(&str, &str)],
    artifacts: &Artifacts,
) -> Result<GitOutput, RebaseError> {
    let command = format!("git {}", args.join(" "));
    let editor = format!("sh {}", shell_quote(&artifacts.editor_path()));

    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(repo_root)
        .args(args)
        .env("GIT_EDITOR", &editor)
        .env("GIT_MERGE_AUTOEDIT", "no")
        .env("GIT_TERMINAL_PROMPT", "0");
    for (key, value) in envs {
        cmd.env(key, value);
    }

    tracing::debug!(%command, repo = %repo_root.display(), "running git");
    let output = cmd.output()?;

    let result = GitOutput {
        command,
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    };
    if !result.success {
        tracing::debug!(command = %result.command, stderr = %result.stderr.trim(), "git exited unsuccessfully");
    }
    Ok(result)
}
