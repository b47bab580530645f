//! Interactive history rewrite driven as an explicit state machine.
//!
//! A [`Session`] owns one `git rebase -i` run against a working repository. It is created by
//! [`Session::start`] (or reattached with [`Session::recover`]) and every later step goes
//! through it: file edits on a paused commit, conflict resolution, resume, abort and finish.
//! The engine keeps its own artifacts under `<git-dir>/rebaser/` and leaves the repository
//! either mid-rewrite in a state git understands, or back where it started.

mod artifacts;
mod file_ops;
mod git;

use chrono::{DateTime, Utc};
use git2::Oid;
use rebaser_kernel::RebasePlan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::vcs::{self, HeadTarget};
use artifacts::Artifacts;
use file_ops::EditContext;

pub use artifacts::SessionRecord;
pub use file_ops::{FileEdit, FileOpError, FileOperation, OperationType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebaseState {
    UnStarted,
    InProgress,
    Conflict,
    Finished,
}

impl RebaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebaseState::UnStarted => "UN_STARTED",
            RebaseState::InProgress => "IN_PROGRESS",
            RebaseState::Conflict => "CONFLICT",
            RebaseState::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for RebaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a state-advancing call left the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Paused {
        remaining: usize,
        stopped_at: Option<String>,
    },
    Conflicted {
        paths: Vec<String>,
    },
    Finished,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Paused {
                remaining,
                stopped_at,
            } => {
                let at = stopped_at
                    .as_deref()
                    .map(|sha| format!(" at {}", &sha[..7.min(sha.len())]))
                    .unwrap_or_default();
                write!(f, "Rebase paused{at}; {remaining} step(s) remaining")
            }
            StepOutcome::Conflicted { paths } => {
                write!(f, "Rebase stopped with conflicts in: {}", paths.join(", "))
            }
            StepOutcome::Finished => f.write_str("Rebase finished"),
        }
    }
}

/// Resolved content for one conflicted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct MergeResolution {
    pub file_path: String,
    /// Full file content with every conflict marker removed.
    pub content: String,
}

#[derive(Debug, Error)]
pub enum RebaseError {
    #[error("commit `{0}` not found")]
    CommitNotFound(String),
    #[error("commit `{sha}` is not in {base}..HEAD")]
    OutsideRange { sha: String, base: String },
    #[error("no rebase session is active")]
    NoActiveSession,
    #[error("no conflicts to resolve")]
    NoActiveConflict,
    #[error("a rebase session started at {0} is already active")]
    SessionActive(DateTime<Utc>),
    #[error("a {0} is already in progress in this repository")]
    OperationInProgress(String),
    #[error("working tree has uncommitted changes")]
    DirtyWorktree,
    #[error("{0}")]
    InvalidOperation(String),
    #[error("{}", join_failures(.0))]
    EditRejected(Vec<FileOpError>),
    #[error("{}", join_failures(.0))]
    EditFailed(Vec<FileOpError>),
    #[error("`{command}` failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error("session record is unreadable: {0}")]
    Record(#[from] serde_json::Error),
    #[error(transparent)]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn join_failures(failures: &[FileOpError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug)]
pub struct Session {
    repo_root: PathBuf,
    artifacts: Artifacts,
    record: SessionRecord,
    state: RebaseState,
    /// Where HEAD was before an edit that failed after checking out its commit.
    return_head: Option<HeadTarget>,
}

impl Session {
    /// Start rewriting `base..HEAD` according to `plan`.
    ///
    /// Fails without touching the repository when `base` or any plan sha does not resolve
    /// into the range, when another operation or session is active, or when tracked files
    /// are modified. If git fails without leaving conflicts, the half-started rewrite is
    /// aborted before the error is returned.
    pub fn start(
        repo_root: &Path,
        base: &str,
        plan: &RebasePlan,
    ) -> Result<(Self, StepOutcome), RebaseError> {
        let repo_root = vcs::repo_root_in(repo_root)?;
        let artifacts = Artifacts::for_repo(&repo_root)?;

        if let Some(existing) = artifacts.load()? {
            return Err(RebaseError::SessionActive(existing.started_at));
        }
        if let Some(operation) = vcs::operation_in_progress_in(&repo_root)? {
            return Err(RebaseError::OperationInProgress(operation));
        }
        if vcs::ensure_clean_worktree_in(&repo_root).is_err() {
            return Err(RebaseError::DirtyWorktree);
        }

        let base_oid = vcs::resolve_commit_in(&repo_root, base)?
            .ok_or_else(|| RebaseError::CommitNotFound(base.to_string()))?;
        let head_oid = vcs::resolve_commit_in(&repo_root, "HEAD")?
            .ok_or_else(|| RebaseError::CommitNotFound("HEAD".to_string()))?;
        let head_name = match vcs::head_target_in(&repo_root)? {
            HeadTarget::Branch(name) => Some(name),
            HeadTarget::Detached(_) => None,
        };

        let in_range: HashSet<Oid> = vcs::range_oids_in(&repo_root, base_oid, head_oid)?
            .into_iter()
            .collect();
        let plan = plan.map_shas(|sha| {
            let oid = vcs::resolve_commit_in(&repo_root, sha)?
                .ok_or_else(|| RebaseError::CommitNotFound(sha.to_string()))?;
            if !in_range.contains(&oid) {
                return Err(RebaseError::OutsideRange {
                    sha: sha.to_string(),
                    base: base.to_string(),
                });
            }
            Ok(oid.to_string())
        })?;

        let record = SessionRecord {
            id: Uuid::new_v4(),
            base: base_oid.to_string(),
            orig_head: head_oid.to_string(),
            head_name,
            started_at: Utc::now(),
            plan,
        };
        artifacts.write(&record)?;
        tracing::info!(
            session = %record.id,
            base = %record.base,
            steps = record.plan.len(),
            "starting rebase"
        );

        let mut session = Session {
            repo_root,
            artifacts,
            record,
            state: RebaseState::InProgress,
            return_head: None,
        };

        let output = git::rebase_start(&session.repo_root, &session.record.base, &session.artifacts);
        let settled = output.and_then(|output| session.settle(output));
        match settled {
            Ok(outcome) => Ok((session, outcome)),
            Err(err) => {
                tracing::warn!(error = %err, "rebase failed to start; rolling back");
                session.discard_failed_start();
                Err(err)
            }
        }
    }

    /// Reattach to a rewrite started by an earlier process, if one is recorded on disk.
    pub fn recover(repo_root: &Path) -> Result<Option<Self>, RebaseError> {
        let repo_root = vcs::repo_root_in(repo_root)?;
        let artifacts = Artifacts::for_repo(&repo_root)?;
        let Some(record) = artifacts.load()? else {
            return Ok(None);
        };

        let state = if artifacts.rebase_dir().is_none() {
            RebaseState::Finished
        } else if vcs::list_conflicted_paths_in(&repo_root)?.is_empty() {
            RebaseState::InProgress
        } else {
            RebaseState::Conflict
        };
        tracing::debug!(session = %record.id, %state, "recovered rebase session");

        Ok(Some(Session {
            repo_root,
            artifacts,
            record,
            state,
            return_head: None,
        }))
    }

    pub fn state(&self) -> RebaseState {
        self.state
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Steps git still has to replay; zero once the rewrite is finished or gone.
    pub fn remaining_steps(&self) -> usize {
        match self.state {
            RebaseState::InProgress | RebaseState::Conflict => self.artifacts.remaining_steps(),
            RebaseState::UnStarted | RebaseState::Finished => 0,
        }
    }

    pub fn conflicted_paths(&self) -> Result<Vec<String>, RebaseError> {
        Ok(vcs::list_conflicted_paths_in(&self.repo_root)?)
    }

    /// Apply `operations` to `commit_sha` and amend it in place, keeping its message.
    ///
    /// Returns the id of the amended commit. When any operation fails nothing is amended,
    /// HEAD stays on the commit under edit and its index and worktree are reset, so a
    /// corrected retry starts from the same place as the first attempt. The HEAD seen before
    /// the failed attempt is restored by the next successful edit or by [`Session::resume`].
    pub fn edit(
        &mut self,
        commit_sha: &str,
        operations: Vec<FileOperation>,
    ) -> Result<String, RebaseError> {
        match self.state {
            RebaseState::InProgress => {}
            RebaseState::UnStarted => return Err(RebaseError::NoActiveSession),
            RebaseState::Conflict => {
                return Err(RebaseError::InvalidOperation(
                    "resolve the current conflicts before editing commits".to_string(),
                ));
            }
            RebaseState::Finished => {
                return Err(RebaseError::InvalidOperation(
                    "the rebase has already replayed every commit".to_string(),
                ));
            }
        }

        let (edits, rejected): (Vec<_>, Vec<_>) = operations
            .into_iter()
            .map(FileOperation::into_edit)
            .partition(Result::is_ok);
        if !rejected.is_empty() {
            return Err(RebaseError::EditRejected(
                rejected.into_iter().filter_map(Result::err).collect(),
            ));
        }
        let edits: Vec<FileEdit> = edits.into_iter().filter_map(Result::ok).collect();

        let commit = vcs::resolve_commit_in(&self.repo_root, commit_sha)?
            .ok_or_else(|| RebaseError::CommitNotFound(commit_sha.to_string()))?;
        if vcs::ensure_clean_worktree_in(&self.repo_root).is_err() {
            return Err(RebaseError::DirtyWorktree);
        }

        let head = vcs::resolve_commit_in(&self.repo_root, "HEAD")?;
        let moved = head != Some(commit);
        let return_to = match self.return_head.clone() {
            Some(target) => Some(target),
            None if moved => Some(vcs::head_target_in(&self.repo_root)?),
            None => None,
        };
        if moved {
            vcs::checkout_detached_in(&self.repo_root, commit)?;
        }
        self.return_head = return_to.clone();

        let mut context = EditContext::new(&self.repo_root, commit);
        let failures: Vec<FileOpError> = edits
            .iter()
            .filter_map(|edit| context.apply(edit).err())
            .collect();

        if !failures.is_empty() {
            tracing::warn!(commit = %commit, failures = failures.len(), "edit failed; rolling back");
            vcs::reset_hard_in(&self.repo_root, commit)?;
            for path in context.created() {
                if path.is_file() {
                    fs::remove_file(path)?;
                }
            }
            return Err(RebaseError::EditFailed(failures));
        }

        let amended = vcs::amend_head_in(&self.repo_root)?;
        if let Some(target) = return_to {
            vcs::restore_head_in(&self.repo_root, &target)?;
        }
        self.return_head = None;
        tracing::info!(commit = %commit, amended = %amended, edits = edits.len(), "amended commit");
        Ok(amended.to_string())
    }

    /// Write and stage resolved content. Does not advance the rewrite.
    pub fn resolve(&mut self, resolutions: &[MergeResolution]) -> Result<StepOutcome, RebaseError> {
        if !matches!(self.state, RebaseState::InProgress | RebaseState::Conflict) {
            return Err(RebaseError::NoActiveConflict);
        }
        let conflicts = vcs::list_conflicted_paths_in(&self.repo_root)?;
        if conflicts.is_empty() {
            return Err(RebaseError::NoActiveConflict);
        }
        if resolutions.is_empty() {
            return Ok(StepOutcome::Conflicted { paths: conflicts });
        }

        for resolution in resolutions {
            vcs::stage_resolution_in(&self.repo_root, &resolution.file_path, &resolution.content)?;
        }

        let remaining = vcs::list_conflicted_paths_in(&self.repo_root)?;
        if !remaining.is_empty() {
            self.state = RebaseState::Conflict;
            return Ok(StepOutcome::Conflicted { paths: remaining });
        }

        tracing::info!(resolved = resolutions.len(), "conflicts resolved");
        if self.artifacts.rebase_dir().is_none() {
            self.state = RebaseState::Finished;
            return Ok(StepOutcome::Finished);
        }
        self.state = RebaseState::InProgress;
        self.paused()
    }

    /// Continue the rewrite past the current stop.
    pub fn resume(&mut self) -> Result<StepOutcome, RebaseError> {
        match self.state {
            RebaseState::UnStarted => return Err(RebaseError::NoActiveSession),
            RebaseState::Finished => return Ok(StepOutcome::Finished),
            RebaseState::InProgress | RebaseState::Conflict => {}
        }
        self.return_to_edit_origin()?;
        let output = git::rebase_continue(&self.repo_root, &self.artifacts)?;
        self.settle(output)
    }

    /// Put the repository back the way it was before [`Session::start`].
    pub fn abort(&mut self) -> Result<(), RebaseError> {
        match self.state {
            RebaseState::UnStarted => return Err(RebaseError::NoActiveSession),
            RebaseState::InProgress | RebaseState::Conflict
                if self.artifacts.rebase_dir().is_some() =>
            {
                let output = git::rebase_abort(&self.repo_root, &self.artifacts)?;
                if !output.success {
                    return Err(output.into_error());
                }
            }
            _ => self.reset_to_orig_head()?,
        }

        self.artifacts.clear()?;
        self.state = RebaseState::UnStarted;
        self.return_head = None;
        tracing::info!(session = %self.record.id, "rebase aborted");
        Ok(())
    }

    /// Drive the rewrite to completion and drop the session artifacts.
    ///
    /// Each step must replay at least one commit; a step that leaves the remaining count
    /// unchanged fails instead of looping. Conflicts are returned as they appear.
    pub fn finish(&mut self) -> Result<StepOutcome, RebaseError> {
        if self.state == RebaseState::UnStarted {
            return Err(RebaseError::NoActiveSession);
        }

        let mut last_remaining = self.remaining_steps();
        while self.state != RebaseState::Finished {
            match self.resume()? {
                StepOutcome::Conflicted { paths } => {
                    return Ok(StepOutcome::Conflicted { paths });
                }
                StepOutcome::Finished => break,
                StepOutcome::Paused { remaining, .. } => {
                    if remaining >= last_remaining {
                        return Err(RebaseError::InvalidOperation(format!(
                            "rebase made no progress ({remaining} step(s) still remaining)"
                        )));
                    }
                    last_remaining = remaining;
                }
            }
        }

        self.artifacts.clear()?;
        self.state = RebaseState::UnStarted;
        self.return_head = None;
        tracing::info!(session = %self.record.id, "rebase finished");
        Ok(StepOutcome::Finished)
    }

    /// Put HEAD back where it was before a failed edit moved it, so git continues from the
    /// commit it stopped at.
    fn return_to_edit_origin(&mut self) -> Result<(), RebaseError> {
        if let Some(target) = self.return_head.take() {
            vcs::restore_head_in(&self.repo_root, &target)?;
        }
        Ok(())
    }

    fn settle(&mut self, output: git::GitOutput) -> Result<StepOutcome, RebaseError> {
        let conflicts = vcs::list_conflicted_paths_in(&self.repo_root)?;
        if !conflicts.is_empty() {
            tracing::info!(paths = conflicts.len(), "rebase stopped on conflicts");
            self.state = RebaseState::Conflict;
            return Ok(StepOutcome::Conflicted { paths: conflicts });
        }
        if !output.success {
            return Err(output.into_error());
        }
        if self.artifacts.rebase_dir().is_some() {
            self.state = RebaseState::InProgress;
            return self.paused();
        }
        self.state = RebaseState::Finished;
        tracing::info!(session = %self.record.id, "rebase replayed every step");
        Ok(StepOutcome::Finished)
    }

    fn paused(&self) -> Result<StepOutcome, RebaseError> {
        let stopped_at = vcs::resolve_commit_in(&self.repo_root, "HEAD")?.map(|oid| oid.to_string());
        Ok(StepOutcome::Paused {
            remaining: self.artifacts.remaining_steps(),
            stopped_at,
        })
    }

    fn reset_to_orig_head(&self) -> Result<(), RebaseError> {
        let orig = Oid::from_str(&self.record.orig_head)?;
        match self.record.head_name.as_deref() {
            Some(branch) => vcs::reset_branch_in(&self.repo_root, branch, orig)?,
            None => vcs::checkout_detached_in(&self.repo_root, orig)?,
        }
        Ok(())
    }

    fn discard_failed_start(&mut self) {
        if self.artifacts.rebase_dir().is_some()
            && let Err(err) = git::rebase_abort(&self.repo_root, &self.artifacts)
        {
            tracing::warn!(error = %err, "could not abort the half-started rebase");
        }
        if let Err(err) = self.artifacts.clear() {
            tracing::warn!(error = %err, "could not remove session artifacts");
        }
        self.state = RebaseState::UnStarted;
    }
}
