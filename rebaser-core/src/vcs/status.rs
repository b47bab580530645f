use git2::{Error, Oid, Repository, RepositoryState, StatusOptions};
use std::path::{Path, PathBuf};

pub fn repo_root_in<P: AsRef<Path>>(repo_path: P) -> Result<PathBuf, Error> {
    let repo = Repository::discover(repo_path)?;
    repo.workdir()
        .map(|dir| dir.to_path_buf())
        .ok_or_else(|| Error::from_str("repository has no working directory"))
}

pub fn git_dir_in<P: AsRef<Path>>(repo_path: P) -> Result<PathBuf, Error> {
    let repo = Repository::open(repo_path)?;
    Ok(repo.path().to_path_buf())
}

/// Resolve any revision expression to a commit id; `Ok(None)` when it names nothing.
pub fn resolve_commit_in<P: AsRef<Path>>(repo_path: P, spec: &str) -> Result<Option<Oid>, Error> {
    let repo = Repository::open(repo_path)?;
    let Ok(object) = repo.revparse_single(spec.trim()) else {
        return Ok(None);
    };
    Ok(object.peel_to_commit().ok().map(|commit| commit.id()))
}

/// Reject tracked modifications; untracked files are left alone.
pub fn ensure_clean_worktree_in<P: AsRef<Path>>(repo_path: P) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(false)
        .include_ignored(false)
        .exclude_submodules(true);
    let statuses = repo.statuses(Some(&mut opts))?;
    if statuses.is_empty() {
        Ok(())
    } else {
        Err(Error::from_str("working tree has uncommitted changes"))
    }
}

/// Name of the repository operation in progress (merge, rebase, ...), if any.
pub fn operation_in_progress_in<P: AsRef<Path>>(repo_path: P) -> Result<Option<String>, Error> {
    let repo = Repository::open(repo_path)?;
    let label = match repo.state() {
        RepositoryState::Clean => return Ok(None),
        RepositoryState::Merge => "merge",
        RepositoryState::Revert | RepositoryState::RevertSequence => "revert",
        RepositoryState::CherryPick | RepositoryState::CherryPickSequence => "cherry-pick",
        RepositoryState::Bisect => "bisect",
        RepositoryState::Rebase
        | RepositoryState::RebaseInteractive
        | RepositoryState::RebaseMerge => "rebase",
        RepositoryState::ApplyMailbox | RepositoryState::ApplyMailboxOrRebase => "am",
    };
    Ok(Some(label.to_string()))
}
