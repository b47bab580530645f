use git2::build::RepoBuilder;
use git2::{Delta, Diff, DiffFindOptions, DiffLine, DiffOptions, Oid, Patch, Repository, Sort};
use rebaser_kernel::{CommitSummary, FileChange, FileChangeKind};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("commit `{0}` not found")]
    CommitNotFound(String),
    #[error("`{0}` is both the start and the end of the range; nothing to read")]
    EmptyRange(String),
    #[error(transparent)]
    Git(#[from] git2::Error),
}

/// Open the repository at `path`, cloning `url` into it first when nothing is there yet.
pub fn open_or_clone(path: &Path, url: Option<&str>) -> Result<Repository, git2::Error> {
    if path.exists() {
        return Repository::open(path);
    }
    match url {
        Some(url) => {
            tracing::info!(url, path = %path.display(), "cloning repository");
            RepoBuilder::new().clone(url, path)
        }
        None => Err(git2::Error::from_str(&format!(
            "{} does not exist and no clone url was given",
            path.display()
        ))),
    }
}

pub fn read_history_in<P: AsRef<Path>>(
    repo_path: P,
    start: &str,
    end: &str,
) -> Result<Vec<CommitSummary>, HistoryError> {
    let repo = Repository::open(repo_path)?;
    read_history(&repo, start, end)
}

/// Commits in `start..end`, oldest first.
pub fn read_history(
    repo: &Repository,
    start: &str,
    end: &str,
) -> Result<Vec<CommitSummary>, HistoryError> {
    let start_oid = resolve(repo, start)?;
    let end_oid = resolve(repo, end)?;
    if start_oid == end_oid {
        return Err(HistoryError::EmptyRange(start.to_string()));
    }

    let mut walk = repo.revwalk()?;
    walk.push(end_oid)?;
    walk.hide(start_oid)?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;

    let mut history = Vec::new();
    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        let message = commit
            .message()
            .unwrap_or_default()
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();

        let diff = if commit.parent_count() == 0 {
            vec![FileChange::initial()]
        } else {
            let parent_tree = commit.parent(0)?.tree()?;
            let tree = commit.tree()?;
            let mut opts = DiffOptions::new();
            opts.ignore_submodules(true);
            let mut diff =
                repo.diff_tree_to_tree(Some(&parent_tree), Some(&tree), Some(&mut opts))?;
            let mut find = DiffFindOptions::new();
            find.renames(true).copies(true);
            diff.find_similar(Some(&mut find))?;
            file_changes(&diff)?
        };

        history.push(CommitSummary {
            id: commit.id().to_string(),
            message,
            diff,
        });
    }

    tracing::debug!(commits = history.len(), start, end, "read commit history");
    Ok(history)
}

/// Ids of the commits reachable from `head` but not from `base`.
pub fn range_oids_in<P: AsRef<Path>>(
    repo_path: P,
    base: Oid,
    head: Oid,
) -> Result<Vec<Oid>, git2::Error> {
    let repo = Repository::open(repo_path)?;
    let mut walk = repo.revwalk()?;
    walk.push(head)?;
    walk.hide(base)?;
    walk.collect()
}

fn resolve(repo: &Repository, spec: &str) -> Result<Oid, HistoryError> {
    repo.revparse_single(spec.trim())
        .and_then(|object| object.peel_to_commit())
        .map(|commit| commit.id())
        .map_err(|_| HistoryError::CommitNotFound(spec.to_string()))
}

fn file_changes(diff: &Diff<'_>) -> Result<Vec<FileChange>, git2::Error> {
    let mut changes = Vec::new();

    for (idx, delta) in diff.deltas().enumerate() {
        let new_path = delta.new_file().path().map(|p| p.to_string_lossy().to_string());
        let old_path = delta.old_file().path().map(|p| p.to_string_lossy().to_string());

        let (kind, path, old) = match delta.status() {
            Delta::Added => (FileChangeKind::Added, new_path, None),
            Delta::Deleted => (FileChangeKind::Deleted, old_path, None),
            Delta::Renamed => (FileChangeKind::Renamed, new_path, old_path),
            Delta::Copied => (FileChangeKind::Copied, new_path, old_path),
            _ => (FileChangeKind::Modified, new_path, None),
        };

        let mut buf = Vec::new();
        if let Some(patch) = Patch::from_diff(diff, idx)? {
            for hunk_idx in 0..patch.num_hunks() {
                let (hunk, lines) = patch.hunk(hunk_idx)?;
                buf.extend_from_slice(hunk.header());
                for line_idx in 0..lines {
                    append_patch_line(&mut buf, patch.line_in_hunk(hunk_idx, line_idx)?);
                }
            }
        }

        changes.push(FileChange {
            kind,
            path: path.unwrap_or_default(),
            old_path: old,
            patch: String::from_utf8_lossy(&buf).to_string(),
        });
    }

    Ok(changes)
}

fn append_patch_line(buf: &mut Vec<u8>, line: DiffLine<'_>) {
    let origin = line.origin();
    if matches!(origin, '+' | '-' | ' ') {
        buf.push(origin as u8);
    }
    buf.extend_from_slice(line.content());
}
