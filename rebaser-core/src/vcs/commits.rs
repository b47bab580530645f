use git2::build::CheckoutBuilder;
use git2::{Error, ErrorCode, Index, Oid, Repository};
use std::path::Path;

use super::normalize_pathspec;

/// Stage a single worktree path, mirroring `git add <path>`.
pub fn stage_path_in<P: AsRef<Path>>(repo_path: P, path: &str) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    let norm = normalize_pathspec(path);
    index.add_path(Path::new(&norm))?;
    index.write()
}

/// Drop a path from the index, mirroring the index half of `git rm`.
pub fn remove_path_in<P: AsRef<Path>>(repo_path: P, path: &str) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    let norm = normalize_pathspec(path);
    remove_path_allow_missing(&mut index, Path::new(&norm))?;
    index.write()
}

fn remove_path_allow_missing(index: &mut Index, path: &Path) -> Result<(), Error> {
    match index.remove_path(path) {
        Ok(()) => Ok(()),
        Err(err) if err.code() == ErrorCode::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Contents of `path` in the first parent of `commit`, when `commit` changed it.
///
/// `None` for root commits, paths the commit left untouched and paths the commit added.
pub fn parent_blob_in<P: AsRef<Path>>(
    repo_path: P,
    commit: Oid,
    path: &str,
) -> Result<Option<Vec<u8>>, Error> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.find_commit(commit)?;
    if commit.parent_count() == 0 {
        return Ok(None);
    }
    let parent = commit.parent(0)?;
    let norm = normalize_pathspec(path);
    let rel = Path::new(&norm);

    let before = match parent.tree()?.get_path(rel) {
        Ok(entry) => entry,
        Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let after = match commit.tree()?.get_path(rel) {
        Ok(entry) => Some(entry.id()),
        Err(err) if err.code() == ErrorCode::NotFound => None,
        Err(err) => return Err(err),
    };
    if after == Some(before.id()) {
        return Ok(None);
    }

    let blob = repo.find_blob(before.id())?;
    Ok(Some(blob.content().to_vec()))
}

/// Amend HEAD with the current index, keeping its message. Works on a detached HEAD.
pub fn amend_head_in<P: AsRef<Path>>(repo_path: P) -> Result<Oid, Error> {
    let repo = Repository::open(repo_path)?;
    let head = repo.head()?;
    let mut index = repo.index()?;
    if index.has_conflicts() {
        return Err(Error::from_str(
            "cannot amend commit while conflicts remain",
        ));
    }
    index.write()?;
    let tree_oid = index.write_tree_to(&repo)?;
    let tree = repo.find_tree(tree_oid)?;
    let head_commit = head.peel_to_commit()?;
    let sig = repo.signature()?;
    let oid = head_commit.amend(Some("HEAD"), None, Some(&sig), None, None, Some(&tree))?;

    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_head(Some(&mut checkout))?;

    Ok(oid)
}
