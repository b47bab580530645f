use git2::build::CheckoutBuilder;
use git2::{BranchType, Error, Oid, Repository};
use std::path::Path;

/// Where HEAD pointed before a temporary checkout, so it can be put back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadTarget {
    Branch(String),
    Detached(Oid),
}

pub fn head_target_in<P: AsRef<Path>>(repo_path: P) -> Result<HeadTarget, Error> {
    let repo = Repository::open(repo_path)?;
    let head = repo.head()?;
    if head.is_branch()
        && let Some(name) = head.shorthand()
    {
        return Ok(HeadTarget::Branch(name.to_string()));
    }
    let oid = head
        .target()
        .ok_or_else(|| Error::from_str("HEAD has no direct target"))?;
    Ok(HeadTarget::Detached(oid))
}

pub fn checkout_branch_in<P: AsRef<Path>>(repo_path: P, name: &str) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.find_branch(name, BranchType::Local)?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    repo.checkout_head(Some(&mut checkout))
}

pub fn checkout_detached_in<P: AsRef<Path>>(repo_path: P, oid: Oid) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.find_commit(oid)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;
    repo.set_head_detached(oid)
}

/// Return HEAD to a previously captured target (`git checkout -`).
pub fn restore_head_in<P: AsRef<Path>>(repo_path: P, target: &HeadTarget) -> Result<(), Error> {
    match target {
        HeadTarget::Branch(name) => checkout_branch_in(repo_path, name),
        HeadTarget::Detached(oid) => checkout_detached_in(repo_path, *oid),
    }
}

/// Hard reset of HEAD, index and worktree to `oid`.
///
/// Unlike `Repository::reset`, this leaves `.git/rebase-merge` and friends in place, so it is
/// safe to call while git is stopped in the middle of a rebase.
pub fn reset_hard_in<P: AsRef<Path>>(repo_path: P, oid: Oid) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.find_commit(oid)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))?;

    let mut index = repo.index()?;
    index.read_tree(&commit.tree()?)?;
    index.write()?;

    let head = repo.head()?;
    match head.name() {
        Some(name) if head.is_branch() => {
            repo.reference(name, oid, true, "rebaser: reset")?;
            Ok(())
        }
        _ => repo.set_head_detached(oid),
    }
}

/// Point `refs/heads/<name>` at `oid`, check it out and reset the tree to match.
pub fn reset_branch_in<P: AsRef<Path>>(repo_path: P, name: &str, oid: Oid) -> Result<(), Error> {
    let path = repo_path.as_ref();
    let repo = Repository::open(path)?;
    repo.find_commit(oid)?;
    repo.reference(&format!("refs/heads/{name}"), oid, true, "rebaser: reset branch")?;
    repo.set_head(&format!("refs/heads/{name}"))?;
    reset_hard_in(path, oid)
}
