use git2::{Error, Index, Repository};
use std::fs;
use std::path::Path;

use super::normalize_pathspec;

pub fn list_conflicted_paths_in<P: AsRef<Path>>(repo_path: P) -> Result<Vec<String>, Error> {
    let repo = Repository::open(repo_path)?;
    let mut index = repo.index()?;
    if !index.has_conflicts() {
        return Ok(Vec::new());
    }
    Ok(collect_conflict_paths(&mut index))
}

fn collect_conflict_paths(index: &mut Index) -> Vec<String> {
    let mut files = Vec::new();
    if let Ok(mut conflicts) = index.conflicts() {
        for conflict in conflicts.by_ref().flatten() {
            let path_bytes = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
                .map(|entry| entry.path.clone());
            if let Some(bytes) = path_bytes {
                let path = String::from_utf8_lossy(&bytes).to_string();
                files.push(path);
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

/// Write resolved content for a conflicted path and stage it, clearing its conflict entries.
pub fn stage_resolution_in<P: AsRef<Path>>(
    repo_path: P,
    path: &str,
    content: &str,
) -> Result<(), Error> {
    let repo = Repository::open(repo_path)?;
    let workdir = repo
        .workdir()
        .ok_or_else(|| Error::from_str("repository has no working directory"))?;
    let norm = normalize_pathspec(path);
    let target = workdir.join(&norm);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|err| Error::from_str(&err.to_string()))?;
    }
    fs::write(&target, content).map_err(|err| Error::from_str(&err.to_string()))?;

    let mut index = repo.index()?;
    index.add_path(Path::new(&norm))?;
    index.write()
}
