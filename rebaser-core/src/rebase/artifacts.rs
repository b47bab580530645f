use chrono::{DateTime, Utc};
use rebaser_kernel::RebasePlan;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::RebaseError;
use crate::vcs;

const ARTIFACT_DIR: &str = "rebaser";
const SEQUENCE_FILE: &str = "sequence";
const EDITOR_SCRIPT: &str = "reword-editor.sh";
const RECORD_FILE: &str = "session.json";

/// What a session needs to survive a process restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub base: String,
    pub orig_head: String,
    /// Branch that was checked out when the session started; `None` for a detached HEAD.
    pub head_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub plan: RebasePlan,
}

/// Files the engine keeps under `<git-dir>/rebaser/`, plus read access to git's own
/// `rebase-merge` state.
#[derive(Debug, Clone)]
pub(crate) struct Artifacts {
    git_dir: PathBuf,
    dir: PathBuf,
}

impl Artifacts {
    pub(crate) fn for_repo(repo_root: &Path) -> Result<Self, RebaseError> {
        let git_dir = vcs::git_dir_in(repo_root)?;
        let dir = git_dir.join(ARTIFACT_DIR);
        Ok(Self { git_dir, dir })
    }

    pub(crate) fn sequence_path(&self) -> PathBuf {
        self.dir.join(SEQUENCE_FILE)
    }

    pub(crate) fn editor_path(&self) -> PathBuf {
        self.dir.join(EDITOR_SCRIPT)
    }

    fn record_path(&self) -> PathBuf {
        self.dir.join(RECORD_FILE)
    }

    pub(crate) fn has_record(&self) -> bool {
        self.record_path().is_file()
    }

    pub(crate) fn write(&self, record: &SessionRecord) -> Result<(), RebaseError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.sequence_path(), record.plan.to_sequencer())?;
        fs::write(self.editor_path(), editor_script(&self.done_path()))?;
        fs::write(self.record_path(), serde_json::to_string_pretty(record)?)?;
        Ok(())
    }

    pub(crate) fn load(&self) -> Result<Option<SessionRecord>, RebaseError> {
        match fs::read_to_string(self.record_path()) {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) fn clear(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// git's interactive rewrite state directory, when a rewrite is underway.
    pub(crate) fn rebase_dir(&self) -> Option<PathBuf> {
        ["rebase-merge", "rebase-apply"]
            .iter()
            .map(|name| self.git_dir.join(name))
            .find(|path| path.is_dir())
    }

    fn done_path(&self) -> PathBuf {
        self.git_dir.join("rebase-merge").join("done")
    }

    /// Steps git still has to replay, counted from its todo list.
    pub(crate) fn remaining_steps(&self) -> usize {
        let Some(dir) = self.rebase_dir() else {
            return 0;
        };
        fs::read_to_string(dir.join("git-rebase-todo"))
            .map(|todo| count_steps(&todo))
            .unwrap_or(0)
    }
}

fn count_steps(todo: &str) -> usize {
    todo.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .count()
}

pub(crate) fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Commit-message editor for the session. When the step git just replayed is a
/// `reword <sha> # <message>` line, the message after `# ` replaces the commit message;
/// every other message (squash, conflict continuation) is left as git prepared it.
fn editor_script(done_path: &Path) -> String {
    format!(
        r#"#!/bin/sh
line=$(tail -n 1 {done} 2>/dev/null)
case "$line" in
    reword\ *|r\ *)
        message=$(printf '%s\n' "$line" | sed -n 's/^[a-z]*[[:space:]][[:space:]]*[0-9a-fA-F]*[[:space:]][[:space:]]*# //p')
        if [ -n "$message" ]; then
            printf '%s\n' "$message" > "$1"
        fi
        ;;
esac
exit 0
"#,
        done = shell_quote(done_path)
    )
}
