use serde::{Deserialize, Serialize};

pub const INITIAL_COMMIT_NOTE: &str = "Initial commit - no diff available";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileChangeKind {
    Added,
    Deleted,
    Renamed,
    Copied,
    Modified,
    /// Placeholder record for a root commit, which has no parent to diff against.
    Initial,
}

/// One per-file change record inside a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: FileChangeKind,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    #[serde(default)]
    pub patch: String,
}

impl FileChange {
    pub fn initial() -> Self {
        Self {
            kind: FileChangeKind::Initial,
            path: String::new(),
            old_path: None,
            patch: String::new(),
        }
    }

    pub fn header(&self) -> String {
        let old = self.old_path.as_deref().unwrap_or(&self.path);
        match self.kind {
            FileChangeKind::Added => format!("File added: {}", self.path),
            FileChangeKind::Deleted => format!("{} deleted", self.path),
            FileChangeKind::Renamed => format!("File renamed: {} -> {}", old, self.path),
            FileChangeKind::Copied => format!("File copied from {} to {}", old, self.path),
            FileChangeKind::Modified => format!("File changed: {}", self.path),
            FileChangeKind::Initial => INITIAL_COMMIT_NOTE.to_string(),
        }
    }

    /// Header plus patch text; with `elide_hunks` only the header survives.
    pub fn render(&self, elide_hunks: bool) -> String {
        if elide_hunks || self.patch.trim().is_empty() {
            return self.header();
        }
        let mut out = self.header();
        out.push('\n');
        out.push_str(self.patch.trim_end());
        out
    }
}

/// A commit as presented to the planner: id, subject line, per-file changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    pub message: String,
    pub diff: Vec<FileChange>,
}

impl CommitSummary {
    pub fn short_id(&self) -> &str {
        &self.id[..7.min(self.id.len())]
    }

    /// True when `wanted` names this commit, either in full or by an unambiguous-looking prefix.
    pub fn is_named_by(&self, wanted: &str) -> bool {
        let wanted = wanted.trim();
        wanted.len() >= 4 && self.id.starts_with(&wanted.to_ascii_lowercase())
    }
}
