use git2::Oid;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

use crate::vcs;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Modify,
    Restore,
    Delete,
    Rename,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Modify => "modify",
            OperationType::Restore => "restore",
            OperationType::Delete => "delete",
            OperationType::Rename => "rename",
        }
    }
}

/// A file operation as requested over the tool contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FileOperation {
    /// Repository-relative path the operation acts on.
    pub file_path: String,
    pub operation_type: OperationType,
    /// Full new file content; modify only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Destination path; rename only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_file_path: Option<String>,
    /// Commit whose parent supplies the restored content; defaults to the commit being edited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_sha: Option<String>,
}

impl FileOperation {
    pub fn modify(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::bare(path, OperationType::Modify).with_content(content)
    }

    pub fn restore(path: impl Into<String>) -> Self {
        Self::bare(path, OperationType::Restore)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::bare(path, OperationType::Delete)
    }

    pub fn rename(path: impl Into<String>, to: impl Into<String>) -> Self {
        let mut op = Self::bare(path, OperationType::Rename);
        op.new_file_path = Some(to.into());
        op
    }

    fn bare(path: impl Into<String>, operation_type: OperationType) -> Self {
        Self {
            file_path: path.into(),
            operation_type,
            content: None,
            new_file_path: None,
            commit_sha: None,
        }
    }

    fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Structural validation; nothing on disk is consulted.
    pub fn into_edit(self) -> Result<FileEdit, FileOpError> {
        let op = self.operation_type;
        let path = self.file_path.trim().to_string();
        check_relative(&path, op)?;

        // Blank values on operations that ignore them count as absent.
        if has_value(&self.content) && op != OperationType::Modify {
            return Err(FileOpError::UnexpectedContent {
                operation: op.as_str(),
                path,
            });
        }
        if has_value(&self.new_file_path) && op != OperationType::Rename {
            return Err(FileOpError::UnexpectedTarget {
                operation: op.as_str(),
                path,
            });
        }

        let edit = match op {
            OperationType::Modify => FileEdit::Modify {
                path,
                content: self.content.unwrap_or_default(),
            },
            OperationType::Restore => FileEdit::Restore {
                path,
                from: self.commit_sha.filter(|sha| !sha.trim().is_empty()),
            },
            OperationType::Delete => FileEdit::Delete { path },
            OperationType::Rename => {
                let to = self
                    .new_file_path
                    .map(|to| to.trim().to_string())
                    .filter(|to| !to.is_empty())
                    .ok_or_else(|| FileOpError::MissingTarget { path: path.clone() })?;
                check_relative(&to, op)?;
                FileEdit::Rename { from: path, to }
            }
        };
        Ok(edit)
    }
}

fn has_value(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|value| !value.trim().is_empty())
}

fn check_relative(path: &str, op: OperationType) -> Result<(), FileOpError> {
    let candidate = Path::new(path);
    let escapes = path.is_empty()
        || candidate.is_absolute()
        || candidate
            .components()
            .any(|part| matches!(part, Component::ParentDir | Component::Prefix(_)));
    if escapes {
        return Err(FileOpError::OutsideRepository {
            operation: op.as_str(),
            path: path.to_string(),
        });
    }
    Ok(())
}

/// A validated edit, applied to the commit currently open for amendment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEdit {
    Modify { path: String, content: String },
    Restore { path: String, from: Option<String> },
    Delete { path: String },
    Rename { from: String, to: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileOpError {
    #[error("Cannot modify {path}: no content provided")]
    EmptyContent { path: String },
    #[error("Cannot restore {path}: no prior version found")]
    NoPriorVersion { path: String },
    #[error("Cannot restore {path}: commit {sha} not found")]
    UnknownCommit { path: String, sha: String },
    #[error("Cannot delete {path}: file does not exist")]
    PathNotFound { path: String },
    #[error("Cannot rename {path}: source does not exist")]
    SourceNotFound { path: String },
    #[error("Cannot rename {path}: target {target} already exists")]
    PathConflict { path: String, target: String },
    #[error("Cannot rename {path}: no new file path provided")]
    MissingTarget { path: String },
    #[error("Cannot {operation} {path}: content is only accepted for modify")]
    UnexpectedContent { operation: &'static str, path: String },
    #[error("Cannot {operation} {path}: new_file_path is only accepted for rename")]
    UnexpectedTarget { operation: &'static str, path: String },
    #[error("Cannot {operation} {path}: path must stay inside the repository")]
    OutsideRepository { operation: &'static str, path: String },
    #[error("Cannot update {path}: {message}")]
    Io { path: String, message: String },
}

/// Applies edits for one `edit` call and remembers the files it brought into existence,
/// so a failed batch can be rolled back completely.
pub(crate) struct EditContext<'a> {
    repo_root: &'a Path,
    commit: Oid,
    created: Vec<PathBuf>,
}

impl<'a> EditContext<'a> {
    pub(crate) fn new(repo_root: &'a Path, commit: Oid) -> Self {
        Self {
            repo_root,
            commit,
            created: Vec::new(),
        }
    }

    pub(crate) fn apply(&mut self, edit: &FileEdit) -> Result<(), FileOpError> {
        match edit {
            FileEdit::Modify { path, content } => {
                if content.is_empty() {
                    return Err(FileOpError::EmptyContent { path: path.clone() });
                }
                self.write(path, content.as_bytes())?;
                self.stage(path)
            }
            FileEdit::Restore { path, from } => {
                let commit = match from {
                    Some(sha) => vcs::resolve_commit_in(self.repo_root, sha)
                        .map_err(|err| io_error(path, err))?
                        .ok_or_else(|| FileOpError::UnknownCommit {
                            path: path.clone(),
                            sha: sha.clone(),
                        })?,
                    None => self.commit,
                };
                let prior = vcs::parent_blob_in(self.repo_root, commit, path)
                    .map_err(|err| io_error(path, err))?
                    .ok_or_else(|| FileOpError::NoPriorVersion { path: path.clone() })?;
                self.write(path, &prior)?;
                self.stage(path)
            }
            FileEdit::Delete { path } => {
                let target = self.repo_root.join(path);
                if !target.is_file() {
                    return Err(FileOpError::PathNotFound { path: path.clone() });
                }
                fs::remove_file(&target).map_err(|err| io_error(path, err))?;
                vcs::remove_path_in(self.repo_root, path).map_err(|err| io_error(path, err))
            }
            FileEdit::Rename { from, to } => {
                let source = self.repo_root.join(from);
                if !source.exists() {
                    return Err(FileOpError::SourceNotFound { path: from.clone() });
                }
                let dest = self.repo_root.join(to);
                if dest.exists() {
                    return Err(FileOpError::PathConflict {
                        path: from.clone(),
                        target: to.clone(),
                    });
                }
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|err| io_error(to, err))?;
                }
                fs::rename(&source, &dest).map_err(|err| io_error(from, err))?;
                self.created.push(dest);
                vcs::remove_path_in(self.repo_root, from).map_err(|err| io_error(from, err))?;
                self.stage(to)
            }
        }
    }

    /// Files this batch created that a hard reset would leave behind as untracked.
    pub(crate) fn created(&self) -> &[PathBuf] {
        &self.created
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), FileOpError> {
        let target = self.repo_root.join(path);
        if !target.exists() {
            self.created.push(target.clone());
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| io_error(path, err))?;
        }
        fs::write(&target, bytes).map_err(|err| io_error(path, err))
    }

    fn stage(&self, path: &str) -> Result<(), FileOpError> {
        vcs::stage_path_in(self.repo_root, path).map_err(|err| io_error(path, err))
    }
}

fn io_error(path: &str, err: impl std::fmt::Display) -> FileOpError {
    FileOpError::Io {
        path: path.to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_are_rejected_on_the_wire() {
        let err = serde_json::from_value::<FileOperation>(json!({
            "file_path": "a.txt",
            "operation_type": "delete",
            "force": true
        }))
        .unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn structural_mistakes_are_caught_before_touching_disk() {
        let mut op = FileOperation::delete("a.txt");
        op.content = Some("x".to_string());
        assert_eq!(
            op.into_edit().unwrap_err().to_string(),
            "Cannot delete a.txt: content is only accepted for modify"
        );

        let mut op = FileOperation::rename("a.txt", "b.txt");
        op.new_file_path = None;
        assert_eq!(
            op.into_edit().unwrap_err(),
            FileOpError::MissingTarget {
                path: "a.txt".to_string()
            }
        );

        let mut op = FileOperation::restore("a.txt");
        op.new_file_path = Some("b.txt".to_string());
        assert!(matches!(
            op.into_edit().unwrap_err(),
            FileOpError::UnexpectedTarget { .. }
        ));

        assert!(matches!(
            FileOperation::modify("../outside.txt", "x").into_edit(),
            Err(FileOpError::OutsideRepository { .. })
        ));
    }

    #[test]
    fn blank_content_and_target_are_ignored_where_they_do_not_apply() {
        let op: FileOperation = serde_json::from_value(json!({
            "file_path": "a.txt",
            "operation_type": "delete",
            "content": ""
        }))
        .unwrap();
        assert_eq!(
            op.into_edit().unwrap(),
            FileEdit::Delete {
                path: "a.txt".to_string()
            }
        );

        let op: FileOperation = serde_json::from_value(json!({
            "file_path": "a.txt",
            "operation_type": "restore",
            "content": "  ",
            "new_file_path": ""
        }))
        .unwrap();
        assert_eq!(
            op.into_edit().unwrap(),
            FileEdit::Restore {
                path: "a.txt".to_string(),
                from: None
            }
        );

        let op: FileOperation = serde_json::from_value(json!({
            "file_path": "x.txt",
            "operation_type": "rename",
            "content": "",
            "new_file_path": "y.txt"
        }))
        .unwrap();
        assert_eq!(
            op.into_edit().unwrap(),
            FileEdit::Rename {
                from: "x.txt".to_string(),
                to: "y.txt".to_string()
            }
        );
    }

    #[test]
    fn modify_without_content_is_a_per_operation_failure() {
        let edit = FileOperation::bare("a.txt", OperationType::Modify)
            .into_edit()
            .unwrap();
        assert_eq!(
            edit,
            FileEdit::Modify {
                path: "a.txt".to_string(),
                content: String::new()
            }
        );
    }

    #[test]
    fn restore_defaults_to_the_edited_commit() {
        let edit = FileOperation::restore(" src/lib.rs ").into_edit().unwrap();
        assert_eq!(
            edit,
            FileEdit::Restore {
                path: "src/lib.rs".to_string(),
                from: None
            }
        );
    }

    #[test]
    fn failure_messages_match_the_tool_contract() {
        assert_eq!(
            FileOpError::PathNotFound {
                path: "missing.txt".to_string()
            }
            .to_string(),
            "Cannot delete missing.txt: file does not exist"
        );
        assert_eq!(
            FileOpError::PathConflict {
                path: "x.txt".to_string(),
                target: "y.txt".to_string()
            }
            .to_string(),
            "Cannot rename x.txt: target y.txt already exists"
        );
    }
}
