mod branches;
mod commits;
mod history;
mod merge;
mod status;

pub use branches::{
    HeadTarget, checkout_branch_in, checkout_detached_in, head_target_in, reset_branch_in,
    reset_hard_in, restore_head_in,
};
pub use commits::{
    amend_head_in, parent_blob_in, remove_path_in, stage_path_in,
};
pub use history::{HistoryError, open_or_clone, range_oids_in, read_history, read_history_in};
pub use merge::{list_conflicted_paths_in, stage_resolution_in};
pub use status::{
    ensure_clean_worktree_in, git_dir_in, operation_in_progress_in, repo_root_in, resolve_commit_in,
};

fn normalize_pathspec(path: &str) -> String {
    let mut s = path
        .trim()
        .trim_end_matches('/')
        .trim_end_matches('\\')
        .to_string();

    s = s.replace('\\', "/");
    if let Some(stripped) = s.strip_prefix("./") {
        s = stripped.to_string();
    }

    while s.contains("//") {
        s = s.replace("//", "/");
    }

    s
}
