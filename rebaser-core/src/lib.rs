pub mod agent;
pub mod config;
pub mod display;
pub mod gemini;
pub mod planner;
pub mod rebase;
pub mod tools;
pub mod vcs;

pub use rebaser_kernel::{
    ActionKind, CommitSummary, FileChange, FileChangeKind, PlanError, RebaseAction, RebasePlan,
};
pub use rebaser_kernel::prompt::{PlanPromptOptions, render_initial_query};
