pub mod history;
pub mod plan;
pub mod prompt;
pub mod prompts;
pub mod schema;

pub use history::{CommitSummary, FileChange, FileChangeKind};
pub use plan::{ActionKind, PlanError, RebaseAction, RebasePlan};
pub use prompts::{
    CONTINUE_DIRECTIVE, INITIAL_QUERY_TEMPLATE, PLAN_INSTRUCTIONS, UNNAMED_OPERATION_NUDGE,
};
