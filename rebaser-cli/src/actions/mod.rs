mod plan;
mod run;
mod session;
pub(crate) mod shared;
mod types;

pub(crate) use plan::run_plan;
pub(crate) use run::run_agent;
pub(crate) use session::{run_abort, run_apply, run_continue, run_status};
pub(crate) use types::{AgentOptions, PlanOptions};
