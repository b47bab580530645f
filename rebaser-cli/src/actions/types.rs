use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub start: String,
    pub end: String,
    pub skip_diff: Vec<String>,
    pub instruction_file: Option<PathBuf>,
    pub plan_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub plan: PlanOptions,
    pub query_file: Option<PathBuf>,
}
