use std::path::{Path, PathBuf};

use rebaser_core::config::Config;
use rebaser_core::display;
use rebaser_core::planner::{self, generate_plan, write_plan_file};
use rebaser_core::vcs;
use rebaser_core::PlanPromptOptions;

use super::shared::{default_plan_file, planner_client, short_sha};
use super::types::PlanOptions;

/// Read `start..end`, ask the planner for a plan and write it out. Returns the plan file path.
pub(crate) async fn run_plan(
    opts: &PlanOptions,
    repo_root: &Path,
    config: &Config,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let history = vcs::read_history_in(repo_root, &opts.start, &opts.end)?;
    tracing::info!(
        commits = history.len(),
        start = %opts.start,
        end = %opts.end,
        "read commit history"
    );

    let instructions = match opts.instruction_file.as_ref() {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| format!("cannot read {}: {err}", path.display()))?,
        None => config.prompts.instructions()?,
    };
    let prompt_options = PlanPromptOptions {
        exclude_diff_for: &opts.skip_diff,
        elide_paths: &config.history.elide_paths,
    };
    let client = planner_client(config)?;
    let policy = config.retry.policy();

    let plan = display::call_with_status("Generating rebase plan", |_status| {
        generate_plan(&client, &history, &instructions, &prompt_options, &policy)
    })
    .await?;

    let plan_file = opts
        .plan_file
        .clone()
        .unwrap_or_else(|| default_plan_file(repo_root));
    write_plan_file(&plan, &plan_file)?;
    tracing::info!(path = %plan_file.display(), actions = plan.len(), "wrote plan file");

    for action in plan.actions() {
        let message = action
            .message
            .as_deref()
            .map(|m| format!("  {m}"))
            .unwrap_or_default();
        println!("{:<7}{}{message}", action.action.as_str(), short_sha(&action.sha));
    }
    println!(
        "{} action(s) written to {}",
        plan.len(),
        plan_file.display()
    );

    Ok(plan_file)
}

/// Use `path` when it already holds a plan; otherwise generate one there.
pub(crate) async fn ensure_plan(
    opts: &PlanOptions,
    repo_root: &Path,
    config: &Config,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let path = opts
        .plan_file
        .clone()
        .unwrap_or_else(|| default_plan_file(repo_root));
    if path.is_file() {
        let plan = planner::read_plan_file(&path)?;
        tracing::info!(path = %path.display(), actions = plan.len(), "reusing existing plan file");
        return Ok(path);
    }

    let opts = PlanOptions {
        plan_file: Some(path),
        ..opts.clone()
    };
    run_plan(&opts, repo_root, config).await
}
