use std::path::Path;

use rebaser_core::agent::{Transcript, run_agent_loop};
use rebaser_core::config::Config;
use rebaser_core::display;
use rebaser_core::rebase::Session;
use rebaser_core::render_initial_query;
use rebaser_core::tools::{RebaseToolbox, ToolHandler, describe_tools};

use super::plan::ensure_plan;
use super::shared::{planner_client, transcript_dir};
use super::types::AgentOptions;
use crate::cli::prompt::ConsoleOperator;

/// Make sure a plan exists, then hand the rebase tools to the planner under operator supervision.
pub(crate) async fn run_agent(
    opts: &AgentOptions,
    repo_root: &Path,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan_file = ensure_plan(&opts.plan, repo_root, config).await?;

    let mut toolbox = RebaseToolbox::new(repo_root, &plan_file);
    if let Some(session) = Session::recover(repo_root)? {
        tracing::info!(state = %session.state(), "continuing the rebase session found on disk");
        toolbox = toolbox.with_session(session);
    }

    let declarations = toolbox.declarations();
    let template = match opts.query_file.as_ref() {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|err| format!("cannot read {}: {err}", path.display()))?,
        None => config.prompts.initial_query_template()?,
    };
    let directive = render_initial_query(
        &template,
        &plan_file.display().to_string(),
        &opts.plan.start,
        &describe_tools(&declarations),
    );
    tracing::debug!(%directive, "initial directive");

    let client = planner_client(config)?;
    let mut chat = client.chat(declarations);

    let mut transcript = match Transcript::create(&transcript_dir(repo_root, config)) {
        Ok(transcript) => transcript,
        Err(err) => {
            tracing::warn!(error = %err, "agent transcript disabled");
            Transcript::disabled()
        }
    };
    if let Some(path) = transcript.path() {
        tracing::info!(path = %path.display(), "writing agent transcript");
    }

    let summary = run_agent_loop(
        &mut chat,
        &mut toolbox,
        &mut ConsoleOperator,
        &mut transcript,
        directive,
        &config.retry.policy(),
    )
    .await?;

    let state = toolbox.state();
    match summary.last_output {
        Some(output) => display::print_outcome(
            output.success,
            &format!(
                "{} tool call(s); rebase state {state}. Last result: {}",
                summary.tool_calls, output.message
            ),
        ),
        None => println!("No tool calls were made; rebase state {state}"),
    }
    Ok(())
}
