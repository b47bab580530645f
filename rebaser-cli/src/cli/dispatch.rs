use std::path::{Path, PathBuf};

use clap::Parser;
use rebaser_core::{display, vcs};

use crate::actions::shared::load_config;
use crate::actions::*;
use crate::cli::args::*;

fn plan_options(history: HistoryArgs, plan_file: Option<PathBuf>) -> PlanOptions {
    PlanOptions {
        start: history.start,
        end: history.end,
        skip_diff: history.skip_diff,
        instruction_file: history.instruction_file,
        plan_file,
    }
}

fn repo_root(path: &Path) -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(vcs::repo_root_in(path)?)
}

pub(crate) async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    display::init_logging(display::Verbosity::from_flags(
        cli.global.verbose,
        cli.global.quiet,
    ));
    let explicit_config = cli.global.config.as_deref();

    match cli.command {
        Commands::Plan(cmd) => {
            let root = repo_root(&cmd.repo)?;
            let config = load_config(&root, explicit_config)?;
            let opts = plan_options(cmd.history, cmd.plan_file);
            run_plan(&opts, &root, &config).await?;
            Ok(())
        }
        Commands::Run(cmd) => {
            let repo = vcs::open_or_clone(&cmd.repo, cmd.url.as_deref())?;
            let root = repo
                .workdir()
                .map(Path::to_path_buf)
                .ok_or("cannot rebase a bare repository")?;
            let config = load_config(&root, explicit_config)?;
            let opts = AgentOptions {
                plan: plan_options(cmd.history, cmd.plan_file),
                query_file: cmd.query_file,
            };
            run_agent(&opts, &root, &config).await
        }
        Commands::Apply(cmd) => run_apply(&repo_root(&cmd.repo)?, &cmd.base, &cmd.plan_file),
        Commands::Continue(cmd) => run_continue(&repo_root(&cmd.repo)?),
        Commands::Abort(cmd) => run_abort(&repo_root(&cmd.repo)?),
        Commands::Status(cmd) => run_status(&repo_root(&cmd.repo)?),
    }
}
