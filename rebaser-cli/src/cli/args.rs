use std::path::PathBuf;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};

/// Rewrite a range of git history with an LLM-generated rebase plan.
#[derive(Parser, Debug)]
#[command(
    name = "rebaser",
    version,
    about,
    // Show help when you forget a subcommand
    arg_required_else_help = true,
    propagate_version = true
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalOpts,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(ClapArgs, Debug, Default)]
pub(crate) struct GlobalOpts {
    /// Increase stderr verbosity (`-v` = info, `-vv` = debug); `RUST_LOG` overrides both
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub(crate) verbose: u8,

    /// Only report errors; quiet wins over verbose
    #[arg(short = 'q', long, global = true)]
    pub(crate) quiet: bool,

    /// Config file layered on top of the global and project config
    #[arg(short = 'C', long = "config", value_name = "PATH", global = true)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Read the history range, ask the planner for a rebase plan and write it to a plan file
    ///
    /// Examples:
    ///   rebaser plan . abc1234
    ///   rebaser plan ../repo abc1234 -e feature -s def5678 -o plan.txt
    Plan(PlanCmd),

    /// Generate a plan unless one exists, then let the planner drive the rebase under supervision
    Run(RunCmd),

    /// Start a rebase from an existing plan file without the planner
    Apply(ApplyCmd),

    /// Resume the rebase session left in the repository
    Continue(RepoCmd),

    /// Abort the rebase session and restore the original branch
    Abort(RepoCmd),

    /// Show the state of the rebase session
    Status(RepoCmd),
}

#[derive(ClapArgs, Debug, Clone)]
pub(crate) struct HistoryArgs {
    /// First commit of the range; the plan rewrites START..END
    #[arg(value_name = "START")]
    pub(crate) start: String,

    /// Last commit of the range
    #[arg(short = 'e', long = "end", value_name = "END", default_value = "HEAD")]
    pub(crate) end: String,

    /// Commits whose diffs are left out of the planner prompt (repeatable)
    #[arg(short = 's', long = "skip-diff", value_name = "SHA", num_args = 1..)]
    pub(crate) skip_diff: Vec<String>,

    /// Replace the built-in plan instructions with the contents of FILE
    #[arg(short = 'i', long = "instruction-file", value_name = "FILE")]
    pub(crate) instruction_file: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct PlanCmd {
    /// Path to the repository
    #[arg(value_name = "REPO")]
    pub(crate) repo: PathBuf,

    #[command(flatten)]
    pub(crate) history: HistoryArgs,

    /// Where to write the plan; defaults to `<REPO>/.rebaser/plan.txt`
    #[arg(short = 'o', long = "plan-file", value_name = "PLAN_FILE")]
    pub(crate) plan_file: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct RunCmd {
    /// Path to the repository; cloned from --url when it does not exist yet
    #[arg(value_name = "REPO")]
    pub(crate) repo: PathBuf,

    #[command(flatten)]
    pub(crate) history: HistoryArgs,

    /// Remote to clone into REPO when it is missing
    #[arg(long = "url", value_name = "URL")]
    pub(crate) url: Option<String>,

    /// Replace the built-in first directive with the contents of FILE
    #[arg(long = "query-file", value_name = "FILE")]
    pub(crate) query_file: Option<PathBuf>,

    /// Plan file to use; generated first when it does not exist
    #[arg(long = "plan-file", value_name = "PLAN_FILE")]
    pub(crate) plan_file: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct ApplyCmd {
    #[arg(value_name = "REPO")]
    pub(crate) repo: PathBuf,

    /// Commit the plan is replayed onto
    #[arg(value_name = "BASE")]
    pub(crate) base: String,

    #[arg(value_name = "PLAN_FILE")]
    pub(crate) plan_file: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub(crate) struct RepoCmd {
    #[arg(value_name = "REPO", default_value = ".")]
    pub(crate) repo: PathBuf,
}
