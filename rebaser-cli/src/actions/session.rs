use std::path::Path;

use rebaser_core::display;
use rebaser_core::planner::read_plan_file;
use rebaser_core::rebase::{RebaseError, Session, StepOutcome};

use super::shared::short_sha;

fn recovered(repo_root: &Path) -> Result<Session, Box<dyn std::error::Error>> {
    Session::recover(repo_root)?.ok_or_else(|| RebaseError::NoActiveSession.into())
}

/// Start a session straight from a plan file.
pub(crate) fn run_apply(
    repo_root: &Path,
    base: &str,
    plan_file: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = read_plan_file(plan_file)?;
    let (mut session, outcome) = Session::start(repo_root, base, &plan)?;
    report(&outcome);
    close_if_finished(&mut session, &outcome)
}

pub(crate) fn run_continue(repo_root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = recovered(repo_root)?;
    let outcome = session.resume()?;
    report(&outcome);
    close_if_finished(&mut session, &outcome)
}

pub(crate) fn run_abort(repo_root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut session = recovered(repo_root)?;
    session.abort()?;
    display::print_outcome(true, "Rebase aborted; the branch is back where it started");
    Ok(())
}

pub(crate) fn run_status(repo_root: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let Some(session) = Session::recover(repo_root)? else {
        println!("No rebase session is active");
        return Ok(());
    };

    let record = session.record();
    println!("Session   {}", record.id);
    println!("State     {}", session.state());
    println!(
        "Started   {}",
        record.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "Branch    {} (was {})",
        record.head_name.as_deref().unwrap_or("(detached)"),
        short_sha(&record.orig_head)
    );
    println!("Base      {}", short_sha(&record.base));
    println!("Remaining {} step(s)", session.remaining_steps());
    for path in session.conflicted_paths()? {
        println!("Conflict  {path}");
    }
    Ok(())
}

fn report(outcome: &StepOutcome) {
    let success = !matches!(outcome, StepOutcome::Conflicted { .. });
    display::print_outcome(success, &outcome.to_string());
}

/// A session that replayed everything has nothing left to do; drop its artifacts.
fn close_if_finished(
    session: &mut Session,
    outcome: &StepOutcome,
) -> Result<(), Box<dyn std::error::Error>> {
    if *outcome == StepOutcome::Finished {
        session.finish()?;
    }
    Ok(())
}
