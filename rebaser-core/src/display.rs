use std::future::Future;
use std::io::{IsTerminal, stderr};

use crossterm::{
    cursor::MoveToColumn,
    execute,
    terminal::{Clear, ClearType},
};

use colored::*;
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Normal,
    Info,
    Debug,
}

impl Verbosity {
    /// `-q` wins over any number of `-v`.
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, 0) => Verbosity::Normal,
            (false, 1) => Verbosity::Info,
            (false, _) => Verbosity::Debug,
        }
    }

    fn directive(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Info => "info",
            Verbosity::Debug => "debug",
        }
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over the flag-derived level.
pub fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub enum Status {
    Working(String),
    Done,
    Error(String),
}

async fn display_status(mut rx: Receiver<Status>) {
    let spinner = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
    let mut i = 0usize;
    let mut last_message = String::new();

    loop {
        tokio::select! {
            status = rx.recv() => match status {
                Some(Status::Working(msg)) => {
                    last_message = msg;
                    let _ = execute!(stderr(), MoveToColumn(0), Clear(ClearType::CurrentLine));
                    eprint!("{} {}", spinner[i % spinner.len()].blue(), last_message.blue());
                    i = i.wrapping_add(1);
                }
                Some(Status::Done) | None => {
                    let _ = execute!(stderr(), MoveToColumn(0), Clear(ClearType::CurrentLine));
                    break;
                }
                Some(Status::Error(e)) => {
                    let _ = execute!(stderr(), MoveToColumn(0), Clear(ClearType::CurrentLine));
                    eprintln!("{} {}", "Error:".red(), e);
                    break;
                }
            },
            _ = tokio::time::sleep(Duration::from_millis(80)) => {
                let _ = execute!(stderr(), MoveToColumn(0), Clear(ClearType::CurrentLine));
                eprint!("{} {}", spinner[i % spinner.len()].blue(), last_message.blue());
                i = i.wrapping_add(1);
            }
        }
    }
}

/// Run `f` with a spinner on stderr. The spinner is skipped when stderr is not a terminal.
pub async fn call_with_status<F, Fut, T, E>(message: &str, f: F) -> Result<T, E>
where
    F: FnOnce(Sender<Status>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let (tx, rx) = channel(10);
    let spinner = stderr()
        .is_terminal()
        .then(|| tokio::spawn(display_status(rx)));
    let _ = tx.send(Status::Working(message.to_string())).await;

    let output = f(tx.clone()).await;

    let last = match &output {
        Ok(_) => Status::Done,
        Err(e) => Status::Error(e.to_string()),
    };
    let _ = tx.send(last).await;
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    output
}

/// Planner text and tool results shown to the operator.
pub fn print_response(response: &str) {
    println!("{}", response.cyan());
}

pub fn print_outcome(success: bool, message: &str) {
    if success {
        println!("{}", message.green());
    } else {
        println!("{}", message.red());
    }
}

pub fn operator_prompt(prompt: &str) -> ColoredString {
    prompt.yellow().bold()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(Verbosity::from_flags(0, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(1, false), Verbosity::Info);
        assert_eq!(Verbosity::from_flags(3, false), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(2, true), Verbosity::Quiet);
        assert_eq!(Verbosity::Quiet.directive(), "error");
    }

    #[tokio::test]
    async fn call_with_status_returns_the_inner_result() {
        let ok: Result<u32, String> =
            call_with_status("working", |_tx| async { Ok::<_, String>(7) }).await;
        assert_eq!(ok, Ok(7));

        let err: Result<u32, String> = call_with_status("working", |tx| async move {
            let _ = tx.send(Status::Working("still going".to_string())).await;
            Err("boom".to_string())
        })
        .await;
        assert_eq!(err, Err("boom".to_string()));
    }
}
