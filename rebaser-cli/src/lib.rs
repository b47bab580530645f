mod actions;
mod cli;

pub async fn run_cli() -> Result<(), Box<dyn std::error::Error>> {
    cli::dispatch::run().await
}
