#[tokio::main]
async fn main() {
    if let Err(err) = rebaser_cli::run_cli().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
