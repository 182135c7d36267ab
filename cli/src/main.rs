use clap::Parser;
use vigil_cli::Cli;

fn main() {
    let cli = Cli::parse();
    std::process::exit(run(cli));
}

#[tokio::main]
async fn run(cli: Cli) -> i32 {
    // Logs go to stderr; stdout carries verdicts and JSON output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    cli.run().await
}
