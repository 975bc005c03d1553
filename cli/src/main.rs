//! infracheck - provision infrastructure modules and check their outputs

use clap::Parser;
use tracing_subscriber::EnvFilter;

use infracheck::cli::Cli;
use infracheck::domain::report::EXIT_PROVISIONING_FAILED;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("infracheck={}", cli.log_level()))),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // Errors are already reported in the selected output mode.
    let code = cli.run().await.unwrap_or(EXIT_PROVISIONING_FAILED);
    std::process::exit(code);
}
