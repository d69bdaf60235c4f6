//! gen-scenic CLI entry point.
//!
//! Initializes logging and delegates to the CLI module for command handling.

use tracing_subscriber::{fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments first to get log_level
    let cli = scenic_nl::cli::parse_cli();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let rust_log = std::env::var("RUST_LOG").ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(cli.env_filter(rust_log.as_deref()))
        .init();

    scenic_nl::cli::run_with_cli(cli).await
}
