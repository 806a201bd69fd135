//! yamon-ci binary.
//!
//! Runs the webhook server or a one-off build, route or matrix command.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = yamon_ci::cli::parse_cli();

    // RUST_LOG wins over --log-level so build logs can be narrowed per module.
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    yamon_ci::cli::run_with_cli(cli).await
}
