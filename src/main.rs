use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use nix_remote::{App, Cli, wait_for_shutdown_signal};

fn install_tracing(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter)
        .with_context(|| format!("Invalid log filter `{filter}`"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    install_tracing(&cli.log)?;

    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => token.cancel(),
                Err(e) => tracing::warn!(error = %e, "Failed to install signal handlers"),
            }
        }
    });

    App::new(cli).run(token).await
}
