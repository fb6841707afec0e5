use anyhow::Result;
use clap::Parser;
use tracing::info;

use weighbridge::config::{self, DEFAULT_LOG_FILTER};
use weighbridge::diagnostics;

mod cli;
mod commands;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let data_dir = config::resolve_data_dir(cli.data_dir.clone())?;
    let filter = cli.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
    // Flushes the file log on drop
    let _guard = diagnostics::init_tracing(&data_dir, filter);

    info!(
        "Starting weighbridge v{} ({}, built {})",
        weighbridge::VERSION,
        weighbridge::BUILD_GIT_SHA,
        weighbridge::BUILD_TIMESTAMP
    );
    info!(data_dir = %data_dir.display(), "Data directory");

    commands::run(cli, data_dir).await
}
