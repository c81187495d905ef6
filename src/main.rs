//! ABCA single run - CLI entry point.
//!
//! Starts the exported model, drives one reset and one action, and prints
//! the schema, statuses and outputs to stdout. Logs go to stderr.

use alpyne::config::SimConfig;
use alpyne::run::{check_model_exists, single_run, RunArgs};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let args = RunArgs::parse();

    // The run cannot do anything useful without the exported model.
    check_model_exists(&args.model)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main(args))
}

async fn async_main(args: RunArgs) -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alpyne=info,abca_single_run=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = SimConfig::from_env()?;
    info!(
        "Loaded configuration: java={}, server_lib={}",
        config.java_path,
        config.server_lib.display()
    );

    let mut stdout = std::io::stdout();
    single_run(&args, &config, &mut stdout).await
}
