mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use relay_core::aws::AwsClients;
use relay_core::config::ConsumerConfig;
use relay_core::consumer::{Consumer, ConsumerSettings};
use relay_core::sink::build_sink;
use relay_core::source::{RequestSource, S3RequestSource};
use relay_core::telemetry::init_tracing;
use tokio::sync::watch;
use tracing::{error, info};

use crate::cli::Cli;

/// Long-running relay from the source bucket to the selected destination.
///
/// What it does at a high-level:
///     Parse flags and load config.
///     Check that the source and the destination are reachable.
///     Main loop runs until CTRL+C, the iteration cap, or a fatal error:
///         - take the first object in the source bucket
///         - write it to the destination
///         - delete it from the source bucket
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        Cli::command()
            .error(ErrorKind::ValueValidation, e.to_string())
            .exit();
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // logging may have failed to start, fall back to stderr
            let logging = tracing::dispatcher::has_been_set();
            for line in failure_report(&err) {
                if logging {
                    error!("{}", line);
                } else {
                    eprintln!("{}", line);
                }
            }
            ExitCode::FAILURE
        }
    }
}

/// One line for the error, then one per cause.
fn failure_report(err: &anyhow::Error) -> Vec<String> {
    std::iter::once(format!("error: {}", err))
        .chain(err.chain().skip(1).map(|cause| format!("cause: {}", cause)))
        .collect()
}

async fn run(config: ConsumerConfig) -> Result<()> {
    init_tracing(Some(&config.log_file)).context("Failed to set up logging")?;

    let destination = config.destination()?;
    info!(
        "Starting consumer: source=s3://{} dest={} poll_ms={} max_iterations={}",
        config.source_bucket, destination, config.poll_ms, config.max_iterations
    );

    let clients = AwsClients::load(&config).await;

    let source = S3RequestSource::new(clients.s3.clone(), config.source_bucket.clone());
    source
        .ensure_ready()
        .await
        .with_context(|| format!("Source bucket s3://{} is not usable", config.source_bucket))?;

    let sink = build_sink(&destination, &clients);
    sink.ensure_ready()
        .await
        .with_context(|| format!("Destination {} is not usable", destination))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down on CTRL+C");
            let _ = shutdown_tx.send(true);
        }
    });

    let mut consumer = Consumer::new(Box::new(source), sink, ConsumerSettings::from(&config));
    let metrics = consumer.run(shutdown_rx).await.context("Consumer loop failed")?;

    info!(
        "Consumer finished: processed={} skipped={} failed={} ticks={}",
        metrics.processed, metrics.skipped, metrics.failed, metrics.ticks
    );
    Ok(())
}
