use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::errors::Result;

pub const DEFAULT_LOG_FILTER: &str = "relay_core=info,consumer=info,warn";

/// Logs to stdout and, when given, appends the same events to `log_file`.
pub fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsumerMetrics {
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub idle_ticks: u64,
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl ConsumerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            ticks: 0,
            idle_ticks: 0,
            processed: 0,
            skipped: 0,
            failed: 0,
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

impl Default for ConsumerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
