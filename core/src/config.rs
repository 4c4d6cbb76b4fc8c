use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ConfigError, Result};

pub const DEFAULT_POLL_MS: u64 = 100;
pub const DEFAULT_LOG_FILE: &str = "consumer.log";

/// Which kind of store created widgets are written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationKind {
    #[default]
    S3,
    Dynamo,
}

impl DestinationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationKind::S3 => "s3",
            DestinationKind::Dynamo => "dynamo",
        }
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated destination. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    S3 { bucket: String },
    Dynamo { table: String },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::S3 { bucket } => write!(f, "s3://{}", bucket),
            Destination::Dynamo { table } => write!(f, "dynamodb://{}", table),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConsumerConfig {
    pub source_bucket: String,
    #[serde(default)]
    pub dest: DestinationKind,
    #[serde(default)]
    pub dest_bucket: Option<String>,
    #[serde(default)]
    pub dynamo_table: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the AWS endpoint for every client, e.g. a LocalStack URL.
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    /// 0 means run until interrupted.
    #[serde(default)]
    pub max_iterations: u64,
}

fn default_poll_ms() -> u64 {
    DEFAULT_POLL_MS
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

impl ConsumerConfig {
    pub fn new(source_bucket: impl Into<String>) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            dest: DestinationKind::default(),
            dest_bucket: None,
            dynamo_table: None,
            region: None,
            endpoint_url: None,
            poll_ms: DEFAULT_POLL_MS,
            log_file: default_log_file(),
            max_iterations: 0,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.display().to_string(),
            error: Box::new(e),
        })?;
        let config: ConsumerConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                path: path.display().to_string(),
                error: Box::new(e),
            })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_bucket.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "--source-bucket".to_string(),
            }
            .into());
        }
        if self.poll_ms == 0 {
            return Err(ConfigError::ValidationFailed {
                reason: "--poll-ms must be a positive number of milliseconds".to_string(),
            }
            .into());
        }
        self.destination()?;
        Ok(())
    }

    /// Resolves the destination flags into a [`Destination`], failing when the
    /// flag required by the selected kind is absent.
    pub fn destination(&self) -> Result<Destination> {
        match self.dest {
            DestinationKind::S3 => match non_empty(&self.dest_bucket) {
                Some(bucket) => Ok(Destination::S3 { bucket }),
                None => Err(ConfigError::ValidationFailed {
                    reason: format!("--dest-bucket is required when --dest {}", self.dest),
                }
                .into()),
            },
            DestinationKind::Dynamo => match non_empty(&self.dynamo_table) {
                Some(table) => Ok(Destination::Dynamo { table }),
                None => Err(ConfigError::ValidationFailed {
                    reason: format!("--dynamo-table is required when --dest {}", self.dest),
                }
                .into()),
            },
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    /// Path-style addressing is needed by most S3 emulators behind a custom endpoint.
    pub fn force_path_style(&self) -> bool {
        self.endpoint_url.is_some()
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
