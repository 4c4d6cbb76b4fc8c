use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use relay_core::config::{ConsumerConfig, DestinationKind};

/// Relays widget requests from an S3 bucket into S3 or DynamoDB.
#[derive(Parser, Debug)]
#[command(name = "consumer", version, about, long_about = None)]
pub struct Cli {
    /// YAML config file. Flags given on the command line override its values
    #[arg(long, env = "CONSUMER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Bucket polled for widget requests
    #[arg(long, env = "CONSUMER_SOURCE_BUCKET", required_unless_present = "config")]
    pub source_bucket: Option<String>,

    /// Where created widgets are written
    #[arg(long, value_enum)]
    pub dest: Option<DestArg>,

    /// Destination bucket, required with `--dest s3`
    #[arg(long)]
    pub dest_bucket: Option<String>,

    /// Destination table, required with `--dest dynamo`
    #[arg(long)]
    pub dynamo_table: Option<String>,

    /// AWS region for every SDK call
    #[arg(long)]
    pub region: Option<String>,

    /// Custom AWS endpoint, e.g. http://localhost:4566
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// Wait between polls of an empty source bucket, in milliseconds [default: 100]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_ms: Option<u64>,

    /// Log file, appended to [default: consumer.log]
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Stop after this many polls. 0 runs until interrupted [default: 0]
    #[arg(long)]
    pub max_iterations: Option<u64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum DestArg {
    /// Amazon S3 bucket
    S3,
    /// Amazon DynamoDB table
    Dynamo,
}

impl From<DestArg> for DestinationKind {
    fn from(arg: DestArg) -> Self {
        match arg {
            DestArg::S3 => DestinationKind::S3,
            DestArg::Dynamo => DestinationKind::Dynamo,
        }
    }
}

impl Cli {
    /// Builds the config from `--config` (if any) and lays the flags over it.
    /// The result is not validated yet.
    pub fn load_config(&self) -> relay_core::Result<ConsumerConfig> {
        let mut config = match &self.config {
            Some(path) => ConsumerConfig::from_file(path)?,
            None => ConsumerConfig::new(self.source_bucket.clone().unwrap_or_default()),
        };

        if let Some(bucket) = &self.source_bucket {
            config.source_bucket = bucket.clone();
        }
        if let Some(dest) = self.dest {
            config.dest = dest.into();
        }
        if self.dest_bucket.is_some() {
            config.dest_bucket = self.dest_bucket.clone();
        }
        if self.dynamo_table.is_some() {
            config.dynamo_table = self.dynamo_table.clone();
        }
        if self.region.is_some() {
            config.region = self.region.clone();
        }
        if self.endpoint_url.is_some() {
            config.endpoint_url = self.endpoint_url.clone();
        }
        if let Some(poll_ms) = self.poll_ms {
            config.poll_ms = poll_ms;
        }
        if let Some(log_file) = &self.log_file {
            config.log_file = log_file.clone();
        }
        if let Some(max_iterations) = self.max_iterations {
            config.max_iterations = max_iterations;
        }
        Ok(config)
    }
}
