pub mod dynamo;
pub mod s3;

use async_trait::async_trait;

use crate::aws::AwsClients;
use crate::config::Destination;
use crate::errors::Result;
use crate::request::Widget;

pub use dynamo::DynamoSink;
pub use s3::S3Sink;

/// The `WidgetSink` trait defines the contract for any destination system.
/// Writes are keyed by widget, so storing the same widget twice overwrites it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WidgetSink: Send + Sync {
    /// Fails when the destination does not exist or cannot be reached. Called once at startup.
    async fn ensure_ready(&self) -> Result<()>;

    async fn store(&self, widget: &Widget) -> Result<()>;
}

/// Picks the writer for the destination selected at startup.
pub fn build_sink(destination: &Destination, clients: &AwsClients) -> Box<dyn WidgetSink> {
    match destination {
        Destination::S3 { bucket } => Box::new(S3Sink::new(clients.s3.clone(), bucket.clone())),
        Destination::Dynamo { table } => {
            Box::new(DynamoSink::new(clients.dynamo.clone(), table.clone()))
        }
    }
}
