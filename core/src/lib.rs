pub mod aws;
pub mod config;
pub mod consumer;
pub mod errors;
pub mod request;
pub mod sink;
pub mod source;
pub mod telemetry;

pub use config::{ConsumerConfig, Destination, DestinationKind};
pub use consumer::{Consumer, ConsumerSettings, TickOutcome};
pub use errors::{ConsumerError, Result};
