pub mod s3;

use async_trait::async_trait;

use crate::errors::Result;

pub use s3::S3RequestSource;

/// A message picked up from the source, regardless of where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRequest {
    /// Identifier of the message, e.g. the object key in the source bucket.
    pub key: String,
    /// Raw payload, not yet decoded.
    pub payload: Vec<u8>,
}

impl RawRequest {
    pub fn new(key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            payload: payload.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestSource: Send + Sync {
    /// Fails when the source cannot be read at all. Called once at startup.
    async fn ensure_ready(&self) -> Result<()>;

    /// Fetches the next pending message. `Ok(None)` means nothing is waiting.
    async fn next_request(&self) -> Result<Option<RawRequest>>;

    /// Removes a handled message so it is not picked up again.
    async fn acknowledge(&self, key: &str) -> Result<()>;
}
