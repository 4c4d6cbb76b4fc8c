use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use tracing::{debug, info, warn};

use crate::errors::{Result, S3Error};
use crate::request::Widget;
use crate::sink::WidgetSink;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Error codes for a put that will fail the same way on every attempt.
const REJECTED_CODES: &[&str] = &[
    "EntityTooLarge",
    "InvalidArgument",
    "InvalidRequest",
    "KeyTooLongError",
    "MetadataTooLarge",
];

/// Stores each widget as a JSON object under `widgets/{owner}/{widget_id}`.
#[derive(Debug, Clone)]
pub struct S3Sink {
    client: Client,
    bucket: String,
}

impl S3Sink {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl WidgetSink for S3Sink {
    async fn ensure_ready(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Destination bucket '{}' exists and is accessible", self.bucket);
                Ok(())
            }
            Err(e) => {
                warn!("Cannot access destination bucket '{}': {}", self.bucket, e);
                if e.as_service_error().is_some_and(|se| se.is_not_found()) {
                    return Err(S3Error::NoSuchBucket {
                        bucket: self.bucket.clone(),
                    }
                    .into());
                }
                Err(S3Error::BucketAccess {
                    bucket: self.bucket.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                }
                .into())
            }
        }
    }

    async fn store(&self, widget: &Widget) -> Result<()> {
        let key = widget.s3_key()?;
        let body = widget.to_json()?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type(JSON_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.code() == Some("NoSuchBucket") => S3Error::NoSuchBucket {
                    bucket: self.bucket.clone(),
                },
                Some(se) if se.code().is_some_and(|code| REJECTED_CODES.contains(&code)) => {
                    S3Error::Rejected {
                        bucket: self.bucket.clone(),
                        key: key.clone(),
                        reason: DisplayErrorContext(&e).to_string(),
                    }
                }
                _ => S3Error::Upload {
                    bucket: self.bucket.clone(),
                    key: key.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                },
            })?;

        debug!("Stored widget at s3://{}/{}", self.bucket, key);
        Ok(())
    }
}
