use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use tracing::{debug, info, warn};

use crate::errors::{Result, S3Error};
use crate::source::{RawRequest, RequestSource};

/// Reads requests one object at a time from a bucket, in key order.
#[derive(Debug, Clone)]
pub struct S3RequestSource {
    client: Client,
    bucket: String,
}

impl S3RequestSource {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    async fn first_key(&self) -> Result<Option<String>> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_no_such_bucket() => S3Error::NoSuchBucket {
                    bucket: self.bucket.clone(),
                },
                _ => S3Error::ListObjects {
                    bucket: self.bucket.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                },
            })?;

        Ok(response
            .contents()
            .first()
            .and_then(|object| object.key())
            .map(str::to_string))
    }
}

#[async_trait]
impl RequestSource for S3RequestSource {
    async fn ensure_ready(&self) -> Result<()> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                info!("Source bucket '{}' exists and is accessible", self.bucket);
                Ok(())
            }
            Err(e) => {
                warn!("Cannot access source bucket '{}': {}", self.bucket, e);
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

    async fn next_request(&self) -> Result<Option<RawRequest>> {
        let Some(key) = self.first_key().await? else {
            return Ok(None);
        };

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                // deleted between list and get
                debug!("Object {} vanished before it could be read", key);
                return Ok(None);
            }
            Err(e) => {
                return Err(S3Error::Download {
                    bucket: self.bucket.clone(),
                    key,
                    reason: DisplayErrorContext(&e).to_string(),
                }
                .into());
            }
        };

        let payload = match response.body.collect().await {
            Ok(bytes) => bytes.into_bytes().to_vec(),
            Err(e) => {
                return Err(S3Error::Download {
                    bucket: self.bucket.clone(),
                    key,
                    reason: e.to_string(),
                }
                .into());
            }
        };

        debug!("Fetched {} ({} bytes) from {}", key, payload.len(), self.bucket);
        Ok(Some(RawRequest { key, payload }))
    }

    async fn acknowledge(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| S3Error::Delete {
                bucket: self.bucket.clone(),
                key: key.to_string(),
                reason: DisplayErrorContext(&e).to_string(),
            })?;

        debug!("Deleted {} from {}", key, self.bucket);
        Ok(())
    }
}
