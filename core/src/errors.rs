use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("S3 error: {0}")]
    S3(#[from] S3Error),

    #[error("DynamoDB error: {0}")]
    Dynamo(#[from] DynamoError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Configuration validation failed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Failed to load configuration from {path}: {error}")]
    LoadFailed {
        path: String,
        #[source]
        error: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Error, Debug)]
pub enum S3Error {
    #[error("Bucket {bucket} is not accessible: {reason}")]
    BucketAccess { bucket: String, reason: String },

    #[error("Bucket {bucket} does not exist")]
    NoSuchBucket { bucket: String },

    #[error("Failed to list objects in bucket {bucket}: {reason}")]
    ListObjects { bucket: String, reason: String },

    #[error("Failed to upload object to s3://{bucket}/{key}: {reason}")]
    Upload {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("s3://{bucket}/{key} was rejected: {reason}")]
    Rejected {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Failed to download object from s3://{bucket}/{key}: {reason}")]
    Download {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Failed to delete object s3://{bucket}/{key}: {reason}")]
    Delete {
        bucket: String,
        key: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum DynamoError {
    #[error("Table {table} is not accessible: {reason}")]
    TableAccess { table: String, reason: String },

    #[error("Table {table} does not exist")]
    TableNotFound { table: String },

    #[error("Failed to put item into table {table}: {reason}")]
    PutItem { table: String, reason: String },

    #[error("Item was rejected by table {table}: {reason}")]
    InvalidItem { table: String, reason: String },
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Request {key} is not valid JSON: {reason}")]
    InvalidJson { key: String, reason: String },

    #[error("Request {key} is malformed: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Create request is missing required field {field} or it is empty")]
    MissingField { field: String },
}

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {reason}")]
    Json { reason: String },
}

pub type Result<T> = std::result::Result<T, ConsumerError>;

impl From<serde_json::Error> for ConsumerError {
    fn from(err: serde_json::Error) -> Self {
        ConsumerError::Serialization(SerializationError::Json {
            reason: err.to_string(),
        })
    }
}

impl ConsumerError {
    /// Transient failures. The consumer waits one poll interval and tries again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsumerError::S3(S3Error::ListObjects { .. }) => true,
            ConsumerError::S3(S3Error::Download { .. }) => true,
            ConsumerError::S3(S3Error::Upload { .. }) => true,
            ConsumerError::S3(S3Error::Delete { .. }) => true,
            ConsumerError::S3(_) => false,
            ConsumerError::Dynamo(DynamoError::PutItem { .. }) => true,
            ConsumerError::Dynamo(_) => false,
            ConsumerError::Config(_) => false,
            ConsumerError::Request(_) => false,
            ConsumerError::Serialization(_) => false,
            _ => true,
        }
    }

    /// Poison messages, including writes the destination will never accept.
    /// The offending object is deleted so it cannot block the bucket.
    pub fn should_skip_message(&self) -> bool {
        matches!(
            self,
            ConsumerError::Request(_)
                | ConsumerError::Serialization(_)
                | ConsumerError::S3(S3Error::Rejected { .. })
                | ConsumerError::Dynamo(DynamoError::InvalidItem { .. })
        )
    }
}
