use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_dynamodb::types::AttributeValue;
use tracing::{debug, info, warn};

use crate::errors::{DynamoError, Result};
use crate::request::Widget;
use crate::sink::WidgetSink;

/// Raised for items the table will never accept: empty key values, items over
/// the size limit, attributes the key schema does not allow.
const VALIDATION_CODE: &str = "ValidationException";

/// Stores each widget as one item, every attribute a string.
#[derive(Debug, Clone)]
pub struct DynamoSink {
    client: Client,
    table: String,
}

impl DynamoSink {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

pub fn to_item(widget: &Widget) -> HashMap<String, AttributeValue> {
    widget
        .attributes()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value.to_string())))
        .collect()
}

#[async_trait]
impl WidgetSink for DynamoSink {
    async fn ensure_ready(&self) -> Result<()> {
        match self
            .client
            .describe_table()
            .table_name(&self.table)
            .send()
            .await
        {
            Ok(_) => {
                info!("Destination table '{}' exists and is accessible", self.table);
                Ok(())
            }
            Err(e) => {
                warn!("Cannot access destination table '{}': {}", self.table, e);
                if e
                    .as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception())
                {
                    return Err(DynamoError::TableNotFound {
                        table: self.table.clone(),
                    }
                    .into());
                }
                Err(DynamoError::TableAccess {
                    table: self.table.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                }
                .into())
            }
        }
    }

    async fn store(&self, widget: &Widget) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.table)
            .set_item(Some(to_item(widget)))
            .send()
            .await
            .map_err(|e| match e.as_service_error() {
                Some(se) if se.is_resource_not_found_exception() => DynamoError::TableNotFound {
                    table: self.table.clone(),
                },
                Some(se) if se.code() == Some(VALIDATION_CODE) => DynamoError::InvalidItem {
                    table: self.table.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                },
                _ => DynamoError::PutItem {
                    table: self.table.clone(),
                    reason: DisplayErrorContext(&e).to_string(),
                },
            })?;

        debug!(
            "Stored widget {} in table {}",
            widget.widget_id().unwrap_or_default(),
            self.table
        );
        Ok(())
    }
}
