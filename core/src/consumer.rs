use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::ConsumerConfig;
use crate::errors::Result;
use crate::request::{RequestType, WidgetRequest};
use crate::sink::WidgetSink;
use crate::source::{RawRequest, RequestSource};
use crate::telemetry::ConsumerMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerSettings {
    /// Wait after an idle tick or a transient failure.
    pub poll_interval: Duration,
    /// Stop after this many ticks. 0 means run until shut down.
    pub max_iterations: u64,
}

impl From<&ConsumerConfig> for ConsumerSettings {
    fn from(config: &ConsumerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_iterations: config.max_iterations,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing was waiting in the source.
    Idle,
    /// The request was written to the sink and removed from the source.
    Processed { key: String },
    /// The request was removed from the source without being written.
    Skipped { key: String },
}

enum Disposition {
    Stored,
    Ignored,
}

/// The consumer drives the data flow from source -> sink, one request at a time.
pub struct Consumer {
    source: Box<dyn RequestSource>,
    sink: Box<dyn WidgetSink>,
    settings: ConsumerSettings,
    metrics: ConsumerMetrics,
}

impl Consumer {
    pub fn new(
        source: Box<dyn RequestSource>,
        sink: Box<dyn WidgetSink>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            source,
            sink,
            settings,
            metrics: ConsumerMetrics::new(),
        }
    }

    /// Polls until `shutdown` flips to true, the iteration cap is reached, or a
    /// non-retryable error occurs.
    ///
    /// Transient errors are logged and retried after one poll interval. A
    /// request whose write failed stays in the source, so the retry picks it up.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<ConsumerMetrics> {
        info!(
            "Consumer loop started (poll interval {:?}, max iterations {})",
            self.settings.poll_interval, self.settings.max_iterations
        );

        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping");
                break;
            }

            let wait = match self.run_once().await {
                Ok(TickOutcome::Idle) => true,
                Ok(_) => false,
                Err(e) if e.is_retryable() => {
                    self.metrics.failed += 1;
                    warn!("Transient failure, retrying on next poll: {}", e);
                    true
                }
                Err(e) => {
                    error!("Unrecoverable error: {}", e);
                    return Err(e);
                }
            };

            if self.settings.max_iterations > 0
                && self.metrics.ticks >= self.settings.max_iterations
            {
                info!("Reached max-iterations. Exiting.");
                break;
            }

            if wait && self.wait_for_next_poll(&mut shutdown).await {
                info!("Shutdown requested, stopping");
                break;
            }
        }

        info!(
            "Consumer stopped after {}s. Final metrics: {:?}",
            self.metrics.uptime_seconds(),
            self.metrics
        );
        Ok(self.metrics.clone())
    }

    /// Runs a single fetch-store-acknowledge cycle.
    ///
    /// High-level logic:
    /// 1. Fetch the next request from the source. Nothing waiting means an idle tick.
    /// 2. Decode it and store create requests in the sink.
    /// 3. Remove it from the source once stored, or once found to be unusable.
    /// 4. If the sink write fails, do NOT acknowledge, so the request is retried.
    pub async fn run_once(&mut self) -> Result<TickOutcome> {
        self.metrics.ticks += 1;

        let Some(raw) = self.source.next_request().await? else {
            self.metrics.idle_ticks += 1;
            return Ok(TickOutcome::Idle);
        };

        let outcome = match self.handle(&raw).await {
            Ok(Disposition::Stored) => TickOutcome::Processed { key: raw.key },
            Ok(Disposition::Ignored) => TickOutcome::Skipped { key: raw.key },
            Err(e) if e.should_skip_message() => {
                error!("Dropping request {}: {}", raw.key, e);
                TickOutcome::Skipped { key: raw.key }
            }
            Err(e) => return Err(e),
        };

        match &outcome {
            TickOutcome::Processed { key } => {
                self.source.acknowledge(key).await?;
                self.metrics.processed += 1;
            }
            TickOutcome::Skipped { key } => {
                self.source.acknowledge(key).await?;
                self.metrics.skipped += 1;
            }
            TickOutcome::Idle => {}
        }
        Ok(outcome)
    }

    async fn handle(&self, raw: &RawRequest) -> Result<Disposition> {
        let request = WidgetRequest::from_slice(&raw.key, &raw.payload)?;

        match request.kind() {
            RequestType::Create => {
                let widget = request.to_widget()?;
                self.sink.store(&widget).await?;
                info!(
                    "Processed request {} type=create key={}",
                    request.request_id.as_deref().unwrap_or("-"),
                    raw.key
                );
                Ok(Disposition::Stored)
            }
            kind @ (RequestType::Update | RequestType::Delete) => {
                warn!(
                    "Request type '{}' seen in {}. Only create is handled. Skipping.",
                    kind.as_str(),
                    raw.key
                );
                Ok(Disposition::Ignored)
            }
            RequestType::Unknown(kind) => {
                warn!("Unknown request type '{}' in {}. Skipping.", kind, raw.key);
                Ok(Disposition::Ignored)
            }
        }
    }

    /// Sleeps for one poll interval. Returns true if shutdown was requested meanwhile.
    async fn wait_for_next_poll(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let changed = tokio::select! {
            _ = tokio::time::sleep(self.settings.poll_interval) => false,
            Ok(()) = shutdown.changed() => true,
        };
        changed && *shutdown.borrow()
    }

    pub fn get_metrics(&self) -> &ConsumerMetrics {
        &self.metrics
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("settings", &self.settings)
            .field("metrics", &self.metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ConsumerError, DynamoError, S3Error};
    use crate::request::Widget;
    use crate::sink::MockWidgetSink;
    use crate::source::MockRequestSource;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    const CREATE: &str = r#"{"type":"create","requestId":"r1","widgetId":"w1","owner":"Alice Smith","label":"L"}"#;

    fn settings(poll_ms: u64, max_iterations: u64) -> ConsumerSettings {
        ConsumerSettings {
            poll_interval: Duration::from_millis(poll_ms),
            max_iterations,
        }
    }

    fn source_with(requests: Vec<RawRequest>) -> (MockRequestSource, Arc<Mutex<Vec<String>>>) {
        let mut queue = VecDeque::from(requests);
        let acknowledged = Arc::new(Mutex::new(Vec::new()));

        let mut source = MockRequestSource::new();
        source
            .expect_next_request()
            .returning(move || Ok(queue.pop_front()));
        let acked = acknowledged.clone();
        source.expect_acknowledge().returning(move |key| {
            acked.lock().unwrap().push(key.to_string());
            Ok(())
        });
        (source, acknowledged)
    }

    fn recording_sink() -> (MockWidgetSink, Arc<Mutex<Vec<Widget>>>) {
        let stored = Arc::new(Mutex::new(Vec::new()));
        let mut sink = MockWidgetSink::new();
        let recorded = stored.clone();
        sink.expect_store().returning(move |widget| {
            recorded.lock().unwrap().push(Widget::clone(widget));
            Ok(())
        });
        (sink, stored)
    }

    fn upload_error() -> ConsumerError {
        S3Error::Upload {
            bucket: "dest".to_string(),
            key: "widgets/alice-smith/w1".to_string(),
            reason: "connection reset".to_string(),
        }
        .into()
    }

    #[tokio::test]
    async fn test_run_once_idle_when_source_empty() {
        let (source, acknowledged) = source_with(vec![]);
        let mut sink = MockWidgetSink::new();
        sink.expect_store().never();

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let outcome = consumer.run_once().await.unwrap();

        assert_eq!(outcome, TickOutcome::Idle);
        assert!(acknowledged.lock().unwrap().is_empty());
        assert_eq!(consumer.get_metrics().idle_ticks, 1);
    }

    #[tokio::test]
    async fn test_run_once_create_is_stored_then_acknowledged() {
        let (source, acknowledged) = source_with(vec![RawRequest::new("r1.json", CREATE)]);
        let (sink, stored) = recording_sink();

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let outcome = consumer.run_once().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Processed {
                key: "r1.json".to_string()
            }
        );
        let stored = stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].widget_id(), Some("w1"));
        assert_eq!(stored[0].get("label"), Some("L"));
        assert_eq!(*acknowledged.lock().unwrap(), vec!["r1.json".to_string()]);
        assert_eq!(consumer.get_metrics().processed, 1);
    }

    #[tokio::test]
    async fn test_run_once_update_is_skipped_without_store() {
        let payload = r#"{"type":"update","widgetId":"w1","owner":"Alice"}"#;
        let (source, acknowledged) = source_with(vec![RawRequest::new("u1.json", payload)]);
        let mut sink = MockWidgetSink::new();
        sink.expect_store().never();

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let outcome = consumer.run_once().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Skipped {
                key: "u1.json".to_string()
            }
        );
        assert_eq!(*acknowledged.lock().unwrap(), vec!["u1.json".to_string()]);
        assert_eq!(consumer.get_metrics().skipped, 1);
    }

    #[tokio::test]
    async fn test_run_once_drops_invalid_json() {
        let (source, acknowledged) = source_with(vec![RawRequest::new("bad.json", "{oops")]);
        let mut sink = MockWidgetSink::new();
        sink.expect_store().never();

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let outcome = consumer.run_once().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Skipped {
                key: "bad.json".to_string()
            }
        );
        assert_eq!(*acknowledged.lock().unwrap(), vec!["bad.json".to_string()]);
    }

    #[tokio::test]
    async fn test_run_once_drops_create_without_owner() {
        let payload = r#"{"type":"create","widgetId":"w9"}"#;
        let (source, acknowledged) = source_with(vec![RawRequest::new("w9.json", payload)]);
        let mut sink = MockWidgetSink::new();
        sink.expect_store().never();

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let outcome = consumer.run_once().await.unwrap();

        assert!(matches!(outcome, TickOutcome::Skipped { .. }));
        assert_eq!(acknowledged.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_drops_request_the_table_rejects() {
        let (source, acknowledged) = source_with(vec![RawRequest::new("r1.json", CREATE)]);
        let mut sink = MockWidgetSink::new();
        sink.expect_store().times(1).returning(|_| {
            Err(DynamoError::InvalidItem {
                table: "widgets".to_string(),
                reason: "ValidationException".to_string(),
            }
            .into())
        });

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let outcome = consumer.run_once().await.unwrap();

        assert_eq!(
            outcome,
            TickOutcome::Skipped {
                key: "r1.json".to_string()
            }
        );
        assert_eq!(*acknowledged.lock().unwrap(), vec!["r1.json".to_string()]);
        assert_eq!(consumer.get_metrics().skipped, 1);
        assert_eq!(consumer.get_metrics().processed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_restores_request_when_delete_fails() {
        let mut queue = VecDeque::from(vec![
            RawRequest::new("r1.json", CREATE),
            RawRequest::new("r1.json", CREATE),
        ]);
        let mut source = MockRequestSource::new();
        source
            .expect_next_request()
            .times(2)
            .returning(move || Ok(queue.pop_front()));
        let mut deletes = 0;
        source.expect_acknowledge().times(2).returning(move |key| {
            deletes += 1;
            if deletes == 1 {
                Err(S3Error::Delete {
                    bucket: "source".to_string(),
                    key: key.to_string(),
                    reason: "connection reset".to_string(),
                }
                .into())
            } else {
                Ok(())
            }
        });
        let (sink, stored) = recording_sink();

        let (_tx, rx) = watch::channel(false);
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 2));
        let metrics = consumer.run(rx).await.unwrap();

        assert_eq!(stored.lock().unwrap().len(), 2);
        assert_eq!(metrics.processed, 1);
        assert_eq!(metrics.failed, 1);
    }

    #[tokio::test]
    async fn test_run_once_store_failure_keeps_request() {
        let (source, acknowledged) = source_with(vec![RawRequest::new("r1.json", CREATE)]);
        let mut sink = MockWidgetSink::new();
        sink.expect_store().times(1).returning(|_| Err(upload_error()));

        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let error = consumer.run_once().await.unwrap_err();

        assert!(error.is_retryable());
        assert!(acknowledged.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_transient_failure_then_stores() {
        let mut queue = VecDeque::from(vec![
            RawRequest::new("r1.json", CREATE),
            RawRequest::new("r1.json", CREATE),
        ]);
        let mut source = MockRequestSource::new();
        source
            .expect_next_request()
            .times(2)
            .returning(move || Ok(queue.pop_front()));
        source
            .expect_acknowledge()
            .times(1)
            .returning(|_| Ok(()));

        let mut attempts = 0;
        let mut sink = MockWidgetSink::new();
        sink.expect_store().times(2).returning(move |_| {
            attempts += 1;
            if attempts == 1 {
                Err(upload_error())
            } else {
                Ok(())
            }
        });

        let (_tx, rx) = watch::channel(false);
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 2));
        let started = tokio::time::Instant::now();
        let metrics = consumer.run(rx).await.unwrap();

        assert_eq!(metrics.ticks, 2);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.processed, 1);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_run_stops_on_missing_bucket() {
        let mut source = MockRequestSource::new();
        source.expect_next_request().times(1).returning(|| {
            Err(S3Error::NoSuchBucket {
                bucket: "source".to_string(),
            }
            .into())
        });
        let mut sink = MockWidgetSink::new();
        sink.expect_store().never();

        let (_tx, rx) = watch::channel(false);
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let error = consumer.run(rx).await.unwrap_err();

        assert!(matches!(
            error,
            ConsumerError::S3(S3Error::NoSuchBucket { ref bucket }) if bucket == "source"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_spaces_idle_polls() {
        let (source, _) = source_with(vec![]);
        let sink = MockWidgetSink::new();

        let (_tx, rx) = watch::channel(false);
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 3));
        let started = tokio::time::Instant::now();
        let metrics = consumer.run(rx).await.unwrap();

        assert_eq!(metrics.ticks, 3);
        assert_eq!(metrics.idle_ticks, 3);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drains_backlog_without_waiting() {
        let second = CREATE.replace("w1", "w2");
        let (source, acknowledged) = source_with(vec![
            RawRequest::new("r1.json", CREATE),
            RawRequest::new("r2.json", second),
        ]);
        let (sink, stored) = recording_sink();

        let (_tx, rx) = watch::channel(false);
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(60_000, 2));
        let started = tokio::time::Instant::now();
        consumer.run(rx).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(stored.lock().unwrap().len(), 2);
        assert_eq!(
            *acknowledged.lock().unwrap(),
            vec!["r1.json".to_string(), "r2.json".to_string()]
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_shutdown_requested() {
        let mut source = MockRequestSource::new();
        source.expect_next_request().never();
        let sink = MockWidgetSink::new();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(100, 0));
        let metrics = consumer.run(rx).await.unwrap();

        assert_eq!(metrics.ticks, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_idle_wait() {
        let (source, _) = source_with(vec![]);
        let sink = MockWidgetSink::new();

        let (tx, rx) = watch::channel(false);
        let mut consumer = Consumer::new(Box::new(source), Box::new(sink), settings(60_000, 0));
        let handle = tokio::spawn(async move { consumer.run(rx).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        let metrics = handle.await.unwrap().unwrap();

        assert_eq!(metrics.ticks, 1);
    }
}
