//! Concrete export sinks

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, trace};

use super::{AlertSink, ExportError, PerformanceSink};
use crate::model::{Alert, MetricSample};

/// Writes alerts and metric batches to the tracing log
#[derive(Debug, Default, Clone)]
pub struct LogExporter;

#[async_trait]
impl AlertSink for LogExporter {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_alert(&self, alert: &Alert) -> Result<(), ExportError> {
        info!(
            storage_id = %alert.storage_id,
            alert_id = %alert.alert_id,
            sequence_number = alert.sequence_number,
            severity = %alert.severity,
            category = %alert.category,
            occur_time = %alert.occur_time,
            "{}",
            alert.alert_name
        );
        Ok(())
    }
}

#[async_trait]
impl PerformanceSink for LogExporter {
    fn name(&self) -> &str {
        "log"
    }

    async fn send_metrics(&self, storage_id: &str, samples: &[MetricSample]) -> Result<(), ExportError> {
        let points: usize = samples.iter().map(|s| s.values.len()).sum();
        info!(storage_id, series = samples.len(), points, "collected performance metrics");
        Ok(())
    }
}

/// POSTs JSON payloads to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookExporter {
    client: Client,
    url: String,
}

impl WebhookExporter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), ExportError> {
        let response = self.client.post(&self.url).json(payload).send().await?;
        if response.status().is_success() {
            debug!(url = %self.url, "webhook delivered");
            Ok(())
        } else {
            Err(ExportError::HttpStatus(response.status().as_u16()))
        }
    }
}

#[async_trait]
impl AlertSink for WebhookExporter {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, alert), fields(url = %self.url))]
    async fn send_alert(&self, alert: &Alert) -> Result<(), ExportError> {
        self.post(&json!({ "kind": "alert", "alert": alert })).await
    }
}

#[async_trait]
impl PerformanceSink for WebhookExporter {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, samples), fields(url = %self.url))]
    async fn send_metrics(&self, storage_id: &str, samples: &[MetricSample]) -> Result<(), ExportError> {
        self.post(&json!({
            "kind": "metrics",
            "storage_id": storage_id,
            "metrics": samples,
        }))
        .await
    }
}

/// Event published to in-process subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    Alert(Alert),
    Metrics {
        storage_id: String,
        samples: Vec<MetricSample>,
    },
}

/// Publishes everything on a broadcast channel
///
/// Having no subscribers is not a failure.
#[derive(Debug, Clone)]
pub struct ChannelExporter {
    sender: broadcast::Sender<ExportEvent>,
}

impl ChannelExporter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: ExportEvent) {
        if self.sender.send(event).is_err() {
            trace!("no export subscribers");
        }
    }
}

#[async_trait]
impl AlertSink for ChannelExporter {
    fn name(&self) -> &str {
        "channel"
    }

    async fn send_alert(&self, alert: &Alert) -> Result<(), ExportError> {
        self.publish(ExportEvent::Alert(alert.clone()));
        Ok(())
    }
}

#[async_trait]
impl PerformanceSink for ChannelExporter {
    fn name(&self) -> &str {
        "channel"
    }

    async fn send_metrics(&self, storage_id: &str, samples: &[MetricSample]) -> Result<(), ExportError> {
        self.publish(ExportEvent::Metrics {
            storage_id: storage_id.to_string(),
            samples: samples.to_vec(),
        });
        Ok(())
    }
}
