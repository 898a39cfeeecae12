//! Alert and metric export
//!
//! The [`ExportManager`] fans records out to every configured sink. A failing
//! sink does not stop delivery to the others; the export as a whole reports
//! failure afterwards. The [`AlertExporter`] is what the pipeline and the
//! collection tasks hold: it exports alerts and metrics and issues device-side
//! alert clears.

pub mod sinks;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, instrument};

use crate::drivers::DriverManager;
use crate::error::DriverResult;
use crate::model::{Alert, MetricSample};
pub use sinks::{ChannelExporter, ExportEvent, LogExporter, WebhookExporter};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("{failed} of {total} sinks failed")]
    Partial { failed: usize, total: usize },
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send_alert(&self, alert: &Alert) -> Result<(), ExportError>;
}

#[async_trait]
pub trait PerformanceSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send_metrics(&self, storage_id: &str, samples: &[MetricSample]) -> Result<(), ExportError>;
}

fn default_webhook_timeout() -> u64 {
    10
}

/// One configured export target
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExporterConfig {
    Log,
    Webhook {
        url: String,
        #[serde(default = "default_webhook_timeout")]
        timeout_secs: u64,
    },
}

#[derive(Default, Clone)]
pub struct ExportManager {
    alert_sinks: Vec<Arc<dyn AlertSink>>,
    perf_sinks: Vec<Arc<dyn PerformanceSink>>,
}

impl ExportManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &[ExporterConfig]) -> Result<Self, ExportError> {
        let mut manager = Self::new();
        for config in configs {
            match config {
                ExporterConfig::Log => {
                    let sink = Arc::new(LogExporter);
                    manager = manager.with_alert_sink(sink.clone()).with_perf_sink(sink);
                }
                ExporterConfig::Webhook { url, timeout_secs } => {
                    let sink = Arc::new(WebhookExporter::new(
                        url.clone(),
                        Duration::from_secs(*timeout_secs),
                    )?);
                    manager = manager.with_alert_sink(sink.clone()).with_perf_sink(sink);
                }
            }
        }
        Ok(manager)
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    pub fn with_perf_sink(mut self, sink: Arc<dyn PerformanceSink>) -> Self {
        self.perf_sinks.push(sink);
        self
    }

    pub async fn export_alert(&self, alert: &Alert) -> Result<(), ExportError> {
        let mut failed = 0;
        for sink in &self.alert_sinks {
            if let Err(e) = sink.send_alert(alert).await {
                error!(sink = sink.name(), storage_id = %alert.storage_id, "alert export failed: {e}");
                failed += 1;
            }
        }
        Self::outcome(failed, self.alert_sinks.len())
    }

    pub async fn export_metrics(&self, storage_id: &str, samples: &[MetricSample]) -> Result<(), ExportError> {
        let mut failed = 0;
        for sink in &self.perf_sinks {
            if let Err(e) = sink.send_metrics(storage_id, samples).await {
                error!(sink = sink.name(), storage_id, "metric export failed: {e}");
                failed += 1;
            }
        }
        Self::outcome(failed, self.perf_sinks.len())
    }

    fn outcome(failed: usize, total: usize) -> Result<(), ExportError> {
        if failed == 0 {
            Ok(())
        } else {
            Err(ExportError::Partial { failed, total })
        }
    }
}

/// Downstream side of the alert pipeline and of metric collection
#[derive(Clone)]
pub struct AlertExporter {
    sinks: Arc<ExportManager>,
    drivers: DriverManager,
}

impl AlertExporter {
    pub fn new(sinks: Arc<ExportManager>, drivers: DriverManager) -> Self {
        Self { sinks, drivers }
    }

    /// Forwards a completed alert to every sink
    #[instrument(skip(self, alert), fields(storage_id = %alert.storage_id, sequence_number = alert.sequence_number))]
    pub async fn export(&self, alert: &Alert) -> Result<(), ExportError> {
        self.sinks.export_alert(alert).await
    }

    /// Metrics channel used by the collection tasks
    pub async fn export_metrics(&self, storage_id: &str, samples: &[MetricSample]) -> Result<(), ExportError> {
        self.sinks.export_metrics(storage_id, samples).await
    }

    /// Clears one alert instance on the device
    ///
    /// One attempt, no local state; driver errors are returned unchanged.
    pub async fn clear(&self, storage_id: &str, sequence_number: i64) -> DriverResult<()> {
        self.drivers.clear_alert(storage_id, sequence_number).await
    }
}
