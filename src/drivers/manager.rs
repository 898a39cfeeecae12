//! Driver façade with bounded device calls

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{instrument, warn};

use super::{DriverRegistry, ParsedAlert, StorageDriver};
use crate::error::{DriverError, DriverResult};
use crate::model::{
    AlertQuery, AttributeMap, CollectionWindow, MetricSample, StorageDevice, StoragePool, Volume,
};
use crate::snmp::security::AlertSource;

/// Default bound on a single device call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Entry point for everything outside the driver layer
///
/// Each capability call resolves the driver, then runs the call under the
/// configured timeout so an unresponsive device cannot hold a worker forever.
/// An expired call is abandoned, not retried.
#[derive(Clone)]
pub struct DriverManager {
    registry: Arc<DriverRegistry>,
    call_timeout: Duration,
}

impl DriverManager {
    pub fn new(registry: Arc<DriverRegistry>, call_timeout: Duration) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    pub fn registry(&self) -> &Arc<DriverRegistry> {
        &self.registry
    }

    async fn call<T, F, Fut>(&self, operation: &'static str, storage_id: &str, f: F) -> DriverResult<T>
    where
        F: FnOnce(Arc<dyn StorageDriver>) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let driver = self.registry.resolve(storage_id).await?;
        match tokio::time::timeout(self.call_timeout, f(driver)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(storage_id, operation, timeout = ?self.call_timeout, "device call timed out");
                Err(DriverError::Timeout {
                    operation,
                    after: self.call_timeout,
                })
            }
        }
    }

    pub async fn parse_alert(&self, storage_id: &str, attrs: &AttributeMap) -> DriverResult<ParsedAlert> {
        self.call("parse_alert", storage_id, |driver| async move {
            driver.parse_alert(attrs).await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn clear_alert(&self, storage_id: &str, sequence_number: i64) -> DriverResult<()> {
        self.call("clear_alert", storage_id, |driver| async move {
            driver.clear_alert(sequence_number).await
        })
        .await
    }

    #[instrument(skip(self))]
    pub async fn list_alerts(&self, storage_id: &str, query: &AlertQuery) -> DriverResult<Vec<ParsedAlert>> {
        self.call("list_alerts", storage_id, |driver| async move {
            driver.list_alerts(query).await
        })
        .await
    }

    #[instrument(skip(self, args))]
    pub async fn collect_perf_metrics(
        &self,
        storage_id: &str,
        args: &serde_json::Value,
        window: CollectionWindow,
    ) -> DriverResult<Vec<MetricSample>> {
        self.call("collect_perf_metrics", storage_id, |driver| async move {
            driver.collect_perf_metrics(args, window).await
        })
        .await
    }

    pub async fn register_storage(&self, storage_id: &str) -> DriverResult<StorageDevice> {
        self.call("register_storage", storage_id, |driver| async move {
            driver.register_storage().await
        })
        .await
    }

    pub async fn list_pools(&self, storage_id: &str) -> DriverResult<Vec<StoragePool>> {
        self.call("list_pools", storage_id, |driver| async move { driver.list_pools().await })
            .await
    }

    pub async fn list_volumes(&self, storage_id: &str) -> DriverResult<Vec<Volume>> {
        self.call("list_volumes", storage_id, |driver| async move {
            driver.list_volumes().await
        })
        .await
    }

    pub async fn add_trap_config(&self, source: &AlertSource) -> DriverResult<()> {
        self.call("add_trap_config", &source.storage_id, |driver| async move {
            driver.add_trap_config(source).await
        })
        .await
    }

    pub async fn remove_trap_config(&self, source: &AlertSource) -> DriverResult<()> {
        self.call("remove_trap_config", &source.storage_id, |driver| async move {
            driver.remove_trap_config(source).await
        })
        .await
    }

    /// Drops the cached driver after a device is deregistered
    pub async fn remove_driver(&self, storage_id: &str) -> bool {
        self.registry.remove(storage_id).await
    }
}
