use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};

use super::CollectionFailure;
use crate::config::CollectionConfig;
use crate::db::Database;
use crate::drivers::DriverManager;
use crate::exporter::AlertExporter;
use crate::model::{CollectionWindow, TaskInstance, TaskResult};
use crate::scheduler::Scheduler;

/// Retry budget stamped on every new task instance
pub const MAX_TASK_RETRY_COUNT: u32 = 3;

/// One async mutex per storage id
#[derive(Default)]
struct StorageLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl StorageLocks {
    async fn lock(&self, storage_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(storage_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

/// `[start, start + interval seconds)`, or `None` past the representable range
fn collection_window(start: DateTime<Utc>, interval: u64) -> Option<CollectionWindow> {
    let length = TimeDelta::try_seconds(i64::try_from(interval).ok()?)?;
    Some(CollectionWindow {
        start,
        end: start.checked_add_signed(length)?,
    })
}

/// Executes one task instance
#[derive(Clone)]
pub struct PerformanceCollectionTask {
    db: Arc<dyn Database>,
    drivers: DriverManager,
    exporter: AlertExporter,
    scheduler: Scheduler,

    /// Delay between attempts; `None` means a failure is final
    retry_backoff: Option<Duration>,
    storage_locks: Option<Arc<StorageLocks>>,
}

impl PerformanceCollectionTask {
    pub fn new(
        db: Arc<dyn Database>,
        drivers: DriverManager,
        exporter: AlertExporter,
        scheduler: Scheduler,
        config: &CollectionConfig,
    ) -> Self {
        Self {
            db,
            drivers,
            exporter,
            scheduler,
            retry_backoff: config
                .retry
                .enabled
                .then(|| Duration::from_secs(config.retry.backoff_secs)),
            storage_locks: config
                .serialize_per_storage
                .then(|| Arc::new(StorageLocks::default())),
        }
    }

    /// Runs the collection for `task_instance_id` and removes its job
    ///
    /// Never fails: the outcome is stored on the instance and returned, or
    /// `None` if the instance could not be loaded at all.
    #[instrument(skip(self))]
    pub async fn collect(&self, task_instance_id: &str) -> Option<TaskResult> {
        let result = match self.db.task_instance_get(task_instance_id).await {
            Ok(instance) => Some(self.execute(instance).await),
            Err(e) => {
                error!("failed to load task instance: {e}");
                None
            }
        };

        if self.scheduler.get_job(task_instance_id).is_some() {
            self.scheduler.remove_job(task_instance_id);
        }
        result
    }

    async fn execute(&self, mut instance: TaskInstance) -> TaskResult {
        let _storage_guard = match &self.storage_locks {
            Some(locks) => Some(locks.lock(&instance.storage_id).await),
            None => None,
        };

        let launch_time = Utc::now();
        instance.launch_time = Some(launch_time);
        instance.result = Some(TaskResult::Running);

        let outcome = match self.db.task_instance_update(&instance.id, &instance).await {
            Ok(()) => match collection_window(launch_time, instance.interval) {
                Some(window) => self.collect_with_retry(&instance, window).await,
                None => Err(CollectionFailure::WindowOutOfRange(instance.interval)),
            },
            Err(e) => Err(e.into()),
        };

        let result = match outcome {
            Ok(series) => {
                info!(
                    storage_id = %instance.storage_id,
                    method = %instance.method,
                    series,
                    "performance collection done"
                );
                TaskResult::Succeed
            }
            Err(e) => {
                error!(
                    storage_id = %instance.storage_id,
                    method = %instance.method,
                    "failed to collect performance metrics: {e}"
                );
                TaskResult::Failed
            }
        };

        instance.result = Some(result);
        if let Err(e) = self.db.task_instance_update(&instance.id, &instance).await {
            error!("failed to record task result {result}: {e}");
        }
        result
    }

    async fn collect_with_retry(
        &self,
        instance: &TaskInstance,
        window: CollectionWindow,
    ) -> Result<usize, CollectionFailure> {
        let Some(backoff) = self.retry_backoff else {
            return self.collect_once(instance, window).await;
        };

        let attempts = instance.retry_count.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.collect_once(instance, window).await {
                Ok(series) => return Ok(series),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, "collection attempt failed, retrying in {backoff:?}: {e}");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn collect_once(
        &self,
        instance: &TaskInstance,
        window: CollectionWindow,
    ) -> Result<usize, CollectionFailure> {
        let samples = self
            .drivers
            .collect_perf_metrics(&instance.storage_id, &instance.args, window)
            .await?;
        self.exporter
            .export_metrics(&instance.storage_id, &samples)
            .await?;
        Ok(samples.len())
    }
}
