//! Periodic performance collection
//!
//! The [`CollectionOrchestrator`] fires on a recurring scheduler trigger,
//! turns every task template into a task instance and schedules a one-shot
//! job for it. The job runs a [`PerformanceCollectionTask`], which records
//! the outcome on the instance and removes its own job.
//!
//! [`AlertSyncTask`] is the on-demand counterpart for alerts: it pulls a
//! device's active alerts into the exporters and clears them in batches.

pub mod alert_sync;
pub mod orchestrator;
pub mod performance;

use thiserror::Error;

use crate::db::DbError;
use crate::error::DriverError;
use crate::exporter::ExportError;
use crate::scheduler::SchedulerError;

pub use alert_sync::AlertSyncTask;
pub use orchestrator::CollectionOrchestrator;
pub use performance::{MAX_TASK_RETRY_COUNT, PerformanceCollectionTask};

/// Why a collection step failed
///
/// Recorded as `FAILED` on the task instance and logged; never raised
/// through the scheduler.
#[derive(Error, Debug)]
pub enum CollectionFailure {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("metric export failed: {0}")]
    Export(#[from] ExportError),

    #[error("persistence error: {0}")]
    Database(#[from] DbError),

    #[error("scheduling failed: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("collection window of {0}s is out of range")]
    WindowOutOfRange(u64),
}
