//! Persistence collaborator trait
//!
//! The pipeline reads devices and alert sources, and the collection side reads
//! and writes task templates and task instances. Everything else about the
//! store (retention, schema management, deletion policy) is the store's own
//! concern.

use async_trait::async_trait;

use super::error::DbResult;
use crate::model::{NewTaskInstance, StorageDevice, TaskInstance, TaskTemplate};
use crate::snmp::security::AlertSource;

/// Trait for persistence backends
///
/// Implementations must be `Send + Sync`; one instance is shared by the trap
/// listener, the orchestrator and every collection task.
#[async_trait]
pub trait Database: Send + Sync {
    /// Device record by id, `DbError::NotFound` if absent
    async fn storage_get(&self, id: &str) -> DbResult<StorageDevice>;

    /// Inserts or replaces a device record
    async fn storage_create(&self, storage: &StorageDevice) -> DbResult<()>;

    async fn storage_list(&self) -> DbResult<Vec<StorageDevice>>;

    /// Inserts or replaces the alert source for `source.host`
    async fn alert_source_create(&self, source: &AlertSource) -> DbResult<()>;

    async fn alert_source_get_all(&self) -> DbResult<Vec<AlertSource>>;

    /// Inserts or replaces a task template
    async fn task_template_create(&self, template: &TaskTemplate) -> DbResult<()>;

    async fn task_template_get_all(&self) -> DbResult<Vec<TaskTemplate>>;

    /// Persists the mutable fields of a template (currently `last_run_time`)
    async fn task_template_update(&self, id: &str, template: &TaskTemplate) -> DbResult<()>;

    /// Stores a new instance and returns it with its assigned id
    async fn task_instance_create(&self, instance: NewTaskInstance) -> DbResult<TaskInstance>;

    async fn task_instance_get(&self, id: &str) -> DbResult<TaskInstance>;

    /// Persists `launch_time` and `result`
    async fn task_instance_update(&self, id: &str, instance: &TaskInstance) -> DbResult<()>;

    /// Drops an instance that never got scheduled; unknown ids are ignored
    async fn task_instance_delete(&self, id: &str) -> DbResult<()>;
}
