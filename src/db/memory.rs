//! In-memory persistence (no durability)
//!
//! Used when no database is configured and throughout the tests.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::backend::Database;
use super::error::{DbError, DbResult};
use crate::model::{NewTaskInstance, StorageDevice, TaskInstance, TaskTemplate};
use crate::snmp::security::AlertSource;

#[derive(Default)]
pub struct MemoryDatabase {
    storages: RwLock<HashMap<String, StorageDevice>>,
    alert_sources: RwLock<HashMap<IpAddr, AlertSource>>,

    // ordered so `task_template_get_all` is stable
    templates: RwLock<BTreeMap<String, TaskTemplate>>,
    instances: RwLock<HashMap<String, TaskInstance>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored instance, for inspection in tests and diagnostics
    pub async fn task_instances(&self) -> Vec<TaskInstance> {
        self.instances.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn storage_get(&self, id: &str) -> DbResult<StorageDevice> {
        self.storages
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("storage", id))
    }

    async fn storage_create(&self, storage: &StorageDevice) -> DbResult<()> {
        self.storages
            .write()
            .await
            .insert(storage.id.clone(), storage.clone());
        Ok(())
    }

    async fn storage_list(&self) -> DbResult<Vec<StorageDevice>> {
        let mut list: Vec<_> = self.storages.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(list)
    }

    async fn alert_source_create(&self, source: &AlertSource) -> DbResult<()> {
        self.alert_sources
            .write()
            .await
            .insert(source.host, source.clone());
        Ok(())
    }

    async fn alert_source_get_all(&self) -> DbResult<Vec<AlertSource>> {
        Ok(self.alert_sources.read().await.values().cloned().collect())
    }

    async fn task_template_create(&self, template: &TaskTemplate) -> DbResult<()> {
        self.templates
            .write()
            .await
            .insert(template.id.clone(), template.clone());
        Ok(())
    }

    async fn task_template_get_all(&self) -> DbResult<Vec<TaskTemplate>> {
        Ok(self.templates.read().await.values().cloned().collect())
    }

    async fn task_template_update(&self, id: &str, template: &TaskTemplate) -> DbResult<()> {
        let mut templates = self.templates.write().await;
        let stored = templates
            .get_mut(id)
            .ok_or_else(|| DbError::not_found("task template", id))?;
        stored.last_run_time = template.last_run_time;
        Ok(())
    }

    async fn task_instance_create(&self, instance: NewTaskInstance) -> DbResult<TaskInstance> {
        let instance = TaskInstance::from_new(Uuid::new_v4().to_string(), instance);
        self.instances
            .write()
            .await
            .insert(instance.id.clone(), instance.clone());
        Ok(instance)
    }

    async fn task_instance_get(&self, id: &str) -> DbResult<TaskInstance> {
        self.instances
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DbError::not_found("task instance", id))
    }

    async fn task_instance_update(&self, id: &str, instance: &TaskInstance) -> DbResult<()> {
        let mut instances = self.instances.write().await;
        let stored = instances
            .get_mut(id)
            .ok_or_else(|| DbError::not_found("task instance", id))?;
        stored.launch_time = instance.launch_time;
        stored.result = instance.result;
        Ok(())
    }

    async fn task_instance_delete(&self, id: &str) -> DbResult<()> {
        self.instances.write().await.remove(id);
        Ok(())
    }
}
