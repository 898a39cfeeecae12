//! Vendor factories and the per-storage driver cache

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, instrument};

use super::StorageDriver;
use crate::db::Database;
use crate::error::{DriverError, DriverResult};
use crate::model::StorageDevice;

/// Builds a driver for one device record
pub type DriverFactory =
    Arc<dyn Fn(&StorageDevice) -> DriverResult<Arc<dyn StorageDriver>> + Send + Sync>;

type Slot = Arc<OnceCell<Arc<dyn StorageDriver>>>;

/// Resolves storage ids to cached driver instances
///
/// Factories are registered before the registry is shared. Construction is
/// serialised per storage id: concurrent first resolutions of the same id
/// wait on one [`OnceCell`] and share the single instance it produces.
pub struct DriverRegistry {
    db: Arc<dyn Database>,
    factories: HashMap<String, DriverFactory>,
    cache: Mutex<HashMap<String, Slot>>,
}

impl DriverRegistry {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self {
            db,
            factories: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the drivers shipped in this crate
    pub fn with_builtin_drivers(db: Arc<dyn Database>) -> Self {
        let mut registry = Self::new(db);
        registry.register(super::oceanstor::VENDOR, super::oceanstor::factory());
        registry.register(super::vmax::VENDOR, super::vmax::factory());
        registry.register(super::fake::VENDOR, super::fake::factory());
        registry
    }

    /// Registers (or replaces) the factory for `vendor`
    pub fn register(&mut self, vendor: &str, factory: DriverFactory) {
        info!(vendor, "registered storage driver");
        self.factories.insert(vendor.to_string(), factory);
    }

    pub fn vendors(&self) -> Vec<String> {
        let mut vendors: Vec<_> = self.factories.keys().cloned().collect();
        vendors.sort();
        vendors
    }

    /// Cached driver for `storage_id`, constructing it on first use
    #[instrument(skip(self))]
    pub async fn resolve(&self, storage_id: &str) -> DriverResult<Arc<dyn StorageDriver>> {
        let slot = {
            let mut cache = self.cache.lock().await;
            cache.entry(storage_id.to_string()).or_default().clone()
        };

        let result = slot
            .get_or_try_init(|| async {
                let device = self.db.storage_get(storage_id).await?;
                let factory = self
                    .factories
                    .get(&device.vendor)
                    .ok_or_else(|| DriverError::DriverNotFound(device.vendor.clone()))?;
                debug!(vendor = %device.vendor, "constructing driver");
                factory(&device)
            })
            .await
            .cloned();

        if result.is_err() {
            // leave no empty slot behind for ids that never resolve
            let mut cache = self.cache.lock().await;
            if cache
                .get(storage_id)
                .is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized())
            {
                cache.remove(storage_id);
            }
        }

        result
    }

    /// Evicts the cached driver; returns whether one was cached
    pub async fn remove(&self, storage_id: &str) -> bool {
        let removed = self.cache.lock().await.remove(storage_id);
        let existed = removed.is_some_and(|slot| slot.initialized());
        if existed {
            info!(storage_id, "driver evicted");
        }
        existed
    }

    pub async fn cached(&self) -> usize {
        self.cache
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }
}
