use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::alerts::{ProcessError, build_alert};
use crate::db::Database;
use crate::drivers::DriverManager;
use crate::error::DriverError;
use crate::exporter::AlertExporter;
use crate::model::AlertQuery;

/// Pulls alerts from a device and clears them in batches
///
/// Covers what the trap path cannot: alerts raised while the listener was
/// down, and operator-driven bulk acknowledgement.
#[derive(Clone)]
pub struct AlertSyncTask {
    db: Arc<dyn Database>,
    drivers: DriverManager,
    exporter: AlertExporter,
}

impl AlertSyncTask {
    pub fn new(db: Arc<dyn Database>, drivers: DriverManager, exporter: AlertExporter) -> Self {
        Self {
            db,
            drivers,
            exporter,
        }
    }

    /// Exports every alert the device reports inside `query`
    ///
    /// Alerts failing validation are skipped and logged. Returns the number
    /// exported.
    #[instrument(skip(self))]
    pub async fn sync_alerts(&self, storage_id: &str, query: &AlertQuery) -> Result<usize, ProcessError> {
        let device = self.db.storage_get(storage_id).await.map_err(DriverError::from)?;
        let parsed = self.drivers.list_alerts(storage_id, query).await?;
        let received_at = Utc::now();

        let mut exported = 0;
        for parsed in parsed {
            let sequence_number = parsed.sequence_number;
            let alert = match build_alert(&device, parsed, received_at) {
                Ok(alert) => alert,
                Err(e) => {
                    warn!(sequence_number, "skipping invalid alert from device: {e}");
                    continue;
                }
            };
            self.exporter.export(&alert).await?;
            exported += 1;
        }

        info!(exported, "alert sync done");
        Ok(exported)
    }

    /// Clears each sequence number on the device
    ///
    /// Every number is attempted; the ones that failed are returned.
    #[instrument(skip(self))]
    pub async fn clear_alerts(&self, storage_id: &str, sequence_numbers: &[i64]) -> Vec<i64> {
        let mut failed = Vec::new();
        for &sequence_number in sequence_numbers {
            if let Err(e) = self.exporter.clear(storage_id, sequence_number).await {
                error!(sequence_number, "failed to clear alert: {e}");
                failed.push(sequence_number);
            }
        }
        failed
    }
}
