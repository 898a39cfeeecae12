//! Alert normalization
//!
//! Turns the attribute map of one notification into a canonical [`Alert`]:
//! the device's driver extracts the vendor fields, this module validates them
//! and adds provenance from the device record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::db::Database;
use crate::drivers::{DriverManager, ParsedAlert};
use crate::error::{DriverError, DriverResult};
use crate::exporter::{AlertExporter, ExportError};
use crate::model::{Alert, AttributeMap, StorageDevice};
use crate::snmp::security::TrapContext;

/// Why one notification did not become an exported alert
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("export failed: {0}")]
    Export(#[from] ExportError),
}

#[derive(Clone)]
pub struct AlertProcessor {
    db: Arc<dyn Database>,
    drivers: DriverManager,
    exporter: AlertExporter,
}

impl AlertProcessor {
    pub fn new(db: Arc<dyn Database>, drivers: DriverManager, exporter: AlertExporter) -> Self {
        Self {
            db,
            drivers,
            exporter,
        }
    }

    /// Canonical alert for `attrs`, received now
    pub async fn normalize(&self, storage_id: &str, attrs: &AttributeMap) -> DriverResult<Alert> {
        self.normalize_at(storage_id, attrs, Utc::now()).await
    }

    /// Canonical alert for `attrs`; `received_at` stands in for a missing
    /// device time
    pub async fn normalize_at(
        &self,
        storage_id: &str,
        attrs: &AttributeMap,
        received_at: DateTime<Utc>,
    ) -> DriverResult<Alert> {
        let device = self.db.storage_get(storage_id).await?;
        let parsed = self.drivers.parse_alert(storage_id, attrs).await?;
        build_alert(&device, parsed, received_at)
    }

    /// Normalizes and exports one authenticated notification
    ///
    /// Nothing is exported when normalization fails.
    #[instrument(skip(self, attrs), fields(storage_id = %ctx.storage_id, source = %ctx.source))]
    pub async fn process(&self, attrs: &AttributeMap, ctx: &TrapContext) -> Result<Alert, ProcessError> {
        let alert = self.normalize(&ctx.storage_id, attrs).await?;
        debug!(
            alert_id = %alert.alert_id,
            sequence_number = alert.sequence_number,
            security_level = %ctx.security_level,
            "alert normalized"
        );

        if let Err(e) = self.exporter.export(&alert).await {
            warn!(alert_id = %alert.alert_id, "failed to export alert: {e}");
            return Err(e.into());
        }
        Ok(alert)
    }
}

/// Validates the driver output and adds provenance fields
pub fn build_alert(
    device: &StorageDevice,
    parsed: ParsedAlert,
    received_at: DateTime<Utc>,
) -> DriverResult<Alert> {
    if parsed.alert_id.trim().is_empty() {
        return Err(DriverError::InvalidAlertData("empty alert_id".to_string()));
    }
    if device.id.is_empty() {
        return Err(DriverError::InvalidAlertData("empty storage_id".to_string()));
    }

    Ok(Alert {
        storage_id: device.id.clone(),
        storage_name: device.name.clone(),
        manufacturer: device.vendor.clone(),
        product_name: device.model.clone(),
        serial_number: device.serial_number.clone(),
        source_id: parsed.source_id,
        alert_id: parsed.alert_id,
        alert_name: parsed.alert_name,
        sequence_number: parsed.sequence_number,
        severity: parsed.severity,
        category: parsed.category,
        alert_type: parsed.alert_type,
        resource_type: parsed.resource_type,
        location: parsed.location,
        detailed_info: parsed.detailed_info,
        recovery_advice: parsed.recovery_advice,
        clear_type: parsed.clear_type,
        occur_time: parsed.occur_time.unwrap_or(received_at),
    })
}
