//! Management-plane entry points consumed by the REST layer

use serde::Deserialize;
use tracing::{info, instrument};

use crate::db::Database;
use crate::error::DriverResult;
use crate::exporter::AlertExporter;

/// Body of an alert clear request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ClearAlertRequest {
    pub sequence_number: i64,
}

/// Clears one alert instance on the device
///
/// The storage must exist; an unknown id fails with `StorageNotFound`
/// before the driver layer is reached. Device errors are returned as-is.
#[instrument(skip(db, exporter))]
pub async fn clear_alert(
    db: &dyn Database,
    exporter: &AlertExporter,
    storage_id: &str,
    request: ClearAlertRequest,
) -> DriverResult<()> {
    db.storage_get(storage_id).await?;
    exporter.clear(storage_id, request.sequence_number).await?;
    info!(sequence_number = request.sequence_number, "alert cleared");
    Ok(())
}
