//! Driver abstraction layer
//!
//! Every storage vendor is reached through one [`StorageDriver`]
//! implementation. Drivers are constructed by factories registered in the
//! [`DriverRegistry`] at startup and cached per storage id. The
//! [`DriverManager`] is the façade callers use; it applies the per-call
//! timeout.
//!
//! ## Capabilities
//!
//! Only `register_storage` and `parse_alert` are mandatory. Every other
//! capability defaults to [`DriverError::NotSupported`] so that an
//! unimplemented operation is reported rather than silently ignored.

pub mod fake;
pub mod manager;
pub mod oceanstor;
pub mod registry;
pub mod vmax;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::error::{DriverError, DriverResult};
use crate::model::{
    AlertQuery, AttributeMap, Category, CollectionWindow, MetricSample, Severity, StorageDevice,
    StoragePool, Volume,
};
use crate::snmp::security::AlertSource;

pub use manager::DriverManager;
pub use registry::{DriverFactory, DriverRegistry};

/// Vendor fields extracted from one notification
///
/// Provenance (`storage_*`, manufacturer, product, serial) is not part of it;
/// the alert processor adds that from the device record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedAlert {
    pub source_id: String,
    pub alert_id: String,
    pub alert_name: String,
    pub sequence_number: i64,
    pub severity: Severity,
    pub category: Category,
    pub alert_type: String,
    pub resource_type: String,
    pub location: String,
    pub detailed_info: String,
    pub recovery_advice: String,
    pub clear_type: String,

    /// Device reported time, if the notification carried a parsable one
    pub occur_time: Option<DateTime<Utc>>,
}

/// Capability interface implemented once per storage vendor
#[async_trait]
pub trait StorageDriver: Send + Sync + 'static {
    /// Vendor key this driver was registered under
    fn vendor(&self) -> &'static str;

    /// Queries the device for its identity
    async fn register_storage(&self) -> DriverResult<StorageDevice>;

    /// Extracts the vendor fields from a notification's attributes
    ///
    /// Unknown severity or category vocabulary maps to `NotSpecified`. Missing
    /// identity attributes are `InvalidAlertData`.
    async fn parse_alert(&self, attrs: &AttributeMap) -> DriverResult<ParsedAlert>;

    /// Points the device's trap destination at this listener
    async fn add_trap_config(&self, _source: &AlertSource) -> DriverResult<()> {
        Err(DriverError::NotSupported("add_trap_config"))
    }

    async fn remove_trap_config(&self, _source: &AlertSource) -> DriverResult<()> {
        Err(DriverError::NotSupported("remove_trap_config"))
    }

    /// Acknowledges one alert instance on the device
    async fn clear_alert(&self, _sequence_number: i64) -> DriverResult<()> {
        Err(DriverError::NotSupported("clear_alert"))
    }

    /// Pulls the device's current alerts, for catching up on missed traps
    async fn list_alerts(&self, _query: &AlertQuery) -> DriverResult<Vec<ParsedAlert>> {
        Err(DriverError::NotSupported("list_alerts"))
    }

    async fn collect_perf_metrics(
        &self,
        _args: &serde_json::Value,
        _window: CollectionWindow,
    ) -> DriverResult<Vec<MetricSample>> {
        Err(DriverError::NotSupported("collect_perf_metrics"))
    }

    async fn list_pools(&self) -> DriverResult<Vec<StoragePool>> {
        Err(DriverError::NotSupported("list_pools"))
    }

    async fn list_volumes(&self) -> DriverResult<Vec<Volume>> {
        Err(DriverError::NotSupported("list_volumes"))
    }
}

/// Attribute that must be present and non-empty
pub(crate) fn required<'a>(attrs: &'a AttributeMap, key: &str) -> DriverResult<&'a str> {
    match attrs.get(key).map(|v| v.trim()) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(DriverError::InvalidAlertData(format!(
            "missing attribute {key}"
        ))),
    }
}

/// Attribute value or an empty string
pub(crate) fn optional(attrs: &AttributeMap, key: &str) -> String {
    attrs.get(key).map(|v| v.trim().to_string()).unwrap_or_default()
}

pub(crate) fn parse_sequence_number(key: &str, raw: &str) -> DriverResult<i64> {
    raw.parse::<i64>().map_err(|_| {
        DriverError::InvalidAlertData(format!("{key} is not an integer: '{raw}'"))
    })
}

/// Parses a device-reported occurrence time
///
/// Accepts SNMP DateAndTime octets rendered as `0x` hex (8 bytes local time,
/// 11 bytes with UTC offset), RFC 3339, `YYYY-MM-DD HH:MM:SS` (taken as UTC)
/// and epoch milliseconds. Anything else yields `None`.
pub fn parse_occur_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(hex_digits) = raw.strip_prefix("0x") {
        let bytes = hex::decode(hex_digits).ok()?;
        return parse_date_and_time(&bytes);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }

    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

fn parse_date_and_time(bytes: &[u8]) -> Option<DateTime<Utc>> {
    if bytes.len() != 8 && bytes.len() != 11 {
        return None;
    }

    let year = u16::from_be_bytes([bytes[0], bytes[1]]) as i32;
    let naive = NaiveDate::from_ymd_opt(year, bytes[2] as u32, bytes[3] as u32)?.and_hms_milli_opt(
        bytes[4] as u32,
        bytes[5] as u32,
        bytes[6] as u32,
        bytes[7] as u32 * 100,
    )?;

    if bytes.len() == 8 {
        return Some(naive.and_utc());
    }

    let offset_secs = (bytes[9] as i32 * 3600) + (bytes[10] as i32 * 60);
    let offset = match bytes[8] {
        b'+' => FixedOffset::east_opt(offset_secs)?,
        b'-' => FixedOffset::west_opt(offset_secs)?,
        _ => return None,
    };
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
