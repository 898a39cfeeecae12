//! Self-contained driver with deterministic data
//!
//! Backs smoke runs and tests. Collection behaviour can be steered through the
//! task arguments:
//!
//! - `granularity`: sample spacing in seconds (default 60)
//! - `fail`: any string makes the collection fail with a transport error
//! - `delay_ms`: artificial device latency
//!
//! The device also holds a fixed set of active alerts, one per hour from
//! 2025-01-01T00:00Z, that `list_alerts` reports until they are cleared.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration};

use super::{
    DriverFactory, ParsedAlert, StorageDriver, optional, parse_occur_time,
    parse_sequence_number, required,
};
use crate::error::{DriverError, DriverResult};
use crate::model::{
    AlertQuery, AttributeMap, Category, CollectionWindow, DEFAULT_RESOURCE_TYPE, MetricSample,
    Severity, StorageDevice, StoragePool, Volume,
};
use crate::snmp::security::AlertSource;

pub const VENDOR: &str = "fake_storage";

const METRICS: [&str; 3] = ["iops", "throughput", "responseTime"];
const POOL_COUNT: usize = 2;
const VOLUMES_PER_POOL: usize = 3;
const GIB: u64 = 1 << 30;

/// 2025-01-01T00:00:00Z, occurrence time of the first active alert
const ACTIVE_ALERTS_EPOCH: i64 = 1_735_689_600;
const ACTIVE_ALERTS: [(&str, &str, Severity); 4] = [
    ("FAKE-0001", "Disk fault", Severity::Critical),
    ("FAKE-0002", "Fan degraded", Severity::Major),
    ("FAKE-0003", "Link flapping", Severity::Minor),
    ("FAKE-0004", "Capacity threshold", Severity::Warning),
];

fn severity(raw: &str) -> Severity {
    match raw {
        "Fatal" => Severity::Fatal,
        "Critical" => Severity::Critical,
        "Major" => Severity::Major,
        "Minor" => Severity::Minor,
        "Warning" => Severity::Warning,
        "Informational" => Severity::Informational,
        _ => Severity::NotSpecified,
    }
}

fn category(raw: &str) -> Category {
    match raw {
        "Fault" => Category::Fault,
        "Event" => Category::Event,
        "Recovery" => Category::Recovery,
        _ => Category::NotSpecified,
    }
}

pub struct FakeStorageDriver {
    device: StorageDevice,
    cleared: Mutex<Vec<i64>>,
}

impl FakeStorageDriver {
    pub fn new(device: &StorageDevice) -> Self {
        Self {
            device: device.clone(),
            cleared: Mutex::new(Vec::new()),
        }
    }

    /// Sequence numbers cleared so far
    pub fn cleared(&self) -> Vec<i64> {
        self.cleared
            .lock()
            .map(|cleared| cleared.clone())
            .unwrap_or_default()
    }
}

pub fn factory() -> DriverFactory {
    Arc::new(|device: &StorageDevice| {
        Ok(Arc::new(FakeStorageDriver::new(device)) as Arc<dyn StorageDriver>)
    })
}

#[async_trait]
impl StorageDriver for FakeStorageDriver {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    async fn register_storage(&self) -> DriverResult<StorageDevice> {
        Ok(self.device.clone())
    }

    async fn parse_alert(&self, attrs: &AttributeMap) -> DriverResult<ParsedAlert> {
        let alert_id = required(attrs, "alertId")?;
        let sequence_number =
            parse_sequence_number("sequenceNumber", required(attrs, "sequenceNumber")?)?;
        let raw_severity = required(attrs, "severity")?;

        Ok(ParsedAlert {
            source_id: optional(attrs, "sourceId"),
            alert_id: alert_id.to_string(),
            alert_name: optional(attrs, "alertName"),
            sequence_number,
            severity: severity(raw_severity),
            category: category(&optional(attrs, "category")),
            alert_type: optional(attrs, "type"),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            location: optional(attrs, "location"),
            detailed_info: optional(attrs, "detailedInfo"),
            recovery_advice: optional(attrs, "recoveryAdvice"),
            clear_type: "Manual".to_string(),
            occur_time: attrs.get("occurTime").and_then(|t| parse_occur_time(t)),
        })
    }

    async fn add_trap_config(&self, _source: &AlertSource) -> DriverResult<()> {
        Ok(())
    }

    async fn remove_trap_config(&self, _source: &AlertSource) -> DriverResult<()> {
        Ok(())
    }

    async fn clear_alert(&self, sequence_number: i64) -> DriverResult<()> {
        if let Ok(mut cleared) = self.cleared.lock() {
            cleared.push(sequence_number);
        }
        Ok(())
    }

    async fn collect_perf_metrics(
        &self,
        args: &serde_json::Value,
        window: CollectionWindow,
    ) -> DriverResult<Vec<MetricSample>> {
        if let Some(delay) = args.get("delay_ms").and_then(|d| d.as_u64()) {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(reason) = args.get("fail").and_then(|f| f.as_str()) {
            return Err(DriverError::Transport(reason.to_string()));
        }

        let granularity = args
            .get("granularity")
            .and_then(|g| g.as_i64())
            .filter(|g| *g > 0)
            .unwrap_or(60);
        let step = ChronoDuration::try_seconds(granularity).ok_or_else(|| {
            DriverError::InvalidArgument(format!("granularity {granularity}s is out of range"))
        })?;

        let mut timestamps = Vec::new();
        let mut next = Some(window.start);
        while let Some(ts) = next.filter(|ts| *ts < window.end) {
            timestamps.push(ts.timestamp_millis());
            next = ts.checked_add_signed(step);
        }

        Ok(METRICS
            .iter()
            .enumerate()
            .map(|(i, name)| MetricSample {
                name: name.to_string(),
                labels: [
                    ("storage_id".to_string(), self.device.id.clone()),
                    ("resource_type".to_string(), "array".to_string()),
                ]
                .into_iter()
                .collect(),
                values: timestamps
                    .iter()
                    .map(|ts| (*ts, ((ts / 1000) % 100 + i as i64 * 100) as f64))
                    .collect(),
            })
            .collect())
    }

    async fn list_alerts(&self, query: &AlertQuery) -> DriverResult<Vec<ParsedAlert>> {
        let cleared = self.cleared();
        Ok(ACTIVE_ALERTS
            .iter()
            .zip(1i64..)
            .filter(|(_, sequence_number)| !cleared.contains(sequence_number))
            .filter_map(|((alert_id, name, severity), sequence_number)| {
                let occur_time =
                    DateTime::from_timestamp(ACTIVE_ALERTS_EPOCH + (sequence_number - 1) * 3600, 0)?;
                query.contains(occur_time).then(|| ParsedAlert {
                    source_id: self.device.serial_number.clone(),
                    alert_id: alert_id.to_string(),
                    alert_name: name.to_string(),
                    sequence_number,
                    severity: *severity,
                    category: Category::Fault,
                    alert_type: "EquipmentAlarm".to_string(),
                    resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
                    location: format!("{} controller A", self.device.name),
                    detailed_info: name.to_string(),
                    recovery_advice: String::new(),
                    clear_type: "Manual".to_string(),
                    occur_time: Some(occur_time),
                })
            })
            .collect())
    }

    async fn list_pools(&self) -> DriverResult<Vec<StoragePool>> {
        Ok((0..POOL_COUNT)
            .map(|i| StoragePool {
                native_storage_pool_id: format!("pool-{i}"),
                name: format!("{}-pool-{i}", self.device.name),
                total_capacity: 1024 * GIB,
                used_capacity: 256 * GIB * (i as u64 + 1),
                free_capacity: 1024 * GIB - 256 * GIB * (i as u64 + 1),
            })
            .collect())
    }

    async fn list_volumes(&self) -> DriverResult<Vec<Volume>> {
        Ok((0..POOL_COUNT)
            .flat_map(|p| {
                (0..VOLUMES_PER_POOL).map(move |v| Volume {
                    native_volume_id: format!("vol-{p}-{v}"),
                    native_storage_pool_id: format!("pool-{p}"),
                    name: format!("volume-{p}-{v}"),
                    total_capacity: 64 * GIB,
                    used_capacity: 16 * GIB * (v as u64 + 1),
                })
            })
            .collect())
    }
}
