//! Records shared by the alert pipeline and the collection scheduler
//!
//! The canonical [`Alert`] is a fixed-schema record; everything vendor specific
//! is squeezed into it by the drivers. Task templates and task instances are the
//! persistence collaborator's view of recurring collection work.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Flat attribute map decoded from one notification (short name -> rendered value)
pub type AttributeMap = BTreeMap<String, String>;

/// Resource type reported when a driver has nothing more specific
pub const DEFAULT_RESOURCE_TYPE: &str = "Storage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDevice {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub model: String,
    pub serial_number: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Fatal,
    Critical,
    Major,
    Minor,
    Warning,
    Informational,
    NotSpecified,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Fatal => "Fatal",
            Severity::Critical => "Critical",
            Severity::Major => "Major",
            Severity::Minor => "Minor",
            Severity::Warning => "Warning",
            Severity::Informational => "Informational",
            Severity::NotSpecified => "NotSpecified",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Fault,
    Event,
    Recovery,
    NotSpecified,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Fault => "Fault",
            Category::Event => "Event",
            Category::Recovery => "Recovery",
            Category::NotSpecified => "NotSpecified",
        };
        write!(f, "{s}")
    }
}

/// Canonical, vendor-neutral alert
///
/// Provenance fields (`storage_*`, `manufacturer`, `product_name`,
/// `serial_number`) are filled by the alert processor from the device record,
/// never by the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub storage_id: String,
    pub storage_name: String,
    pub manufacturer: String,
    pub product_name: String,
    pub serial_number: String,

    /// Node or array identifier inside the device
    pub source_id: String,

    pub alert_id: String,
    pub alert_name: String,

    /// Identifies this occurrence; required to clear it on the device later
    pub sequence_number: i64,

    pub severity: Severity,
    pub category: Category,

    #[serde(rename = "type")]
    pub alert_type: String,
    pub resource_type: String,
    pub location: String,
    pub detailed_info: String,
    pub recovery_advice: String,
    pub clear_type: String,

    pub occur_time: DateTime<Utc>,
}

/// Execution result of one task instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskResult {
    Running,
    Succeed,
    Failed,
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskResult::Running => "RUNNING",
            TaskResult::Succeed => "SUCCEED",
            TaskResult::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(TaskResult::Running),
            "SUCCEED" => Ok(TaskResult::Succeed),
            "FAILED" => Ok(TaskResult::Failed),
            other => Err(format!("unknown task result: {other}")),
        }
    }
}

/// Standing specification of a recurring collection for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub id: String,
    pub storage_id: String,

    /// Collection entry point name
    pub method: String,

    #[serde(default)]
    pub args: serde_json::Value,

    /// Collection interval in seconds
    pub interval: u64,

    #[serde(default)]
    pub last_run_time: Option<DateTime<Utc>>,
}

/// Fields needed to materialise a new task instance; the store assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskInstance {
    pub task_template_id: String,
    pub storage_id: String,
    pub method: String,
    pub args: serde_json::Value,
    pub interval: u64,
    pub retry_count: u32,
}

/// One concrete, time-bounded execution of a task template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskInstance {
    pub id: String,
    pub task_template_id: String,
    pub storage_id: String,
    pub method: String,
    pub args: serde_json::Value,
    pub interval: u64,
    pub retry_count: u32,
    pub launch_time: Option<DateTime<Utc>>,
    pub result: Option<TaskResult>,
}

impl TaskInstance {
    /// A freshly materialised instance, `RUNNING` until its collection reports
    pub fn from_new(id: String, new: NewTaskInstance) -> Self {
        Self {
            id,
            task_template_id: new.task_template_id,
            storage_id: new.storage_id,
            method: new.method,
            args: new.args,
            interval: new.interval,
            retry_count: new.retry_count,
            launch_time: None,
            result: Some(TaskResult::Running),
        }
    }
}

/// Half-open collection window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Time filter for pulling alerts from a device; open ends are unbounded
///
/// Bounds travel as epoch milliseconds, `[begin_time, end_time]` inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertQuery {
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub begin_time: Option<DateTime<Utc>>,

    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_time: Option<DateTime<Utc>>,
}

impl AlertQuery {
    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.begin_time.is_none_or(|begin| time >= begin) && self.end_time.is_none_or(|end| time <= end)
    }
}

/// One performance metric series as returned by a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub labels: BTreeMap<String, String>,

    /// Epoch milliseconds -> value
    pub values: BTreeMap<i64, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoragePool {
    pub native_storage_pool_id: String,
    pub name: String,
    pub total_capacity: u64,
    pub used_capacity: u64,
    pub free_capacity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub native_volume_id: String,
    pub native_storage_pool_id: String,
    pub name: String,
    pub total_capacity: u64,
    pub used_capacity: u64,
}
