//! Dell EMC VMAX driver
//!
//! VMAX arrays (through Unisphere) emit FCMGMT-MIB `connUnitEventTrap`
//! notifications enriched with EMC async event objects. Enumerated values
//! may arrive as numbers or as their labels; both are accepted.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    DriverFactory, ParsedAlert, StorageDriver, optional, parse_occur_time,
    parse_sequence_number, required,
};
use crate::error::DriverResult;
use crate::model::{AttributeMap, Category, DEFAULT_RESOURCE_TYPE, Severity, StorageDevice};

pub const VENDOR: &str = "dell_emc";

const EVENT_CODE: &str = "emcAsyncEventCode";
const EVENT_SEVERITY: &str = "connUnitEventSeverity";
const EVENT_TYPE: &str = "connUnitEventType";
const EVENT_DESCR: &str = "connUnitEventDescr";
const UNIT_TYPE: &str = "connUnitType";
const COMPONENT_TYPE: &str = "emcAsyncEventComponentType";
const COMPONENT_NAME: &str = "emcAsyncEventComponentName";
const EVENT_SOURCE: &str = "emcAsyncEventSource";
const EVENT_ID: &str = "connUnitEventId";
const EVENT_TIME: &str = "connUnitEventTime";

/// FCMGMT-MIB `FcEventSeverity`
pub fn severity(raw: &str) -> Severity {
    match raw {
        "2" | "emergency" => Severity::Fatal,
        "3" | "alert" | "4" | "critical" => Severity::Critical,
        "5" | "error" => Severity::Major,
        "6" | "warning" => Severity::Warning,
        "7" | "notify" | "8" | "info" | "9" | "debug" | "10" | "mark" => Severity::Informational,
        _ => Severity::NotSpecified,
    }
}

/// Category from `connUnitEventType`: status changes are faults, topology and
/// configuration changes are events
pub fn category(raw: &str) -> Category {
    match raw {
        "3" | "status" => Category::Fault,
        "4" | "configuration" | "5" | "topology" => Category::Event,
        _ => Category::NotSpecified,
    }
}

fn event_type_label(raw: &str) -> &str {
    match raw {
        "1" => "unknown",
        "2" => "other",
        "3" => "status",
        "4" => "configuration",
        "5" => "topology",
        other => other,
    }
}

/// FCMGMT-MIB `FcUnitType`
fn unit_type_label(raw: &str) -> &str {
    match raw {
        "1" => "unknown",
        "2" => "other",
        "3" => "hub",
        "4" => "switch",
        "5" => "gateway",
        "6" => "converter",
        "7" => "hba",
        "8" => "proxy-agent",
        "9" => "storage-device",
        "10" => "host",
        "11" => "storage-subsystem",
        "12" => "module",
        "13" => "swdriver",
        "14" => "storage-access-device",
        "15" => "wdm",
        "16" => "ups",
        "17" => "nas",
        other => other,
    }
}

pub struct VmaxDriver {
    device: StorageDevice,
}

impl VmaxDriver {
    pub fn new(device: &StorageDevice) -> Self {
        Self {
            device: device.clone(),
        }
    }
}

pub fn factory() -> DriverFactory {
    Arc::new(|device: &StorageDevice| Ok(Arc::new(VmaxDriver::new(device)) as Arc<dyn StorageDriver>))
}

#[async_trait]
impl StorageDriver for VmaxDriver {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    async fn register_storage(&self) -> DriverResult<StorageDevice> {
        Ok(self.device.clone())
    }

    async fn parse_alert(&self, attrs: &AttributeMap) -> DriverResult<ParsedAlert> {
        let alert_id = required(attrs, EVENT_CODE)?;
        let sequence_number = parse_sequence_number(EVENT_ID, required(attrs, EVENT_ID)?)?;
        let raw_severity = required(attrs, EVENT_SEVERITY)?;

        let raw_type = optional(attrs, EVENT_TYPE);
        let description = optional(attrs, EVENT_DESCR);
        let resource_type = match attrs.get(UNIT_TYPE).map(|t| unit_type_label(t.trim())) {
            Some(label) if !label.is_empty() => label.to_string(),
            _ => DEFAULT_RESOURCE_TYPE.to_string(),
        };

        Ok(ParsedAlert {
            source_id: optional(attrs, EVENT_SOURCE),
            alert_id: alert_id.to_string(),
            alert_name: description.clone(),
            sequence_number,
            severity: severity(raw_severity),
            category: category(&raw_type),
            alert_type: event_type_label(&raw_type).to_string(),
            resource_type,
            location: format!(
                "Component type: {}, Component name: {}",
                optional(attrs, COMPONENT_TYPE),
                optional(attrs, COMPONENT_NAME)
            ),
            detailed_info: description,
            recovery_advice: String::new(),
            clear_type: String::new(),
            occur_time: attrs.get(EVENT_TIME).and_then(|t| parse_occur_time(t)),
        })
    }
}
