//! Huawei OceanStor driver
//!
//! Alerts arrive as `ISM-STORAGE-SVC-MIB::hwIsmReportingAlarm*` objects.
//! Management operations are not available over SNMP and report
//! `NotSupported`.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    DriverFactory, ParsedAlert, StorageDriver, optional, parse_occur_time,
    parse_sequence_number, required,
};
use crate::error::DriverResult;
use crate::model::{AttributeMap, Category, DEFAULT_RESOURCE_TYPE, Severity, StorageDevice};

pub const VENDOR: &str = "huawei";

const NODE_CODE: &str = "hwIsmReportingAlarmNodeCode";
const ALARM_ID: &str = "hwIsmReportingAlarmAlarmID";
const FAULT_TITLE: &str = "hwIsmReportingAlarmFaultTitle";
const FAULT_LEVEL: &str = "hwIsmReportingAlarmFaultLevel";
const FAULT_CATEGORY: &str = "hwIsmReportingAlarmFaultCategory";
const FAULT_TYPE: &str = "hwIsmReportingAlarmFaultType";
const SERIAL_NO: &str = "hwIsmReportingAlarmSerialNo";
const FAULT_TIME: &str = "hwIsmReportingAlarmFaultTime";
const ADDITION_INFO: &str = "hwIsmReportingAlarmAdditionInfo";
const RESTORE_ADVICE: &str = "hwIsmReportingAlarmRestoreAdvice";
const LOCATION_INFO: &str = "hwIsmReportingAlarmLocationInfo";

pub fn severity(level: &str) -> Severity {
    match level {
        "Critical alarm" => Severity::Critical,
        "Major alarm" => Severity::Major,
        "Minor alarm" => Severity::Minor,
        "Warning alarm" => Severity::Warning,
        _ => Severity::NotSpecified,
    }
}

pub fn category(raw: &str) -> Category {
    match raw {
        "Fault alarm" => Category::Fault,
        "Recovery alarm" => Category::Recovery,
        "Event alarm" => Category::Event,
        _ => Category::NotSpecified,
    }
}

pub struct OceanStorDriver {
    device: StorageDevice,
}

impl OceanStorDriver {
    pub fn new(device: &StorageDevice) -> Self {
        Self {
            device: device.clone(),
        }
    }
}

pub fn factory() -> DriverFactory {
    Arc::new(|device: &StorageDevice| {
        Ok(Arc::new(OceanStorDriver::new(device)) as Arc<dyn StorageDriver>)
    })
}

#[async_trait]
impl StorageDriver for OceanStorDriver {
    fn vendor(&self) -> &'static str {
        VENDOR
    }

    async fn register_storage(&self) -> DriverResult<StorageDevice> {
        Ok(self.device.clone())
    }

    async fn parse_alert(&self, attrs: &AttributeMap) -> DriverResult<ParsedAlert> {
        let alert_id = required(attrs, ALARM_ID)?;
        let sequence_number = parse_sequence_number(SERIAL_NO, required(attrs, SERIAL_NO)?)?;
        let level = required(attrs, FAULT_LEVEL)?;

        Ok(ParsedAlert {
            source_id: optional(attrs, NODE_CODE),
            alert_id: alert_id.to_string(),
            alert_name: optional(attrs, FAULT_TITLE),
            sequence_number,
            severity: severity(level),
            category: category(&optional(attrs, FAULT_CATEGORY)),
            alert_type: optional(attrs, FAULT_TYPE),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
            location: optional(attrs, LOCATION_INFO),
            detailed_info: optional(attrs, ADDITION_INFO),
            recovery_advice: optional(attrs, RESTORE_ADVICE),
            clear_type: String::new(),
            occur_time: attrs.get(FAULT_TIME).and_then(|t| parse_occur_time(t)),
        })
    }
}
