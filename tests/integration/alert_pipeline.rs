//! Alert normalization through the vendor drivers
//!
//! Exercises the processor directly with decoded attribute maps:
//! - OceanStor field mapping (known and unknown fault levels)
//! - provenance taken from the device record
//! - rejection of unknown devices and malformed alert data, with nothing
//!   exported

use arraywatch::alerts::ProcessError;
use arraywatch::error::DriverError;
use arraywatch::model::{AttributeMap, Category, DEFAULT_RESOURCE_TYPE, Severity};
use arraywatch::snmp::message::Version;
use arraywatch::snmp::security::{SecurityLevel, TrapContext};
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use crate::helpers::*;

fn context(storage_id: &str) -> TrapContext {
    TrapContext {
        storage_id: storage_id.to_string(),
        security_level: SecurityLevel::Community,
        principal: "community".to_string(),
        source: "127.0.0.1:40000".parse().unwrap(),
        version: Version::V2c,
    }
}

#[tokio::test]
async fn test_oceanstor_critical_alarm() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;

    let alert = pipeline
        .processor
        .normalize("s1", &ism_attributes("Critical alarm"))
        .await
        .unwrap();

    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.category, Category::Fault);
    assert_eq!(alert.alert_id, "1050");
    assert_eq!(alert.sequence_number, 79);
    assert_eq!(alert.resource_type, DEFAULT_RESOURCE_TYPE);
    assert_eq!(alert.alert_name, "Disk fault");
    assert_eq!(alert.source_id, "N1");
    assert_eq!(alert.location, "slot 5");
    assert_eq!(alert.detailed_info, "disk down");
    assert_eq!(alert.recovery_advice, "replace disk");
    assert_eq!(
        alert.occur_time,
        Utc.with_ymd_and_hms(2025, 3, 14, 10, 30, 15).unwrap()
    );
}

#[tokio::test]
async fn test_oceanstor_unknown_level_is_not_specified() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;

    let known = pipeline
        .processor
        .normalize("s1", &ism_attributes("Critical alarm"))
        .await
        .unwrap();
    let unknown = pipeline
        .processor
        .normalize("s1", &ism_attributes("Unknown alarm"))
        .await
        .unwrap();

    assert_eq!(unknown.severity, Severity::NotSpecified);

    // every other field is unchanged
    let mut expected = known.clone();
    expected.severity = Severity::NotSpecified;
    assert_eq!(unknown, expected);
}

#[tokio::test]
async fn test_provenance_from_device_record() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;

    let alert = pipeline
        .processor
        .normalize("s1", &ism_attributes("Major alarm"))
        .await
        .unwrap();

    assert_eq!(alert.storage_id, "s1");
    assert_eq!(alert.storage_name, "s1 array");
    assert_eq!(alert.manufacturer, "huawei");
    assert_eq!(alert.product_name, "lab");
    assert_eq!(alert.serial_number, "SN-s1");
}

#[tokio::test]
async fn test_process_exports_alert() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;
    let mut rx = pipeline.channel.subscribe();

    let processed = pipeline
        .processor
        .process(&ism_attributes("Minor alarm"), &context("s1"))
        .await
        .unwrap();

    let exported = next_alert(&mut rx).await;
    assert_eq!(exported, processed);
    assert_eq!(exported.severity, Severity::Minor);
}

#[tokio::test]
async fn test_unknown_storage_is_rejected() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;

    let result = pipeline
        .processor
        .process(&ism_attributes("Critical alarm"), &context("missing"))
        .await;

    assert_matches!(
        result,
        Err(ProcessError::Driver(DriverError::StorageNotFound(id))) if id == "missing"
    );
}

#[tokio::test]
async fn test_unregistered_vendor_is_rejected() {
    let pipeline = pipeline(&[device("s9", "acme")]).await;

    let result = pipeline
        .processor
        .normalize("s9", &ism_attributes("Critical alarm"))
        .await;

    assert_matches!(result, Err(DriverError::DriverNotFound(vendor)) if vendor == "acme");
}

#[tokio::test]
async fn test_missing_alarm_id_exports_nothing() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;
    let mut rx = pipeline.channel.subscribe();

    let mut attrs = ism_attributes("Critical alarm");
    attrs.remove("hwIsmReportingAlarmAlarmID");

    let result = pipeline.processor.process(&attrs, &context("s1")).await;
    assert_matches!(
        result,
        Err(ProcessError::Driver(DriverError::InvalidAlertData(_)))
    );
    assert!(rx.try_recv().is_err());
}

/// Processes `attrs` with `field` removed; expects a rejection and no export
async fn assert_rejected_without(vendor: &str, mut attrs: AttributeMap, field: &str) {
    let pipeline = pipeline(&[device("s1", vendor)]).await;
    let mut rx = pipeline.channel.subscribe();

    assert!(attrs.remove(field).is_some(), "{field} not in fixture");
    let result = pipeline.processor.process(&attrs, &context("s1")).await;

    assert_matches!(
        result,
        Err(ProcessError::Driver(DriverError::InvalidAlertData(_)))
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_oceanstor_missing_fault_level_exports_nothing() {
    assert_rejected_without(
        "huawei",
        ism_attributes("Critical alarm"),
        "hwIsmReportingAlarmFaultLevel",
    )
    .await;
}

#[tokio::test]
async fn test_oceanstor_missing_serial_number_exports_nothing() {
    assert_rejected_without(
        "huawei",
        ism_attributes("Critical alarm"),
        "hwIsmReportingAlarmSerialNo",
    )
    .await;
}

#[tokio::test]
async fn test_vmax_missing_severity_exports_nothing() {
    assert_rejected_without("dell_emc", vmax_attributes(), "connUnitEventSeverity").await;
}

#[tokio::test]
async fn test_vmax_missing_event_id_exports_nothing() {
    assert_rejected_without("dell_emc", vmax_attributes(), "connUnitEventId").await;
}

#[tokio::test]
async fn test_vmax_complete_event_is_exported() {
    let pipeline = pipeline(&[device("s1", "dell_emc")]).await;
    let mut rx = pipeline.channel.subscribe();

    let processed = pipeline
        .processor
        .process(&vmax_attributes(), &context("s1"))
        .await
        .unwrap();

    assert_eq!(processed.alert_id, "1200");
    assert_eq!(processed.sequence_number, 4411);
    assert_eq!(next_alert(&mut rx).await, processed);
}

#[tokio::test]
async fn test_non_integer_sequence_number_is_invalid() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;

    let mut attrs = ism_attributes("Critical alarm");
    attrs.insert("hwIsmReportingAlarmSerialNo".into(), "79a".into());

    let result = pipeline.processor.normalize("s1", &attrs).await;
    assert_matches!(result, Err(DriverError::InvalidAlertData(_)));
}

#[tokio::test]
async fn test_missing_occur_time_uses_receive_time() {
    let pipeline = pipeline(&[device("s1", "huawei")]).await;

    let mut attrs = ism_attributes("Critical alarm");
    attrs.remove("hwIsmReportingAlarmFaultTime");

    let received_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
    let alert = pipeline
        .processor
        .normalize_at("s1", &attrs, received_at)
        .await
        .unwrap();
    assert_eq!(alert.occur_time, received_at);
}

#[tokio::test]
async fn test_clear_alert_through_management_boundary() {
    use arraywatch::management::{ClearAlertRequest, clear_alert};

    let pipeline = pipeline(&[device("fake-1", "fake_storage"), device("s1", "huawei")]).await;
    let request: ClearAlertRequest = serde_json::from_str(r#"{ "sequence_number": 79 }"#).unwrap();

    clear_alert(pipeline.db.as_ref(), &pipeline.exporter, "fake-1", request)
        .await
        .unwrap();

    assert_matches!(
        clear_alert(pipeline.db.as_ref(), &pipeline.exporter, "s1", request).await,
        Err(DriverError::NotSupported(_))
    );
    assert_matches!(
        clear_alert(pipeline.db.as_ref(), &pipeline.exporter, "gone", request).await,
        Err(DriverError::StorageNotFound(_))
    );
}
