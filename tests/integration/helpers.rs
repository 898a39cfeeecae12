//! Helper functions for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arraywatch::actors::{TrapReceiverHandle, TrapStats};
use arraywatch::alerts::AlertProcessor;
use arraywatch::config::TrapReceiverConfig;
use arraywatch::db::{Database, MemoryDatabase};
use arraywatch::drivers::{DriverManager, DriverRegistry};
use arraywatch::exporter::{AlertExporter, ChannelExporter, ExportEvent, ExportManager};
use arraywatch::model::{Alert, AttributeMap, StorageDevice};
use arraywatch::snmp::oid::Oid;
use arraywatch::snmp::pdu::{SNMP_TRAP_OID, SYS_UPTIME, Value, VarBind};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

pub const ISM_ALARM: &str = "1.3.6.1.4.1.2011.2.91.10.3.1.1";
pub const ISM_TRAP: &str = "1.3.6.1.4.1.2011.2.91.10.2.1.0.1";

pub fn device(id: &str, vendor: &str) -> StorageDevice {
    StorageDevice {
        id: id.to_string(),
        name: format!("{id} array"),
        vendor: vendor.to_string(),
        model: "lab".to_string(),
        serial_number: format!("SN-{id}"),
    }
}

/// Everything behind the listener, wired to an in-memory store and a channel sink
pub struct Pipeline {
    pub db: Arc<MemoryDatabase>,
    pub drivers: DriverManager,
    pub exporter: AlertExporter,
    pub processor: AlertProcessor,
    pub channel: Arc<ChannelExporter>,
}

pub async fn pipeline(devices: &[StorageDevice]) -> Pipeline {
    let db = Arc::new(MemoryDatabase::new());
    for device in devices {
        db.storage_create(device).await.unwrap();
    }

    let registry = Arc::new(DriverRegistry::with_builtin_drivers(db.clone()));
    let drivers = DriverManager::new(registry, Duration::from_secs(5));
    let channel = Arc::new(ChannelExporter::new(64));
    let sinks = Arc::new(
        ExportManager::new()
            .with_alert_sink(channel.clone())
            .with_perf_sink(channel.clone()),
    );
    let exporter = AlertExporter::new(sinks, drivers.clone());
    let processor = AlertProcessor::new(db.clone(), drivers.clone(), exporter.clone());

    Pipeline {
        db,
        drivers,
        exporter,
        processor,
        channel,
    }
}

pub fn receiver_config(modules: &[&str]) -> TrapReceiverConfig {
    TrapReceiverConfig {
        address: "127.0.0.1".parse().unwrap(),
        port: 0,
        dictionary_path: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("dictionaries"),
        dictionaries: modules.iter().map(|m| m.to_string()).collect(),
        max_in_flight: 8,
    }
}

/// Decoded attributes of an OceanStor disk fault
pub fn ism_attributes(level: &str) -> AttributeMap {
    [
        ("hwIsmReportingAlarmNodeCode", "N1"),
        ("hwIsmReportingAlarmAlarmID", "1050"),
        ("hwIsmReportingAlarmFaultTitle", "Disk fault"),
        ("hwIsmReportingAlarmFaultLevel", level),
        ("hwIsmReportingAlarmFaultCategory", "Fault alarm"),
        ("hwIsmReportingAlarmFaultType", "topology"),
        ("hwIsmReportingAlarmSerialNo", "79"),
        ("hwIsmReportingAlarmFaultTime", "2025-03-14 10:30:15"),
        ("hwIsmReportingAlarmAdditionInfo", "disk down"),
        ("hwIsmReportingAlarmRestoreAdvice", "replace disk"),
        ("hwIsmReportingAlarmLocationInfo", "slot 5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Decoded attributes of a VMAX `connUnitEventTrap`
pub fn vmax_attributes() -> AttributeMap {
    [
        ("emcAsyncEventCode", "1200"),
        ("connUnitEventSeverity", "5"),
        ("connUnitEventType", "3"),
        ("connUnitEventDescr", "Symmetrix 000123 : Disk failed"),
        ("connUnitType", "11"),
        ("emcAsyncEventComponentType", "disk"),
        ("emcAsyncEventComponentName", "1A:C3"),
        ("emcAsyncEventSource", "000123"),
        ("connUnitEventId", "4411"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn ism(arc: u32, value: Value) -> VarBind {
    VarBind::new(format!("{ISM_ALARM}.{arc}.0").parse::<Oid>().unwrap(), value)
}

fn text(value: &str) -> Value {
    Value::OctetString(value.as_bytes().to_vec())
}

/// The same alarm as it travels on the wire, as v2 variable bindings
pub fn ism_var_binds(level: &str) -> Vec<VarBind> {
    vec![
        VarBind::new(&SYS_UPTIME[..], Value::TimeTicks(4200)),
        VarBind::new(&SNMP_TRAP_OID[..], Value::ObjectId(ISM_TRAP.parse().unwrap())),
        ism(1, text("N1")),
        ism(2, text("slot 5")),
        ism(3, text("replace disk")),
        ism(4, text("Disk fault")),
        ism(5, text("topology")),
        ism(6, text(level)),
        ism(7, text("1050")),
        // 2025-03-14 10:30:15.0 +00:00 as DateAndTime
        ism(
            8,
            Value::OctetString(vec![0x07, 0xe9, 0x03, 0x0e, 0x0a, 0x1e, 0x0f, 0x00, b'+', 0, 0]),
        ),
        ism(9, Value::Integer(79)),
        ism(10, text("disk down")),
        ism(11, text("Fault alarm")),
    ]
}

pub async fn send(datagram: &[u8], to: SocketAddr) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(datagram, to).await.unwrap();
    socket
}

pub async fn next_alert(rx: &mut broadcast::Receiver<ExportEvent>) -> Alert {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no alert exported in time")
            .unwrap();
        if let ExportEvent::Alert(alert) = event {
            return alert;
        }
    }
}

pub async fn wait_for_stats(
    handle: &TrapReceiverHandle,
    done: impl Fn(&TrapStats) -> bool,
) -> TrapStats {
    for _ in 0..150 {
        let stats = handle.stats().await.unwrap();
        if done(&stats) {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    handle.stats().await.unwrap()
}
