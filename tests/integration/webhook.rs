//! HTTP webhook exporter against a mock endpoint
//!
//! - alerts from the listener are POSTed as JSON
//! - non-2xx responses surface as export failures
//! - exporter configuration is parsed from the config file format

use std::sync::Arc;
use std::time::Duration;

use arraywatch::actors::TrapReceiverHandle;
use arraywatch::alerts::AlertProcessor;
use arraywatch::db::{Database, MemoryDatabase};
use arraywatch::drivers::{DriverManager, DriverRegistry};
use arraywatch::exporter::{AlertExporter, ExportError, ExportManager, ExporterConfig};
use arraywatch::snmp::message::{CommunityMessage, Version};
use arraywatch::snmp::pdu::{Pdu, PduType};
use arraywatch::snmp::security::{AlertSource, SecurityProfile};
use assert_matches::assert_matches;
use serde_json::Value as Json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

async fn processor_for(server: &MockServer) -> (Arc<MemoryDatabase>, AlertExporter, AlertProcessor) {
    let db = Arc::new(MemoryDatabase::new());
    db.storage_create(&device("oceanstor-1", "huawei")).await.unwrap();

    let config = ExporterConfig::Webhook {
        url: format!("{}/alerts", server.uri()),
        timeout_secs: 2,
    };
    let sinks = Arc::new(ExportManager::from_config(&[config]).unwrap());
    let registry = Arc::new(DriverRegistry::with_builtin_drivers(db.clone()));
    let drivers = DriverManager::new(registry, Duration::from_secs(5));
    let exporter = AlertExporter::new(sinks, drivers.clone());
    let processor = AlertProcessor::new(db.clone(), drivers, exporter.clone());
    (db, exporter, processor)
}

#[tokio::test]
async fn test_trap_is_posted_to_webhook() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({
            "kind": "alert",
            "alert": { "alert_id": "1050", "sequence_number": 79, "storage_id": "oceanstor-1" }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (_db, _exporter, processor) = processor_for(&server).await;
    let handle = TrapReceiverHandle::spawn(
        &receiver_config(&["ISM-STORAGE-SVC-MIB"]),
        vec![AlertSource {
            storage_id: "oceanstor-1".into(),
            host: "127.0.0.1".parse().unwrap(),
            profile: SecurityProfile::Community {
                community: "public".into(),
            },
        }],
        processor,
    )
    .await
    .unwrap();

    let datagram = CommunityMessage {
        version: Version::V2c,
        community: b"public".to_vec(),
        pdu: Pdu {
            pdu_type: PduType::Trap,
            request_id: 1,
            error_status: 0,
            error_index: 0,
            var_binds: ism_var_binds("Critical alarm"),
        },
    }
    .encode();
    let _sender = send(&datagram, handle.local_addr()).await;

    let stats = wait_for_stats(&handle, |s| s.processed == 1).await;
    assert_eq!(stats.processed, 1);

    let requests = server.received_requests().await.unwrap();
    let body: Json = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["alert"]["severity"], "Critical");

    handle.stop().await;
}

#[tokio::test]
async fn test_server_error_is_an_export_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let (_db, exporter, processor) = processor_for(&server).await;
    let alert = processor
        .normalize("oceanstor-1", &ism_attributes("Major alarm"))
        .await
        .unwrap();

    assert_matches!(
        exporter.export(&alert).await,
        Err(ExportError::Partial { failed: 1, total: 1 })
    );
}

#[test]
fn test_exporter_config_format() {
    let configs: Vec<ExporterConfig> = serde_json::from_str(
        r#"[{ "type": "log" }, { "type": "webhook", "url": "http://127.0.0.1:9/hook" }]"#,
    )
    .unwrap();

    assert_eq!(configs[0], ExporterConfig::Log);
    assert_matches!(
        &configs[1],
        ExporterConfig::Webhook { url, timeout_secs: 10 } if url == "http://127.0.0.1:9/hook"
    );
}
