//! End-to-end notification handling over UDP
//!
//! A real listener bound to an ephemeral loopback port receives encoded
//! notifications in every supported protocol version and hands the
//! normalized alerts to a channel exporter.

use std::net::Ipv4Addr;
use std::time::Duration;

use arraywatch::actors::TrapReceiverHandle;
use arraywatch::model::{Category, Severity};
use arraywatch::snmp::ber::{self, tag};
use arraywatch::snmp::message::{CommunityMessage, Message, Version, encode_v3};
use arraywatch::snmp::pdu::{Pdu, PduType, encode_v1_trap};
use arraywatch::snmp::security::{AlertSource, AuthProtocol, PrivProtocol, SecurityProfile};
use arraywatch::snmp::usm::LocalizedUser;
use pretty_assertions::assert_eq;

use crate::helpers::*;

const ENGINE_ID: &str = "800007e5804f190000d232aa40";

fn community_source(storage_id: &str, community: &str) -> AlertSource {
    AlertSource {
        storage_id: storage_id.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        profile: SecurityProfile::Community {
            community: community.to_string(),
        },
    }
}

fn auth_priv_source(storage_id: &str) -> AlertSource {
    AlertSource {
        storage_id: storage_id.to_string(),
        host: "127.0.0.1".parse().unwrap(),
        profile: SecurityProfile::AuthPriv {
            user: "trapuser".to_string(),
            engine_id: ENGINE_ID.to_string(),
            auth_protocol: AuthProtocol::Sha,
            auth_key: "authpassword".to_string(),
            privacy_protocol: PrivProtocol::Aes,
            privacy_key: "privpassword".to_string(),
        },
    }
}

fn v2c_trap(pdu_type: PduType, community: &str, level: &str) -> Vec<u8> {
    CommunityMessage {
        version: Version::V2c,
        community: community.as_bytes().to_vec(),
        pdu: Pdu {
            pdu_type,
            request_id: 4321,
            error_status: 0,
            error_index: 0,
            var_binds: ism_var_binds(level),
        },
    }
    .encode()
}

fn v1_trap(community: &str) -> Vec<u8> {
    // v1 carries only the object bindings; uptime and trap id come from the header
    let binds: Vec<_> = ism_var_binds("Major alarm").into_iter().skip(2).collect();
    let pdu = encode_v1_trap(
        &"1.3.6.1.4.1.2011.2.91.10.2.1".parse().unwrap(),
        Ipv4Addr::new(192, 168, 10, 21),
        6,
        1,
        4200,
        &binds,
    );
    ber::encode_constructed(
        tag::SEQUENCE,
        &[
            ber::encode_integer(0),
            ber::encode_octets(community.as_bytes()),
            pdu,
        ],
    )
}

fn v3_trap(auth_key: &str, level: &str) -> Vec<u8> {
    let user = LocalizedUser::new(
        "trapuser",
        &hex::decode(ENGINE_ID).unwrap(),
        AuthProtocol::Sha,
        auth_key,
        Some((PrivProtocol::Aes, "privpassword")),
    )
    .unwrap();
    let pdu = Pdu {
        pdu_type: PduType::Trap,
        request_id: 99,
        error_status: 0,
        error_index: 0,
        var_binds: ism_var_binds(level),
    };
    encode_v3(&user, 1, 2, 300, [7u8; 8], &pdu).unwrap()
}

async fn listener(source: AlertSource) -> (TrapReceiverHandle, Pipeline) {
    let pipeline = pipeline(&[device("oceanstor-1", "huawei")]).await;
    let handle = TrapReceiverHandle::spawn(
        &receiver_config(&["ISM-STORAGE-SVC-MIB"]),
        vec![source],
        pipeline.processor.clone(),
    )
    .await
    .unwrap();
    (handle, pipeline)
}

#[tokio::test]
async fn test_v2c_trap_end_to_end() {
    let (handle, pipeline) = listener(community_source("oceanstor-1", "public")).await;
    let mut rx = pipeline.channel.subscribe();

    let _sender = send(
        &v2c_trap(PduType::Trap, "public", "Critical alarm"),
        handle.local_addr(),
    )
    .await;

    let alert = next_alert(&mut rx).await;
    assert_eq!(alert.storage_id, "oceanstor-1");
    assert_eq!(alert.alert_id, "1050");
    assert_eq!(alert.sequence_number, 79);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.category, Category::Fault);
    assert_eq!(alert.location, "slot 5");
    assert_eq!(alert.occur_time.timestamp(), 1_741_948_215);

    let stats = wait_for_stats(&handle, |s| s.processed == 1).await;
    assert_eq!(stats.received, 1);
    assert_eq!(stats.rejected, 0);

    handle.stop().await;
}

#[tokio::test]
async fn test_v1_trap_end_to_end() {
    let (handle, pipeline) = listener(community_source("oceanstor-1", "public")).await;
    let mut rx = pipeline.channel.subscribe();

    let _sender = send(&v1_trap("public"), handle.local_addr()).await;

    let alert = next_alert(&mut rx).await;
    assert_eq!(alert.alert_id, "1050");
    assert_eq!(alert.severity, Severity::Major);

    handle.stop().await;
}

#[tokio::test]
async fn test_v3_auth_priv_trap_end_to_end() {
    let (handle, pipeline) = listener(auth_priv_source("oceanstor-1")).await;
    let mut rx = pipeline.channel.subscribe();

    let _sender = send(&v3_trap("authpassword", "Warning alarm"), handle.local_addr()).await;

    let alert = next_alert(&mut rx).await;
    assert_eq!(alert.storage_id, "oceanstor-1");
    assert_eq!(alert.severity, Severity::Warning);

    handle.stop().await;
}

#[tokio::test]
async fn test_v3_wrong_auth_key_is_rejected() {
    let (handle, pipeline) = listener(auth_priv_source("oceanstor-1")).await;
    let mut rx = pipeline.channel.subscribe();

    let _sender = send(&v3_trap("wrongpassword", "Critical alarm"), handle.local_addr()).await;

    let stats = wait_for_stats(&handle, |s| s.rejected == 1).await;
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.processed, 0);
    assert!(rx.try_recv().is_err());

    handle.stop().await;
}

#[tokio::test]
async fn test_community_mismatch_is_rejected() {
    let (handle, pipeline) = listener(community_source("oceanstor-1", "public")).await;
    let mut rx = pipeline.channel.subscribe();

    let _sender = send(
        &v2c_trap(PduType::Trap, "private", "Critical alarm"),
        handle.local_addr(),
    )
    .await;

    let stats = wait_for_stats(&handle, |s| s.rejected == 1).await;
    assert_eq!(stats.rejected, 1);
    assert!(rx.try_recv().is_err());

    handle.stop().await;
}

#[tokio::test]
async fn test_v2c_message_for_v3_source_is_rejected() {
    let (handle, _pipeline) = listener(auth_priv_source("oceanstor-1")).await;

    let _sender = send(
        &v2c_trap(PduType::Trap, "public", "Critical alarm"),
        handle.local_addr(),
    )
    .await;

    let stats = wait_for_stats(&handle, |s| s.rejected == 1).await;
    assert_eq!(stats.rejected, 1);
    assert_eq!(stats.processed, 0);

    handle.stop().await;
}

#[tokio::test]
async fn test_inform_is_acknowledged_and_processed() {
    let (handle, pipeline) = listener(community_source("oceanstor-1", "public")).await;
    let mut rx = pipeline.channel.subscribe();

    let sender = send(
        &v2c_trap(PduType::InformRequest, "public", "Critical alarm"),
        handle.local_addr(),
    )
    .await;

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), sender.recv_from(&mut buf))
        .await
        .unwrap()
        .unwrap();
    match Message::decode(&buf[..len]).unwrap() {
        Message::Community(response) => {
            assert_eq!(response.version, Version::V2c);
            assert_eq!(response.community, b"public".to_vec());
            assert_eq!(response.pdu.pdu_type, PduType::Response);
            assert_eq!(response.pdu.request_id, 4321);
        }
        Message::V3(_) => panic!("inform answered with a v3 message"),
    }

    let alert = next_alert(&mut rx).await;
    assert_eq!(alert.alert_id, "1050");

    let stats = wait_for_stats(&handle, |s| s.processed == 1).await;
    assert_eq!(stats.acknowledged, 1);

    handle.stop().await;
}

#[tokio::test]
async fn test_normalization_failure_does_not_stop_listener() {
    // the device record is registered under another id than the source maps to
    let (handle, pipeline) = listener(community_source("unregistered", "public")).await;
    let mut rx = pipeline.channel.subscribe();

    let _first = send(
        &v2c_trap(PduType::Trap, "public", "Critical alarm"),
        handle.local_addr(),
    )
    .await;
    let stats = wait_for_stats(&handle, |s| s.failed == 1).await;
    assert_eq!(stats.failed, 1);

    handle
        .add_source(community_source("oceanstor-1", "public"))
        .await
        .unwrap();
    let _second = send(
        &v2c_trap(PduType::Trap, "public", "Critical alarm"),
        handle.local_addr(),
    )
    .await;

    let alert = next_alert(&mut rx).await;
    assert_eq!(alert.storage_id, "oceanstor-1");

    handle.stop().await;
}

#[tokio::test]
async fn test_many_notifications_are_all_processed() {
    let (handle, pipeline) = listener(community_source("oceanstor-1", "public")).await;
    let mut rx = pipeline.channel.subscribe();

    let sender = send(
        &v2c_trap(PduType::Trap, "public", "Critical alarm"),
        handle.local_addr(),
    )
    .await;
    for _ in 0..19 {
        sender
            .send_to(
                &v2c_trap(PduType::Trap, "public", "Critical alarm"),
                handle.local_addr(),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    for _ in 0..20 {
        next_alert(&mut rx).await;
    }
    let stats = wait_for_stats(&handle, |s| s.processed == 20).await;
    assert_eq!(stats.processed, 20);

    handle.stop().await;
}
