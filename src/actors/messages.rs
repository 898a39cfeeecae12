//! Message types for actor communication
//!
//! Commands are sent to a specific actor over its mpsc channel; queries carry
//! a oneshot sender for the reply.

use std::net::IpAddr;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::snmp::SnmpError;
use crate::snmp::security::AlertSource;

/// Counters kept by the trap receiver since it started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrapStats {
    /// Datagrams read from the socket
    pub received: u64,

    /// Datagrams that failed decoding or authentication
    pub rejected: u64,

    /// Notifications normalized and exported
    pub processed: u64,

    /// Notifications dropped after authentication (bad data, driver or export failure)
    pub failed: u64,

    /// InformRequests acknowledged
    pub acknowledged: u64,
}

/// Commands that can be sent to a TrapReceiverActor
#[derive(Debug)]
pub enum TrapCommand {
    /// Add or replace the alert source for `source.host`
    AddSource {
        source: AlertSource,
        respond_to: oneshot::Sender<Result<(), SnmpError>>,
    },

    /// Stop accepting notifications from `host`
    RemoveSource {
        host: IpAddr,
        respond_to: oneshot::Sender<Option<AlertSource>>,
    },

    GetStats {
        respond_to: oneshot::Sender<TrapStats>,
    },

    /// Release the socket and exit
    ///
    /// The reply is sent once the accept loop has stopped. Notifications
    /// already handed off keep running.
    Shutdown { respond_to: oneshot::Sender<()> },
}
