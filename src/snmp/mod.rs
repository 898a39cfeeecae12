//! SNMP notification decoding
//!
//! Everything needed to turn a datagram into an authenticated, flat
//! [`AttributeMap`](crate::model::AttributeMap).

pub mod ber;
pub mod dictionary;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod security;
pub mod usm;

use std::net::IpAddr;

use thiserror::Error;

use crate::model::AttributeMap;
use dictionary::{Dictionary, short_name};
use pdu::{PduType, VarBind};

#[derive(Error, Debug)]
pub enum SnmpError {
    #[error("malformed message: {0}")]
    Decode(#[from] ber::BerError),

    #[error("unsupported SNMP version {0}")]
    UnsupportedVersion(i64),

    #[error("unsupported security model {0}")]
    UnsupportedSecurityModel(i64),

    #[error("no alert source configured for {0}")]
    UnknownSource(IpAddr),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("{0:?} PDU is not a notification")]
    NotANotification(PduType),
}

/// Flattens variable bindings into short-name keyed attributes
///
/// Bindings whose identifier does not resolve to a symbolic name are skipped.
/// If a short name repeats, the later binding wins.
pub fn attribute_map(dictionary: &Dictionary, var_binds: &[VarBind]) -> AttributeMap {
    let mut attrs = AttributeMap::new();
    for vb in var_binds {
        let identifier = dictionary.resolve(&vb.oid);
        match short_name(&identifier) {
            Some(name) => {
                attrs.insert(name.to_string(), dictionary.render_value(&vb.value));
            }
            None => tracing::trace!(%identifier, "skipping unrecognised attribute"),
        }
    }
    attrs
}
