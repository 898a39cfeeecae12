//! Per-source security profiles and notification authentication

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use super::SnmpError;
use super::message::{Message, Version};
use super::pdu::Pdu;
use super::usm::LocalizedUser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProtocol {
    Md5,
    Sha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivProtocol {
    /// CBC-DES
    Des,

    /// CFB128-AES-128
    Aes,
    Aes192,
    Aes256,
}

impl PrivProtocol {
    /// Localised key bytes the cipher consumes (DES also takes its pre-IV)
    pub fn key_len(self) -> usize {
        match self {
            PrivProtocol::Des | PrivProtocol::Aes => 16,
            PrivProtocol::Aes192 => 24,
            PrivProtocol::Aes256 => 32,
        }
    }
}

/// How notifications from one device are authenticated
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "security_level", rename_all = "snake_case")]
pub enum SecurityProfile {
    /// v1/v2c shared community string
    Community { community: String },

    AuthNoPriv {
        user: String,
        /// Authoritative engine id of the sender, hex encoded
        engine_id: String,
        auth_protocol: AuthProtocol,
        auth_key: String,
    },

    AuthPriv {
        user: String,
        engine_id: String,
        auth_protocol: AuthProtocol,
        auth_key: String,
        privacy_protocol: PrivProtocol,
        privacy_key: String,
    },
}

// secrets stay out of logs
impl fmt::Debug for SecurityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityProfile::Community { .. } => f.write_str("Community"),
            SecurityProfile::AuthNoPriv {
                user,
                auth_protocol,
                ..
            } => write!(f, "AuthNoPriv({user}, {auth_protocol:?})"),
            SecurityProfile::AuthPriv {
                user,
                auth_protocol,
                privacy_protocol,
                ..
            } => write!(f, "AuthPriv({user}, {auth_protocol:?}, {privacy_protocol:?})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    Community,
    AuthNoPriv,
    AuthPriv,
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecurityLevel::Community => "community",
            SecurityLevel::AuthNoPriv => "auth_no_priv",
            SecurityLevel::AuthPriv => "auth_priv",
        };
        f.write_str(s)
    }
}

impl SecurityProfile {
    pub fn level(&self) -> SecurityLevel {
        match self {
            SecurityProfile::Community { .. } => SecurityLevel::Community,
            SecurityProfile::AuthNoPriv { .. } => SecurityLevel::AuthNoPriv,
            SecurityProfile::AuthPriv { .. } => SecurityLevel::AuthPriv,
        }
    }

    fn localize(&self) -> Result<Option<LocalizedUser>, SnmpError> {
        let user = match self {
            SecurityProfile::Community { .. } => return Ok(None),
            SecurityProfile::AuthNoPriv {
                user,
                engine_id,
                auth_protocol,
                auth_key,
            } => LocalizedUser::new(user, &decode_engine_id(engine_id)?, *auth_protocol, auth_key, None)?,
            SecurityProfile::AuthPriv {
                user,
                engine_id,
                auth_protocol,
                auth_key,
                privacy_protocol,
                privacy_key,
            } => LocalizedUser::new(
                user,
                &decode_engine_id(engine_id)?,
                *auth_protocol,
                auth_key,
                Some((*privacy_protocol, privacy_key.as_str())),
            )?,
        };
        Ok(Some(user))
    }
}

fn decode_engine_id(engine_id: &str) -> Result<Vec<u8>, SnmpError> {
    let trimmed = engine_id.trim_start_matches("0x");
    let bytes = hex::decode(trimmed)
        .map_err(|e| SnmpError::Credentials(format!("engine id '{engine_id}': {e}")))?;
    if !(5..=32).contains(&bytes.len()) {
        return Err(SnmpError::Credentials(format!(
            "engine id '{engine_id}' must be 5 to 32 bytes"
        )));
    }
    Ok(bytes)
}

/// A configured device trap source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSource {
    pub storage_id: String,
    pub host: IpAddr,

    #[serde(flatten)]
    pub profile: SecurityProfile,
}

/// Authentication metadata forwarded with every accepted notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrapContext {
    pub storage_id: String,
    pub security_level: SecurityLevel,

    /// Community string for v1/v2c is never echoed; this is the v3 user name
    /// or `"community"`
    pub principal: String,
    pub source: SocketAddr,
    pub version: Version,
}

struct SourceEntry {
    source: AlertSource,
    user: Option<LocalizedUser>,
}

/// Alert sources keyed by device address
#[derive(Default)]
pub struct SourceTable {
    entries: HashMap<IpAddr, SourceEntry>,
}

impl SourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the source for `source.host`, localising v3 keys
    pub fn insert(&mut self, source: AlertSource) -> Result<(), SnmpError> {
        let user = source.profile.localize()?;
        self.entries.insert(source.host, SourceEntry { source, user });
        Ok(())
    }

    pub fn remove(&mut self, host: &IpAddr) -> Option<AlertSource> {
        self.entries.remove(host).map(|entry| entry.source)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Authenticates `message` (decoded from `raw`) received from `from` and
    /// returns the notification PDU with its context
    pub fn authenticate(
        &self,
        from: SocketAddr,
        raw: &[u8],
        message: Message,
    ) -> Result<(TrapContext, Pdu), SnmpError> {
        let entry = self
            .entries
            .get(&from.ip())
            .ok_or(SnmpError::UnknownSource(from.ip()))?;

        let version = message.version();
        let (principal, pdu) = match (message, &entry.source.profile, &entry.user) {
            (Message::Community(msg), SecurityProfile::Community { community }, _) => {
                if msg.community != community.as_bytes() {
                    return Err(SnmpError::Authentication("community mismatch".into()));
                }
                ("community".to_string(), msg.pdu)
            }
            (Message::V3(msg), _, Some(user)) => {
                if msg.usm.user_name != user.user_name.as_bytes() {
                    return Err(SnmpError::Authentication(format!(
                        "unknown user '{}'",
                        String::from_utf8_lossy(&msg.usm.user_name)
                    )));
                }
                if msg.usm.engine_id != user.engine_id {
                    return Err(SnmpError::Authentication(format!(
                        "unknown engine id {}",
                        hex::encode(&msg.usm.engine_id)
                    )));
                }
                if !msg.header.authenticated() {
                    return Err(SnmpError::Authentication(
                        "unauthenticated v3 message for a v3 source".into(),
                    ));
                }
                if user.has_privacy() && !msg.header.encrypted() {
                    return Err(SnmpError::Authentication(
                        "plaintext message for an auth_priv source".into(),
                    ));
                }
                user.verify(raw, msg.usm.auth_offset, msg.usm.auth_params.len())?;
                let scoped = msg.scoped_pdu(user)?;
                (user.user_name.clone(), scoped.pdu)
            }
            (_, profile, _) => {
                return Err(SnmpError::Authentication(format!(
                    "{version} message does not match {} profile",
                    profile.level()
                )));
            }
        };

        if !pdu.pdu_type.is_notification() {
            return Err(SnmpError::NotANotification(pdu.pdu_type));
        }

        Ok((
            TrapContext {
                storage_id: entry.source.storage_id.clone(),
                security_level: entry.source.profile.level(),
                principal,
                source: from,
                version,
            },
            pdu,
        ))
    }
}
