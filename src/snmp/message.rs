//! SNMP message envelopes
//!
//! v1/v2c messages carry a community string and a plaintext PDU. v3 messages
//! carry a header, USM security parameters and a scoped PDU that may be
//! encrypted; the authentication parameters keep their absolute offset so the
//! HMAC can be checked over the original bytes.

use super::SnmpError;
use super::ber::{self, BerReader, tag};
use super::pdu::Pdu;
use super::usm::{AUTH_PARAMS_LEN, LocalizedUser};

pub const USM_SECURITY_MODEL: i64 = 3;

const FLAG_AUTH: u8 = 0x01;
const FLAG_PRIV: u8 = 0x02;
const FLAG_REPORTABLE: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Version {
    V1,
    V2c,
    V3,
}

impl Version {
    fn from_wire(v: i64) -> Result<Self, SnmpError> {
        match v {
            0 => Ok(Version::V1),
            1 => Ok(Version::V2c),
            3 => Ok(Version::V3),
            other => Err(SnmpError::UnsupportedVersion(other)),
        }
    }

    fn wire(self) -> i64 {
        match self {
            Version::V1 => 0,
            Version::V2c => 1,
            Version::V3 => 3,
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Version::V1 => write!(f, "v1"),
            Version::V2c => write!(f, "v2c"),
            Version::V3 => write!(f, "v3"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunityMessage {
    pub version: Version,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

impl CommunityMessage {
    pub fn encode(&self) -> Vec<u8> {
        ber::encode_constructed(
            tag::SEQUENCE,
            &[
                ber::encode_integer(self.version.wire()),
                ber::encode_octets(&self.community),
                self.pdu.encode(),
            ],
        )
    }
}

/// msgGlobalData
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct V3Header {
    pub msg_id: i32,
    pub max_size: i32,
    pub flags: u8,
    pub security_model: i64,
}

impl V3Header {
    pub fn authenticated(&self) -> bool {
        self.flags & FLAG_AUTH != 0
    }

    pub fn encrypted(&self) -> bool {
        self.flags & FLAG_PRIV != 0
    }
}

/// UsmSecurityParameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsmParams {
    pub engine_id: Vec<u8>,
    pub engine_boots: u32,
    pub engine_time: u32,
    pub user_name: Vec<u8>,
    pub auth_params: Vec<u8>,

    /// Absolute offset of `auth_params` in the received datagram
    pub auth_offset: usize,
    pub priv_params: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedPdu {
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub pdu: Pdu,
}

impl ScopedPdu {
    fn decode(bytes: &[u8]) -> Result<Self, SnmpError> {
        // DES pads the plaintext to the block size, so bytes after the
        // sequence are ignored
        let mut outer = BerReader::new(bytes);
        let mut reader = outer.read_sequence()?;
        let context_engine_id = reader.read_octets()?.value.to_vec();
        let context_name = reader.read_octets()?.value.to_vec();
        let pdu = Pdu::decode(reader.read()?)?;
        reader.finish("scoped pdu")?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        ber::encode_constructed(
            tag::SEQUENCE,
            &[
                ber::encode_octets(&self.context_engine_id),
                ber::encode_octets(&self.context_name),
                self.pdu.encode(),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopedData {
    Plain(ScopedPdu),
    Encrypted(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V3Message {
    pub header: V3Header,
    pub usm: UsmParams,
    pub data: ScopedData,
}

impl V3Message {
    /// Decrypts the scoped PDU if needed
    pub fn scoped_pdu(&self, user: &LocalizedUser) -> Result<ScopedPdu, SnmpError> {
        match &self.data {
            ScopedData::Plain(scoped) => Ok(scoped.clone()),
            ScopedData::Encrypted(cipher) => {
                let plain = user.decrypt(
                    self.usm.engine_boots,
                    self.usm.engine_time,
                    &self.usm.priv_params,
                    cipher,
                )?;
                ScopedPdu::decode(&plain)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Community(CommunityMessage),
    V3(V3Message),
}

impl Message {
    pub fn decode(buf: &[u8]) -> Result<Self, SnmpError> {
        let mut top = BerReader::new(buf);
        let mut reader = top.read_sequence()?;
        top.finish("message")?;

        let version = Version::from_wire(reader.read_integer()?)?;
        match version {
            Version::V1 | Version::V2c => {
                let community = reader.read_octets()?.value.to_vec();
                let pdu = Pdu::decode(reader.read()?)?;
                reader.finish("message")?;
                Ok(Message::Community(CommunityMessage {
                    version,
                    community,
                    pdu,
                }))
            }
            Version::V3 => decode_v3(&mut reader).map(Message::V3),
        }
    }

    pub fn version(&self) -> Version {
        match self {
            Message::Community(msg) => msg.version,
            Message::V3(_) => Version::V3,
        }
    }
}

fn decode_v3(reader: &mut BerReader<'_>) -> Result<V3Message, SnmpError> {
    let mut global = reader.read_sequence()?;
    let msg_id = global.read_integer()? as i32;
    let max_size = global.read_integer()? as i32;
    let flags = global.read_octets()?.value.first().copied().unwrap_or(0);
    let security_model = global.read_integer()?;
    global.finish("msgGlobalData")?;

    if security_model != USM_SECURITY_MODEL {
        return Err(SnmpError::UnsupportedSecurityModel(security_model));
    }

    let security = reader.read_octets()?;
    let mut usm_reader = security.reader();
    let mut params = usm_reader.read_sequence()?;
    usm_reader.finish("msgSecurityParameters")?;

    let engine_id = params.read_octets()?.value.to_vec();
    let engine_boots = clamp_u32(params.read_integer()?);
    let engine_time = clamp_u32(params.read_integer()?);
    let user_name = params.read_octets()?.value.to_vec();
    let auth = params.read_octets()?;
    let priv_params = params.read_octets()?.value.to_vec();
    params.finish("UsmSecurityParameters")?;

    let header = V3Header {
        msg_id,
        max_size,
        flags,
        security_model,
    };

    let data = if header.encrypted() {
        ScopedData::Encrypted(reader.read_octets()?.value.to_vec())
    } else {
        let scoped = reader.expect(tag::SEQUENCE)?;
        let mut inner = scoped.reader();
        let context_engine_id = inner.read_octets()?.value.to_vec();
        let context_name = inner.read_octets()?.value.to_vec();
        let pdu = Pdu::decode(inner.read()?)?;
        inner.finish("scoped pdu")?;
        ScopedData::Plain(ScopedPdu {
            context_engine_id,
            context_name,
            pdu,
        })
    };
    reader.finish("message")?;

    Ok(V3Message {
        header,
        usm: UsmParams {
            engine_id,
            engine_boots,
            engine_time,
            user_name,
            auth_params: auth.value.to_vec(),
            auth_offset: auth.offset,
            priv_params,
        },
        data,
    })
}

fn clamp_u32(v: i64) -> u32 {
    v.clamp(0, u32::MAX as i64) as u32
}

/// Builds an authenticated (and optionally encrypted) v3 notification
///
/// Used by the integration tests and by anyone replaying device traffic.
pub fn encode_v3(
    user: &LocalizedUser,
    msg_id: i32,
    engine_boots: u32,
    engine_time: u32,
    salt: [u8; 8],
    pdu: &Pdu,
) -> Result<Vec<u8>, SnmpError> {
    let scoped = ScopedPdu {
        context_engine_id: user.engine_id.clone(),
        context_name: Vec::new(),
        pdu: pdu.clone(),
    }
    .encode();

    let mut flags = FLAG_AUTH;
    let (data, priv_params) = if user.has_privacy() {
        flags |= FLAG_PRIV;
        let cipher = user.encrypt(engine_boots, engine_time, &salt, &scoped)?;
        (ber::encode_octets(&cipher), salt.to_vec())
    } else {
        (scoped, Vec::new())
    };
    if pdu.pdu_type == super::pdu::PduType::InformRequest {
        flags |= FLAG_REPORTABLE;
    }

    let usm = ber::encode_constructed(
        tag::SEQUENCE,
        &[
            ber::encode_octets(&user.engine_id),
            ber::encode_integer(engine_boots as i64),
            ber::encode_integer(engine_time as i64),
            ber::encode_octets(user.user_name.as_bytes()),
            ber::encode_octets(&[0u8; AUTH_PARAMS_LEN]),
            ber::encode_octets(&priv_params),
        ],
    );

    let mut message = ber::encode_constructed(
        tag::SEQUENCE,
        &[
            ber::encode_integer(3),
            ber::encode_constructed(
                tag::SEQUENCE,
                &[
                    ber::encode_integer(msg_id as i64),
                    ber::encode_integer(65507),
                    ber::encode_octets(&[flags]),
                    ber::encode_integer(USM_SECURITY_MODEL),
                ],
            ),
            ber::encode_octets(&usm),
            data,
        ],
    );

    let offset = match Message::decode(&message)? {
        Message::V3(v3) => v3.usm.auth_offset,
        Message::Community(_) => return Err(SnmpError::UnsupportedVersion(3)),
    };
    let signature = user.sign(&message)?;
    message[offset..offset + AUTH_PARAMS_LEN].copy_from_slice(&signature);
    Ok(message)
}
