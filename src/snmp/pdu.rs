//! Protocol data units and variable bindings

use std::net::Ipv4Addr;

use super::ber::{self, BerError, BerReader, BerResult, Tlv, tag};
use super::oid::Oid;

/// `SNMPv2-MIB::sysUpTime.0`
pub const SYS_UPTIME: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 3, 0];

/// `SNMPv2-MIB::snmpTrapOID.0`
pub const SNMP_TRAP_OID: [u32; 11] = [1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0];

/// `SNMPv2-MIB::snmpTrapEnterprise.0`
pub const SNMP_TRAP_ENTERPRISE: [u32; 11] = [1, 3, 6, 1, 6, 3, 1, 1, 4, 3, 0];

/// `SNMP-COMMUNITY-MIB::snmpTrapAddress.0`
pub const SNMP_TRAP_ADDRESS: [u32; 11] = [1, 3, 6, 1, 6, 3, 18, 1, 3, 0, 0];

/// `SNMPv2-MIB::snmpTraps`, parent of the generic v1 trap identifiers
const SNMP_TRAPS: [u32; 9] = [1, 3, 6, 1, 6, 3, 1, 1, 5];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress(Ipv4Addr),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Value {
    fn decode(tlv: Tlv<'_>) -> BerResult<Self> {
        let value = match tlv.tag {
            tag::INTEGER => Value::Integer(ber::decode_integer(tlv.value)?),
            tag::OCTET_STRING => Value::OctetString(tlv.value.to_vec()),
            tag::NULL => Value::Null,
            tag::OBJECT_IDENTIFIER => Value::ObjectId(ber::decode_oid(tlv.value)?),
            tag::IP_ADDRESS => {
                let octets: [u8; 4] = tlv.value.try_into().map_err(|_| BerError::InvalidLength)?;
                Value::IpAddress(Ipv4Addr::from(octets))
            }
            tag::COUNTER32 => Value::Counter32(to_u32(ber::decode_unsigned(tlv.value)?)?),
            tag::GAUGE32 => Value::Gauge32(to_u32(ber::decode_unsigned(tlv.value)?)?),
            tag::TIMETICKS => Value::TimeTicks(to_u32(ber::decode_unsigned(tlv.value)?)?),
            tag::OPAQUE => Value::Opaque(tlv.value.to_vec()),
            tag::COUNTER64 => Value::Counter64(ber::decode_unsigned(tlv.value)?),
            tag::NO_SUCH_OBJECT => Value::NoSuchObject,
            tag::NO_SUCH_INSTANCE => Value::NoSuchInstance,
            tag::END_OF_MIB_VIEW => Value::EndOfMibView,
            other => {
                return Err(BerError::UnexpectedTag {
                    expected: tag::NULL,
                    found: other,
                });
            }
        };
        Ok(value)
    }

    fn encode(&self) -> Vec<u8> {
        match self {
            Value::Integer(v) => ber::encode_integer(*v),
            Value::OctetString(v) => ber::encode_octets(v),
            Value::Null => ber::encode_null(),
            Value::ObjectId(oid) => ber::encode_oid(oid),
            Value::IpAddress(addr) => ber::encode_tlv(tag::IP_ADDRESS, &addr.octets()),
            Value::Counter32(v) => ber::encode_unsigned(tag::COUNTER32, *v as u64),
            Value::Gauge32(v) => ber::encode_unsigned(tag::GAUGE32, *v as u64),
            Value::TimeTicks(v) => ber::encode_unsigned(tag::TIMETICKS, *v as u64),
            Value::Opaque(v) => ber::encode_tlv(tag::OPAQUE, v),
            Value::Counter64(v) => ber::encode_unsigned(tag::COUNTER64, *v),
            Value::NoSuchObject => ber::encode_tlv(tag::NO_SUCH_OBJECT, &[]),
            Value::NoSuchInstance => ber::encode_tlv(tag::NO_SUCH_INSTANCE, &[]),
            Value::EndOfMibView => ber::encode_tlv(tag::END_OF_MIB_VIEW, &[]),
        }
    }
}

fn to_u32(value: u64) -> BerResult<u32> {
    u32::try_from(value).map_err(|_| BerError::IntegerOverflow)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    pub fn new(oid: impl Into<Oid>, value: Value) -> Self {
        Self {
            oid: oid.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    Response,
    SetRequest,
    GetBulkRequest,
    InformRequest,
    Trap,
    Report,
}

impl PduType {
    fn from_tag(t: u8) -> Option<Self> {
        Some(match t {
            tag::GET_REQUEST => PduType::GetRequest,
            tag::GET_NEXT_REQUEST => PduType::GetNextRequest,
            tag::RESPONSE => PduType::Response,
            tag::SET_REQUEST => PduType::SetRequest,
            tag::GET_BULK_REQUEST => PduType::GetBulkRequest,
            tag::INFORM_REQUEST => PduType::InformRequest,
            tag::TRAP_V2 => PduType::Trap,
            tag::REPORT => PduType::Report,
            _ => return None,
        })
    }

    fn tag(self) -> u8 {
        match self {
            PduType::GetRequest => tag::GET_REQUEST,
            PduType::GetNextRequest => tag::GET_NEXT_REQUEST,
            PduType::Response => tag::RESPONSE,
            PduType::SetRequest => tag::SET_REQUEST,
            PduType::GetBulkRequest => tag::GET_BULK_REQUEST,
            PduType::InformRequest => tag::INFORM_REQUEST,
            PduType::Trap => tag::TRAP_V2,
            PduType::Report => tag::REPORT,
        }
    }

    pub fn is_notification(self) -> bool {
        matches!(self, PduType::Trap | PduType::InformRequest)
    }
}

/// A PDU in SNMPv2 shape; v1 traps are converted on decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: i32,
    pub error_index: i32,
    pub var_binds: Vec<VarBind>,
}

impl Pdu {
    pub fn decode(tlv: Tlv<'_>) -> BerResult<Self> {
        if tlv.tag == tag::TRAP_V1 {
            return decode_v1_trap(tlv);
        }

        let pdu_type = PduType::from_tag(tlv.tag).ok_or(BerError::UnexpectedTag {
            expected: tag::TRAP_V2,
            found: tlv.tag,
        })?;

        let mut reader = tlv.reader();
        let request_id = reader.read_integer()? as i32;
        let error_status = reader.read_integer()? as i32;
        let error_index = reader.read_integer()? as i32;
        let var_binds = decode_var_binds(&mut reader.read_sequence()?)?;
        reader.finish("pdu")?;

        Ok(Self {
            pdu_type,
            request_id,
            error_status,
            error_index,
            var_binds,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let binds: Vec<Vec<u8>> = self
            .var_binds
            .iter()
            .map(|vb| {
                ber::encode_constructed(tag::SEQUENCE, &[ber::encode_oid(&vb.oid), vb.value.encode()])
            })
            .collect();

        ber::encode_constructed(
            self.pdu_type.tag(),
            &[
                ber::encode_integer(self.request_id as i64),
                ber::encode_integer(self.error_status as i64),
                ber::encode_integer(self.error_index as i64),
                ber::encode_constructed(tag::SEQUENCE, &binds),
            ],
        )
    }

    /// Acknowledgement for an InformRequest
    pub fn response_to(&self) -> Pdu {
        Pdu {
            pdu_type: PduType::Response,
            request_id: self.request_id,
            error_status: 0,
            error_index: 0,
            var_binds: self.var_binds.clone(),
        }
    }
}

fn decode_var_binds(reader: &mut BerReader<'_>) -> BerResult<Vec<VarBind>> {
    let mut binds = Vec::new();
    while !reader.is_empty() {
        let mut entry = reader.read_sequence()?;
        let oid = entry.read_oid()?;
        let value = Value::decode(entry.read()?)?;
        entry.finish("variable binding")?;
        binds.push(VarBind { oid, value });
    }
    Ok(binds)
}

/// RFC 3584 section 3.1 translation of a v1 Trap-PDU
fn decode_v1_trap(tlv: Tlv<'_>) -> BerResult<Pdu> {
    let mut reader = tlv.reader();
    let enterprise = reader.read_oid()?;
    let agent_addr = match Value::decode(reader.expect(tag::IP_ADDRESS)?)? {
        Value::IpAddress(addr) => addr,
        _ => return Err(BerError::InvalidLength),
    };
    let generic = reader.read_integer()?;
    let specific = reader.read_integer()?;
    let timestamp = to_u32(ber::decode_unsigned(reader.expect(tag::TIMETICKS)?.value)?)?;
    let original = decode_var_binds(&mut reader.read_sequence()?)?;
    reader.finish("v1 trap")?;

    let trap_oid = if (0..6).contains(&generic) {
        Oid::from(&SNMP_TRAPS[..]).child(&[generic as u32 + 1])
    } else {
        let specific = u32::try_from(specific).map_err(|_| BerError::IntegerOverflow)?;
        enterprise.child(&[0, specific])
    };

    let mut var_binds = vec![
        VarBind::new(&SYS_UPTIME[..], Value::TimeTicks(timestamp)),
        VarBind::new(&SNMP_TRAP_OID[..], Value::ObjectId(trap_oid)),
    ];
    var_binds.extend(original);
    var_binds.push(VarBind::new(&SNMP_TRAP_ADDRESS[..], Value::IpAddress(agent_addr)));
    var_binds.push(VarBind::new(&SNMP_TRAP_ENTERPRISE[..], Value::ObjectId(enterprise)));

    Ok(Pdu {
        pdu_type: PduType::Trap,
        request_id: 0,
        error_status: 0,
        error_index: 0,
        var_binds,
    })
}

/// Encode a v1 Trap-PDU; used by senders and tests
pub fn encode_v1_trap(
    enterprise: &Oid,
    agent_addr: Ipv4Addr,
    generic: i64,
    specific: i64,
    timestamp: u32,
    var_binds: &[VarBind],
) -> Vec<u8> {
    let binds: Vec<Vec<u8>> = var_binds
        .iter()
        .map(|vb| ber::encode_constructed(tag::SEQUENCE, &[ber::encode_oid(&vb.oid), vb.value.encode()]))
        .collect();

    ber::encode_constructed(
        tag::TRAP_V1,
        &[
            ber::encode_oid(enterprise),
            ber::encode_tlv(tag::IP_ADDRESS, &agent_addr.octets()),
            ber::encode_integer(generic),
            ber::encode_integer(specific),
            ber::encode_unsigned(tag::TIMETICKS, timestamp as u64),
            ber::encode_constructed(tag::SEQUENCE, &binds),
        ],
    )
}
