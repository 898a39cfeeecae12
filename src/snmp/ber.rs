//! Minimal BER codec for SNMP messages
//!
//! Only the subset SNMP uses: single-byte tags, definite lengths up to four
//! length octets, primitive integers, octet strings, NULL, object identifiers
//! and constructed sequences/PDUs.
//!
//! Every decoded [`Tlv`] remembers the absolute offset of its value within the
//! outermost buffer. USM authentication needs that to zero the authentication
//! parameters in place before recomputing the HMAC.

use thiserror::Error;

use super::oid::Oid;

pub mod tag {
    pub const INTEGER: u8 = 0x02;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OBJECT_IDENTIFIER: u8 = 0x06;
    pub const SEQUENCE: u8 = 0x30;

    pub const IP_ADDRESS: u8 = 0x40;
    pub const COUNTER32: u8 = 0x41;
    pub const GAUGE32: u8 = 0x42;
    pub const TIMETICKS: u8 = 0x43;
    pub const OPAQUE: u8 = 0x44;
    pub const COUNTER64: u8 = 0x46;

    pub const NO_SUCH_OBJECT: u8 = 0x80;
    pub const NO_SUCH_INSTANCE: u8 = 0x81;
    pub const END_OF_MIB_VIEW: u8 = 0x82;

    pub const GET_REQUEST: u8 = 0xA0;
    pub const GET_NEXT_REQUEST: u8 = 0xA1;
    pub const RESPONSE: u8 = 0xA2;
    pub const SET_REQUEST: u8 = 0xA3;
    pub const TRAP_V1: u8 = 0xA4;
    pub const GET_BULK_REQUEST: u8 = 0xA5;
    pub const INFORM_REQUEST: u8 = 0xA6;
    pub const TRAP_V2: u8 = 0xA7;
    pub const REPORT: u8 = 0xA8;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BerError {
    #[error("truncated input")]
    Truncated,

    #[error("unsupported length encoding")]
    InvalidLength,

    #[error("unsupported high tag number form")]
    HighTagNumber,

    #[error("expected tag 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag { expected: u8, found: u8 },

    #[error("integer does not fit")]
    IntegerOverflow,

    #[error("malformed object identifier")]
    InvalidOid,

    #[error("trailing bytes after {0}")]
    TrailingBytes(&'static str),
}

pub type BerResult<T> = Result<T, BerError>;

/// One decoded tag-length-value triple borrowed from the input
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],

    /// Absolute offset of `value` in the outermost buffer
    pub offset: usize,
}

impl<'a> Tlv<'a> {
    pub fn expect(self, expected: u8) -> BerResult<Self> {
        if self.tag == expected {
            Ok(self)
        } else {
            Err(BerError::UnexpectedTag {
                expected,
                found: self.tag,
            })
        }
    }

    /// Reader over the contents of a constructed value
    pub fn reader(&self) -> BerReader<'a> {
        BerReader {
            buf: self.value,
            pos: 0,
            base: self.offset,
        }
    }
}

/// Sequential reader over a BER buffer
#[derive(Debug, Clone)]
pub struct BerReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> BerReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Bytes consumed so far, relative to this reader
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read(&mut self) -> BerResult<Tlv<'a>> {
        let tag = *self.buf.get(self.pos).ok_or(BerError::Truncated)?;
        if tag & 0x1f == 0x1f {
            return Err(BerError::HighTagNumber);
        }
        let mut cursor = self.pos + 1;

        let first = *self.buf.get(cursor).ok_or(BerError::Truncated)?;
        cursor += 1;

        let len = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7f) as usize;
            if count == 0 || count > 4 {
                return Err(BerError::InvalidLength);
            }
            let bytes = self
                .buf
                .get(cursor..cursor + count)
                .ok_or(BerError::Truncated)?;
            cursor += count;
            bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize)
        };

        let end = cursor.checked_add(len).ok_or(BerError::InvalidLength)?;
        let value = self.buf.get(cursor..end).ok_or(BerError::Truncated)?;

        let tlv = Tlv {
            tag,
            value,
            offset: self.base + cursor,
        };
        self.pos = end;
        Ok(tlv)
    }

    pub fn expect(&mut self, expected: u8) -> BerResult<Tlv<'a>> {
        self.read()?.expect(expected)
    }

    pub fn read_integer(&mut self) -> BerResult<i64> {
        decode_integer(self.expect(tag::INTEGER)?.value)
    }

    pub fn read_octets(&mut self) -> BerResult<Tlv<'a>> {
        self.expect(tag::OCTET_STRING)
    }

    pub fn read_sequence(&mut self) -> BerResult<BerReader<'a>> {
        Ok(self.expect(tag::SEQUENCE)?.reader())
    }

    pub fn read_oid(&mut self) -> BerResult<Oid> {
        decode_oid(self.expect(tag::OBJECT_IDENTIFIER)?.value)
    }

    pub fn finish(&self, what: &'static str) -> BerResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(BerError::TrailingBytes(what))
        }
    }
}

/// Two's complement signed integer, at most eight content octets
pub fn decode_integer(bytes: &[u8]) -> BerResult<i64> {
    if bytes.is_empty() {
        return Err(BerError::Truncated);
    }
    if bytes.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }

    let negative = bytes[0] & 0x80 != 0;
    let mut value: i64 = if negative { -1 } else { 0 };
    for b in bytes {
        value = (value << 8) | *b as i64;
    }
    Ok(value)
}

/// Unsigned application integer (Counter32, Gauge32, TimeTicks, Counter64)
///
/// Encoders prepend a zero octet when the high bit is set, so nine octets are
/// accepted as long as the first one is zero.
pub fn decode_unsigned(bytes: &[u8]) -> BerResult<u64> {
    if bytes.is_empty() {
        return Err(BerError::Truncated);
    }
    let bytes = if bytes.len() == 9 && bytes[0] == 0 {
        &bytes[1..]
    } else {
        bytes
    };
    if bytes.len() > 8 {
        return Err(BerError::IntegerOverflow);
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
}

pub fn decode_oid(bytes: &[u8]) -> BerResult<Oid> {
    let (&first, rest) = bytes.split_first().ok_or(BerError::InvalidOid)?;
    if first & 0x80 != 0 {
        return Err(BerError::InvalidOid);
    }

    let mut arcs = match first {
        0..=39 => vec![0, first as u32],
        40..=79 => vec![1, (first - 40) as u32],
        _ => vec![2, (first - 80) as u32],
    };

    let mut acc: u32 = 0;
    let mut pending = false;
    for b in rest {
        acc = acc
            .checked_mul(128)
            .and_then(|v| v.checked_add((b & 0x7f) as u32))
            .ok_or(BerError::InvalidOid)?;
        if b & 0x80 == 0 {
            arcs.push(acc);
            acc = 0;
            pending = false;
        } else {
            pending = true;
        }
    }
    if pending {
        return Err(BerError::InvalidOid);
    }

    Ok(Oid::new(arcs))
}

fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (4 - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

pub fn encode_tlv(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len() + 6);
    out.push(tag);
    encode_length(value.len(), &mut out);
    out.extend_from_slice(value);
    out
}

/// Constructed value from already-encoded children
pub fn encode_constructed(tag: u8, children: &[Vec<u8>]) -> Vec<u8> {
    encode_tlv(tag, &children.concat())
}

pub fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // strip redundant sign octets
    while start < 7 {
        let (cur, next) = (bytes[start], bytes[start + 1]);
        if (cur == 0x00 && next & 0x80 == 0) || (cur == 0xff && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    encode_tlv(tag::INTEGER, &bytes[start..])
}

pub fn encode_unsigned(tag: u8, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
    let mut content = Vec::with_capacity(9);
    if bytes[skip] & 0x80 != 0 {
        content.push(0);
    }
    content.extend_from_slice(&bytes[skip..]);
    encode_tlv(tag, &content)
}

pub fn encode_octets(value: &[u8]) -> Vec<u8> {
    encode_tlv(tag::OCTET_STRING, value)
}

pub fn encode_null() -> Vec<u8> {
    encode_tlv(tag::NULL, &[])
}

pub fn encode_oid(oid: &Oid) -> Vec<u8> {
    let arcs = oid.arcs();
    let mut content = Vec::new();

    let (head, tail) = match arcs {
        [] => (0u32, &[][..]),
        [a] => (a * 40, &[][..]),
        [a, b, rest @ ..] => (a * 40 + b, rest),
    };

    for arc in std::iter::once(head).chain(tail.iter().copied()) {
        let mut chunk = [0u8; 5];
        let mut n = 0;
        let mut v = arc;
        loop {
            chunk[n] = (v & 0x7f) as u8;
            n += 1;
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        for i in (0..n).rev() {
            content.push(if i > 0 { chunk[i] | 0x80 } else { chunk[i] });
        }
    }

    encode_tlv(tag::OBJECT_IDENTIFIER, &content)
}
