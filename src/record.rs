//! Tagged-record decoding of decrypted keychain plaintext.
//!
//! A decrypted entry body is a DER `SET` of `SEQUENCE { name, value }` pairs.
//! The member values are untyped at the container level, so decoding is
//! deliberately lossy-but-total: a value whose encoding the generic grammar
//! does not recognize degrades to [`RecordValue::Absent`] instead of failing
//! the whole record. Consumers need partial records even when one field is
//! malformed.
//!
//! Timestamp fields are the common casualty of the generic grammar (their
//! encoding is ambiguous under it), so before an `Absent` is accepted the raw
//! value bytes are re-attempted under a dedicated UTCTime/GeneralizedTime
//! grammar.
//!
//! Field order is preserved, and two diagnostic fields are synthesized on
//! every decode: `_fieldOrder` (comma-joined names in input order) and
//! `_fieldTypes` (comma-joined decoded type names).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_UTF8_STRING: u8 = 0x0c;
const TAG_PRINTABLE_STRING: u8 = 0x13;
const TAG_T61_STRING: u8 = 0x14;
const TAG_IA5_STRING: u8 = 0x16;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;

pub const FIELD_ORDER: &str = "_fieldOrder";
pub const FIELD_TYPES: &str = "_fieldTypes";

/// A decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
    /// The value's encoding was not decodable under either grammar.
    Absent,
}

impl RecordValue {
    /// Decoded type name, as recorded in the `_fieldTypes` diagnostic.
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordValue::String(_) => "string",
            RecordValue::Integer(_) => "integer",
            RecordValue::Boolean(_) => "boolean",
            RecordValue::Blob(_) => "blob",
            RecordValue::Timestamp(_) => "timestamp",
            RecordValue::Absent => "absent",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordValue::String(v) => serializer.serialize_str(v),
            RecordValue::Integer(v) => serializer.serialize_i64(*v),
            RecordValue::Boolean(v) => serializer.serialize_bool(*v),
            RecordValue::Blob(v) => serializer.serialize_str(&STANDARD.encode(v)),
            RecordValue::Timestamp(v) => {
                serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            RecordValue::Absent => serializer.serialize_unit(),
        }
    }
}

/// An ordered, typed key/value record recovered from one keychain entry.
///
/// Never mutated after the decoder and the entry decryptor have filled it in;
/// serializes as a JSON object with fields in insertion order.
#[derive(Debug, Default)]
pub struct DecryptedRecord {
    fields: Vec<(String, RecordValue)>,
}

impl DecryptedRecord {
    pub fn push(&mut self, name: impl Into<String>, value: RecordValue) {
        self.fields.push((name.into(), value));
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&RecordValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &RecordValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for DecryptedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Decode a decrypted entry body into a [`DecryptedRecord`].
///
/// Total: malformed structure yields fewer fields, never an error. Decoding
/// stops at the first undecodable DER element boundary.
pub fn decode(plaintext: &[u8]) -> DecryptedRecord {
    let mut record = DecryptedRecord::default();
    let mut names: Vec<String> = Vec::new();
    let mut types: Vec<&'static str> = Vec::new();

    if let Some((TAG_SET, body, _)) = element(plaintext) {
        let mut rest = body;
        while !rest.is_empty() {
            let Some((tag, entry, tail)) = element(rest) else {
                break;
            };
            rest = tail;
            if tag != TAG_SEQUENCE {
                continue;
            }
            let Some((name, value_tlv)) = split_entry(entry) else {
                continue;
            };

            let mut value = decode_generic(value_tlv);
            if value == RecordValue::Absent {
                // Secondary attempt: the timestamp grammar covers the tags the
                // generic grammar leaves undecoded.
                if let Some(timestamp) = decode_timestamp(value_tlv) {
                    value = RecordValue::Timestamp(timestamp);
                }
            }

            names.push(name.clone());
            types.push(value.type_name());
            record.push(name, value);
        }
    }

    record.push(
        FIELD_ORDER,
        RecordValue::String(names.join(",")),
    );
    record.push(
        FIELD_TYPES,
        RecordValue::String(types.join(",")),
    );
    record
}

/// Read one DER element: `(tag, body, remainder)`.
///
/// Rejects indefinite lengths and anything that overruns the buffer.
fn element(bytes: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&tag, rest) = bytes.split_first()?;
    let (&len0, rest) = rest.split_first()?;

    let (len, rest) = if len0 < 0x80 {
        (len0 as usize, rest)
    } else {
        let count = (len0 & 0x7f) as usize;
        // 0x80 is the indefinite form, not valid DER; >4 length bytes cannot
        // describe anything that fits in these buffers.
        if count == 0 || count > 4 || rest.len() < count {
            return None;
        }
        let mut len = 0usize;
        for &byte in &rest[..count] {
            len = (len << 8) | byte as usize;
        }
        (len, &rest[count..])
    };

    if rest.len() < len {
        return None;
    }
    Some((tag, &rest[..len], &rest[len..]))
}

/// Split a `SEQUENCE { name, value }` body into the field name and the raw
/// value element (tag and length included, for the fallback re-decode).
fn split_entry(entry: &[u8]) -> Option<(String, &[u8])> {
    let (name_tag, name_body, value_tlv) = element(entry)?;
    if !is_string_tag(name_tag) {
        return None;
    }
    let name = std::str::from_utf8(name_body).ok()?.to_string();
    // Validate the value element's framing, but hand back the raw bytes.
    let _ = element(value_tlv)?;
    Some((name, value_tlv))
}

fn is_string_tag(tag: u8) -> bool {
    matches!(
        tag,
        TAG_UTF8_STRING | TAG_PRINTABLE_STRING | TAG_T61_STRING | TAG_IA5_STRING
    )
}

/// The generic value grammar: strings, integers, booleans, and blobs.
/// Everything else is `Absent`.
fn decode_generic(tlv: &[u8]) -> RecordValue {
    let Some((tag, body, _)) = element(tlv) else {
        return RecordValue::Absent;
    };
    match tag {
        TAG_BOOLEAN if body.len() == 1 => RecordValue::Boolean(body[0] != 0),
        TAG_INTEGER => decode_integer(body),
        TAG_OCTET_STRING => RecordValue::Blob(body.to_vec()),
        tag if is_string_tag(tag) => match std::str::from_utf8(body) {
            Ok(text) => RecordValue::String(text.to_string()),
            Err(_) => RecordValue::Absent,
        },
        _ => RecordValue::Absent,
    }
}

fn decode_integer(body: &[u8]) -> RecordValue {
    if body.is_empty() || body.len() > 8 {
        return RecordValue::Absent;
    }
    // Big-endian two's complement.
    let mut value: i64 = if body[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in body {
        value = (value << 8) | i64::from(byte);
    }
    RecordValue::Integer(value)
}

/// The timestamp grammar: UTCTime (`YYMMDDHHMMSS`) and GeneralizedTime
/// (`YYYYMMDDHHMMSS`), suffixed with `Z`, an explicit `±hhmm` offset, or
/// nothing. Fractional seconds are tolerated and dropped; offsets are
/// normalized to UTC.
fn decode_timestamp(tlv: &[u8]) -> Option<DateTime<Utc>> {
    let (tag, body, _) = element(tlv)?;
    let format = match tag {
        TAG_UTC_TIME => "%y%m%d%H%M%S",
        TAG_GENERALIZED_TIME => "%Y%m%d%H%M%S",
        _ => return None,
    };
    let text = std::str::from_utf8(body).ok()?;

    if let Some(sign) = text.rfind(['+', '-']) {
        let stamp = strip_fraction(&text[..sign]);
        let zoned = format!("{stamp}{}", &text[sign..]);
        let parsed = DateTime::parse_from_str(&zoned, &format!("{format}%z")).ok()?;
        return Some(parsed.with_timezone(&Utc));
    }

    let text = text.strip_suffix('Z').unwrap_or(text);
    let naive = NaiveDateTime::parse_from_str(strip_fraction(text), format).ok()?;
    Some(naive.and_utc())
}

fn strip_fraction(text: &str) -> &str {
    match text.find('.') {
        Some(dot) => &text[..dot],
        None => text,
    }
}
