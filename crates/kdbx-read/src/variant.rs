//! Variant map codec
//!
//! The dynamically-typed key/value sub-format KDBX4 headers use to carry KDF
//! parameters and public custom data. The wire layout is a 2-byte version
//! followed by `(u8 tag, u32 name length, name, u32 value length, value)`
//! entries terminated by an `End` tag. Values are a closed set of seven
//! kinds; anything else is rejected at decode time.

use std::collections::HashMap;

use byteorder::{ByteOrder, LittleEndian};

use crate::bytes::CursorReader;
use crate::error::{Error, Result};
use crate::keepass2::{VARIANTMAP_CRITICAL_MASK, VARIANTMAP_VERSION};

const TAG_END: u8 = 0x00;
const TAG_UINT32: u8 = 0x04;
const TAG_UINT64: u8 = 0x05;
const TAG_BOOL: u8 = 0x08;
const TAG_INT32: u8 = 0x0c;
const TAG_INT64: u8 = 0x0d;
const TAG_STRING: u8 = 0x18;
const TAG_BYTE_ARRAY: u8 = 0x42;

/// One decoded variant map value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantValue {
    Bool(bool),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    String(String),
    ByteArray(Vec<u8>),
}

/// A decoded variant map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantMap {
    entries: HashMap<String, VariantValue>,
}

impl VariantMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: VariantValue) {
        self.entries.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&VariantValue> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Byte array value, `None` when absent or differently typed.
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        match self.entries.get(name) {
            Some(VariantValue::ByteArray(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// 32-bit value; a negative `Int32` does not coerce.
    pub fn get_u32(&self, name: &str) -> Option<u32> {
        match self.entries.get(name) {
            Some(VariantValue::UInt32(v)) => Some(*v),
            Some(VariantValue::Int32(v)) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    /// 64-bit value; a negative `Int64` does not coerce.
    pub fn get_u64(&self, name: &str) -> Option<u64> {
        match self.entries.get(name) {
            Some(VariantValue::UInt64(v)) => Some(*v),
            Some(VariantValue::Int64(v)) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Decodes a variant map from a cursor positioned at its version field.
    pub fn read(reader: &mut CursorReader<'_>) -> Result<VariantMap> {
        let version = reader.read_u16_le()? & VARIANTMAP_CRITICAL_MASK;
        let max_version = VARIANTMAP_VERSION & VARIANTMAP_CRITICAL_MASK;
        if version > max_version {
            return Err(Error::InvalidVariantMap(format!(
                "unsupported variant map version {version:#06x}"
            )));
        }

        let mut map = VariantMap::new();

        loop {
            let tag = reader.read_u8()?;
            if tag == TAG_END {
                break;
            }

            let name_len = reader.read_u32_le()? as usize;
            let name_bytes = reader
                .read_bytes(name_len)
                .map_err(|_| Error::InvalidVariantMap("truncated entry name".into()))?;
            let name = std::str::from_utf8(name_bytes)
                .map_err(|_| Error::InvalidVariantMap("entry name is not valid UTF-8".into()))?
                .to_owned();

            let value_len = reader.read_u32_le()? as usize;
            let value_bytes = reader
                .read_bytes(value_len)
                .map_err(|_| Error::InvalidVariantMap("truncated entry value".into()))?;

            let value = match tag {
                TAG_BOOL => {
                    if value_bytes.len() != 1 {
                        return Err(Error::InvalidVariantMap(format!(
                            "Bool entry {name:?} has length {value_len}"
                        )));
                    }
                    VariantValue::Bool(value_bytes[0] != 0)
                }
                TAG_INT32 => {
                    if value_bytes.len() != 4 {
                        return Err(Error::InvalidVariantMap(format!(
                            "Int32 entry {name:?} has length {value_len}"
                        )));
                    }
                    VariantValue::Int32(LittleEndian::read_i32(value_bytes))
                }
                TAG_UINT32 => {
                    if value_bytes.len() != 4 {
                        return Err(Error::InvalidVariantMap(format!(
                            "UInt32 entry {name:?} has length {value_len}"
                        )));
                    }
                    VariantValue::UInt32(LittleEndian::read_u32(value_bytes))
                }
                TAG_INT64 => {
                    if value_bytes.len() != 8 {
                        return Err(Error::InvalidVariantMap(format!(
                            "Int64 entry {name:?} has length {value_len}"
                        )));
                    }
                    VariantValue::Int64(LittleEndian::read_i64(value_bytes))
                }
                TAG_UINT64 => {
                    if value_bytes.len() != 8 {
                        return Err(Error::InvalidVariantMap(format!(
                            "UInt64 entry {name:?} has length {value_len}"
                        )));
                    }
                    VariantValue::UInt64(LittleEndian::read_u64(value_bytes))
                }
                TAG_STRING => {
                    let text = std::str::from_utf8(value_bytes).map_err(|_| {
                        Error::InvalidVariantMap(format!(
                            "String entry {name:?} is not valid UTF-8"
                        ))
                    })?;
                    VariantValue::String(text.to_owned())
                }
                TAG_BYTE_ARRAY => VariantValue::ByteArray(value_bytes.to_vec()),
                other => {
                    return Err(Error::InvalidVariantMap(format!(
                        "unknown field type {other:#04x}"
                    )))
                }
            };

            map.entries.insert(name, value);
        }

        Ok(map)
    }

    /// Encodes the map back to its wire form. Only the decoder is part of
    /// the reading pipeline; this exists for tests and fixtures.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&VARIANTMAP_VERSION.to_le_bytes());

        for (name, value) in &self.entries {
            let (tag, bytes): (u8, Vec<u8>) = match value {
                VariantValue::Bool(v) => (TAG_BOOL, vec![u8::from(*v)]),
                VariantValue::Int32(v) => (TAG_INT32, v.to_le_bytes().to_vec()),
                VariantValue::UInt32(v) => (TAG_UINT32, v.to_le_bytes().to_vec()),
                VariantValue::Int64(v) => (TAG_INT64, v.to_le_bytes().to_vec()),
                VariantValue::UInt64(v) => (TAG_UINT64, v.to_le_bytes().to_vec()),
                VariantValue::String(v) => (TAG_STRING, v.as_bytes().to_vec()),
                VariantValue::ByteArray(v) => (TAG_BYTE_ARRAY, v.clone()),
            };
            out.push(tag);
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(&bytes);
        }

        out.push(TAG_END);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<VariantMap> {
        let mut cursor = CursorReader::new(bytes);
        VariantMap::read(&mut cursor)
    }

    #[test]
    fn round_trip_over_all_value_kinds() {
        let mut map = VariantMap::new();
        map.insert("flag", VariantValue::Bool(true));
        map.insert("neg", VariantValue::Int32(-12345));
        map.insert("small", VariantValue::UInt32(0xdead_beef));
        map.insert("signed64", VariantValue::Int64(i64::MIN));
        map.insert("big", VariantValue::UInt64(u64::MAX));
        map.insert("name", VariantValue::String("Sample Vault".into()));
        map.insert("blob", VariantValue::ByteArray(vec![0, 1, 2, 254, 255]));

        let decoded = decode(&map.to_bytes()).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn empty_map_round_trips() {
        let map = VariantMap::new();
        let decoded = decode(&map.to_bytes()).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn newer_critical_version_is_rejected() {
        let mut bytes = VariantMap::new().to_bytes();
        bytes[1] = 0x02; // bump the critical high byte
        assert!(matches!(decode(&bytes), Err(Error::InvalidVariantMap(_))));
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let mut bytes = vec![0x00, 0x01]; // version
        bytes.push(0x7f); // bogus tag
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'x');
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.push(TAG_END);
        assert!(matches!(decode(&bytes), Err(Error::InvalidVariantMap(_))));
    }

    #[test]
    fn declared_length_must_match_type() {
        let mut map = VariantMap::new();
        map.insert("v", VariantValue::UInt32(7));
        let mut bytes = map.to_bytes();
        // Shrink the declared value length of the UInt32 from 4 to 3 and
        // drop one payload byte.
        let pos = bytes.len() - 6; // [len u32][4 bytes][END]
        bytes[pos - 4] = 3;
        bytes.remove(pos);
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn truncated_value_is_fatal() {
        let mut map = VariantMap::new();
        map.insert("blob", VariantValue::ByteArray(vec![1, 2, 3, 4]));
        let mut bytes = map.to_bytes();
        bytes.truncate(bytes.len() - 3); // cut into the payload
        assert!(decode(&bytes).is_err());
    }

    #[test]
    fn typed_getters_reject_mismatches() {
        let mut map = VariantMap::new();
        map.insert("n", VariantValue::Int32(-1));
        map.insert("m", VariantValue::UInt64(9));
        map.insert("s", VariantValue::String("x".into()));

        assert_eq!(map.get_u32("n"), None); // negative does not coerce
        assert_eq!(map.get_u64("m"), Some(9));
        assert_eq!(map.get_u64("s"), None);
        assert_eq!(map.get_bytes("s"), None);
    }
}
