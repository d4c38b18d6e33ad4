//! Data section encoding and decoding
//!
//! Implements the MaxMind DB data section format: every value is a
//! control byte (3 type bits, 5 size bits), an optional extended-type
//! byte, optional extra size bytes, and a big-endian payload.
//!
//! # Supported types
//!
//! - **Pointer**: back-reference to an earlier value (encoding artifact,
//!   never surfaced by the decoder)
//! - **String**: UTF-8 text
//! - **Double** / **Float**: IEEE 754, always 8 / 4 bytes
//! - **Bytes**: raw byte arrays
//! - **Uint16/32/64/128**, **Int32**: variable width, smallest
//!   representation wins
//! - **Map** / **Array**: containers, keys are strings
//! - **Bool**: payload carried in the size field
//! - **Null**: zero-size marker
//!
//! The encoder deduplicates by content: a value equal to one already
//! written is replaced by a pointer record to the earlier offset, so
//! shared payloads are stored once per database.
//!
//! See: <https://maxmind.github.io/MaxMind-DB/>

use crate::error::{IpdbError, Result};
use rustc_hash::FxHashMap;
use std::collections::HashMap;

// Type tags as stored on the wire. Tags >= 8 are written through the
// extended-type escape (control type bits 0, actual tag in the next byte).
const TYPE_POINTER: u8 = 1;
const TYPE_STRING: u8 = 2;
const TYPE_DOUBLE: u8 = 3;
const TYPE_BYTES: u8 = 4;
const TYPE_UINT16: u8 = 5;
const TYPE_UINT32: u8 = 6;
const TYPE_MAP: u8 = 7;
const TYPE_INT32: u8 = 8;
const TYPE_UINT64: u8 = 9;
const TYPE_UINT128: u8 = 10;
const TYPE_ARRAY: u8 = 11;
const TYPE_NULL: u8 = 13;
const TYPE_BOOL: u8 = 14;
const TYPE_FLOAT: u8 = 15;

// Containers nested deeper than this are treated as corruption rather
// than risking unbounded recursion.
const MAX_DECODE_DEPTH: usize = 512;

/// A value stored in the data section
///
/// Recursively typed and immutable once written. Pointers are not part
/// of the model; deduplication happens transparently at encode time and
/// pointer records are resolved transparently at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Absent/empty value
    Null,
    /// Boolean value
    Bool(bool),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Signed 32-bit integer
    Int32(i32),
    /// IEEE 754 double precision float
    Double(f64),
    /// IEEE 754 single precision float
    Float(f32),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Key-value map (string keys only)
    Map(HashMap<String, Value>),
}

impl Value {
    /// Build a map value from an iterator of key-value pairs
    pub fn map<K, I>(pairs: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<serde_json::Value> for Value {
    /// Convert a JSON document into a storable value
    ///
    /// Unsigned numbers take the narrowest integer type that holds them;
    /// negative integers become `Int32` when they fit and `Double`
    /// otherwise; non-integral numbers become `Double`.
    fn from(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    if u <= u64::from(u16::MAX) {
                        Value::Uint16(u as u16)
                    } else if u <= u64::from(u32::MAX) {
                        Value::Uint32(u as u32)
                    } else {
                        Value::Uint64(u)
                    }
                } else if let Some(i) = n.as_i64() {
                    if i >= i64::from(i32::MIN) {
                        Value::Int32(i as i32)
                    } else {
                        Value::Double(i as f64)
                    }
                } else {
                    Value::Double(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl serde::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Uint16(n) => serializer.serialize_u16(*n),
            Value::Uint32(n) => serializer.serialize_u32(*n),
            Value::Uint64(n) => serializer.serialize_u64(*n),
            Value::Uint128(n) => match u64::try_from(*n) {
                Ok(small) => serializer.serialize_u64(small),
                Err(_) => serializer.collect_str(n),
            },
            Value::Int32(n) => serializer.serialize_i32(*n),
            Value::Double(d) => serializer.serialize_f64(*d),
            Value::Float(f) => serializer.serialize_f32(*f),
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Map(m) => {
                let mut pairs: Vec<_> = m.iter().collect();
                pairs.sort_by_key(|(k, _)| k.as_str());
                serializer.collect_map(pairs)
            }
        }
    }
}

/// Data section encoder
///
/// Appends encoded values to a growing buffer and tracks offsets.
/// Re-encoding a value equal in content to an earlier one appends a
/// pointer record instead of a second copy.
pub struct DataEncoder {
    buffer: Vec<u8>,
    /// Canonical value bytes -> offset of the first full encoding
    dedup: FxHashMap<Vec<u8>, u32>,
}

impl DataEncoder {
    /// Create a new encoder with an empty data section
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            dedup: FxHashMap::default(),
        }
    }

    /// Encode a value and return the offset of the record written for it
    ///
    /// The record is either the full value or, when an equal value was
    /// encoded before, a pointer to the earlier offset.
    pub fn encode(&mut self, value: &Value) -> u32 {
        let offset = self.buffer.len() as u32;
        self.encode_value(value);
        offset
    }

    /// Borrow the encoded section
    pub fn bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the encoder and return the encoded section
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Current section size in bytes
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been encoded yet
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn encode_value(&mut self, value: &Value) {
        if let Value::String(s) = value {
            self.encode_str(s);
            return;
        }

        let mut key = Vec::new();
        write_canonical(value, &mut key);
        if let Some(&prior) = self.dedup.get(&key) {
            write_pointer(&mut self.buffer, prior);
            return;
        }
        self.dedup.insert(key, self.buffer.len() as u32);

        match value {
            Value::Null => write_head(&mut self.buffer, TYPE_NULL, 0),
            Value::Bool(b) => write_head(&mut self.buffer, TYPE_BOOL, usize::from(*b)),
            Value::Uint16(n) => write_uint(&mut self.buffer, TYPE_UINT16, &n.to_be_bytes()),
            Value::Uint32(n) => write_uint(&mut self.buffer, TYPE_UINT32, &n.to_be_bytes()),
            Value::Uint64(n) => write_uint(&mut self.buffer, TYPE_UINT64, &n.to_be_bytes()),
            Value::Uint128(n) => write_uint(&mut self.buffer, TYPE_UINT128, &n.to_be_bytes()),
            Value::Int32(n) => write_int32(&mut self.buffer, *n),
            Value::Double(d) => {
                write_head(&mut self.buffer, TYPE_DOUBLE, 8);
                self.buffer.extend_from_slice(&d.to_be_bytes());
            }
            Value::Float(f) => {
                write_head(&mut self.buffer, TYPE_FLOAT, 4);
                self.buffer.extend_from_slice(&f.to_be_bytes());
            }
            Value::Bytes(b) => {
                write_head(&mut self.buffer, TYPE_BYTES, b.len());
                self.buffer.extend_from_slice(b);
            }
            Value::String(_) => unreachable!("strings are handled above"),
            Value::Array(items) => {
                write_head(&mut self.buffer, TYPE_ARRAY, items.len());
                for item in items {
                    self.encode_value(item);
                }
            }
            Value::Map(m) => {
                write_head(&mut self.buffer, TYPE_MAP, m.len());
                // Stable key order keeps output deterministic across runs
                let mut pairs: Vec<_> = m.iter().collect();
                pairs.sort_by_key(|(k, _)| k.as_str());
                for (k, v) in pairs {
                    self.encode_str(k);
                    self.encode_value(v);
                }
            }
        }
    }

    /// Encode a string record; map keys go through here too, so a key
    /// repeated across entries is stored once.
    fn encode_str(&mut self, s: &str) {
        let mut key = Vec::new();
        write_head(&mut key, TYPE_STRING, s.len());
        key.extend_from_slice(s.as_bytes());

        if let Some(&prior) = self.dedup.get(&key) {
            write_pointer(&mut self.buffer, prior);
            return;
        }
        self.dedup.insert(key.clone(), self.buffer.len() as u32);
        self.buffer.extend_from_slice(&key);
    }
}

impl Default for DataEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical (dedup-free) serialization of a value, used as the content
/// key for the dedup index. Identical logical values always produce
/// identical canonical bytes.
fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => write_head(out, TYPE_NULL, 0),
        Value::Bool(b) => write_head(out, TYPE_BOOL, usize::from(*b)),
        Value::Uint16(n) => write_uint(out, TYPE_UINT16, &n.to_be_bytes()),
        Value::Uint32(n) => write_uint(out, TYPE_UINT32, &n.to_be_bytes()),
        Value::Uint64(n) => write_uint(out, TYPE_UINT64, &n.to_be_bytes()),
        Value::Uint128(n) => write_uint(out, TYPE_UINT128, &n.to_be_bytes()),
        Value::Int32(n) => write_int32(out, *n),
        Value::Double(d) => {
            write_head(out, TYPE_DOUBLE, 8);
            out.extend_from_slice(&d.to_be_bytes());
        }
        Value::Float(f) => {
            write_head(out, TYPE_FLOAT, 4);
            out.extend_from_slice(&f.to_be_bytes());
        }
        Value::Bytes(b) => {
            write_head(out, TYPE_BYTES, b.len());
            out.extend_from_slice(b);
        }
        Value::String(s) => {
            write_head(out, TYPE_STRING, s.len());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Array(items) => {
            write_head(out, TYPE_ARRAY, items.len());
            for item in items {
                write_canonical(item, out);
            }
        }
        Value::Map(m) => {
            write_head(out, TYPE_MAP, m.len());
            let mut pairs: Vec<_> = m.iter().collect();
            pairs.sort_by_key(|(k, _)| k.as_str());
            for (k, v) in pairs {
                write_head(out, TYPE_STRING, k.len());
                out.extend_from_slice(k.as_bytes());
                write_canonical(v, out);
            }
        }
    }
}

/// Write control byte, extended-type byte and extra size bytes
fn write_head(out: &mut Vec<u8>, type_id: u8, size: usize) {
    let type_bits = if type_id < 8 { type_id << 5 } else { 0 };

    let mut extra = [0u8; 3];
    let (size_bits, extra_len) = if size < 29 {
        (size as u8, 0)
    } else if size < 285 {
        extra[0] = (size - 29) as u8;
        (29, 1)
    } else if size < 65_821 {
        extra[..2].copy_from_slice(&((size - 285) as u16).to_be_bytes());
        (30, 2)
    } else {
        let n = (size - 65_821) as u32;
        extra.copy_from_slice(&n.to_be_bytes()[1..]);
        (31, 3)
    };

    out.push(type_bits | size_bits);
    if type_id >= 8 {
        out.push(type_id - 7);
    }
    out.extend_from_slice(&extra[..extra_len]);
}

/// Write an unsigned integer with the smallest byte count that holds it
fn write_uint(out: &mut Vec<u8>, type_id: u8, be: &[u8]) {
    let start = be.iter().position(|&b| b != 0).unwrap_or(be.len());
    let trimmed = &be[start..];
    write_head(out, type_id, trimmed.len());
    out.extend_from_slice(trimmed);
}

/// Int32: non-negative values use the minimal width, negatives the full
/// four-byte two's complement form.
fn write_int32(out: &mut Vec<u8>, n: i32) {
    if n >= 0 {
        write_uint(out, TYPE_INT32, &(n as u32).to_be_bytes());
    } else {
        write_head(out, TYPE_INT32, 4);
        out.extend_from_slice(&n.to_be_bytes());
    }
}

/// Pointer record: 2-bit width selector plus 11/19/27/32 payload bits,
/// biased per width so small offsets stay short.
fn write_pointer(out: &mut Vec<u8>, offset: u32) {
    if offset < 0x800 {
        out.push(0x20 | ((offset >> 8) as u8 & 0x07));
        out.push(offset as u8);
    } else if offset < 0x80800 {
        let v = offset - 0x800;
        out.push(0x28 | ((v >> 16) as u8 & 0x07));
        out.push((v >> 8) as u8);
        out.push(v as u8);
    } else if offset < 0x808_0800 {
        let v = offset - 0x80800;
        out.push(0x30 | ((v >> 24) as u8 & 0x07));
        out.push((v >> 16) as u8);
        out.push((v >> 8) as u8);
        out.push(v as u8);
    } else {
        out.push(0x38);
        out.extend_from_slice(&offset.to_be_bytes());
    }
}

/// Data section decoder
///
/// Decodes values from an encoded section. Pointer records are followed
/// transparently; a hop counter bounded by the section length turns
/// pointer cycles into a reported error instead of an infinite loop.
pub struct DataDecoder<'a> {
    buffer: &'a [u8],
}

impl<'a> DataDecoder<'a> {
    /// Create a decoder over a data section
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer }
    }

    /// Decode the value whose record starts at `offset`
    pub fn decode(&self, offset: u32) -> Result<Value> {
        let mut cursor = offset as usize;
        let mut hops = 0usize;
        self.decode_at(&mut cursor, &mut hops, 0)
    }

    fn decode_at(&self, cursor: &mut usize, hops: &mut usize, depth: usize) -> Result<Value> {
        if depth > MAX_DECODE_DEPTH {
            return Err(corrupt("value nesting exceeds supported depth"));
        }

        let ctrl = self.read_byte(cursor)?;
        let type_id = ctrl >> 5;
        let size_bits = ctrl & 0x1F;

        if type_id == TYPE_POINTER {
            return self.decode_pointer(cursor, size_bits, hops, depth);
        }

        let type_id = if type_id == 0 {
            let ext = self.read_byte(cursor)?;
            ext.checked_add(7)
                .filter(|t| matches!(*t, 8..=11 | 13..=15))
                .ok_or_else(|| corrupt(&format!("unknown extended type tag {}", ext)))?
        } else {
            type_id
        };

        let size = self.decode_size(cursor, size_bits)?;

        match type_id {
            TYPE_STRING => {
                let bytes = self.read_bytes(cursor, size)?;
                let s = std::str::from_utf8(bytes)
                    .map_err(|_| corrupt("string payload is not valid UTF-8"))?;
                Ok(Value::String(s.to_string()))
            }
            TYPE_DOUBLE => {
                if size != 8 {
                    return Err(corrupt(&format!("double has size {}, expected 8", size)));
                }
                let bytes: [u8; 8] = self.read_bytes(cursor, 8)?.try_into().unwrap();
                Ok(Value::Double(f64::from_be_bytes(bytes)))
            }
            TYPE_BYTES => Ok(Value::Bytes(self.read_bytes(cursor, size)?.to_vec())),
            TYPE_UINT16 => Ok(Value::Uint16(self.read_unsigned(cursor, size, 2)? as u16)),
            TYPE_UINT32 => Ok(Value::Uint32(self.read_unsigned(cursor, size, 4)? as u32)),
            TYPE_MAP => {
                let mut map = HashMap::with_capacity(size.min(64));
                for _ in 0..size {
                    let key = match self.decode_at(cursor, hops, depth + 1)? {
                        Value::String(s) => s,
                        other => {
                            return Err(corrupt(&format!(
                                "map key must be a string, found {:?}",
                                other
                            )))
                        }
                    };
                    let value = self.decode_at(cursor, hops, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(Value::Map(map))
            }
            TYPE_INT32 => {
                if size > 4 {
                    return Err(corrupt(&format!("int32 has size {}, expected <= 4", size)));
                }
                if size == 4 {
                    let bytes: [u8; 4] = self.read_bytes(cursor, 4)?.try_into().unwrap();
                    Ok(Value::Int32(i32::from_be_bytes(bytes)))
                } else {
                    Ok(Value::Int32(self.read_unsigned(cursor, size, 4)? as i32))
                }
            }
            TYPE_UINT64 => Ok(Value::Uint64(self.read_unsigned(cursor, size, 8)? as u64)),
            TYPE_UINT128 => {
                if size > 16 {
                    return Err(corrupt(&format!(
                        "uint128 has size {}, expected <= 16",
                        size
                    )));
                }
                let mut value = 0u128;
                for &b in self.read_bytes(cursor, size)? {
                    value = (value << 8) | u128::from(b);
                }
                Ok(Value::Uint128(value))
            }
            TYPE_ARRAY => {
                let mut items = Vec::with_capacity(size.min(64));
                for _ in 0..size {
                    items.push(self.decode_at(cursor, hops, depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            TYPE_NULL => {
                if size != 0 {
                    return Err(corrupt("null marker with non-zero size"));
                }
                Ok(Value::Null)
            }
            TYPE_BOOL => match size {
                0 => Ok(Value::Bool(false)),
                1 => Ok(Value::Bool(true)),
                n => Err(corrupt(&format!("bool has size {}, expected 0 or 1", n))),
            },
            TYPE_FLOAT => {
                if size != 4 {
                    return Err(corrupt(&format!("float has size {}, expected 4", size)));
                }
                let bytes: [u8; 4] = self.read_bytes(cursor, 4)?.try_into().unwrap();
                Ok(Value::Float(f32::from_be_bytes(bytes)))
            }
            tag => Err(corrupt(&format!("unknown type tag {}", tag))),
        }
    }

    fn decode_pointer(
        &self,
        cursor: &mut usize,
        size_bits: u8,
        hops: &mut usize,
        depth: usize,
    ) -> Result<Value> {
        let width = (size_bits >> 3) & 0x3;
        let high = u32::from(size_bits & 0x7);

        let target = match width {
            0 => {
                let b = u32::from(self.read_byte(cursor)?);
                (high << 8) | b
            }
            1 => {
                let bytes = self.read_bytes(cursor, 2)?;
                0x800 + ((high << 16) | (u32::from(bytes[0]) << 8) | u32::from(bytes[1]))
            }
            2 => {
                let bytes = self.read_bytes(cursor, 3)?;
                0x80800
                    + ((high << 24)
                        | (u32::from(bytes[0]) << 16)
                        | (u32::from(bytes[1]) << 8)
                        | u32::from(bytes[2]))
            }
            _ => {
                let bytes: [u8; 4] = self.read_bytes(cursor, 4)?.try_into().unwrap();
                u32::from_be_bytes(bytes)
            }
        };

        // A well-formed section cannot chain more pointers than it has
        // bytes; past that we are looping.
        *hops += 1;
        if *hops > self.buffer.len() {
            return Err(corrupt("pointer cycle detected"));
        }

        let mut target_cursor = target as usize;
        self.decode_at(&mut target_cursor, hops, depth)
    }

    fn decode_size(&self, cursor: &mut usize, size_bits: u8) -> Result<usize> {
        match size_bits {
            0..=28 => Ok(usize::from(size_bits)),
            29 => Ok(29 + usize::from(self.read_byte(cursor)?)),
            30 => {
                let bytes: [u8; 2] = self.read_bytes(cursor, 2)?.try_into().unwrap();
                Ok(285 + usize::from(u16::from_be_bytes(bytes)))
            }
            _ => {
                let bytes = self.read_bytes(cursor, 3)?;
                let n = (usize::from(bytes[0]) << 16)
                    | (usize::from(bytes[1]) << 8)
                    | usize::from(bytes[2]);
                Ok(65_821 + n)
            }
        }
    }

    fn read_byte(&self, cursor: &mut usize) -> Result<u8> {
        let b = *self
            .buffer
            .get(*cursor)
            .ok_or_else(|| corrupt("truncated value"))?;
        *cursor += 1;
        Ok(b)
    }

    fn read_bytes(&self, cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
        let end = cursor
            .checked_add(len)
            .filter(|&end| end <= self.buffer.len())
            .ok_or_else(|| corrupt("payload extends past end of section"))?;
        let bytes = &self.buffer[*cursor..end];
        *cursor = end;
        Ok(bytes)
    }

    /// Accumulate a big-endian unsigned integer of up to `max` bytes
    fn read_unsigned(&self, cursor: &mut usize, size: usize, max: usize) -> Result<u64> {
        if size > max {
            return Err(corrupt(&format!(
                "integer has size {}, expected <= {}",
                size, max
            )));
        }
        let mut value = 0u64;
        for &b in self.read_bytes(cursor, size)? {
            value = (value << 8) | u64::from(b);
        }
        Ok(value)
    }
}

fn corrupt(msg: &str) -> IpdbError {
    IpdbError::CorruptDatabase(msg.to_string())
}
