//! Metadata section location and parsing
//!
//! The metadata map sits at the end of the buffer, preceded by a fixed
//! binary marker. The marker is searched for within the trailing 128 KiB
//! window; when it occurs more than once the last occurrence wins.

use crate::data_section::{DataDecoder, Value};
use crate::error::{IpdbError, Result};
use crate::net::IpVersion;
use crate::tree_builder::RecordSize;
use memchr::memmem;
use std::collections::HashMap;

/// Metadata marker: `\xAB\xCD\xEF` followed by "MaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

const METADATA_WINDOW: usize = 128 * 1024;

/// Find the metadata section: returns `(marker_start, metadata_start)`
pub(crate) fn find_metadata(data: &[u8]) -> Result<(usize, usize)> {
    let window_start = data.len().saturating_sub(METADATA_WINDOW);
    let marker = memmem::rfind(&data[window_start..], METADATA_MARKER)
        .map(|pos| window_start + pos)
        .ok_or_else(|| {
            IpdbError::CorruptDatabase("metadata marker not found".to_string())
        })?;
    Ok((marker, marker + METADATA_MARKER.len()))
}

/// Decoded database metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    /// Number of nodes in the trie section
    pub node_count: u32,
    /// Record width the trie is packed at
    pub record_size: RecordSize,
    /// Address family of the trie
    pub ip_version: IpVersion,
    /// Binary format major version
    pub binary_format_major_version: u16,
    /// Binary format minor version
    pub binary_format_minor_version: u16,
    /// Unix timestamp of the build
    pub build_epoch: u64,
    /// Database type string
    pub database_type: String,
    /// Languages the description covers
    pub languages: Vec<String>,
    /// Description per language
    pub description: HashMap<String, String>,
}

impl Metadata {
    /// Decode the metadata map found at the start of `section`
    pub(crate) fn parse(section: &[u8]) -> Result<Self> {
        let map = match DataDecoder::new(section).decode(0)? {
            Value::Map(map) => map,
            other => {
                return Err(IpdbError::CorruptDatabase(format!(
                    "metadata is not a map, found {:?}",
                    other
                )))
            }
        };

        let node_count = require_uint(&map, "node_count")?;
        if node_count == 0 || node_count > u64::from(u32::MAX) {
            return Err(IpdbError::CorruptDatabase(format!(
                "implausible node_count {}",
                node_count
            )));
        }
        let record_size = RecordSize::from_bits(require_uint(&map, "record_size")?)?;
        let ip_version = IpVersion::from_number(require_uint(&map, "ip_version")?)?;

        Ok(Metadata {
            node_count: node_count as u32,
            record_size,
            ip_version,
            binary_format_major_version: optional_uint(&map, "binary_format_major_version") as u16,
            binary_format_minor_version: optional_uint(&map, "binary_format_minor_version") as u16,
            build_epoch: optional_uint(&map, "build_epoch"),
            database_type: match map.get("database_type") {
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            },
            languages: match map.get("languages") {
                Some(Value::Array(items)) => items
                    .iter()
                    .filter_map(|v| match v {
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            },
            description: match map.get("description") {
                Some(Value::Map(m)) => m
                    .iter()
                    .filter_map(|(k, v)| match v {
                        Value::String(s) => Some((k.clone(), s.clone())),
                        _ => None,
                    })
                    .collect(),
                _ => HashMap::new(),
            },
        })
    }
}

fn uint_of(value: &Value) -> Option<u64> {
    match value {
        Value::Uint16(n) => Some(u64::from(*n)),
        Value::Uint32(n) => Some(u64::from(*n)),
        Value::Uint64(n) => Some(*n),
        _ => None,
    }
}

fn require_uint(map: &HashMap<String, Value>, key: &str) -> Result<u64> {
    map.get(key).and_then(uint_of).ok_or_else(|| {
        IpdbError::CorruptDatabase(format!(
            "metadata field '{}' is missing or not an unsigned integer",
            key
        ))
    })
}

fn optional_uint(map: &HashMap<String, Value>, key: &str) -> u64 {
    map.get(key).and_then(uint_of).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_not_found() {
        let err = find_metadata(b"not a database").unwrap_err();
        assert!(matches!(err, IpdbError::CorruptDatabase(_)));
    }

    #[test]
    fn last_marker_wins() {
        let mut data = Vec::new();
        data.extend_from_slice(METADATA_MARKER);
        data.extend_from_slice(b"padding");
        data.extend_from_slice(METADATA_MARKER);
        data.extend_from_slice(b"tail");

        let (marker, start) = find_metadata(&data).unwrap();
        assert_eq!(marker, METADATA_MARKER.len() + 7);
        assert_eq!(start, marker + METADATA_MARKER.len());
    }

    #[test]
    fn parse_rejects_non_map() {
        let mut encoder = crate::data_section::DataEncoder::new();
        encoder.encode(&Value::Uint32(42));
        let err = Metadata::parse(encoder.bytes()).unwrap_err();
        assert!(matches!(err, IpdbError::CorruptDatabase(_)));
    }

    #[test]
    fn parse_requires_core_fields() {
        let mut encoder = crate::data_section::DataEncoder::new();
        encoder.encode(&Value::map([(
            "record_size",
            Value::Uint16(24),
        )]));
        let err = Metadata::parse(encoder.bytes()).unwrap_err();
        assert!(matches!(err, IpdbError::CorruptDatabase(_)));
    }
}
