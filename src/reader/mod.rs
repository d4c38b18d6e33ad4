//! Database reader
//!
//! Parses a generated buffer and answers point lookups and full
//! enumerations. The reader is a pure view over the borrowed buffer:
//! construction decodes only the metadata map, and every query walks
//! the trie section directly. Nothing is mutated after `open`, so a
//! reader may be shared freely across threads.
//!
//! ## Architecture
//!
//! - **metadata**: marker search and metadata parsing
//! - **scan**: lazy whole-database enumeration

pub mod metadata;
pub mod scan;

use crate::data_section::{DataDecoder, Value};
use crate::error::{IpdbError, Result};
use crate::generator::DATA_SECTION_SEPARATOR;
use crate::net::{self, IpVersion};
use crate::tree_builder::RecordSize;
use metadata::Metadata;
use scan::Scan;
use std::net::IpAddr;

/// Read-only view over a database buffer
///
/// # Example
///
/// ```
/// use ipdb::{Generator, IpVersion, Reader, RecordSize, Value};
///
/// let mut generator = Generator::new(IpVersion::V6, RecordSize::Bits28);
/// let value = Value::map([("country", Value::String("NL".into()))]);
/// generator.insert_subnet("2001:db8::".parse().unwrap(), 32, &value)?;
///
/// let buffer = generator.generate()?;
/// let reader = Reader::open(&buffer)?;
/// assert_eq!(reader.get("2001:db8::42".parse().unwrap())?, Some(value));
/// assert_eq!(reader.get("2001:db9::42".parse().unwrap())?, None);
/// # Ok::<(), ipdb::IpdbError>(())
/// ```
#[derive(Debug)]
pub struct Reader<'a> {
    metadata: Metadata,
    tree: &'a [u8],
    data_section: &'a [u8],
}

impl<'a> Reader<'a> {
    /// Parse a database buffer
    ///
    /// Locates and decodes the metadata map and validates that the trie
    /// section it declares fits the buffer. Any structural problem is
    /// `CorruptDatabase`.
    pub fn open(data: &'a [u8]) -> Result<Self> {
        let (marker, metadata_start) = metadata::find_metadata(data)?;
        let metadata = Metadata::parse(&data[metadata_start..])?;

        let tree_size = metadata.node_count as usize * metadata.record_size.node_bytes();
        let data_start = tree_size + DATA_SECTION_SEPARATOR.len();
        if data_start > marker {
            return Err(IpdbError::CorruptDatabase(format!(
                "trie section of {} nodes extends past the metadata marker",
                metadata.node_count
            )));
        }

        Ok(Self {
            metadata,
            tree: &data[..tree_size],
            data_section: &data[data_start..marker],
        })
    }

    /// Database metadata
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up the value registered for an address
    ///
    /// Returns `Ok(None)` when nothing is registered; IPv4 queries
    /// against an IPv6 database are answered through the `::/96` alias
    /// region. A family mismatch the alias cannot bridge is
    /// `InvalidAddress`; structural problems are `CorruptDatabase`.
    pub fn get(&self, addr: IpAddr) -> Result<Option<Value>> {
        let bits = net::address_bits(addr, self.metadata.ip_version)?;
        let bit_len = self.metadata.ip_version.bit_len();

        let mut node = 0u32;
        for index in 0..bit_len {
            let record = self.read_record(node, net::bit_at(bits, bit_len, index))?;
            if record == self.metadata.node_count {
                return Ok(None);
            }
            if record < self.metadata.node_count {
                node = record;
            } else {
                return self.decode_data(record).map(Some);
            }
        }
        // Bits exhausted on an inner node: an empty subtree, not an error
        Ok(None)
    }

    /// Enumerate the database as IPv4 networks
    ///
    /// On an IPv6 database only the `::/96` alias region is walked and
    /// addresses are rendered in IPv4 form.
    pub fn scan4(&self) -> Scan<'_> {
        match self.metadata.ip_version {
            IpVersion::V4 => Scan::v4(self),
            IpVersion::V6 => Scan::v4_aliased(self),
        }
    }

    /// Enumerate the database as IPv6 networks
    ///
    /// On an IPv4 database subnets are rendered in their `::/96`-aliased
    /// IPv6 form.
    pub fn scan6(&self) -> Scan<'_> {
        match self.metadata.ip_version {
            IpVersion::V4 => Scan::v6_aliased(self),
            IpVersion::V6 => Scan::v6(self),
        }
    }

    /// Read one record of a trie node
    pub(crate) fn read_record(&self, node: u32, side: u8) -> Result<u32> {
        if node >= self.metadata.node_count {
            return Err(IpdbError::CorruptDatabase(format!(
                "node index {} exceeds node count {}",
                node, self.metadata.node_count
            )));
        }
        let node = node as usize;
        let side = usize::from(side);

        match self.metadata.record_size {
            RecordSize::Bits24 => {
                let bytes = self.node_bytes(node, 6)?;
                let r = &bytes[side * 3..side * 3 + 3];
                Ok((u32::from(r[0]) << 16) | (u32::from(r[1]) << 8) | u32::from(r[2]))
            }
            RecordSize::Bits28 => {
                let bytes = self.node_bytes(node, 7)?;
                let high = if side == 0 {
                    u32::from(bytes[3] >> 4)
                } else {
                    u32::from(bytes[3] & 0x0F)
                };
                let r = &bytes[side * 4..side * 4 + 3];
                Ok((high << 24) | (u32::from(r[0]) << 16) | (u32::from(r[1]) << 8) | u32::from(r[2]))
            }
            RecordSize::Bits32 => {
                let bytes = self.node_bytes(node, 8)?;
                let r: [u8; 4] = bytes[side * 4..side * 4 + 4].try_into().unwrap();
                Ok(u32::from_be_bytes(r))
            }
        }
    }

    fn node_bytes(&self, node: usize, node_size: usize) -> Result<&'a [u8]> {
        let start = node * node_size;
        self.tree.get(start..start + node_size).ok_or_else(|| {
            IpdbError::CorruptDatabase(format!(
                "node {} lies outside the trie section",
                node
            ))
        })
    }

    /// Decode the value a data record points at
    pub(crate) fn decode_data(&self, record: u32) -> Result<Value> {
        let offset = record
            .checked_sub(self.metadata.node_count)
            .and_then(|v| v.checked_sub(16))
            .ok_or_else(|| {
                IpdbError::CorruptDatabase(format!(
                    "record value {} lies in the sentinel range",
                    record
                ))
            })?;
        if offset as usize >= self.data_section.len() {
            return Err(IpdbError::CorruptDatabase(format!(
                "data offset {} exceeds data section length {}",
                offset,
                self.data_section.len()
            )));
        }
        DataDecoder::new(self.data_section).decode(offset)
    }
}
