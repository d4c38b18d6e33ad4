//! Database generator
//!
//! Accepts subnet, single-address and range insertions with structured
//! payloads and freezes them into one contiguous buffer: bit-packed
//! trie records, the 16-byte section separator, the deduplicated data
//! section, and the metadata marker followed by the metadata map.
//!
//! The generator stays insertable after [`Generator::generate`]; calling
//! it again returns an updated snapshot. Output is deterministic: the
//! same insertion sequence always produces byte-identical buffers.

use crate::data_section::{DataEncoder, Value};
use crate::error::{IpdbError, Result};
use crate::net::{self, IpVersion};
use crate::reader::metadata::METADATA_MARKER;
use crate::tree_builder::{RecordSize, TreeBuilder};
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Zero bytes between the trie section and the data section
pub(crate) const DATA_SECTION_SEPARATOR: [u8; 16] = [0u8; 16];

/// Builder for IP-indexed lookup databases
///
/// # Example
///
/// ```
/// use ipdb::{Generator, IpVersion, Reader, RecordSize, Value};
///
/// let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24)
///     .with_database_type("My-IP-Data")
///     .with_description("en", "example database");
///
/// let value = Value::from(serde_json::json!({ "planet": "Earth" }));
/// generator.insert_subnet("192.168.1.0".parse().unwrap(), 24, &value)?;
///
/// let buffer = generator.generate()?;
/// let reader = Reader::open(&buffer)?;
/// assert_eq!(reader.get("192.168.1.50".parse().unwrap())?, Some(value));
/// # Ok::<(), ipdb::IpdbError>(())
/// ```
pub struct Generator {
    ip_version: IpVersion,
    record_size: RecordSize,
    major_version: u16,
    minor_version: u16,
    database_type: String,
    languages: Vec<String>,
    description: HashMap<String, String>,
    build_epoch: u64,
    tree: TreeBuilder,
    data: DataEncoder,
}

impl Generator {
    /// Create a generator for the given address family and record width
    pub fn new(ip_version: IpVersion, record_size: RecordSize) -> Self {
        let build_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            ip_version,
            record_size,
            major_version: 2,
            minor_version: 0,
            database_type: String::new(),
            languages: Vec::new(),
            description: HashMap::new(),
            build_epoch,
            tree: TreeBuilder::new(ip_version.bit_len()),
            data: DataEncoder::new(),
        }
    }

    /// Set the database type string recorded in metadata
    pub fn with_database_type(mut self, db_type: impl Into<String>) -> Self {
        self.database_type = db_type.into();
        self
    }

    /// Set the languages list recorded in metadata
    pub fn with_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    /// Add a description in a specific language
    ///
    /// May be called multiple times for different languages.
    pub fn with_description(
        mut self,
        language: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        self.description.insert(language.into(), text.into());
        self
    }

    /// Set the binary format version recorded in metadata
    pub fn with_format_version(mut self, major: u16, minor: u16) -> Self {
        self.major_version = major;
        self.minor_version = minor;
        self
    }

    /// Override the build timestamp recorded in metadata
    ///
    /// The epoch is captured once at construction; fix it explicitly for
    /// reproducible builds across generator instances.
    pub fn with_build_epoch(mut self, epoch: u64) -> Self {
        self.build_epoch = epoch;
        self
    }

    /// Address family of this generator
    pub fn ip_version(&self) -> IpVersion {
        self.ip_version
    }

    /// Record width of this generator
    pub fn record_size(&self) -> RecordSize {
        self.record_size
    }

    /// Register `value` under a subnet
    ///
    /// The subnet replaces whatever was previously registered for its
    /// exact region; addresses outside it keep earlier values. IPv4
    /// subnets given to an IPv6 generator land in the `::/96` alias
    /// region.
    pub fn insert_subnet(&mut self, addr: IpAddr, prefix_len: u32, value: &Value) -> Result<()> {
        let (bits, prefix_len) = net::subnet_bits(addr, prefix_len, self.ip_version)?;
        let offset = self.data.encode(value);
        self.tree.insert(bits, prefix_len, offset);
        Ok(())
    }

    /// Register `value` under a single address
    pub fn insert_one(&mut self, addr: IpAddr, value: &Value) -> Result<()> {
        let prefix_len = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        self.insert_subnet(addr, prefix_len, value)
    }

    /// Register `value` for every address in the inclusive range
    ///
    /// The range is decomposed into aligned CIDR blocks which are
    /// inserted low to high, each as an independent subnet insertion.
    pub fn insert_range(&mut self, start: IpAddr, end: IpAddr, value: &Value) -> Result<()> {
        let start_bits = net::address_bits(start, self.ip_version)?;
        let end_bits = net::address_bits(end, self.ip_version)?;
        if end_bits < start_bits {
            return Err(IpdbError::InvalidRange(format!(
                "range end {} precedes start {}",
                end, start
            )));
        }

        let offset = self.data.encode(value);
        for (bits, prefix_len) in net::range_blocks(start_bits, end_bits, self.ip_version.bit_len())
        {
            self.tree.insert(bits, prefix_len, offset);
        }
        Ok(())
    }

    /// Serialize the current state into a database buffer
    pub fn generate(&self) -> Result<Vec<u8>> {
        let tree = self.tree.serialize(self.record_size)?;

        let mut buffer = tree;
        buffer.extend_from_slice(&DATA_SECTION_SEPARATOR);
        buffer.extend_from_slice(self.data.bytes());
        buffer.extend_from_slice(METADATA_MARKER);

        let mut metadata = DataEncoder::new();
        metadata.encode(&self.metadata_map());
        buffer.extend_from_slice(metadata.bytes());

        Ok(buffer)
    }

    fn metadata_map(&self) -> Value {
        Value::map([
            (
                "binary_format_major_version",
                Value::Uint16(self.major_version),
            ),
            (
                "binary_format_minor_version",
                Value::Uint16(self.minor_version),
            ),
            ("build_epoch", Value::Uint64(self.build_epoch)),
            (
                "database_type",
                Value::String(self.database_type.clone()),
            ),
            (
                "description",
                Value::Map(
                    self.description
                        .iter()
                        .map(|(lang, text)| (lang.clone(), Value::String(text.clone())))
                        .collect(),
                ),
            ),
            ("ip_version", Value::Uint16(self.ip_version.as_number())),
            (
                "languages",
                Value::Array(
                    self.languages
                        .iter()
                        .map(|l| Value::String(l.clone()))
                        .collect(),
                ),
            ),
            ("node_count", Value::Uint32(self.tree.node_count())),
            ("record_size", Value::Uint16(self.record_size.bits())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str) -> Value {
        Value::map([("name", Value::String(text.to_string()))])
    }

    #[test]
    fn generate_is_deterministic() {
        let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24)
            .with_database_type("Test")
            .with_languages(["en"])
            .with_description("en", "determinism test");
        generator
            .insert_subnet("10.0.0.0".parse().unwrap(), 8, &value("ten"))
            .unwrap();
        generator
            .insert_one("192.168.1.1".parse().unwrap(), &value("host"))
            .unwrap();

        assert_eq!(generator.generate().unwrap(), generator.generate().unwrap());
    }

    #[test]
    fn generator_stays_insertable_after_generate() {
        let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
        generator
            .insert_one("10.0.0.1".parse().unwrap(), &value("a"))
            .unwrap();
        let first = generator.generate().unwrap();
        generator
            .insert_one("10.0.0.2".parse().unwrap(), &value("b"))
            .unwrap();
        let second = generator.generate().unwrap();
        assert!(second.len() > first.len());
    }

    #[test]
    fn buffer_ends_with_metadata() {
        let generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
        let buffer = generator.generate().unwrap();
        let marker_at = buffer
            .windows(METADATA_MARKER.len())
            .position(|w| w == METADATA_MARKER)
            .expect("marker must be present");
        // Empty tree: one node, 6 bytes, then the 16-byte separator
        assert_eq!(marker_at, 6 + 16);
    }

    #[test]
    fn range_end_before_start_is_rejected() {
        let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
        let err = generator
            .insert_range(
                "10.0.0.5".parse().unwrap(),
                "10.0.0.1".parse().unwrap(),
                &value("x"),
            )
            .unwrap_err();
        assert!(matches!(err, IpdbError::InvalidRange(_)));
    }

    #[test]
    fn family_mismatch_is_rejected() {
        let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
        let err = generator
            .insert_one("2001:db8::1".parse().unwrap(), &value("x"))
            .unwrap_err();
        assert!(matches!(err, IpdbError::InvalidAddress(_)));

        let err = generator
            .insert_range(
                "10.0.0.1".parse().unwrap(),
                "2001:db8::1".parse().unwrap(),
                &value("x"),
            )
            .unwrap_err();
        assert!(matches!(err, IpdbError::InvalidAddress(_)));
    }
}
