//! ipdb - IP-Indexed Binary Lookup Databases
//!
//! ipdb builds and reads compact binary databases that map IPv4/IPv6
//! address ranges to structured data records, in the MaxMind DB format
//! used by GeoIP and similar IP-metadata databases: a binary radix trie
//! over address bits whose leaves point into a deduplicated,
//! self-describing data section.
//!
//! # Quick Start
//!
//! ```rust
//! use ipdb::{Generator, IpVersion, Reader, RecordSize, Value};
//!
//! // Build a database
//! let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24)
//!     .with_database_type("My-IP-Data")
//!     .with_languages(["en"])
//!     .with_description("en", "My database");
//!
//! let earth = Value::from(serde_json::json!({ "planet": "Earth" }));
//! let china = Value::from(serde_json::json!({ "planet": "Earth", "country": "China" }));
//! generator.insert_subnet("192.168.1.0".parse().unwrap(), 24, &earth)?;
//! generator.insert_subnet("192.168.1.128".parse().unwrap(), 25, &china)?;
//!
//! let buffer = generator.generate()?;
//!
//! // Query it
//! let reader = Reader::open(&buffer)?;
//! assert_eq!(reader.get("192.168.1.50".parse().unwrap())?, Some(earth));
//! assert_eq!(reader.get("192.168.1.200".parse().unwrap())?, Some(china));
//! assert_eq!(reader.get("10.0.0.1".parse().unwrap())?, None);
//!
//! // Enumerate every stored network
//! for entry in reader.scan4() {
//!     let (network, value) = entry?;
//!     println!("{} => {:?}", network, value);
//! }
//! # Ok::<(), ipdb::IpdbError>(())
//! ```
//!
//! # Key Features
//!
//! - **Rich Data**: JSON-like structured values with each entry
//! - **Deduplication**: equal payloads are stored once per database
//! - **Range Inserts**: arbitrary inclusive ranges decompose into the
//!   minimal covering CIDR blocks
//! - **IPv4-in-IPv6**: one IPv6 database answers both families through
//!   the `::0.0.0.0/96` alias region
//! - **Deterministic Output**: the same insertions always produce
//!   byte-identical buffers
//! - **Shareable Readers**: lookups never mutate, so one reader serves
//!   any number of threads
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Database Buffer                     │
//! ├──────────────────────────────────────┤
//! │  1. Trie records (24/28/32 bit)      │
//! │  2. Data section (deduplicated)      │
//! │  3. Metadata (marker + map)          │
//! └──────────────────────────────────────┘
//! ```
//!
//! Insertions flow one way into the trie and data section; `generate()`
//! freezes a snapshot. Queries flow one way from the buffer: a trie walk
//! per address bit, then one decode of the pointed-to value.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Module declarations
/// Data section encoding/decoding
pub mod data_section;
/// Error types for database operations
pub mod error;
/// Database generator
pub mod generator;
/// Address keys and CIDR arithmetic
pub mod net;
/// Database reader
pub mod reader;
mod tree_builder;

// Re-exports for the common path

/// Database builder accepting subnet, address and range insertions
pub use crate::generator::Generator;

/// Read-only database view with point lookups and enumeration
pub use crate::reader::Reader;

/// Structured value stored with each network
pub use crate::data_section::Value;

pub use crate::error::{IpdbError, Result};
pub use crate::net::{IpVersion, Network};
pub use crate::reader::metadata::{Metadata, METADATA_MARKER};
pub use crate::reader::scan::{Scan, ScanItem};
pub use crate::tree_builder::RecordSize;

// Version information
/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
