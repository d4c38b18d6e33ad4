//! Address keys and CIDR arithmetic
//!
//! Addresses are handled as fixed-width bit strings: 32 bits in IPv4
//! mode, 128 bits in IPv6 mode. An IPv6-mode database reserves the
//! `::0.0.0.0/96` region for IPv4: the low 32 bits hold the IPv4
//! address and the high 96 bits are zero, so `192.168.1.0/24` and
//! `::192.168.1.0/120` name the same trie region.

use crate::error::{IpdbError, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Address family of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4: 32-bit keys
    V4,
    /// IPv6: 128-bit keys, IPv4 aliased into `::0.0.0.0/96`
    V6,
}

impl IpVersion {
    /// Key width in bits
    pub fn bit_len(self) -> u32 {
        match self {
            IpVersion::V4 => 32,
            IpVersion::V6 => 128,
        }
    }

    /// The number stored in metadata (4 or 6)
    pub fn as_number(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Parse the metadata number
    pub fn from_number(n: u64) -> Result<Self> {
        match n {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(IpdbError::CorruptDatabase(format!(
                "invalid ip_version {} in metadata",
                n
            ))),
        }
    }
}

/// A CIDR block: address plus prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Network {
    /// Network address
    pub addr: IpAddr,
    /// Prefix length in bits
    pub prefix_len: u32,
}

impl Network {
    /// Create a network from an address and prefix length
    pub fn new(addr: IpAddr, prefix_len: u32) -> Self {
        Self { addr, prefix_len }
    }

    pub(crate) fn v4(bits: u32, prefix_len: u32) -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::from(bits)), prefix_len)
    }

    pub(crate) fn v6(bits: u128, prefix_len: u32) -> Self {
        Self::new(IpAddr::V6(Ipv6Addr::from(bits)), prefix_len)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Normalize a subnet to the database family
///
/// Returns the key bits (low `bit_len` bits significant) and the prefix
/// length within the family's key width. Family mismatches that cannot
/// be bridged by the `::/96` alias are `InvalidAddress`.
pub(crate) fn subnet_bits(addr: IpAddr, prefix_len: u32, version: IpVersion) -> Result<(u128, u32)> {
    match (version, addr) {
        (IpVersion::V4, IpAddr::V4(a)) => {
            if prefix_len > 32 {
                return Err(invalid_prefix(addr, prefix_len, 32));
            }
            Ok((u128::from(u32::from(a)), prefix_len))
        }
        (IpVersion::V4, IpAddr::V6(a)) => {
            let bits = u128::from(a);
            if bits >> 32 != 0 {
                return Err(IpdbError::InvalidAddress(format!(
                    "{} is outside the ::/96 alias region of an IPv4 database",
                    a
                )));
            }
            if !(96..=128).contains(&prefix_len) {
                return Err(IpdbError::InvalidAddress(format!(
                    "prefix length {} of aliased {} must lie in 96..=128",
                    prefix_len, a
                )));
            }
            Ok((bits, prefix_len - 96))
        }
        (IpVersion::V6, IpAddr::V6(a)) => {
            if prefix_len > 128 {
                return Err(invalid_prefix(addr, prefix_len, 128));
            }
            Ok((u128::from(a), prefix_len))
        }
        (IpVersion::V6, IpAddr::V4(a)) => {
            if prefix_len > 32 {
                return Err(invalid_prefix(addr, prefix_len, 32));
            }
            Ok((u128::from(u32::from(a)), prefix_len + 96))
        }
    }
}

/// Normalize a single address to a full-width key
pub(crate) fn address_bits(addr: IpAddr, version: IpVersion) -> Result<u128> {
    let full = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    subnet_bits(addr, full, version).map(|(bits, _)| bits)
}

fn invalid_prefix(addr: IpAddr, prefix_len: u32, max: u32) -> IpdbError {
    IpdbError::InvalidAddress(format!(
        "prefix length {} of {} exceeds {}",
        prefix_len, addr, max
    ))
}

/// Bit `index` of a key, counting from the most significant bit of the
/// family width (index 0) downwards.
pub(crate) fn bit_at(bits: u128, bit_len: u32, index: u32) -> u8 {
    ((bits >> (bit_len - 1 - index)) & 1) as u8
}

/// Decompose an inclusive address range into the minimal list of
/// aligned CIDR blocks, low to high
///
/// Each step takes the largest power-of-two block that is aligned at
/// the cursor and does not overrun the range end.
pub(crate) fn range_blocks(start: u128, end: u128, bit_len: u32) -> Vec<(u128, u32)> {
    debug_assert!(start <= end);
    let mut blocks = Vec::new();
    let mut cursor = start;
    loop {
        let align = if cursor == 0 {
            bit_len
        } else {
            cursor.trailing_zeros().min(bit_len)
        };
        let span = end - cursor;
        let fit = if span == u128::MAX {
            128
        } else {
            127 - (span + 1).leading_zeros()
        };
        let k = align.min(fit);
        blocks.push((cursor, bit_len - k));

        let block_span = if k == 128 { u128::MAX } else { (1u128 << k) - 1 };
        if span == block_span {
            return blocks;
        }
        cursor += block_span + 1;
    }
}
