//! Lazy whole-database enumeration
//!
//! A scan walks the serialized trie depth-first, left before right, and
//! yields one `(Network, Value)` pair per data record in address order.
//! The iterator holds only its walk stack; dropping it mid-walk has no
//! side effects, and a fresh scan can be started at any time.

use super::Reader;
use crate::data_section::Value;
use crate::error::Result;
use crate::net::Network;

/// One yielded entry: a CIDR block and its decoded value
pub type ScanItem = Result<(Network, Value)>;

/// How walked prefixes are rendered as networks
#[derive(Debug, Clone, Copy)]
enum ScanMode {
    /// IPv4 database enumerated as IPv4
    V4,
    /// IPv6 database enumerated as IPv6
    V6,
    /// IPv4 view of an IPv6 database: only the `::/96` subtree
    V4Aliased,
    /// IPv6 view of an IPv4 database: subnets re-rendered at `::/96`
    V6Aliased,
}

/// A pending walk position: `side` of `node`, whose subtree root sits
/// at `depth` with accumulated prefix `bits`
struct Frame {
    node: u32,
    side: u8,
    bits: u128,
    depth: u32,
}

/// Lazy trie enumeration, created by [`Reader::scan4`] and
/// [`Reader::scan6`]
///
/// Yields entries in ascending address order. A structural error ends
/// the iteration after being yielded once.
pub struct Scan<'a> {
    reader: &'a Reader<'a>,
    stack: Vec<Frame>,
    mode: ScanMode,
    pending: Option<ScanItem>,
    done: bool,
}

impl<'a> Scan<'a> {
    pub(super) fn v4(reader: &'a Reader<'a>) -> Self {
        Self::rooted(reader, ScanMode::V4)
    }

    pub(super) fn v6(reader: &'a Reader<'a>) -> Self {
        Self::rooted(reader, ScanMode::V6)
    }

    pub(super) fn v6_aliased(reader: &'a Reader<'a>) -> Self {
        Self::rooted(reader, ScanMode::V6Aliased)
    }

    fn rooted(reader: &'a Reader<'a>, mode: ScanMode) -> Self {
        Self {
            reader,
            stack: vec![
                Frame { node: 0, side: 1, bits: 0, depth: 0 },
                Frame { node: 0, side: 0, bits: 0, depth: 0 },
            ],
            mode,
            pending: None,
            done: false,
        }
    }

    /// IPv4 view of an IPv6 database: descend the 96 zero bits of the
    /// alias region first, then walk the remaining 32 levels.
    pub(super) fn v4_aliased(reader: &'a Reader<'a>) -> Self {
        let mut scan = Self {
            reader,
            stack: Vec::new(),
            mode: ScanMode::V4Aliased,
            pending: None,
            done: false,
        };

        let mut node = 0u32;
        for _ in 0..96 {
            match reader.read_record(node, 0) {
                Ok(record) => {
                    if record == reader.metadata().node_count {
                        // Nothing registered in the alias region
                        return scan;
                    } else if record < reader.metadata().node_count {
                        node = record;
                    } else {
                        // A broader entry covers all of the IPv4 space
                        scan.pending = Some(
                            reader
                                .decode_data(record)
                                .map(|value| (Network::v4(0, 0), value)),
                        );
                        return scan;
                    }
                }
                Err(e) => {
                    scan.pending = Some(Err(e));
                    return scan;
                }
            }
        }

        scan.stack = vec![
            Frame { node, side: 1, bits: 0, depth: 96 },
            Frame { node, side: 0, bits: 0, depth: 96 },
        ];
        scan
    }

    fn step(&mut self, frame: Frame) -> Result<Option<(Network, Value)>> {
        let node_count = self.reader.metadata().node_count;
        let bit_len = self.reader.metadata().ip_version.bit_len();

        let record = self.reader.read_record(frame.node, frame.side)?;
        let bits = frame.bits | (u128::from(frame.side) << (bit_len - 1 - frame.depth));
        let prefix_len = frame.depth + 1;

        if record == node_count {
            return Ok(None);
        }
        if record < node_count {
            // A node at the maximum depth has no address bits left to
            // describe; treat its subtree as empty, as lookups do
            if prefix_len < bit_len {
                self.stack.push(Frame {
                    node: record,
                    side: 1,
                    bits,
                    depth: prefix_len,
                });
                self.stack.push(Frame {
                    node: record,
                    side: 0,
                    bits,
                    depth: prefix_len,
                });
            }
            return Ok(None);
        }

        let value = self.reader.decode_data(record)?;
        let network = match self.mode {
            ScanMode::V4 => Network::v4(bits as u32, prefix_len),
            ScanMode::V6 => Network::v6(bits, prefix_len),
            ScanMode::V4Aliased => Network::v4(bits as u32, prefix_len - 96),
            ScanMode::V6Aliased => Network::v6(bits, prefix_len + 96),
        };
        Ok(Some((network, value)))
    }
}

impl Iterator for Scan<'_> {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        if self.done {
            return None;
        }
        if let Some(item) = self.pending.take() {
            if item.is_err() {
                self.done = true;
            }
            return Some(item);
        }
        while let Some(frame) = self.stack.pop() {
            match self.step(frame) {
                Ok(None) => continue,
                Ok(Some(pair)) => return Some(Ok(pair)),
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        self.done = true;
        None
    }
}

impl std::iter::FusedIterator for Scan<'_> {}
