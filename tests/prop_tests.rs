// Randomized properties for the value codec and the trie precedence
// rule, checked against a flat model of a /24.

use ipdb::{Generator, IpVersion, Reader, RecordSize, Value};
use proptest::prelude::*;
use serde_json::json;
use std::net::{IpAddr, Ipv4Addr};

fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<u16>().prop_map(Value::Uint16),
        any::<u32>().prop_map(Value::Uint32),
        any::<u64>().prop_map(Value::Uint64),
        any::<u128>().prop_map(Value::Uint128),
        any::<i32>().prop_map(Value::Int32),
        any::<i64>().prop_map(|n| Value::Double(n as f64 / 32.0)),
        any::<i32>().prop_map(|n| Value::Float(n as f32 / 16.0)),
        prop::collection::vec(any::<u8>(), 0..24).prop_map(Value::Bytes),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 48, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::hash_map("[a-z]{1,8}", inner, 0..6).prop_map(Value::Map),
        ]
    })
}

/// An insertion confined to 10.0.0.0/24 so the model stays enumerable
#[derive(Debug, Clone)]
enum Op {
    Subnet { base: u8, prefix: u32 },
    One { host: u8 },
    Range { low: u8, high: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (any::<u8>(), 24u32..=32).prop_map(|(base, prefix)| Op::Subnet { base, prefix }),
        any::<u8>().prop_map(|host| Op::One { host }),
        (any::<u8>(), any::<u8>()).prop_map(|(a, b)| Op::Range {
            low: a.min(b),
            high: a.max(b),
        }),
    ]
}

fn host(i: u8) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, 0, 0, i))
}

proptest! {
    #[test]
    fn codec_roundtrip(v in value_strategy()) {
        let mut encoder = ipdb::data_section::DataEncoder::new();
        let offset = encoder.encode(&v);
        let bytes = encoder.into_bytes();
        let decoded = ipdb::data_section::DataDecoder::new(&bytes).decode(offset).unwrap();
        prop_assert_eq!(decoded, v);
    }

    #[test]
    fn second_encoding_is_one_pointer(v in value_strategy()) {
        let mut encoder = ipdb::data_section::DataEncoder::new();
        let first = encoder.encode(&v);
        let after_first = encoder.len();
        let second = encoder.encode(&v);

        // The duplicate costs one pointer record, at most five bytes
        prop_assert!(encoder.len() - after_first <= 5);
        let bytes = encoder.into_bytes();
        let decoder = ipdb::data_section::DataDecoder::new(&bytes);
        prop_assert_eq!(decoder.decode(first).unwrap(), v.clone());
        prop_assert_eq!(decoder.decode(second).unwrap(), v);
    }

    #[test]
    fn lookups_match_flat_model(ops in prop::collection::vec(op_strategy(), 1..32)) {
        let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits28)
            .with_database_type("prop")
            .with_build_epoch(0);
        let mut model: [Option<usize>; 256] = [None; 256];

        for (id, op) in ops.iter().enumerate() {
            let data = Value::from(json!({ "id": id }));
            match *op {
                Op::Subnet { base, prefix } => {
                    generator.insert_subnet(host(base), prefix, &data).unwrap();
                    let size = 1usize << (32 - prefix);
                    let start = usize::from(base) & !(size - 1);
                    for slot in &mut model[start..start + size] {
                        *slot = Some(id);
                    }
                }
                Op::One { host: h } => {
                    generator.insert_one(host(h), &data).unwrap();
                    model[usize::from(h)] = Some(id);
                }
                Op::Range { low, high } => {
                    generator.insert_range(host(low), host(high), &data).unwrap();
                    for slot in &mut model[usize::from(low)..=usize::from(high)] {
                        *slot = Some(id);
                    }
                }
            }
        }

        let buffer = generator.generate().unwrap();
        let reader = Reader::open(&buffer).unwrap();
        for i in 0..=255u8 {
            let expected = model[usize::from(i)].map(|id| Value::from(json!({ "id": id })));
            prop_assert_eq!(reader.get(host(i)).unwrap(), expected, "address 10.0.0.{}", i);
        }
        // Neighbouring space is untouched
        prop_assert_eq!(reader.get("10.0.1.0".parse().unwrap()).unwrap(), None);
        prop_assert_eq!(reader.get("9.255.255.255".parse().unwrap()).unwrap(), None);
    }
}
