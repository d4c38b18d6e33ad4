use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ipdb::{Generator, IpVersion, Reader, RecordSize, Value};
use std::hint::black_box;
use std::net::{IpAddr, Ipv4Addr};

fn entry_addr(i: usize) -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(10, (i / 65536) as u8, (i / 256) as u8, (i % 256) as u8))
}

// Benchmark: building databases with varying levels of data duplication
fn bench_build_with_deduplication(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for entry_count in [100usize, 1000, 5000].iter() {
        // High duplication: 10 unique payloads shared across all entries,
        // the realistic shape for geolocation and categorization data
        let shared_payloads: Vec<Value> = (0..10)
            .map(|i| {
                Value::from(serde_json::json!({
                    "category": format!("category_{}", i),
                    "risk": i * 10,
                    "description": format!("This is a longer description for category {}", i),
                    "active": i % 2 == 0,
                }))
            })
            .collect();

        group.throughput(Throughput::Elements(*entry_count as u64));
        group.bench_with_input(
            BenchmarkId::new("high_dedup", entry_count),
            entry_count,
            |b, &count| {
                b.iter(|| {
                    let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
                    for i in 0..count {
                        let data = &shared_payloads[i % 10];
                        generator
                            .insert_one(black_box(entry_addr(i)), black_box(data))
                            .unwrap();
                    }
                    black_box(generator.generate().unwrap());
                });
            },
        );

        // No duplication: every entry carries a unique payload
        group.bench_with_input(
            BenchmarkId::new("no_dedup", entry_count),
            entry_count,
            |b, &count| {
                b.iter(|| {
                    let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
                    for i in 0..count {
                        let data = Value::from(serde_json::json!({
                            "id": i,
                            "unique": format!("unique_value_{}", i),
                        }));
                        generator
                            .insert_one(black_box(entry_addr(i)), black_box(&data))
                            .unwrap();
                    }
                    black_box(generator.generate().unwrap());
                });
            },
        );
    }

    group.finish();
}

// Benchmark: point lookups against a populated database
fn bench_lookup(c: &mut Criterion) {
    let mut generator = Generator::new(IpVersion::V4, RecordSize::Bits24);
    for i in 0..10_000usize {
        let data = Value::from(serde_json::json!({ "id": i % 64 }));
        generator.insert_one(entry_addr(i), &data).unwrap();
    }
    let buffer = generator.generate().unwrap();
    let reader = Reader::open(&buffer).unwrap();

    c.bench_function("lookup_hit", |b| {
        b.iter(|| black_box(reader.get(black_box(entry_addr(4242))).unwrap()))
    });
    c.bench_function("lookup_miss", |b| {
        let miss: IpAddr = "203.0.113.7".parse().unwrap();
        b.iter(|| black_box(reader.get(black_box(miss)).unwrap()))
    });
}

criterion_group!(benches, bench_build_with_deduplication, bench_lookup);
criterion_main!(benches);
