//! Criterion benchmarks for the info-string codec.
//!
//! `decode` runs once per inbound `infoResponse` and `encode` once per
//! answered `getInfo`, so both sit on the network receive path.
//!
//! Run with:
//! ```bash
//! cargo bench --package party-core --bench info_string_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use party_core::protocol::{keys, new_challenge};
use party_core::InfoString;

// ── Record fixtures ───────────────────────────────────────────────────────────

fn make_info_response() -> InfoString {
    let mut info = InfoString::new();
    info.set(keys::CHALLENGE, new_challenge()).unwrap();
    info.set(keys::GAME_NAME, "T7").unwrap();
    info.set(keys::HOST_NAME, "benchmark host").unwrap();
    info.set(keys::GAME_TYPE, "tdm").unwrap();
    info.set(keys::XUID, "110000100000001").unwrap();
    info.set(keys::MAP_NAME, "mp_biodome").unwrap();
    info.set(keys::PROTOCOL, "1").unwrap();
    info.set(keys::PLAY_MODE, "1").unwrap();
    info.set(keys::SHORT_VERSION, "0.1.0").unwrap();
    info
}

fn make_wide_record(pairs: usize) -> InfoString {
    let mut info = InfoString::new();
    for i in 0..pairs {
        info.set(format!("key{i}"), format!("value{i}")).unwrap();
    }
    info
}

fn bench_encode(c: &mut Criterion) {
    let records = [
        ("infoResponse", make_info_response()),
        ("wide(64)", make_wide_record(64)),
    ];

    let mut group = c.benchmark_group("info_string_encode");
    for (name, record) in &records {
        group.bench_with_input(BenchmarkId::new("record", name), record, |b, record| {
            b.iter(|| black_box(record).encode())
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let records = [
        ("infoResponse", make_info_response()),
        ("wide(64)", make_wide_record(64)),
    ];

    let mut group = c.benchmark_group("info_string_decode");
    for (name, record) in &records {
        let bytes = record.encode();
        group.bench_with_input(BenchmarkId::new("record", name), &bytes, |b, bytes| {
            b.iter(|| InfoString::decode(black_box(bytes)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
