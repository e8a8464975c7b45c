//! Criterion benchmarks for the echo statistics aggregator and the echo
//! datagram format.
//!
//! Both run once per datagram inside the echo loops.
//!
//! Run with:
//! ```bash
//! cargo bench --package p2p-core --bench stats_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use p2p_core::{EchoHeader, EchoStats};

fn bench_record_reply(c: &mut Criterion) {
    let mut group = c.benchmark_group("echo_stats");

    group.bench_function("record_reply", |b| {
        let mut stats = EchoStats::new();
        let mut rtt = 1_000u32;
        b.iter(|| {
            rtt = rtt.wrapping_mul(1_103_515_245).wrapping_add(12_345) % 50_000;
            stats.record_reply(black_box(rtt), 64, 64);
        })
    });

    group.bench_function("record_loss", |b| {
        let mut stats = EchoStats::new();
        b.iter(|| stats.record_loss(black_box(64)))
    });

    group.finish();
}

fn bench_datagram(c: &mut Criterion) {
    let mut group = c.benchmark_group("echo_datagram");
    let header = EchoHeader::new(4_242, 987_654_321);
    let bytes = header.encode(64);

    group.bench_function("encode_64", |b| {
        b.iter(|| black_box(&header).encode(black_box(64)))
    });

    group.bench_function("encode_1400", |b| {
        b.iter(|| black_box(&header).encode(black_box(1_400)))
    });

    group.bench_function("decode_64", |b| {
        b.iter(|| EchoHeader::decode(black_box(&bytes)))
    });

    group.finish();
}

criterion_group!(benches, bench_record_reply, bench_datagram);
criterion_main!(benches);
