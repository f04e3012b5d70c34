// SPDX-License-Identifier: MIT OR Apache-2.0

//! Benchmarks for codec pack/unpack performance.
//!
//! Run with: cargo bench
//! Run with profiling: cargo bench --bench codec_benchmark -- --profile-time=5

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pprof::criterion::{Output, PProfProfiler};
use std::net::Ipv4Addr;

use flowrec::formats::generic::Generic;
use flowrec::formats::web::Web;
use flowrec::formats::FormatModule;
use flowrec::record::{Protocol, Record};

fn sample_record() -> Record {
    Record {
        start_time_ms: 1_700_000_000_000,
        elapsed_ms: 4_500,
        src_ip: Ipv4Addr::new(10, 0, 0, 1).into(),
        dst_ip: Ipv4Addr::new(10, 0, 0, 2).into(),
        src_port: 443,
        dst_port: 51234,
        protocol: Protocol::TCP,
        pkts: 40,
        bytes: 60_000,
        sensor_id: 3,
        flowtype_id: 1,
        ..Default::default()
    }
}

fn benchmark_generic_pack_unpack(c: &mut Criterion) {
    let rec = sample_record();
    let len = Generic::record_length(5).unwrap() as usize;
    let mut buf = vec![0u8; len];
    Generic::pack(&rec, 5, 0, &mut buf).unwrap();

    let mut group = c.benchmark_group("generic_v5");
    group.bench_function("pack", |b| {
        b.iter(|| {
            let mut out = vec![0u8; len];
            Generic::pack(black_box(&rec), 5, 0, &mut out).unwrap();
        })
    });
    group.bench_function("unpack", |b| {
        b.iter(|| {
            black_box(Generic::unpack(&buf, 5, 0, false).unwrap());
        })
    });
    group.finish();
}

fn benchmark_web_pack_unpack(c: &mut Criterion) {
    let rec = sample_record();
    let len = Web::record_length(5).unwrap() as usize;
    let file_start_ms = rec.start_time_ms - 1_000;
    let mut buf = vec![0u8; len];
    Web::pack(&rec, 5, file_start_ms, &mut buf).unwrap();

    let mut group = c.benchmark_group("web_v5");
    group.bench_function("pack", |b| {
        b.iter(|| {
            let mut out = vec![0u8; len];
            Web::pack(black_box(&rec), 5, file_start_ms, &mut out).unwrap();
        })
    });
    group.bench_function("unpack", |b| {
        b.iter(|| {
            black_box(Web::unpack(&buf, 5, file_start_ms, false).unwrap());
        })
    });
    group.finish();
}

fn benchmark_generic_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("generic_batch_unpack");

    for count in [100, 1_000, 10_000].iter() {
        let rec = sample_record();
        let len = Generic::record_length(5).unwrap() as usize;
        let mut packed = vec![0u8; len];
        Generic::pack(&rec, 5, 0, &mut packed).unwrap();
        let mut data = Vec::with_capacity(len * count);
        for _ in 0..*count {
            data.extend_from_slice(&packed);
        }

        group.bench_with_input(BenchmarkId::new("records", count), count, |b, _| {
            b.iter(|| {
                let mut n = 0;
                for chunk in data.chunks(len) {
                    black_box(Generic::unpack(chunk, 5, 0, false).unwrap());
                    n += 1;
                }
                black_box(n)
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_generic_pack_unpack,
    benchmark_web_pack_unpack,
    benchmark_generic_throughput,
);

criterion_group!(
    name = profiled;
    config = Criterion::default().with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)));
    targets = benchmark_generic_pack_unpack, benchmark_web_pack_unpack, benchmark_generic_throughput
);

// Use 'benches' for normal runs, 'profiled' for flamegraph generation
criterion_main!(benches);

// To run with profiling, change the line above to:
// criterion_main!(profiled);
// Then run: cargo bench --bench codec_benchmark
// Flamegraphs will be in target/criterion/*/profile/flamegraph.svg
