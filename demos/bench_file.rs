// SPDX-License-Identifier: MIT OR Apache-2.0

//! Benchmark reading a real flow-record file.
//!
//! Usage: cargo run --release --example bench_file <path_to_flow_file>

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use flowrec::stream::{Stream, StreamOptions};

fn main() {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(|s| s.as_str()).unwrap_or("data.dat");

    let file = File::open(path).expect("Failed to open file");
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    drop(file);

    println!("File: {} ({:.2} MB)\n", path, file_size as f64 / 1_000_000.0);

    let file = File::open(path).expect("Failed to open file");
    let reader = BufReader::with_capacity(1024 * 1024, file);

    let mut stream: Stream<_> = Stream::new(StreamOptions::default());
    stream.bind(path).unwrap();
    stream.open_read(reader, false).expect("Failed to read header");

    let start = Instant::now();
    let mut count = 0u64;
    while stream.read_record().expect("read error").is_some() {
        count += 1;
    }

    let elapsed = start.elapsed();
    let mb_per_sec = (file_size as f64 / 1_000_000.0) / elapsed.as_secs_f64();
    println!(
        "BufReader (1MB):    {} records in {:.3}s = {:.2} MB/sec",
        count, elapsed.as_secs_f64(), mb_per_sec
    );
}
