//! Benchmark different read strategies for flow-record file parsing.
//!
//! Tests: BufReader sizes and mmap.

use std::env;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::time::Instant;

use flowrec::stream::{Stream, StreamOptions};

fn bench_bufreader(path: &str, buf_size: usize) -> (u64, f64) {
    let file = File::open(path).expect("Failed to open file");
    let reader = BufReader::with_capacity(buf_size, file);

    let mut stream: Stream<_> = Stream::new(StreamOptions::default());
    stream.bind(path).unwrap();
    stream.open_read(reader, false).expect("Failed to read header");

    let start = Instant::now();
    let mut count = 0u64;
    while stream.read_record().expect("read error").is_some() {
        count += 1;
    }

    (count, start.elapsed().as_secs_f64())
}

fn bench_mmap(path: &str) -> (u64, f64) {
    let file = File::open(path).expect("Failed to open file");
    let mmap = unsafe { memmap2::Mmap::map(&file).expect("Failed to mmap") };
    let cursor = Cursor::new(&mmap[..]);

    let mut stream: Stream<_> = Stream::new(StreamOptions::default());
    stream.bind(path).unwrap();
    stream.open_read(cursor, false).expect("Failed to read header");

    let start = Instant::now();
    let mut count = 0u64;
    while stream.read_record().expect("read error").is_some() {
        count += 1;
    }

    (count, start.elapsed().as_secs_f64())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(|s| s.as_str()).unwrap_or("data.dat");

    let file = File::open(path).expect("Failed to open file");
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    drop(file);

    println!("File: {} ({:.2} MB)\n", path, file_size as f64 / 1_000_000.0);
    println!("{:<40} {:>12} {:>12} {:>12}", "Strategy", "Records", "Time (s)", "MB/sec");
    println!("{}", "-".repeat(80));

    for &buf_size in &[64 * 1024, 256 * 1024, 1024 * 1024, 4 * 1024 * 1024, 16 * 1024 * 1024] {
        let (count, time) = bench_bufreader(path, buf_size);
        let mb_sec = (file_size as f64 / 1_000_000.0) / time;
        println!(
            "BufReader {:>6} KB                       {:>12} {:>12.3} {:>12.2}",
            buf_size / 1024, count, time, mb_sec
        );
    }

    println!();

    let (count, time) = bench_mmap(path);
    let mb_sec = (file_size as f64 / 1_000_000.0) / time;
    println!("{:<40} {:>12} {:>12.3} {:>12.2}", "Memory-mapped (mmap)", count, time, mb_sec);
}
