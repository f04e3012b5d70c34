//! Profile flow-record file parsing to identify bottlenecks.

use std::collections::HashMap;
use std::env;
use std::fs::File;
use std::io::BufReader;
use std::time::Instant;

use flowrec::stream::{Stream, StreamOptions};

fn main() {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(|s| s.as_str()).unwrap_or("data.dat");

    println!("Profiling file: {}", path);
    let file = File::open(path).expect("Failed to open file");
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let reader = BufReader::with_capacity(1024 * 1024, file);

    let mut stream: Stream<_> = Stream::new(StreamOptions::default());
    stream.bind(path).unwrap();
    stream.open_read(reader, false).expect("Failed to read header");

    let mut protocol_counts: HashMap<u8, u64> = HashMap::new();
    let mut total_bytes = 0u64;

    let start = Instant::now();
    let mut count = 0u64;
    while let Some(rec) = stream.read_record().expect("read error") {
        *protocol_counts.entry(rec.protocol.0).or_insert(0) += 1;
        total_bytes += rec.bytes;
        count += 1;
    }
    let elapsed = start.elapsed();

    println!("\nFile size: {:.2} MB", file_size as f64 / 1_000_000.0);
    println!("Records: {}", count);
    println!("Total flow bytes: {:.2} MB", total_bytes as f64 / 1_000_000.0);
    println!("Time: {:.3} seconds", elapsed.as_secs_f64());
    println!(
        "Throughput: {:.2} MB/sec",
        (file_size as f64 / 1_000_000.0) / elapsed.as_secs_f64()
    );

    println!("\nProtocol distribution:");
    let mut counts: Vec<_> = protocol_counts.into_iter().collect();
    counts.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    for (protocol, count) in counts {
        let name = match protocol {
            1 => "ICMP",
            6 => "TCP",
            17 => "UDP",
            _ => "OTHER",
        };
        println!("  Protocol {:3} ({:5}): {:>10} records", protocol, name, count);
    }
}
