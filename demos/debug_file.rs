//! Debug flow-record file parsing.

use std::env;
use std::fs::File;
use std::io::BufReader;

use flowrec::stream::{Stream, StreamOptions};

fn main() {
    let args: Vec<String> = env::args().collect();
    let path = args.get(1).map(|s| s.as_str()).unwrap_or("data.dat");

    println!("Opening file: {}", path);
    let file = File::open(path).expect("Failed to open file");
    let reader = BufReader::with_capacity(1024 * 1024, file);

    let mut stream: Stream<_> = Stream::new(StreamOptions::default());
    stream.bind(path).unwrap();
    stream.open_read(reader, false).expect("Failed to read header");
    println!(
        "Header: format={:#04x} version={} record_length={}",
        stream.header().format_code,
        stream.header().record_version,
        stream.header().record_length
    );

    for i in 0..5 {
        match stream.read_record() {
            Ok(Some(rec)) => {
                println!(
                    "Record {}: {}:{} -> {}:{} proto={} pkts={} bytes={}",
                    i, rec.src_ip, rec.src_port, rec.dst_ip, rec.dst_port,
                    rec.protocol.0, rec.pkts, rec.bytes
                );
            }
            Ok(None) => {
                println!("Record {}: EOF", i);
                break;
            }
            Err(e) => {
                println!("Record {}: Error: {:?}", i, e);
                break;
            }
        }
    }
}
