//! # flowrec
//!
//! A binary codec for fixed-width flow-record files: one self-describing
//! header (`src::header`) followed by a data section of bit-packed,
//! per-`(format, version)` records (`src::formats`). The [`Stream`] facade
//! ties header and records together into a single read/write lifecycle; the
//! [`registry`] module resolves a raw `(format_code, record_version)` pair
//! off a header into the [`formats::FormatModule`] that actually codes it.
//!
//! ## Example
//!
//! ```no_run
//! use flowrec::registry::{FormatCode, ANY_VERSION};
//! use flowrec::stream::{Stream, StreamOptions};
//! use std::fs::File;
//!
//! let file = File::open("flows.dat").unwrap();
//! let mut stream: Stream<File> = Stream::new(StreamOptions::default());
//! stream.bind("flows.dat").unwrap();
//! stream.open_read(file, false).unwrap();
//!
//! while let Some(rec) = stream.read_record().unwrap() {
//!     println!("{} -> {}: {} pkts", rec.src_ip, rec.dst_ip, rec.pkts);
//! }
//! ```

pub mod bitfield;
pub mod error;
pub mod formats;
pub mod header;
pub mod record;
pub mod registry;
pub mod stream;

pub use error::{ContextError, Error, Result};
pub use header::{ByteOrder, Compression, CopyMask, FileHeader, HeaderEntry};
pub use record::{Protocol, Record, TcpFlags, TcpState};
pub use registry::{CodecDescriptor, FormatCode, ANY_VERSION};
pub use stream::{Mode, Stream, StreamOptions};
