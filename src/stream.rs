//! The record stream facade (spec.md §3.4, §4.5).
//!
//! `Stream<T>` is generic over `Read`/`Write` the way the teacher's
//! `read`/`read_with_buffer` take `impl Read` rather than a trait
//! object — no dynamic dispatch for what is, per call site, always a
//! single concrete reader or writer. It carries the lifecycle spec.md
//! §4.2 describes: `Uninit -> Bound -> Active(..) -> Closed`, with the
//! `Opened` step folded into the mode-specific `open_*` call itself,
//! enforced the same way `FileHeader` enforces its own states, rather
//! than leaving callers to get the order right by convention.

use std::io::{Read, Write};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::header::{ByteOrder, CopyMask, FileHeader, HeaderEntry};
use crate::record::Record;
use crate::registry::{self, CodecDescriptor, FormatCode};

/// On-disk type id of [`HeaderEntry::PackedFile`] (spec.md §6.1); used
/// to recover the file-start-hour reference offset-based formats need.
const PACKED_FILE_ENTRY_TYPE: u32 = 1;

/// Caller-supplied configuration a [`Stream`] borrows read-only for its
/// whole lifetime (spec.md §9 design note: "pass configuration through
/// an options struct that the stream borrows read-only").
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Path used only for error context; a stream is free to wrap an
    /// in-memory buffer or a pipe with no real path.
    pub path: Option<PathBuf>,
    /// Byte order new files are written in. `None` means native order.
    /// Ignored when reading: the file's own header is authoritative.
    pub byte_order: Option<ByteOrder>,
    /// Whether `read_record` maps a bare IPv4 address to
    /// `::ffff:0:0/96` instead of returning it as native `IpAddr::V4`
    /// (spec.md §4.2 "IP version policy").
    pub map_to_v6: bool,
    /// Which header fields [`Stream::set_copy_input`] copies from the
    /// source header when appending to an existing file.
    pub copy_mask: CopyMask,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            path: None,
            byte_order: None,
            map_to_v6: false,
            copy_mask: CopyMask::empty(),
        }
    }
}

/// Which direction a stream is open in (spec.md §4.2's
/// `Active(Reading | Writing | Appending)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Reading,
    Writing,
    Appending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninit,
    Bound,
    Active,
    Closed,
}

/// A bound, header-aware reader or writer of flow records.
///
/// `T` is typically a `File`, `BufReader<File>`, or `BufWriter<File>`,
/// but any `Read`/`Write` type works, including an in-memory `Cursor`
/// for tests. The terminal check in `open_*` takes the `is_terminal`
/// result as a plain `bool` rather than bounding `T: IsTerminal`
/// directly, since the standard library only implements that trait for
/// a handful of concrete types (`File`, `Stdin`, `Stdout`, ...) and not
/// for wrappers like `BufReader`.
pub struct Stream<T> {
    inner: Option<T>,
    phase: Phase,
    mode: Option<Mode>,
    options: StreamOptions,
    header: FileHeader,
    descriptor: Option<CodecDescriptor>,
    swap: bool,
    file_start_ms: u64,
    record_index: u64,
    previously_opened: bool,
}

impl<T> Stream<T> {
    /// Returns a stream in the `Uninit` state.
    pub fn new(options: StreamOptions) -> Self {
        Stream {
            inner: None,
            phase: Phase::Uninit,
            mode: None,
            options,
            header: FileHeader::new(),
            descriptor: None,
            swap: false,
            file_start_ms: 0,
            record_index: 0,
            previously_opened: false,
        }
    }

    /// Binds the stream to a path, for error context only; advances
    /// `Uninit -> Bound`. Idempotent while still `Uninit`.
    pub fn bind(&mut self, path: impl Into<PathBuf>) -> Result<()> {
        if self.phase != Phase::Uninit {
            return Err(Error::PreviouslyOpened);
        }
        self.options.path = Some(path.into());
        self.phase = Phase::Bound;
        Ok(())
    }

    /// Mutable access to the header while it's still under
    /// construction (before [`Stream::open_write`] locks it).
    pub fn header_mut(&mut self) -> &mut FileHeader {
        &mut self.header
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn record_index(&self) -> u64 {
        self.record_index
    }

    fn require_bound(&self) -> Result<()> {
        match self.phase {
            Phase::Bound => Ok(()),
            Phase::Uninit => Err(Error::NotBound),
            _ => Err(Error::PreviouslyOpened),
        }
    }

    fn derive_file_start_ms(header: &FileHeader) -> u64 {
        header
            .iter_entries_of_type(PACKED_FILE_ENTRY_TYPE)
            .next()
            .and_then(|e| match e {
                HeaderEntry::PackedFile { start_hour, .. } => Some(*start_hour as u64 * 3_600_000),
                _ => None,
            })
            .unwrap_or(0)
    }
}

impl<T: Read> Stream<T> {
    /// Opens `inner` for reading: checks `is_terminal` (the caller
    /// supplies this via [`std::io::IsTerminal`] on the concrete type it holds —
    /// `File`/`Stdin` and friends implement it, a `Cursor` or in-memory
    /// buffer never is one), checks this stream hasn't been opened
    /// before, reads the header, resolves the format/version via
    /// [`registry::prepare`], and advances to `Active(Reading)`.
    pub fn open_read(&mut self, inner: T, is_terminal: bool) -> Result<()> {
        self.require_bound()?;
        if self.previously_opened {
            return Err(Error::PreviouslyOpened);
        }
        if is_terminal {
            return Err(Error::IsTerminal);
        }
        let mut inner = inner;
        let header = FileHeader::parse(&mut inner)?;
        let format = registry::lookup(header.format_code);
        let descriptor = registry::prepare(format, header.record_version, header.record_length)?;
        self.file_start_ms = Self::derive_file_start_ms(&header);
        self.swap = header.byte_order.needs_swap();
        self.header = header;
        self.descriptor = Some(descriptor);
        self.inner = Some(inner);
        self.previously_opened = true;
        self.mode = Some(Mode::Reading);
        self.phase = Phase::Active;
        Ok(())
    }

    /// Reads the next record, or `Ok(None)` at a clean end of file.
    pub fn read_record(&mut self) -> Result<Option<Record>> {
        if self.phase != Phase::Active || self.mode != Some(Mode::Reading) {
            return Err(Error::NotOpen);
        }
        let descriptor = self.descriptor.expect("Active(Reading) always has a descriptor");
        let len = descriptor.record_length as usize;
        let mut buf = vec![0u8; len];
        let inner = self.inner.as_mut().expect("Active(Reading) always has an inner reader");

        let mut read = 0;
        while read < len {
            let n = inner.read(&mut buf[read..])?;
            if n == 0 {
                if read == 0 {
                    return Ok(None);
                }
                return Err(Error::ShortRead {
                    expected: len,
                    actual: read,
                });
            }
            read += n;
        }

        if self.swap {
            descriptor.swap_bytes(&mut buf);
        }
        let rec = descriptor.unpack(&buf, self.file_start_ms, self.options.map_to_v6)?;
        self.record_index += 1;
        Ok(Some(rec))
    }
}

impl<T: Write> Stream<T> {
    /// Opens `inner` for writing: checks `is_terminal` and prior-open
    /// state, resolves the format/version, writes and locks the
    /// header, and advances to `Active(Writing)`.
    pub fn open_write(
        &mut self,
        inner: T,
        format: FormatCode,
        requested_version: u16,
        is_terminal: bool,
    ) -> Result<()> {
        self.require_bound()?;
        if self.previously_opened {
            return Err(Error::PreviouslyOpened);
        }
        if is_terminal {
            return Err(Error::IsTerminal);
        }
        let descriptor = registry::prepare(format, requested_version, 0)?;
        self.header.set_format(format.code())?;
        self.header.set_record_version(descriptor.version)?;
        self.header.set_record_length(descriptor.record_length)?;
        if let Some(order) = self.options.byte_order {
            self.header.set_byte_order(order)?;
        }
        self.file_start_ms = Self::derive_file_start_ms(&self.header);
        self.swap = self.header.byte_order.needs_swap();

        let mut inner = inner;
        self.header.serialize(&mut inner)?;
        self.header.lock();

        self.descriptor = Some(descriptor);
        self.inner = Some(inner);
        self.previously_opened = true;
        self.mode = Some(Mode::Writing);
        self.phase = Phase::Active;
        Ok(())
    }

    /// Opens `inner` in append mode against a header already read from
    /// the same path, skipping header serialization entirely (spec.md
    /// §4.5: appending reuses the existing file's
    /// format/version/byte-order as-is).
    pub fn open_append(&mut self, inner: T, existing: &FileHeader, is_terminal: bool) -> Result<()> {
        self.require_bound()?;
        if self.previously_opened {
            return Err(Error::PreviouslyOpened);
        }
        if is_terminal {
            return Err(Error::IsTerminal);
        }
        let format = registry::lookup(existing.format_code);
        let descriptor = registry::prepare(format, existing.record_version, existing.record_length)?;
        self.file_start_ms = Self::derive_file_start_ms(existing);
        self.swap = existing.byte_order.needs_swap();
        self.header = existing.clone();
        self.header.enter_entries_only();

        self.descriptor = Some(descriptor);
        self.inner = Some(inner);
        self.previously_opened = true;
        self.mode = Some(Mode::Appending);
        self.phase = Phase::Active;
        Ok(())
    }

    /// Merges fields from `src` into this stream's (still-modifiable)
    /// header before [`Stream::open_write`], per `options.copy_mask`.
    pub fn set_copy_input(&mut self, src: &FileHeader) -> Result<()> {
        self.header.copy_from(src, self.options.copy_mask)
    }

    /// Packs and writes one record, applying the file's byte-order
    /// swap if the stream was opened with a non-native order.
    pub fn write_record(&mut self, rec: &Record) -> Result<()> {
        if self.phase != Phase::Active || matches!(self.mode, None | Some(Mode::Reading)) {
            return Err(Error::NotOpen);
        }
        let descriptor = self.descriptor.expect("Active(Writing|Appending) always has a descriptor");
        let mut buf = vec![0u8; descriptor.record_length as usize];
        descriptor.pack(rec, self.file_start_ms, &mut buf)?;
        if self.swap {
            descriptor.swap_bytes(&mut buf);
        }
        let inner = self.inner.as_mut().expect("Active(Writing|Appending) always has an inner writer");
        inner.write_all(&buf)?;
        self.record_index += 1;
        Ok(())
    }

    /// Flushes the underlying writer and transitions to `Closed`.
    pub fn close(&mut self) -> Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.flush()?;
        }
        self.inner = None;
        self.phase = Phase::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Compression;
    use crate::record::Protocol;
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    /// `Cursor<Vec<u8>>` is never a terminal; lets the state machine be
    /// exercised without real files.
    fn sample_record() -> Record {
        Record {
            src_ip: Ipv4Addr::new(10, 0, 0, 1).into(),
            dst_ip: Ipv4Addr::new(10, 0, 0, 2).into(),
            protocol: Protocol::TCP,
            pkts: 4,
            bytes: 400,
            ..Default::default()
        }
    }

    #[test]
    fn write_then_read_roundtrip() {
        let mut writer: Stream<Cursor<Vec<u8>>> = Stream::new(StreamOptions::default());
        writer.bind("flows.dat").unwrap();
        writer
            .header_mut()
            .set_compression(Compression::None)
            .unwrap();
        writer
            .open_write(Cursor::new(Vec::new()), FormatCode::Filter, registry::ANY_VERSION, false)
            .unwrap();
        writer.write_record(&sample_record()).unwrap();
        writer.write_record(&sample_record()).unwrap();
        assert_eq!(writer.record_index(), 2);

        let bytes = {
            let mut inner = None;
            std::mem::swap(&mut inner, &mut writer.inner);
            inner.unwrap().into_inner()
        };

        let mut reader: Stream<Cursor<Vec<u8>>> = Stream::new(StreamOptions::default());
        reader.bind("flows.dat").unwrap();
        reader.open_read(Cursor::new(bytes), false).unwrap();
        let r1 = reader.read_record().unwrap().unwrap();
        let r2 = reader.read_record().unwrap().unwrap();
        assert_eq!(r1.src_ip, sample_record().src_ip);
        assert_eq!(r2.dst_ip, sample_record().dst_ip);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn double_open_is_rejected() {
        let mut s: Stream<Cursor<Vec<u8>>> = Stream::new(StreamOptions::default());
        s.bind("x").unwrap();
        s.open_write(Cursor::new(Vec::new()), FormatCode::Generic, registry::ANY_VERSION, false)
            .unwrap();
        assert!(matches!(
            s.open_write(Cursor::new(Vec::new()), FormatCode::Generic, registry::ANY_VERSION, false),
            Err(Error::PreviouslyOpened)
        ));
    }

    #[test]
    fn read_before_bind_is_rejected() {
        let mut s: Stream<Cursor<Vec<u8>>> = Stream::new(StreamOptions::default());
        assert!(matches!(
            s.open_read(Cursor::new(Vec::new()), false),
            Err(Error::NotBound)
        ));
    }
}
