//! The file header (spec.md §3.2, §4.4, §6.1).
//!
//! A file is `header | data_section`. The header's own multi-byte
//! fields are always big-endian on disk, independent of the data
//! section's byte order (`byte_order`). The header is a small
//! builder-style state machine — `Modifiable` while under construction,
//! `EntriesOnly` once a stream starts appending to an existing file,
//! `Locked` once serialized or parsed — enforced by the header itself,
//! the way `Its-its-archiver`'s RAR headers gate their own bit flags
//! rather than relying on an external lock.

use std::io::{Read, Write};

use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};

/// `0xDEADBEEF`, the fixed magic number at the start of every file.
pub const MAGIC: u32 = 0xDEAD_BEEF;
/// The modern header layout requires `file_version >= 16`.
pub const MIN_FILE_VERSION: u8 = 16;
/// Size of the fixed start block, before the entry list.
pub const START_BLOCK_LEN: usize = 16;

/// `byte_order_flag`: which endianness the *data section* (not the
/// header) is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// The byte order this host's own CPU uses, for "open for write
    /// with native order" callers.
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }

    fn from_flag(flag: u8) -> Self {
        if flag == 0 {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    fn to_flag(self) -> u8 {
        match self {
            ByteOrder::Big => 0,
            ByteOrder::Little => 1,
        }
    }

    /// Whether records written in this order need swapping to reach
    /// native-endian in-memory values (and vice versa on write).
    pub fn needs_swap(self) -> bool {
        self != Self::native()
    }
}

/// `compression_method`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    None,
    Zlib,
    Lzo1x,
    Snappy,
}

impl Compression {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zlib),
            2 => Ok(Compression::Lzo1x),
            3 => Ok(Compression::Snappy),
            other => Err(Error::CompressionInvalid(other)),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Zlib => 1,
            Compression::Lzo1x => 2,
            Compression::Snappy => 3,
        }
    }
}

mod entry_type {
    pub const SENTINEL: u32 = 0;
    pub const PACKED_FILE: u32 = 1;
    pub const INVOCATION: u32 = 2;
    pub const ANNOTATION: u32 = 3;
    pub const PROBENAME: u32 = 4;
    pub const TOMBSTONE: u32 = 10;
}

/// One entry in the header's entry list. Recognized types are decoded
/// into named variants; anything else (including the reserved 5–9
/// range and any future type id) is preserved verbatim as `Unknown` so
/// a pass-through copy never loses data it doesn't understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEntry {
    /// Packed-file metadata: start hour, flowtype, sensor.
    PackedFile {
        start_hour: u32,
        flowtype: u8,
        sensor: u16,
    },
    /// The command line that produced this file.
    Invocation(String),
    /// Free-text annotation.
    Annotation(String),
    /// Name of the probe that captured this data.
    ProbeName(String),
    /// Producer-supplied sequence counter.
    Tombstone { sequence: u32 },
    /// An entry of a type this crate doesn't interpret, kept byte-exact.
    Unknown { type_id: u32, payload: Vec<u8> },
}

impl HeaderEntry {
    fn type_id(&self) -> u32 {
        match self {
            HeaderEntry::PackedFile { .. } => entry_type::PACKED_FILE,
            HeaderEntry::Invocation(_) => entry_type::INVOCATION,
            HeaderEntry::Annotation(_) => entry_type::ANNOTATION,
            HeaderEntry::ProbeName(_) => entry_type::PROBENAME,
            HeaderEntry::Tombstone { .. } => entry_type::TOMBSTONE,
            HeaderEntry::Unknown { type_id, .. } => *type_id,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            HeaderEntry::PackedFile {
                start_hour,
                flowtype,
                sensor,
            } => {
                let mut buf = Vec::with_capacity(8);
                buf.extend_from_slice(&start_hour.to_be_bytes());
                buf.push(*flowtype);
                buf.extend_from_slice(&sensor.to_be_bytes());
                buf.push(0); // pad to an even payload length
                buf
            }
            HeaderEntry::Invocation(s) | HeaderEntry::Annotation(s) | HeaderEntry::ProbeName(s) => {
                s.as_bytes().to_vec()
            }
            HeaderEntry::Tombstone { sequence } => sequence.to_be_bytes().to_vec(),
            HeaderEntry::Unknown { payload, .. } => payload.clone(),
        }
    }

    fn parse(type_id: u32, payload: &[u8]) -> Result<Self> {
        match type_id {
            entry_type::PACKED_FILE => {
                if payload.len() < 7 {
                    return Err(Error::HeaderBadEntry {
                        type_id,
                        reason: "packed-file entry shorter than 7 bytes",
                    });
                }
                let start_hour = u32::from_be_bytes(payload[0..4].try_into().unwrap());
                let flowtype = payload[4];
                let sensor = u16::from_be_bytes(payload[5..7].try_into().unwrap());
                Ok(HeaderEntry::PackedFile {
                    start_hour,
                    flowtype,
                    sensor,
                })
            }
            entry_type::INVOCATION => {
                Ok(HeaderEntry::Invocation(String::from_utf8_lossy(payload).into_owned()))
            }
            entry_type::ANNOTATION => {
                Ok(HeaderEntry::Annotation(String::from_utf8_lossy(payload).into_owned()))
            }
            entry_type::PROBENAME => {
                Ok(HeaderEntry::ProbeName(String::from_utf8_lossy(payload).into_owned()))
            }
            entry_type::TOMBSTONE => {
                if payload.len() < 4 {
                    return Err(Error::HeaderBadEntry {
                        type_id,
                        reason: "tombstone entry shorter than 4 bytes",
                    });
                }
                let sequence = u32::from_be_bytes(payload[0..4].try_into().unwrap());
                Ok(HeaderEntry::Tombstone { sequence })
            }
            other => Ok(HeaderEntry::Unknown {
                type_id: other,
                payload: payload.to_vec(),
            }),
        }
    }
}

/// Lifecycle state of a [`FileHeader`] (spec.md §3.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    Modifiable,
    EntriesOnly,
    Locked,
}

bitflags! {
    /// Which fields [`FileHeader::copy_from`] should copy.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CopyMask: u16 {
        const BYTE_ORDER     = 0b0000_0001;
        const FORMAT         = 0b0000_0010;
        const FILE_VERSION   = 0b0000_0100;
        const COMPRESSION    = 0b0000_1000;
        const RECORD_LENGTH  = 0b0001_0000;
        const RECORD_VERSION = 0b0010_0000;
        const ENTRIES        = 0b0100_0000;
        const ALL = Self::BYTE_ORDER.bits()
            | Self::FORMAT.bits()
            | Self::FILE_VERSION.bits()
            | Self::COMPRESSION.bits()
            | Self::RECORD_LENGTH.bits()
            | Self::RECORD_VERSION.bits()
            | Self::ENTRIES.bits();
    }
}

/// The self-describing file header.
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub byte_order: ByteOrder,
    pub format_code: u8,
    pub file_version: u8,
    pub compression: Compression,
    pub silk_producer_version: u32,
    pub record_length: u16,
    pub record_version: u16,
    entries: Vec<HeaderEntry>,
    state: HeaderState,
}

impl PartialEq for FileHeader {
    /// Compares every field except the lifecycle state: a freshly
    /// parsed (`Locked`) header and the `Modifiable` header that was
    /// serialized to produce it are "the same header" for round-trip
    /// purposes (spec.md §8 property 4).
    fn eq(&self, other: &Self) -> bool {
        self.byte_order == other.byte_order
            && self.format_code == other.format_code
            && self.file_version == other.file_version
            && self.compression == other.compression
            && self.silk_producer_version == other.silk_producer_version
            && self.record_length == other.record_length
            && self.record_version == other.record_version
            && self.entries == other.entries
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        FileHeader::new()
    }
}

impl FileHeader {
    /// Returns a modifiable header with defaults: native byte order,
    /// no compression, `file_version = 16` (the minimum modern value),
    /// and everything else zeroed.
    pub fn new() -> Self {
        FileHeader {
            byte_order: ByteOrder::native(),
            format_code: 0,
            file_version: MIN_FILE_VERSION,
            compression: Compression::None,
            silk_producer_version: 0,
            record_length: 0,
            record_version: 0,
            entries: Vec::new(),
            state: HeaderState::Modifiable,
        }
    }

    fn require_modifiable(&self) -> Result<()> {
        if self.state == HeaderState::Modifiable {
            Ok(())
        } else {
            Err(Error::HeaderLocked)
        }
    }

    fn require_entries_writable(&self) -> Result<()> {
        match self.state {
            HeaderState::Modifiable | HeaderState::EntriesOnly => Ok(()),
            HeaderState::Locked => Err(Error::HeaderLocked),
        }
    }

    pub fn set_byte_order(&mut self, v: ByteOrder) -> Result<()> {
        self.require_modifiable()?;
        self.byte_order = v;
        Ok(())
    }

    pub fn set_format(&mut self, v: u8) -> Result<()> {
        self.require_modifiable()?;
        self.format_code = v;
        Ok(())
    }

    pub fn set_file_version(&mut self, v: u8) -> Result<()> {
        self.require_modifiable()?;
        self.file_version = v;
        Ok(())
    }

    pub fn set_record_version(&mut self, v: u16) -> Result<()> {
        self.require_modifiable()?;
        self.record_version = v;
        Ok(())
    }

    pub fn set_compression(&mut self, v: Compression) -> Result<()> {
        self.require_modifiable()?;
        self.compression = v;
        Ok(())
    }

    pub fn set_record_length(&mut self, v: u16) -> Result<()> {
        self.require_modifiable()?;
        self.record_length = v;
        Ok(())
    }

    /// Appends an entry. Valid while `Modifiable` or `EntriesOnly`.
    pub fn add_entry(&mut self, entry: HeaderEntry) -> Result<()> {
        self.require_entries_writable()?;
        self.entries.push(entry);
        Ok(())
    }

    /// Iterates entries in insertion order.
    pub fn iter_entries(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter()
    }

    /// Iterates only the entries whose on-disk type id is `type_id`.
    pub fn iter_entries_of_type(&self, type_id: u32) -> impl Iterator<Item = &HeaderEntry> {
        self.entries.iter().filter(move |e| e.type_id() == type_id)
    }

    /// Copies the fields selected by `mask` from `src` into `self`.
    pub fn copy_from(&mut self, src: &FileHeader, mask: CopyMask) -> Result<()> {
        if mask.intersects(
            CopyMask::BYTE_ORDER
                | CopyMask::FORMAT
                | CopyMask::FILE_VERSION
                | CopyMask::COMPRESSION
                | CopyMask::RECORD_LENGTH
                | CopyMask::RECORD_VERSION,
        ) {
            self.require_modifiable()?;
        }
        if mask.contains(CopyMask::ENTRIES) {
            self.require_entries_writable()?;
        }
        if mask.contains(CopyMask::BYTE_ORDER) {
            self.byte_order = src.byte_order;
        }
        if mask.contains(CopyMask::FORMAT) {
            self.format_code = src.format_code;
        }
        if mask.contains(CopyMask::FILE_VERSION) {
            self.file_version = src.file_version;
        }
        if mask.contains(CopyMask::COMPRESSION) {
            self.compression = src.compression;
        }
        if mask.contains(CopyMask::RECORD_LENGTH) {
            self.record_length = src.record_length;
        }
        if mask.contains(CopyMask::RECORD_VERSION) {
            self.record_version = src.record_version;
        }
        if mask.contains(CopyMask::ENTRIES) {
            self.entries.extend(src.entries.iter().cloned());
        }
        Ok(())
    }

    /// Transitions to `Locked`: no further mutation of any kind.
    pub fn lock(&mut self) {
        self.state = HeaderState::Locked;
    }

    /// Transitions to `EntriesOnly`: existing scalar fields are frozen
    /// but new entries may still be appended (the state an opened
    /// stream in append mode leaves its header in).
    pub fn enter_entries_only(&mut self) {
        if self.state == HeaderState::Modifiable {
            self.state = HeaderState::EntriesOnly;
        }
    }

    fn total_entries_len(&self) -> usize {
        self.entries.iter().map(|e| 8 + e.payload().len()).sum()
    }

    /// Serializes the start block, every entry, the sentinel (padded so
    /// the data section starts on a `record_length` boundary when
    /// `record_length != 0`), per spec.md §6.1/§4.4.
    pub fn serialize(&self, sink: &mut impl Write) -> Result<()> {
        sink.write_u32::<BigEndian>(MAGIC)?;
        sink.write_u8(self.byte_order.to_flag())?;
        sink.write_u8(self.format_code)?;
        sink.write_u8(self.file_version)?;
        sink.write_u8(self.compression.to_byte())?;
        sink.write_u32::<BigEndian>(self.silk_producer_version)?;
        sink.write_u16::<BigEndian>(self.record_length)?;
        sink.write_u16::<BigEndian>(self.record_version)?;

        for entry in &self.entries {
            let payload = entry.payload();
            let total_len = 8 + payload.len();
            if total_len > u32::MAX as usize {
                return Err(Error::HeaderTooLong);
            }
            sink.write_u32::<BigEndian>(entry.type_id())?;
            sink.write_u32::<BigEndian>(total_len as u32)?;
            sink.write_all(&payload)?;
        }

        let used = START_BLOCK_LEN + self.total_entries_len() + 8;
        let pad = if self.record_length > 0 {
            let rl = self.record_length as usize;
            (rl - (used % rl)) % rl
        } else {
            0
        };
        sink.write_u32::<BigEndian>(entry_type::SENTINEL)?;
        sink.write_u32::<BigEndian>((8 + pad) as u32)?;
        if pad > 0 {
            sink.write_all(&vec![0u8; pad])?;
        }
        Ok(())
    }

    /// Parses the start block and entry list, leaving the source
    /// positioned at the first data byte. Returns a `Locked` header.
    pub fn parse(source: &mut impl Read) -> Result<Self> {
        tracing::trace!("parsing file header");
        let magic = source.read_u32::<BigEndian>()?;
        if magic != MAGIC {
            return Err(Error::BadMagic(magic));
        }
        let byte_order = ByteOrder::from_flag(source.read_u8()?);
        let format_code = source.read_u8()?;
        let file_version = source.read_u8()?;
        if file_version < MIN_FILE_VERSION {
            return Err(Error::LegacyHeader);
        }
        let compression = Compression::from_byte(source.read_u8()?)?;
        let silk_producer_version = source.read_u32::<BigEndian>()?;
        let record_length = source.read_u16::<BigEndian>()?;
        let record_version = source.read_u16::<BigEndian>()?;

        let mut entries = Vec::new();
        loop {
            let type_id = source.read_u32::<BigEndian>()?;
            let total_length = source.read_u32::<BigEndian>()?;
            if type_id == entry_type::SENTINEL {
                let pad = total_length.saturating_sub(8) as usize;
                if pad > 0 {
                    let mut discard = vec![0u8; pad];
                    source.read_exact(&mut discard)?;
                }
                break;
            }
            if total_length < 8 {
                return Err(Error::HeaderBadEntry {
                    type_id,
                    reason: "total_length shorter than the 8-byte entry prefix",
                });
            }
            let payload_len = (total_length - 8) as usize;
            let mut payload = vec![0u8; payload_len];
            source.read_exact(&mut payload)?;
            entries.push(HeaderEntry::parse(type_id, &payload)?);
        }

        tracing::debug!(
            format = format_code,
            version = record_version,
            record_length,
            entries = entries.len(),
            "parsed file header"
        );
        Ok(FileHeader {
            byte_order,
            format_code,
            file_version,
            compression,
            silk_producer_version,
            record_length,
            record_version,
            entries,
            state: HeaderState::Locked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// S3 from spec.md: Flowcap header with Invocation + ProbeName entries.
    #[test]
    fn s3_header_entry_list_roundtrip() {
        let mut h = FileHeader::new();
        h.set_format(0x1C).unwrap();
        h.set_record_version(5).unwrap();
        h.set_byte_order(ByteOrder::Big).unwrap();
        h.set_compression(Compression::None).unwrap();
        h.set_record_length(38).unwrap();
        h.add_entry(HeaderEntry::Invocation("rwflowpack --sensor 7".into()))
            .unwrap();
        h.add_entry(HeaderEntry::ProbeName("probe0".into())).unwrap();

        let mut buf = Vec::new();
        h.serialize(&mut buf).unwrap();

        let mut cursor = Cursor::new(buf);
        let parsed = FileHeader::parse(&mut cursor).unwrap();
        let entries: Vec<_> = parsed.iter_entries().collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            &HeaderEntry::Invocation("rwflowpack --sensor 7".into())
        );
        assert_eq!(entries[1], &HeaderEntry::ProbeName("probe0".into()));
        assert_eq!(parsed, h);
    }

    #[test]
    fn header_roundtrip_preserves_unknown_entry_types() {
        let mut h = FileHeader::new();
        h.set_format(0x16).unwrap();
        h.add_entry(HeaderEntry::Unknown {
            type_id: 7,
            payload: vec![0xAA, 0xBB, 0xCC],
        })
        .unwrap();

        let mut buf = Vec::new();
        h.serialize(&mut buf).unwrap();
        let parsed = FileHeader::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = vec![0u8; 16];
        assert!(matches!(
            FileHeader::parse(&mut Cursor::new(buf)),
            Err(Error::BadMagic(0))
        ));
    }

    #[test]
    fn legacy_file_version_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_be_bytes());
        buf.push(0); // byte order
        buf.push(0x16); // format
        buf.push(15); // file_version < 16
        buf.push(0); // compression
        buf.extend_from_slice(&[0u8; 4]); // producer version
        buf.extend_from_slice(&[0u8; 2]); // record_length
        buf.extend_from_slice(&[0u8; 2]); // record_version
        assert!(matches!(
            FileHeader::parse(&mut Cursor::new(buf)),
            Err(Error::LegacyHeader)
        ));
    }

    #[test]
    fn locked_header_rejects_mutation() {
        let mut h = FileHeader::new();
        h.lock();
        assert!(matches!(h.set_format(1), Err(Error::HeaderLocked)));
        assert!(matches!(
            h.add_entry(HeaderEntry::Tombstone { sequence: 1 }),
            Err(Error::HeaderLocked)
        ));
    }

    #[test]
    fn entries_only_allows_appending_but_not_scalar_mutation() {
        let mut h = FileHeader::new();
        h.enter_entries_only();
        assert!(matches!(h.set_format(1), Err(Error::HeaderLocked)));
        assert!(h.add_entry(HeaderEntry::Tombstone { sequence: 9 }).is_ok());
    }

    #[test]
    fn copy_from_honours_mask() {
        let mut src = FileHeader::new();
        src.set_format(0x1F).unwrap();
        src.set_record_length(22).unwrap();
        src.add_entry(HeaderEntry::Annotation("note".into())).unwrap();

        let mut dst = FileHeader::new();
        dst.copy_from(&src, CopyMask::FORMAT | CopyMask::ENTRIES).unwrap();
        assert_eq!(dst.format_code, 0x1F);
        assert_eq!(dst.record_length, 0); // not copied
        assert_eq!(dst.iter_entries().count(), 1);
    }

    #[test]
    fn serialize_pads_sentinel_to_record_boundary() {
        let mut h = FileHeader::new();
        h.set_record_length(38).unwrap();
        let mut buf = Vec::new();
        h.serialize(&mut buf).unwrap();
        assert_eq!(buf.len() % 38, 0);
    }
}
