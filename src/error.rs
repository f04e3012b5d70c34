//! Error taxonomy for the flow-record codec core.
//!
//! Two-level design per the spec this crate implements: [`Error`] is the
//! flat, low-level kind (what went wrong), and [`ContextError`] wraps it
//! with the pathname and record index a stream had in hand when the
//! error surfaced (where it went wrong). Callers that only care about
//! the kind can match on `ContextError::kind`; callers that want a
//! one-line human message can just `Display` the `ContextError`.

use std::path::PathBuf;
use thiserror::Error as ThisError;

use crate::header::Compression;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The flat error-kind enum from the spec's §7 table.
#[derive(Debug, ThisError)]
pub enum Error {
    #[error("unsupported format code {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("format {format:#04x} does not support record version {version}")]
    UnsupportedVersion { format: u8, version: u16 },

    #[error("bad magic number {0:#010x}")]
    BadMagic(u32),

    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("end of file")]
    Eof,

    #[error("record has pkts == 0, which this format cannot store")]
    PktsZero,

    #[error("packet count {pkts} exceeds this format's maximum of {max}")]
    PktsOverflow { pkts: u64, max: u64 },

    #[error("packet count {pkts} exceeds byte count {bytes}")]
    PktsGtBytes { pkts: u64, bytes: u64 },

    #[error("bytes-per-packet ratio overflows this format's 14.6 fixed point (max integer part {max})")]
    BppOverflow { max: u32 },

    #[error("elapsed time {elapsed_ms} ms exceeds this format's cap of {max_ms} ms")]
    ElapsedOverflow { elapsed_ms: u64, max_ms: u64 },

    #[error("record start time precedes the file's start-hour reference")]
    StartTimeUnderflow,

    #[error("record start-time offset {offset_ms} ms exceeds this format's cap of {max_ms} ms")]
    StartTimeOverflow { offset_ms: u64, max_ms: u64 },

    #[error("SNMP interface id {0} exceeds the 8-bit range this format stores")]
    SnmpOverflow(u32),

    #[error("sensor id {0} exceeds the 8-bit range this format stores")]
    SensorOverflow(u32),

    #[error("protocol {0} is not TCP, which this format requires")]
    ProtocolMismatch(u8),

    #[error("IPv6 address outside ::ffff:0:0/96 cannot be represented in this format")]
    UnsupportedIpv6,

    #[error("allocation failed")]
    Alloc,

    #[error("refusing to read or write a record stream bound to a terminal")]
    IsTerminal,

    #[error("stream was already opened once")]
    PreviouslyOpened,

    #[error("stream has not been bound to a path")]
    NotBound,

    #[error("stream has not been opened")]
    NotOpen,

    #[error("stream is closed")]
    Closed,

    #[error("invalid compression method byte {0}")]
    CompressionInvalid(u8),

    #[error("compression method {0:?} is not available in this build")]
    CompressionUnavailable(Compression),

    #[error("unsupported content")]
    UnsupportedContent,

    #[error("unsupported I/O mode for this operation")]
    UnsupportedIoMode,

    #[error("file predates the modern header layout (file_version must be >= 16)")]
    LegacyHeader,

    #[error("header declares unsupported format code {0:#04x}")]
    HeaderBadFormat(u8),

    #[error("header declares unsupported record version {0}")]
    HeaderBadVersion(u16),

    #[error("malformed header entry (type {type_id}): {reason}")]
    HeaderBadEntry { type_id: u32, reason: &'static str },

    #[error("header is locked against further mutation")]
    HeaderLocked,

    #[error("header entry list exceeds the maximum representable length")]
    HeaderTooLong,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A structural contradiction between a codec's declared record length
/// and the header's declared record length. Per spec.md §7 this is a
/// registry/programming error, not a data error, so it is not part of
/// [`Error`] — it aborts instead.
#[track_caller]
pub(crate) fn abort_on_length_mismatch(format: u8, version: u16, codec_len: u16, header_len: u16) {
    if codec_len != header_len {
        panic!(
            "registry inconsistency: format {format:#04x} version {version} declares record \
             length {codec_len}, but header declares {header_len}"
        );
    }
}

/// An [`Error`] plus the stream-level context available when it
/// surfaced: the pathname (if the stream was bound to one) and the
/// index of the record being read or written (if any).
#[derive(Debug)]
pub struct ContextError {
    pub kind: Error,
    pub path: Option<PathBuf>,
    pub record_index: Option<u64>,
}

impl ContextError {
    pub(crate) fn new(kind: Error, path: Option<PathBuf>, record_index: Option<u64>) -> Self {
        Self {
            kind,
            path,
            record_index,
        }
    }
}

impl std::fmt::Display for ContextError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: ", path.display())?;
        }
        if let Some(idx) = self.record_index {
            write!(f, "record {idx}: ")?;
        }
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for ContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

impl From<std::io::Error> for ContextError {
    fn from(e: std::io::Error) -> Self {
        ContextError::new(Error::Io(e), None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_error_formats_path_and_index() {
        let e = ContextError::new(
            Error::PktsZero,
            Some(PathBuf::from("/tmp/flows.dat")),
            Some(42),
        );
        let msg = e.to_string();
        assert!(msg.starts_with("/tmp/flows.dat: record 42: "));
        assert!(msg.ends_with("pkts == 0, which this format cannot store"));
    }

    #[test]
    fn context_error_without_context() {
        let e = ContextError::new(Error::Eof, None, None);
        assert_eq!(e.to_string(), "end of file");
    }

    #[test]
    #[should_panic(expected = "registry inconsistency")]
    fn length_mismatch_aborts() {
        abort_on_length_mismatch(0x16, 5, 52, 48);
    }

    #[test]
    fn length_match_does_not_abort() {
        abort_on_length_mismatch(0x16, 5, 52, 52);
    }
}
