//! Per-format codec modules (spec.md §4.2, §6.2, §6.3).
//!
//! One module per on-disk format, mirroring the teacher's `src/records/`
//! directory of one-module-per-MRT-type. `crate::registry` owns the
//! `format_code -> module` dispatch; this module only defines the shared
//! [`FormatModule`] trait and the [`shared`] sub-packers every format
//! composes.

pub mod shared;

pub mod augmented;
pub mod filter;
pub mod flowcap;
pub mod generic;
pub mod ipv6;
pub mod routed;
pub mod split;
pub mod web;

use crate::error::Result;
use crate::record::Record;

/// A codec for one format, across every version it supports.
///
/// Implementors are zero-sized marker types (`Generic`, `Flowcap`, ...);
/// `version` is always an explicit parameter rather than `self` state,
/// since spec.md §3.3 ties the record length and wire layout to
/// `(format_code, version)`, not to any per-call state.
pub trait FormatModule {
    /// Record length in bytes for `version`, or `None` if this module
    /// doesn't support that version.
    fn record_length(version: u16) -> Option<u16>;

    /// The version installed when `prepare` is asked for `ANY` (0) on a
    /// fresh write.
    fn default_version() -> u16;

    /// Encodes `rec` into `out`, which is exactly `record_length(version)`
    /// bytes, canonical big-endian (spec.md §6.3's examples are all
    /// shown big-endian; the stream applies [`Self::swap_bytes`] itself
    /// when the file's `byte_order_flag` says otherwise).
    ///
    /// `file_start_ms` is the file-start-time reference (spec.md
    /// GLOSSARY "File-start time") that formats storing a start-offset
    /// rather than an absolute timestamp encode relative to; formats
    /// that store `start_time` absolutely (`Generic`, `Flowcap`) ignore
    /// it.
    fn pack(rec: &Record, version: u16, file_start_ms: u64, out: &mut [u8]) -> Result<()>;

    /// Decodes `buf`, which is exactly `record_length(version)` bytes in
    /// canonical big-endian, already byte-swapped by the caller if
    /// needed. `map_to_v6` controls whether a bare v4 address decodes
    /// natively or mapped into `::ffff:0:0/96` (spec.md §4.2 "IP version
    /// policy"). See [`Self::pack`] for `file_start_ms`.
    fn unpack(buf: &[u8], version: u16, file_start_ms: u64, map_to_v6: bool) -> Result<Record>;

    /// Reverses the multi-byte field windows of a packed `version`
    /// record in place (spec.md §4.5 "swap_flag that per-format swap
    /// macros consult"). A no-op for single-byte fields.
    fn swap_bytes(buf: &mut [u8], version: u16);
}
