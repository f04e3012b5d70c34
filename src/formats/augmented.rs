//! `Augmented` (format `0x14`), version 1 — spec.md §4.2's P1 (protocol/
//! flags fold) composed with P3 (time/bytes/pkts/flags).
//!
//! 28 bytes: the 10-byte P3 pack at bytes 0..=9 (`start_offset_sec`,
//! `start_msec`, `elapsed_sec`, `elapsed_msec`, `pkts`, `is_tcp`,
//! `prot_or_flags` — the last two filled from P1's `is_tcp`/
//! `prot_or_flags` outputs), then the two P1 outputs P3 has no room
//! for (`tcp_state`, `rest_or_flags`) as standalone bytes at 10 and 11,
//! then `sIP:u32 | dIP:u32 | sPort:u16 | dPort:u16 | sensor:u16 |
//! flowtype:u16` — the "augmented" metadata this format adds over the
//! bare P1+P3 pair.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::bitfield::{swap16, swap32, swap_window};
use crate::error::{Error, Result};
use crate::formats::shared::{p1_pack, p1_unpack, p3_pack, p3_unpack};
use crate::formats::FormatModule;
use crate::record::Record;

pub struct Augmented;

const LEN: u16 = 28;

impl FormatModule for Augmented {
    fn record_length(version: u16) -> Option<u16> {
        match version {
            1 => Some(LEN),
            _ => None,
        }
    }

    fn default_version() -> u16 {
        1
    }

    fn pack(rec: &Record, version: u16, file_start_ms: u64, out: &mut [u8]) -> Result<()> {
        if version != 1 {
            return Err(Error::UnsupportedVersion {
                format: 0x14,
                version,
            });
        }
        rec.check_writer_invariants()?;
        if !Record::is_v4_representable(rec.src_ip) || !Record::is_v4_representable(rec.dst_ip) {
            return Err(Error::UnsupportedIpv6);
        }
        if rec.start_time_ms < file_start_ms {
            return Err(Error::StartTimeUnderflow);
        }
        let offset_ms = rec.start_time_ms - file_start_ms;
        let start_offset_sec = (offset_ms / 1000) as u32;
        let start_msec = (offset_ms % 1000) as u32;
        let elapsed_sec = rec.elapsed_ms / 1000;
        let elapsed_msec = rec.elapsed_ms % 1000;

        let p1 = p1_pack(rec.protocol, rec.tcp_flags, rec.init_flags, rec.rest_flags, rec.tcp_state);
        let p3 = p3_pack(
            start_offset_sec,
            start_msec,
            elapsed_sec,
            elapsed_msec,
            rec.pkts,
            p1.is_tcp,
            p1.prot_or_flags,
        )?;

        let mut c = Cursor::new(out);
        c.write_all(&p3)?;
        c.write_u8(p1.tcp_state)?;
        c.write_u8(p1.rest_or_flags)?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.src_ip).unwrap())?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.dst_ip).unwrap())?;
        c.write_u16::<BigEndian>(rec.src_port)?;
        c.write_u16::<BigEndian>(rec.dst_port)?;
        c.write_u16::<BigEndian>(rec.sensor_id)?;
        c.write_u16::<BigEndian>(rec.flowtype_id)?;
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        if version != 1 {
            return Err(Error::UnsupportedVersion {
                format: 0x14,
                version,
            });
        }
        let p3_bytes: [u8; 10] = buf[0..10].try_into().unwrap();
        let (start_offset_sec, start_msec, elapsed_sec, elapsed_msec, pkts, is_tcp, prot_or_flags) =
            p3_unpack(&p3_bytes);

        let mut c = Cursor::new(&buf[10..]);
        let tcp_state_byte = c.read_u8()?;
        let rest_or_flags = c.read_u8()?;
        let src_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let dst_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let src_port = c.read_u16::<BigEndian>()?;
        let dst_port = c.read_u16::<BigEndian>()?;
        let sensor_id = c.read_u16::<BigEndian>()?;
        let flowtype_id = c.read_u16::<BigEndian>()?;

        let (protocol, tcp_flags, init_flags, rest_flags, tcp_state) =
            p1_unpack(is_tcp, prot_or_flags, tcp_state_byte, rest_or_flags);

        let mut rec = Record {
            start_time_ms: file_start_ms + start_offset_sec as u64 * 1000 + start_msec as u64,
            elapsed_ms: elapsed_sec * 1000 + elapsed_msec,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            pkts,
            bytes: pkts, // no byte count in this layout; see DESIGN.md
            sensor_id,
            flowtype_id,
            tcp_flags,
            init_flags,
            rest_flags,
            tcp_state,
            ..Default::default()
        };
        rec.apply_expanded_fixup();
        Ok(rec)
    }

    fn swap_bytes(buf: &mut [u8], _version: u16) {
        swap_window(buf, 0, 10); // P3 core, one 10-byte packed word
        // 10, 11 are single bytes (tcp_state, rest_or_flags): no swap.
        swap32(buf, 12); // sIP
        swap32(buf, 16); // dIP
        swap16(buf, 20); // sPort
        swap16(buf, 22); // dPort
        swap16(buf, 24); // sensor
        swap16(buf, 26); // flowtype
    }
}
