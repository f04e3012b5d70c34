//! `Split` (format `0x12`), version 1 — spec.md §4.2's P1 composed with
//! P5. Unlike `Augmented`/`Routed`, P5 already has a slot for every P1
//! output (`rest_flags`, `is_tcp`, `proto_or_initflags`, `tcp_state`),
//! so the fold loses nothing and needs no extra standalone bytes; what
//! P5 lacks is any volume/elapsed data, which this format appends.
//!
//! 28 bytes: the 6-byte P5 pack at bytes 0..=5, `elapsed_ms:u16@6`
//! (saturated, not erroring, at `0xFFFF` — this is the coarsest
//! elapsed-time format in the catalog), `pkts:u32@8`, `bytes:u32@12`,
//! `sIP:u32@16`, `dIP:u32@20`, `sPort:u16@24`, `dPort:u16@26`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::bitfield::{swap16, swap32, swap_window};
use crate::error::{Error, Result};
use crate::formats::shared::{p1_pack, p1_unpack, p5_pack, p5_unpack};
use crate::formats::FormatModule;
use crate::record::Record;

pub struct Split;

const LEN: u16 = 28;

impl FormatModule for Split {
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
                format: 0x12,
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
        let start_ms_offset = (rec.start_time_ms - file_start_ms) as u32;
        let elapsed_ms = rec.elapsed_ms.min(0xFFFF) as u16;

        let p1 = p1_pack(rec.protocol, rec.tcp_flags, rec.init_flags, rec.rest_flags, rec.tcp_state);
        let p5 = p5_pack(
            p1.rest_or_flags,
            p1.is_tcp,
            start_ms_offset,
            p1.prot_or_flags,
            p1.tcp_state,
        )?;

        let mut c = Cursor::new(out);
        c.write_all(&p5)?;
        c.write_u16::<BigEndian>(elapsed_ms)?;
        c.write_u32::<BigEndian>(rec.pkts as u32)?;
        c.write_u32::<BigEndian>(rec.bytes as u32)?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.src_ip).unwrap())?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.dst_ip).unwrap())?;
        c.write_u16::<BigEndian>(rec.src_port)?;
        c.write_u16::<BigEndian>(rec.dst_port)?;
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        if version != 1 {
            return Err(Error::UnsupportedVersion {
                format: 0x12,
                version,
            });
        }
        let p5_bytes: [u8; 6] = buf[0..6].try_into().unwrap();
        let (rest_flags_byte, is_tcp, start_ms_offset, prot_or_flags, tcp_state_byte) =
            p5_unpack(&p5_bytes);

        let mut c = Cursor::new(&buf[6..]);
        let elapsed_ms = c.read_u16::<BigEndian>()? as u32;
        let pkts = c.read_u32::<BigEndian>()? as u64;
        let bytes = c.read_u32::<BigEndian>()? as u64;
        let src_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let dst_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let src_port = c.read_u16::<BigEndian>()?;
        let dst_port = c.read_u16::<BigEndian>()?;

        let (protocol, tcp_flags, init_flags, rest_flags, tcp_state) =
            p1_unpack(is_tcp, prot_or_flags, tcp_state_byte, rest_flags_byte);

        let mut rec = Record {
            start_time_ms: file_start_ms + start_ms_offset as u64,
            elapsed_ms,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            pkts,
            bytes,
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
        swap_window(buf, 0, 6); // P5 core, one 6-byte packed word
        swap16(buf, 6); // elapsed_ms
        swap32(buf, 8); // pkts
        swap32(buf, 12); // bytes
        swap32(buf, 16); // sIP
        swap32(buf, 20); // dIP
        swap16(buf, 24); // sPort
        swap16(buf, 26); // dPort
    }
}
