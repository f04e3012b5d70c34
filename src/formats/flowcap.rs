//! `Flowcap` (format `0x1C`), versions 5 and 6 (spec.md §6.2, §6.3 / S2).
//!
//! v5 and v6 share the same 38-byte layout and packer; the only
//! difference is that v6's *unpacker* zeroes `application` on read
//! (spec.md §9 Open question 1, preserved verbatim: "if the reader
//! treats v5 as v6 it zeros live data").
//!
//! Layout (38 bytes): `sIP:u32 | dIP:u32 | bytes:u32 | sTime_sec:u32 |
//! elapsed_sec:u16 | sPort:u16 | dPort:u16 | servicePort:u16 | input:u16
//! | output:u16 | pkts:u24 | proto:u8 | flags:u8 | initFlags:u8 |
//! tcpState:u8 | time_frac[3]`. `servicePort` is this crate's home for
//! `Record::application` — spec.md §9's open question calls out
//! "application" by name but the byte table never lists a same-named
//! field, so `servicePort` is read as that slot (the only additional
//! 16-bit hint field in the layout). There is no `restFlags` slot:
//! `rest_flags` is reconstructed as equal to `flags` when `EXPANDED` is
//! set, since the layout has no room to store it independently.
//!
//! `time_frac` packs the sub-second millisecond remainder of both
//! `sTime` and `elapsed` into 3 bytes (10 bits each): byte 0 is
//! `start_msec >> 2`; byte 1 is `(start_msec & 3) << 6 | (elapsed_msec
//! >> 4) & 0x3F`; byte 2 is `(elapsed_msec << 4) & 0xF0` (its low nibble
//! unused). See S2 in spec.md §8 for the worked example.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::bitfield::{swap16, swap32};
use crate::error::{Error, Result};
use crate::formats::shared::saturate_pkts24;
use crate::formats::FormatModule;
use crate::record::{Protocol, Record, TcpFlags, TcpState};

pub struct Flowcap;

const LEN: u16 = 38;

fn pack_time_frac(start_msec: u32, elapsed_msec: u32) -> [u8; 3] {
    [
        ((start_msec >> 2) & 0xFF) as u8,
        (((start_msec & 3) << 6) | ((elapsed_msec >> 4) & 0x3F)) as u8,
        ((elapsed_msec << 4) & 0xF0) as u8,
    ]
}

fn unpack_time_frac(b: [u8; 3]) -> (u32, u32) {
    let start_msec = ((b[0] as u32) << 2) | ((b[1] as u32) >> 6);
    let elapsed_msec = (((b[1] as u32) & 0x3F) << 4) | ((b[2] as u32) >> 4);
    (start_msec, elapsed_msec)
}

impl FormatModule for Flowcap {
    fn record_length(version: u16) -> Option<u16> {
        match version {
            5 | 6 => Some(LEN),
            _ => None,
        }
    }

    fn default_version() -> u16 {
        6
    }

    fn pack(rec: &Record, version: u16, _file_start_ms: u64, out: &mut [u8]) -> Result<()> {
        if !matches!(version, 5 | 6) {
            return Err(Error::UnsupportedVersion {
                format: 0x1C,
                version,
            });
        }
        rec.check_writer_invariants()?;
        if !Record::is_v4_representable(rec.src_ip) || !Record::is_v4_representable(rec.dst_ip) {
            return Err(Error::UnsupportedIpv6);
        }
        if rec.bytes > u32::MAX as u64 {
            return Err(Error::PktsGtBytes {
                pkts: rec.pkts,
                bytes: rec.bytes,
            });
        }

        let start_sec = rec.start_time_ms / 1000;
        if start_sec > u32::MAX as u64 {
            return Err(Error::StartTimeOverflow {
                offset_ms: rec.start_time_ms,
                max_ms: u32::MAX as u64 * 1000,
            });
        }
        let start_msec = (rec.start_time_ms % 1000) as u32;
        let elapsed_sec = (rec.elapsed_ms / 1000).min(0xFFFF);
        let elapsed_msec = rec.elapsed_ms % 1000;
        let pkts24 = saturate_pkts24(rec.pkts);

        let mut c = Cursor::new(out);
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.src_ip).unwrap())?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.dst_ip).unwrap())?;
        c.write_u32::<BigEndian>(rec.bytes as u32)?;
        c.write_u32::<BigEndian>(start_sec as u32)?;
        c.write_u16::<BigEndian>(elapsed_sec as u16)?;
        c.write_u16::<BigEndian>(rec.src_port)?;
        c.write_u16::<BigEndian>(rec.dst_port)?;
        c.write_u16::<BigEndian>(rec.application)?;
        c.write_u16::<BigEndian>(rec.input)?;
        c.write_u16::<BigEndian>(rec.output)?;
        let pkts_bytes = pkts24.to_be_bytes();
        c.write_all(&pkts_bytes[1..4])?; // low 3 bytes, u24
        c.write_u8(rec.protocol.0)?;
        c.write_u8(rec.tcp_flags.bits())?;
        c.write_u8(rec.init_flags.bits())?;
        c.write_u8(rec.tcp_state.to_byte())?;
        c.write_all(&pack_time_frac(start_msec, elapsed_msec))?;
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, _file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        if !matches!(version, 5 | 6) {
            return Err(Error::UnsupportedVersion {
                format: 0x1C,
                version,
            });
        }
        let mut c = Cursor::new(buf);
        let src_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let dst_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let bytes = c.read_u32::<BigEndian>()? as u64;
        let start_sec = c.read_u32::<BigEndian>()? as u64;
        let elapsed_sec = c.read_u16::<BigEndian>()? as u32;
        let src_port = c.read_u16::<BigEndian>()?;
        let dst_port = c.read_u16::<BigEndian>()?;
        let application = c.read_u16::<BigEndian>()?;
        let input = c.read_u16::<BigEndian>()?;
        let output = c.read_u16::<BigEndian>()?;
        let mut pkts24 = [0u8; 4];
        c.read_exact(&mut pkts24[1..4])?;
        let pkts = u32::from_be_bytes(pkts24) as u64;
        let protocol = Protocol(c.read_u8()?);
        let flags = TcpFlags::from_bits_truncate(c.read_u8()?);
        let init_flags = TcpFlags::from_bits_truncate(c.read_u8()?);
        let tcp_state = TcpState::from_byte(c.read_u8()?);
        let mut frac = [0u8; 3];
        c.read_exact(&mut frac)?;
        let (start_msec, elapsed_msec) = unpack_time_frac(frac);

        let rest_flags = if tcp_state.contains(TcpState::EXPANDED) {
            flags
        } else {
            TcpFlags::empty()
        };

        let mut rec = Record {
            start_time_ms: start_sec * 1000 + start_msec as u64,
            elapsed_ms: elapsed_sec * 1000 + elapsed_msec,
            src_ip,
            dst_ip,
            next_hop_ip: Record::from_v4_u32(0, map_to_v6),
            src_port,
            dst_port,
            protocol,
            pkts,
            bytes,
            input,
            output,
            sensor_id: 0,
            flowtype_id: 0,
            tcp_flags: flags,
            init_flags,
            rest_flags,
            tcp_state,
            application: if version == 6 { 0 } else { application },
            memo: 0,
        };
        rec.apply_expanded_fixup();
        Ok(rec)
    }

    fn swap_bytes(buf: &mut [u8], _version: u16) {
        swap32(buf, 0); // sIP
        swap32(buf, 4); // dIP
        swap32(buf, 8); // bytes
        swap32(buf, 12); // sTime_sec
        swap16(buf, 16); // elapsed_sec
        swap16(buf, 18); // sPort
        swap16(buf, 20); // dPort
        swap16(buf, 22); // servicePort
        swap16(buf, 24); // input
        swap16(buf, 26); // output
        // pkts:u24, proto, flags, initFlags, tcpState, time_frac: byte-granular, no swap.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn s2_record() -> Record {
        Record {
            start_time_ms: 1000 * 1000 + 123,
            elapsed_ms: 4500,
            src_ip: Ipv4Addr::new(172, 16, 0, 1).into(),
            dst_ip: Ipv4Addr::new(172, 16, 0, 2).into(),
            src_port: 1234,
            dst_port: 80,
            protocol: Protocol::TCP,
            pkts: 50,
            bytes: 6000,
            application: 80,
            ..Default::default()
        }
    }

    #[test]
    fn s2_millisecond_packing_matches_worked_example() {
        let frac = pack_time_frac(123, 4500 % 1000);
        assert_eq!(frac, [0x1E, 0xDF, 0x40]);
        assert_eq!(unpack_time_frac(frac), (123, 500));
    }

    #[test]
    fn v5_roundtrip_preserves_application() {
        let rec = s2_record();
        let mut buf = [0u8; 38];
        Flowcap::pack(&rec, 5, 0, &mut buf).unwrap();
        let back = Flowcap::unpack(&buf, 5, 0, false).unwrap();
        assert_eq!(back.application, 80);
        assert_eq!(back.start_time_ms, rec.start_time_ms);
        assert_eq!(back.elapsed_ms, rec.elapsed_ms);
        assert_eq!(back.pkts, rec.pkts);
        assert_eq!(back.bytes, rec.bytes);
    }

    #[test]
    fn v6_read_zeroes_application_even_from_v5_bytes() {
        let rec = s2_record();
        let mut buf = [0u8; 38];
        Flowcap::pack(&rec, 5, 0, &mut buf).unwrap();
        let back = Flowcap::unpack(&buf, 6, 0, false).unwrap();
        assert_eq!(back.application, 0);
    }

    #[test]
    fn pkts_saturate_at_24_bits() {
        let rec = Record {
            pkts: 0xFF_FFFF + 100,
            bytes: 0xFF_FFFF + 100,
            ..s2_record()
        };
        let mut buf = [0u8; 38];
        Flowcap::pack(&rec, 5, 0, &mut buf).unwrap();
        let back = Flowcap::unpack(&buf, 5, 0, false).unwrap();
        assert_eq!(back.pkts, 0xFF_FFFF);
    }

    #[test]
    fn elapsed_seconds_saturate_at_16_bits_instead_of_erroring() {
        let rec = Record {
            elapsed_ms: (0x1_0000u64 + 10) as u32 * 1000,
            ..s2_record()
        };
        let mut buf = [0u8; 38];
        assert!(Flowcap::pack(&rec, 5, 0, &mut buf).is_ok());
        let back = Flowcap::unpack(&buf, 5, 0, false).unwrap();
        assert_eq!(back.elapsed_ms, 0xFFFF * 1000);
    }
}
