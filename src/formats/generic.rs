//! `Generic` (format `0x16`), versions 1–5 (spec.md §6.2, §6.3).
//!
//! The only format that stores every field at full precision: `sTime`
//! and `elapsed` are plain millisecond counts (no file-start-hour offset,
//! no seconds/fraction split), `pkts`/`bytes` are raw 32-bit counts (no
//! 14.6 BPP quantization), and addresses are plain 32-bit IPv4. Versions
//! 1–4 are narrower prefixes of v5's field set; v4 and v3 share a record
//! length (a version bump with no layout change, the way `Flowcap`
//! v5/v6 share one). v5 is the byte-exact 52-byte layout of §6.3 / S1.
//!
//! Field layout (v5, 52 bytes, all offsets from record start):
//! `sTime:i64@0 | elapsed:u32@8 | sPort:u16@12 | dPort:u16@14 |
//! proto:u8@16 | flowtype:u8@17 | sensor:u16@18 | flags:u8@20 |
//! initFlags:u8@21 | restFlags:u8@22 | tcpState:u8@23 |
//! application:u16@24 | memo:u16@26 | input:u16@28 | output:u16@30 |
//! pkts:u32@32 | bytes:u32@36 | sIP:u32@40 | dIP:u32@44 | nhIP:u32@48`.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

use crate::bitfield::{swap16, swap32, swap64};
use crate::error::{Error, Result};
use crate::formats::FormatModule;
use crate::record::{Protocol, Record, TcpFlags, TcpState};

pub struct Generic;

#[derive(Clone, Copy)]
struct Layout {
    len: u16,
    has_application_memo: (bool, bool),
    has_nh_ip: bool,
}

fn layout(version: u16) -> Option<Layout> {
    match version {
        1 => Some(Layout {
            len: 44,
            has_application_memo: (false, false),
            has_nh_ip: false,
        }),
        2 => Some(Layout {
            len: 46,
            has_application_memo: (true, false),
            has_nh_ip: false,
        }),
        3 | 4 => Some(Layout {
            len: 48,
            has_application_memo: (true, true),
            has_nh_ip: false,
        }),
        5 => Some(Layout {
            len: 52,
            has_application_memo: (true, true),
            has_nh_ip: true,
        }),
        _ => None,
    }
}

impl FormatModule for Generic {
    fn record_length(version: u16) -> Option<u16> {
        layout(version).map(|l| l.len)
    }

    fn default_version() -> u16 {
        5
    }

    fn pack(rec: &Record, version: u16, _file_start_ms: u64, out: &mut [u8]) -> Result<()> {
        let layout = layout(version).ok_or(Error::UnsupportedVersion {
            format: 0x16,
            version,
        })?;
        rec.check_writer_invariants()?;
        if !Record::is_v4_representable(rec.src_ip)
            || !Record::is_v4_representable(rec.dst_ip)
            || (layout.has_nh_ip && !Record::is_v4_representable(rec.next_hop_ip))
        {
            return Err(Error::UnsupportedIpv6);
        }
        if rec.elapsed_ms as u64 > u32::MAX as u64 {
            return Err(Error::ElapsedOverflow {
                elapsed_ms: rec.elapsed_ms as u64,
                max_ms: u32::MAX as u64,
            });
        }
        if rec.pkts > u32::MAX as u64 {
            return Err(Error::PktsOverflow {
                pkts: rec.pkts,
                max: u32::MAX as u64,
            });
        }

        let mut c = Cursor::new(out);
        c.write_i64::<BigEndian>(rec.start_time_ms as i64)?;
        c.write_u32::<BigEndian>(rec.elapsed_ms)?;
        c.write_u16::<BigEndian>(rec.src_port)?;
        c.write_u16::<BigEndian>(rec.dst_port)?;
        c.write_u8(rec.protocol.0)?;
        c.write_u8(rec.flowtype_id as u8)?;
        c.write_u16::<BigEndian>(rec.sensor_id)?;
        c.write_u8(rec.tcp_flags.bits())?;
        c.write_u8(rec.init_flags.bits())?;
        c.write_u8(rec.rest_flags.bits())?;
        c.write_u8(rec.tcp_state.to_byte())?;
        if layout.has_application_memo.0 {
            c.write_u16::<BigEndian>(rec.application)?;
        }
        if layout.has_application_memo.1 {
            c.write_u16::<BigEndian>(rec.memo)?;
        }
        c.write_u16::<BigEndian>(rec.input)?;
        c.write_u16::<BigEndian>(rec.output)?;
        c.write_u32::<BigEndian>(rec.pkts as u32)?;
        c.write_u32::<BigEndian>(rec.bytes as u32)?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.src_ip).unwrap())?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.dst_ip).unwrap())?;
        if layout.has_nh_ip {
            c.write_u32::<BigEndian>(Record::to_v4_u32(rec.next_hop_ip).unwrap())?;
        }
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, _file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        let layout = layout(version).ok_or(Error::UnsupportedVersion {
            format: 0x16,
            version,
        })?;
        let mut c = Cursor::new(buf);
        let start_time_ms = c.read_i64::<BigEndian>()? as u64;
        let elapsed_ms = c.read_u32::<BigEndian>()?;
        let src_port = c.read_u16::<BigEndian>()?;
        let dst_port = c.read_u16::<BigEndian>()?;
        let protocol = Protocol(c.read_u8()?);
        let flowtype_id = c.read_u8()? as u16;
        let sensor_id = c.read_u16::<BigEndian>()?;
        let flags = TcpFlags::from_bits_truncate(c.read_u8()?);
        let init_flags = TcpFlags::from_bits_truncate(c.read_u8()?);
        let rest_flags = TcpFlags::from_bits_truncate(c.read_u8()?);
        let tcp_state = TcpState::from_byte(c.read_u8()?);
        let application = if layout.has_application_memo.0 {
            c.read_u16::<BigEndian>()?
        } else {
            0
        };
        let memo = if layout.has_application_memo.1 {
            c.read_u16::<BigEndian>()?
        } else {
            0
        };
        let input = c.read_u16::<BigEndian>()?;
        let output = c.read_u16::<BigEndian>()?;
        let pkts = c.read_u32::<BigEndian>()? as u64;
        let bytes = c.read_u32::<BigEndian>()? as u64;
        let src_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let dst_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let next_hop_ip = if layout.has_nh_ip {
            Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6)
        } else {
            Record::from_v4_u32(0, map_to_v6)
        };

        let mut rec = Record {
            start_time_ms,
            elapsed_ms,
            src_ip,
            dst_ip,
            next_hop_ip,
            src_port,
            dst_port,
            protocol,
            pkts,
            bytes,
            input,
            output,
            sensor_id,
            flowtype_id,
            tcp_flags: flags,
            init_flags,
            rest_flags,
            tcp_state,
            application,
            memo,
        };
        rec.apply_expanded_fixup();
        Ok(rec)
    }

    fn swap_bytes(buf: &mut [u8], version: u16) {
        let Some(layout) = layout(version) else {
            return;
        };
        swap64(buf, 0); // sTime
        swap32(buf, 8); // elapsed
        swap16(buf, 12); // sPort
        swap16(buf, 14); // dPort
        // proto, flowtype: single bytes, no swap needed.
        swap16(buf, 18); // sensor
        // flags, initFlags, restFlags, tcpState: single bytes.
        let mut pos = 24;
        if layout.has_application_memo.0 {
            swap16(buf, pos);
            pos += 2;
        }
        if layout.has_application_memo.1 {
            swap16(buf, pos);
            pos += 2;
        }
        swap16(buf, pos); // input
        swap16(buf, pos + 2); // output
        swap32(buf, pos + 4); // pkts
        swap32(buf, pos + 8); // bytes
        swap32(buf, pos + 12); // sIP
        swap32(buf, pos + 16); // dIP
        if layout.has_nh_ip {
            swap32(buf, pos + 20); // nhIP
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn s1_record() -> Record {
        Record {
            start_time_ms: 1_577_836_800_123,
            elapsed_ms: 4500,
            src_ip: Ipv4Addr::new(10, 1, 2, 3).into(),
            dst_ip: Ipv4Addr::new(10, 4, 5, 6).into(),
            next_hop_ip: Ipv4Addr::new(10, 0, 0, 1).into(),
            src_port: 443,
            dst_port: 54321,
            protocol: Protocol::TCP,
            pkts: 100,
            bytes: 150_000,
            input: 10,
            output: 20,
            sensor_id: 42,
            flowtype_id: 1,
            tcp_flags: TcpFlags::from_bits_truncate(0x1B),
            init_flags: TcpFlags::from_bits_truncate(0x02),
            rest_flags: TcpFlags::from_bits_truncate(0x19),
            tcp_state: TcpState::from_byte(0x80),
            application: 443,
            memo: 0,
        }
    }

    const S1_BYTES: [u8; 52] = [
        0x00, 0x00, 0x01, 0x6F, 0x5E, 0x66, 0xE8, 0x7B, 0x00, 0x00, 0x11, 0x94, 0x01, 0xBB, 0xD4,
        0x31, 0x06, 0x01, 0x00, 0x2A, 0x1B, 0x02, 0x19, 0x80, 0x01, 0xBB, 0x00, 0x00, 0x00, 0x0A,
        0x00, 0x14, 0x00, 0x00, 0x00, 0x64, 0x00, 0x02, 0x49, 0xF0, 0x0A, 0x01, 0x02, 0x03, 0x0A,
        0x04, 0x05, 0x06, 0x0A, 0x00, 0x00, 0x01,
    ];

    #[test]
    fn s1_generic_v5_pack_is_byte_exact() {
        let mut buf = [0u8; 52];
        Generic::pack(&s1_record(), 5, 0, &mut buf).unwrap();
        assert_eq!(buf, S1_BYTES);
    }

    #[test]
    fn s1_generic_v5_unpack_matches_record() {
        let rec = Generic::unpack(&S1_BYTES, 5, 0, false).unwrap();
        assert_eq!(rec, s1_record());
    }

    #[test]
    fn s4_generic_v3_rejects_zero_pkts() {
        let rec = Record {
            pkts: 0,
            ..s1_record()
        };
        let mut buf = [0u8; 48];
        assert!(matches!(
            Generic::pack(&rec, 3, 0, &mut buf),
            Err(Error::PktsZero)
        ));
        assert_eq!(buf, [0u8; 48]);
    }

    #[test]
    fn v1_omits_application_memo_and_next_hop() {
        let rec = s1_record();
        let mut buf = [0u8; 44];
        Generic::pack(&rec, 1, 0, &mut buf).unwrap();
        let back = Generic::unpack(&buf, 1, 0, false).unwrap();
        assert_eq!(back.application, 0);
        assert_eq!(back.memo, 0);
        assert_eq!(back.next_hop_ip, Ipv4Addr::UNSPECIFIED);
        assert_eq!(back.src_ip, rec.src_ip);
        assert_eq!(back.pkts, rec.pkts);
    }

    #[test]
    fn v3_and_v4_share_record_length() {
        assert_eq!(Generic::record_length(3), Generic::record_length(4));
    }

    #[test]
    fn rejects_ipv6_source_address() {
        let rec = Record {
            src_ip: "2001:db8::1".parse().unwrap(),
            ..s1_record()
        };
        let mut buf = [0u8; 52];
        assert!(matches!(
            Generic::pack(&rec, 5, 0, &mut buf),
            Err(Error::UnsupportedIpv6)
        ));
    }
}
