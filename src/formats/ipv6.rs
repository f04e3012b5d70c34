//! `IPv6` (format `0x0B`), version 1 — spec.md §4.2's "v6-capable
//! format reads v4 bytes" policy exercised for real: the same field set
//! as [`super::generic::Generic`] v5, but `sIP`/`dIP`/`nhIP` are native
//! 16-byte addresses instead of 4-byte ones.
//!
//! 88 bytes: `sTime:i64@0 | elapsed:u32@8 | sPort:u16@12 | dPort:u16@14
//! | proto:u8@16 | flowtype:u8@17 | sensor:u16@18 | flags:u8@20 |
//! initFlags:u8@21 | restFlags:u8@22 | tcpState:u8@23 |
//! application:u16@24 | memo:u16@26 | input:u16@28 | output:u16@30 |
//! pkts:u32@32 | bytes:u32@36 | sIP:[u8;16]@40 | dIP:[u8;16]@56 |
//! nhIP:[u8;16]@72`. A v4 or v4-mapped address is written as its
//! `::ffff:0:0/96`-mapped 16-byte form; on read, a mapped address
//! collapses back to native `IpAddr::V4` unless `map_to_v6` is set.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use std::net::{IpAddr, Ipv6Addr};

use crate::bitfield::{swap16, swap32, swap64, swap_window};
use crate::error::{Error, Result};
use crate::formats::FormatModule;
use crate::record::{Protocol, Record, TcpFlags, TcpState};

pub struct Ipv6;

const LEN: u16 = 88;

fn to_v6_octets(ip: IpAddr) -> [u8; 16] {
    match ip {
        IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        IpAddr::V6(v6) => v6.octets(),
    }
}

fn from_v6_octets(octets: [u8; 16], map_to_v6: bool) -> IpAddr {
    let v6 = Ipv6Addr::from(octets);
    if !map_to_v6 {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return IpAddr::V4(v4);
        }
    }
    IpAddr::V6(v6)
}

impl FormatModule for Ipv6 {
    fn record_length(version: u16) -> Option<u16> {
        match version {
            1 => Some(LEN),
            _ => None,
        }
    }

    fn default_version() -> u16 {
        1
    }

    fn pack(rec: &Record, version: u16, _file_start_ms: u64, out: &mut [u8]) -> Result<()> {
        if version != 1 {
            return Err(Error::UnsupportedVersion {
                format: 0x0B,
                version,
            });
        }
        rec.check_writer_invariants()?;
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
        c.write_u16::<BigEndian>(rec.application)?;
        c.write_u16::<BigEndian>(rec.memo)?;
        c.write_u16::<BigEndian>(rec.input)?;
        c.write_u16::<BigEndian>(rec.output)?;
        c.write_u32::<BigEndian>(rec.pkts as u32)?;
        c.write_u32::<BigEndian>(rec.bytes as u32)?;
        let buf = c.into_inner();
        buf[40..56].copy_from_slice(&to_v6_octets(rec.src_ip));
        buf[56..72].copy_from_slice(&to_v6_octets(rec.dst_ip));
        buf[72..88].copy_from_slice(&to_v6_octets(rec.next_hop_ip));
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, _file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        if version != 1 {
            return Err(Error::UnsupportedVersion {
                format: 0x0B,
                version,
            });
        }
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
        let application = c.read_u16::<BigEndian>()?;
        let memo = c.read_u16::<BigEndian>()?;
        let input = c.read_u16::<BigEndian>()?;
        let output = c.read_u16::<BigEndian>()?;
        let pkts = c.read_u32::<BigEndian>()? as u64;
        let bytes = c.read_u32::<BigEndian>()? as u64;

        let src_ip = from_v6_octets(buf[40..56].try_into().unwrap(), map_to_v6);
        let dst_ip = from_v6_octets(buf[56..72].try_into().unwrap(), map_to_v6);
        let next_hop_ip = from_v6_octets(buf[72..88].try_into().unwrap(), map_to_v6);

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

    fn swap_bytes(buf: &mut [u8], _version: u16) {
        swap64(buf, 0); // sTime
        swap32(buf, 8); // elapsed
        swap16(buf, 12); // sPort
        swap16(buf, 14); // dPort
        swap16(buf, 18); // sensor
        swap16(buf, 24); // application
        swap16(buf, 26); // memo
        swap16(buf, 28); // input
        swap16(buf, 30); // output
        swap32(buf, 32); // pkts
        swap32(buf, 36); // bytes
        // sIP/dIP/nhIP are each a single 16-byte address window, not a
        // sequence of smaller integers: reverse as one block each.
        swap_window(buf, 40, 16);
        swap_window(buf, 56, 16);
        swap_window(buf, 72, 16);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Protocol;

    fn v6_record() -> Record {
        Record {
            start_time_ms: 1_650_000_000_000,
            elapsed_ms: 2000,
            src_ip: "2001:db8::1".parse().unwrap(),
            dst_ip: "2001:db8::2".parse().unwrap(),
            next_hop_ip: "2001:db8::fe".parse().unwrap(),
            src_port: 443,
            dst_port: 51000,
            protocol: Protocol::TCP,
            pkts: 20,
            bytes: 30_000,
            sensor_id: 9,
            flowtype_id: 1,
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip_preserves_native_v6_addresses() {
        let rec = v6_record();
        let mut buf = [0u8; LEN as usize];
        Ipv6::pack(&rec, 1, 0, &mut buf).unwrap();
        let back = Ipv6::unpack(&buf, 1, 0, true).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn v4_mapped_address_collapses_back_to_v4_when_not_requested() {
        use std::net::Ipv4Addr;
        let rec = Record {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            ..v6_record()
        };
        let mut buf = [0u8; LEN as usize];
        Ipv6::pack(&rec, 1, 0, &mut buf).unwrap();
        let back = Ipv6::unpack(&buf, 1, 0, false).unwrap();
        assert_eq!(back.src_ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn v4_mapped_address_stays_mapped_when_requested() {
        use std::net::Ipv4Addr;
        let rec = Record {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            ..v6_record()
        };
        let mut buf = [0u8; LEN as usize];
        Ipv6::pack(&rec, 1, 0, &mut buf).unwrap();
        let back = Ipv6::unpack(&buf, 1, 0, true).unwrap();
        assert!(matches!(back.src_ip, IpAddr::V6(_)));
    }
}
