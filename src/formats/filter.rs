//! `Filter` (format `0x13`), version 2 — spec.md §4.2's older P2 (sbb/pef)
//! quantization.
//!
//! 24 bytes: the 8-byte P2 pack (12-bit start-offset-seconds, 14.6 bpp,
//! 20-bit pkts + multiplier, 11-bit elapsed-seconds) at bytes 0..=7,
//! then `sIP:u32 | dIP:u32 | sPort:u16 | dPort:u16 | proto:u8 |
//! flags:u8 | sensor:u8 | flowtype:u8`. No TCP expansion (`init_flags`/
//! `rest_flags`/`tcp_state` are not representable in this older layout
//! and are dropped on write, empty on read) and no sub-second time
//! resolution — this is the coarsest format in the catalog, matching
//! its role as a lightweight pre-filter record.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::bitfield::{swap16, swap32, swap64};
use crate::error::{Error, Result};
use crate::formats::shared::{check_sensor_u8, p2_pack, p2_unpack};
use crate::formats::FormatModule;
use crate::record::{Protocol, Record, TcpFlags};

pub struct Filter;

const LEN: u16 = 24;

impl FormatModule for Filter {
    fn record_length(version: u16) -> Option<u16> {
        match version {
            2 => Some(LEN),
            _ => None,
        }
    }

    fn default_version() -> u16 {
        2
    }

    fn pack(rec: &Record, version: u16, file_start_ms: u64, out: &mut [u8]) -> Result<()> {
        if version != 2 {
            return Err(Error::UnsupportedVersion {
                format: 0x13,
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
        let start_offset_sec = ((rec.start_time_ms - file_start_ms) / 1000) as u32;
        let elapsed_sec = rec.elapsed_ms / 1000;
        let sensor = check_sensor_u8(rec.sensor_id as u32)?;
        let core = p2_pack(start_offset_sec, rec.bytes, rec.pkts, elapsed_sec)?;

        let mut c = Cursor::new(out);
        c.write_all(&core)?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.src_ip).unwrap())?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.dst_ip).unwrap())?;
        c.write_u16::<BigEndian>(rec.src_port)?;
        c.write_u16::<BigEndian>(rec.dst_port)?;
        c.write_u8(rec.protocol.0)?;
        c.write_u8(rec.tcp_flags.bits())?;
        c.write_u8(sensor)?;
        c.write_u8(rec.flowtype_id as u8)?;
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        if version != 2 {
            return Err(Error::UnsupportedVersion {
                format: 0x13,
                version,
            });
        }
        let core: [u8; 8] = buf[0..8].try_into().unwrap();
        let (start_offset_sec, bytes, pkts, elapsed_sec) = p2_unpack(&core);

        let mut c = Cursor::new(&buf[8..]);
        let src_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let dst_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let src_port = c.read_u16::<BigEndian>()?;
        let dst_port = c.read_u16::<BigEndian>()?;
        let protocol = Protocol(c.read_u8()?);
        let tcp_flags = TcpFlags::from_bits_truncate(c.read_u8()?);
        let sensor_id = c.read_u8()? as u16;
        let flowtype_id = c.read_u8()? as u16;

        Ok(Record {
            start_time_ms: file_start_ms + start_offset_sec as u64 * 1000,
            elapsed_ms: elapsed_sec * 1000,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol,
            pkts,
            bytes,
            sensor_id,
            flowtype_id,
            tcp_flags,
            ..Default::default()
        })
    }

    fn swap_bytes(buf: &mut [u8], _version: u16) {
        swap64(buf, 0); // P2 core, one 8-byte packed word
        swap32(buf, 8); // sIP
        swap32(buf, 12); // dIP
        swap16(buf, 16); // sPort
        swap16(buf, 18); // dPort
        // proto, flags, sensor, flowtype: single bytes.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn filter_record() -> Record {
        Record {
            start_time_ms: 2_000_000_000,
            elapsed_ms: 9000,
            src_ip: Ipv4Addr::new(198, 51, 100, 7).into(),
            dst_ip: Ipv4Addr::new(203, 0, 113, 9).into(),
            src_port: 5000,
            dst_port: 22,
            protocol: Protocol::TCP,
            tcp_flags: TcpFlags::SYN | TcpFlags::ACK,
            pkts: 12,
            bytes: 6000,
            sensor_id: 200,
            flowtype_id: 3,
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip_recovers_coarse_fields() {
        let rec = filter_record();
        let mut buf = [0u8; LEN as usize];
        Filter::pack(&rec, 2, 2_000_000_000 - 5000, &mut buf).unwrap();
        let back = Filter::unpack(&buf, 2, 2_000_000_000 - 5000, false).unwrap();
        assert_eq!(back.src_ip, rec.src_ip);
        assert_eq!(back.dst_ip, rec.dst_ip);
        assert_eq!(back.src_port, rec.src_port);
        assert_eq!(back.dst_port, rec.dst_port);
        assert_eq!(back.sensor_id, rec.sensor_id);
        assert_eq!(back.flowtype_id, rec.flowtype_id);
        assert_eq!(back.tcp_flags, rec.tcp_flags);
        assert!(back.bytes.abs_diff(rec.bytes) <= rec.pkts / 64 + 1);
    }

    #[test]
    fn sensor_over_255_is_rejected() {
        let rec = Record {
            sensor_id: 300,
            ..filter_record()
        };
        let mut buf = [0u8; LEN as usize];
        assert!(matches!(
            Filter::pack(&rec, 2, 0, &mut buf),
            Err(Error::SensorOverflow(300))
        ));
    }
}
