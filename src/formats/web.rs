//! `Web` (format `0x1F`), version 5 (spec.md §6.2, §6.3 / S5).
//!
//! 22 bytes: the P4 core (times + 14.6 bpp, spec.md §4.2) at bytes
//! 0..=7, a `srv_flg_pkts` word at bytes 8..=11 (20-bit `pkts`, then
//! the 2-bit server-port code, then the 1-bit `src_is_server` flag, 9
//! reserved bits), `sIP` at 12..=15, `dIP` at 16..=19, `clientPort` at
//! 20..=21. `start_ms_offset` is relative to `file_start_ms`
//! (spec.md GLOSSARY "File-start time").

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

use crate::bitfield::{decode_bpp, swap16, swap32, swap64};
use crate::error::{Error, Result};
use crate::formats::shared::{
    decode_web_port, encode_web_port, p4_pack_core, p4_unpack_core, BitReader, BitWriter,
};
use crate::formats::FormatModule;
use crate::record::{Protocol, Record};

pub struct Web;

const LEN: u16 = 22;
const PKTS_MAX: u64 = (1 << 20) - 1;

impl FormatModule for Web {
    fn record_length(version: u16) -> Option<u16> {
        match version {
            5 => Some(LEN),
            _ => None,
        }
    }

    fn default_version() -> u16 {
        5
    }

    fn pack(rec: &Record, version: u16, file_start_ms: u64, out: &mut [u8]) -> Result<()> {
        if version != 5 {
            return Err(Error::UnsupportedVersion {
                format: 0x1F,
                version,
            });
        }
        rec.check_writer_invariants()?;
        if !rec.protocol.is_tcp() {
            return Err(Error::ProtocolMismatch(rec.protocol.0));
        }
        if !Record::is_v4_representable(rec.src_ip) || !Record::is_v4_representable(rec.dst_ip) {
            return Err(Error::UnsupportedIpv6);
        }
        if rec.pkts > PKTS_MAX {
            return Err(Error::PktsOverflow {
                pkts: rec.pkts,
                max: PKTS_MAX,
            });
        }
        if rec.start_time_ms < file_start_ms {
            return Err(Error::StartTimeUnderflow);
        }
        let start_ms_offset = rec.start_time_ms - file_start_ms;

        let core = p4_pack_core(start_ms_offset as u32, rec.elapsed_ms, rec.bytes, rec.pkts)?;

        let (server_port, client_port, src_is_server) = if rec.src_port < rec.dst_port {
            (rec.src_port, rec.dst_port, true)
        } else {
            (rec.dst_port, rec.src_port, false)
        };

        let mut trailer = [0u8; 4];
        let mut w = BitWriter::new(&mut trailer);
        w.write(rec.pkts, 20);
        w.write(encode_web_port(server_port) as u64, 2);
        w.write(src_is_server as u64, 1);
        w.write(0, 9);

        let mut c = Cursor::new(out);
        c.write_all(&core)?;
        c.write_all(&trailer)?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.src_ip).unwrap())?;
        c.write_u32::<BigEndian>(Record::to_v4_u32(rec.dst_ip).unwrap())?;
        c.write_u16::<BigEndian>(client_port)?;
        Ok(())
    }

    fn unpack(buf: &[u8], version: u16, file_start_ms: u64, map_to_v6: bool) -> Result<Record> {
        if version != 5 {
            return Err(Error::UnsupportedVersion {
                format: 0x1F,
                version,
            });
        }
        let core: [u8; 8] = buf[0..8].try_into().unwrap();
        let (start_ms_offset, elapsed_ms, bpp) = p4_unpack_core(&core);

        let trailer: [u8; 4] = buf[8..12].try_into().unwrap();
        let mut r = BitReader::new(&trailer);
        let pkts = r.read(20);
        let server_port_code = r.read(2) as u8;
        let src_is_server = r.read(1) != 0;

        let mut c = Cursor::new(&buf[12..]);
        let src_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let dst_ip = Record::from_v4_u32(c.read_u32::<BigEndian>()?, map_to_v6);
        let client_port = c.read_u16::<BigEndian>()?;
        let server_port = decode_web_port(server_port_code);

        let (src_port, dst_port) = if src_is_server {
            (server_port, client_port)
        } else {
            (client_port, server_port)
        };

        let bytes = decode_bpp(bpp, pkts.max(1));

        Ok(Record {
            start_time_ms: file_start_ms + start_ms_offset as u64,
            elapsed_ms,
            src_ip,
            dst_ip,
            src_port,
            dst_port,
            protocol: Protocol::TCP,
            pkts,
            bytes,
            ..Default::default()
        })
    }

    fn swap_bytes(buf: &mut [u8], _version: u16) {
        swap64(buf, 0); // P4 core (times + bpp), one 8-byte packed word
        swap32(buf, 8); // srv_flg_pkts trailer, one 4-byte packed word
        swap32(buf, 12); // sIP
        swap32(buf, 16); // dIP
        swap16(buf, 20); // clientPort
    }
}
