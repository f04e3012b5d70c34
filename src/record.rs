//! The in-memory flow record (spec.md §3.1).
//!
//! `Record` is caller-owned: the codec never keeps one alive past a
//! single `pack`/`unpack` call. IP addresses use `std::net::IpAddr`
//! directly — it is already the "mixed IPv4/IPv6 record → sum type"
//! the on-disk layouts need, so there is no reason to wrap it again.
//! `TcpFlags`/`TcpState` are `bitflags`-derived the way
//! `Its-its-archiver`'s RAR header module derives `ArchiveFlags` /
//! `HeaderFlags`, except `TcpState` preserves unrecognized bits
//! (`from_bits_retain`) since spec.md calls everything but `EXPANDED`
//! opaque and round-trip fidelity depends on keeping those bits intact.

use std::net::{IpAddr, Ipv4Addr};

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// TCP control-bit flags (`tcp_flags`, `init_flags`, `rest_flags`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct TcpFlags: u8 {
        const FIN = 0b0000_0001;
        const SYN = 0b0000_0010;
        const RST = 0b0000_0100;
        const PSH = 0b0000_1000;
        const ACK = 0b0001_0000;
        const URG = 0b0010_0000;
        const ECE = 0b0100_0000;
        const CWR = 0b1000_0000;
    }
}

bitflags! {
    /// `tcp_state`: a bitfield where only `EXPANDED` is named; the rest
    /// of the byte is opaque to the codec but must still round-trip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
    pub struct TcpState: u8 {
        /// When set, `init_flags`/`rest_flags` are meaningful and
        /// independent of the combined `tcp_flags`.
        const EXPANDED = 0b1000_0000;
    }
}

impl TcpState {
    /// Builds a `TcpState` preserving every bit of `byte`, named or not.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        TcpState::from_bits_retain(byte)
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self.bits()
    }
}

/// IP protocol number (spec.md §3.1 `protocol`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Protocol(pub u8);

impl Protocol {
    pub const TCP: Protocol = Protocol(6);
    pub const UDP: Protocol = Protocol(17);
    pub const ICMP: Protocol = Protocol(1);

    #[inline]
    pub fn is_tcp(self) -> bool {
        self == Self::TCP
    }
}

impl From<u8> for Protocol {
    fn from(v: u8) -> Self {
        Protocol(v)
    }
}

impl From<Protocol> for u8 {
    fn from(p: Protocol) -> Self {
        p.0
    }
}

/// The in-memory flow record. See spec.md §3.1 for the field semantics
/// and invariants.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    pub start_time_ms: u64,
    pub elapsed_ms: u32,
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub next_hop_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub pkts: u64,
    pub bytes: u64,
    pub input: u16,
    pub output: u16,
    pub sensor_id: u16,
    pub flowtype_id: u16,
    pub tcp_flags: TcpFlags,
    pub init_flags: TcpFlags,
    pub rest_flags: TcpFlags,
    pub tcp_state: TcpState,
    pub application: u16,
    pub memo: u16,
}

impl Default for Record {
    fn default() -> Self {
        Record {
            start_time_ms: 0,
            elapsed_ms: 0,
            src_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dst_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            next_hop_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            src_port: 0,
            dst_port: 0,
            protocol: Protocol(0),
            pkts: 0,
            bytes: 0,
            input: 0,
            output: 0,
            sensor_id: 0,
            flowtype_id: 0,
            tcp_flags: TcpFlags::empty(),
            init_flags: TcpFlags::empty(),
            rest_flags: TcpFlags::empty(),
            tcp_state: TcpState::empty(),
            application: 0,
            memo: 0,
        }
    }
}

impl Record {
    /// Checks the two invariants every count-storing format enforces on
    /// write: `pkts > 0`, and `bytes >= pkts` whenever `pkts > 0`.
    pub fn check_writer_invariants(&self) -> Result<()> {
        if self.pkts == 0 {
            return Err(Error::PktsZero);
        }
        if self.bytes < self.pkts {
            return Err(Error::PktsGtBytes {
                pkts: self.pkts,
                bytes: self.bytes,
            });
        }
        Ok(())
    }

    /// The compatibility fix-up of spec.md §3.1/§4.2
    /// (`RWREC_MAYBE_CLEAR_TCPSTATE_EXPANDED`): a bug in pre-3.6 writers
    /// could set `EXPANDED` spuriously on non-TCP records or records
    /// whose init/rest flags were both zero. Decoders that are
    /// vulnerable to that bug call this after decoding; formats that
    /// never produced such files may opt out (documented at the call
    /// site).
    pub fn apply_expanded_fixup(&mut self) {
        if self.tcp_state.contains(TcpState::EXPANDED)
            && (!self.protocol.is_tcp() || (self.init_flags.is_empty() && self.rest_flags.is_empty()))
        {
            tracing::warn!(
                protocol = self.protocol.0,
                "clearing spurious tcp_state.EXPANDED bit (pre-3.6 writer compatibility fix-up)"
            );
            self.tcp_state.remove(TcpState::EXPANDED);
            self.init_flags = TcpFlags::empty();
            self.rest_flags = TcpFlags::empty();
        }
    }

    /// `true` if `ip` is IPv4, or IPv6 within `::ffff:0:0/96` (i.e. an
    /// IPv4-mapped address an IPv4-only format could still represent).
    pub fn is_v4_representable(ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(_) => true,
            IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some(),
        }
    }

    /// Returns the 32-bit IPv4 representation of `ip`, treating an
    /// IPv4-mapped IPv6 address as its embedded IPv4 address.
    pub fn to_v4_u32(ip: IpAddr) -> Option<u32> {
        match ip {
            IpAddr::V4(v4) => Some(u32::from(v4)),
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(u32::from),
        }
    }

    /// Builds an `IpAddr` from a 32-bit value read off the wire, either
    /// natively as IPv4 or mapped into `::ffff:0:0/96` for a v6-capable
    /// reader (spec.md §4.2 "IP version policy").
    pub fn from_v4_u32(value: u32, map_to_v6: bool) -> IpAddr {
        let v4 = Ipv4Addr::from(value);
        if map_to_v6 {
            IpAddr::V6(v4.to_ipv6_mapped())
        } else {
            IpAddr::V4(v4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_tcp_record() -> Record {
        Record {
            protocol: Protocol::TCP,
            pkts: 10,
            bytes: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn writer_invariants_reject_zero_pkts() {
        let r = Record {
            pkts: 0,
            ..base_tcp_record()
        };
        assert!(matches!(
            r.check_writer_invariants(),
            Err(Error::PktsZero)
        ));
    }

    #[test]
    fn writer_invariants_reject_pkts_gt_bytes() {
        let r = Record {
            pkts: 100,
            bytes: 5,
            ..base_tcp_record()
        };
        assert!(matches!(
            r.check_writer_invariants(),
            Err(Error::PktsGtBytes { .. })
        ));
    }

    #[test]
    fn writer_invariants_accept_well_formed_record() {
        assert!(base_tcp_record().check_writer_invariants().is_ok());
    }

    #[test]
    fn expanded_fixup_clears_on_non_tcp() {
        let mut r = Record {
            protocol: Protocol::UDP,
            tcp_state: TcpState::EXPANDED,
            init_flags: TcpFlags::SYN,
            rest_flags: TcpFlags::ACK,
            ..Default::default()
        };
        r.apply_expanded_fixup();
        assert!(!r.tcp_state.contains(TcpState::EXPANDED));
        assert_eq!(r.init_flags, TcpFlags::empty());
        assert_eq!(r.rest_flags, TcpFlags::empty());
    }

    #[test]
    fn expanded_fixup_clears_when_both_flag_sets_zero() {
        let mut r = Record {
            protocol: Protocol::TCP,
            tcp_state: TcpState::EXPANDED,
            init_flags: TcpFlags::empty(),
            rest_flags: TcpFlags::empty(),
            ..Default::default()
        };
        r.apply_expanded_fixup();
        assert!(!r.tcp_state.contains(TcpState::EXPANDED));
    }

    #[test]
    fn expanded_fixup_preserves_legitimate_expansion() {
        let mut r = Record {
            protocol: Protocol::TCP,
            tcp_state: TcpState::EXPANDED,
            init_flags: TcpFlags::SYN,
            rest_flags: TcpFlags::ACK,
            ..Default::default()
        };
        r.apply_expanded_fixup();
        assert!(r.tcp_state.contains(TcpState::EXPANDED));
        assert_eq!(r.init_flags, TcpFlags::SYN);
        assert_eq!(r.rest_flags, TcpFlags::ACK);
    }

    #[test]
    fn tcp_state_preserves_opaque_bits() {
        let raw = 0b1010_0001u8;
        let state = TcpState::from_byte(raw);
        assert!(state.contains(TcpState::EXPANDED));
        assert_eq!(state.to_byte(), raw);
    }

    #[test]
    fn v4_mapped_v6_is_representable() {
        let mapped: IpAddr = "::ffff:10.0.0.1".parse().unwrap();
        assert!(Record::is_v4_representable(mapped));
        assert_eq!(Record::to_v4_u32(mapped), Some(u32::from(Ipv4Addr::new(10, 0, 0, 1))));
    }

    #[test]
    fn native_v6_is_not_v4_representable() {
        let native: IpAddr = "2001:db8::1".parse().unwrap();
        assert!(!Record::is_v4_representable(native));
        assert_eq!(Record::to_v4_u32(native), None);
    }
}
