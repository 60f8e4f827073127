//! Crafting and parsing of raw IPv4/UDP datagrams with checksum control.
//!
//! The covert channel's entire substrate is whether the UDP checksum
//! field is computed or left at `0x0000` -- both are legal for UDP over
//! IPv4 (RFC 768), so a conforming receiver cannot tell the difference
//! from a corrupted packet.

use std::net::Ipv4Addr;

use derive_more::{Display, Error};
use pnet_packet::{
    ip::IpNextHeaderProtocols,
    ipv4::{self, Ipv4Packet, MutableIpv4Packet},
    udp::{self, MutableUdpPacket, UdpPacket},
    Packet,
};

use crate::UDP_HEADER_LEN;

const IPV4_HEADER_LEN: usize = 20;

/// A datagram could not be built because the payload is too large to fit
/// in a UDP length field.
#[derive(Debug, Display, Error)]
#[display("payload of {len} bytes plus the UDP header exceeds u16::MAX")]
pub struct BuildDatagramError {
    len: usize,
}

/// Builds a full IPv4 + UDP datagram (no Ethernet framing) with `payload`
/// as the UDP body.
///
/// When `compute_checksum` is `true` the UDP checksum is computed per
/// RFC 768 (`bit = 1`); when `false` it is left at `0x0000`, which is
/// legal for UDP over IPv4 and is how `bit = 0` is encoded on the wire.
///
/// The IP header's own checksum is always computed correctly -- only the
/// UDP checksum carries covert meaning.
pub fn build_datagram(
    src_ip: Ipv4Addr,
    dst_ip: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
    compute_checksum: bool,
) -> Result<Vec<u8>, BuildDatagramError> {
    let udp_len = UDP_HEADER_LEN + payload.len();
    if udp_len > usize::from(u16::MAX) {
        return Err(BuildDatagramError { len: payload.len() });
    }
    let total_len = IPV4_HEADER_LEN + udp_len;

    let mut buf = vec![0u8; total_len];

    {
        let mut ip_packet =
            MutableIpv4Packet::new(&mut buf).expect("buffer is sized for an IPv4 header");
        ip_packet.set_version(4);
        ip_packet.set_header_length((IPV4_HEADER_LEN / 4) as u8);
        ip_packet.set_total_length(total_len as u16);
        ip_packet.set_ttl(64);
        ip_packet.set_next_level_protocol(IpNextHeaderProtocols::Udp);
        ip_packet.set_source(src_ip);
        ip_packet.set_destination(dst_ip);
        let checksum = ipv4::checksum(&ip_packet.to_immutable());
        ip_packet.set_checksum(checksum);
    }

    {
        let mut udp_packet = MutableUdpPacket::new(&mut buf[IPV4_HEADER_LEN..])
            .expect("buffer is sized for the UDP header and payload");
        udp_packet.set_source(src_port);
        udp_packet.set_destination(dst_port);
        udp_packet.set_length(udp_len as u16);
        udp_packet.set_payload(payload);
        if compute_checksum {
            let checksum = udp::ipv4_checksum(&udp_packet.to_immutable(), &src_ip, &dst_ip);
            udp_packet.set_checksum(checksum);
        } else {
            udp_packet.set_checksum(0);
        }
    }

    Ok(buf)
}

/// A datagram as seen by the receiver: where it came from, what ports it
/// used, the covert bit carried in its checksum field, and its visible
/// payload.
#[derive(Debug, Clone)]
pub struct ParsedDatagram {
    pub src_ip: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub checksum_present: bool,
    pub payload: Vec<u8>,
}

/// Parses a raw IPv4 datagram captured off a raw socket, extracting the
/// fields the receiver needs. Returns `None` if the buffer isn't a valid
/// IPv4/UDP datagram.
#[must_use]
pub fn parse_datagram(datagram: &[u8]) -> Option<ParsedDatagram> {
    let ip_packet = Ipv4Packet::new(datagram)?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    let src_ip = ip_packet.get_source();
    let ihl = usize::from(ip_packet.get_header_length()) * 4;
    let udp_packet = UdpPacket::new(datagram.get(ihl..)?)?;

    Some(ParsedDatagram {
        src_ip,
        src_port: udp_packet.get_source(),
        dst_port: udp_packet.get_destination(),
        checksum_present: udp_packet.get_checksum() != 0,
        payload: udp_packet.payload().to_vec(),
    })
}

/// Reads just the covert bit out of a raw IPv4 datagram: `Some(true)`
/// when the UDP checksum field is non-zero, `Some(false)` when it is
/// exactly zero, `None` if this isn't a UDP-over-IPv4 datagram.
#[must_use]
pub fn udp_checksum_present(datagram: &[u8]) -> Option<bool> {
    parse_datagram(datagram).map(|d| d.checksum_present)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

    #[test]
    fn bit_one_sets_nonzero_checksum() {
        let datagram = build_datagram(SRC, DST, 9999, 8888, b"[0]hi", true).expect("builds");
        assert_eq!(udp_checksum_present(&datagram), Some(true));
    }

    #[test]
    fn bit_zero_zeroes_checksum() {
        let datagram = build_datagram(SRC, DST, 9999, 8888, b"[0]hi", false).expect("builds");
        assert_eq!(udp_checksum_present(&datagram), Some(false));
    }

    #[test]
    fn payload_and_ports_round_trip() {
        let datagram = build_datagram(SRC, DST, 9999, 8888, b"[3]chunk", true).expect("builds");
        let parsed = parse_datagram(&datagram).expect("valid datagram");
        assert_eq!(parsed.src_ip, SRC);
        assert_eq!(parsed.src_port, 9999);
        assert_eq!(parsed.dst_port, 8888);
        assert_eq!(parsed.payload, b"[3]chunk");
    }
}
