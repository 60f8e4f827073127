//! Ethernet-frame-level rewriting used by the in-path processor.
//!
//! The processor receives and re-publishes full Ethernet frames (as
//! opposed to the sender/receiver, which work at the raw IP/UDP level).
//! Parsing here is deliberately tolerant: a frame with no IPv4/UDP layer
//! is forwarded unchanged rather than rejected.

use pnet_packet::{
    ethernet::{EtherTypes, EthernetPacket},
    ip::IpNextHeaderProtocols,
    ipv4::Ipv4Packet,
    udp::{self, MutableUdpPacket},
};

use crate::UDP_HEADER_LEN;

const ETHERNET_HEADER_LEN: usize = 14;

/// Recomputes the UDP checksum of `frame` in place, if `frame` is an
/// Ethernet frame carrying IPv4/UDP. Any other frame shape (no Ethernet
/// header, non-IPv4 ethertype, non-UDP IP payload, or a truncated
/// header) is returned unchanged.
///
/// This is the processor's mitigation primitive: it erases the
/// `bit = 0` signal by replacing every zero checksum with the correct
/// one, same as every already-correct checksum stays correct.
#[must_use]
pub fn recompute_udp_checksum(frame: &[u8]) -> Vec<u8> {
    let Some((src_ip, dst_ip, udp_offset)) = locate_udp(frame) else {
        return frame.to_vec();
    };

    let mut out = frame.to_vec();
    let Some(mut udp_packet) = MutableUdpPacket::new(&mut out[udp_offset..]) else {
        return frame.to_vec();
    };
    udp_packet.set_checksum(0);
    let checksum = udp::ipv4_checksum(&udp_packet.to_immutable(), &src_ip, &dst_ip);
    udp_packet.set_checksum(checksum);
    drop(udp_packet);
    out
}

/// Returns `true` if `frame` contains a UDP layer under IPv4, i.e.
/// whether [`recompute_udp_checksum`] would actually rewrite anything.
#[must_use]
pub fn has_udp_layer(frame: &[u8]) -> bool {
    locate_udp(frame).is_some()
}

fn locate_udp(frame: &[u8]) -> Option<(std::net::Ipv4Addr, std::net::Ipv4Addr, usize)> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }

    let ip_packet = Ipv4Packet::new(frame.get(ETHERNET_HEADER_LEN..)?)?;
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Udp {
        return None;
    }
    let ihl = usize::from(ip_packet.get_header_length()) * 4;
    let src_ip = ip_packet.get_source();
    let dst_ip = ip_packet.get_destination();

    let udp_offset = ETHERNET_HEADER_LEN + ihl;
    if frame.len() < udp_offset + UDP_HEADER_LEN {
        return None;
    }
    Some((src_ip, dst_ip, udp_offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipv4_udp::build_datagram;
    use pnet_packet::ethernet::MutableEthernetPacket;
    use pnet_packet::MutablePacket;
    use std::net::Ipv4Addr;

    fn wrap_in_ethernet(ip_udp: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; ETHERNET_HEADER_LEN + ip_udp.len()];
        let mut eth = MutableEthernetPacket::new(&mut buf).expect("buffer is big enough");
        eth.set_ethertype(EtherTypes::Ipv4);
        eth.payload_mut().copy_from_slice(ip_udp);
        buf
    }

    #[test]
    fn non_ethernet_bytes_are_forwarded_unchanged() {
        let garbage = vec![1, 2, 3];
        assert_eq!(recompute_udp_checksum(&garbage), garbage);
        assert!(!has_udp_layer(&garbage));
    }

    #[test]
    fn zero_checksum_is_recomputed_to_nonzero() {
        let datagram = build_datagram(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            9999,
            8888,
            b"[0]hi",
            false,
        )
        .expect("builds");
        let frame = wrap_in_ethernet(&datagram);

        assert!(has_udp_layer(&frame));
        let mitigated = recompute_udp_checksum(&frame);
        let ip_udp = &mitigated[ETHERNET_HEADER_LEN..];
        assert_eq!(crate::ipv4_udp::udp_checksum_present(ip_udp), Some(true));
    }
}
