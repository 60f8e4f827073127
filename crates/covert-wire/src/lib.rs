//! Shared wire-format helpers for crafting and inspecting the raw IP/UDP
//! and Ethernet frames that carry the covert channel.
//!
//! This crate has no opinion on reliability, framing, or covert-bit
//! semantics -- it only knows how to put bytes on the wire and how to
//! read the one field ([`udp_checksum_present`]) the rest of the system
//! cares about.

pub mod ethernet;
pub mod ipv4_udp;
pub mod socket;

pub use ipv4_udp::{build_datagram, udp_checksum_present, BuildDatagramError};
pub use socket::RawIpv4Socket;

/// Byte length of a UDP header (source port, dest port, length, checksum).
pub const UDP_HEADER_LEN: usize = 8;
