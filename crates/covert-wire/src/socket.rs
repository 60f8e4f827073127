//! A raw IPv4 socket that lets callers supply their own IP header,
//! which is what lets the sender emit a UDP datagram whose checksum is
//! left at `0x0000` -- something the kernel's own UDP socket layer may
//! refuse to do on some platforms (see the design note on raw UDP
//! checksum control).

use std::{
    io,
    mem::MaybeUninit,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tracing::trace;

/// Thin wrapper over a `SOCK_RAW` IPv4 socket with `IP_HDRINCL` set, so
/// every send supplies a complete, already-checksummed (or
/// deliberately not) IP header.
pub struct RawIpv4Socket {
    inner: Socket,
}

impl RawIpv4Socket {
    /// Opens a raw IPv4 socket for the `UDP` protocol number. Requires
    /// elevated privileges (`CAP_NET_RAW` or root) on most platforms.
    pub fn open() -> io::Result<Self> {
        let inner = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::UDP))?;
        inner.set_header_included_v4(true)?;
        Ok(Self { inner })
    }

    /// Sends a fully-formed IPv4 datagram (as built by
    /// [`crate::build_datagram`]) to `dst`.
    pub fn send_to(&self, datagram: &[u8], dst: Ipv4Addr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddrV4::new(dst, 0));
        let sent = self.inner.send_to(datagram, &addr)?;
        trace!(bytes = sent, %dst, "sent raw datagram");
        Ok(sent)
    }

    /// Sets a read timeout so callers can periodically re-check a stop
    /// flag instead of blocking forever in [`Self::recv`].
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.inner.set_read_timeout(timeout)
    }

    /// Blocks (up to any configured read timeout) until a datagram is
    /// received, filling `buf` with the raw IPv4 packet (header
    /// included).
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: `u8` and `MaybeUninit<u8>` share a layout, and `recv`
        // never reads from the buffer it's given, only writes into it.
        let uninit =
            unsafe { std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<MaybeUninit<u8>>(), buf.len()) };
        self.inner.recv(uninit)
    }
}
