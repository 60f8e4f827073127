//! Drives [`crate::state::on_packet`] off a raw listening socket and
//! emits ACKs, the I/O half kept separate from the pure state machine.

use std::{
    net::{Ipv4Addr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use covert_wire::RawIpv4Socket;
use tracing::{debug, trace, warn};

use crate::state::{on_packet, PacketOutcome, ReceiverState};

/// Runs the blocking capture loop until `stop` is set.
///
/// # Errors
///
/// Propagates socket setup and I/O errors.
pub fn run(
    listen_port: u16,
    ack_port: u16,
    message: &Arc<Mutex<String>>,
    stop: &Arc<AtomicBool>,
) -> std::io::Result<()> {
    let capture = RawIpv4Socket::open()?;
    capture.set_read_timeout(Some(POLL_TIMEOUT))?;
    let ack_socket = UdpSocket::bind(("0.0.0.0", 0))?;

    let mut state = ReceiverState::new();
    let mut buf = vec![0u8; 65536];

    while !stop.load(Ordering::SeqCst) {
        let n = match capture.recv(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => return Err(e),
        };

        let Some(parsed) = covert_wire::ipv4_udp::parse_datagram(&buf[..n]) else {
            continue;
        };
        if parsed.dst_port != listen_port {
            continue;
        }

        trace!(?parsed.src_ip, checksum_present = parsed.checksum_present, "inbound datagram");

        match on_packet(&mut state, &parsed.payload, parsed.checksum_present) {
            PacketOutcome::Ack(seq) => {
                send_ack(&ack_socket, parsed.src_ip, ack_port, seq)?;
                debug!(seq, "acked");
            }
            PacketOutcome::Malformed => {
                warn!("dropped malformed datagram, no ack sent");
            }
        }

        let mut guard = message.lock().expect("receiver message mutex poisoned");
        *guard = state.last_message().to_owned();
    }

    Ok(())
}

fn send_ack(ack_socket: &UdpSocket, dst_ip: Ipv4Addr, ack_port: u16, seq: usize) -> std::io::Result<()> {
    let payload = seq.to_string();
    ack_socket.send_to(payload.as_bytes(), (dst_ip, ack_port))?;
    Ok(())
}

/// How long the capture loop is willing to block on a single `recv`
/// before re-checking the stop flag; relevant once a blocking-timeout
/// socket option is wired up by the caller.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(200);
