//! The covert-encoded reliable sender: chunking, checksum steganography,
//! and the sliding-window ARQ loop.

use std::{
    net::{Ipv4Addr, UdpSocket},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

use ahash::AHashMap as HashMap;
use covert_wire::RawIpv4Socket;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::{
    error::SenderError,
    framing::{self, SEQ_PREFIX_RESERVE},
};

/// Whether this session embeds the user's covert string, or a random
/// dummy string used to produce a session that looks identical on the
/// wire but carries no meaningful payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Covert,
    OvertDummy,
}

/// Result of a completed [`CovertSender::send`] call.
#[derive(Debug, Clone, Copy)]
pub struct SendOutcome {
    pub transmitted: usize,
    pub acknowledged: usize,
    pub dropped: usize,
    pub capacity: f64,
}

/// How a sequence number's delivery was finally classified.
#[derive(Debug, Clone, Copy)]
enum Outcome {
    Acked(Instant),
    Dropped,
}

struct ResolvedEntry {
    outcome: Outcome,
    /// Whether the *first* resolution recorded for this sequence was an
    /// ACK. A later ACK arriving for a sequence already marked
    /// `Dropped` upgrades `outcome` (so the window can keep advancing
    /// past it) but does **not** retroactively count toward capacity --
    /// see the "dropped-vs-delayed ACK" design decision.
    first_was_ack: bool,
}

struct SentRecord {
    first_send: Instant,
    deadline: Instant,
    tx_count: u32,
}

struct Shared {
    window_start: usize,
    next_seq: usize,
    sent: HashMap<usize, SentRecord>,
    resolved: HashMap<usize, ResolvedEntry>,
}

impl Shared {
    fn new() -> Self {
        Self {
            window_start: 0,
            next_seq: 0,
            sent: HashMap::default(),
            resolved: HashMap::default(),
        }
    }

    /// Advances `window_start` past any run of contiguously-resolved
    /// sequence numbers.
    fn advance_window(&mut self) {
        while self.resolved.contains_key(&self.window_start) {
            self.window_start += 1;
        }
    }

    fn record_ack(&mut self, seq: usize, now: Instant) {
        match self.resolved.get_mut(&seq) {
            None => {
                self.resolved.insert(
                    seq,
                    ResolvedEntry {
                        outcome: Outcome::Acked(now),
                        first_was_ack: true,
                    },
                );
            }
            Some(entry) => {
                if let Outcome::Dropped = entry.outcome {
                    entry.outcome = Outcome::Acked(now);
                }
                // duplicate ACKs, or an ACK for an already-acked seq, are ignored
            }
        }
        self.advance_window();
    }
}

/// Crafts and reliably delivers covert-encoded UDP datagrams over a
/// sliding-window ARQ.
pub struct CovertSender {
    pub dst_ip: Ipv4Addr,
    pub dst_port: u16,
    pub src_port: u16,
    pub max_udp_payload: usize,
    pub window: usize,
    pub timeout: Duration,
    pub max_transmissions: u32,
    pub wait: Duration,
    src_ip: Ipv4Addr,
    raw_socket: RawIpv4Socket,
    ack_socket: UdpSocket,
    /// Set from outside (e.g. a Ctrl-C handler) to cut a running
    /// [`Self::send`] short; checked by the emit loop between batches.
    stop: Arc<AtomicBool>,
}

impl CovertSender {
    /// Opens the raw crafting socket and the ACK-listening socket.
    ///
    /// # Errors
    ///
    /// Propagates any socket-creation error.
    pub fn open(
        dst_ip: Ipv4Addr,
        dst_port: u16,
        src_port: u16,
        max_udp_payload: usize,
        window: usize,
        timeout: Duration,
        max_transmissions: u32,
        wait: Duration,
    ) -> Result<Self, SenderError> {
        let raw_socket = RawIpv4Socket::open()?;
        let ack_socket = UdpSocket::bind(("0.0.0.0", src_port))?;
        ack_socket.set_read_timeout(Some(Duration::from_millis(50)))?;
        let src_ip = local_ip_toward(dst_ip, dst_port)?;
        Ok(Self {
            dst_ip,
            dst_port,
            src_port,
            max_udp_payload,
            window,
            timeout,
            max_transmissions,
            wait,
            src_ip,
            raw_socket,
            ack_socket,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A handle the caller can store and flip from a signal handler to
    /// interrupt an in-progress [`Self::send`].
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Transmits `carrier`, embedding `covert` (or a random dummy string
    /// when `mode` is [`Mode::OvertDummy`]).
    ///
    /// # Errors
    ///
    /// Fails fast with [`SenderError::ValueTooLarge`] or
    /// [`SenderError::CarrierUnderflow`] before any packet is sent, or
    /// propagates a socket error encountered mid-session.
    pub fn send(&self, carrier: &[u8], covert: &[u8], mode: Mode) -> Result<SendOutcome, SenderError> {
        let effective_covert: Vec<u8> = match mode {
            Mode::Covert => covert.to_vec(),
            Mode::OvertDummy => random_dummy_string(),
        };

        let chunk_bits = covert_codec::encode(&effective_covert, 8)?;
        let mut bits = covert_codec::preamble_bits();
        bits.extend(chunk_bits.iter());
        let covert_len = bits.len();

        let chunks = framing::split_chunks(carrier, self.max_udp_payload);
        if chunks.len() < covert_len {
            return Err(SenderError::CarrierUnderflow {
                available: chunks.len(),
                needed: covert_len,
            });
        }

        info!(
            covert_len,
            chunk_count = chunks.len(),
            "Starting covert send session"
        );

        let shared = Arc::new(Mutex::new(Shared::new()));
        let ack_done = Arc::new(AtomicBool::new(false));

        let ack_thread = {
            let shared = Arc::clone(&shared);
            let ack_done = Arc::clone(&ack_done);
            let ack_socket = self.ack_socket.try_clone()?;
            let covert_len = covert_len;
            thread::spawn(move || ack_ingest_loop(&ack_socket, &shared, &ack_done, covert_len))
        };

        self.emit_loop(&shared, &chunks, &bits)?;

        // drain: give late ACKs a chance to arrive before tearing down
        thread::sleep(self.wait);
        ack_done.store(true, Ordering::SeqCst);
        let _ = ack_thread.join();

        let guard = shared.lock().expect("sender mutex poisoned");
        let acknowledged = guard
            .resolved
            .values()
            .filter(|e| e.first_was_ack)
            .count();
        let dropped = guard.resolved.len() - acknowledged;
        let transmitted: u32 = guard.sent.values().map(|r| r.tx_count).sum();
        let transmitted = transmitted as usize;
        let capacity = if transmitted == 0 {
            1.0
        } else {
            acknowledged as f64 / transmitted as f64
        };

        info!(
            mode = ?mode,
            carrier_len = carrier.len(),
            covert_len = effective_covert.len(),
            capacity,
            target = "covert_sender::session",
            "Covert send session complete"
        );

        Ok(SendOutcome {
            transmitted,
            acknowledged,
            dropped,
            capacity,
        })
    }

    fn emit_loop(&self, shared: &Arc<Mutex<Shared>>, chunks: &[Vec<u8>], bits: &[bool]) -> Result<(), SenderError> {
        let covert_len = bits.len();
        loop {
            let mut to_send = Vec::new();
            let mut to_retransmit = Vec::new();
            let now = Instant::now();

            {
                let mut guard = shared.lock().expect("sender mutex poisoned");
                while guard.next_seq < guard.window_start + self.window && guard.next_seq < covert_len {
                    let seq = guard.next_seq;
                    to_send.push(seq);
                    guard.sent.insert(
                        seq,
                        SentRecord {
                            first_send: now,
                            deadline: now + self.timeout,
                            tx_count: 1,
                        },
                    );
                    guard.next_seq += 1;
                }

                let window_start = guard.window_start;
                let next_seq = guard.next_seq;
                for seq in window_start..next_seq {
                    if guard.resolved.contains_key(&seq) {
                        continue;
                    }
                    let record = guard.sent.get_mut(&seq).expect("sent record exists for in-flight seq");
                    if now < record.deadline {
                        continue;
                    }
                    if record.tx_count < self.max_transmissions {
                        record.tx_count += 1;
                        record.deadline = now + self.timeout;
                        to_retransmit.push(seq);
                    } else {
                        guard.resolved.insert(
                            seq,
                            ResolvedEntry {
                                outcome: Outcome::Dropped,
                                first_was_ack: false,
                            },
                        );
                        trace!(seq, "Retransmission cap reached, marking dropped");
                    }
                }
                guard.advance_window();

                if guard.resolved.len() >= covert_len {
                    break;
                }
            }

            for seq in to_send {
                self.craft_and_send(seq, &chunks[seq], bits[seq])?;
            }
            for seq in to_retransmit {
                debug!(seq, "Retransmitting");
                self.craft_and_send(seq, &chunks[seq], bits[seq])?;
            }

            if self.stop.load(Ordering::SeqCst) {
                info!("Send interrupted by Ctrl-C");
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    fn craft_and_send(&self, seq: usize, chunk: &[u8], bit: bool) -> Result<(), SenderError> {
        let payload = framing::overt_payload(seq, chunk);
        debug_assert!(
            payload.len() <= self.max_udp_payload + SEQ_PREFIX_RESERVE,
            "chunk plus prefix should fit within the configured MTU budget"
        );
        let datagram = covert_wire::build_datagram(
            self.src_ip,
            self.dst_ip,
            self.src_port,
            self.dst_port,
            &payload,
            bit,
        )
        .expect("payload length is bounded by max_udp_payload and fits a u16 length field");
        self.raw_socket.send_to(&datagram, self.dst_ip)?;
        Ok(())
    }
}

/// With `IP_HDRINCL` the kernel does not fill in the source address for
/// us, so we have to put a real one in the header ourselves. Connecting
/// a throwaway UDP socket to the peer and reading back its local
/// address is the standard trick for discovering which local interface
/// the kernel would route through, without needing a netlink/`if_addrs`
/// dependency just for this.
fn local_ip_toward(dst_ip: Ipv4Addr, dst_port: u16) -> std::io::Result<Ipv4Addr> {
    let probe = UdpSocket::bind(("0.0.0.0", 0))?;
    probe.connect((dst_ip, dst_port))?;
    match probe.local_addr()?.ip() {
        std::net::IpAddr::V4(ip) => Ok(ip),
        std::net::IpAddr::V6(_) => unreachable!("connected to an IPv4 peer"),
    }
}

fn ack_ingest_loop(
    ack_socket: &UdpSocket,
    shared: &Arc<Mutex<Shared>>,
    done: &Arc<AtomicBool>,
    covert_len: usize,
) {
    let mut buf = [0u8; 64];
    loop {
        if done.load(Ordering::SeqCst) {
            return;
        }
        {
            let guard = shared.lock().expect("sender mutex poisoned");
            if guard.resolved.len() >= covert_len {
                return;
            }
        }

        match ack_socket.recv_from(&mut buf) {
            Ok((n, _addr)) => {
                let Ok(text) = std::str::from_utf8(&buf[..n]) else {
                    warn!("Received non-UTF8 ACK payload");
                    continue;
                };
                let Ok(seq) = text.trim().parse::<usize>() else {
                    warn!(payload = text, "Received malformed ACK payload");
                    continue;
                };
                let now = Instant::now();
                let mut guard = shared.lock().expect("sender mutex poisoned");
                guard.record_ack(seq, now);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut => {
                // cooperative yield point so we re-check `stop`
            }
            Err(e) => {
                warn!(error = %e, "ACK socket error");
                return;
            }
        }
    }
}

/// A Bernoulli switch over `p_cov` picks covert vs overt-dummy mode for
/// a session.
#[must_use]
pub fn choose_mode(p_cov: f64) -> Mode {
    if rand::thread_rng().gen_bool(p_cov.clamp(0.0, 1.0)) {
        Mode::Covert
    } else {
        Mode::OvertDummy
    }
}

/// A random ASCII dummy string, 1-10 characters, used in
/// [`Mode::OvertDummy`] sessions.
fn random_dummy_string() -> Vec<u8> {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(1..=10);
    (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_invariant_holds_through_advance() {
        let mut shared = Shared::new();
        shared.next_seq = 3;
        shared.sent.insert(
            0,
            SentRecord {
                first_send: Instant::now(),
                deadline: Instant::now(),
                tx_count: 1,
            },
        );
        shared.record_ack(0, Instant::now());
        assert_eq!(shared.window_start, 1);
        assert!(shared.window_start <= shared.next_seq);
    }

    #[test]
    fn duplicate_ack_is_ignored_but_idempotent() {
        let mut shared = Shared::new();
        let now = Instant::now();
        shared.record_ack(2, now);
        shared.record_ack(2, now);
        assert_eq!(shared.resolved.len(), 1);
        assert!(shared.resolved.get(&2).expect("present").first_was_ack);
    }

    #[test]
    fn late_ack_upgrades_dropped_without_counting_toward_capacity() {
        let mut shared = Shared::new();
        shared.resolved.insert(
            5,
            ResolvedEntry {
                outcome: Outcome::Dropped,
                first_was_ack: false,
            },
        );
        shared.record_ack(5, Instant::now());
        let entry = shared.resolved.get(&5).expect("present");
        assert!(matches!(entry.outcome, Outcome::Acked(_)));
        assert!(!entry.first_was_ack);
    }
}
