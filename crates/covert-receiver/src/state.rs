//! The preamble-gated overt/covert state machine, as a pure function
//! over `&mut ReceiverState` and a single inbound packet -- no sockets,
//! so it is unit-testable directly. Mirrors how
//! `aeronet_transport::recv::recv_on` is kept free of the I/O that
//! drives it.

use ahash::AHashMap as HashMap;
use bit_vec::BitVec;
use tracing::{info, warn};

pub use covert_codec::PREAMBLE;
pub const HEADER_BITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Overt,
    Covert,
}

/// All state the receiver carries between packets.
pub struct ReceiverState {
    session: Session,
    preamble_buf: HashMap<usize, bool>,
    chunk_buf: HashMap<usize, bool>,
    last_message: String,
}

impl Default for ReceiverState {
    fn default() -> Self {
        Self {
            session: Session::Overt,
            preamble_buf: HashMap::default(),
            chunk_buf: HashMap::default(),
            last_message: String::new(),
        }
    }
}

impl ReceiverState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently decoded covert message, or empty if none has
    /// completed yet.
    #[must_use]
    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    fn reset_buffers(&mut self) {
        self.preamble_buf.clear();
        self.chunk_buf.clear();
    }
}

/// Outcome of processing one inbound datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// The sequence prefix parsed; the caller should ACK this sequence
    /// number back to the sender.
    Ack(usize),
    /// Malformed sequence prefix; no ACK is sent.
    Malformed,
}

/// Extracts `n` from a `"[n]..."`-prefixed payload.
#[must_use]
pub fn parse_sequence(payload: &[u8]) -> Option<usize> {
    let start = payload.iter().position(|&b| b == b'[')?;
    let end = start + payload[start..].iter().position(|&b| b == b']')?;
    std::str::from_utf8(&payload[start + 1..end])
        .ok()?
        .parse()
        .ok()
}

/// Processes one inbound datagram: `payload` is the visible UDP body
/// (including the `"[n]"` prefix), `checksum_present` is whether the
/// UDP checksum field was non-zero (the covert bit).
pub fn on_packet(state: &mut ReceiverState, payload: &[u8], checksum_present: bool) -> PacketOutcome {
    let Some(seq) = parse_sequence(payload) else {
        warn!(?payload, "malformed sequence prefix, dropping silently");
        return PacketOutcome::Malformed;
    };

    match state.session {
        Session::Overt => {
            state.preamble_buf.insert(seq, checksum_present);
            if state.preamble_buf.len() >= PREAMBLE.len() {
                let mut keys: Vec<usize> = state.preamble_buf.keys().copied().collect();
                keys.sort_unstable();
                let recent = &keys[keys.len() - PREAMBLE.len()..];
                let bits: String = recent
                    .iter()
                    .map(|k| if state.preamble_buf[k] { '1' } else { '0' })
                    .collect();
                if bits == PREAMBLE {
                    info!("preamble matched, entering covert state");
                    state.session = Session::Covert;
                    state.reset_buffers();
                }
            }
        }
        Session::Covert => {
            state.chunk_buf.insert(seq, checksum_present);

            let mut keys: Vec<usize> = state.chunk_buf.keys().copied().collect();
            keys.sort_unstable();

            if keys.len() >= HEADER_BITS as usize {
                let header: BitVec = keys
                    .iter()
                    .take(HEADER_BITS as usize)
                    .map(|k| state.chunk_buf[k])
                    .collect();
                if let Some(expected) = covert_codec::expected_len(&header, HEADER_BITS) {
                    if keys.len() >= expected {
                        let bits: BitVec = keys.iter().take(expected).map(|k| state.chunk_buf[k]).collect();
                        match covert_codec::decode(&bits, HEADER_BITS) {
                            Some(bytes) => {
                                state.last_message = String::from_utf8_lossy(&bytes).into_owned();
                                info!(message = %state.last_message, "covert chunk completed");
                            }
                            None => warn!("chunk reached expected length but failed to decode"),
                        }
                        state.session = Session::Overt;
                        state.reset_buffers();
                    }
                }
            }
        }
    }

    PacketOutcome::Ack(seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_for(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn parses_sequence_prefix() {
        assert_eq!(parse_sequence(b"[42]hello"), Some(42));
        assert_eq!(parse_sequence(b"no brackets here"), None);
        assert_eq!(parse_sequence(b"[abc]oops"), None);
    }

    #[test]
    fn malformed_prefix_does_not_advance_state() {
        let mut state = ReceiverState::new();
        let outcome = on_packet(&mut state, b"garbage", true);
        assert_eq!(outcome, PacketOutcome::Malformed);
    }

    #[test]
    fn preamble_match_transitions_to_covert() {
        let mut state = ReceiverState::new();
        for (i, bit) in bits_for(PREAMBLE).into_iter().enumerate() {
            let payload = format!("[{i}]x");
            let outcome = on_packet(&mut state, payload.as_bytes(), bit);
            assert_eq!(outcome, PacketOutcome::Ack(i));
        }
        // one more packet, now in covert state, should not re-match as preamble
        assert!(state.last_message().is_empty());
    }

    #[test]
    fn full_chunk_round_trips_to_message() {
        let mut state = ReceiverState::new();
        for (i, bit) in bits_for(PREAMBLE).into_iter().enumerate() {
            let payload = format!("[{i}]x");
            on_packet(&mut state, payload.as_bytes(), bit);
        }

        let encoded = covert_codec::encode(b"hi", HEADER_BITS).expect("fits");
        let base = PREAMBLE.len();
        for (offset, bit) in encoded.iter().enumerate() {
            let seq = base + offset;
            let payload = format!("[{seq}]x");
            on_packet(&mut state, payload.as_bytes(), bit);
        }

        assert_eq!(state.last_message(), "hi");
    }

    #[test]
    fn out_of_order_arrival_still_completes() {
        let mut state = ReceiverState::new();
        for (i, bit) in bits_for(PREAMBLE).into_iter().enumerate() {
            let payload = format!("[{i}]x");
            on_packet(&mut state, payload.as_bytes(), bit);
        }

        let encoded = covert_codec::encode(b"z", HEADER_BITS).expect("fits");
        let base = PREAMBLE.len();
        let mut indexed: Vec<(usize, bool)> = encoded.iter().enumerate().map(|(o, b)| (base + o, b)).collect();
        indexed.reverse();
        for (seq, bit) in indexed {
            let payload = format!("[{seq}]x");
            on_packet(&mut state, payload.as_bytes(), bit);
        }

        assert_eq!(state.last_message(), "z");
    }
}
