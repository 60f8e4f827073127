//! Converts between a covert payload string and its length-prefixed
//! bitstream representation.
//!
//! This is a pure, deterministic library shared by `covert-sender` and
//! `covert-receiver`: the sender turns a covert string into the sequence
//! of bits it embeds one-per-datagram, and the receiver turns the bits
//! it reassembles back into a string.

use bit_vec::BitVec;
use derive_more::{Display, Error};

/// The fixed bit pattern the receiver looks for, in arrival-sequence
/// order, to gate entry into the covert-decoding state. Sent once
/// before every chunk's header+payload bits.
pub const PREAMBLE: &str = "01010011";

/// Expands [`PREAMBLE`] into its bit sequence, MSB-first in source
/// order (the same order the receiver sorts arriving sequence numbers
/// by).
#[must_use]
pub fn preamble_bits() -> Vec<bool> {
    PREAMBLE.chars().map(|c| c == '1').collect()
}

/// A covert string's byte length must fit into the header, so the sender
/// can never be asked to encode more than `2^header_bits - 1` bytes.
#[derive(Debug, Display, Error)]
#[display("covert payload is {len} bytes, which does not fit in an {header_bits}-bit header")]
pub struct ValueTooLarge {
    len: usize,
    header_bits: u32,
}

/// Encodes `payload` as `header_bits` bits of big-endian byte length,
/// followed by the MSB-first bit expansion of each payload byte.
///
/// # Errors
///
/// Returns [`ValueTooLarge`] if `payload`'s byte length does not fit in
/// `header_bits` bits.
pub fn encode(payload: &[u8], header_bits: u32) -> Result<BitVec, ValueTooLarge> {
    let len = payload.len();
    let max_len = 1usize
        .checked_shl(header_bits)
        .map_or(usize::MAX, |n| n - 1);
    if len > max_len {
        return Err(ValueTooLarge { len, header_bits });
    }

    let mut bits = BitVec::with_capacity(header_bits as usize + payload.len() * 8);
    for i in (0..header_bits).rev() {
        bits.push((len >> i) & 1 == 1);
    }
    for byte in payload {
        for i in (0..8).rev() {
            bits.push((byte >> i) & 1 == 1);
        }
    }
    Ok(bits)
}

/// Reads the first `header_bits` bits of `bits` as a big-endian length
/// `L`, then decodes the next `8 * L` bits MSB-first into bytes.
///
/// Returns `None` if fewer than `header_bits` bits are available, or if
/// the declared payload is longer than what `bits` actually holds (the
/// receiver should only call this once the full chunk has arrived; see
/// [`expected_len`]).
#[must_use]
pub fn decode(bits: &BitVec, header_bits: u32) -> Option<Vec<u8>> {
    let header_bits = header_bits as usize;
    if bits.len() < header_bits {
        return None;
    }

    let len = bits_to_usize(&bits_slice(bits, 0, header_bits));
    let payload_bits = len * 8;
    if bits.len() < header_bits + payload_bits {
        return None;
    }

    let mut out = Vec::with_capacity(len);
    for chunk_start in (header_bits..header_bits + payload_bits).step_by(8) {
        let byte_bits = bits_slice(bits, chunk_start, chunk_start + 8);
        out.push(u8::try_from(bits_to_usize(&byte_bits)).expect("8 bits fit in a u8"));
    }
    Some(out)
}

/// Given the first `header_bits` of a bitstream, returns the total number
/// of bits the full chunk (header + payload) will occupy once decoded, or
/// `None` if fewer than `header_bits` bits have arrived yet.
#[must_use]
pub fn expected_len(header_prefix: &BitVec, header_bits: u32) -> Option<usize> {
    let header_bits = header_bits as usize;
    if header_prefix.len() < header_bits {
        return None;
    }
    let len = bits_to_usize(&bits_slice(header_prefix, 0, header_bits));
    Some(header_bits + len * 8)
}

fn bits_slice(bits: &BitVec, start: usize, end: usize) -> Vec<bool> {
    bits.iter().skip(start).take(end - start).collect()
}

fn bits_to_usize(bits: &[bool]) -> usize {
    bits.iter().fold(0usize, |acc, &b| (acc << 1) | usize::from(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_bits_matches_literal_pattern() {
        let bits = preamble_bits();
        assert_eq!(bits.len(), PREAMBLE.len());
        let rebuilt: String = bits.iter().map(|&b| if b { '1' } else { '0' }).collect();
        assert_eq!(rebuilt, PREAMBLE);
    }

    #[test]
    fn empty_payload_round_trips() {
        let bits = encode(b"", 8).expect("empty payload fits in an 8-bit header");
        assert_eq!(bits.len(), 8);
        assert_eq!(decode(&bits, 8).as_deref(), Some(&b""[..]));
    }

    #[test]
    fn short_string_round_trips() {
        let bits = encode(b"COW", 8).expect("short payload fits in an 8-bit header");
        assert_eq!(bits.len(), 8 + 8 * 3);
        assert_eq!(decode(&bits, 8).as_deref(), Some(&b"COW"[..]));
    }

    #[test]
    fn max_length_payload_round_trips() {
        let payload = vec![b'A'; 255];
        let bits = encode(&payload, 8).expect("255 bytes fits in an 8-bit header");
        assert_eq!(decode(&bits, 8).as_deref(), Some(payload.as_slice()));
    }

    #[test]
    fn over_max_length_fails() {
        let payload = vec![0u8; 256];
        assert!(encode(&payload, 8).is_err());
    }

    #[test]
    fn decode_is_none_when_truncated() {
        let bits = encode(b"hello", 8).expect("fits");
        let truncated: BitVec = bits.iter().take(bits.len() - 1).collect();
        assert_eq!(decode(&truncated, 8), None);
    }

    #[test]
    fn decode_is_none_with_no_header_yet() {
        let partial = BitVec::from_elem(3, true);
        assert_eq!(decode(&partial, 8), None);
    }

    #[test]
    fn expected_len_matches_full_round_trip() {
        let bits = encode(b"hi", 8).expect("fits");
        let header: BitVec = bits.iter().take(8).collect();
        assert_eq!(expected_len(&header, 8), Some(bits.len()));
    }

    #[test]
    fn encode_is_injective_for_distinct_strings() {
        let a = encode(b"AB", 8).expect("fits");
        let b = encode(b"AC", 8).expect("fits");
        assert_ne!(a, b);
    }
}
