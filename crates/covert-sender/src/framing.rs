//! Splits a carrier message into sequence-numbered chunks.

/// Reserved room for the `"[" + n + "]"` sequence prefix on each chunk.
///
/// Matches the `-8` used throughout the original prototypes: generous
/// enough for sequence numbers up to 6 decimal digits.
pub const SEQ_PREFIX_RESERVE: usize = 8;

/// Splits `carrier` into chunks of at most `max_udp_payload -
/// SEQ_PREFIX_RESERVE` bytes, returning the bare chunk bytes (without
/// the `"[n]"` prefix -- that's added per-packet by the caller, since it
/// needs to know the final sequence number at send time).
#[must_use]
pub fn split_chunks(carrier: &[u8], max_udp_payload: usize) -> Vec<Vec<u8>> {
    let chunk_size = max_udp_payload.saturating_sub(SEQ_PREFIX_RESERVE).max(1);
    carrier.chunks(chunk_size).map(<[u8]>::to_vec).collect()
}

/// Builds the overt payload for sequence `n`: the literal ASCII token
/// `"[n]"` followed by the chunk bytes.
#[must_use]
pub fn overt_payload(seq: usize, chunk: &[u8]) -> Vec<u8> {
    let mut out = format!("[{seq}]").into_bytes();
    out.extend_from_slice(chunk);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_expected_chunk_count() {
        let carrier = vec![b'x'; 100];
        let chunks = split_chunks(&carrier, 20);
        // chunk_size = 20 - 8 = 12
        assert_eq!(chunks.len(), 9); // ceil(100 / 12)
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 100);
    }

    #[test]
    fn overt_payload_has_sequence_prefix() {
        let payload = overt_payload(42, b"chunk");
        assert_eq!(payload, b"[42]chunk");
    }
}
