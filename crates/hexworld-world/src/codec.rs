//! Run-length codec for dense chunk arrays.
//!
//! The stream is a sequence of `[value:u8][count:u16 big-endian]` triples.
//! The decoded length is not stored; callers pass the known array length.

use tracing::warn;

/// Longest run a single triple can describe.
pub const MAX_RUN: usize = u16::MAX as usize;

/// Bytes per encoded run.
pub const TRIPLE_SIZE: usize = 3;

/// A single decoded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RleRun {
    /// Repeated byte
    pub value: u8,
    /// Number of repetitions (1..=65535 when produced by the encoder)
    pub count: u16,
}

impl RleRun {
    /// Writes this run as a triple.
    fn write_to(self, out: &mut Vec<u8>) {
        let [hi, lo] = self.count.to_be_bytes();
        out.extend_from_slice(&[self.value, hi, lo]);
    }
}

/// Encodes a byte array. Runs longer than [`MAX_RUN`] are split.
#[must_use]
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let Some((&first, rest)) = data.split_first() else {
        return out;
    };

    let mut current = first;
    let mut count = 1usize;
    for &byte in rest {
        if byte == current && count < MAX_RUN {
            count += 1;
        } else {
            RleRun {
                value: current,
                count: count as u16,
            }
            .write_to(&mut out);
            current = byte;
            count = 1;
        }
    }
    RleRun {
        value: current,
        count: count as u16,
    }
    .write_to(&mut out);

    out
}

/// Iterates the complete triples of an encoded stream.
pub fn runs(encoded: &[u8]) -> impl Iterator<Item = RleRun> + '_ {
    encoded.chunks_exact(TRIPLE_SIZE).map(|t| RleRun {
        value: t[0],
        count: u16::from_be_bytes([t[1], t[2]]),
    })
}

/// Decodes a stream into exactly `expected_len` bytes.
///
/// Expansion stops once `expected_len` bytes are produced. A stream that
/// falls short is zero-padded and logged; a trailing partial triple is ignored.
#[must_use]
pub fn decode(encoded: &[u8], expected_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(expected_len);

    for run in runs(encoded) {
        let room = expected_len - out.len();
        let take = usize::from(run.count).min(room);
        out.resize(out.len() + take, run.value);
        if out.len() == expected_len {
            break;
        }
    }

    if encoded.len() % TRIPLE_SIZE != 0 {
        warn!(
            "RLE stream has {} trailing bytes, ignoring partial run",
            encoded.len() % TRIPLE_SIZE
        );
    }

    if out.len() < expected_len {
        warn!(
            "RLE decode mismatch: produced {} of {expected_len} bytes, zero-padding",
            out.len()
        );
        out.resize(expected_len, 0);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use hexworld_common::CHUNK_VOLUME;
    use proptest::prelude::*;

    #[test]
    fn test_empty_input() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[], 0).is_empty());
    }

    #[test]
    fn test_all_zero_chunk_is_one_triple() {
        let data = vec![0u8; CHUNK_VOLUME];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![0, 0x40, 0x00]);
        assert_eq!(decode(&encoded, CHUNK_VOLUME), data);
    }

    #[test]
    fn test_long_run_is_split() {
        let data = vec![7u8; MAX_RUN + 10];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![7, 0xFF, 0xFF, 7, 0x00, 0x0A]);
        assert_eq!(decode(&encoded, data.len()), data);
    }

    #[test]
    fn test_mixed_runs() {
        let encoded = encode(&[1, 1, 2, 3, 3, 3]);
        assert_eq!(encoded, vec![1, 0, 2, 2, 0, 1, 3, 0, 3]);
    }

    #[test]
    fn test_short_stream_is_zero_padded() {
        let decoded = decode(&[5, 0, 3], 6);
        assert_eq!(decoded, vec![5, 5, 5, 0, 0, 0]);
    }

    #[test]
    fn test_overlong_stream_is_truncated() {
        let decoded = decode(&[5, 0, 3, 6, 0, 3], 4);
        assert_eq!(decoded, vec![5, 5, 5, 6]);
    }

    #[test]
    fn test_partial_trailing_triple_ignored() {
        let decoded = decode(&[9, 0, 2, 4, 0], 3);
        assert_eq!(decoded, vec![9, 9, 0]);
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(0u8..4, 0..2048)) {
            prop_assert_eq!(decode(&encode(&data), data.len()), data);
        }

        #[test]
        fn prop_long_uniform_runs(value in any::<u8>(), len in 60_000usize..140_000) {
            let data = vec![value; len];
            let encoded = encode(&data);
            prop_assert_eq!(encoded.len(), TRIPLE_SIZE * len.div_ceil(MAX_RUN));
            prop_assert_eq!(decode(&encoded, len), data);
        }
    }
}
