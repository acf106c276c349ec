//! Block codecs: stored bytes and the DAX run-length scheme.
//!
//! # RLE stream
//! A DAX RLE stream is a sequence of tokens, each introduced by one control
//! byte read as a signed `i8`:
//!
//! ```text
//! ctl >= 0   literal run: the next ctl+1 bytes are copied verbatim (1..=128)
//! ctl <  0   repeat run:  the next single byte is repeated -ctl times (1..=128)
//! ```
//!
//! There is no end marker.  The decoder stops when it has consumed the
//! `compressed_size` declared in the header table.
//!
//! # Corrupt input
//! Files in the wild contain literal runs that claim more bytes than the
//! stream holds.  The decoder stops at that point and leaves the rest of
//! the output as it was (zero, since output buffers are always allocated
//! zeroed).  Such blocks are not errors: the outcome is reported through
//! [`DecodeStatus`] and the load carries on.
//!
//! Every write is bounds-checked against the output buffer.  A token that
//! would write past the declared raw size stops the decode with
//! [`DecodeStatus::Overrun`] after filling what fits.

use serde::Serialize;
use tracing::trace;

/// Longest run a single token can describe, literal or repeat.
pub const MAX_RUN: usize = 128;

// ── CodecId ──────────────────────────────────────────────────────────────────

/// How a block is stored in the data segment.
///
/// On disk this is implicit: a header entry with `raw_size == 0` is stored,
/// anything else is RLE-compressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecId {
    Stored,
    Rle,
}

impl CodecId {
    /// Codec implied by a header entry's `raw_size` field.
    #[inline]
    pub fn from_raw_size(raw_size: u16) -> Self {
        if raw_size == 0 { CodecId::Stored } else { CodecId::Rle }
    }

    /// Human-readable name (diagnostics only, never parsed from disk).
    pub fn name(self) -> &'static str {
        match self {
            CodecId::Stored => "stored",
            CodecId::Rle    => "rle",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "stored" | "none" | "raw" => Some(CodecId::Stored),
            "rle"                     => Some(CodecId::Rle),
            _                         => None,
        }
    }
}

// ── Decode outcome ───────────────────────────────────────────────────────────

/// How a decode ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodeStatus {
    /// The whole declared input was consumed.
    Complete,
    /// The input ended in the middle of a token.
    Truncated,
    /// A token would have written past the end of the output buffer.
    Overrun,
}

impl DecodeStatus {
    pub fn is_complete(self) -> bool {
        self == DecodeStatus::Complete
    }
}

/// Summary returned by [`decode_into`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeReport {
    /// Input bytes consumed by complete tokens.
    pub consumed: usize,
    /// Output bytes written.
    pub written:  usize,
    pub status:   DecodeStatus,
}

// ── Decoder ──────────────────────────────────────────────────────────────────

/// Decode the RLE stream in `input[..limit]` into `output`.
///
/// `limit` is the header's `compressed_size`; `input` may be shorter if the
/// file was cut short.  `output` must be pre-allocated to the raw size and
/// should be zeroed, since an early stop leaves its tail untouched.
/// A `limit` of zero is a no-op.
pub fn decode_into(input: &[u8], limit: usize, output: &mut [u8]) -> DecodeReport {
    let mut in_pos  = 0usize;
    let mut out_pos = 0usize;

    let stop = |in_pos, out_pos, status| DecodeReport { consumed: in_pos, written: out_pos, status };

    while in_pos < limit {
        let Some(&raw_ctl) = input.get(in_pos) else {
            return stop(in_pos, out_pos, DecodeStatus::Truncated);
        };
        let ctl = raw_ctl as i8;

        if ctl >= 0 {
            let run = ctl as usize + 1;
            for i in 0..run {
                let Some(&b) = input.get(in_pos + i + 1) else {
                    trace!(in_pos, out_pos, run, "literal run cut short by end of input");
                    return stop(in_pos, out_pos + i, DecodeStatus::Truncated);
                };
                let Some(slot) = output.get_mut(out_pos + i) else {
                    return stop(in_pos, out_pos + i, DecodeStatus::Overrun);
                };
                *slot = b;
            }
            in_pos  += run + 1;
            out_pos += run;
        } else {
            let run = -(ctl as isize) as usize;
            let Some(&b) = input.get(in_pos + 1) else {
                trace!(in_pos, out_pos, run, "repeat run missing its value byte");
                return stop(in_pos, out_pos, DecodeStatus::Truncated);
            };
            let end = (out_pos + run).min(output.len());
            if out_pos < end {
                output[out_pos..end].fill(b);
            }
            if end < out_pos + run {
                return stop(in_pos, end, DecodeStatus::Overrun);
            }
            in_pos  += 2;
            out_pos += run;
        }
    }

    stop(in_pos, out_pos, DecodeStatus::Complete)
}

/// Decode `input` into a freshly zeroed buffer of `raw_size` bytes.
pub fn decode(input: &[u8], raw_size: usize) -> (Vec<u8>, DecodeReport) {
    let mut out = vec![0u8; raw_size];
    let report = decode_into(input, input.len(), &mut out);
    (out, report)
}

// ── Encoder ──────────────────────────────────────────────────────────────────

/// Encode `data` as an RLE stream that [`decode_into`] reproduces exactly.
///
/// Greedy, left to right.  A run of three or more identical bytes always
/// becomes a repeat token.  A run of two becomes one only when no literal
/// run is open; inside a literal it costs the same to keep it there.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / MAX_RUN + 1);
    let mut lit_start = 0usize;
    let mut i = 0usize;

    while i < data.len() {
        let b = data[i];
        let mut run = 1usize;
        while i + run < data.len() && data[i + run] == b && run < MAX_RUN {
            run += 1;
        }

        let literal_open = lit_start < i;
        if run >= 3 || (run == 2 && !literal_open) {
            flush_literal(&mut out, &data[lit_start..i]);
            out.push((-(run as isize)) as i8 as u8);
            out.push(b);
            i += run;
            lit_start = i;
        } else {
            i += 1;
        }
    }
    flush_literal(&mut out, &data[lit_start..]);
    out
}

fn flush_literal(out: &mut Vec<u8>, mut lit: &[u8]) {
    while !lit.is_empty() {
        let n = lit.len().min(MAX_RUN);
        out.push((n - 1) as u8);
        out.extend_from_slice(&lit[..n]);
        lit = &lit[n..];
    }
}

// ── Codec trait ──────────────────────────────────────────────────────────────

pub trait Codec: Send + Sync {
    fn codec_id(&self) -> CodecId;
    fn compress(&self, data: &[u8]) -> Vec<u8>;
    /// Expand `data` to the block's decoded form; `raw_size` is its declared length.
    fn decompress(&self, data: &[u8], raw_size: usize) -> (Vec<u8>, DecodeReport);
}

pub struct StoredCodec;
impl Codec for StoredCodec {
    fn codec_id(&self) -> CodecId { CodecId::Stored }
    fn compress(&self, data: &[u8]) -> Vec<u8> { data.to_vec() }
    fn decompress(&self, data: &[u8], _: usize) -> (Vec<u8>, DecodeReport) {
        let report = DecodeReport {
            consumed: data.len(),
            written:  data.len(),
            status:   DecodeStatus::Complete,
        };
        (data.to_vec(), report)
    }
}

pub struct RleCodec;
impl Codec for RleCodec {
    fn codec_id(&self) -> CodecId { CodecId::Rle }
    fn compress(&self, data: &[u8]) -> Vec<u8> { encode(data) }
    fn decompress(&self, data: &[u8], raw_size: usize) -> (Vec<u8>, DecodeReport) {
        decode(data, raw_size)
    }
}

/// Resolve a CodecId to its implementation.
pub fn get_codec(id: CodecId) -> &'static dyn Codec {
    match id {
        CodecId::Stored => &StoredCodec,
        CodecId::Rle    => &RleCodec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn literal_run() {
        let (out, r) = decode(&[0x02, 0xAA, 0xBB, 0xCC], 3);
        assert_eq!(out, [0xAA, 0xBB, 0xCC]);
        assert_eq!(r.status, DecodeStatus::Complete);
        assert_eq!(r.consumed, 4);
        assert_eq!(r.written, 3);
    }

    #[test]
    fn repeat_run() {
        let (out, r) = decode(&[0xFE, 0x7F], 2);
        assert_eq!(out, [0x7F, 0x7F]);
        assert_eq!(r.status, DecodeStatus::Complete);
    }

    #[test]
    fn longest_repeat_run() {
        let (out, r) = decode(&[0x80, 0x11], 128);
        assert_eq!(out, vec![0x11; 128]);
        assert!(r.status.is_complete());
    }

    #[test]
    fn mixed_tokens() {
        let input = [0x01, b'a', b'b', 0xFD, b'z', 0x00, b'q'];
        let (out, r) = decode(&input, 6);
        assert_eq!(out, b"abzzzq");
        assert_eq!(r.consumed, input.len());
    }

    #[test]
    fn truncated_literal_keeps_zero_tail() {
        let (out, r) = decode(&[0x05, 0x01], 6);
        assert_eq!(out, [0x01, 0, 0, 0, 0, 0]);
        assert_eq!(r.status, DecodeStatus::Truncated);
        assert_eq!(r.written, 1);
    }

    #[test]
    fn repeat_without_value_byte() {
        let (out, r) = decode(&[0x00, 0x42, 0xF0], 4);
        assert_eq!(out, [0x42, 0, 0, 0]);
        assert_eq!(r.status, DecodeStatus::Truncated);
    }

    #[test]
    fn control_byte_past_end_of_input() {
        // Limit says 5 bytes, the stream ends after one literal token.
        let mut out = [0u8; 4];
        let r = decode_into(&[0x00, 5], 5, &mut out);
        assert_eq!(out, [5, 0, 0, 0]);
        assert_eq!(r, DecodeReport { consumed: 2, written: 1, status: DecodeStatus::Truncated });
    }

    #[test]
    fn repeat_overrun_is_clipped() {
        let (out, r) = decode(&[0xF6, 0x09], 4);
        assert_eq!(out, [0x09; 4]);
        assert_eq!(r.status, DecodeStatus::Overrun);
        assert_eq!(r.written, 4);
    }

    #[test]
    fn literal_overrun_is_clipped() {
        let (out, r) = decode(&[0x03, 1, 2, 3, 4], 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(r.status, DecodeStatus::Overrun);
    }

    #[test]
    fn zero_limit_is_noop() {
        let mut out = [0xEEu8; 3];
        let r = decode_into(&[0x02, 1, 2, 3], 0, &mut out);
        assert_eq!(out, [0xEE; 3]);
        assert_eq!(r, DecodeReport { consumed: 0, written: 0, status: DecodeStatus::Complete });
    }

    #[test]
    fn limit_shorter_than_input() {
        // Trailing bytes past the declared size are never read.
        let mut out = [0u8; 4];
        let r = decode_into(&[0x01, 7, 8, 0x7F, 9], 3, &mut out);
        assert_eq!(out, [7, 8, 0, 0]);
        assert_eq!(r.consumed, 3);
        assert!(r.status.is_complete());
    }

    #[test]
    fn encode_prefers_repeat_tokens_for_runs() {
        assert_eq!(encode(&[5, 5, 5, 5]), [0xFC, 5]);
        assert_eq!(encode(&[1, 2, 3]), [0x02, 1, 2, 3]);
        // A pair inside an open literal stays literal.
        assert_eq!(encode(&[1, 2, 2, 3]), [0x03, 1, 2, 2, 3]);
        // A leading pair becomes a repeat token.
        assert_eq!(encode(&[2, 2, 3]), [0xFE, 2, 0x00, 3]);
    }

    #[test]
    fn encode_splits_long_runs() {
        let data = vec![0xAB; 300];
        let enc = encode(&data);
        assert_eq!(enc, [0x80, 0xAB, 0x80, 0xAB, 0xD4, 0xAB]);
        let (dec, r) = decode(&enc, data.len());
        assert_eq!(dec, data);
        assert_eq!(r.consumed, enc.len());
    }

    #[test]
    fn encode_splits_long_literals() {
        let data: Vec<u8> = (0u8..=255).collect();
        let enc = encode(&data);
        assert_eq!(enc.len(), 256 + 2);
        assert_eq!(enc[0], 127);
        assert_eq!(enc[129], 127);
    }

    #[test]
    fn encode_empty() {
        assert!(encode(&[]).is_empty());
        let (out, r) = decode(&[], 0);
        assert!(out.is_empty());
        assert!(r.status.is_complete());
    }

    #[test]
    fn registry_dispatch() {
        let data = b"aaaaaaaabcd";
        for id in [CodecId::Stored, CodecId::Rle] {
            let c = get_codec(id);
            assert_eq!(c.codec_id(), id);
            let packed = c.compress(data);
            let (raw, report) = c.decompress(&packed, data.len());
            assert_eq!(raw, data);
            assert!(report.status.is_complete());
        }
        assert_eq!(CodecId::from_name("RLE"), Some(CodecId::Rle));
        assert_eq!(CodecId::from_name("lz4"), None);
        assert_eq!(CodecId::from_raw_size(0), CodecId::Stored);
        assert_eq!(CodecId::from_raw_size(9), CodecId::Rle);
    }

    proptest! {
        #[test]
        fn roundtrip(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let enc = encode(&data);
            let (dec, r) = decode(&enc, data.len());
            prop_assert_eq!(&dec, &data);
            prop_assert_eq!(r.status, DecodeStatus::Complete);
            prop_assert_eq!(r.consumed, enc.len());
            prop_assert_eq!(r.written, data.len());
        }

        #[test]
        fn roundtrip_runny(runs in proptest::collection::vec((0u8..4, 1usize..300), 0..20)) {
            let data: Vec<u8> = runs.iter()
                .flat_map(|&(b, n)| std::iter::repeat(b).take(n))
                .collect();
            let enc = encode(&data);
            let (dec, r) = decode(&enc, data.len());
            prop_assert_eq!(dec, data);
            prop_assert_eq!(r.consumed, enc.len());
        }

        #[test]
        fn garbage_never_panics(input in proptest::collection::vec(any::<u8>(), 0..512),
                                raw_size in 0usize..1024) {
            let (out, r) = decode(&input, raw_size);
            prop_assert_eq!(out.len(), raw_size);
            prop_assert!(r.written <= raw_size);
        }
    }
}
