//! Fixed-width encodings of trace and span identifiers.

use opentelemetry::trace::{SpanId, TraceId};

/// Width of an encoded identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdWidth {
    /// 8 bytes, used for span ids.
    Span,
    /// 16 bytes, used for trace ids.
    Trace,
}

impl IdWidth {
    /// Number of bytes in the encoding.
    pub fn byte_len(self) -> usize {
        match self {
            IdWidth::Span => 8,
            IdWidth::Trace => 16,
        }
    }
}

/// Encode `id` as big-endian bytes of the given width, zero-padded on the left.
///
/// Ids that do not fit in `width` keep their low-order bytes.
pub fn id_to_bytes(id: u128, width: IdWidth) -> Vec<u8> {
    let bytes = id.to_be_bytes();
    bytes[bytes.len() - width.byte_len()..].to_vec()
}

/// Decode big-endian bytes produced by [`id_to_bytes`].
///
/// Only the last 16 bytes of `bytes` are considered.
pub fn bytes_to_id(bytes: &[u8]) -> u128 {
    let start = bytes.len().saturating_sub(16);
    bytes[start..]
        .iter()
        .fold(0u128, |id, byte| (id << 8) | u128::from(*byte))
}

/// Reinterpret an unsigned 64-bit id as the signed value some backends expect.
pub fn to_signed_i64(id: u64) -> i64 {
    if id > i64::MAX as u64 {
        (i128::from(id) - (1i128 << 64)) as i64
    } else {
        id as i64
    }
}

pub(crate) fn trace_id_bytes(trace_id: TraceId) -> Vec<u8> {
    id_to_bytes(u128::from_be_bytes(trace_id.to_bytes()), IdWidth::Trace)
}

pub(crate) fn span_id_bytes(span_id: SpanId) -> Vec<u8> {
    id_to_bytes(
        u128::from(u64::from_be_bytes(span_id.to_bytes())),
        IdWidth::Span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_on_the_left() {
        assert_eq!(
            id_to_bytes(0xDEAD_BEF0, IdWidth::Span),
            vec![0, 0, 0, 0, 0xDE, 0xAD, 0xBE, 0xF0]
        );
        let trace = id_to_bytes(0xDEAD_BEEF, IdWidth::Trace);
        assert_eq!(trace.len(), 16);
        assert!(trace[..12].iter().all(|b| *b == 0));
        assert_eq!(&trace[12..], &[0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        for (id, width) in [
            (0u128, IdWidth::Span),
            (0x34BF_92DE_EFC5_8C92, IdWidth::Span),
            (u64::MAX as u128, IdWidth::Span),
            (0x6E0C_6325_7DE3_4C92_6F9E_FCD0_3927_272E, IdWidth::Trace),
            (u128::MAX, IdWidth::Trace),
        ] {
            assert_eq!(bytes_to_id(&id_to_bytes(id, width)), id);
        }
    }

    #[test]
    fn keeps_low_bytes_when_too_wide() {
        let id = 0x1111_1111_1111_1111_2222_2222_2222_2222u128;
        assert_eq!(
            bytes_to_id(&id_to_bytes(id, IdWidth::Span)),
            0x2222_2222_2222_2222
        );
    }

    #[test]
    fn signed_conversion() {
        assert_eq!(to_signed_i64(0), 0);
        assert_eq!(to_signed_i64(i64::MAX as u64), i64::MAX);
        assert_eq!(to_signed_i64(i64::MAX as u64 + 1), i64::MIN);
        assert_eq!(to_signed_i64(u64::MAX), -1);
        assert_eq!(to_signed_i64(0xFFFF_FFFF_FFFF_FFFE), -2);
    }

    #[test]
    fn sdk_ids_match_codec() {
        let trace_id = TraceId::from(0x6E0C_6325_7DE3_4C92_6F9E_FCD0_3927_272Eu128);
        let span_id = SpanId::from(0x34BF_92DE_EFC5_8C92u64);
        assert_eq!(trace_id_bytes(trace_id), trace_id.to_bytes().to_vec());
        assert_eq!(span_id_bytes(span_id), span_id.to_bytes().to_vec());
    }
}
