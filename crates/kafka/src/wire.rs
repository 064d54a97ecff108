//! Schema-id envelope placed around every encoded key and value.
//!
//! ```text
//! byte 0      : 0x00 (magic byte)
//! bytes 1-4   : schema id, u32 big-endian
//! bytes 5..N  : schema-encoded payload
//! ```

use crate::error::Field;

pub const MAGIC_BYTE: u8 = 0;
pub const HEADER_LEN: usize = 5;

/// Reason an envelope could not be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    TooShort(usize),
    BadMagic(u8),
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort(len) => write!(f, "expected at least {HEADER_LEN} bytes, got {len}"),
            Self::BadMagic(byte) => write!(f, "unknown magic byte {byte:#04x}"),
        }
    }
}

impl std::error::Error for EnvelopeError {}

impl EnvelopeError {
    pub(crate) fn for_field(self, field: Field) -> crate::Error {
        crate::Error::MalformedEnvelope {
            field,
            reason: self.to_string(),
        }
    }
}

/// Prefix `payload` with the magic byte and `schema_id`.
pub fn frame(payload: &[u8], schema_id: u32) -> Vec<u8> {
    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.push(MAGIC_BYTE);
    framed.extend_from_slice(&schema_id.to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Split framed bytes into the schema id and the payload.
pub fn unframe(bytes: &[u8]) -> Result<(u32, &[u8]), EnvelopeError> {
    if bytes.len() < HEADER_LEN {
        return Err(EnvelopeError::TooShort(bytes.len()));
    }
    if bytes[0] != MAGIC_BYTE {
        return Err(EnvelopeError::BadMagic(bytes[0]));
    }
    let schema_id = u32::from_be_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
    Ok((schema_id, &bytes[HEADER_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let framed = frame(&[0xAA, 0xBB], 0x0102_0304);
        assert_eq!(framed, vec![0x00, 0x01, 0x02, 0x03, 0x04, 0xAA, 0xBB]);
    }

    #[test]
    fn test_unframe_returns_id_and_payload() {
        for id in [0u32, 1, 42, 0x00FF_FF00, u32::MAX] {
            for payload in [&b""[..], &b"x"[..], &[0u8; 300][..]] {
                let framed = frame(payload, id);
                let (decoded_id, decoded_payload) = unframe(&framed).unwrap();
                assert_eq!(decoded_id, id);
                assert_eq!(decoded_payload, payload);
            }
        }
    }

    #[test]
    fn test_unframe_accepts_empty_payload() {
        let (id, payload) = unframe(&[0, 0, 0, 0, 7]).unwrap();
        assert_eq!(id, 7);
        assert!(payload.is_empty());
    }

    #[test]
    fn test_unframe_rejects_short_input() {
        for len in 0..HEADER_LEN {
            let bytes = vec![0u8; len];
            assert_eq!(unframe(&bytes), Err(EnvelopeError::TooShort(len)));
        }
    }

    #[test]
    fn test_unframe_rejects_bad_magic() {
        for magic in [1u8, 0x7F, 0xFF] {
            let mut bytes = frame(b"payload", 3);
            bytes[0] = magic;
            assert_eq!(unframe(&bytes), Err(EnvelopeError::BadMagic(magic)));
        }
    }

    #[test]
    fn test_envelope_error_maps_to_field() {
        let err = EnvelopeError::BadMagic(1).for_field(Field::Value);
        assert_eq!(
            err.to_string(),
            "Malformed value envelope: unknown magic byte 0x01"
        );
    }
}
