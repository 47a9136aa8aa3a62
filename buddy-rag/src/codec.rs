//! Persisted embedding byte format.
//!
//! An embedding is stored as the little-endian IEEE-754 binary32 encoding
//! of each component, in order, with no header: `dimension × 4` bytes. The
//! format name is recorded alongside the data so a future layout change can
//! be detected instead of misread.

use crate::error::{RagError, Result};

/// Name of the embedding byte layout written by this crate.
pub const EMBEDDING_FORMAT: &str = "f32le-v1";

/// Encode an embedding as contiguous little-endian `f32`s.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode an [`encode_embedding`] buffer.
///
/// # Errors
///
/// Returns [`RagError::Decode`] if the buffer is empty or its length is not a
/// multiple of 4.
pub fn decode_embedding(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() {
        return Err(RagError::Decode("embedding blob is empty".to_string()));
    }
    if bytes.len() % 4 != 0 {
        return Err(RagError::Decode(format!(
            "embedding blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_little_endian_without_header() {
        let bytes = encode_embedding(&[1.0, -2.5]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(decode_embedding(&bytes).unwrap(), vec![1.0, -2.5]);
    }

    #[test]
    fn truncated_blob_is_a_decode_error() {
        let mut bytes = encode_embedding(&[0.25, 0.5, 0.75]);
        bytes.pop();
        assert!(matches!(decode_embedding(&bytes), Err(RagError::Decode(_))));
    }

    #[test]
    fn empty_blob_is_a_decode_error() {
        assert!(matches!(decode_embedding(&[]), Err(RagError::Decode(_))));
    }
}
