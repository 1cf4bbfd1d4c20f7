//! Record body compression.
//!
//! A record whose options carry the compression bit stores its body through a
//! [`RecordCodec`]. The codec is a seam: zstd is the default, the identity
//! codec exists for tests and for callers who want the framing without the
//! cost.

use std::io::{Read, Write};

/// Default zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Compressor/decompressor pair used for record bodies.
///
/// Codecs are stateful so they can hold reusable contexts; a record calls
/// [`reset`](RecordCodec::reset) before each use.
pub trait RecordCodec: Send {
    /// Compress `src`, appending the result to `dst`.
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Decompress `src`, appending exactly `expected_len` bytes to `dst`.
    fn decompress(
        &mut self,
        src: &[u8],
        expected_len: usize,
        dst: &mut Vec<u8>,
    ) -> Result<(), CodecError>;

    /// Drop any state carried over from a previous record.
    fn reset(&mut self) -> Result<(), CodecError> {
        Ok(())
    }

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Compression failed.
    #[error("Encode error (codec={codec_id}): {detail}")]
    EncodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the encode
        codec_id: String,
    },

    /// Decompression failed (corrupt input, wrong codec).
    #[error("Decode error (codec={codec_id}, data_len={data_len}): {detail}")]
    DecodeError {
        /// Human-readable error description
        detail: String,
        /// Codec ID that attempted the decode
        codec_id: String,
        /// Length of the data that failed to decode
        data_len: usize,
    },

    /// Decompressed size disagrees with the size declared in the record.
    #[error("Length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Declared uncompressed length
        expected: usize,
        /// Bytes actually produced
        actual: usize,
    },

    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
}

impl CodecError {
    /// Create a decode error with full diagnostic context.
    pub fn decode(detail: impl Into<String>, codec_id: impl Into<String>, data_len: usize) -> Self {
        CodecError::DecodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
            data_len,
        }
    }

    /// Create an encode error.
    pub fn encode(detail: impl Into<String>, codec_id: impl Into<String>) -> Self {
        CodecError::EncodeError {
            detail: detail.into(),
            codec_id: codec_id.into(),
        }
    }
}

impl From<CodecError> for sio_core::Error {
    fn from(e: CodecError) -> Self {
        sio_core::Error::Codec(e.to_string())
    }
}

/// Pass-through codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCodec;

impl RecordCodec for IdentityCodec {
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        dst.extend_from_slice(src);
        Ok(())
    }

    fn decompress(
        &mut self,
        src: &[u8],
        expected_len: usize,
        dst: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        if src.len() != expected_len {
            return Err(CodecError::LengthMismatch {
                expected: expected_len,
                actual: src.len(),
            });
        }
        dst.extend_from_slice(src);
        Ok(())
    }

    fn codec_id(&self) -> &str {
        "identity"
    }
}

/// zstd codec.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    /// Create a zstd codec at the given compression level.
    pub fn new(level: i32) -> Self {
        ZstdCodec { level }
    }

    /// Compression level.
    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        ZstdCodec::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl RecordCodec for ZstdCodec {
    fn compress(&mut self, src: &[u8], dst: &mut Vec<u8>) -> Result<(), CodecError> {
        let mut encoder = zstd::Encoder::new(dst, self.level)
            .map_err(|e| CodecError::encode(format!("zstd encoder: {}", e), "zstd"))?;
        encoder
            .write_all(src)
            .map_err(|e| CodecError::encode(format!("zstd write: {}", e), "zstd"))?;
        encoder
            .finish()
            .map_err(|e| CodecError::encode(format!("zstd finish: {}", e), "zstd"))?;
        Ok(())
    }

    fn decompress(
        &mut self,
        src: &[u8],
        expected_len: usize,
        dst: &mut Vec<u8>,
    ) -> Result<(), CodecError> {
        let decoder = zstd::Decoder::new(src)
            .map_err(|e| CodecError::decode(format!("zstd decode: {}", e), "zstd", src.len()))?;

        let start = dst.len();
        dst.reserve(expected_len);
        // One byte past the expected length is enough to detect an oversized body.
        decoder
            .take(expected_len as u64 + 1)
            .read_to_end(dst)
            .map_err(|e| CodecError::decode(format!("zstd read: {}", e), "zstd", src.len()))?;

        let actual = dst.len() - start;
        if actual != expected_len {
            dst.truncate(start);
            return Err(CodecError::LengthMismatch {
                expected: expected_len,
                actual,
            });
        }
        Ok(())
    }

    fn codec_id(&self) -> &str {
        "zstd"
    }
}

/// Resolve a codec identifier.
///
/// `level` is only used by codecs that have one.
pub fn get_codec(codec_id: &str, level: i32) -> Result<Box<dyn RecordCodec>, CodecError> {
    match codec_id {
        "identity" => Ok(Box::new(IdentityCodec)),
        "zstd" => Ok(Box::new(ZstdCodec::new(level))),
        other => Err(CodecError::UnknownCodec(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that trait is object-safe
    fn _accepts_box_dyn_codec(_codec: Box<dyn RecordCodec>) {}

    fn roundtrip(codec: &mut dyn RecordCodec, data: &[u8]) -> Vec<u8> {
        let mut packed = Vec::new();
        codec.compress(data, &mut packed).unwrap();
        let mut out = Vec::new();
        codec.decompress(&packed, data.len(), &mut out).unwrap();
        out
    }

    #[test]
    fn test_identity_roundtrip() {
        let data: Vec<u8> = (0..=255).collect();
        assert_eq!(roundtrip(&mut IdentityCodec, &data), data);
    }

    #[test]
    fn test_zstd_roundtrip_and_shrinks() {
        let data: Vec<u8> = (0..100_000).map(|i| (i % 7) as u8).collect();
        let mut codec = ZstdCodec::default();

        let mut packed = Vec::new();
        codec.compress(&data, &mut packed).unwrap();
        assert!(packed.len() < data.len() / 10);

        assert_eq!(roundtrip(&mut codec, &data), data);
    }

    #[test]
    fn test_zstd_empty() {
        let mut codec = ZstdCodec::new(1);
        assert!(roundtrip(&mut codec, b"").is_empty());
    }

    #[test]
    fn test_zstd_length_mismatch() {
        let data = vec![9u8; 1000];
        let mut codec = ZstdCodec::default();
        let mut packed = Vec::new();
        codec.compress(&data, &mut packed).unwrap();

        let mut out = Vec::new();
        let err = codec.decompress(&packed, 999, &mut out).unwrap_err();
        assert_eq!(
            err,
            CodecError::LengthMismatch {
                expected: 999,
                actual: 1000
            }
        );
        assert!(out.is_empty());

        let err = codec.decompress(&packed, 1001, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch { actual: 1000, .. }));
    }

    #[test]
    fn test_zstd_garbage_input() {
        let mut codec = ZstdCodec::default();
        let mut out = Vec::new();
        let err = codec.decompress(b"not zstd at all", 10, &mut out).unwrap_err();
        assert!(matches!(err, CodecError::DecodeError { .. }));
    }

    #[test]
    fn test_get_codec() {
        assert_eq!(get_codec("identity", 0).unwrap().codec_id(), "identity");
        assert_eq!(get_codec("zstd", 5).unwrap().codec_id(), "zstd");
        assert!(matches!(
            get_codec("lz4", 0),
            Err(CodecError::UnknownCodec(_))
        ));
    }

    #[test]
    fn test_codec_error_into_core_error() {
        let err: sio_core::Error = CodecError::UnknownCodec("x".into()).into();
        assert!(matches!(err, sio_core::Error::Codec(_)));
    }
}
