//! Stream configuration.

use serde::{Deserialize, Serialize};

use crate::compress::DEFAULT_COMPRESSION_LEVEL;

/// Smallest record a stream can carry: header plus preamble.
pub const MIN_RECORD_LEN: u32 = 16;

/// Default bound on a record's stored and uncompressed body length.
pub const DEFAULT_MAX_RECORD_LEN: u32 = 256 * 1024 * 1024;

/// Stream configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// zstd level for compressed records (default: 3).
    pub compression_level: i32,

    /// Whether records created by the stream start with compression on
    /// (default: false).
    pub compress_records: bool,

    /// Largest stored record body accepted on read (default: 256MB).
    ///
    /// Guards against allocating for a corrupt length field.
    pub max_record_len: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            compress_records: false,
            max_record_len: DEFAULT_MAX_RECORD_LEN,
        }
    }
}

impl StreamConfig {
    /// Create a new stream configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set compression level (builder pattern).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Set whether new records are compressed (builder pattern).
    pub fn with_compress_records(mut self, compress: bool) -> Self {
        self.compress_records = compress;
        self
    }

    /// Set maximum record length (builder pattern).
    pub fn with_max_record_len(mut self, len: u32) -> Self {
        self.max_record_len = len;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), StreamConfigError> {
        if !(1..=22).contains(&self.compression_level) {
            return Err(StreamConfigError::InvalidCompressionLevel(
                self.compression_level,
            ));
        }
        if self.max_record_len < MIN_RECORD_LEN {
            return Err(StreamConfigError::MaxRecordLenTooSmall);
        }
        Ok(())
    }

    /// Create a configuration for tests: compression on, small records.
    pub fn for_testing() -> Self {
        StreamConfig {
            compression_level: 1,
            compress_records: true,
            max_record_len: 1024 * 1024, // 1MB
        }
    }
}

/// Stream configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamConfigError {
    /// Compression level outside the zstd range.
    #[error("Compression level must be between 1 and 22, got {0}")]
    InvalidCompressionLevel(i32),

    /// Maximum record length below the fixed framing overhead.
    #[error("Maximum record length must be at least 16 bytes")]
    MaxRecordLenTooSmall,
}
