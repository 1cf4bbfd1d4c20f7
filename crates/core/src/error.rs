//! Error types for SIO streams
//!
//! Every failure while encoding or decoding a record surfaces as one of these
//! variants. We use `thiserror` for `Display` and `Error`.

use std::io;
use thiserror::Error;

/// Result type alias for SIO operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SIO record streams
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying byte stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record header did not carry the record marker
    #[error("no record marker (found {found:#010x})")]
    NoRecordMarker {
        /// Marker value actually read
        found: u32,
    },

    /// Block header did not carry the block marker
    #[error("no block marker (found {found:#010x})")]
    NoBlockMarker {
        /// Marker value actually read
        found: u32,
    },

    /// A block name was connected twice to a record opened for writing
    #[error("block [{block}] already connected to record [{record}]")]
    BlockAlreadyConnected {
        /// Block name
        block: String,
        /// Record name
        record: String,
    },

    /// A block payload did not consume exactly its declared length
    #[error("block [{block}] short read: expected {expected} bytes, consumed {consumed}")]
    BlockShortRead {
        /// Block name
        block: String,
        /// Declared payload length
        expected: usize,
        /// Bytes actually consumed (or available)
        consumed: usize,
    },

    /// No more pointer IDs can be allocated in this record
    #[error("pointer ID overflow")]
    PointerIdOverflow,

    /// A pointer tag or pointer reference was not preceded by its marker
    #[error("bad pointer marker: expected {expected:#010x}, found {found:#010x}")]
    BadPointerMarker {
        /// Marker that should have been read
        expected: u32,
        /// Marker actually read
        found: u32,
    },

    /// A pointer and the value tagged with its ID disagree on the pointee type
    #[error("pointer ID {id} resolves to a value of a different type")]
    PointerTypeMismatch {
        /// Pointer ID
        id: u32,
    },

    /// A read ran past the end of the available bytes
    #[error("unexpected end of data: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd {
        /// Bytes requested
        needed: usize,
        /// Bytes left in the current window
        remaining: usize,
    },

    /// A decoded string was not valid UTF-8
    #[error("invalid UTF-8 in string")]
    InvalidUtf8,

    /// A length does not fit the 32-bit wire representation
    #[error("length {0} does not fit in 32 bits")]
    LengthOverflow(usize),

    /// A record header announced more bytes than the configured maximum
    #[error("record length {len} exceeds maximum {max}")]
    RecordTooLarge {
        /// Declared record length
        len: u32,
        /// Configured maximum
        max: u32,
    },

    /// The stream held a different record than the one being read
    #[error("expected record [{expected}], found [{found}]")]
    UnexpectedRecord {
        /// Name of the record being read
        expected: String,
        /// Name found in the stream
        found: String,
    },

    /// No record with this name is registered
    #[error("unknown record [{0}]")]
    UnknownRecord(String),

    /// Record body compression or decompression failed
    #[error("codec error: {0}")]
    Codec(String),

    /// A linker callback failed
    #[error("linking block [{block}] failed: {reason}")]
    Link {
        /// Block name
        block: String,
        /// Failure description
        reason: String,
    },
}

impl Error {
    /// Whether this error means the data ended early.
    pub fn is_unexpected_end(&self) -> bool {
        matches!(self, Error::UnexpectedEnd { .. })
    }
}
