//! Record framing and streams for SIO
//!
//! This crate turns payload codecs from `sio-core` into a byte stream:
//! - Block: named, versioned payload with an optional post-read [`Linker`]
//! - Record: ordered blocks written and read as one unit
//! - Format: record and block headers
//! - Compress: record body codecs (zstd, identity)
//! - Config: [`StreamConfig`]
//! - Stream: registry of records over any reader or writer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod compress;
pub mod config;
pub mod format;
pub mod record;
pub mod stream;

pub use block::{Block, Linker, Payload};
pub use compress::{get_codec, CodecError, IdentityCodec, RecordCodec, ZstdCodec};
pub use config::{StreamConfig, StreamConfigError};
pub use format::{BlockHeader, RecordHeader};
pub use record::{Access, Record};
pub use stream::Stream;
