//! Wire primitives and pointer tagging for SIO
//!
//! This crate holds everything below the record framing:
//! - Wire constants, alignment helpers and [`Version`]
//! - [`Writer`] / [`Reader`]: big-endian payload encoding with record-scoped
//!   pointer tables
//! - [`Marshal`] / [`Unmarshal`]: per-type codecs, plus [`sio_fields!`] for structs
//! - [`Arena`], [`Handle`] and [`Ptr`]: pointable storage and patchable pointers
//! - [`Encoder`] / [`Decoder`]: sticky-error facades
//! - Error: error type for every layer

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod arena;
pub mod codec;
pub mod error;
pub mod facade;
pub mod reader;
pub mod wire;
pub mod writer;

pub use arena::{Arena, Handle, Ptr};
pub use codec::{Marshal, Unmarshal};
pub use error::{Error, Result};
pub use facade::{Decoder, Encoder};
pub use reader::Reader;
pub use wire::{align4, Version};
pub use writer::Writer;
