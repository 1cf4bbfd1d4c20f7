//! Wire constants and alignment helpers.
//!
//! All multi-byte integers are big-endian. Variable-length byte runs (names,
//! strings, byte sequences, block payloads) are zero-padded to a 4-byte
//! boundary; the padding is never counted in the declared length.

use crate::error::{Error, Result};

/// Marker identifying a record header.
pub const RECORD_MARKER: u32 = 0xabad_cafe;

/// Marker identifying a block header.
pub const BLOCK_MARKER: u32 = 0xdead_beef;

/// Big-endian byte pattern of [`BLOCK_MARKER`], used when resynchronising.
pub const BLOCK_MARKER_BYTES: [u8; 4] = BLOCK_MARKER.to_be_bytes();

/// Marker preceding a pointer tag (the identity of a value).
pub const PTAG_MARKER: u32 = 0xffff_ffff;

/// Marker preceding a pointer reference.
pub const PNTR_MARKER: u32 = 0x0000_0000;

/// Pointer ID reserved for nil.
pub const NIL_ID: u32 = 0;

/// Largest pointer ID a record may allocate.
pub const MAX_POINTER_ID: u32 = u32::MAX - 1;

/// Record option bit: body is compressed.
pub const OPT_COMPRESS: u32 = 0x0000_0001;

/// Size of a block header: length + marker.
pub const BLOCK_HEADER_SIZE: usize = 8;

/// Size of a block data preamble: version + name length.
pub const BLOCK_PREAMBLE_SIZE: usize = 8;

/// Size of a record header: length + marker.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Size of a record preamble: options + uncompressed length + name length.
pub const RECORD_PREAMBLE_SIZE: usize = 12;

/// Round `n` up to the next multiple of 4.
#[inline]
pub const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Round a 32-bit length up to the next multiple of 4.
#[inline]
pub const fn align4_u32(n: u32) -> u32 {
    n.wrapping_add(3) & !3
}

/// Number of zero bytes needed after `n` bytes to reach a 4-byte boundary.
#[inline]
pub const fn padding(n: usize) -> usize {
    align4(n) - n
}

/// Convert a host length to its 32-bit wire form.
pub fn wire_len(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::LengthOverflow(n))
}

/// Block format version as `major << 16 | minor`.
///
/// The framing layer writes the raw value verbatim and never interprets it;
/// this type is only a convenience for payloads that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version(u32);

impl Version {
    /// Build a version from its major and minor parts.
    pub const fn new(major: u16, minor: u16) -> Self {
        Version(((major as u32) << 16) | minor as u32)
    }

    /// Wrap a raw wire value.
    pub const fn from_raw(raw: u32) -> Self {
        Version(raw)
    }

    /// Raw wire value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Major part.
    pub const fn major(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Minor part.
    pub const fn minor(self) -> u16 {
        (self.0 & 0xffff) as u16
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

impl From<u32> for Version {
    fn from(raw: u32) -> Self {
        Version(raw)
    }
}

impl From<Version> for u32 {
    fn from(v: Version) -> Self {
        v.0
    }
}
