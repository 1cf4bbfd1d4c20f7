//! Record and block headers.
//!
//! ```text
//! record:  len u32 | 0xabadcafe | options u32 | ucmp_len u32 | name_len u32 | name+pad | body | pad
//! block:   len u32 | 0xdeadbeef | version u32 | name_len u32 | name+pad | payload | pad
//! ```
//!
//! A record's `len` is the stored (possibly compressed) body length. A block's
//! `len` covers its header, preamble, padded name and payload, but not the
//! trailing payload padding.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt};
use sio_core::wire::{
    align4, padding, wire_len, BLOCK_HEADER_SIZE, BLOCK_MARKER, BLOCK_PREAMBLE_SIZE,
    OPT_COMPRESS, RECORD_HEADER_SIZE, RECORD_MARKER, RECORD_PREAMBLE_SIZE,
};
use sio_core::{Error, Reader, Result, Writer};

/// Zero bytes used for padding.
const ZEROS: [u8; 4] = [0; 4];

/// Header and preamble of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    /// Stored body length, excluding trailing padding.
    pub len: u32,
    /// Option bits.
    pub options: u32,
    /// Body length before compression.
    pub ucmp_len: u32,
    /// Record name.
    pub name: String,
}

impl RecordHeader {
    /// Whether the body is compressed.
    pub fn is_compressed(&self) -> bool {
        self.options & OPT_COMPRESS != 0
    }

    /// Bytes occupied by header, preamble and padded name.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + RECORD_PREAMBLE_SIZE + align4(self.name.len())
    }

    /// Bytes occupied by the stored body and its padding.
    pub fn body_len(&self) -> usize {
        align4(self.len as usize)
    }

    /// Write header, preamble and padded name. Returns the bytes written.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> Result<u64> {
        let mut w = Writer::new();
        w.write_u32(self.len)?;
        w.write_u32(RECORD_MARKER)?;
        w.write_u32(self.options)?;
        w.write_u32(self.ucmp_len)?;
        w.write_str(&self.name)?;
        out.write_all(w.bytes())?;
        Ok(w.len() as u64)
    }

    /// Read a header from `input`.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before the first byte.
    /// Any length larger than `max_len` fails with [`Error::RecordTooLarge`].
    pub fn read_from<R: Read + ?Sized>(input: &mut R, max_len: u32) -> Result<Option<Self>> {
        let mut first = [0u8; 4];
        if !read_exact_or_eof(input, &mut first)? {
            return Ok(None);
        }
        let len = u32::from_be_bytes(first);

        let marker = input.read_u32::<BigEndian>()?;
        if marker != RECORD_MARKER {
            return Err(Error::NoRecordMarker { found: marker });
        }

        let options = input.read_u32::<BigEndian>()?;
        let ucmp_len = input.read_u32::<BigEndian>()?;
        let name_len = input.read_u32::<BigEndian>()?;
        for n in [len, ucmp_len, name_len] {
            if n > max_len {
                return Err(Error::RecordTooLarge { len: n, max: max_len });
            }
        }

        let mut name = vec![0u8; align4(name_len as usize)];
        input.read_exact(&mut name)?;
        name.truncate(name_len as usize);
        let name = String::from_utf8(name).map_err(|_| Error::InvalidUtf8)?;

        Ok(Some(RecordHeader {
            len,
            options,
            ucmp_len,
            name,
        }))
    }
}

/// Fill `buf`, or report a clean end of stream if nothing at all was read.
fn read_exact_or_eof<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(true)
}

/// Header and preamble of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Header + preamble + padded name + payload length.
    pub len: u32,
    /// Opaque payload version.
    pub version: u32,
    /// Block name.
    pub name: String,
}

impl BlockHeader {
    /// Bytes before the payload.
    pub fn prefix_len(&self) -> usize {
        BLOCK_HEADER_SIZE + BLOCK_PREAMBLE_SIZE + align4(self.name.len())
    }

    /// Declared payload length, or `None` if `len` is too small to hold the
    /// header and name.
    pub fn payload_len(&self) -> Option<usize> {
        (self.len as usize).checked_sub(self.prefix_len())
    }

    /// Read a block header at the reader's position.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let len = r.read_u32()?;
        let marker = r.read_u32()?;
        if marker != BLOCK_MARKER {
            return Err(Error::NoBlockMarker { found: marker });
        }
        let version = r.read_u32()?;
        let name = r.read_string()?;
        Ok(BlockHeader { len, version, name })
    }
}

/// Append one framed block to `body`.
pub(crate) fn write_block(body: &mut Vec<u8>, name: &str, version: u32, payload: &[u8]) -> Result<()> {
    let len = BLOCK_HEADER_SIZE + BLOCK_PREAMBLE_SIZE + align4(name.len()) + payload.len();
    let len = wire_len(len)?;

    body.extend_from_slice(&len.to_be_bytes());
    body.extend_from_slice(&BLOCK_MARKER.to_be_bytes());
    body.extend_from_slice(&version.to_be_bytes());
    body.extend_from_slice(&wire_len(name.len())?.to_be_bytes());
    body.extend_from_slice(name.as_bytes());
    body.extend_from_slice(&ZEROS[..padding(name.len())]);
    body.extend_from_slice(payload);
    body.extend_from_slice(&ZEROS[..padding(payload.len())]);
    Ok(())
}

/// Write `bytes` followed by zero padding. Returns the bytes written.
pub(crate) fn write_padded<W: Write + ?Sized>(out: &mut W, bytes: &[u8]) -> Result<u64> {
    out.write_all(bytes)?;
    let pad = padding(bytes.len());
    out.write_all(&ZEROS[..pad])?;
    Ok((bytes.len() + pad) as u64)
}
