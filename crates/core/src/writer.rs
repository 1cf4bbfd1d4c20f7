//! Record-scoped encoder state.
//!
//! A [`Writer`] accumulates the payload bytes of one block at a time while
//! keeping the pointer tag table alive for the whole record, so two blocks of
//! the same record may share a pointee and only one of them serializes it.

use std::collections::HashMap;

use byteorder::{BigEndian, WriteBytesExt};

use crate::arena::{Handle, Ptr};
use crate::codec::Marshal;
use crate::error::{Error, Result};
use crate::wire::{padding, wire_len, MAX_POINTER_ID, NIL_ID, PNTR_MARKER, PTAG_MARKER};

/// Write-side pointer tag table: identity to record-local ID.
#[derive(Debug, Default)]
struct TagTable {
    ids: HashMap<u64, u32>,
    last: u32,
}

impl TagTable {
    fn id_for(&mut self, identity: u64) -> Result<u32> {
        if let Some(&id) = self.ids.get(&identity) {
            return Ok(id);
        }
        if self.last >= MAX_POINTER_ID {
            return Err(Error::PointerIdOverflow);
        }
        self.last += 1;
        self.ids.insert(identity, self.last);
        Ok(self.last)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.last = 0;
    }
}

/// Big-endian payload writer with pointer tagging.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    version: u32,
    tags: TagTable,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Version of the block currently being written.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Start a new record transaction: drops buffered bytes and all tags.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.version = 0;
        self.tags.clear();
    }

    /// Start a new block within the current record. Tags are kept.
    pub fn begin_block(&mut self, version: u32) {
        self.buf.clear();
        self.version = version;
    }

    /// Bytes written since the last [`begin_block`](Self::begin_block).
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Record-local ID assigned to `handle`, if it has been tagged or referenced.
    pub fn id_of<T>(&self, handle: Handle<T>) -> Option<u32> {
        self.tags.ids.get(&handle.to_bits()).copied()
    }

    /// Encode any value through its codec.
    pub fn encode<M: Marshal + ?Sized>(&mut self, value: &M) -> Result<()> {
        value.marshal(self)
    }

    /// Write a `u8`.
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.buf.write_u8(v)?;
        Ok(())
    }

    /// Write an `i8`.
    pub fn write_i8(&mut self, v: i8) -> Result<()> {
        self.buf.write_i8(v)?;
        Ok(())
    }

    /// Write a `u16`.
    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.buf.write_u16::<BigEndian>(v)?;
        Ok(())
    }

    /// Write an `i16`.
    pub fn write_i16(&mut self, v: i16) -> Result<()> {
        self.buf.write_i16::<BigEndian>(v)?;
        Ok(())
    }

    /// Write a `u32`.
    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.buf.write_u32::<BigEndian>(v)?;
        Ok(())
    }

    /// Write an `i32`.
    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.buf.write_i32::<BigEndian>(v)?;
        Ok(())
    }

    /// Write a `u64`.
    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.buf.write_u64::<BigEndian>(v)?;
        Ok(())
    }

    /// Write an `i64`.
    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.buf.write_i64::<BigEndian>(v)?;
        Ok(())
    }

    /// Write an `f32`.
    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.buf.write_f32::<BigEndian>(v)?;
        Ok(())
    }

    /// Write an `f64`.
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.buf.write_f64::<BigEndian>(v)?;
        Ok(())
    }

    /// Write a `bool` as one byte.
    pub fn write_bool(&mut self, v: bool) -> Result<()> {
        self.write_u8(u8::from(v))
    }

    /// Write a length or element count as `u32`.
    pub fn write_len(&mut self, n: usize) -> Result<()> {
        self.write_u32(wire_len(n)?)
    }

    /// Write bytes verbatim: no length prefix, no padding.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write a length-prefixed byte sequence, zero-padded to 4 bytes.
    pub fn write_byte_seq(&mut self, bytes: &[u8]) -> Result<()> {
        self.write_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + padding(bytes.len()), 0);
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string, zero-padded to 4 bytes.
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_byte_seq(s.as_bytes())
    }

    /// Tag `handle` with its record-local identity.
    ///
    /// The first sighting allocates a fresh ID; a handle already referenced
    /// through [`pointer`](Self::pointer) reuses the ID reserved for it.
    pub fn tag<T: 'static>(&mut self, handle: Handle<T>) -> Result<()> {
        let id = self.tags.id_for(handle.to_bits())?;
        self.write_u32(PTAG_MARKER)?;
        self.write_u32(id)
    }

    /// Write a reference to the pointee of `ptr`.
    ///
    /// Nil writes the reserved nil ID. A pointee that has not been tagged yet
    /// gets an ID reserved now; its later tag carries the same ID.
    pub fn pointer<T: 'static>(&mut self, ptr: &Ptr<T>) -> Result<()> {
        let id = match ptr.get() {
            Some(handle) => self.tags.id_for(handle.to_bits())?,
            None => NIL_ID,
        };
        self.write_u32(PNTR_MARKER)?;
        self.write_u32(id)
    }
}
