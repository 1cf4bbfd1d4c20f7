//! Record-scoped decoder state.
//!
//! A [`Reader`] walks a borrowed record body. The framing layer narrows it to
//! one block at a time with [`set_window`](Reader::set_window); the pointer
//! relocation table spans every block of the record and is flushed by
//! [`relocate`](Reader::relocate).

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};

use crate::arena::{Handle, Ptr, NIL_BITS};
use crate::codec::Unmarshal;
use crate::error::{Error, Result};
use crate::wire::{align4, MAX_POINTER_ID, NIL_ID, PNTR_MARKER, PTAG_MARKER};

/// A pointer slot waiting for its target to be tagged.
struct Placeholder {
    slot: Arc<AtomicU64>,
    type_id: TypeId,
}

/// Read-side pointer relocation table.
#[derive(Default)]
struct Relocator {
    bound: HashMap<u32, (TypeId, u64)>,
    pending: HashMap<u32, Vec<Placeholder>>,
}

impl Relocator {
    fn bind(&mut self, id: u32, type_id: TypeId, bits: u64) -> Result<()> {
        self.bound.insert(id, (type_id, bits));
        if let Some(waiting) = self.pending.remove(&id) {
            for p in waiting {
                if p.type_id != type_id {
                    return Err(Error::PointerTypeMismatch { id });
                }
                p.slot.store(bits, Ordering::Release);
            }
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.bound.clear();
        self.pending.clear();
    }
}

/// Big-endian payload reader with pointer relocation.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    end: usize,
    version: u32,
    relocator: Relocator,
}

impl<'a> Reader<'a> {
    /// Read from `data`, with the window spanning all of it.
    pub fn new(data: &'a [u8]) -> Self {
        Reader {
            data,
            pos: 0,
            end: data.len(),
            version: 0,
            relocator: Relocator::default(),
        }
    }

    /// Version of the block currently being read.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Set the version reported to payload codecs.
    pub fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    /// The full underlying buffer.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Absolute read position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// End of the current window.
    pub fn limit(&self) -> usize {
        self.end
    }

    /// Bytes left in the current window.
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }

    /// Whether the current window is exhausted.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Restrict reads to `data[start..start + len]`, clamped to the buffer.
    pub fn set_window(&mut self, start: usize, len: usize) {
        let start = start.min(self.data.len());
        self.pos = start;
        self.end = start.saturating_add(len).min(self.data.len());
    }

    /// Widen the window to the end of the buffer, keeping the position.
    pub fn clear_window(&mut self) {
        self.end = self.data.len();
    }

    /// Move to `pos`, clamped to the buffer. The window end is unchanged
    /// unless `pos` lies beyond it.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.data.len());
        if self.pos > self.end {
            self.end = self.pos;
        }
    }

    /// Advance by `n` bytes within the window, stopping at its end.
    pub fn skip(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.end);
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(Error::UnexpectedEnd {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Decode any value in place through its codec.
    pub fn decode<U: Unmarshal + ?Sized>(&mut self, value: &mut U) -> Result<()> {
        value.unmarshal(self)
    }

    /// Read a `u8`.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Read an `i8`.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    /// Read a `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    /// Read an `i16`.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    /// Read a `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    /// Read an `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(BigEndian::read_i32(self.take(4)?))
    }

    /// Read a `u64`.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(self.take(8)?))
    }

    /// Read an `i64`.
    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    /// Read an `f32`.
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    /// Read an `f64`.
    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }

    /// Read a one-byte `bool`. Any non-zero byte is `true`.
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a `u32` length or element count.
    pub fn read_len(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    /// Read `n` bytes verbatim.
    pub fn read_raw(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Read a length-prefixed, 4-byte padded byte sequence.
    pub fn read_byte_seq(&mut self) -> Result<&'a [u8]> {
        let n = self.read_len()?;
        self.read_padded(n)
    }

    /// Read `n` bytes followed by their padding to a 4-byte boundary.
    pub fn read_padded(&mut self, n: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining || align4(n) > remaining {
            return Err(Error::UnexpectedEnd {
                needed: n.saturating_add(3) & !3,
                remaining,
            });
        }
        let padded = align4(n);
        let bytes = self.take(padded)?;
        Ok(&bytes[..n])
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_byte_seq()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidUtf8)
    }

    fn read_pointer_id(&mut self, expected: u32) -> Result<u32> {
        let marker = self.read_u32()?;
        if marker != expected {
            return Err(Error::BadPointerMarker {
                expected,
                found: marker,
            });
        }
        let id = self.read_u32()?;
        if id > MAX_POINTER_ID {
            return Err(Error::PointerIdOverflow);
        }
        Ok(id)
    }

    /// Read the pointer tag of a freshly decoded value living at `handle`.
    ///
    /// Pointers already waiting on this ID are patched immediately.
    pub fn tag<T: 'static>(&mut self, handle: Handle<T>) -> Result<()> {
        let id = self.read_pointer_id(PTAG_MARKER)?;
        if id == NIL_ID {
            return Ok(());
        }
        self.relocator
            .bind(id, TypeId::of::<T>(), handle.to_bits())
    }

    /// Read a pointer reference into `ptr`.
    ///
    /// `ptr` is replaced by a fresh slot. When the target is already known the
    /// slot is filled at once; otherwise it stays nil until the target's tag
    /// is read, or until [`relocate`](Self::relocate) gives up on it.
    pub fn pointer<T: 'static>(&mut self, ptr: &mut Ptr<T>) -> Result<()> {
        let id = self.read_pointer_id(PNTR_MARKER)?;
        if id == NIL_ID {
            *ptr = Ptr::null();
            return Ok(());
        }

        let type_id = TypeId::of::<T>();
        if let Some(&(bound_type, bits)) = self.relocator.bound.get(&id) {
            if bound_type != type_id {
                return Err(Error::PointerTypeMismatch { id });
            }
            *ptr = Ptr::from_bits(bits);
            return Ok(());
        }

        *ptr = Ptr::null();
        self.relocator
            .pending
            .entry(id)
            .or_default()
            .push(Placeholder {
                slot: ptr.slot(),
                type_id,
            });
        Ok(())
    }

    /// Number of pointer slots still waiting on a target.
    pub fn pending(&self) -> usize {
        self.relocator.pending.values().map(Vec::len).sum()
    }

    /// Finish the record: unresolved pointers become nil and the tables are
    /// emptied. Returns the number of pointers left unresolved.
    pub fn relocate(&mut self) -> usize {
        let mut dangling = 0;
        for (id, waiting) in self.relocator.pending.drain() {
            for p in waiting {
                p.slot.store(NIL_BITS, Ordering::Release);
                dangling += 1;
            }
            tracing::trace!(id = id, "pointer target never tagged");
        }
        if dangling > 0 {
            tracing::debug!(dangling = dangling, "unresolved pointers set to nil");
        }
        self.relocator.clear();
        dangling
    }
}

impl std::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("len", &self.data.len())
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("version", &self.version)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::writer::Writer;

    #[test]
    fn test_read_scalars() {
        let data = [1, 2, 3, 4, 0xff, 0xfe, 1];
        let mut r = Reader::new(&data);
        assert_eq!(r.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert!(r.read_bool().unwrap());
        assert!(r.is_empty());
    }

    #[test]
    fn test_read_past_end() {
        let data = [0, 0];
        let mut r = Reader::new(&data);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedEnd {
                needed: 4,
                remaining: 2
            }
        ));
    }

    #[test]
    fn test_window_limits_reads() {
        let data = [0u8; 16];
        let mut r = Reader::new(&data);
        r.set_window(4, 4);
        assert_eq!(r.read_u32().unwrap(), 0);
        assert!(r.read_u8().unwrap_err().is_unexpected_end());
        r.clear_window();
        assert_eq!(r.remaining(), 8);
    }

    #[test]
    fn test_read_string_consumes_padding() {
        let mut w = Writer::new();
        w.write_str("abcde").unwrap();
        w.write_u32(9).unwrap();

        let mut r = Reader::new(w.bytes());
        assert_eq!(r.read_string().unwrap(), "abcde");
        assert_eq!(r.read_u32().unwrap(), 9);
    }

    #[test]
    fn test_invalid_utf8() {
        let data = [0, 0, 0, 2, 0xc3, 0x28, 0, 0];
        let mut r = Reader::new(&data);
        assert!(matches!(r.read_string(), Err(Error::InvalidUtf8)));
    }

    #[test]
    fn test_pointer_after_tag_resolves_immediately() {
        let mut arena = Arena::new();
        let h = arena.push(5u32);

        let data = [0xff, 0xff, 0xff, 0xff, 0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 3];
        let mut r = Reader::new(&data);
        r.tag(h).unwrap();
        let mut ptr = Ptr::<u32>::null();
        r.pointer(&mut ptr).unwrap();
        assert_eq!(ptr.get(), Some(h));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_pointer_before_tag_is_patched() {
        let mut arena = Arena::new();
        let h = arena.push(5u32);

        let data = [0, 0, 0, 0, 0, 0, 0, 7, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 7];
        let mut r = Reader::new(&data);
        let mut ptr = Ptr::<u32>::null();
        r.pointer(&mut ptr).unwrap();
        assert!(ptr.is_null());
        assert_eq!(r.pending(), 1);

        r.tag(h).unwrap();
        assert_eq!(ptr.get(), Some(h));
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_relocate_nils_dangling() {
        let data = [0, 0, 0, 0, 0, 0, 0, 9];
        let mut r = Reader::new(&data);
        let mut ptr = Ptr::<u32>::null();
        r.pointer(&mut ptr).unwrap();
        assert_eq!(r.relocate(), 1);
        assert!(ptr.is_null());
        assert_eq!(r.pending(), 0);
    }

    #[test]
    fn test_type_mismatch() {
        let mut arena = Arena::new();
        let h = arena.push(5u32);

        let data = [0xff, 0xff, 0xff, 0xff, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
        let mut r = Reader::new(&data);
        r.tag(h).unwrap();
        let mut ptr = Ptr::<String>::null();
        assert!(matches!(
            r.pointer(&mut ptr),
            Err(Error::PointerTypeMismatch { id: 1 })
        ));
    }

    #[test]
    fn test_bad_pointer_marker() {
        let data = [0, 0, 0, 1, 0, 0, 0, 1];
        let mut r = Reader::new(&data);
        let mut ptr = Ptr::<u32>::null();
        assert!(matches!(
            r.pointer(&mut ptr),
            Err(Error::BadPointerMarker { found: 1, .. })
        ));
    }

    #[test]
    fn test_reserved_id_rejected() {
        let data = [0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        let mut r = Reader::new(&data);
        let mut ptr = Ptr::<u32>::null();
        assert!(matches!(
            r.pointer(&mut ptr),
            Err(Error::PointerIdOverflow)
        ));
    }
}
