//! Arena storage, typed handles and patchable pointers.
//!
//! Values that other values point to live in an [`Arena`]. A reference is a
//! [`Handle`]: the arena's identity plus an index. Arena identities are unique
//! for the lifetime of the process and are renewed when an arena is cleared,
//! so a handle from a previous record never resolves against refilled storage.
//!
//! A [`Ptr`] is a nullable pointer slot. On read it may be handed out before
//! its target is known; the slot is shared with the decoder's pending table
//! and patched in place once the target is tagged.

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::codec::{Marshal, Unmarshal};
use crate::error::Result;
use crate::reader::Reader;
use crate::writer::Writer;

/// Bit pattern of an empty pointer slot. Arena id `u32::MAX` is never issued.
pub(crate) const NIL_BITS: u64 = u64::MAX;

/// Most values one arena holds: handles carry a `u32` index.
pub const MAX_ARENA_LEN: u64 = u32::MAX as u64 + 1;

/// Index the next value pushed after `len` others receives.
fn next_index(len: usize) -> u32 {
    match u32::try_from(len) {
        Ok(index) => index,
        Err(_) => panic!("arena is full ({MAX_ARENA_LEN} values)"),
    }
}

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

fn next_arena_id() -> u32 {
    loop {
        let id = NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed);
        if id != 0 && id != u32::MAX {
            return id;
        }
    }
}

/// Typed index of a value inside an [`Arena`].
pub struct Handle<T> {
    arena: u32,
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    fn new(arena: u32, index: u32) -> Self {
        Handle {
            arena,
            index,
            _marker: PhantomData,
        }
    }

    /// Position of the value in its arena.
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// Identity of the arena this handle belongs to.
    pub fn arena_id(&self) -> u32 {
        self.arena
    }

    pub(crate) fn to_bits(self) -> u64 {
        (u64::from(self.arena) << 32) | u64::from(self.index)
    }

    pub(crate) fn from_bits(bits: u64) -> Option<Self> {
        if bits == NIL_BITS {
            return None;
        }
        Some(Handle::new((bits >> 32) as u32, bits as u32))
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.arena == other.arena && self.index == other.index
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.to_bits().hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}:{})", self.arena, self.index)
    }
}

/// Owner of pointable values.
///
/// As a codec, an arena writes its element count followed by each element and
/// the pointer tag of its handle, so elements can be referenced from anywhere
/// in the same record.
pub struct Arena<T> {
    id: u32,
    items: Vec<T>,
}

impl<T> Arena<T> {
    /// Create an empty arena with a fresh identity.
    pub fn new() -> Self {
        Arena {
            id: next_arena_id(),
            items: Vec::new(),
        }
    }

    /// Create an empty arena with room for `capacity` values.
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            id: next_arena_id(),
            items: Vec::with_capacity(capacity),
        }
    }

    /// Identity of this arena.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Store a value and return its handle.
    ///
    /// # Panics
    ///
    /// Panics if the arena already holds [`MAX_ARENA_LEN`] values.
    pub fn push(&mut self, value: T) -> Handle<T> {
        let index = next_index(self.items.len());
        self.items.push(value);
        Handle::new(self.id, index)
    }

    /// Handle of the value at `index`, if any.
    pub fn handle(&self, index: usize) -> Option<Handle<T>> {
        (index < self.items.len()).then(|| Handle::new(self.id, index as u32))
    }

    /// Whether `handle` refers to a live value of this arena.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        handle.arena == self.id && handle.index() < self.items.len()
    }

    /// Value behind `handle`, or `None` for a foreign or stale handle.
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        if handle.arena != self.id {
            return None;
        }
        self.items.get(handle.index())
    }

    /// Mutable value behind `handle`.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        if handle.arena != self.id {
            return None;
        }
        self.items.get_mut(handle.index())
    }

    /// Follow a pointer into this arena.
    pub fn resolve(&self, ptr: &Ptr<T>) -> Option<&T> {
        ptr.get().and_then(|h| self.get(h))
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the arena holds no values.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop all values and take a new identity, invalidating every handle.
    pub fn clear(&mut self) {
        self.items.clear();
        self.id = next_arena_id();
    }

    /// Iterate over `(handle, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> + '_ {
        let id = self.id;
        self.items
            .iter()
            .enumerate()
            .map(move |(i, v)| (Handle::new(id, i as u32), v))
    }

    /// Iterate over the stored values in insertion order.
    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterate mutably over the stored values in insertion order.
    pub fn values_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("items", &self.items)
            .finish()
    }
}

impl<T> FromIterator<T> for Arena<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let items: Vec<T> = iter.into_iter().collect();
        if let Some(last) = items.len().checked_sub(1) {
            next_index(last);
        }
        Arena {
            id: next_arena_id(),
            items,
        }
    }
}

/// Panics when `handle` belongs to another arena or is out of range.
impl<T> Index<Handle<T>> for Arena<T> {
    type Output = T;

    fn index(&self, handle: Handle<T>) -> &T {
        assert_eq!(handle.arena, self.id, "handle from a different arena");
        &self.items[handle.index()]
    }
}

impl<T> IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        assert_eq!(handle.arena, self.id, "handle from a different arena");
        &mut self.items[handle.index()]
    }
}

impl<T: Marshal + 'static> Marshal for Arena<T> {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.write_len(self.items.len())?;
        for (handle, item) in self.iter() {
            item.marshal(w)?;
            w.tag(handle)?;
        }
        Ok(())
    }
}

impl<T: Unmarshal + Default + 'static> Unmarshal for Arena<T> {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.clear();
        let n = r.read_len()?;
        self.items.reserve(n.min(r.remaining()));
        for _ in 0..n {
            let mut item = T::default();
            item.unmarshal(r)?;
            let handle = self.push(item);
            r.tag(handle)?;
        }
        Ok(())
    }
}

/// Nullable, patchable pointer to a value stored in an [`Arena`].
///
/// Clones share the same slot. Pointer fields encode through
/// [`Writer::pointer`] and decode through [`Reader::pointer`], so they can be
/// listed in `sio_fields!` like any other field.
pub struct Ptr<T> {
    slot: Arc<AtomicU64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Ptr<T> {
    /// A nil pointer.
    pub fn null() -> Self {
        Ptr::from_bits(NIL_BITS)
    }

    /// A pointer to `handle`.
    pub fn to(handle: Handle<T>) -> Self {
        Ptr::from_bits(handle.to_bits())
    }

    pub(crate) fn from_bits(bits: u64) -> Self {
        Ptr {
            slot: Arc::new(AtomicU64::new(bits)),
            _marker: PhantomData,
        }
    }

    pub(crate) fn slot(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.slot)
    }

    /// Current target, or `None` when nil.
    pub fn get(&self) -> Option<Handle<T>> {
        Handle::from_bits(self.slot.load(Ordering::Acquire))
    }

    /// Whether the pointer is nil.
    pub fn is_null(&self) -> bool {
        self.get().is_none()
    }
}

impl<T> Default for Ptr<T> {
    fn default() -> Self {
        Ptr::null()
    }
}

impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Ptr {
            slot: Arc::clone(&self.slot),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl<T> Eq for Ptr<T> {}

impl<T> fmt::Debug for Ptr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            Some(h) => write!(f, "Ptr({}:{})", h.arena, h.index),
            None => f.write_str("Ptr(nil)"),
        }
    }
}

impl<T> From<Handle<T>> for Ptr<T> {
    fn from(handle: Handle<T>) -> Self {
        Ptr::to(handle)
    }
}

impl<T> From<Option<Handle<T>>> for Ptr<T> {
    fn from(handle: Option<Handle<T>>) -> Self {
        handle.map_or_else(Ptr::null, Ptr::to)
    }
}

impl<T: 'static> Marshal for Ptr<T> {
    fn marshal(&self, w: &mut Writer) -> Result<()> {
        w.pointer(self)
    }
}

impl<T: 'static> Unmarshal for Ptr<T> {
    fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        r.pointer(self)
    }
}
