//! Blocks: named, versioned payloads connected to a record.
//!
//! A payload is any value with a codec. It may report a version, written
//! verbatim in the block preamble, and may expose a [`Linker`] that runs once
//! the whole record has been decoded and every pointer resolved.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use sio_core::{Arena, Marshal, Reader, Result, Unmarshal, Writer};

/// Post-read hook run after pointer relocation.
pub trait Linker {
    /// Fix up derived state. `version` is the version the block was written with.
    fn link(&mut self, version: u32) -> Result<()>;
}

/// A value that can be connected to a record as a block.
pub trait Payload: Marshal + Unmarshal + Any + Send {
    /// Version written in the block preamble.
    fn version(&self) -> u32 {
        0
    }

    /// Post-read hook, if this payload has one.
    fn linker(&mut self) -> Option<&mut dyn Linker> {
        None
    }
}

impl Payload for String {}

impl<T> Payload for Vec<T> where T: Marshal + Unmarshal + Default + Send + 'static {}

impl<T> Payload for Arena<T> where T: Marshal + Unmarshal + Default + Send + 'static {}

impl<K, V> Payload for BTreeMap<K, V>
where
    K: Marshal + Unmarshal + Default + Ord + Send + 'static,
    V: Marshal + Unmarshal + Default + Send + 'static,
{
}

/// Object-safe view of a [`Payload`].
trait ErasedPayload: Send {
    fn marshal_dyn(&self, w: &mut Writer) -> Result<()>;
    fn unmarshal_dyn(&mut self, r: &mut Reader<'_>) -> Result<()>;
    fn version_dyn(&self) -> u32;
    fn linker_dyn(&mut self) -> Option<&mut dyn Linker>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<P: Payload> ErasedPayload for P {
    fn marshal_dyn(&self, w: &mut Writer) -> Result<()> {
        self.marshal(w)
    }

    fn unmarshal_dyn(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.unmarshal(r)
    }

    fn version_dyn(&self) -> u32 {
        self.version()
    }

    fn linker_dyn(&mut self) -> Option<&mut dyn Linker> {
        self.linker()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A named payload owned by a record.
pub struct Block {
    name: String,
    version: u32,
    payload: Box<dyn ErasedPayload>,
}

impl Block {
    pub(crate) fn new<P: Payload>(name: String, payload: P) -> Self {
        Block {
            name,
            version: payload.version(),
            payload: Box::new(payload),
        }
    }

    /// Block name, unique within its record.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version last written or read for this block.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the payload is a `T`.
    pub fn is<T: Payload>(&self) -> bool {
        self.payload.as_any().is::<T>()
    }

    /// The payload, if it is a `T`.
    pub fn payload<T: Payload>(&self) -> Option<&T> {
        self.payload.as_any().downcast_ref()
    }

    /// The payload mutably, if it is a `T`.
    pub fn payload_mut<T: Payload>(&mut self) -> Option<&mut T> {
        self.payload.as_any_mut().downcast_mut()
    }

    pub(crate) fn into_payload<T: Payload>(self) -> Option<T> {
        self.payload.into_any().downcast::<T>().ok().map(|p| *p)
    }

    /// Marshal the payload; returns the version written.
    pub(crate) fn marshal(&mut self, w: &mut Writer) -> Result<u32> {
        let version = self.payload.version_dyn();
        w.begin_block(version);
        self.payload.marshal_dyn(w)?;
        self.version = version;
        Ok(version)
    }

    pub(crate) fn unmarshal(&mut self, r: &mut Reader<'_>) -> Result<()> {
        self.payload.unmarshal_dyn(r)?;
        self.version = r.version();
        Ok(())
    }

    pub(crate) fn linker(&mut self) -> Option<&mut dyn Linker> {
        self.payload.linker_dyn()
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("name", &self.name)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}
