//! Sticky-error wrappers over [`Writer`] and [`Reader`].
//!
//! Payload codecs with many fields can chain calls and check the outcome once.
//! After the first failure every further call is a no-op and the first error
//! is the one reported.

use crate::arena::{Handle, Ptr};
use crate::codec::{Marshal, Unmarshal};
use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::writer::Writer;

/// Encoding facade with a sticky first error.
#[derive(Debug)]
pub struct Encoder<'w> {
    w: &'w mut Writer,
    err: Option<Error>,
}

impl<'w> Encoder<'w> {
    /// Wrap `w`.
    pub fn new(w: &'w mut Writer) -> Self {
        Encoder { w, err: None }
    }

    fn run(&mut self, f: impl FnOnce(&mut Writer) -> Result<()>) -> &mut Self {
        if self.err.is_none() {
            if let Err(e) = f(&mut *self.w) {
                self.err = Some(e);
            }
        }
        self
    }

    /// Encode a value.
    pub fn encode<M: Marshal + ?Sized>(&mut self, value: &M) -> &mut Self {
        self.run(|w| value.marshal(w))
    }

    /// Write the pointer tag of `handle`.
    pub fn tag<T: 'static>(&mut self, handle: Handle<T>) -> &mut Self {
        self.run(|w| w.tag(handle))
    }

    /// Write a pointer reference.
    pub fn pointer<T: 'static>(&mut self, ptr: &Ptr<T>) -> &mut Self {
        self.run(|w| w.pointer(ptr))
    }

    /// Version of the block being written.
    pub fn version(&self) -> u32 {
        self.w.version()
    }

    /// The first error encountered, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Consume the facade, returning the first error.
    pub fn finish(self) -> Result<()> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Decoding facade with a sticky first error.
#[derive(Debug)]
pub struct Decoder<'r, 'a> {
    r: &'r mut Reader<'a>,
    err: Option<Error>,
}

impl<'r, 'a> Decoder<'r, 'a> {
    /// Wrap `r`.
    pub fn new(r: &'r mut Reader<'a>) -> Self {
        Decoder { r, err: None }
    }

    fn run(&mut self, f: impl FnOnce(&mut Reader<'a>) -> Result<()>) -> &mut Self {
        if self.err.is_none() {
            if let Err(e) = f(&mut *self.r) {
                self.err = Some(e);
            }
        }
        self
    }

    /// Decode a value in place.
    pub fn decode<U: Unmarshal + ?Sized>(&mut self, value: &mut U) -> &mut Self {
        self.run(|r| value.unmarshal(r))
    }

    /// Read the pointer tag of the value living at `handle`.
    pub fn tag<T: 'static>(&mut self, handle: Handle<T>) -> &mut Self {
        self.run(|r| r.tag(handle))
    }

    /// Read a pointer reference into `ptr`.
    pub fn pointer<T: 'static>(&mut self, ptr: &mut Ptr<T>) -> &mut Self {
        self.run(|r| r.pointer(ptr))
    }

    /// Version of the block being read.
    pub fn version(&self) -> u32 {
        self.r.version()
    }

    /// The first error encountered, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Consume the facade, returning the first error.
    pub fn finish(self) -> Result<()> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
