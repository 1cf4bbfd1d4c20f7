//! Records: named, ordered collections of blocks read and written as a unit.
//!
//! Writing a record marshals every connected block into a scratch buffer
//! first, so nothing reaches the output unless the whole record encoded. The
//! pointer tag table spans all blocks of one record and is reset between
//! records.
//!
//! Reading decodes each block within a window of exactly its declared payload
//! length, skips blocks nobody connected, resynchronises on the block marker
//! when the body is damaged, then relocates pointers and runs linkers.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Read, Write};

use sio_core::wire::{align4, wire_len, BLOCK_MARKER_BYTES, BLOCK_HEADER_SIZE, OPT_COMPRESS};
use sio_core::{Error, Reader, Result, Writer};
use tracing::{debug, trace, warn};

use crate::block::{Block, Payload};
use crate::compress::{RecordCodec, ZstdCodec, DEFAULT_COMPRESSION_LEVEL};
use crate::config::DEFAULT_MAX_RECORD_LEN;
use crate::format::{write_block, write_padded, BlockHeader, RecordHeader};

/// Whether a record (or stream) is used for reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Records are decoded from the stream.
    Read,
    /// Records are encoded to the stream.
    Write,
}

/// A named, ordered collection of blocks.
pub struct Record {
    name: String,
    access: Access,
    options: u32,
    unpack: bool,
    index: HashMap<String, usize>,
    blocks: Vec<Block>,
    level: i32,
    max_len: u32,
    codec: Option<Box<dyn RecordCodec>>,
    writer: Writer,
    body: Vec<u8>,
    packed: Vec<u8>,
}

impl Record {
    /// Create an empty record. Read-access records start with `unpack` set.
    pub fn new(name: impl Into<String>, access: Access) -> Self {
        Record {
            name: name.into(),
            access,
            options: 0,
            unpack: access == Access::Read,
            index: HashMap::new(),
            blocks: Vec::new(),
            level: DEFAULT_COMPRESSION_LEVEL,
            max_len: DEFAULT_MAX_RECORD_LEN,
            codec: None,
            writer: Writer::new(),
            body: Vec::new(),
            packed: Vec::new(),
        }
    }

    /// Record name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Access mode the record was created with.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Option bits written with (or last read from) the record.
    pub fn options(&self) -> u32 {
        self.options
    }

    /// Whether the body is compressed.
    pub fn compress(&self) -> bool {
        self.options & OPT_COMPRESS != 0
    }

    /// Turn body compression on or off for subsequent writes.
    pub fn set_compress(&mut self, compress: bool) {
        if compress {
            self.options |= OPT_COMPRESS;
        } else {
            self.options &= !OPT_COMPRESS;
        }
    }

    /// Compression level used when the default codec is created.
    pub fn set_compression_level(&mut self, level: i32) {
        self.level = level;
    }

    /// Largest body length [`Record::read`] accepts.
    pub fn max_record_len(&self) -> u32 {
        self.max_len
    }

    /// Bound the stored and uncompressed body lengths accepted on read.
    /// Larger records fail with [`Error::RecordTooLarge`] before any buffer
    /// is allocated for them.
    pub fn set_max_record_len(&mut self, len: u32) {
        self.max_len = len;
    }

    /// Replace the record codec.
    pub fn set_codec(&mut self, codec: Box<dyn RecordCodec>) {
        self.codec = Some(codec);
    }

    /// Whether the record is decoded when met in a stream.
    pub fn unpack(&self) -> bool {
        self.unpack
    }

    /// Choose whether the record is decoded when met in a stream.
    pub fn set_unpack(&mut self, unpack: bool) {
        self.unpack = unpack;
    }

    /// Connect `payload` as block `name`.
    ///
    /// A name already connected to a write record fails with
    /// [`Error::BlockAlreadyConnected`]. On a read record the existing block is
    /// replaced in place and keeps its position.
    pub fn connect<P: Payload>(&mut self, name: impl Into<String>, payload: P) -> Result<()> {
        let name = name.into();
        match self.index.get(&name) {
            Some(&i) => match self.access {
                Access::Write => Err(Error::BlockAlreadyConnected {
                    block: name,
                    record: self.name.clone(),
                }),
                Access::Read => {
                    self.blocks[i] = Block::new(name, payload);
                    Ok(())
                }
            },
            None => {
                self.index.insert(name.clone(), self.blocks.len());
                self.blocks.push(Block::new(name, payload));
                Ok(())
            }
        }
    }

    /// Number of connected blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether no block is connected.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Names of the connected blocks, in write order.
    pub fn block_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.blocks.iter().map(Block::name)
    }

    /// The connected block `name`.
    pub fn get_block(&self, name: &str) -> Option<&Block> {
        self.index.get(name).map(|&i| &self.blocks[i])
    }

    /// Payload of block `name`, if connected and of type `T`.
    pub fn block<T: Payload>(&self, name: &str) -> Option<&T> {
        self.get_block(name)?.payload()
    }

    /// Mutable payload of block `name`, if connected and of type `T`.
    pub fn block_mut<T: Payload>(&mut self, name: &str) -> Option<&mut T> {
        let i = *self.index.get(name)?;
        self.blocks[i].payload_mut()
    }

    /// Version block `name` was last written or read with.
    pub fn block_version(&self, name: &str) -> Option<u32> {
        self.get_block(name).map(Block::version)
    }

    /// Disconnect block `name` and return its payload.
    ///
    /// Nothing is removed if the payload is not a `T`.
    pub fn take_block<T: Payload>(&mut self, name: &str) -> Option<T> {
        let i = *self.index.get(name)?;
        if !self.blocks[i].is::<T>() {
            return None;
        }
        let block = self.blocks.remove(i);
        self.reindex();
        block.into_payload()
    }

    fn reindex(&mut self) {
        self.index = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.name().to_string(), i))
            .collect();
    }

    fn codec(&mut self) -> &mut dyn RecordCodec {
        let level = self.level;
        &mut **self
            .codec
            .get_or_insert_with(|| Box::new(ZstdCodec::new(level)))
    }

    /// Encode every connected block and append the record to `out`.
    ///
    /// Returns the number of bytes written.
    pub fn write<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<u64> {
        self.writer.reset();
        self.body.clear();

        for block in &mut self.blocks {
            let version = block.marshal(&mut self.writer)?;
            write_block(&mut self.body, block.name(), version, self.writer.bytes())?;
            trace!(
                record = %self.name,
                block = block.name(),
                version = version,
                len = self.writer.len(),
                "block encoded"
            );
        }

        let ucmp_len = wire_len(self.body.len())?;
        let compress = self.compress();
        if compress {
            let body = std::mem::take(&mut self.body);
            let mut packed = std::mem::take(&mut self.packed);
            packed.clear();
            let codec = self.codec();
            let result = codec
                .reset()
                .and_then(|()| codec.compress(&body, &mut packed));
            self.body = body;
            self.packed = packed;
            result?;
        }
        let stored: &[u8] = if compress { &self.packed } else { &self.body };

        let header = RecordHeader {
            len: wire_len(stored.len())?,
            options: self.options,
            ucmp_len,
            name: self.name.clone(),
        };
        let mut written = header.write_to(out)?;
        written += write_padded(out, stored)?;

        debug!(
            record = %self.name,
            blocks = self.blocks.len(),
            ucmp_len = ucmp_len,
            bytes = written,
            "record written"
        );
        Ok(written)
    }

    /// Read the next record from `input` into the connected blocks.
    ///
    /// The record in the stream must carry this record's name; otherwise
    /// [`Error::UnexpectedRecord`] is returned with the stream positioned
    /// after that record's header. A record with `unpack` unset is skipped.
    pub fn read<R: Read + ?Sized>(&mut self, input: &mut R) -> Result<()> {
        let header = RecordHeader::read_from(input, self.max_len)?
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        if header.name != self.name {
            return Err(Error::UnexpectedRecord {
                expected: self.name.clone(),
                found: header.name,
            });
        }
        if !self.unpack {
            skip_body(&header, input)?;
            return Ok(());
        }
        self.read_body(&header, input)
    }

    /// Read the body announced by `header` and decode it.
    pub(crate) fn read_body<R: Read + ?Sized>(
        &mut self,
        header: &RecordHeader,
        input: &mut R,
    ) -> Result<()> {
        self.load_body(header, input)?;
        self.unpack_body(header)
    }

    /// Pull the stored body (and its padding) off the stream.
    pub(crate) fn load_body<R: Read + ?Sized>(
        &mut self,
        header: &RecordHeader,
        input: &mut R,
    ) -> Result<()> {
        self.packed.clear();
        self.packed.resize(header.body_len(), 0);
        input.read_exact(&mut self.packed)?;
        self.packed.truncate(header.len as usize);
        Ok(())
    }

    /// Decompress and decode a body previously pulled by `load_body`.
    pub(crate) fn unpack_body(&mut self, header: &RecordHeader) -> Result<()> {
        self.options = header.options;
        if header.is_compressed() {
            let packed = std::mem::take(&mut self.packed);
            let mut body = std::mem::take(&mut self.body);
            body.clear();
            let expected = header.ucmp_len as usize;
            let codec = self.codec();
            let result = codec
                .reset()
                .and_then(|()| codec.decompress(&packed, expected, &mut body));
            self.packed = packed;
            self.body = body;
            result?;
        } else {
            std::mem::swap(&mut self.body, &mut self.packed);
        }

        let body = std::mem::take(&mut self.body);
        let result = self.decode_blocks(&body);
        self.body = body;
        result?;

        debug!(
            record = %self.name,
            len = header.len,
            ucmp_len = header.ucmp_len,
            "record read"
        );
        Ok(())
    }

    fn decode_blocks(&mut self, body: &[u8]) -> Result<()> {
        let mut r = Reader::new(body);
        let mut linked: Vec<(usize, u32)> = Vec::new();

        while !r.is_empty() {
            if r.remaining() < BLOCK_HEADER_SIZE {
                return Err(Error::UnexpectedEnd {
                    needed: BLOCK_HEADER_SIZE,
                    remaining: r.remaining(),
                });
            }

            let start = r.position();
            let header = BlockHeader::read(&mut r)?;
            let data_start = r.position();
            let slot = self.index.get(header.name.as_str()).copied();
            let payload_len = match header
                .payload_len()
                .filter(|&n| n <= body.len() - data_start)
            {
                Some(n) => n,
                None if slot.is_some() => {
                    return Err(Error::BlockShortRead {
                        block: header.name.clone(),
                        expected: header.len as usize,
                        consumed: body.len() - start,
                    })
                }
                None => {
                    warn!(
                        record = %self.name,
                        block = %header.name,
                        len = header.len,
                        "unconnected block length out of range"
                    );
                    resync(&mut r, &self.name);
                    continue;
                }
            };

            match slot {
                Some(i) => {
                    r.set_window(data_start, payload_len);
                    r.set_version(header.version);
                    let short = |consumed: usize| Error::BlockShortRead {
                        block: header.name.clone(),
                        expected: payload_len,
                        consumed,
                    };
                    match self.blocks[i].unmarshal(&mut r) {
                        Ok(()) => {}
                        Err(Error::UnexpectedEnd { needed, remaining }) => {
                            return Err(short(payload_len - remaining + needed))
                        }
                        Err(e) => return Err(e),
                    }
                    let consumed = r.position() - data_start;
                    if consumed != payload_len {
                        return Err(short(consumed));
                    }
                    linked.push((i, header.version));
                    trace!(
                        record = %self.name,
                        block = %header.name,
                        version = header.version,
                        len = payload_len,
                        "block decoded"
                    );
                }
                None => {
                    trace!(record = %self.name, block = %header.name, "skipping unconnected block");
                }
            }

            r.clear_window();
            r.seek(data_start + align4(payload_len));
            resync(&mut r, &self.name);
        }

        let dangling = r.relocate();
        if dangling > 0 {
            debug!(record = %self.name, dangling = dangling, "record had unresolved pointers");
        }

        for (i, version) in linked {
            let block = &mut self.blocks[i];
            let name = block.name().to_string();
            if let Some(linker) = block.linker() {
                linker.link(version).map_err(|e| Error::Link {
                    block: name,
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }
}

/// Move `r` to the next block header if the bytes at its position are not
/// one. Without any further marker the rest of the body is dropped.
fn resync(r: &mut Reader<'_>, record: &str) {
    let pos = r.position();
    let rest = &r.data()[pos..];
    if rest.is_empty() {
        return;
    }

    let found = rest
        .windows(BLOCK_MARKER_BYTES.len())
        .enumerate()
        .skip(4)
        .find(|(_, w)| *w == BLOCK_MARKER_BYTES)
        .map(|(i, _)| i - 4);

    match found {
        Some(0) => {}
        Some(skip) => {
            warn!(record = record, offset = pos, skipped = skip, "resynchronised on block marker");
            r.seek(pos + skip);
        }
        None => {
            warn!(record = record, offset = pos, discarded = rest.len(), "no block marker found, discarding rest of record");
            r.seek(r.data().len());
        }
    }
}

/// Consume the stored body announced by `header` without decoding it.
pub(crate) fn skip_body<R: Read + ?Sized>(header: &RecordHeader, input: &mut R) -> Result<u64> {
    let len = header.body_len() as u64;
    let skipped = io::copy(&mut input.take(len), &mut io::sink())?;
    if skipped != len {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(skipped)
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("options", &self.options)
            .field("unpack", &self.unpack)
            .field("blocks", &self.blocks)
            .finish()
    }
}
