//! Streams: a sequence of records over any byte stream.
//!
//! A stream holds the records a caller registered by name. Reading returns the
//! next record in the stream that is both registered and set to unpack; any
//! other record is skipped without being decoded.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use sio_core::{Error, Result};
use tracing::debug;

use crate::config::{StreamConfig, StreamConfigError};
use crate::format::RecordHeader;
use crate::record::{skip_body, Access, Record};

/// A named stream of records.
pub struct Stream<S> {
    name: String,
    inner: S,
    access: Access,
    config: StreamConfig,
    position: u64,
    records: BTreeMap<String, Record>,
}

impl Stream<BufReader<File>> {
    /// Open the file at `path` for reading.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        debug!(path = %path.display(), "opened stream for reading");
        Ok(Stream::new(path.display().to_string(), BufReader::new(file), Access::Read))
    }
}

impl Stream<BufWriter<File>> {
    /// Create (or truncate) the file at `path` for writing.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        debug!(path = %path.display(), "created stream for writing");
        Ok(Stream::new(path.display().to_string(), BufWriter::new(file), Access::Write))
    }
}

impl<S> Stream<S> {
    fn new(name: String, inner: S, access: Access) -> Self {
        Stream {
            name,
            inner,
            access,
            config: StreamConfig::default(),
            position: 0,
            records: BTreeMap::new(),
        }
    }

    /// Replace the configuration (builder pattern).
    ///
    /// Only records registered afterwards pick up the compression settings.
    pub fn with_config(mut self, config: StreamConfig) -> std::result::Result<Self, StreamConfigError> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Stream name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the stream reads or writes records.
    pub fn access(&self) -> Access {
        self.access
    }

    /// Active configuration.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Byte offset of the next record.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Register record `name`, or return it if already registered.
    pub fn record(&mut self, name: &str) -> &mut Record {
        let access = self.access;
        let config = &self.config;
        self.records.entry(name.to_string()).or_insert_with(|| {
            let mut record = Record::new(name, access);
            record.set_compression_level(config.compression_level);
            record.set_max_record_len(config.max_record_len);
            if access == Access::Write && config.compress_records {
                record.set_compress(true);
            }
            record
        })
    }

    /// Whether record `name` is registered.
    pub fn has_record(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Unregister record `name`, returning it.
    pub fn del_record(&mut self, name: &str) -> Option<Record> {
        self.records.remove(name)
    }

    /// The registered record `name`.
    pub fn get_record(&self, name: &str) -> Option<&Record> {
        self.records.get(name)
    }

    /// The registered record `name`, mutably.
    pub fn get_record_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.get_mut(name)
    }

    /// Names of the registered records, sorted.
    pub fn record_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.records.keys().map(String::as_str)
    }

    /// The underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Release the underlying stream.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<R: Read> Stream<R> {
    /// Read records from `inner`.
    pub fn reader(name: impl Into<String>, inner: R) -> Self {
        Stream::new(name.into(), inner, Access::Read)
    }

    /// Read the next wanted record.
    ///
    /// Returns `Ok(None)` at a clean end of stream.
    pub fn read_record(&mut self) -> Result<Option<&mut Record>> {
        let header = loop {
            let header = match RecordHeader::read_from(&mut self.inner, self.config.max_record_len)? {
                Some(header) => header,
                None => return Ok(None),
            };
            self.position += header.encoded_len() as u64;

            let wanted = self.records.get(&header.name).map_or(false, Record::unpack);
            if wanted {
                break header;
            }

            self.position += skip_body(&header, &mut self.inner)?;
            debug!(
                stream = %self.name,
                record = %header.name,
                len = header.len,
                "skipped record"
            );
        };

        let record = self
            .records
            .get_mut(&header.name)
            .ok_or_else(|| Error::UnknownRecord(header.name.clone()))?;
        record.load_body(&header, &mut self.inner)?;
        self.position += header.body_len() as u64;
        record.unpack_body(&header)?;
        Ok(Some(record))
    }
}

impl<W: Write> Stream<W> {
    /// Write records to `inner`.
    pub fn writer(name: impl Into<String>, inner: W) -> Self {
        Stream::new(name.into(), inner, Access::Write)
    }

    /// Append record `name`. Returns the bytes written.
    pub fn write_record(&mut self, name: &str) -> Result<u64> {
        let record = self
            .records
            .get_mut(name)
            .ok_or_else(|| Error::UnknownRecord(name.to_string()))?;
        let n = record.write(&mut self.inner)?;
        self.position += n;
        Ok(n)
    }

    /// Flush the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

impl<S: Seek> Stream<S> {
    /// Move to `offset`, which must be the start of a record.
    pub fn seek_to(&mut self, offset: u64) -> Result<u64> {
        self.position = self.inner.seek(SeekFrom::Start(offset))?;
        Ok(self.position)
    }
}

impl<S> fmt::Debug for Stream<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("position", &self.position)
            .field("records", &self.records.keys().collect::<Vec<_>>())
            .finish()
    }
}
