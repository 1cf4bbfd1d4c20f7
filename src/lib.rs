//! SIO - record/block streams for typed object graphs
//!
//! A stream is a sequence of records. A record is an ordered set of named,
//! versioned blocks, each holding one payload. Payloads may point at values in
//! other payloads of the same record; shared and cyclic references survive a
//! write/read round trip.
//!
//! # Quick Start
//!
//! ```
//! use sio::{Access, Payload, Stream, sio_fields};
//! use std::io::Cursor;
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct RunHeader {
//!     run: i32,
//!     detector: String,
//! }
//!
//! sio_fields!(RunHeader { run, detector });
//! impl Payload for RunHeader {}
//!
//! let mut out = Stream::writer("mem", Vec::new());
//! out.record("run")
//!     .connect("header", RunHeader { run: 1, detector: "ILD".into() })?;
//! out.write_record("run")?;
//!
//! let mut input = Stream::reader("mem", Cursor::new(out.into_inner()));
//! input.record("run").connect("header", RunHeader::default())?;
//! let rec = input.read_record()?.expect("one record");
//! assert_eq!(rec.block::<RunHeader>("header").unwrap().run, 1);
//! assert_eq!(rec.access(), Access::Read);
//! # Ok::<(), sio::Error>(())
//! ```
//!
//! # Architecture
//!
//! Wire primitives, codecs and pointer tagging live in `sio-core`; record
//! framing, compression and streams live in `sio-record`. Both are re-exported
//! here.

pub use sio_core::*;
pub use sio_record::*;
