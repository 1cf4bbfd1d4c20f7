//! Event graph tests
//!
//! A small event data model (particles, calorimeter hits, clusters) written
//! through the public `sio` facade and read back with its references intact.

mod model;

mod partial_read;
mod roundtrip;
