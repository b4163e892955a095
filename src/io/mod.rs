// src/io/mod.rs
//
// Device I/O for the MCU link. The session drives everything from a single
// thread, one non-blocking step per tick.

pub mod error;
pub mod serial;

pub use error::IoError;

