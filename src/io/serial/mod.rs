// src/io/serial/mod.rs
//
// Serial transport for the MCU text protocol.
//
// Features:
// - Port discovery and open/close with two-tier reconnect back-off
// - Once-per-connection geometry dump request
// - CR/LF line framing over a partial byte buffer

pub mod framer;
pub mod link;

pub use framer::{LineFramer, DEFAULT_MAX_LINE_LENGTH};
pub use link::{
    list_serial_ports, LinkManager, LinkPort, LinkTiming, PortBackend, ReconnectOutcome,
    SerialBackend, SerialPortInfo,
};
