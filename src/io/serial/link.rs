// src/io/serial/link.rs
//
// Serial link manager: port discovery, open/close, two-tier reconnect
// back-off, the once-per-connection dump request, and the write/read path.
//
// The connection handle is owned here and never handed out. Reads and writes
// are short-timeout and return immediately when nothing is ready.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::io::error::IoError;

// ============================================================================
// Port Backend
// ============================================================================

/// An open, bidirectional byte stream to the device.
pub trait LinkPort: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> LinkPort for T {}

/// Source of candidate ports and opened connections.
pub trait PortBackend {
    /// Enumerate port identifiers in preference order.
    fn available_ports(&self) -> Result<Vec<String>, IoError>;

    /// Open a port for reading and writing.
    fn open(&self, port: &str) -> Result<Box<dyn LinkPort>, IoError>;
}

/// Backend over the `serialport` crate.
#[derive(Clone, Debug)]
pub struct SerialBackend {
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Pin a single port instead of enumerating
    pub fixed_port: Option<String>,
}

impl PortBackend for SerialBackend {
    fn available_ports(&self) -> Result<Vec<String>, IoError> {
        if let Some(port) = &self.fixed_port {
            return Ok(vec![port.clone()]);
        }
        Ok(list_serial_ports()?
            .into_iter()
            .map(|p| p.port_name)
            .collect())
    }

    fn open(&self, port: &str) -> Result<Box<dyn LinkPort>, IoError> {
        let handle = serialport::new(port, self.baud_rate)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| IoError::connection(port, e.to_string()))?;
        Ok(Box::new(handle))
    }
}

/// Information about an available serial port
#[derive(Clone, Debug, serde::Serialize)]
pub struct SerialPortInfo {
    pub port_name: String,
    pub port_type: String,
    pub product: Option<String>,
}

/// List available serial ports.
///
/// On macOS only /dev/cu.* (calling unit) devices are listed; the /dev/tty.*
/// twins block on open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortInfo>, IoError> {
    let ports = serialport::available_ports()
        .map_err(|e| IoError::connection("enumerate", e.to_string()))?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let (port_type, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(info) => ("USB".to_string(), info.product),
                serialport::SerialPortType::BluetoothPort => ("Bluetooth".to_string(), None),
                serialport::SerialPortType::PciPort => ("PCI".to_string(), None),
                serialport::SerialPortType::Unknown => ("Unknown".to_string(), None),
            };
            SerialPortInfo {
                port_name: p.port_name,
                port_type,
                product,
            }
        })
        .collect())
}

// ============================================================================
// Link Manager
// ============================================================================

/// Back-off and probe timing for the link.
#[derive(Clone, Debug)]
pub struct LinkTiming {
    pub fast_retry: Duration,
    pub slow_retry: Duration,
    /// Time after connect before the one-shot dump request goes out
    pub dump_grace: Duration,
    pub dump_command: String,
}

impl Default for LinkTiming {
    fn default() -> Self {
        LinkTiming {
            fast_retry: Duration::from_secs(2),
            slow_retry: Duration::from_secs(10),
            dump_grace: Duration::from_secs(250),
            dump_command: crate::protocol::DUMP_REQUEST.to_string(),
        }
    }
}

/// Result of a `try_reconnect` call.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconnectOutcome {
    /// Link already open, nothing to do
    AlreadyConnected,
    /// Link open and the one-shot dump request was just sent
    DumpRequested,
    /// A new connection was opened on the named port
    Connected(String),
    /// Not connected, retry interval has not elapsed yet
    Waiting,
    /// Attempted every candidate port, none opened
    NoPortAvailable,
}

/// Owns the connection handle and its reconnect schedule.
pub struct LinkManager<B: PortBackend> {
    backend: B,
    timing: LinkTiming,
    port: Option<Box<dyn LinkPort>>,
    port_name: Option<String>,
    retry_interval: Duration,
    last_attempt: Option<Instant>,
    connected_since: Option<Instant>,
    dump_requested: bool,
    read_buf: Vec<u8>,
}

impl<B: PortBackend> LinkManager<B> {
    pub fn new(backend: B, timing: LinkTiming) -> Self {
        let retry_interval = timing.fast_retry;
        Self {
            backend,
            timing,
            port: None,
            port_name: None,
            retry_interval,
            last_attempt: None,
            connected_since: None,
            dump_requested: false,
            read_buf: vec![0u8; 1024],
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn connected_since(&self) -> Option<Instant> {
        self.connected_since
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn dump_command(&self) -> &str {
        &self.timing.dump_command
    }

    /// Candidate ports in preference order. Enumeration failures yield an empty list.
    pub fn list_candidate_ports(&self) -> Vec<String> {
        match self.backend.available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                tlog!("[link] Port enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Keep the link alive. See `ReconnectOutcome` for the possible results.
    ///
    /// While connected, sends the dump request once per connection after the
    /// grace interval. While disconnected, tries every candidate port once the
    /// retry interval has elapsed: success resets to the fast tier, total
    /// failure escalates to the slow tier.
    pub fn try_reconnect(&mut self, now: Instant) -> ReconnectOutcome {
        if self.port.is_some() {
            // Unconditional once per connection, whether or not geometry has arrived
            let due = self
                .connected_since
                .map(|t| now.saturating_duration_since(t) >= self.timing.dump_grace)
                .unwrap_or(false);
            if !self.dump_requested && due {
                self.dump_requested = true;
                let command = self.timing.dump_command.clone();
                if let Err(e) = self.send(&command) {
                    tlog!("[link] Dump request failed: {}", e);
                }
                return ReconnectOutcome::DumpRequested;
            }
            return ReconnectOutcome::AlreadyConnected;
        }

        if let Some(last) = self.last_attempt {
            if now.saturating_duration_since(last) < self.retry_interval {
                return ReconnectOutcome::Waiting;
            }
        }
        self.last_attempt = Some(now);

        self.close();
        for name in self.list_candidate_ports() {
            tlog!("[link] Opening {} ...", name);
            match self.backend.open(&name) {
                Ok(port) => {
                    self.port = Some(port);
                    self.port_name = Some(name.clone());
                    self.retry_interval = self.timing.fast_retry;
                    self.connected_since = Some(now);
                    self.dump_requested = false;
                    tlog!("[link] Connected on {}", name);
                    return ReconnectOutcome::Connected(name);
                }
                Err(e) => {
                    tlog!("[link]   {}", e);
                }
            }
        }

        self.retry_interval = self.timing.slow_retry;
        ReconnectOutcome::NoPortAvailable
    }

    /// Close the link. Idempotent; errors from the handle are swallowed.
    pub fn close(&mut self) {
        if let Some(mut port) = self.port.take() {
            let _ = port.flush();
            tlog!(
                "[link] Closed {}",
                self.port_name.as_deref().unwrap_or("port")
            );
        }
        self.port_name = None;
        self.connected_since = None;
    }

    /// Send one command line. Returns `Ok(false)` when no link is open.
    ///
    /// Any write failure closes the link and is returned as a connection error.
    pub fn send(&mut self, command: &str) -> Result<bool, IoError> {
        crate::logging::transcribe("sent", command);

        let port = match self.port.as_mut() {
            Some(p) => p,
            None => return Ok(false),
        };

        let mut data = Vec::with_capacity(command.len() + 1);
        data.extend_from_slice(command.as_bytes());
        data.push(b'\n');

        let result = port.write_all(&data).and_then(|_| port.flush());
        match result {
            Ok(()) => Ok(true),
            Err(e) => {
                let device = self.port_name.clone().unwrap_or_else(|| "port".to_string());
                tlog!("[link] Send error on {}: {}", device, e);
                self.close();
                Err(IoError::connection(device, format!("write failed: {}", e)))
            }
        }
    }

    /// Read whatever bytes are ready. Empty means nothing ready (or no link).
    ///
    /// Any read failure other than a timeout closes the link and is returned
    /// as a connection error.
    pub fn read_available(&mut self) -> Result<Vec<u8>, IoError> {
        let port = match self.port.as_mut() {
            Some(p) => p,
            None => return Ok(Vec::new()),
        };

        match port.read(&mut self.read_buf) {
            Ok(n) => Ok(self.read_buf[..n].to_vec()),
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(Vec::new())
            }
            Err(e) => {
                let device = self.port_name.clone().unwrap_or_else(|| "port".to_string());
                tlog!("[link] Read error on {}: {}", device, e);
                self.close();
                Err(IoError::connection(device, format!("read failed: {}", e)))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
