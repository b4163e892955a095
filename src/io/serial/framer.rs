// src/io/serial/framer.rs
//
// CR/LF line framing for the MCU text protocol.
// Raw bytes are buffered until a line terminator arrives; the partial
// trailing fragment stays in the buffer across reads.

/// Default forced-split length for runaway lines.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

const CR: u8 = 0x0D;
const LF: u8 = 0x0A;

// =============================================================================
// Line Framer
// =============================================================================

/// Stateful line framer for streaming serial text.
///
/// Lines end at whichever of CR or LF comes first. Empty lines are dropped, so
/// CRLF, LFCR and bare CR/LF all frame the same way. The output is the same no
/// matter how the stream is split across `feed` calls.
pub struct LineFramer {
    buffer: Vec<u8>,
    max_length: usize,
}

impl Default for LineFramer {
    fn default() -> Self {
        LineFramer::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineFramer {
    pub fn new(max_length: usize) -> Self {
        LineFramer {
            buffer: Vec::new(),
            max_length: max_length.max(1),
        }
    }

    /// Append raw bytes without extracting anything.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Feed raw bytes and iterate the lines they complete.
    /// Lines are extracted lazily; anything not consumed stays buffered.
    pub fn feed(&mut self, data: &[u8]) -> Lines<'_> {
        self.push(data);
        Lines { framer: self }
    }

    /// Extract the earliest complete line, if any.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let raw = self.next_raw()?;
            let text = decode_line(&raw);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    /// Take the unterminated trailing fragment (decoded), leaving the buffer empty.
    pub fn flush(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw: Vec<u8> = self.buffer.drain(..).collect();
        let text = decode_line(&raw);
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Drop any buffered bytes.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Next raw line (terminator stripped), possibly empty.
    fn next_raw(&mut self) -> Option<Vec<u8>> {
        let delimiter = self.buffer.iter().position(|&b| b == CR || b == LF);

        match delimiter {
            Some(idx) if idx <= self.max_length => {
                let line: Vec<u8> = self.buffer.drain(..idx).collect();
                self.buffer.remove(0); // delimiter
                Some(line)
            }
            _ if self.buffer.len() > self.max_length => {
                // Force split on max length, same cut point a byte-wise feed would hit
                tlog!(
                    "[framer] Line exceeded {} bytes without terminator, splitting",
                    self.max_length
                );
                Some(self.buffer.drain(..self.max_length).collect())
            }
            _ => None,
        }
    }
}

/// Lazy iterator over the lines completed by a `feed` call.
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.framer.next_line()
    }
}

/// Decode one raw line, substituting U+FFFD for undecodable bytes.
fn decode_line(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if let std::borrow::Cow::Owned(_) = text {
        tlog!(
            "[framer] Replaced undecodable bytes in line: {}",
            hex::encode(raw)
        );
    }
    text.trim_end_matches('\r').to_string()
}

// =============================================================================
// Tests
// =============================================================================
