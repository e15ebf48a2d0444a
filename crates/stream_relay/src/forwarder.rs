use std::io::{self, Read};

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::RelayError;

/// Platform newline substituted for `\r\n` and bare `\n` in normalized output.
#[cfg(windows)]
pub const NEWLINE: &str = "\r\n";
#[cfg(not(windows))]
pub const NEWLINE: &str = "\n";

/// Buffer capacity used by [`StreamForwarder::new`].
pub const DEFAULT_BUFFER_SIZE: usize = 256;

const READ_CHUNK_SIZE: usize = 4096;

/// Fallible sink callback. The `&str` never outlives the call; sinks that
/// need the text later must copy it.
pub type SinkFn = Box<dyn FnMut(&str) -> io::Result<()> + Send>;

/// Reads a text stream incrementally, normalizes line endings, and fans the
/// content out to up to three destinations: a raw-chunk sink, a line sink,
/// and an internal capture transcript.
///
/// The forwarder runs one *pass* at a time: [`read`](Self::read) or
/// [`read_async`](Self::read_async) consumes a source to end-of-stream and
/// returns. Sinks are registered before the pass via
/// [`forward_to`](Self::forward_to) and [`capture`](Self::capture).
///
/// Flush behavior depends on which sinks are present:
///
/// - With a raw sink, any span of `buffer_size` characters containing no
///   line terminator is flushed to it verbatim, so long lines still produce
///   bounded-latency output. Leftover content at end-of-stream also goes to
///   the raw sink, unterminated.
/// - Without a raw sink the pending line grows without bound until a
///   terminator or end-of-stream; leftover content is then surfaced through
///   the line sink with a terminator appended.
/// - The line sink receives each completed line with one trailing
///   [`NEWLINE`]; `\r\n` and bare `\n` are treated identically.
///
/// Sinks are invoked synchronously, in source order, on the execution context
/// driving the pass. To relay a child's stdout and stderr concurrently, use
/// two forwarder instances, one pass each.
///
/// ```
/// use stream_relay::{StreamForwarder, NEWLINE};
///
/// let mut forwarder = StreamForwarder::new();
/// forwarder.capture();
/// forwarder.read("one\r\ntwo\n".as_bytes())?;
/// assert_eq!(
///     forwarder.captured_output(),
///     Some(format!("one{NEWLINE}two{NEWLINE}").as_str()),
/// );
/// # Ok::<(), stream_relay::RelayError>(())
/// ```
pub struct StreamForwarder {
    buffer_size: usize,
    /// Characters since the last flush or line boundary.
    pending: String,
    /// Char count of `pending`; tracked separately because `String::len`
    /// counts bytes.
    pending_chars: usize,
    /// A `'\r'` was read and the next character decides whether it is part
    /// of a `\r\n` terminator or an ordinary character.
    pending_cr: bool,
    /// Undecoded UTF-8 tail carried between read chunks (at most 3 bytes).
    carry: Vec<u8>,
    write: Option<SinkFn>,
    write_line: Option<SinkFn>,
    captured: Option<String>,
}

impl StreamForwarder {
    /// Creates a forwarder with [`DEFAULT_BUFFER_SIZE`].
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            pending: String::new(),
            pending_chars: 0,
            pending_cr: false,
            carry: Vec::new(),
            write: None,
            write_line: None,
            captured: None,
        }
    }

    /// Creates a forwarder with an explicit buffer capacity.
    ///
    /// `buffer_size` bounds the raw-flush span, not the underlying read size;
    /// it must be at least 1.
    pub fn with_buffer_size(buffer_size: usize) -> Result<Self, RelayError> {
        if buffer_size == 0 {
            return Err(RelayError::InvalidBufferSize);
        }
        let mut forwarder = Self::new();
        forwarder.buffer_size = buffer_size;
        Ok(forwarder)
    }

    /// Registers the raw-chunk and line sinks. Either may be absent; an
    /// absent sink skips that category of delivery entirely.
    pub fn forward_to(&mut self, write: Option<SinkFn>, write_line: Option<SinkFn>) -> &mut Self {
        self.write = write;
        self.write_line = write_line;
        self
    }

    /// Activates capture: every character read is appended, with terminators
    /// normalized to [`NEWLINE`], to a transcript retrievable via
    /// [`captured_output`](Self::captured_output).
    pub fn capture(&mut self) -> &mut Self {
        if self.captured.is_none() {
            self.captured = Some(String::new());
        }
        self
    }

    /// Returns the capture transcript, or `None` if capture was never
    /// activated. Valid once a pass has completed; capture accumulates
    /// across passes.
    pub fn captured_output(&self) -> Option<&str> {
        self.captured.as_deref()
    }

    /// Runs one blocking forwarding pass, consuming `reader` to end-of-stream.
    ///
    /// A read or sink failure aborts the pass immediately; pending content is
    /// discarded, not flushed.
    pub fn read<R: Read>(&mut self, mut reader: R) -> Result<(), RelayError> {
        self.begin_pass();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk).map_err(RelayError::Read)?;
            if n == 0 {
                break;
            }
            self.push_chunk(&chunk[..n])?;
        }
        self.finish()
    }

    /// Async counterpart of [`read`](Self::read): one forwarding pass over an
    /// [`AsyncRead`] source, same contract.
    pub async fn read_async<R>(&mut self, mut reader: R) -> Result<(), RelayError>
    where
        R: AsyncRead + Unpin,
    {
        self.begin_pass();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk).await.map_err(RelayError::Read)?;
            if n == 0 {
                break;
            }
            self.push_chunk(&chunk[..n])?;
        }
        self.finish()
    }

    fn has_raw_sink(&self) -> bool {
        self.write.is_some()
    }

    fn has_line_sink(&self) -> bool {
        self.write_line.is_some()
    }

    fn capturing(&self) -> bool {
        self.captured.is_some()
    }

    fn begin_pass(&mut self) {
        self.pending.clear();
        self.pending_chars = 0;
        self.pending_cr = false;
        self.carry.clear();
    }

    fn push_chunk(&mut self, bytes: &[u8]) -> Result<(), RelayError> {
        if self.carry.is_empty() {
            return self.decode_and_push(bytes);
        }
        // Prepend the undecoded tail of the previous chunk.
        let mut joined = std::mem::take(&mut self.carry);
        joined.extend_from_slice(bytes);
        self.decode_and_push(&joined)
    }

    fn decode_and_push(&mut self, bytes: &[u8]) -> Result<(), RelayError> {
        let (text, rest) = match std::str::from_utf8(bytes) {
            Ok(text) => (text, &[][..]),
            Err(err) if err.error_len().is_none() => {
                let (valid, rest) = bytes.split_at(err.valid_up_to());
                let text =
                    std::str::from_utf8(valid).map_err(|_| RelayError::InvalidUtf8)?;
                (text, rest)
            }
            Err(_) => return Err(RelayError::InvalidUtf8),
        };
        for ch in text.chars() {
            self.push_char(ch)?;
        }
        self.carry = rest.to_vec();
        Ok(())
    }

    fn push_char(&mut self, ch: char) -> Result<(), RelayError> {
        if self.pending_cr {
            self.pending_cr = false;
            if ch == '\n' {
                return self.emit_line();
            }
            // Lone '\r': an ordinary character, passed through literally.
            self.push_ordinary('\r')?;
        }
        match ch {
            '\r' => {
                self.pending_cr = true;
                Ok(())
            }
            '\n' => self.emit_line(),
            _ => self.push_ordinary(ch),
        }
    }

    fn push_ordinary(&mut self, ch: char) -> Result<(), RelayError> {
        if let Some(captured) = self.captured.as_mut() {
            captured.push(ch);
        }
        self.pending.push(ch);
        self.pending_chars += 1;
        // The size-triggered flush has no destination without a raw sink;
        // the pending line is then allowed to grow until terminator or EOS.
        if self.has_raw_sink() && self.pending_chars >= self.buffer_size {
            self.flush_raw()?;
        }
        Ok(())
    }

    fn emit_line(&mut self) -> Result<(), RelayError> {
        if let Some(captured) = self.captured.as_mut() {
            captured.push_str(NEWLINE);
        }
        if let Some(write_line) = self.write_line.as_mut() {
            self.pending.push_str(NEWLINE);
            write_line(&self.pending).map_err(RelayError::Sink)?;
        }
        self.pending.clear();
        self.pending_chars = 0;
        Ok(())
    }

    fn flush_raw(&mut self) -> Result<(), RelayError> {
        if let Some(write) = self.write.as_mut() {
            write(&self.pending).map_err(RelayError::Sink)?;
        }
        self.pending.clear();
        self.pending_chars = 0;
        Ok(())
    }

    /// End-of-stream: resolve a trailing `'\r'`, then surface any leftover.
    /// An unterminated fragment goes to the raw sink verbatim when one is
    /// registered; in line-only mode it becomes a final line with a
    /// terminator appended.
    fn finish(&mut self) -> Result<(), RelayError> {
        if self.pending_cr {
            self.pending_cr = false;
            self.push_ordinary('\r')?;
        }
        if !self.carry.is_empty() {
            return Err(RelayError::InvalidUtf8);
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        if self.has_raw_sink() {
            return self.flush_raw();
        }
        if let Some(write_line) = self.write_line.as_mut() {
            self.pending.push_str(NEWLINE);
            write_line(&self.pending).map_err(RelayError::Sink)?;
        }
        self.pending.clear();
        self.pending_chars = 0;
        Ok(())
    }
}

impl Default for StreamForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamForwarder")
            .field("buffer_size", &self.buffer_size)
            .field("pending_chars", &self.pending_chars)
            .field("pending_cr", &self.pending_cr)
            .field("has_raw_sink", &self.has_raw_sink())
            .field("has_line_sink", &self.has_line_sink())
            .field("capturing", &self.capturing())
            .finish()
    }
}
