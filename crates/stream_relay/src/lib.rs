#![forbid(unsafe_code)]
//! Line-buffering relay for text output streams, typically a child process's
//! stdout/stderr.
//!
//! The core type is [`StreamForwarder`]: one forwarding pass reads a source
//! to end-of-stream, normalizes `\r\n` and bare `\n` to the platform
//! [`NEWLINE`], and fans the content out to an optional raw-chunk sink, an
//! optional line sink, and an optional captured transcript.
//! [`RelayCommand`] builds on it to spawn a subprocess and relay both of its
//! output streams concurrently.

mod command;
mod error;
mod forwarder;

pub use command::{CommandResult, RelayCommand};
pub use error::RelayError;
pub use forwarder::{SinkFn, StreamForwarder, DEFAULT_BUFFER_SIZE, NEWLINE};
