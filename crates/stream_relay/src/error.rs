use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("buffer size must be at least 1")]
    InvalidBufferSize,
    #[error("failed reading source stream: {0}")]
    Read(std::io::Error),
    #[error("source stream is not valid UTF-8")]
    InvalidUtf8,
    #[error("sink rejected forwarded output: {0}")]
    Sink(std::io::Error),
    #[error("failed to spawn relayed process (binary={binary:?}): {source}")]
    Spawn {
        binary: PathBuf,
        source: std::io::Error,
    },
    #[error("relayed process timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("failed waiting for relayed process: {0}")]
    Wait(std::io::Error),
    #[error("internal error: missing stdout pipe")]
    MissingStdout,
    #[error("internal error: missing stderr pipe")]
    MissingStderr,
    #[error("internal error: join failure: {0}")]
    Join(String),
}
