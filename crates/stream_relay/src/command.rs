use std::{
    collections::BTreeMap,
    ffi::OsString,
    io::{self, Write},
    path::PathBuf,
    process::ExitStatus,
    time::Duration,
};

use tokio::{process::Command, time};
use tracing::debug;

use crate::{RelayError, SinkFn, StreamForwarder, DEFAULT_BUFFER_SIZE};

#[derive(Clone, Copy)]
enum ConsoleTarget {
    Stdout,
    Stderr,
}

#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    /// Normalized stdout transcript, `None` unless stdout capture was enabled.
    pub stdout: Option<String>,
    /// Normalized stderr transcript, `None` unless stderr capture was enabled.
    pub stderr: Option<String>,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Spawns a subprocess and relays its stdout and stderr through two
/// independent [`StreamForwarder`] passes, one task per stream.
///
/// Each stream can independently be mirrored to the parent console
/// (unbuffered: raw chunks plus completed lines), captured as a normalized
/// transcript, and/or observed line-by-line through a caller callback.
///
/// ```no_run
/// use stream_relay::RelayCommand;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), stream_relay::RelayError> {
/// let result = RelayCommand::new("git")
///     .arg("status")
///     .capture_stdout()
///     .execute()
///     .await?;
/// assert!(result.success());
/// # Ok(()) }
/// ```
pub struct RelayCommand {
    program: PathBuf,
    args: Vec<OsString>,
    env: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
    buffer_size: usize,
    forward_stdout: bool,
    forward_stderr: bool,
    capture_stdout: bool,
    capture_stderr: bool,
    on_output_line: Option<SinkFn>,
    on_error_line: Option<SinkFn>,
}

impl RelayCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            current_dir: None,
            timeout: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            forward_stdout: false,
            forward_stderr: false,
            capture_stdout: false,
            capture_stderr: false,
            on_output_line: None,
            on_error_line: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Raw-flush span for both relays; validated when the forwarders are
    /// built, before anything is spawned.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    /// Mirrors the child's stdout to the parent's stdout, unbuffered.
    pub fn forward_stdout(mut self) -> Self {
        self.forward_stdout = true;
        self
    }

    /// Mirrors the child's stderr to the parent's stderr, unbuffered.
    pub fn forward_stderr(mut self) -> Self {
        self.forward_stderr = true;
        self
    }

    pub fn capture_stdout(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    pub fn capture_stderr(mut self) -> Self {
        self.capture_stderr = true;
        self
    }

    /// Observes each completed stdout line (terminator included). Without
    /// [`forward_stdout`](Self::forward_stdout) the relay is line-buffered
    /// and an unterminated trailing fragment is surfaced as a final line;
    /// with it, the fragment goes to the console raw instead. When both are
    /// set the console is written first.
    pub fn on_output_line<F>(mut self, on_line: F) -> Self
    where
        F: FnMut(&str) -> io::Result<()> + Send + 'static,
    {
        self.on_output_line = Some(Box::new(on_line));
        self
    }

    /// Observes each completed stderr line (terminator included).
    pub fn on_error_line<F>(mut self, on_line: F) -> Self
    where
        F: FnMut(&str) -> io::Result<()> + Send + 'static,
    {
        self.on_error_line = Some(Box::new(on_line));
        self
    }

    /// Spawns the process and drives both relays to end-of-stream.
    ///
    /// All failures are terminal to this invocation; a retry is a fresh
    /// `execute` on a rebuilt command.
    pub async fn execute(mut self) -> Result<CommandResult, RelayError> {
        let stdout_forwarder = build_forwarder(
            self.buffer_size,
            self.forward_stdout,
            self.capture_stdout,
            self.on_output_line.take(),
            ConsoleTarget::Stdout,
        )?;
        let stderr_forwarder = build_forwarder(
            self.buffer_size,
            self.forward_stderr,
            self.capture_stderr,
            self.on_error_line.take(),
            ConsoleTarget::Stderr,
        )?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }

        debug!(binary = ?self.program, "spawning relayed process");
        let mut child = command.spawn().map_err(|source| RelayError::Spawn {
            binary: self.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take().ok_or(RelayError::MissingStdout)?;
        let stderr = child.stderr.take().ok_or(RelayError::MissingStderr)?;

        let stdout_task = tokio::spawn(run_pass(stdout_forwarder, stdout));
        let stderr_task = tokio::spawn(run_pass(stderr_forwarder, stderr));

        let wait_fut = child.wait();
        let status = if let Some(dur) = self.timeout {
            time::timeout(dur, wait_fut)
                .await
                .map_err(|_| RelayError::Timeout { timeout: dur })?
                .map_err(RelayError::Wait)?
        } else {
            wait_fut.await.map_err(RelayError::Wait)?
        };
        debug!(binary = ?self.program, ?status, "relayed process exited");

        let stdout_forwarder = stdout_task
            .await
            .map_err(|e| RelayError::Join(e.to_string()))??;
        let stderr_forwarder = stderr_task
            .await
            .map_err(|e| RelayError::Join(e.to_string()))??;

        Ok(CommandResult {
            status,
            stdout: stdout_forwarder.captured_output().map(str::to_string),
            stderr: stderr_forwarder.captured_output().map(str::to_string),
        })
    }
}

async fn run_pass<R>(
    mut forwarder: StreamForwarder,
    reader: R,
) -> Result<StreamForwarder, RelayError>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    forwarder.read_async(reader).await?;
    Ok(forwarder)
}

fn build_forwarder(
    buffer_size: usize,
    forward: bool,
    capture: bool,
    on_line: Option<SinkFn>,
    target: ConsoleTarget,
) -> Result<StreamForwarder, RelayError> {
    let mut forwarder = StreamForwarder::with_buffer_size(buffer_size)?;

    let write = if forward {
        Some(console_sink(target))
    } else {
        None
    };
    let write_line = match (forward, on_line) {
        (true, Some(on_line)) => Some(compose(console_sink(target), on_line)),
        (true, None) => Some(console_sink(target)),
        (false, Some(on_line)) => Some(on_line),
        (false, None) => None,
    };
    forwarder.forward_to(write, write_line);

    if capture {
        forwarder.capture();
    }
    Ok(forwarder)
}

fn console_sink(target: ConsoleTarget) -> SinkFn {
    Box::new(move |text| match target {
        ConsoleTarget::Stdout => {
            let mut out = io::stdout();
            out.write_all(text.as_bytes())?;
            out.flush()
        }
        ConsoleTarget::Stderr => {
            let mut out = io::stderr();
            out.write_all(text.as_bytes())?;
            out.flush()
        }
    })
}

fn compose(mut first: SinkFn, mut second: SinkFn) -> SinkFn {
    Box::new(move |text| {
        first(text)?;
        second(text)
    })
}
