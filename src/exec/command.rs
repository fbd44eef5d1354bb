//! Asynchronous shell command runner
//!
//! One [`Command`] wraps one shell command line. The three entry points
//! ([`Command::run_silent`], [`Command::run_with_output`],
//! [`Command::run_interactive`]) share a single `run` implementation that
//! spawns the child with piped stdio, drains both output streams concurrently
//! with waiting for exit, and, for interactive runs, relays front-end input
//! to the child's stdin gated on a [`Trigger`].

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::unbounded_channel;
use tokio::task;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frontend::InputSource;
use crate::trigger::{Trigger, TRIGGER_ENV_KEY};

/// Consumer for raw output chunks, invoked in per-stream arrival order
pub type OutputSink = Box<dyn FnMut(&[u8]) + Send>;

/// Result of running a command to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Captured stdout lines, only populated when no stdout consumer was given
    pub stdout: Vec<String>,
    /// Captured stderr lines, only populated when no stderr consumer was given
    pub stderr: Vec<String>,
}

/// An invocable external process
///
/// Holds the command line, an optional working directory, and the live child
/// pid while (and only while) the process runs, so [`Command::terminate`]
/// can reach it from another task.
pub struct Command {
    id: Uuid,
    line: String,
    current_dir: Option<PathBuf>,
    pid: Mutex<Option<Pid>>,
}

impl Command {
    /// Create a command from a shell command line
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            line: line.into(),
            current_dir: None,
            pid: Mutex::new(None),
        }
    }

    /// Run the command from the given directory instead of the caller's cwd
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Registry identity of this command
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The shell command line this command will run
    pub fn line(&self) -> &str {
        &self.line
    }

    /// True while a live child process is attached
    pub fn is_running(&self) -> bool {
        self.lock_pid().is_some()
    }

    /// Run to completion with no external consumers, capturing both streams
    pub async fn run_silent(&self) -> Result<CommandOutcome> {
        self.run(None, None, None, None).await
    }

    /// Run with output streamed to the given consumers
    pub async fn run_with_output(
        &self,
        stdout: OutputSink,
        stderr: OutputSink,
    ) -> Result<i32> {
        self.run(Some(stdout), Some(stderr), None, None)
            .await
            .map(|outcome| outcome.exit_code)
    }

    /// Run with streamed output plus a trigger-gated interactive stdin relay
    pub async fn run_interactive(
        &self,
        stdout: OutputSink,
        stderr: OutputSink,
        input: Box<dyn InputSource>,
        trigger: Arc<Trigger>,
    ) -> Result<i32> {
        self.run(Some(stdout), Some(stderr), Some(input), Some(trigger))
            .await
            .map(|outcome| outcome.exit_code)
    }

    /// Shared implementation behind the three entry points
    async fn run(
        &self,
        stdout: Option<OutputSink>,
        stderr: Option<OutputSink>,
        input: Option<Box<dyn InputSource>>,
        trigger: Option<Arc<Trigger>>,
    ) -> Result<CommandOutcome> {
        if input.is_some() && trigger.is_none() {
            return Err(Error::StdinWithoutTrigger);
        }
        if let Some(trigger) = &trigger {
            if !trigger.is_ready() {
                return Err(Error::TriggerNotReady);
            }
        }

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&self.line)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        if let Some(trigger) = &trigger {
            // The child locates the trigger by name through this variable
            cmd.env(TRIGGER_ENV_KEY, trigger.name());
            debug!("env[{}]={}", TRIGGER_ENV_KEY, trigger.name());
        }

        info!("run: {}", self.line);
        let mut child = cmd.spawn().map_err(|e| Error::CommandSpawnFailed {
            command: self.line.clone(),
            reason: e.to_string(),
        })?;

        *self.lock_pid() = child.id().map(|raw| Pid::from_raw(raw as i32));

        // Attach the stdin relay before draining starts, so a child that
        // signals immediately is not missed
        let relay = match (input, trigger) {
            (Some(source), Some(trigger)) => {
                let stdin_pipe = child.stdin.take().ok_or_else(|| Error::StdinUnavailable {
                    command: self.line.clone(),
                })?;
                Some(spawn_stdin_relay(source, trigger, stdin_pipe))
            }
            _ => None,
        };

        let out_pipe = child.stdout.take();
        let err_pipe = child.stderr.take();
        let mut captured_out: Vec<u8> = Vec::new();
        let mut captured_err: Vec<u8> = Vec::new();

        let out_fut = drain_stream(out_pipe, stdout, &mut captured_out);
        let err_fut = drain_stream(err_pipe, stderr, &mut captured_err);
        let (out_res, err_res, status_res) = tokio::join!(out_fut, err_fut, child.wait());

        *self.lock_pid() = None;
        if let Some(relay) = relay {
            relay.stop();
        }

        out_res?;
        err_res?;
        let status = status_res?;
        let exit_code = status.code().unwrap_or(-1);
        debug!("exit {}: {}", exit_code, self.line);

        Ok(CommandOutcome {
            exit_code,
            stdout: split_lines(&captured_out),
            stderr: split_lines(&captured_err),
        })
    }

    /// Send SIGTERM to the live process, if any; a no-op otherwise
    pub fn terminate(&self) {
        let pid = *self.lock_pid();
        match pid {
            Some(pid) => {
                info!("terminate pid {}: {}", pid, self.line);
                if let Err(e) = kill(pid, Signal::SIGTERM) {
                    warn!("failed to terminate pid {}: {}", pid, e);
                }
            }
            None => debug!("terminate: no live process for {}", self.line),
        }
    }

    fn lock_pid(&self) -> std::sync::MutexGuard<'_, Option<Pid>> {
        self.pid.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line)
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("line", &self.line)
            .field("pid", &*self.lock_pid())
            .finish()
    }
}

/// Handle to the two halves of a running stdin relay
struct StdinRelay {
    writer: task::JoinHandle<()>,
}

impl StdinRelay {
    /// Stop the async writer half. The blocking worker half is detached: it
    /// unblocks and exits on its own when the trigger is closed or the input
    /// source reports end of input.
    fn stop(self) {
        self.writer.abort();
    }
}

/// Start the interactive stdin relay for a freshly spawned child
///
/// A blocking worker loops on `trigger.wait()` then asks the input source for
/// one line; lines cross into async land over a channel and are written to
/// the child's stdin pipe with a newline appended. The end-of-input sentinel
/// (`read_line` returning `None`) closes the pipe instead of writing.
fn spawn_stdin_relay(
    mut source: Box<dyn InputSource>,
    trigger: Arc<Trigger>,
    mut stdin_pipe: tokio::process::ChildStdin,
) -> StdinRelay {
    let (tx, mut rx) = unbounded_channel::<Option<String>>();

    task::spawn_blocking(move || {
        loop {
            if let Err(e) = trigger.wait() {
                debug!("stdin relay stopping: {}", e);
                break;
            }
            let line = source.read_line("stdin: ");
            let eof = line.is_none();
            if tx.send(line).is_err() {
                break;
            }
            if eof {
                debug!("stdin relay saw end of input");
                break;
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                Some(mut line) => {
                    line.push('\n');
                    if stdin_pipe.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                    let _ = stdin_pipe.flush().await;
                }
                None => {
                    let _ = stdin_pipe.shutdown().await;
                    break;
                }
            }
        }
    });

    StdinRelay { writer }
}

/// Drain one output pipe, forwarding chunks to the sink or capturing them
async fn drain_stream<R: AsyncRead + Unpin>(
    reader: Option<R>,
    sink: Option<OutputSink>,
    captured: &mut Vec<u8>,
) -> Result<()> {
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut sink = sink;
    let mut buf = [0u8; 4096];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        match &mut sink {
            Some(consume) => consume(&buf[..n]),
            None => captured.extend_from_slice(&buf[..n]),
        }
    }
}

/// Split captured bytes into newline-stripped lines (lossy UTF-8)
fn split_lines(buf: &[u8]) -> Vec<String> {
    if buf.is_empty() {
        return Vec::new();
    }
    String::from_utf8_lossy(buf)
        .lines()
        .map(str::to_string)
        .collect()
}
