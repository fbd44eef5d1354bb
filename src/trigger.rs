//! Cross-process stdin readiness trigger
//!
//! A compiled cell runs in its own OS process, connected to the engine only
//! through the stdout/stderr/stdin pipes. When the child is about to block on
//! standard input, the engine needs to know so the front end can raise an
//! input prompt. The trigger is that side channel: a named FIFO created under
//! the system temp directory, identified by a per-invocation unique name that
//! the engine exports to the child via [`TRIGGER_ENV_KEY`]. The runtime shim
//! linked into interactive executables opens the FIFO by name and writes one
//! byte before each blocking read; the engine's input relay blocks in
//! [`Trigger::wait`] until that byte arrives.
//!
//! The engine holds its own write end open for the whole Ready lifetime, so
//! the read end never observes EOF between child signals. Closing the trigger
//! drops both descriptors, which a concurrent waiter observes as hang-up.

use std::os::fd::{AsFd, OwnedFd};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use nix::fcntl::{open, OFlag};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::stat::Mode;
use nix::unistd::{mkfifo, read, unlink, write};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Environment variable under which the trigger name is passed to children
pub const TRIGGER_ENV_KEY: &str = "CK_TRIGGER";

/// Lifecycle state of a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// Created but not yet backed by an OS resource
    Unready,
    /// FIFO exists and may be waited on or signaled
    Ready,
    /// Descriptors released; waiting and signaling are no longer valid
    Closed,
}

#[derive(Debug)]
struct Inner {
    state: TriggerState,
    /// Read end, shared so a blocked waiter keeps a valid descriptor even if
    /// another thread closes the trigger mid-wait
    read_fd: Option<Arc<OwnedFd>>,
    /// Write end held open so the read end never sees EOF while Ready
    held_write_fd: Option<OwnedFd>,
}

/// A named, cross-process-visible synchronization object
///
/// Shared between the pipeline controller (which owns the lifecycle) and the
/// stdin relay worker (which blocks in [`Trigger::wait`]), so all state lives
/// behind a mutex and the public methods take `&self`.
#[derive(Debug)]
pub struct Trigger {
    name: String,
    timeout: Option<Duration>,
    inner: Mutex<Inner>,
}

impl Trigger {
    /// Create a trigger in the Unready state with a fresh unique name
    pub fn new(timeout: Option<Duration>) -> Self {
        let path = std::env::temp_dir().join(format!("ck-trigger-{}", Uuid::new_v4()));
        let name = path.to_string_lossy().into_owned();
        debug!("trigger {} created", name);
        Self {
            name,
            timeout,
            inner: Mutex::new(Inner {
                state: TriggerState::Unready,
                read_fd: None,
                held_write_fd: None,
            }),
        }
    }

    /// Stable identity of the trigger; the value exported via [`TRIGGER_ENV_KEY`]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True only while the trigger is in the Ready state
    pub fn is_ready(&self) -> bool {
        self.lock().state == TriggerState::Ready
    }

    /// Current lifecycle state
    pub fn state(&self) -> TriggerState {
        self.lock().state
    }

    /// Activate the underlying named resource, moving Unready -> Ready
    ///
    /// Must be paired with [`Trigger::close`]. Calling it again while Ready is
    /// a no-op; a closed trigger cannot be made ready again.
    pub fn make_ready(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            TriggerState::Ready => return Ok(()),
            TriggerState::Closed => return Err(Error::TriggerClosed),
            TriggerState::Unready => {}
        }

        mkfifo(Path::new(&self.name), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
            Error::TriggerCreateFailed {
                name: self.name.clone(),
                reason: e.to_string(),
            }
        })?;

        // Open the read end first (non-blocking, so it does not wait for a
        // writer), then a write end we keep for ourselves. Order matters: a
        // FIFO opened O_WRONLY with no reader fails with ENXIO.
        let read_fd = open(
            Path::new(&self.name),
            OFlag::O_RDONLY | OFlag::O_NONBLOCK | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| Error::TriggerCreateFailed {
            name: self.name.clone(),
            reason: format!("open read end: {}", e),
        })?;
        let write_fd = open(
            Path::new(&self.name),
            OFlag::O_WRONLY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| Error::TriggerCreateFailed {
            name: self.name.clone(),
            reason: format!("open write end: {}", e),
        })?;

        inner.read_fd = Some(Arc::new(read_fd));
        inner.held_write_fd = Some(write_fd);
        inner.state = TriggerState::Ready;
        info!("trigger {} ready", self.name);
        Ok(())
    }

    /// Block the calling thread until a signal arrives
    ///
    /// Only valid while Ready. Returns [`Error::TriggerTimeout`] if the
    /// configured timeout elapses first, and [`Error::TriggerClosed`] if the
    /// trigger is closed while this thread is blocked.
    pub fn wait(&self) -> Result<()> {
        let read_fd = {
            let inner = self.lock();
            match inner.state {
                TriggerState::Ready => {}
                _ => return Err(Error::TriggerNotReady),
            }
            // Clone out of the lock so close() can proceed while we block
            inner.read_fd.clone().ok_or(Error::TriggerNotReady)?
        };

        debug!("trigger {} wait", self.name);
        loop {
            let mut fds = [PollFd::new(read_fd.as_fd(), PollFlags::POLLIN)];
            let n = match poll(&mut fds, self.poll_timeout()) {
                Ok(n) => n,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(Error::Sys(e)),
            };
            if n == 0 {
                return Err(Error::TriggerTimeout {
                    name: self.name.clone(),
                    timeout: self.timeout.unwrap_or_default(),
                });
            }

            let revents = fds[0].revents().unwrap_or(PollFlags::empty());
            if revents.contains(PollFlags::POLLIN) {
                let mut byte = [0u8; 1];
                match read(read_fd.as_fd(), &mut byte) {
                    Ok(0) => return Err(Error::TriggerClosed),
                    Ok(_) => {
                        debug!("trigger {} signaled", self.name);
                        return Ok(());
                    }
                    Err(nix::errno::Errno::EAGAIN) | Err(nix::errno::Errno::EINTR) => continue,
                    Err(e) => return Err(Error::Sys(e)),
                }
            }
            if revents
                .intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL)
            {
                return Err(Error::TriggerClosed);
            }
        }
    }

    /// Release the OS resources, moving to Closed
    ///
    /// With `unlink` the FIFO name is also removed from the filesystem so no
    /// other process can attach to it. Closing twice is a no-op.
    pub fn close(&self, unlink_name: bool) -> Result<()> {
        let (read_fd, write_fd) = {
            let mut inner = self.lock();
            if inner.state == TriggerState::Closed {
                return Ok(());
            }
            let was_ready = inner.state == TriggerState::Ready;
            inner.state = TriggerState::Closed;
            if was_ready {
                info!("trigger {} closed", self.name);
            }
            (inner.read_fd.take(), inner.held_write_fd.take())
        };

        // Dropping the held write end is what wakes a blocked waiter (POLLHUP)
        drop(write_fd);
        drop(read_fd);

        if unlink_name {
            match unlink(Path::new(&self.name)) {
                Ok(()) | Err(nix::errno::Errno::ENOENT) => {}
                Err(e) => warn!("failed to unlink trigger {}: {}", self.name, e),
            }
        }
        Ok(())
    }

    fn poll_timeout(&self) -> PollTimeout {
        match self.timeout {
            None => PollTimeout::NONE,
            Some(t) => {
                let millis = i32::try_from(t.as_millis()).unwrap_or(i32::MAX);
                PollTimeout::try_from(millis).unwrap_or(PollTimeout::MAX)
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner holds no invariants that survive a panic; recover the guard
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Trigger {
    fn drop(&mut self) {
        let _ = self.close(true);
    }
}

/// Signal the named trigger from the child's side of the process boundary
///
/// This mirrors what the runtime shim does in C: open the FIFO named by
/// [`TRIGGER_ENV_KEY`] for writing and emit one byte. Exposed in Rust for
/// tests and for in-process collaborators.
pub fn signal(name: &str) -> Result<()> {
    // Non-blocking so a missing reader surfaces as ENXIO instead of hanging
    let fd = open(
        Path::new(name),
        OFlag::O_WRONLY | OFlag::O_NONBLOCK | OFlag::O_CLOEXEC,
        Mode::empty(),
    )
    .map_err(|e| Error::TriggerSignalFailed {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    write(fd.as_fd(), b"x").map_err(|e| Error::TriggerSignalFailed {
        name: name.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
