//! Error types and Result aliases for autocell

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for autocell operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for autocell
#[derive(Debug)]
pub enum Error {
    // === Cell errors ===
    /// Code cell does not start with the filename tag
    CellNotNamed,

    // === Trigger errors ===
    /// Failed to create the named trigger resource
    TriggerCreateFailed {
        name: String,
        reason: String,
    },

    /// Trigger waited on outside the Ready state
    TriggerNotReady,

    /// Trigger was closed while a waiter was blocked on it
    TriggerClosed,

    /// No signal arrived before the configured timeout
    TriggerTimeout {
        name: String,
        timeout: Duration,
    },

    /// Failed to signal the named trigger
    TriggerSignalFailed {
        name: String,
        reason: String,
    },

    // === Command errors ===
    /// Failed to spawn a shell command
    CommandSpawnFailed {
        command: String,
        reason: String,
    },

    /// An interactive run was requested without a stdin trigger
    StdinWithoutTrigger,

    /// The spawned child exposed no stdin pipe
    StdinUnavailable {
        command: String,
    },

    // === Pipeline errors ===
    /// Failed to write the cell source to its target file
    SourceWriteFailed {
        path: PathBuf,
        reason: String,
    },

    // === I/O and OS errors ===
    /// I/O errors
    Io(std::io::Error),

    /// OS-level errors from syscall wrappers
    Sys(nix::errno::Errno),
}

impl Error {
    /// Short variant name, used as the `ename` of a generic fault result.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Error::CellNotNamed => "CellNotNamed",
            Error::TriggerCreateFailed { .. } => "TriggerCreateFailed",
            Error::TriggerNotReady => "TriggerNotReady",
            Error::TriggerClosed => "TriggerClosed",
            Error::TriggerTimeout { .. } => "TriggerTimeout",
            Error::TriggerSignalFailed { .. } => "TriggerSignalFailed",
            Error::CommandSpawnFailed { .. } => "CommandSpawnFailed",
            Error::StdinWithoutTrigger => "StdinWithoutTrigger",
            Error::StdinUnavailable { .. } => "StdinUnavailable",
            Error::SourceWriteFailed { .. } => "SourceWriteFailed",
            Error::Io(_) => "Io",
            Error::Sys(_) => "Sys",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Cell errors
            Error::CellNotNamed => {
                write!(f, "code cell must start with \"//// [filename]\"")
            }

            // Trigger errors
            Error::TriggerCreateFailed { name, reason } => {
                write!(f, "Failed to create trigger '{}': {}", name, reason)
            }
            Error::TriggerNotReady => {
                write!(f, "Trigger is not ready to be waited on")
            }
            Error::TriggerClosed => {
                write!(f, "Trigger was closed while waiting")
            }
            Error::TriggerTimeout { name, timeout } => {
                write!(f, "Trigger '{}' timed out after {:?}", name, timeout)
            }
            Error::TriggerSignalFailed { name, reason } => {
                write!(f, "Failed to signal trigger '{}': {}", name, reason)
            }

            // Command errors
            Error::CommandSpawnFailed { command, reason } => {
                write!(f, "Failed to spawn command '{}': {}", command, reason)
            }
            Error::StdinWithoutTrigger => {
                write!(f, "A stdin writer requires a ready trigger")
            }
            Error::StdinUnavailable { command } => {
                write!(f, "No stdin pipe available for command '{}'", command)
            }

            // Pipeline errors
            Error::SourceWriteFailed { path, reason } => {
                write!(
                    f,
                    "Failed to write source to '{}': {}",
                    path.display(),
                    reason
                )
            }

            // I/O and OS errors
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Sys(err) => write!(f, "OS error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nix::errno::Errno> for Error {
    fn from(err: nix::errno::Errno) -> Self {
        Error::Sys(err)
    }
}
