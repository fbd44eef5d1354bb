//! Active command registry
//!
//! Process-scoped set of currently running commands, shared for the lifetime
//! of a kernel session. Long-running/interactive commands are added when they
//! start and removed on completion; interrupt and shutdown handling walk the
//! registry to request termination of everything still in it. This is not a
//! job queue: membership is the only externally visible mutation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::command::Command;

/// The set of currently running, terminable commands for one session
#[derive(Default)]
pub struct ActiveCommands {
    commands: Mutex<HashMap<Uuid, Arc<Command>>>,
}

impl ActiveCommands {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command that has become long-running/interactive
    pub fn add(&self, command: Arc<Command>) {
        debug!("register active command: {}", command);
        self.lock().insert(command.id(), command);
    }

    /// Remove a command on normal completion
    ///
    /// Fails silently when the command is not present: it may already have
    /// completed and been removed by another path.
    pub fn remove(&self, command: &Command) {
        if self.lock().remove(&command.id()).is_none() {
            debug!("active command not found: {}", command);
        }
    }

    /// Request termination of every still-registered command
    ///
    /// Used only during interrupt/shutdown handling. Entries are not removed
    /// here; each run removes itself on the way out.
    pub fn terminate_all(&self) {
        let commands: Vec<Arc<Command>> = self.lock().values().cloned().collect();
        for command in commands {
            info!("kill {}", command);
            command.terminate();
        }
    }

    /// Number of registered commands
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when no commands are registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Arc<Command>>> {
        self.commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
