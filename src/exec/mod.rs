//! Command execution engine
//!
//! Launches shell commands asynchronously, multiplexes their stdout/stderr
//! into consumer callbacks (or captures them when no consumer is given), and
//! optionally attaches a trigger-gated stdin relay for interactive programs.
//! The session-wide set of currently running commands lives in
//! [`ActiveCommands`] so interrupt/shutdown handling can terminate them.

pub mod command;
pub mod registry;

pub use command::{Command, CommandOutcome, OutputSink};
pub use registry::ActiveCommands;
