//! autocell - compile-and-run engine for notebook code cells
//!
//! This library lets a notebook-style front end treat a code cell as a
//! source file: the cell is written to disk, compiled, optionally linked and
//! executed, and the subprocess's output and input are relayed back to the
//! user in real time.
//!
//! ## Module Organization
//!
//! ### Core Functionality
//!
//! - [`pipeline`] - The compile/detect/link/run state machine and its result
//! - [`exec`] - Async command runner, output multiplexing, active registry
//! - [`trigger`] - Named cross-process "ready for input" synchronization
//! - [`directives`] - Filename/option tag parsing into [`CellDirectives`]
//! - [`mod@error`] - Error types and Result aliases
//!
//! ### Collaborator Seams
//!
//! - [`frontend`] - The notebook protocol adapter's view of the core
//! - [`config`] - Session toolchain defaults from the environment
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use autocell::{FrontEnd, PipelineController, ToolchainConfig};
//!
//! struct Console;
//!
//! impl FrontEnd for Console {
//!     fn stream_stdout(&self, text: &str) { print!("{}", text); }
//!     fn stream_stderr(&self, text: &str) { eprint!("{}", text); }
//!     fn read_input(&self, _prompt: &str) -> Option<String> { None }
//!     fn run_magic(&self, _code: &str) -> Result<(), String> { Ok(()) }
//! }
//!
//! # #[tokio::main] async fn main() {
//! let mut pipeline = PipelineController::new(ToolchainConfig::from_env(), Arc::new(Console));
//! let result = pipeline.execute_cell("//// hello.c\nint main(void) { return 0; }").await;
//! assert!(result.is_success());
//! # }
//! ```
//!
//! ## Architecture
//!
//! One cooperative event loop (tokio) drives all process-I/O multiplexing
//! for a pipeline invocation: stdout and stderr are drained concurrently
//! with waiting for process exit, so neither stream can deadlock the other.
//! The interactive stdin relay runs on a blocking worker thread because
//! asking the front end for a line of input is a blocking call that must
//! not stall the event loop; the worker is gated on a [`Trigger`], a named
//! FIFO the running child signals just before it blocks on standard input.
//!
//! At most one pipeline runs per cell invocation. Overlapping invocations
//! from the front end are tolerated because every run owns an
//! independently-named trigger, and the session-wide [`ActiveCommands`]
//! registry lets interrupt/shutdown handling terminate whatever is still
//! running.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod directives;
pub mod error;
pub mod frontend;
pub mod trigger;

// Core modules
pub mod exec;
pub mod pipeline;

// Re-exports for core functionality
pub use config::ToolchainConfig;
pub use directives::{CellDirectives, Lang};
pub use error::{Error, Result};
pub use exec::{ActiveCommands, Command, CommandOutcome, OutputSink};
pub use frontend::{FrontEnd, FrontEndInput, InputSource};
pub use pipeline::{PipelineController, PipelineResult};
pub use trigger::{Trigger, TriggerState, TRIGGER_ENV_KEY};

// Version information
/// The current version of autocell from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize tracing output for embedding applications
///
/// Honors `RUST_LOG` for filtering; defaults to `info` for this crate. Safe
/// to call once per process; later calls are ignored.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autocell=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
