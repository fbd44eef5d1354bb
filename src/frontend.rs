//! Front-end seam
//!
//! The notebook protocol adapter is an external collaborator: it hands the
//! pipeline a cell's text and receives back a [`PipelineResult`] plus a
//! stream of output lines. Everything the core needs from it lives behind
//! the [`FrontEnd`] trait so the pipeline can be driven by a real kernel
//! adapter or by a capturing stub in tests.
//!
//! [`PipelineResult`]: crate::pipeline::PipelineResult

use std::sync::Arc;

/// Everything the pipeline needs from the notebook front end
pub trait FrontEnd: Send + Sync {
    /// Forward a chunk of program/compiler output to the user's stdout channel
    fn stream_stdout(&self, text: &str);

    /// Forward a chunk of diagnostics to the user's stderr channel
    fn stream_stderr(&self, text: &str);

    /// Ask the user for one line of input, blocking until they answer
    ///
    /// Returns `None` when the front end reports end of input (the user
    /// closed the prompt), which the engine treats as EOF on the child's
    /// stdin.
    fn read_input(&self, prompt: &str) -> Option<String>;

    /// Evaluate a front-end magic line (`%...`, `!...`, `%%...`) verbatim
    fn run_magic(&self, code: &str) -> std::result::Result<(), String>;
}

/// One line of interactive input supplied to a running child process
///
/// Implemented by whatever feeds the stdin relay; the call blocks the relay
/// worker, never the event loop. `None` is the end-of-input sentinel.
pub trait InputSource: Send {
    fn read_line(&mut self, prompt: &str) -> Option<String>;
}

/// [`InputSource`] adapter over the front end's input-request mechanism
pub struct FrontEndInput {
    front_end: Arc<dyn FrontEnd>,
}

impl FrontEndInput {
    pub fn new(front_end: Arc<dyn FrontEnd>) -> Self {
        Self { front_end }
    }
}

impl InputSource for FrontEndInput {
    fn read_line(&mut self, prompt: &str) -> Option<String> {
        self.front_end.read_input(prompt)
    }
}
