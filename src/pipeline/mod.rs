//! Compile/link/run pipeline controller
//!
//! Orchestrates one cell invocation: write the cell to its target file,
//! compile it to an object, decide whether the translation unit defines the
//! program entry point, then either stop (object-only cell) or link and run
//! the executable with the interactive stdin relay attached. Expected
//! outcomes (`NotNamed`, `CompileFailed`, `ExeFailed`) are returned as
//! ordinary [`PipelineResult`] values; genuine faults are caught once at the
//! top of [`PipelineController::execute_cell`] and converted to a generic
//! error result, so nothing escapes to the front end uncaught.

pub mod commands;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::config::ToolchainConfig;
use crate::directives::{self, CellDirectives, Lang, FILENAME_TAG};
use crate::error::{Error, Result};
use crate::exec::{ActiveCommands, Command, OutputSink};
use crate::frontend::{FrontEnd, FrontEndInput};
use crate::trigger::Trigger;

/// Outcome of one cell invocation, in the shape the front end expects
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PipelineResult {
    /// The cell was processed successfully
    Ok {
        /// Number of cells executed so far in this session
        execution_count: u64,
    },
    /// The cell failed along an expected branch, or a fault was caught
    Error {
        /// Error kind: `NotNamed`, `CompileFailed`, `ExeFailed`, or the
        /// kind name of a caught fault
        ename: String,
        /// Human-readable message
        evalue: String,
        /// Optional trace lines for caught faults
        traceback: Vec<String>,
    },
}

impl PipelineResult {
    /// Success carrying the current execution counter
    pub fn success(execution_count: u64) -> Self {
        PipelineResult::Ok { execution_count }
    }

    /// Failure with an error kind and message
    pub fn error(ename: &str, evalue: &str) -> Self {
        PipelineResult::Error {
            ename: ename.to_string(),
            evalue: evalue.to_string(),
            traceback: Vec::new(),
        }
    }

    /// True for the success variant
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Ok { .. })
    }
}

/// State machine driving compile/detect/link/run for one cell at a time
pub struct PipelineController {
    config: ToolchainConfig,
    front_end: Arc<dyn FrontEnd>,
    registry: Arc<ActiveCommands>,
    work_dir: PathBuf,
    /// Object providing the runtime shim that signals the stdin trigger;
    /// prepended to every interactive executable's dependency list
    support_object: Option<PathBuf>,
    execution_count: u64,
}

impl PipelineController {
    /// Create a controller for one kernel session
    pub fn new(config: ToolchainConfig, front_end: Arc<dyn FrontEnd>) -> Self {
        let work_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Self::with_work_dir(config, front_end, work_dir)
    }

    /// Create a controller that writes sources and artifacts under `work_dir`
    pub fn with_work_dir(
        config: ToolchainConfig,
        front_end: Arc<dyn FrontEnd>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        let work_dir = work_dir.into();
        info!("pipeline working directory: {}", work_dir.display());
        Self {
            config,
            front_end,
            registry: Arc::new(ActiveCommands::new()),
            work_dir,
            support_object: None,
            execution_count: 0,
        }
    }

    /// The session's active command registry
    pub fn registry(&self) -> Arc<ActiveCommands> {
        Arc::clone(&self.registry)
    }

    /// Number of cells executed so far
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// The compiled runtime-support object, once prepared
    pub fn support_object(&self) -> Option<&Path> {
        self.support_object.as_deref()
    }

    /// Compile the input-wrapper shim source to the session's support object
    ///
    /// Run once at session setup. Failure is logged but not fatal: the
    /// session continues, interactive input just has no shim to signal the
    /// trigger with.
    pub async fn prepare_support_object(&mut self, source: &Path) -> Result<()> {
        let Some(cc) = self.config.cc.clone() else {
            warn!("no session C compiler; skipping input-wrapper shim");
            return Ok(());
        };
        let obj = self.work_dir.join("autocell-input-wrappers.o");
        let debug_flag = if self.config.debug {
            "-DCKERNEL_WITH_DEBUG"
        } else {
            ""
        };
        let line = commands::compile_obj(
            &cc,
            debug_flag,
            "",
            &source.to_string_lossy(),
            &obj.to_string_lossy(),
        );
        let outcome = Command::new(line).run_silent().await?;
        if outcome.exit_code != 0 {
            error!(
                "failed to compile {} to {} (exit {})",
                source.display(),
                obj.display(),
                outcome.exit_code
            );
            for line in &outcome.stderr {
                error!("{}", line);
            }
            return Ok(());
        }
        self.support_object = Some(obj);
        Ok(())
    }

    /// Process one cell, converting any escaped fault into an error result
    pub async fn execute_cell(&mut self, code: &str) -> PipelineResult {
        self.execution_count += 1;
        match self.run_cell(code).await {
            Ok(result) => result,
            Err(fault) => {
                let message = fault.to_string();
                self.report_err(&format!("{}: {}", fault.kind_name(), message));
                PipelineResult::Error {
                    ename: fault.kind_name().to_string(),
                    evalue: message,
                    traceback: vec![format!("{:?}", fault)],
                }
            }
        }
    }

    /// Terminate every active command; used on interrupt requests
    pub fn interrupt(&self) {
        info!("=== I N T E R R U P T ===");
        self.registry.terminate_all();
    }

    /// Terminate active commands and remove session artifacts
    pub fn shutdown(&mut self) {
        info!("XXXXX S H U T D O W N XXXXX");
        self.registry.terminate_all();
        if let Some(obj) = self.support_object.take() {
            if obj.is_file() {
                info!("unlink {}", obj.display());
                let _ = std::fs::remove_file(&obj);
            }
        }
    }

    /// The fallible state machine behind [`PipelineController::execute_cell`]
    async fn run_cell(&mut self, code: &str) -> Result<PipelineResult> {
        // A lone magic line belongs to the front end, not this pipeline
        if is_front_end_directive(code) {
            debug!("delegating magic to the front end");
            return Ok(match self.front_end.run_magic(code) {
                Ok(()) => PipelineResult::success(self.execution_count),
                Err(message) => PipelineResult::error("MagicFailed", &message),
            });
        }

        let directives = match directives::parse(code, &self.config) {
            Ok(directives) => directives,
            Err(Error::CellNotNamed) => {
                let message = format!(
                    "[ERROR] code cell must start with \"{} [filename]\"",
                    FILENAME_TAG
                );
                self.report_err(&message);
                return Ok(PipelineResult::error("NotNamed", &message));
            }
            Err(other) => return Err(other),
        };

        for warning in &directives.warnings {
            self.report_err(warning);
        }
        if directives.verbose || self.config.debug {
            if let Ok(dump) = serde_json::to_string_pretty(&directives) {
                self.report_err(&dump);
            }
        }

        let path = self.work_dir.join(&directives.filename);
        std::fs::write(&path, code).map_err(|e| Error::SourceWriteFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        self.report(&format!("wrote file {}", directives.filename));

        // No compiler means nothing to compile, so stop here
        let Some(compiler) = directives.compiler.clone() else {
            return Ok(PipelineResult::success(self.execution_count));
        };
        if !directives.should_compile {
            return Ok(PipelineResult::success(self.execution_count));
        }

        // Compile to .o silently first: if it succeeds we want to know
        // whether main is defined before reporting the command to the user
        debug!("attempt to compile to object");
        let compile_line = commands::compile_obj(
            &compiler,
            &directives.cflags,
            &directives.ldflags,
            &directives.filename,
            &directives.obj,
        );
        let outcome = Command::new(compile_line.clone())
            .current_dir(&self.work_dir)
            .run_silent()
            .await?;
        if outcome.exit_code != 0 {
            debug!("compile to object failed (exit {})", outcome.exit_code);
            for line in &outcome.stderr {
                self.report_err(line);
            }
            return Ok(PipelineResult::error("CompileFailed", "Compilation failed"));
        }

        debug!("detect whether main is defined");
        let detect = Command::new(commands::detect_main(&directives.obj))
            .current_dir(&self.work_dir)
            .run_silent()
            .await?;
        if detect.exit_code != 0 {
            // Object-only cell: replay the compile with streamed output so
            // the user sees the command and its diagnostics, then stop
            debug!("main not defined: compile to object and stop");
            self.report(&format!("$> {}", compile_line));
            Command::new(compile_line)
                .current_dir(&self.work_dir)
                .run_with_output(self.sink_stdout(), self.sink_stderr())
                .await?;
            return Ok(PipelineResult::success(self.execution_count));
        }

        debug!("main is defined: compile and link an executable");
        let extra_cflags = match directives.language {
            Some(Lang::C) => self.config.exe_cflags.as_str(),
            Some(Lang::Cpp) => self.config.exe_cxxflags.as_str(),
            None => "",
        };
        let cflags = join_flags(extra_cflags, &directives.cflags);
        let ldflags = join_flags(&self.config.exe_ldflags, &directives.ldflags);

        // Report the link command without the internal support object, then
        // actually run it with the support object prepended
        let shown = commands::compile_exe(
            &compiler,
            &cflags,
            &ldflags,
            &directives.filename,
            &directives.depends,
            &directives.exe,
        );
        self.report(&format!("$> {}", shown));

        let depends = match &self.support_object {
            Some(obj) => join_flags(&obj.to_string_lossy(), &directives.depends),
            None => directives.depends.clone(),
        };
        let link_line = commands::compile_exe(
            &compiler,
            &cflags,
            &ldflags,
            &directives.filename,
            &depends,
            &directives.exe,
        );
        info!("{}", link_line);
        let exit_code = Command::new(link_line)
            .current_dir(&self.work_dir)
            .run_with_output(self.sink_stdout(), self.sink_stderr())
            .await?;
        if exit_code != 0 {
            return Ok(PipelineResult::error("CompileFailed", "Compilation failed"));
        }

        if !directives.should_exec {
            return Ok(PipelineResult::success(self.execution_count));
        }
        self.run_executable(&directives).await
    }

    /// Run the linked executable interactively, trigger-gated stdin attached
    async fn run_executable(&mut self, directives: &CellDirectives) -> Result<PipelineResult> {
        let command = Arc::new(
            Command::new(commands::run_exe(&directives.exe, &directives.run_args))
                .current_dir(&self.work_dir),
        );
        self.report(&format!("$> {}", command));

        let trigger = Arc::new(Trigger::new(None));
        trigger.make_ready()?;
        self.registry.add(Arc::clone(&command));

        let input = Box::new(FrontEndInput::new(Arc::clone(&self.front_end)));
        let run_result = command
            .run_interactive(
                self.sink_stdout(),
                self.sink_stderr(),
                input,
                Arc::clone(&trigger),
            )
            .await;

        // Unregister and release the trigger name regardless of outcome
        self.registry.remove(&command);
        if let Err(e) = trigger.close(true) {
            warn!("failed to close trigger {}: {}", trigger.name(), e);
        }

        let exit_code = run_result?;
        if exit_code != 0 {
            self.report_err(&format!("executable failed with exit code {}", exit_code));
            return Ok(PipelineResult::error("ExeFailed", "Executable failed"));
        }
        Ok(PipelineResult::success(self.execution_count))
    }

    fn sink_stdout(&self) -> OutputSink {
        let front_end = Arc::clone(&self.front_end);
        Box::new(move |chunk| front_end.stream_stdout(&String::from_utf8_lossy(chunk)))
    }

    fn sink_stderr(&self) -> OutputSink {
        let front_end = Arc::clone(&self.front_end);
        Box::new(move |chunk| front_end.stream_stderr(&String::from_utf8_lossy(chunk)))
    }

    fn report(&self, text: &str) {
        self.front_end.stream_stdout(&format!("{}\n", text));
    }

    fn report_err(&self, text: &str) {
        self.front_end.stream_stderr(&format!("{}\n", text));
    }
}

/// True when the cell is a front-end magic rather than a named source cell
fn is_front_end_directive(code: &str) -> bool {
    if code.starts_with("%%") {
        return true;
    }
    code.lines().count() == 1 && (code.starts_with('%') || code.starts_with('!'))
}

/// Join two flag groups with a single space, dropping empty sides
fn join_flags(left: &str, right: &str) -> String {
    match (left.trim(), right.trim()) {
        ("", r) => r.to_string(),
        (l, "") => l.to_string(),
        (l, r) => format!("{} {}", l, r),
    }
}
