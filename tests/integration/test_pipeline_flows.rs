//! Integration tests for the compile/link/run pipeline
//!
//! Drives whole cells through the controller with a capturing front end.
//! Flows that need a real C compiler skip themselves when `cc` is not on
//! PATH, so the suite stays green on minimal containers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use autocell::{FrontEnd, PipelineController, PipelineResult, ToolchainConfig};

/// Front end stub that records everything the pipeline streams at it
#[derive(Default)]
struct CaptureFrontEnd {
    stdout: Mutex<String>,
    stderr: Mutex<String>,
    inputs: Mutex<VecDeque<String>>,
    magics: Mutex<Vec<String>>,
}

impl CaptureFrontEnd {
    fn with_inputs(lines: &[&str]) -> Self {
        Self {
            inputs: Mutex::new(lines.iter().map(|l| l.to_string()).collect()),
            ..Self::default()
        }
    }

    fn stdout(&self) -> String {
        self.stdout.lock().unwrap().clone()
    }

    fn stderr(&self) -> String {
        self.stderr.lock().unwrap().clone()
    }
}

impl FrontEnd for CaptureFrontEnd {
    fn stream_stdout(&self, text: &str) {
        self.stdout.lock().unwrap().push_str(text);
    }

    fn stream_stderr(&self, text: &str) {
        self.stderr.lock().unwrap().push_str(text);
    }

    fn read_input(&self, _prompt: &str) -> Option<String> {
        self.inputs.lock().unwrap().pop_front()
    }

    fn run_magic(&self, code: &str) -> Result<(), String> {
        self.magics.lock().unwrap().push(code.to_string());
        Ok(())
    }
}

fn cc_available() -> bool {
    std::process::Command::new("sh")
        .args(["-c", "command -v cc"])
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

fn session() -> ToolchainConfig {
    ToolchainConfig {
        cc: Some("cc".to_string()),
        cxx: Some("c++".to_string()),
        ..ToolchainConfig::default()
    }
}

fn controller(
    front_end: Arc<CaptureFrontEnd>,
    dir: &tempfile::TempDir,
) -> PipelineController {
    PipelineController::with_work_dir(session(), front_end, dir.path())
}

fn error_kind(result: &PipelineResult) -> Option<&str> {
    match result {
        PipelineResult::Error { ename, .. } => Some(ename.as_str()),
        PipelineResult::Ok { .. } => None,
    }
}

#[tokio::test]
async fn test_unnamed_cell_fails_and_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let result = pipeline.execute_cell("int main() { return 0; }").await;

    assert_eq!(error_kind(&result), Some("NotNamed"));
    assert!(front_end.stderr().contains("////"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_magic_cells_are_delegated_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let result = pipeline.execute_cell("%lsmagic").await;

    assert!(result.is_success());
    assert_eq!(*front_end.magics.lock().unwrap(), vec!["%lsmagic"]);
}

#[tokio::test]
async fn test_unrecognized_extension_writes_the_file_and_stops() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let result = pipeline.execute_cell("//// notes.txt\nplain text\n").await;

    assert!(result.is_success());
    assert!(front_end.stdout().contains("wrote file notes.txt"));
    let written = std::fs::read_to_string(dir.path().join("notes.txt")).unwrap();
    assert!(written.starts_with("//// notes.txt"));
    assert!(!dir.path().join("notes.o").exists());
}

#[tokio::test]
async fn test_nocompile_skips_the_toolchain_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// skip.c\n//% NOCOMPILE\nthis is not valid C but nobody compiles it\n";
    let result = pipeline.execute_cell(cell).await;

    assert!(result.is_success());
    assert!(dir.path().join("skip.c").exists());
    assert!(!dir.path().join("skip.o").exists());
}

#[tokio::test]
async fn test_unknown_options_warn_on_the_error_channel() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// warn.txt\n//% FROBNICATE on\n";
    let result = pipeline.execute_cell(cell).await;

    assert!(result.is_success());
    assert!(front_end
        .stderr()
        .contains("unknown option on line 2: FROBNICATE"));
}

#[tokio::test]
async fn test_verbose_dumps_the_parsed_directives() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// dump.txt\n//% VERBOSE\n";
    let result = pipeline.execute_cell(cell).await;

    assert!(result.is_success());
    let stderr = front_end.stderr();
    assert!(stderr.contains("\"filename\""));
    assert!(stderr.contains("dump.txt"));
}

#[tokio::test]
async fn test_hello_world_compiles_links_and_runs() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// hello.c\n\
                #include <stdio.h>\n\
                int main(void) { puts(\"hi from the cell\"); return 0; }\n";
    let result = pipeline.execute_cell(cell).await;

    assert_eq!(result, PipelineResult::success(1));
    let stdout = front_end.stdout();
    assert!(stdout.contains("wrote file hello.c"));
    assert!(stdout.contains("$> cc hello.c -o hello"));
    assert!(stdout.contains("$> ./hello"));
    assert!(stdout.contains("hi from the cell"));
    assert!(dir.path().join("hello").exists());
}

#[tokio::test]
async fn test_object_only_cell_stops_before_linking() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// helper.c\nint twice(int x) { return 2 * x; }\n";
    let result = pipeline.execute_cell(cell).await;

    assert!(result.is_success());
    // The compile command is echoed for visibility, but no executable exists
    assert!(front_end.stdout().contains("$> cc -c helper.c -o helper.o"));
    assert!(dir.path().join("helper.o").exists());
    assert!(!dir.path().join("helper").exists());
}

#[tokio::test]
async fn test_syntax_error_is_compile_failed_with_diagnostics() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// broken.c\nint main(void) { this does not parse }\n";
    let result = pipeline.execute_cell(cell).await;

    assert_eq!(error_kind(&result), Some("CompileFailed"));
    assert!(!front_end.stderr().is_empty());
    assert!(!dir.path().join("broken").exists());
}

#[tokio::test]
async fn test_nonzero_exit_is_exe_failed() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// fails.c\nint main(void) { return 2; }\n";
    let result = pipeline.execute_cell(cell).await;

    assert_eq!(error_kind(&result), Some("ExeFailed"));
    assert!(front_end
        .stderr()
        .contains("executable failed with exit code 2"));
}

#[tokio::test]
async fn test_noexec_links_but_does_not_run() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let cell = "//// built.c\n//% NOEXEC\nint main(void) { return 7; }\n";
    let result = pipeline.execute_cell(cell).await;

    assert!(result.is_success());
    assert!(dir.path().join("built").exists());
    assert!(!front_end.stdout().contains("$> ./built"));
}

#[tokio::test]
async fn test_interactive_cell_round_trips_user_input() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::with_inputs(&["world"]));
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    // The cell plays the part of the runtime shim itself: it signals the
    // trigger named by CK_TRIGGER before blocking on stdin
    let cell = "//// greet.c\n\
                #include <stdio.h>\n\
                #include <stdlib.h>\n\
                #include <fcntl.h>\n\
                #include <unistd.h>\n\
                int main(void) {\n\
                    const char *name = getenv(\"CK_TRIGGER\");\n\
                    if (!name) return 10;\n\
                    int fd = open(name, O_WRONLY);\n\
                    if (fd < 0) return 11;\n\
                    if (write(fd, \"x\", 1) != 1) return 12;\n\
                    close(fd);\n\
                    char buf[64];\n\
                    if (!fgets(buf, (int)sizeof buf, stdin)) return 13;\n\
                    printf(\"hello %s\", buf);\n\
                    return 0;\n\
                }\n";
    let result = pipeline.execute_cell(cell).await;

    assert_eq!(result, PipelineResult::success(1));
    assert!(front_end.stdout().contains("hello world"));
    assert!(pipeline.registry().is_empty());
}

#[tokio::test]
async fn test_execution_counter_advances_per_cell() {
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let first = pipeline.execute_cell("//// a.txt\n").await;
    let second = pipeline.execute_cell("//// b.txt\n").await;

    assert_eq!(first, PipelineResult::success(1));
    assert_eq!(second, PipelineResult::success(2));
    assert_eq!(pipeline.execution_count(), 2);
}

#[tokio::test]
async fn test_shutdown_removes_the_support_object() {
    if !cc_available() {
        eprintln!("skipping: no cc on PATH");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let front_end = Arc::new(CaptureFrontEnd::default());
    let mut pipeline = controller(Arc::clone(&front_end), &dir);

    let shim = dir.path().join("shim.c");
    std::fs::write(&shim, "int autocell_shim_marker;\n").unwrap();
    pipeline
        .prepare_support_object(&shim)
        .await
        .expect("prepare_support_object");

    let obj = pipeline.support_object().expect("support object").to_path_buf();
    assert!(obj.exists());

    pipeline.shutdown();
    assert!(!obj.exists());
    assert!(pipeline.support_object().is_none());
}
