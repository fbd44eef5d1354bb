//! Command-line shapes used by the pipeline
//!
//! These are string builders only; the shell command lines they produce run
//! through the execution engine. Whitespace between empty flag groups is
//! collapsed so the echoed `$>` lines stay readable.

/// Compile a translation unit to an object file
pub fn compile_obj(compiler: &str, cflags: &str, ldflags: &str, source: &str, obj: &str) -> String {
    join(&[compiler, cflags, ldflags, "-c", source, "-o", obj])
}

/// Compile and link a translation unit plus its dependencies to an executable
pub fn compile_exe(
    compiler: &str,
    cflags: &str,
    ldflags: &str,
    source: &str,
    depends: &str,
    exe: &str,
) -> String {
    join(&[compiler, cflags, source, depends, ldflags, "-o", exe])
}

/// Inspect an object file's symbol table for the program entry point
///
/// On macOS `int main()` compiles to the symbol `_main`; elsewhere it is
/// `main`. A nonzero exit from this command means the entry point is absent.
pub fn detect_main(obj: &str) -> String {
    if cfg!(target_os = "macos") {
        format!("nm {} | grep \" T _main\"", obj)
    } else {
        format!("nm {} | grep \" T main\"", obj)
    }
}

/// Run a built executable from the working directory
pub fn run_exe(exe: &str, args: &str) -> String {
    join(&[&format!("./{}", exe), args])
}

fn join(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
