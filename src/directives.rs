//! Cell directive parsing
//!
//! A cell's first line must carry the filename tag (`//// name.c`); later
//! lines may carry option tags (`//% KEY value`) that override the session
//! toolchain defaults for this cell. Unknown keys are collected as warnings,
//! never fatal; boolean switches (`VERBOSE`, `NOCOMPILE`, `NOEXEC`) are
//! distinct from the string-valued options, and later occurrences of a
//! string option overwrite earlier ones.

use serde::Serialize;

use crate::config::ToolchainConfig;
use crate::error::{Error, Result};

/// Tag marking the first line of a named cell
pub const FILENAME_TAG: &str = "////";
/// Tag marking an option line
pub const OPTION_TAG: &str = "//%";

/// Option keys the parser recognizes; anything else warns
pub const KNOWN_OPTS: &[&str] = &[
    "CC", "CXX", "CFLAGS", "CXXFLAGS", "LDFLAGS", "DEPENDS", "ARGS", "VERBOSE", "NOCOMPILE",
    "NOEXEC",
];

/// Source language detected from the target filename's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Lang {
    C,
    Cpp,
}

/// Map a file extension to a recognized language
pub fn lang_for_extension(ext: &str) -> Option<Lang> {
    match ext {
        "c" => Some(Lang::C),
        "cpp" | "cxx" | "cc" => Some(Lang::Cpp),
        _ => None,
    }
}

/// Parsed configuration for one cell
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDirectives {
    /// Target filename the cell text is written to
    pub filename: String,
    /// Object file produced by the compile step
    pub obj: String,
    /// Executable produced by the link step
    pub exe: String,
    /// Language detected from the filename extension, if recognized
    pub language: Option<Lang>,
    /// Resolved compiler (cell override, else session default)
    pub compiler: Option<String>,
    /// Compile flags for the detected language
    pub cflags: String,
    /// Link flags
    pub ldflags: String,
    /// Dependency object files appended to the link command
    pub depends: String,
    /// Arguments passed to the executable when it runs
    pub run_args: String,
    /// Dump the parsed directives to the error channel
    pub verbose: bool,
    /// Run the compile steps for this cell
    pub should_compile: bool,
    /// Run the executable after a successful link
    pub should_exec: bool,
    /// Warnings for unrecognized option keys, reported but never fatal
    #[serde(skip)]
    pub warnings: Vec<String>,
}

/// Extract the filename and option overrides from a cell's text
///
/// Fails with [`Error::CellNotNamed`] when the first line does not begin with
/// the filename tag. Parsing is pure: re-parsing the same text yields an
/// equal value.
pub fn parse(code: &str, config: &ToolchainConfig) -> Result<CellDirectives> {
    let mut lines = code.lines();
    let header = lines.next().unwrap_or_default();
    let filename = header
        .strip_prefix(FILENAME_TAG)
        .ok_or(Error::CellNotNamed)?
        .trim();
    if filename.is_empty() {
        return Err(Error::CellNotNamed);
    }

    let (basename, ext) = filename.rsplit_once('.').unwrap_or((filename, ""));
    let language = lang_for_extension(ext);

    let mut cc_override = String::new();
    let mut cxx_override = String::new();
    let mut cflags = String::new();
    let mut cxxflags = String::new();
    let mut ldflags = String::new();
    let mut depends = String::new();
    let mut run_args = String::new();
    let mut verbose = false;
    let mut should_compile = true;
    let mut should_exec = true;
    let mut warnings = Vec::new();

    // Option lines are numbered from 2 for warning messages
    for (lineno, line) in lines.enumerate().map(|(i, l)| (i + 2, l)) {
        let Some(rest) = line.strip_prefix(OPTION_TAG) else {
            continue;
        };
        let rest = rest.trim();
        if rest.is_empty() {
            continue;
        }
        let (opt, value) = rest.split_once(' ').unwrap_or((rest, ""));
        let value = value.trim();
        if !KNOWN_OPTS.contains(&opt) {
            warnings.push(format!("unknown option on line {}: {}", lineno, opt));
            continue;
        }
        match opt {
            "VERBOSE" => verbose = true,
            "NOCOMPILE" => should_compile = false,
            "NOEXEC" => should_exec = false,
            "CC" => cc_override = value.to_string(),
            "CXX" => cxx_override = value.to_string(),
            "CFLAGS" => cflags = value.to_string(),
            "CXXFLAGS" => cxxflags = value.to_string(),
            "LDFLAGS" => ldflags = value.to_string(),
            "DEPENDS" => depends = value.to_string(),
            "ARGS" => run_args = value.to_string(),
            _ => unreachable!("option {} is in KNOWN_OPTS", opt),
        }
    }

    // Cell override wins over the session default; empty counts as none
    let compiler = match language {
        Some(Lang::C) => pick(cc_override, config.cc.clone()),
        Some(Lang::Cpp) => pick(cxx_override, config.cxx.clone()),
        None => None,
    };

    Ok(CellDirectives {
        filename: filename.to_string(),
        obj: format!("{}.o", basename),
        exe: basename.to_string(),
        language,
        compiler,
        cflags: match language {
            Some(Lang::C) => cflags,
            _ => cxxflags,
        },
        ldflags,
        depends,
        run_args,
        verbose,
        should_compile,
        should_exec,
        warnings,
    })
}

fn pick(override_value: String, default_value: Option<String>) -> Option<String> {
    if override_value.trim().is_empty() {
        default_value
    } else {
        Some(override_value)
    }
}
