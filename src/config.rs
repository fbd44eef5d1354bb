//! Session toolchain configuration
//!
//! Reads the compiler defaults and extra flags the front end provisions
//! through environment variables when it launches a kernel session. Cells may
//! override the compilers per-cell; the extra flags only apply to the
//! compile-and-link step for executables.

use serde::Serialize;

/// Environment variable naming the default C compiler
pub const ENV_CC: &str = "CKERNEL_CC";
/// Environment variable naming the default C++ compiler
pub const ENV_CXX: &str = "CKERNEL_CXX";
/// Extra compile flags applied when building a C executable
pub const ENV_EXE_CFLAGS: &str = "CKERNEL_EXE_CFLAGS";
/// Extra compile flags applied when building a C++ executable
pub const ENV_EXE_CXXFLAGS: &str = "CKERNEL_EXE_CXXFLAGS";
/// Extra link flags applied when building any executable
pub const ENV_EXE_LDFLAGS: &str = "CKERNEL_EXE_LDFLAGS";
/// Session-wide debug switch
pub const ENV_DEBUG: &str = "CKERNEL_DEBUG";

/// Toolchain defaults for one kernel session
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolchainConfig {
    /// Default C compiler, if the session provides one
    pub cc: Option<String>,
    /// Default C++ compiler, if the session provides one
    pub cxx: Option<String>,
    /// Extra compile flags for C executables
    pub exe_cflags: String,
    /// Extra compile flags for C++ executables
    pub exe_cxxflags: String,
    /// Extra link flags for executables
    pub exe_ldflags: String,
    /// Emit verbose diagnostics for every cell
    pub debug: bool,
}

impl ToolchainConfig {
    /// Build the session configuration from the process environment
    pub fn from_env() -> Self {
        let config = Self {
            cc: nonempty_var(ENV_CC),
            cxx: nonempty_var(ENV_CXX),
            exe_cflags: std::env::var(ENV_EXE_CFLAGS).unwrap_or_default(),
            exe_cxxflags: std::env::var(ENV_EXE_CXXFLAGS).unwrap_or_default(),
            exe_ldflags: std::env::var(ENV_EXE_LDFLAGS).unwrap_or_default(),
            debug: std::env::var(ENV_DEBUG).is_ok_and(|v| !v.is_empty()),
        };
        debug!("session toolchain: {:?}", config);
        config
    }
}

/// Read an environment variable, treating unset and empty the same way
fn nonempty_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}
