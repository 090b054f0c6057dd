// A snapshot of the process environment the driver consults: the three toolchain
// variables, the custom-kernel include variable, PATH, the working directory and the home
// directory. Discovery and option assembly only ever read from a ToolchainEnv, never from
// std::env directly, so tests can describe an isolated machine without touching the
// process-wide environment.

//! Environment snapshot for compiler and include discovery.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Root of an LLVM checkout or install; searched as `build/bin` then `bin`.
pub const LLVM_PATH_VAR: &str = "LLVM_PATH";
/// DLC toolchain home; searched as `bin`.
pub const DLC_HOME_VAR: &str = "DLC_HOME";
/// Fallback for [`DLC_HOME_VAR`].
pub const LLVM_HOME_VAR: &str = "LLVM_HOME";
/// Directory holding the custom kernel include tree.
pub const CUSTOM_KERNEL_PATH_VAR: &str = "DLC_CUSTOM_KERNEL_PATH";

const TRACKED_VARS: [&str; 4] = [
    LLVM_PATH_VAR,
    DLC_HOME_VAR,
    LLVM_HOME_VAR,
    CUSTOM_KERNEL_PATH_VAR,
];

#[derive(Debug, Clone, Default)]
pub struct ToolchainEnv {
    vars: HashMap<String, String>,
    path: Option<OsString>,
    current_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
}

impl ToolchainEnv {
    /// An environment with nothing set: no variables, no PATH, no directories.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Capture the current process environment.
    pub fn from_process() -> Self {
        let vars = TRACKED_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
            .collect();
        Self {
            vars,
            path: std::env::var_os("PATH"),
            current_dir: std::env::current_dir().ok(),
            home_dir: home::home_dir(),
        }
    }

    pub fn with_var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<OsString>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn with_home_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.home_dir = Some(dir.into());
        self
    }

    /// Value of `name`; an empty value counts as unset.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn path(&self) -> Option<&OsString> {
        self.path.as_ref()
    }

    pub fn current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    pub fn home_dir(&self) -> Option<&Path> {
        self.home_dir.as_deref()
    }
}
