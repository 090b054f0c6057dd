// Errors raised by the toolchain driver. The configuration variants (no compiler, a compiler
// without the DLC target, no kernel include directory) are environment problems: they are
// never retried and their Display text tells the user what to set or which command to run.
// CompilationError keeps everything needed to reproduce a failed invocation: the command
// line, the merged compiler output, the exit status and the kernel source that was compiled.

//! Error types for the toolchain driver.

use std::path::PathBuf;

use thiserror::Error;

use super::env::{CUSTOM_KERNEL_PATH_VAR, DLC_HOME_VAR, LLVM_HOME_VAR, LLVM_PATH_VAR};

/// Errors from compiler discovery, option assembly and compiler invocation.
#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error(
        "DLC compiler not found. Set {}, {}, or {} to your LLVM installation, \
         or ensure clang is in your PATH",
        LLVM_PATH_VAR, DLC_HOME_VAR, LLVM_HOME_VAR
    )]
    ToolchainNotFound,

    #[error(
        "Compiler at {} does not support the '{target}' target. Check your LLVM build \
         includes the target; verify by running: {} -print-targets | grep {target}",
        .path.display(), .path.display()
    )]
    UnsupportedTarget { path: PathBuf, target: String },

    #[error("Could not list targets of {}: {output}", .path.display())]
    TargetQueryFailed { path: PathBuf, output: String },

    #[error("{}", missing_include_message(.from_env, .searched))]
    MissingIncludePath { searched: Vec<PathBuf>, from_env: bool },

    #[error(
        "Compilation failed ({}):\n{output}\ncommand: {command}\nsource:\n{code}",
        exit_status(.status)
    )]
    CompilationError {
        command: String,
        output: String,
        status: Option<i32>,
        /// The kernel source handed to the compiler.
        code: String,
    },

    #[error("Invalid compile flag string: {flag}")]
    InvalidFlag { flag: String },

    #[error("Invalid pass config value for '{key}': {value}")]
    InvalidPassConfig { key: String, value: String },

    #[error("Unknown output format '{0}' (expected o, s, ll or bc)")]
    UnknownFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse object file: {0}")]
    ObjectParse(#[from] object::Error),
}

pub type ToolchainResult<T> = Result<T, ToolchainError>;

impl ToolchainError {
    /// Kernel source of a failed compile.
    pub fn kernel_source(&self) -> Option<&str> {
        match self {
            ToolchainError::CompilationError { code, .. } => Some(code),
            _ => None,
        }
    }
}

fn exit_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

fn missing_include_message(from_env: &bool, searched: &[PathBuf]) -> String {
    let paths = searched
        .iter()
        .map(|p| format!("  {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    if *from_env {
        format!(
            "{} is set but the kernel include directory does not exist:\n{}",
            CUSTOM_KERNEL_PATH_VAR, paths
        )
    } else {
        format!(
            "DLC kernel include directory not found. Set {} or place \
             the kernels in one of:\n{}",
            CUSTOM_KERNEL_PATH_VAR, paths
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remediation_text() {
        let msg = ToolchainError::ToolchainNotFound.to_string();
        assert!(msg.contains("LLVM_PATH"));
        assert!(msg.contains("PATH"));

        let msg = ToolchainError::UnsupportedTarget {
            path: PathBuf::from("/opt/llvm/bin/clang"),
            target: "dlc".to_string(),
        }
        .to_string();
        assert!(msg.contains("/opt/llvm/bin/clang -print-targets | grep dlc"));
    }

    #[test]
    fn test_missing_include_lists_locations() {
        let err = ToolchainError::MissingIncludePath {
            searched: vec![PathBuf::from("/a/dlc_kernels"), PathBuf::from("/b/dlc_kernels")],
            from_env: false,
        };
        let msg = err.to_string();
        assert!(msg.contains("DLC_CUSTOM_KERNEL_PATH"));
        assert!(msg.contains("/a/dlc_kernels"));
        assert!(msg.contains("/b/dlc_kernels"));
    }

    #[test]
    fn test_compilation_error_display() {
        let err = ToolchainError::CompilationError {
            command: "clang -target dlc".to_string(),
            output: "error: boom".to_string(),
            status: Some(1),
            code: "void k() {}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 1"));
        assert!(msg.contains("error: boom"));
        assert!(msg.contains("clang -target dlc"));
        assert!(msg.contains("source:\nvoid k() {}"));
        assert_eq!(err.kernel_source(), Some("void k() {}"));
        assert_eq!(ToolchainError::ToolchainNotFound.kernel_source(), None);
    }
}
