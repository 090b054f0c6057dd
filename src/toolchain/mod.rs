// The toolchain driver is the only part of the crate that leaves the process. It finds a
// clang that knows the DLC target, assembles the default flag set, runs the compiler to
// one of four artifact formats and reports failures with remediation text. A Toolchain
// pairs an explicit ToolchainConfig with a ToolchainEnv snapshot; code generation never
// depends on it.

//! Compiler discovery and invocation for generated DLC kernels.
//!
//! ```no_run
//! use dlc_backend::toolchain::{Toolchain, ToolchainConfig};
//!
//! let toolchain = Toolchain::from_process(ToolchainConfig::default());
//! let object = toolchain.get_object_from_source("void k(int cid) {}", &["-g"])?;
//! # Ok::<(), dlc_backend::toolchain::ToolchainError>(())
//! ```

pub mod compile;
pub mod config;
pub mod discovery;
pub mod env;
pub mod error;
pub mod object;
pub mod options;

pub use self::compile::{OutputFormat, KERNEL_FILE_STEM};
pub use self::config::ToolchainConfig;
pub use self::env::ToolchainEnv;
pub use self::error::{ToolchainError, ToolchainResult};
pub use self::object::{DefinedSymbol, ObjectSummary};
pub use self::options::split_flags;

/// Driver entry point: configuration plus the environment it is resolved against.
#[derive(Debug, Clone)]
pub struct Toolchain {
    config: ToolchainConfig,
    env: ToolchainEnv,
}

impl Toolchain {
    pub fn new(config: ToolchainConfig, env: ToolchainEnv) -> Self {
        Self { config, env }
    }

    /// Resolve against the current process environment.
    pub fn from_process(config: ToolchainConfig) -> Self {
        Self::new(config, ToolchainEnv::from_process())
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub fn env(&self) -> &ToolchainEnv {
        &self.env
    }
}
