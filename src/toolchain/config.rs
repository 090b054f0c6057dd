// Build configuration for the toolchain driver. Everything the driver would otherwise read
// from process-wide state lives here: the target triple name, the fixed optimisation and
// language-standard flags, an optional persistent output directory, where to look for the
// compiler and the kernel headers, and extra flags. A host pipeline hands over its
// pass-config dictionary through from_pass_config; everything not named there keeps the
// documented default.

//! Toolchain configuration.

use std::collections::HashMap;
use std::path::PathBuf;

use super::error::{ToolchainError, ToolchainResult};

/// Pass-config key naming a persistent directory for sources and artifacts.
pub const PASS_CONFIG_OUTPUT_DIR: &str = "dlc.kernels_output_dir";
/// Pass-config key with shell-style extra compile flags.
pub const PASS_CONFIG_COMPILE_FLAGS: &str = "dlc.compile_flags";
/// Pass-config key enabling verbose driver output.
pub const PASS_CONFIG_VERBOSE: &str = "dlc.verbose";

#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Name passed to `-target` and searched for in `-print-targets`.
    pub target: String,
    pub opt_flag: String,
    pub std_flag: String,
    /// Keep sources and artifacts here instead of a temporary directory.
    pub output_dir: Option<PathBuf>,
    pub compiler_name: String,
    /// Install prefixes probed as `<prefix>/bin/<compiler_name>` after PATH.
    pub install_prefixes: Vec<PathBuf>,
    /// Added as an include directory when it exists.
    pub system_include_dir: PathBuf,
    /// Directory name searched for under the working directory, its parent and home.
    pub kernel_root_name: String,
    /// Include subdirectory inside a kernel root.
    pub kernel_include_subdir: String,
    /// Shell-style flag strings appended to every compile.
    pub extra_flags: Vec<String>,
    pub verbose: bool,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            target: "dlc".to_string(),
            opt_flag: "-O2".to_string(),
            std_flag: "-std=dc99".to_string(),
            output_dir: None,
            compiler_name: "clang".to_string(),
            install_prefixes: vec![
                PathBuf::from("/usr/local/llvm"),
                PathBuf::from("/opt/llvm"),
                PathBuf::from("/usr"),
            ],
            system_include_dir: PathBuf::from(
                "/usr/local/chipltech/synapse/include/external_includes",
            ),
            kernel_root_name: "DLC_Custom_Kernel".to_string(),
            kernel_include_subdir: "dlc_kernels".to_string(),
            extra_flags: Vec::new(),
            verbose: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> ToolchainResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ToolchainError::InvalidPassConfig {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

impl ToolchainConfig {
    /// Defaults overridden by the `dlc.*` keys of a pass-config map.
    pub fn from_pass_config(pass_config: &HashMap<String, String>) -> ToolchainResult<Self> {
        let mut config = Self::default();
        if let Some(dir) = pass_config.get(PASS_CONFIG_OUTPUT_DIR) {
            if !dir.trim().is_empty() {
                config.output_dir = Some(PathBuf::from(dir.trim()));
            }
        }
        if let Some(flags) = pass_config.get(PASS_CONFIG_COMPILE_FLAGS) {
            if shlex::split(flags).is_none() {
                return Err(ToolchainError::InvalidPassConfig {
                    key: PASS_CONFIG_COMPILE_FLAGS.to_string(),
                    value: flags.clone(),
                });
            }
            if !flags.trim().is_empty() {
                config.extra_flags.push(flags.clone());
            }
        }
        if let Some(verbose) = pass_config.get(PASS_CONFIG_VERBOSE) {
            config.verbose = parse_bool(PASS_CONFIG_VERBOSE, verbose)?;
        }
        log::debug!("toolchain config from pass config: {:?}", config);
        Ok(config)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn with_extra_flag(mut self, flags: impl Into<String>) -> Self {
        self.extra_flags.push(flags.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass_config(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ToolchainConfig::default();
        assert_eq!(config.target, "dlc");
        assert_eq!(config.opt_flag, "-O2");
        assert_eq!(config.std_flag, "-std=dc99");
        assert!(config.output_dir.is_none());
        assert!(!config.verbose);
    }

    #[test]
    fn test_from_pass_config() {
        let config = ToolchainConfig::from_pass_config(&pass_config(&[
            (PASS_CONFIG_OUTPUT_DIR, "/tmp/kernels"),
            (PASS_CONFIG_COMPILE_FLAGS, "-DTILE=128 -g"),
            (PASS_CONFIG_VERBOSE, "1"),
        ]))
        .unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/kernels")));
        assert_eq!(config.extra_flags, vec!["-DTILE=128 -g".to_string()]);
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_pass_config() {
        let err = ToolchainConfig::from_pass_config(&pass_config(&[(
            PASS_CONFIG_VERBOSE,
            "sometimes",
        )]))
        .unwrap_err();
        assert!(matches!(err, ToolchainError::InvalidPassConfig { .. }));

        let err = ToolchainConfig::from_pass_config(&pass_config(&[(
            PASS_CONFIG_COMPILE_FLAGS,
            "-DNAME=\"unterminated",
        )]))
        .unwrap_err();
        assert!(matches!(err, ToolchainError::InvalidPassConfig { .. }));
    }
}
