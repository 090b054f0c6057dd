// Default compile options. The flag list always starts with the language standard, then
// the system include directory when the machine has one, then exactly one kernel include
// directory. DLC_CUSTOM_KERNEL_PATH, when set, must contain the include subdirectory;
// otherwise the kernel root is looked up next to the working directory, one level up, and
// in the home directory. Extra flags arrive as shell-style strings and are tokenized with
// shlex before being appended last.

//! Default compiler flags and include-path probing.

use std::path::{Path, PathBuf};

use super::env::CUSTOM_KERNEL_PATH_VAR;
use super::error::{ToolchainError, ToolchainResult};
use super::Toolchain;

/// Tokenize shell-style flag strings into individual arguments.
pub fn split_flags<S: AsRef<str>>(flags: &[S]) -> ToolchainResult<Vec<String>> {
    let mut args = Vec::new();
    for flag in flags {
        let flag = flag.as_ref();
        let tokens = shlex::split(flag).ok_or_else(|| ToolchainError::InvalidFlag {
            flag: flag.to_string(),
        })?;
        args.extend(tokens);
    }
    Ok(args)
}

impl Toolchain {
    /// Kernel include candidates when no explicit path is configured.
    fn kernel_include_candidates(&self) -> Vec<PathBuf> {
        let root = &self.config.kernel_root_name;
        let subdir = &self.config.kernel_include_subdir;
        let mut candidates = Vec::new();
        if let Some(cwd) = self.env.current_dir() {
            candidates.push(cwd.join(root).join(subdir));
            if let Some(parent) = cwd.parent() {
                candidates.push(parent.join(root).join(subdir));
            }
        }
        if let Some(home) = self.env.home_dir() {
            candidates.push(home.join(root).join(subdir));
        }
        candidates
    }

    /// The kernel include directory, or `MissingIncludePath` naming every location tried.
    pub fn kernel_include_dir(&self) -> ToolchainResult<PathBuf> {
        if let Some(custom) = self.env.var(CUSTOM_KERNEL_PATH_VAR) {
            let dir = Path::new(custom).join(&self.config.kernel_include_subdir);
            if dir.is_dir() {
                return Ok(dir);
            }
            return Err(ToolchainError::MissingIncludePath {
                searched: vec![dir],
                from_env: true,
            });
        }
        let candidates = self.kernel_include_candidates();
        match candidates.iter().find(|dir| dir.is_dir()) {
            Some(dir) => Ok(dir.clone()),
            None => Err(ToolchainError::MissingIncludePath {
                searched: candidates,
                from_env: false,
            }),
        }
    }

    /// Standard flag, include paths, configured extra flags, then `extra_flags`.
    pub fn default_compile_options<S: AsRef<str>>(
        &self,
        extra_flags: &[S],
    ) -> ToolchainResult<Vec<String>> {
        let mut options = vec![self.config.std_flag.clone()];

        let system = &self.config.system_include_dir;
        if system.is_dir() {
            options.push(format!("-I{}", system.display()));
        }

        let kernels = self.kernel_include_dir()?;
        log::debug!("kernel include directory: {}", kernels.display());
        options.push(format!("-I{}", kernels.display()));

        options.extend(split_flags(&self.config.extra_flags)?);
        options.extend(split_flags(extra_flags)?);
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::{ToolchainConfig, ToolchainEnv};

    fn config_without_system_dir() -> ToolchainConfig {
        ToolchainConfig {
            system_include_dir: PathBuf::from("/nonexistent/external_includes"),
            ..ToolchainConfig::default()
        }
    }

    #[test]
    fn test_split_flags() {
        let args = split_flags(&["-DA=1 -g", "-I'/path with space'"]).unwrap();
        assert_eq!(args, vec!["-DA=1", "-g", "-I/path with space"]);
        assert!(matches!(
            split_flags(&["-D\"open"]),
            Err(ToolchainError::InvalidFlag { .. })
        ));
    }

    #[test]
    fn test_custom_kernel_path_is_mandatory() {
        let dir = tempfile::tempdir().unwrap();
        let env = ToolchainEnv::empty().with_var(CUSTOM_KERNEL_PATH_VAR, dir.path().to_str().unwrap());
        let toolchain = Toolchain::new(config_without_system_dir(), env);
        match toolchain.default_compile_options::<&str>(&[]) {
            Err(ToolchainError::MissingIncludePath { searched, from_env }) => {
                assert!(from_env);
                assert_eq!(searched, vec![dir.path().join("dlc_kernels")]);
            }
            other => panic!("expected MissingIncludePath, got {:?}", other),
        }

        std::fs::create_dir(dir.path().join("dlc_kernels")).unwrap();
        let options = toolchain.default_compile_options(&["-g"]).unwrap();
        assert_eq!(
            options,
            vec![
                "-std=dc99".to_string(),
                format!("-I{}", dir.path().join("dlc_kernels").display()),
                "-g".to_string(),
            ]
        );
    }

    #[test]
    fn test_candidate_order() {
        let root = tempfile::tempdir().unwrap();
        let cwd = root.path().join("work");
        let home = root.path().join("home");
        std::fs::create_dir_all(home.join("DLC_Custom_Kernel/dlc_kernels")).unwrap();
        std::fs::create_dir_all(root.path().join("DLC_Custom_Kernel/dlc_kernels")).unwrap();
        std::fs::create_dir_all(&cwd).unwrap();

        let env = ToolchainEnv::empty()
            .with_current_dir(&cwd)
            .with_home_dir(&home);
        let toolchain = Toolchain::new(config_without_system_dir(), env);
        // parent of the working directory wins over home
        assert_eq!(
            toolchain.kernel_include_dir().unwrap(),
            root.path().join("DLC_Custom_Kernel/dlc_kernels")
        );
    }

    #[test]
    fn test_missing_everywhere() {
        let root = tempfile::tempdir().unwrap();
        let env = ToolchainEnv::empty()
            .with_current_dir(root.path().join("a/b"))
            .with_home_dir(root.path().join("home"));
        let toolchain = Toolchain::new(config_without_system_dir(), env);
        match toolchain.kernel_include_dir() {
            Err(ToolchainError::MissingIncludePath { searched, from_env }) => {
                assert!(!from_env);
                assert_eq!(searched.len(), 3);
            }
            other => panic!("expected MissingIncludePath, got {:?}", other),
        }
    }

    #[test]
    fn test_system_include_once() {
        let root = tempfile::tempdir().unwrap();
        let system = root.path().join("external_includes");
        let kernels = root.path().join("kernels");
        std::fs::create_dir_all(&system).unwrap();
        std::fs::create_dir_all(kernels.join("dlc_kernels")).unwrap();
        let config = ToolchainConfig {
            system_include_dir: system.clone(),
            ..ToolchainConfig::default()
        };
        let env = ToolchainEnv::empty().with_var(CUSTOM_KERNEL_PATH_VAR, kernels.to_str().unwrap());
        let options = Toolchain::new(config, env)
            .default_compile_options(&["-O3"])
            .unwrap();
        let system_flag = format!("-I{}", system.display());
        assert_eq!(options.iter().filter(|o| **o == system_flag).count(), 1);
        assert_eq!(options.iter().filter(|o| o.starts_with("-I")).count(), 2);
        assert_eq!(options.last().map(String::as_str), Some("-O3"));
    }
}
