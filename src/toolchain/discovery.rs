// Compiler discovery. Candidates are probed in a fixed order: the LLVM_PATH tree (a build
// directory first, then an install layout), DLC_HOME or LLVM_HOME, whatever PATH resolves,
// and finally the configured install prefixes. The first existing executable wins. A found
// compiler is only usable once its -print-targets listing mentions the DLC target; that
// query never fails outright, an unrunnable compiler simply does not support the target.

//! Locating a DLC-capable clang.

use std::path::{Path, PathBuf};
use std::process::Command;

use super::env::{DLC_HOME_VAR, LLVM_HOME_VAR, LLVM_PATH_VAR};
use super::error::{ToolchainError, ToolchainResult};
use super::Toolchain;

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl Toolchain {
    /// Candidates from the environment variables, in probe order.
    fn env_candidates(&self) -> Vec<PathBuf> {
        let name = &self.config.compiler_name;
        let mut candidates = Vec::new();
        if let Some(root) = self.env.var(LLVM_PATH_VAR) {
            let root = Path::new(root);
            candidates.push(root.join("build").join("bin").join(name));
            candidates.push(root.join("bin").join(name));
        }
        let home = self
            .env
            .var(DLC_HOME_VAR)
            .or_else(|| self.env.var(LLVM_HOME_VAR));
        if let Some(home) = home {
            candidates.push(Path::new(home).join("bin").join(name));
        }
        candidates
    }

    fn path_candidate(&self) -> Option<PathBuf> {
        let search = self.env.path()?;
        let cwd = self
            .env
            .current_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        which::which_in(&self.config.compiler_name, Some(search), cwd).ok()
    }

    /// First existing executable compiler, or `None` once every location is exhausted.
    pub fn find_compiler(&self) -> Option<PathBuf> {
        let name = &self.config.compiler_name;
        let found = self
            .env_candidates()
            .into_iter()
            .find(|p| is_executable(p))
            .or_else(|| self.path_candidate())
            .or_else(|| {
                self.config
                    .install_prefixes
                    .iter()
                    .map(|prefix| prefix.join("bin").join(name))
                    .find(|p| is_executable(p))
            });
        match &found {
            Some(path) => log::debug!("found compiler: {}", path.display()),
            None => log::debug!("no '{}' found in any search location", name),
        }
        found
    }

    /// Output of `<compiler> -print-targets`.
    pub fn print_targets(&self, compiler: &Path) -> ToolchainResult<String> {
        let output = Command::new(compiler).arg("-print-targets").output()?;
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            text.push_str(&String::from_utf8_lossy(&output.stderr));
            return Err(ToolchainError::TargetQueryFailed {
                path: compiler.to_path_buf(),
                output: text,
            });
        }
        Ok(text)
    }

    /// Whether `compiler` lists the configured target. Never fails.
    pub fn check_target_support(&self, compiler: &Path, verbose: bool) -> bool {
        match self.print_targets(compiler) {
            Ok(targets) => {
                let supported = targets
                    .to_lowercase()
                    .contains(&self.config.target.to_lowercase());
                if verbose {
                    log::info!(
                        "{} {} the '{}' target",
                        compiler.display(),
                        if supported { "supports" } else { "does not support" },
                        self.config.target
                    );
                }
                supported
            }
            Err(err) => {
                if verbose {
                    log::warn!("target check failed for {}: {}", compiler.display(), err);
                }
                false
            }
        }
    }

    /// A compiler that exists and supports the target.
    pub fn get_compiler(&self) -> ToolchainResult<PathBuf> {
        let compiler = self
            .find_compiler()
            .ok_or(ToolchainError::ToolchainNotFound)?;
        if !self.check_target_support(&compiler, self.config.verbose) {
            return Err(ToolchainError::UnsupportedTarget {
                path: compiler,
                target: self.config.target.clone(),
            });
        }
        Ok(compiler)
    }
}
