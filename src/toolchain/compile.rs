// Compiler invocation. A compile first resolves a target-capable compiler, so a missing or
// unsuitable toolchain fails before anything touches the filesystem. The kernel source is
// written as dlc_kernel.c into a scratch directory (or the configured persistent output
// directory), any artifact left at the target path is removed, the compiler runs once with
// stdout and stderr captured together, and the output file is read back as bytes. A
// non-zero exit or a missing or empty artifact is a CompilationError carrying the command
// line, the compiler output and the source.

//! Driving clang to object, assembly, IR or bitcode.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use super::error::{ToolchainError, ToolchainResult};
use super::Toolchain;

/// Base name of the kernel source and default artifact.
pub const KERNEL_FILE_STEM: &str = "dlc_kernel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum OutputFormat {
    #[value(name = "o", alias = "obj", alias = "object")]
    Object,
    #[value(name = "s", alias = "asm", alias = "assembly")]
    Assembly,
    #[value(name = "ll", alias = "ir")]
    LlvmIr,
    #[value(name = "bc", alias = "bitcode")]
    Bitcode,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Object,
        OutputFormat::Assembly,
        OutputFormat::LlvmIr,
        OutputFormat::Bitcode,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Object => "o",
            OutputFormat::Assembly => "s",
            OutputFormat::LlvmIr => "ll",
            OutputFormat::Bitcode => "bc",
        }
    }

    /// Stage-selection flags for clang.
    pub fn flags(self) -> &'static [&'static str] {
        match self {
            OutputFormat::Object => &["-c"],
            OutputFormat::Assembly => &["-S"],
            OutputFormat::LlvmIr => &["-S", "-emit-llvm"],
            OutputFormat::Bitcode => &["-c", "-emit-llvm"],
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ToolchainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "o" | "obj" | "object" => Ok(OutputFormat::Object),
            "s" | "asm" | "assembly" => Ok(OutputFormat::Assembly),
            "ll" | "ir" => Ok(OutputFormat::LlvmIr),
            "bc" | "bitcode" => Ok(OutputFormat::Bitcode),
            other => Err(ToolchainError::UnknownFormat(other.to_string())),
        }
    }
}

/// Where the source and default artifact live for one compile.
enum WorkDir {
    Scratch(tempfile::TempDir),
    Persistent(PathBuf),
}

impl WorkDir {
    fn path(&self) -> &Path {
        match self {
            WorkDir::Scratch(dir) => dir.path(),
            WorkDir::Persistent(dir) => dir,
        }
    }
}

fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => format!("{:?}", err.into_bytes()),
    }
}

impl Toolchain {
    fn work_dir(&self) -> ToolchainResult<WorkDir> {
        match &self.config.output_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                Ok(WorkDir::Persistent(dir.clone()))
            }
            None => Ok(WorkDir::Scratch(
                tempfile::Builder::new().prefix("dlcc-").tempdir()?,
            )),
        }
    }

    /// Compile `code` and return the bytes of the produced artifact.
    ///
    /// `options` are passed through verbatim; use [`Toolchain::default_compile_options`]
    /// for the standard set. Without `output_path` the artifact is written next to the
    /// source as `dlc_kernel.<ext>`.
    pub fn compile(
        &self,
        code: &str,
        format: OutputFormat,
        options: &[String],
        output_path: Option<&Path>,
    ) -> ToolchainResult<Vec<u8>> {
        let compiler = self.get_compiler()?;

        let work = self.work_dir()?;
        let source = work.path().join(format!("{}.c", KERNEL_FILE_STEM));
        std::fs::write(&source, code)?;
        let target = match output_path {
            Some(path) => path.to_path_buf(),
            None => work
                .path()
                .join(format!("{}.{}", KERNEL_FILE_STEM, format.extension())),
        };
        match std::fs::remove_file(&target) {
            Ok(()) => log::debug!("removed stale {}", target.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let mut args: Vec<String> = vec![
            "-target".to_string(),
            self.config.target.clone(),
            self.config.opt_flag.clone(),
        ];
        args.extend(format.flags().iter().map(|f| f.to_string()));
        args.extend(options.iter().cloned());
        args.push("-o".to_string());
        args.push(target.display().to_string());
        args.push(source.display().to_string());

        let command = std::iter::once(compiler.display().to_string())
            .chain(args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");
        log::info!("compiling: {}", command);

        let result = Command::new(&compiler).args(&args).output()?;
        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&result.stderr));
        if self.config.verbose && !output.is_empty() {
            log::info!("compiler output:\n{}", output);
        }

        if !result.status.success() {
            return Err(ToolchainError::CompilationError {
                command,
                output,
                status: result.status.code(),
                code: code.to_string(),
            });
        }

        let bytes = match std::fs::read(&target) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&format!("no output written to {}", target.display()));
            return Err(ToolchainError::CompilationError {
                command,
                output,
                status: result.status.code(),
                code: code.to_string(),
            });
        }
        log::debug!("{} bytes of {} output", bytes.len(), format);
        Ok(bytes)
    }

    fn compile_with_defaults<S: AsRef<str>>(
        &self,
        code: &str,
        format: OutputFormat,
        extra_flags: &[S],
    ) -> ToolchainResult<Vec<u8>> {
        let options = self.default_compile_options(extra_flags)?;
        self.compile(code, format, &options, None)
    }

    pub fn get_object_from_source<S: AsRef<str>>(
        &self,
        code: &str,
        extra_flags: &[S],
    ) -> ToolchainResult<Vec<u8>> {
        self.compile_with_defaults(code, OutputFormat::Object, extra_flags)
    }

    /// Assembly text; bytes that are not UTF-8 come back in their debug form.
    pub fn get_assembly_from_source<S: AsRef<str>>(
        &self,
        code: &str,
        extra_flags: &[S],
    ) -> ToolchainResult<String> {
        self.compile_with_defaults(code, OutputFormat::Assembly, extra_flags)
            .map(decode_text)
    }

    pub fn get_llvm_ir_from_source<S: AsRef<str>>(
        &self,
        code: &str,
        extra_flags: &[S],
    ) -> ToolchainResult<String> {
        self.compile_with_defaults(code, OutputFormat::LlvmIr, extra_flags)
            .map(decode_text)
    }

    pub fn compile_bitcode<S: AsRef<str>>(
        &self,
        code: &str,
        extra_flags: &[S],
    ) -> ToolchainResult<Vec<u8>> {
        self.compile_with_defaults(code, OutputFormat::Bitcode, extra_flags)
    }
}
