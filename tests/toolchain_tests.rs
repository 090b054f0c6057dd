//! Tests for the toolchain driver against fake compilers.
//!
//! Each fake `clang` is a small shell script: it answers `-print-targets` and
//! otherwise writes (or refuses to write) the file named after `-o`. All
//! scripts are created once, before any of them runs.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use dlc_backend::dlc::{generate_source, samples};
use dlc_backend::toolchain::env::{CUSTOM_KERNEL_PATH_VAR, LLVM_PATH_VAR};
use dlc_backend::toolchain::{
    OutputFormat, Toolchain, ToolchainConfig, ToolchainEnv, ToolchainError,
};

const TARGETS: &str = r#"if [ "$1" = "-print-targets" ]; then
  echo "  Registered Targets:"
  echo "    dlc     - DLC accelerator"
  echo "    x86-64  - 64-bit X86: EM64T and AMD64"
  exit 0
fi"#;

const WRITE_OUTPUT: &str = r#"out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; shift; fi
  shift
done"#;

/// Root holding one LLVM-style tree per fake compiler.
fn compilers() -> &'static Path {
    static ROOT: OnceLock<tempfile::TempDir> = OnceLock::new();
    ROOT.get_or_init(|| {
        let dir = tempfile::Builder::new().prefix("dlcc-fake-").tempdir().unwrap();
        let root = dir.path();
        let scripts = [
            (
                "good",
                format!(
                    "{}\nargs=\"$*\"\n{}\nprintf 'DLCOBJ %s' \"$args\" > \"$out\"\n",
                    TARGETS, WRITE_OUTPUT
                ),
            ),
            (
                "nodlc",
                "#!/bin/sh\necho \"    x86-64  - 64-bit X86\"\n".to_string(),
            ),
            (
                "failing",
                format!("{}\necho \"kernel.c:3:1: error: unknown type name 'flaot'\" >&2\nexit 1\n", TARGETS),
            ),
            (
                "empty",
                format!("{}\n{}\n: > \"$out\"\n", TARGETS, WRITE_OUTPUT),
            ),
            ("silent", format!("{}\necho \"done\"\nexit 0\n", TARGETS)),
        ];
        for (name, body) in scripts {
            let path = root.join(name).join("bin/clang");
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            let body = if body.starts_with("#!") {
                body
            } else {
                format!("#!/bin/sh\n{}", body)
            };
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        dir
    })
    .path()
}

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A kernel include tree with `dlc_kernels/` inside.
fn kernel_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("dlc_kernels")).unwrap();
    dir
}

fn isolated_config() -> ToolchainConfig {
    ToolchainConfig {
        install_prefixes: Vec::new(),
        system_include_dir: PathBuf::from("/nonexistent/external_includes"),
        ..ToolchainConfig::default()
    }
}

fn toolchain(compiler: &str, kernels: &Path, config: ToolchainConfig) -> Toolchain {
    let env = ToolchainEnv::empty()
        .with_var(LLVM_PATH_VAR, compilers().join(compiler).to_str().unwrap())
        .with_var(CUSTOM_KERNEL_PATH_VAR, kernels.to_str().unwrap());
    Toolchain::new(config, env)
}

fn vector_add_source() -> String {
    generate_source(&samples::vector_add(256).unwrap()).unwrap()
}

#[test]
fn test_not_found_writes_nothing() {
    init_logger();
    let scratch = tempfile::tempdir().unwrap();
    let out_dir = scratch.path().join("kernels");
    let toolchain = Toolchain::new(
        isolated_config().with_output_dir(&out_dir),
        ToolchainEnv::empty(),
    );

    let err = toolchain
        .compile(&vector_add_source(), OutputFormat::Object, &[], None)
        .unwrap_err();
    assert!(matches!(err, ToolchainError::ToolchainNotFound));
    assert!(err.to_string().contains("LLVM_PATH"));
    assert!(!out_dir.exists());
}

#[test]
fn test_unsupported_target_before_compile() {
    init_logger();
    let kernels = kernel_root();
    let scratch = tempfile::tempdir().unwrap();
    let out_dir = scratch.path().join("kernels");
    let toolchain = toolchain(
        "nodlc",
        kernels.path(),
        isolated_config().with_output_dir(&out_dir),
    );

    let compiler = toolchain.find_compiler().unwrap();
    assert!(!toolchain.check_target_support(&compiler, false));
    match toolchain.get_object_from_source(&vector_add_source(), &["-g"]) {
        Err(ToolchainError::UnsupportedTarget { path, target }) => {
            assert_eq!(path, compiler);
            assert_eq!(target, "dlc");
        }
        other => panic!("expected UnsupportedTarget, got {:?}", other.map(|b| b.len())),
    }
    assert!(!out_dir.exists());
}

#[test]
fn test_print_targets() {
    init_logger();
    let kernels = kernel_root();
    let toolchain = toolchain("good", kernels.path(), isolated_config());
    let compiler = toolchain.get_compiler().unwrap();
    assert_eq!(compiler, compilers().join("good/bin/clang"));
    assert!(toolchain
        .print_targets(&compiler)
        .unwrap()
        .contains("DLC accelerator"));
}

#[test]
fn test_object_command_line() {
    init_logger();
    let kernels = kernel_root();
    let toolchain = toolchain("good", kernels.path(), isolated_config());
    let bytes = toolchain
        .get_object_from_source(&vector_add_source(), &["-DTILE=256 -g"])
        .unwrap();
    let args = String::from_utf8(bytes).unwrap();

    assert!(args.starts_with("DLCOBJ -target dlc -O2 -c -std=dc99 "));
    let include = format!("-I{}", kernels.path().join("dlc_kernels").display());
    assert_eq!(args.matches(include.as_str()).count(), 1);
    assert!(args.contains(&format!("{} -DTILE=256 -g -o ", include)));
    assert!(args.ends_with("dlc_kernel.c"));
    assert!(args.contains("dlc_kernel.o"));
}

#[test]
fn test_format_flags_reach_compiler() {
    init_logger();
    let kernels = kernel_root();
    let toolchain = toolchain("good", kernels.path(), isolated_config());
    let code = vector_add_source();

    let asm = toolchain.get_assembly_from_source::<&str>(&code, &[]).unwrap();
    assert!(asm.contains(" -S -std=dc99"));
    assert!(asm.contains("dlc_kernel.s"));

    let ir = toolchain.get_llvm_ir_from_source::<&str>(&code, &[]).unwrap();
    assert!(ir.contains(" -S -emit-llvm -std=dc99"));
    assert!(ir.contains("dlc_kernel.ll"));

    let bc = toolchain.compile_bitcode::<&str>(&code, &[]).unwrap();
    let bc = String::from_utf8(bc).unwrap();
    assert!(bc.contains(" -c -emit-llvm -std=dc99"));
    assert!(bc.contains("dlc_kernel.bc"));
}

#[test]
fn test_persistent_output_dir_is_created() {
    init_logger();
    let kernels = kernel_root();
    let scratch = tempfile::tempdir().unwrap();
    let out_dir = scratch.path().join("nested/kernels");
    let toolchain = toolchain(
        "good",
        kernels.path(),
        isolated_config().with_output_dir(&out_dir),
    );
    let code = vector_add_source();
    toolchain.get_object_from_source::<&str>(&code, &[]).unwrap();

    assert_eq!(
        std::fs::read_to_string(out_dir.join("dlc_kernel.c")).unwrap(),
        code
    );
    assert!(out_dir.join("dlc_kernel.o").is_file());
}

#[test]
fn test_explicit_output_path() {
    init_logger();
    let kernels = kernel_root();
    let scratch = tempfile::tempdir().unwrap();
    let target = scratch.path().join("vector_add.o");
    let toolchain = toolchain("good", kernels.path(), isolated_config());
    let options = toolchain.default_compile_options::<&str>(&[]).unwrap();
    let bytes = toolchain
        .compile(&vector_add_source(), OutputFormat::Object, &options, Some(&target))
        .unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), bytes);
}

#[test]
fn test_compilation_error_carries_context() {
    init_logger();
    let kernels = kernel_root();
    let toolchain = toolchain("failing", kernels.path(), isolated_config());
    let code = "void k(int cid) { flaot x; }";
    match toolchain.get_object_from_source::<&str>(code, &[]) {
        Err(ToolchainError::CompilationError {
            command,
            output,
            status,
            code: source,
        }) => {
            assert_eq!(status, Some(1));
            assert!(output.contains("unknown type name 'flaot'"));
            assert!(command.contains("-target dlc -O2 -c"));
            assert_eq!(source, code);
        }
        other => panic!("expected CompilationError, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn test_empty_output_is_a_compilation_error() {
    init_logger();
    let kernels = kernel_root();
    let toolchain = toolchain("empty", kernels.path(), isolated_config());
    let code = vector_add_source();
    match toolchain.get_object_from_source::<&str>(&code, &[]) {
        Err(ToolchainError::CompilationError {
            command,
            output,
            status,
            code: source,
        }) => {
            assert_eq!(status, Some(0));
            assert!(command.contains("-target dlc -O2 -c"));
            assert!(output.contains("no output written to"), "{}", output);
            assert_eq!(source, code);
        }
        other => panic!("expected CompilationError, got {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn test_stale_artifact_is_not_returned() {
    init_logger();
    let kernels = kernel_root();
    let scratch = tempfile::tempdir().unwrap();
    let out_dir = scratch.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();
    let stale = out_dir.join("dlc_kernel.o");
    std::fs::write(&stale, "previous kernel").unwrap();

    let toolchain = toolchain(
        "silent",
        kernels.path(),
        isolated_config().with_output_dir(&out_dir),
    );
    let code = vector_add_source();
    let err = toolchain
        .get_object_from_source::<&str>(&code, &[])
        .unwrap_err();
    assert!(matches!(err, ToolchainError::CompilationError { status: Some(0), .. }));
    assert_eq!(err.kernel_source(), Some(code.as_str()));
    assert!(!stale.exists());

    // an explicit output path is cleared the same way
    let target = scratch.path().join("explicit.o");
    std::fs::write(&target, "previous kernel").unwrap();
    let options = toolchain.default_compile_options::<&str>(&[]).unwrap();
    assert!(toolchain
        .compile(&code, OutputFormat::Object, &options, Some(&target))
        .is_err());
    assert!(!target.exists());
}

#[test]
fn test_missing_include_path_fails_before_compile() {
    init_logger();
    let missing = tempfile::tempdir().unwrap();
    let toolchain = toolchain("good", missing.path(), isolated_config());
    match toolchain.get_object_from_source::<&str>(&vector_add_source(), &[]) {
        Err(ToolchainError::MissingIncludePath { from_env, .. }) => assert!(from_env),
        other => panic!("expected MissingIncludePath, got {:?}", other.map(|b| b.len())),
    }
}
