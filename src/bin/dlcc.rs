//! DLC compiler driver.
//!
//! Locates a DLC-capable clang, prints the default compile options, compiles
//! kernel sources to objects, assembly, IR or bitcode, and emits the bundled
//! sample kernels.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use dlc_backend::check::check_output;
use dlc_backend::dlc::{generate_source, samples};
use dlc_backend::toolchain::{ObjectSummary, OutputFormat, Toolchain, ToolchainConfig};

#[derive(Parser)]
#[command(name = "dlcc", version, about = "DLC kernel compiler driver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Locate the compiler and check DLC target support
    Find {
        /// Log the target check and print the registered targets
        #[arg(long)]
        verbose: bool,
    },
    /// Print the default compile options
    Options {
        /// Extra shell-style flags to append
        #[arg(short = 'f', long = "flag", value_name = "FLAGS")]
        flags: Vec<String>,
    },
    /// Compile a kernel source file
    Compile {
        /// Input .c file
        input: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Object)]
        format: OutputFormat,
        /// Output file (default: printed or summarised on stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Extra shell-style flags to append
        #[arg(short = 'f', long = "flag", value_name = "FLAGS")]
        flags: Vec<String>,
        /// Keep sources and artifacts in this directory
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        verbose: bool,
    },
    /// Emit the source of a bundled sample kernel
    Demo {
        kernel: Demo,
        /// Write the source here instead of stdout
        #[arg(long, value_name = "PATH")]
        emit: Option<PathBuf>,
        /// Validate the source against CHECK directives in this file
        #[arg(long, value_name = "PATH")]
        check: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Demo {
    VectorAdd,
    DmaCopy,
    TiledAdd,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Find { verbose } => cmd_find(verbose),
        Command::Options { flags } => cmd_options(&flags),
        Command::Compile {
            input,
            format,
            output,
            flags,
            output_dir,
            verbose,
        } => cmd_compile(input, format, output, &flags, output_dir, verbose),
        Command::Demo {
            kernel,
            emit,
            check,
        } => cmd_demo(kernel, emit, check),
    }
}

fn cmd_find(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let toolchain = Toolchain::from_process(ToolchainConfig::default().with_verbose(verbose));
    let Some(path) = toolchain.find_compiler() else {
        return Err(dlc_backend::ToolchainError::ToolchainNotFound.into());
    };
    println!("compiler: {}", path.display());
    let supported = toolchain.check_target_support(&path, verbose);
    println!(
        "target '{}': {}",
        toolchain.config().target,
        if supported { "supported" } else { "not supported" }
    );
    if verbose {
        if let Ok(targets) = toolchain.print_targets(&path) {
            print!("{}", targets);
        }
    }
    Ok(())
}

fn cmd_options(flags: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let toolchain = Toolchain::from_process(ToolchainConfig::default());
    for option in toolchain.default_compile_options(flags)? {
        println!("{}", option);
    }
    Ok(())
}

fn cmd_compile(
    input: PathBuf,
    format: OutputFormat,
    output: Option<PathBuf>,
    flags: &[String],
    output_dir: Option<PathBuf>,
    verbose: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let code = std::fs::read_to_string(&input)?;

    let mut config = ToolchainConfig::default().with_verbose(verbose);
    if let Some(dir) = output_dir {
        config = config.with_output_dir(dir);
    }
    let toolchain = Toolchain::from_process(config);
    let options = toolchain.default_compile_options(flags)?;
    let bytes = toolchain.compile(&code, format, &options, output.as_deref())?;

    match (&output, format) {
        (Some(path), _) => println!("wrote {} ({} bytes)", path.display(), bytes.len()),
        (None, OutputFormat::Object) => print!("{}", ObjectSummary::parse(&bytes)?),
        (None, OutputFormat::Bitcode) => println!("{} bytes of bitcode", bytes.len()),
        (None, _) => print!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(())
}

fn cmd_demo(
    kernel: Demo,
    emit: Option<PathBuf>,
    check: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let body = match kernel {
        Demo::VectorAdd => samples::vector_add(1024)?,
        Demo::DmaCopy => samples::dma_copy(1024, 1024, 128, 256)?,
        Demo::TiledAdd => samples::tiled_add(1024, 1024, 128, 256)?,
    };
    let source = generate_source(&body)?;

    if let Some(path) = check {
        let directives = std::fs::read_to_string(&path)?;
        check_output(&source, &directives)?;
        eprintln!("{}: all checks passed", path.display());
    }

    match emit {
        Some(path) => {
            std::fs::write(&path, &source)?;
            println!("wrote {}", path.display());
        }
        None => print!("{}", source),
    }
    Ok(())
}
