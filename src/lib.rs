//! DLC - tile-kernel backend for the DLC accelerator.
//!
//! This crate maps a finalized tile-level kernel body onto the DLC memory
//! hierarchy and emits C source that calls into precompiled compute templates
//! instead of inlining vector code. Data movement between HBM and the
//! per-unit vector memory is expressed as asynchronous DMA transfers tracked
//! by semaphore flags. The generated source is compiled with a DLC-capable
//! clang located by the toolchain driver.
//!
//! # Primary Usage
//!
//! ```
//! use bumpalo::Bump;
//! use dlc_backend::core::CodegenSession;
//! use dlc_backend::dlc::{samples, CodegenOptions, DlcCodegen};
//!
//! let arena = Bump::new();
//! let session = CodegenSession::new(&arena);
//! let codegen = DlcCodegen::new(&session, CodegenOptions::default());
//!
//! let kernel = samples::vector_add(1024)?;
//! let source = codegen.emit_module(&[kernel])?;
//! assert!(source.contains("dlc_dma_new("));
//! # Ok::<(), dlc_backend::core::CodegenError>(())
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Data model (dtypes, address spaces, buffers, session)
//! - [`templates`] - Compute template dispatch table
//! - [`dlc`] - Operand resolver, tile ops, DMA/sync, kernel bodies, codegen
//! - [`toolchain`] - Compiler discovery and invocation
//! - [`check`] - FileCheck-style validation of generated source

pub mod check;
pub mod core;
pub mod dlc;
pub mod templates;
pub mod toolchain;

// Re-export common types from organized modules
pub use self::core::{
    // Data model
    AddressSpace, Buffer, BufferRegion, DType, IndexExpr, Scope,
    // Session management
    CodegenSession, SessionStats,
    // Errors
    CodegenError, CodegenResult,
};
pub use self::dlc::{generate_source, CodegenOptions, DlcCodegen, KernelBody, KernelBuilder};
pub use self::toolchain::{OutputFormat, Toolchain, ToolchainConfig, ToolchainError, ToolchainResult};
