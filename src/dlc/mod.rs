// This module collects the DLC-specific half of the backend: the operand resolver, the
// tile-operation emitter, the DMA/sync subsystem with its flag-protocol tracker, the
// kernel-body contract and builder, the C source generator, and a handful of sample
// kernels. Everything here is pure and in-memory; turning the generated source into an
// artifact is the toolchain module's job.

//! DLC kernel construction and C source generation.
//!
//! ```
//! use dlc_backend::dlc::{generate_source, samples};
//!
//! let kernel = samples::vector_add(256)?;
//! let source = generate_source(&kernel)?;
//! assert!(source.contains("binary_op_template<ADD>"));
//! # Ok::<(), dlc_backend::core::CodegenError>(())
//! ```

pub mod codegen;
pub mod dma;
pub mod kernel;
pub mod operand;
pub mod samples;
pub mod tile;

pub use codegen::{generate_source, CodegenOptions, DlcCodegen, FIXED_HEADERS};
pub use dma::{
    alloc_sync_flag, dma, sync, sync_clear, sync_done, sync_gte, DmaCall, DmaOptions,
    FlagPolicy, FlagState, SyncCall, SyncFlag, SyncKind, SyncTracker,
};
pub use kernel::{KernelBody, KernelBuilder, Stmt};
pub use operand::{resolve, AccessMode, AccessPtr, Operand, Scalar, TileRef};
pub use tile::TileCall;
