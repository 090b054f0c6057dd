// This module defines the error type for everything that happens before the toolchain is
// involved: operand resolution, tile-operation emission, DMA/sync synthesis, and C source
// generation. CodegenError uses thiserror like the rest of the crate. The variants split
// into input-contract violations (unsupported operand kinds, element-count mismatches,
// out-of-range regions, source dtypes that differ from the destination, unmapped dtypes), target constraints (template support, address
// spaces, DMA sizes), and sync-flag protocol violations detected while walking a kernel
// body. All of them are fatal for the kernel being emitted; nothing is retried and no
// partial source is returned.

//! Error types for the DLC code generator.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for kernel-body emission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    #[error("Unsupported operand kind for {operation}: {kind}")]
    UnsupportedOperandKind {
        operation: &'static str,
        kind: String,
    },

    #[error("Element count mismatch in {operation}: {}", format_sizes(.operands))]
    SizeMismatch {
        operation: &'static str,
        /// `(operand name, buffer shape, element count)` per operand.
        operands: Vec<(&'static str, Vec<usize>, usize)>,
    },

    #[error("{operation} on {expected} cannot read '{buffer}' of dtype {found}")]
    DTypeMismatch {
        operation: &'static str,
        buffer: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("No DLC type mapping for dtype '{dtype}'")]
    UnmappedDType { dtype: String },

    #[error("Region of buffer '{buffer}' out of bounds: {reason}")]
    RegionOutOfBounds { buffer: String, reason: String },

    #[error("No compute template for {operation} on {dtype}")]
    UnsupportedTemplate {
        operation: &'static str,
        dtype: &'static str,
    },

    #[error("Buffer '{buffer}' lives in {declared} but was used as {requested}")]
    AddressSpaceMismatch {
        buffer: String,
        declared: &'static str,
        requested: &'static str,
    },

    #[error("Address space {space} is reserved and cannot be a DMA endpoint")]
    ReservedAddressSpace { space: &'static str },

    #[error("DMA of {size_bytes} bytes does not fit {side} buffer '{buffer}' ({capacity} bytes)")]
    DmaSizeMismatch {
        side: &'static str,
        buffer: String,
        size_bytes: usize,
        capacity: usize,
    },

    #[error("'{flag}' is not a sync flag allocated in this kernel")]
    InvalidSyncFlag { flag: String },

    #[error("Sync flag '{flag}' still has {issued} pending transfer(s) at the end of the kernel")]
    FlagStillPending { flag: String, issued: u32 },

    #[error("Sync flag '{flag}' cannot count more than {} pending transfers", u32::MAX)]
    FlagCounterOverflow { flag: String },

    #[error("Sync flag '{flag}' was drained with sync_done and must be cleared before reuse")]
    FlagNotCleared { flag: String },

    #[error("Wait on sync flag '{flag}' with no transfer in flight")]
    WaitOnIdleFlag { flag: String },

    #[error("sync_gte threshold {threshold} on '{flag}' exceeds the {issued} transfer(s) issued")]
    UnreachableThreshold {
        flag: String,
        threshold: i64,
        issued: u32,
    },

    #[error("Unknown buffer '{name}'")]
    UnknownBuffer { name: String },

    #[error("Invalid kernel: {reason}")]
    InvalidKernel { reason: String },
}

fn format_sizes(operands: &[(&'static str, Vec<usize>, usize)]) -> String {
    operands
        .iter()
        .map(|(name, shape, count)| format!("{name} {shape:?} = {count}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for code generation.
pub type CodegenResult<T> = Result<T, CodegenError>;
