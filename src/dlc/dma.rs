// This module implements the DMA/sync subsystem. dma() validates and builds an
// asynchronous transfer descriptor between two address spaces: both endpoints must be
// pointer operands in the address space the caller names, SEMAPHORE space is never a DMA
// endpoint, and the byte count (the one quantity in the backend that is not an element
// count) must exactly match both ends when both are whole buffers and fit inside each end
// otherwise. Sync flags are small int32 buffers tagged with the SyncFlag role; the code
// generator places them in SEMAPHORE space. sync, sync_done, sync_gte, and sync_clear build
// the wait and reset intrinsics.
//
// SyncTracker walks the statements of one kernel in program order and enforces the flag
// protocol at emission time. Transfers issued back-to-back on one flag form a cumulative
// batch that the next wait consumes; a flag drained with sync_done has to be cleared
// before it is reused; a wait on a flag nothing was issued on can never complete; a
// constant sync_gte threshold above the number of transfers issued since the last clear
// is unreachable; and a flag left pending at the end of the kernel means a transfer no
// one waits for. Under FlagPolicy::Permissive the same violations are only logged.

//! DMA descriptors, sync intrinsics, and sync-flag protocol checking.

use std::collections::HashMap;
use std::fmt;

use crate::core::{
    AddressSpace, Buffer, BufferRole, CodegenError, CodegenResult, DType, IndexExpr,
};

use super::operand::{resolve, AccessMode, AccessPtr, TileRef};

/// Default source and destination stride of a transfer.
pub const DEFAULT_DMA_STRIDE: usize = 128;

/// A semaphore-backed completion flag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncFlag {
    buffer: Buffer,
}

impl SyncFlag {
    pub fn name(&self) -> &str {
        &self.buffer.name
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

impl From<&SyncFlag> for TileRef {
    fn from(flag: &SyncFlag) -> Self {
        TileRef::WholeBuffer(flag.buffer.clone())
    }
}

/// Allocate a local int32 sync flag of `size` counters.
pub fn alloc_sync_flag(name: impl Into<String>, size: usize) -> CodegenResult<SyncFlag> {
    let mut buffer = Buffer::local(name, &[size], DType::Int32)?;
    buffer.role = BufferRole::SyncFlag;
    Ok(SyncFlag { buffer })
}

/// Optional parts of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaOptions {
    /// Signalled when the source has been read.
    pub src_flag: Option<SyncFlag>,
    /// Signalled when the destination has been written.
    pub dst_flag: Option<SyncFlag>,
    pub src_stride: usize,
    pub dst_stride: usize,
}

impl Default for DmaOptions {
    fn default() -> Self {
        Self {
            src_flag: None,
            dst_flag: None,
            src_stride: DEFAULT_DMA_STRIDE,
            dst_stride: DEFAULT_DMA_STRIDE,
        }
    }
}

impl DmaOptions {
    pub fn with_src_flag(mut self, flag: &SyncFlag) -> Self {
        self.src_flag = Some(flag.clone());
        self
    }

    pub fn with_dst_flag(mut self, flag: &SyncFlag) -> Self {
        self.dst_flag = Some(flag.clone());
        self
    }

    pub fn with_strides(mut self, src_stride: usize, dst_stride: usize) -> Self {
        self.src_stride = src_stride;
        self.dst_stride = dst_stride;
        self
    }
}

/// A validated transfer descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaCall {
    pub src: AccessPtr,
    pub src_space: AddressSpace,
    pub dst: AccessPtr,
    pub dst_space: AddressSpace,
    pub size_bytes: usize,
    pub src_stride: usize,
    pub dst_stride: usize,
    pub src_flag: Option<String>,
    pub dst_flag: Option<String>,
}

impl DmaCall {
    /// Flags signalled by this transfer, source side first.
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.src_flag
            .iter()
            .chain(self.dst_flag.iter())
            .map(String::as_str)
    }

    /// Address-unit shift of the transfer, taken from the source element width.
    pub fn addr_unit_shift(&self) -> u32 {
        self.src.dtype.addr_unit_shift()
    }
}

fn dma_endpoint(
    side: &'static str,
    tile: &TileRef,
    space: AddressSpace,
    mode: AccessMode,
) -> CodegenResult<(AccessPtr, usize)> {
    if !space.is_dma_capable() {
        return Err(CodegenError::ReservedAddressSpace {
            space: space.c_name(),
        });
    }
    let (ptr, count) = resolve("dma", tile, mode)?;
    if ptr.space != space {
        return Err(CodegenError::AddressSpaceMismatch {
            buffer: ptr.buffer,
            declared: ptr.space.c_name(),
            requested: space.c_name(),
        });
    }
    let capacity = count * ptr.dtype.bytes();
    log::trace!("dma {} endpoint {} in {} ({} bytes)", side, ptr, space, capacity);
    Ok((ptr, capacity))
}

/// Build a transfer of `size_bytes` from `src` in `src_space` to `dst` in `dst_space`.
pub fn dma(
    src: impl Into<TileRef>,
    src_space: AddressSpace,
    dst: impl Into<TileRef>,
    dst_space: AddressSpace,
    size_bytes: usize,
    options: &DmaOptions,
) -> CodegenResult<DmaCall> {
    let (src, dst) = (src.into(), dst.into());
    let (src_ptr, src_capacity) = dma_endpoint("source", &src, src_space, AccessMode::Read)?;
    let (dst_ptr, dst_capacity) =
        dma_endpoint("destination", &dst, dst_space, AccessMode::Write)?;

    let exact = src.is_whole() && dst.is_whole();
    for (side, ptr, capacity) in [
        ("source", &src_ptr, src_capacity),
        ("destination", &dst_ptr, dst_capacity),
    ] {
        let fits = if exact {
            size_bytes == capacity
        } else {
            size_bytes > 0 && size_bytes <= capacity
        };
        if !fits {
            return Err(CodegenError::DmaSizeMismatch {
                side,
                buffer: ptr.buffer.clone(),
                size_bytes,
                capacity,
            });
        }
    }

    Ok(DmaCall {
        src: src_ptr,
        src_space,
        dst: dst_ptr,
        dst_space,
        size_bytes,
        src_stride: options.src_stride,
        dst_stride: options.dst_stride,
        src_flag: options.src_flag.as_ref().map(|f| f.name().to_string()),
        dst_flag: options.dst_flag.as_ref().map(|f| f.name().to_string()),
    })
}

/// Which sync intrinsic to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncKind {
    /// Wait for full completion (single-step protocol).
    Wait,
    /// Wait for completion, to be followed by a clear.
    WaitDone,
    /// Wait until the counter reaches a threshold.
    WaitGte(IndexExpr),
    Clear,
}

impl SyncKind {
    pub fn intrinsic(&self) -> &'static str {
        match self {
            SyncKind::Wait => "dlc_sync_new",
            SyncKind::WaitDone => "dlc_sync_done_new",
            SyncKind::WaitGte(_) => "dlc_sync_gte_new",
            SyncKind::Clear => "dlc_sync_clear_new",
        }
    }
}

/// A sync intrinsic call on one flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCall {
    pub kind: SyncKind,
    pub flag: String,
}

pub fn sync(flag: &SyncFlag) -> SyncCall {
    SyncCall {
        kind: SyncKind::Wait,
        flag: flag.name().to_string(),
    }
}

pub fn sync_done(flag: &SyncFlag) -> SyncCall {
    SyncCall {
        kind: SyncKind::WaitDone,
        flag: flag.name().to_string(),
    }
}

pub fn sync_gte(flag: &SyncFlag, threshold: impl Into<IndexExpr>) -> SyncCall {
    SyncCall {
        kind: SyncKind::WaitGte(threshold.into()),
        flag: flag.name().to_string(),
    }
}

pub fn sync_clear(flag: &SyncFlag) -> SyncCall {
    SyncCall {
        kind: SyncKind::Clear,
        flag: flag.name().to_string(),
    }
}

// --------------------------
// flag protocol tracking
// --------------------------

/// How protocol violations are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagPolicy {
    /// Violations fail emission.
    #[default]
    Strict,
    /// Violations are logged and emission continues.
    Permissive,
}

/// Emission-time state of one flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    Clear,
    /// `issued` transfers since the last clear, not yet waited on.
    Pending { issued: u32 },
    /// Waited on; `drained` when reached through `sync_done`.
    Done { issued: u32, drained: bool },
}

impl fmt::Display for FlagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagState::Clear => f.write_str("clear"),
            FlagState::Pending { issued } => write!(f, "pending ({} issued)", issued),
            FlagState::Done { drained: true, .. } => f.write_str("drained"),
            FlagState::Done { .. } => f.write_str("done"),
        }
    }
}

/// Tracks every sync flag of one kernel.
#[derive(Debug)]
pub struct SyncTracker {
    policy: FlagPolicy,
    flags: HashMap<String, FlagState>,
    /// Allocation order, for deterministic end-of-kernel reports.
    order: Vec<String>,
}

impl SyncTracker {
    pub fn new(policy: FlagPolicy) -> Self {
        Self {
            policy,
            flags: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a freshly allocated flag.
    pub fn declare(&mut self, flag: &str) {
        if self
            .flags
            .insert(flag.to_string(), FlagState::Clear)
            .is_none()
        {
            self.order.push(flag.to_string());
        }
    }

    pub fn state(&self, flag: &str) -> Option<FlagState> {
        self.flags.get(flag).copied()
    }

    fn violation(&self, err: CodegenError) -> CodegenResult<()> {
        match self.policy {
            FlagPolicy::Strict => Err(err),
            FlagPolicy::Permissive => {
                log::warn!("{}", err);
                Ok(())
            }
        }
    }

    fn lookup(&self, flag: &str) -> CodegenResult<FlagState> {
        self.state(flag).ok_or_else(|| CodegenError::InvalidSyncFlag {
            flag: flag.to_string(),
        })
    }

    fn set(&mut self, flag: &str, state: FlagState) {
        log::trace!("sync flag '{}' -> {}", flag, state);
        if let Some(slot) = self.flags.get_mut(flag) {
            *slot = state;
        }
    }

    /// A transfer signalling `flag` was issued.
    pub fn on_dma(&mut self, flag: &str) -> CodegenResult<()> {
        let next = match self.lookup(flag)? {
            FlagState::Clear => FlagState::Pending { issued: 1 },
            FlagState::Pending { issued } => FlagState::Pending {
                issued: issued
                    .checked_add(1)
                    .ok_or_else(|| CodegenError::FlagCounterOverflow {
                        flag: flag.to_string(),
                    })?,
            },
            FlagState::Done { drained: false, .. } => FlagState::Pending { issued: 1 },
            FlagState::Done { drained: true, .. } => {
                self.violation(CodegenError::FlagNotCleared {
                    flag: flag.to_string(),
                })?;
                FlagState::Pending { issued: 1 }
            }
        };
        self.set(flag, next);
        Ok(())
    }

    /// A wait, clear, or threshold wait on `call.flag`.
    pub fn on_sync(&mut self, call: &SyncCall) -> CodegenResult<()> {
        let flag = call.flag.as_str();
        let state = self.lookup(flag)?;
        let idle = || CodegenError::WaitOnIdleFlag {
            flag: flag.to_string(),
        };
        let next = match (&call.kind, state) {
            (SyncKind::Clear, _) => FlagState::Clear,
            (SyncKind::Wait | SyncKind::WaitDone | SyncKind::WaitGte(_), FlagState::Clear) => {
                self.violation(idle())?;
                FlagState::Clear
            }
            (SyncKind::Wait, FlagState::Pending { issued }) => FlagState::Done {
                issued,
                drained: false,
            },
            (SyncKind::WaitDone, FlagState::Pending { issued }) => FlagState::Done {
                issued,
                drained: true,
            },
            (SyncKind::WaitDone, FlagState::Done { issued, .. }) => FlagState::Done {
                issued,
                drained: true,
            },
            (SyncKind::Wait, done @ FlagState::Done { .. }) => done,
            (SyncKind::WaitGte(threshold), FlagState::Pending { issued }) => {
                match threshold.as_const() {
                    Some(t) if t > issued as i64 => {
                        self.violation(CodegenError::UnreachableThreshold {
                            flag: flag.to_string(),
                            threshold: t,
                            issued,
                        })?;
                        FlagState::Pending { issued }
                    }
                    Some(t) if t == issued as i64 => FlagState::Done {
                        issued,
                        drained: false,
                    },
                    _ => FlagState::Pending { issued },
                }
            }
            (SyncKind::WaitGte(threshold), done @ FlagState::Done { issued, .. }) => {
                if let Some(t) = threshold.as_const().filter(|t| *t > issued as i64) {
                    self.violation(CodegenError::UnreachableThreshold {
                        flag: flag.to_string(),
                        threshold: t,
                        issued,
                    })?;
                }
                done
            }
        };
        self.set(flag, next);
        Ok(())
    }

    /// Report flags still pending at the end of the kernel.
    pub fn finish(&self) -> CodegenResult<()> {
        for flag in &self.order {
            if let Some(FlagState::Pending { issued }) = self.state(flag) {
                self.violation(CodegenError::FlagStillPending {
                    flag: flag.clone(),
                    issued,
                })?;
            }
        }
        Ok(())
    }
}
