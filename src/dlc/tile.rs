// This module implements the tile-operation emitter: element-wise arithmetic, unary math,
// fill, and copy over VMEM tiles. Every operation resolves its operands through the
// operand resolver, checks element counts, looks up the compute template for its
// (operation kind, dst dtype) pair, and returns a TileCall node for the kernel body. No
// per-element code is ever produced here; the code generator turns a TileCall into one
// template call site. Binary operations pick their scalar form when the second source is a
// scalar literal, and in that form the literal is passed by value and is never size
// checked. Compute templates operate on vector memory, so every pointer operand must live
// in VMEM. The template is chosen by the dst dtype and every source pointer must share it.

//! Element-wise tile operations lowered to compute-template calls.

use crate::core::{AddressSpace, CodegenError, CodegenResult, DType};
use crate::templates::{self, OpKind, TemplateRef};

use super::operand::{ensure_same_count, resolve, AccessMode, AccessPtr, Operand, Scalar, TileRef};

/// One template call site.
#[derive(Debug, Clone, PartialEq)]
pub struct TileCall {
    pub op: OpKind,
    pub template: TemplateRef,
    pub dst: AccessPtr,
    /// Source operands in call order; literals for scalar forms and fill.
    pub srcs: Vec<Operand>,
    /// Common element count.
    pub count: usize,
}

impl TileCall {
    pub fn dtype(&self) -> DType {
        self.template.dtype
    }

    /// Names of every buffer the call touches.
    pub fn buffers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.dst.buffer.as_str())
            .chain(self.srcs.iter().filter_map(|op| op.ptr()).map(|p| p.buffer.as_str()))
    }
}

fn resolve_vmem(
    operation: &'static str,
    tile: &TileRef,
    mode: AccessMode,
) -> CodegenResult<(AccessPtr, usize)> {
    let (ptr, count) = resolve(operation, tile, mode)?;
    if ptr.space != AddressSpace::VectorMemory {
        return Err(CodegenError::AddressSpaceMismatch {
            buffer: ptr.buffer,
            declared: ptr.space.c_name(),
            requested: AddressSpace::VectorMemory.c_name(),
        });
    }
    Ok((ptr, count))
}

fn make_call(op: OpKind, dst: AccessPtr, srcs: Vec<Operand>, count: usize) -> CodegenResult<TileCall> {
    for src in srcs.iter().filter_map(Operand::ptr) {
        if src.dtype != dst.dtype {
            return Err(CodegenError::DTypeMismatch {
                operation: op.name(),
                buffer: src.buffer.clone(),
                expected: dst.dtype.name(),
                found: src.dtype.name(),
            });
        }
    }
    let template = templates::lookup(op, dst.dtype)?;
    log::trace!("{} -> {} over {} elements", op, template, count);
    Ok(TileCall {
        op,
        template,
        dst,
        srcs,
        count,
    })
}

/// `dst = src0 <op> src1`; the scalar form is selected when `src1` is a literal.
pub fn binary(
    op: OpKind,
    dst: impl Into<TileRef>,
    src0: impl Into<TileRef>,
    src1: impl Into<TileRef>,
) -> CodegenResult<TileCall> {
    let (dst, src0, src1) = (dst.into(), src0.into(), src1.into());
    let name = op.name();
    let (dst_ptr, dst_count) = resolve_vmem(name, &dst, AccessMode::Write)?;
    let (src0_ptr, src0_count) = resolve_vmem(name, &src0, AccessMode::Read)?;

    if let TileRef::Scalar(value) = src1 {
        let Some(scalar_op) = op.scalar_form() else {
            return Err(CodegenError::UnsupportedOperandKind {
                operation: name,
                kind: format!("scalar {}", value),
            });
        };
        ensure_same_count(name, &[("dst", &dst, dst_count), ("src0", &src0, src0_count)])?;
        let srcs = vec![
            Operand::Ptr {
                ptr: src0_ptr,
                count: src0_count,
            },
            Operand::Literal(value),
        ];
        return make_call(scalar_op, dst_ptr, srcs, dst_count);
    }

    let (src1_ptr, src1_count) = resolve_vmem(name, &src1, AccessMode::Read)?;
    ensure_same_count(
        name,
        &[
            ("dst", &dst, dst_count),
            ("src0", &src0, src0_count),
            ("src1", &src1, src1_count),
        ],
    )?;
    let srcs = vec![
        Operand::Ptr {
            ptr: src0_ptr,
            count: src0_count,
        },
        Operand::Ptr {
            ptr: src1_ptr,
            count: src1_count,
        },
    ];
    make_call(op, dst_ptr, srcs, dst_count)
}

/// `dst = op(src)` for unary operations and copy.
pub fn unary(op: OpKind, dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    let (dst, src) = (dst.into(), src.into());
    let name = op.name();
    let (dst_ptr, dst_count) = resolve_vmem(name, &dst, AccessMode::Write)?;
    let (src_ptr, src_count) = resolve_vmem(name, &src, AccessMode::Read)?;
    ensure_same_count(name, &[("dst", &dst, dst_count), ("src", &src, src_count)])?;
    let srcs = vec![Operand::Ptr {
        ptr: src_ptr,
        count: src_count,
    }];
    make_call(op, dst_ptr, srcs, dst_count)
}

pub fn add(
    dst: impl Into<TileRef>,
    src0: impl Into<TileRef>,
    src1: impl Into<TileRef>,
) -> CodegenResult<TileCall> {
    binary(OpKind::Add, dst, src0, src1)
}

pub fn sub(
    dst: impl Into<TileRef>,
    src0: impl Into<TileRef>,
    src1: impl Into<TileRef>,
) -> CodegenResult<TileCall> {
    binary(OpKind::Sub, dst, src0, src1)
}

pub fn mul(
    dst: impl Into<TileRef>,
    src0: impl Into<TileRef>,
    src1: impl Into<TileRef>,
) -> CodegenResult<TileCall> {
    binary(OpKind::Mul, dst, src0, src1)
}

pub fn div(
    dst: impl Into<TileRef>,
    src0: impl Into<TileRef>,
    src1: impl Into<TileRef>,
) -> CodegenResult<TileCall> {
    binary(OpKind::Div, dst, src0, src1)
}

pub fn abs(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Abs, dst, src)
}

pub fn exp(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Exp, dst, src)
}

pub fn log(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Log, dst, src)
}

pub fn sqrt(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Sqrt, dst, src)
}

pub fn rsqrt(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Rsqrt, dst, src)
}

pub fn relu(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Relu, dst, src)
}

/// Copy within one address space. Cross-space moves go through `dma`.
pub fn copy(dst: impl Into<TileRef>, src: impl Into<TileRef>) -> CodegenResult<TileCall> {
    unary(OpKind::Copy, dst, src)
}

/// Set every element of `dst` to `value`.
pub fn fill(dst: impl Into<TileRef>, value: Scalar) -> CodegenResult<TileCall> {
    let dst = dst.into();
    let (dst_ptr, count) = resolve_vmem("fill", &dst, AccessMode::Write)?;
    make_call(OpKind::Fill, dst_ptr, vec![Operand::Literal(value)], count)
}
