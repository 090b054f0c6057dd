// This module implements the operand resolver shared by the tile-operation emitter and the
// DMA subsystem. A tile operand arrives as one of a closed set of forms (whole buffer,
// sub-region, materialized load of a local buffer, scalar literal) and is resolved into an
// access pointer plus an element count. For a whole buffer the pointer is the buffer base
// and the count the product of its shape; for a region the pointer is advanced by the
// row-major offset of the region origin and the count is the product of the region
// extents. The access mode (read, write, read-write) is carried on the pointer for the
// generator and never changes the arithmetic. Operations with several pointer operands
// check that every element count matches before anything is emitted.

//! Operand resolution: tile references to `(pointer, element count)`.

use std::fmt;

use crate::core::{Buffer, BufferRegion, CodegenError, CodegenResult, DType, IndexExpr, Scope};
use crate::core::AddressSpace;

/// How an operation accesses a pointer operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Access mask in the upstream IR's notation.
    pub fn mask(self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
            AccessMode::ReadWrite => "rw",
        }
    }

    pub fn writes(self) -> bool {
        !matches!(self, AccessMode::Read)
    }
}

/// A scalar passed by value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Index(IndexExpr),
}

impl Scalar {
    /// Render as a C literal of the given element type.
    pub fn render(&self, dtype: DType, index: &dyn Fn(&IndexExpr) -> String) -> String {
        match self {
            Scalar::Int(v) if dtype.is_float() => format!("({}){}", dtype.c_type(), v),
            Scalar::Int(v) => v.to_string(),
            Scalar::Float(v) if dtype == DType::Float32 => format!("{:?}f", v),
            Scalar::Float(v) if dtype.is_float() => format!("({}){:?}", dtype.c_type(), v),
            Scalar::Float(v) => format!("({}){:?}", dtype.c_type(), v),
            Scalar::Index(expr) => format!("({})({})", dtype.c_type(), index(expr)),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v:?}"),
            Scalar::Index(expr) => write!(f, "{expr}"),
        }
    }
}

/// A tile operand before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum TileRef {
    WholeBuffer(Buffer),
    SubRegion(BufferRegion),
    /// Materialized load of an allocated local buffer; resolves to the whole buffer.
    LocalLoad(Buffer),
    Scalar(Scalar),
}

impl TileRef {
    pub fn is_scalar(&self) -> bool {
        matches!(self, TileRef::Scalar(_))
    }

    /// Underlying buffer, if any.
    pub fn buffer(&self) -> Option<&Buffer> {
        match self {
            TileRef::WholeBuffer(buf) | TileRef::LocalLoad(buf) => Some(buf),
            TileRef::SubRegion(region) => Some(&region.buffer),
            TileRef::Scalar(_) => None,
        }
    }

    /// Shape of the referenced tile (region extents for sub-regions).
    pub fn shape(&self) -> Vec<usize> {
        match self {
            TileRef::WholeBuffer(buf) | TileRef::LocalLoad(buf) => buf.shape.clone(),
            TileRef::SubRegion(region) => region.extents(),
            TileRef::Scalar(_) => Vec::new(),
        }
    }

    /// Whether the operand covers its whole buffer.
    pub fn is_whole(&self) -> bool {
        matches!(self, TileRef::WholeBuffer(_) | TileRef::LocalLoad(_))
    }

    fn kind(&self) -> String {
        match self {
            TileRef::WholeBuffer(buf) if buf.is_sync_flag() => format!("sync flag '{}'", buf.name),
            TileRef::WholeBuffer(buf) => format!("buffer '{}'", buf.name),
            TileRef::SubRegion(region) => format!("region of '{}'", region.buffer.name),
            TileRef::LocalLoad(buf) => format!("load of {} buffer '{}'", buf.scope, buf.name),
            TileRef::Scalar(s) => format!("scalar {}", s),
        }
    }
}

impl From<Buffer> for TileRef {
    fn from(buf: Buffer) -> Self {
        TileRef::WholeBuffer(buf)
    }
}

impl From<&Buffer> for TileRef {
    fn from(buf: &Buffer) -> Self {
        TileRef::WholeBuffer(buf.clone())
    }
}

impl From<BufferRegion> for TileRef {
    fn from(region: BufferRegion) -> Self {
        TileRef::SubRegion(region)
    }
}

impl From<Scalar> for TileRef {
    fn from(scalar: Scalar) -> Self {
        TileRef::Scalar(scalar)
    }
}

impl From<f64> for TileRef {
    fn from(v: f64) -> Self {
        TileRef::Scalar(Scalar::Float(v))
    }
}

impl From<i64> for TileRef {
    fn from(v: i64) -> Self {
        TileRef::Scalar(Scalar::Int(v))
    }
}

/// Base pointer of a buffer advanced by an element offset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPtr {
    pub buffer: String,
    pub dtype: DType,
    pub space: AddressSpace,
    /// Element offset from the buffer base.
    pub offset: IndexExpr,
    /// Elements reachable from the pointer.
    pub extent: usize,
    /// Per-dimension `(min, extent)` of the accessed tile.
    pub ranges: Vec<(IndexExpr, usize)>,
    pub mode: AccessMode,
}

impl fmt::Display for AccessPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.offset.is_zero() {
            write!(f, "{}", self.buffer)
        } else {
            write!(f, "({} + {})", self.buffer, self.offset)
        }
    }
}

/// A resolved operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Ptr { ptr: AccessPtr, count: usize },
    Literal(Scalar),
}

impl Operand {
    pub fn count(&self) -> Option<usize> {
        match self {
            Operand::Ptr { count, .. } => Some(*count),
            Operand::Literal(_) => None,
        }
    }

    pub fn ptr(&self) -> Option<&AccessPtr> {
        match self {
            Operand::Ptr { ptr, .. } => Some(ptr),
            Operand::Literal(_) => None,
        }
    }
}

fn resolve_whole(buf: &Buffer, mode: AccessMode) -> (AccessPtr, usize) {
    let count = buf.num_elements();
    let ptr = AccessPtr {
        buffer: buf.name.clone(),
        dtype: buf.dtype,
        space: buf.space,
        offset: IndexExpr::Const(0),
        extent: count,
        ranges: buf.shape.iter().map(|&dim| (IndexExpr::Const(0), dim)).collect(),
        mode,
    };
    (ptr, count)
}

fn resolve_region(region: &BufferRegion, mode: AccessMode) -> (AccessPtr, usize) {
    let count = region.num_elements();
    let buf = &region.buffer;
    let ptr = AccessPtr {
        buffer: buf.name.clone(),
        dtype: buf.dtype,
        space: buf.space,
        offset: region.offset(),
        extent: count,
        ranges: region.ranges.clone(),
        mode,
    };
    (ptr, count)
}

/// Resolve a pointer operand into `(pointer, element count)`.
///
/// Scalars, sync flags and loads of non-local buffers are not pointer
/// operands and fail with `UnsupportedOperandKind`.
pub fn resolve(
    operation: &'static str,
    tile: &TileRef,
    mode: AccessMode,
) -> CodegenResult<(AccessPtr, usize)> {
    let unsupported = || CodegenError::UnsupportedOperandKind {
        operation,
        kind: tile.kind(),
    };
    match tile {
        TileRef::WholeBuffer(buf) if buf.is_sync_flag() => Err(unsupported()),
        TileRef::WholeBuffer(buf) => Ok(resolve_whole(buf, mode)),
        TileRef::SubRegion(region) if region.buffer.is_sync_flag() => Err(unsupported()),
        TileRef::SubRegion(region) => Ok(resolve_region(region, mode)),
        TileRef::LocalLoad(buf) if buf.scope == Scope::Local && !buf.is_sync_flag() => {
            Ok(resolve_whole(buf, mode))
        }
        TileRef::LocalLoad(_) | TileRef::Scalar(_) => Err(unsupported()),
    }
}

/// Resolve an operand that may also be a scalar literal.
pub fn resolve_operand(
    operation: &'static str,
    tile: &TileRef,
    mode: AccessMode,
) -> CodegenResult<Operand> {
    match tile {
        TileRef::Scalar(s) => Ok(Operand::Literal(s.clone())),
        _ => {
            let (ptr, count) = resolve(operation, tile, mode)?;
            Ok(Operand::Ptr { ptr, count })
        }
    }
}

/// Fail with `SizeMismatch` unless every element count is equal.
pub fn ensure_same_count(
    operation: &'static str,
    operands: &[(&'static str, &TileRef, usize)],
) -> CodegenResult<()> {
    let Some((_, _, first)) = operands.first() else {
        return Ok(());
    };
    if operands.iter().all(|(_, _, count)| count == first) {
        return Ok(());
    }
    Err(CodegenError::SizeMismatch {
        operation,
        operands: operands
            .iter()
            .map(|(name, tile, count)| (*name, tile.shape(), *count))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_whole_buffer() {
        let buf = Buffer::local("a", &[16, 16], DType::Float32).unwrap();
        let (ptr, count) = resolve("test", &TileRef::from(&buf), AccessMode::Read).unwrap();
        assert_eq!(count, 256);
        assert!(ptr.offset.is_zero());
        assert_eq!(ptr.mode, AccessMode::Read);
        assert_eq!(ptr.to_string(), "a");
    }

    #[test]
    fn test_resolve_region_folds_offset() {
        let buf = Buffer::global("A", &[1024, 1024], DType::Float32).unwrap();
        let region = buf.slice(&[128..256, 256..512]).unwrap();
        let (ptr, count) = resolve("test", &region.into(), AccessMode::Write).unwrap();
        assert_eq!(ptr.offset, IndexExpr::Const(131328));
        assert_eq!(count, 128 * 256);
        assert_eq!(ptr.to_string(), "(A + 131328)");
        assert!(ptr.mode.writes());
    }

    #[test]
    fn test_mode_does_not_change_arithmetic() {
        let buf = Buffer::global("A", &[64, 64], DType::Int16).unwrap();
        let region: TileRef = buf.slice(&[8..16, 0..64]).unwrap().into();
        let (r, rc) = resolve("test", &region, AccessMode::Read).unwrap();
        let (w, wc) = resolve("test", &region, AccessMode::ReadWrite).unwrap();
        assert_eq!(r.offset, w.offset);
        assert_eq!(rc, wc);
    }

    #[test]
    fn test_local_load_requires_local_scope() {
        let local = Buffer::local("v", &[32], DType::Float32).unwrap();
        assert!(resolve("test", &TileRef::LocalLoad(local), AccessMode::Read).is_ok());

        let global = Buffer::global("G", &[32], DType::Float32).unwrap();
        let err = resolve("test", &TileRef::LocalLoad(global), AccessMode::Read).unwrap_err();
        assert!(matches!(err, CodegenError::UnsupportedOperandKind { .. }));
    }

    #[test]
    fn test_scalar_is_not_a_pointer() {
        let err = resolve("fill", &TileRef::from(1.0), AccessMode::Read).unwrap_err();
        assert!(matches!(
            err,
            CodegenError::UnsupportedOperandKind { operation: "fill", .. }
        ));
        let op = resolve_operand("fill", &TileRef::from(2i64), AccessMode::Read).unwrap();
        assert_eq!(op, Operand::Literal(Scalar::Int(2)));
        assert_eq!(op.count(), None);
    }

    #[test]
    fn test_same_count_check() {
        let a: TileRef = Buffer::local("a", &[256], DType::Float32).unwrap().into();
        let b: TileRef = Buffer::local("b", &[16, 16], DType::Float32).unwrap().into();
        let c: TileRef = Buffer::local("c", &[128], DType::Float32).unwrap().into();
        assert!(ensure_same_count("add", &[("dst", &a, 256), ("src0", &b, 256)]).is_ok());
        let err = ensure_same_count("add", &[("dst", &a, 256), ("src1", &c, 128)]).unwrap_err();
        assert!(matches!(err, CodegenError::SizeMismatch { operation: "add", .. }));
    }

    #[test]
    fn test_scalar_rendering() {
        let idx = |e: &IndexExpr| e.to_string();
        assert_eq!(Scalar::Float(2.0).render(DType::Float32, &idx), "2.0f");
        assert_eq!(Scalar::Int(3).render(DType::Int32, &idx), "3");
        assert_eq!(Scalar::Int(3).render(DType::Float16, &idx), "(half)3");
        assert_eq!(
            Scalar::Index(IndexExpr::ComputeId).render(DType::Int32, &idx),
            "(int)(cid)"
        );
    }
}
