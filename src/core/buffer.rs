// This module defines buffer declarations and rectangular views into them. A Buffer is a
// named, typed, row-major allocation that lives in one DLC address space; kernel
// parameters live in HBM, locals in VMEM, and sync flags are local int32 buffers that
// the code generator moves into SEMAPHORE space. BufferRegion is a per-dimension
// (offset, extent) view whose flat element offset is the dot product of the per-dimension
// minimums with the buffer's row-major stride vector, and whose element count is the
// product of its extents. Region construction validates rank and bounds so that no
// out-of-range view ever reaches the operand resolver.

//! Buffers and buffer regions.

use std::fmt;

use super::address_space::AddressSpace;
use super::dtype::DType;
use super::error::{CodegenError, CodegenResult};
use super::expr::IndexExpr;

/// Scope tag of a buffer as declared by the upstream lowering.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Device-wide memory, i.e. a kernel parameter.
    Global,
    /// Per-compute-unit scratch memory.
    Local,
    /// A named device region.
    Named(String),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Local => f.write_str("local"),
            Scope::Named(name) => f.write_str(name),
        }
    }
}

/// What a buffer is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    Data,
    SyncFlag,
}

/// A named, typed, shaped allocation in one address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    pub space: AddressSpace,
    pub scope: Scope,
    pub role: BufferRole,
}

impl Buffer {
    /// Create a data buffer. Every extent must be positive.
    pub fn new(
        name: impl Into<String>,
        shape: &[usize],
        dtype: DType,
        space: AddressSpace,
        scope: Scope,
    ) -> CodegenResult<Self> {
        let name = name.into();
        if shape.is_empty() || shape.contains(&0) {
            return Err(CodegenError::InvalidKernel {
                reason: format!("buffer '{}' has invalid shape {:?}", name, shape),
            });
        }
        Ok(Self {
            name,
            dtype,
            shape: shape.to_vec(),
            space,
            scope,
            role: BufferRole::Data,
        })
    }

    /// A kernel parameter in HBM.
    pub fn global(name: impl Into<String>, shape: &[usize], dtype: DType) -> CodegenResult<Self> {
        Self::new(name, shape, dtype, AddressSpace::HighBandwidthMemory, Scope::Global)
    }

    /// A compute-unit local buffer in VMEM.
    pub fn local(name: impl Into<String>, shape: &[usize], dtype: DType) -> CodegenResult<Self> {
        Self::new(name, shape, dtype, AddressSpace::VectorMemory, Scope::Local)
    }

    pub fn is_sync_flag(&self) -> bool {
        self.role == BufferRole::SyncFlag
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn size_bytes(&self) -> usize {
        self.num_elements() * self.dtype.bytes()
    }

    /// Row-major stride (in elements) of each dimension.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for dim in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[dim] = strides[dim + 1] * self.shape[dim + 1];
        }
        strides
    }

    /// Flat element offset of a multi-dimensional index.
    pub fn offset_of(&self, indices: &[IndexExpr]) -> CodegenResult<IndexExpr> {
        if indices.len() != self.ndim() {
            return Err(CodegenError::RegionOutOfBounds {
                buffer: self.name.clone(),
                reason: format!(
                    "index has {} dimensions, buffer has {}",
                    indices.len(),
                    self.ndim()
                ),
            });
        }
        Ok(indices
            .iter()
            .zip(self.strides())
            .fold(IndexExpr::Const(0), |acc, (idx, stride)| {
                acc + idx * (stride as i64)
            }))
    }

    /// View `[min, min + extent)` in every dimension.
    pub fn region(&self, ranges: &[(IndexExpr, usize)]) -> CodegenResult<BufferRegion> {
        BufferRegion::new(self.clone(), ranges.to_vec())
    }

    /// View of constant half-open ranges, e.g. `[128..256, 256..512]`.
    pub fn slice(&self, ranges: &[std::ops::Range<usize>]) -> CodegenResult<BufferRegion> {
        let ranges: Vec<_> = ranges
            .iter()
            .map(|r| (IndexExpr::from(r.start), r.end.saturating_sub(r.start)))
            .collect();
        self.region(&ranges)
    }

    /// Tile of shape `extents` whose origin is `origin`.
    pub fn tile(&self, origin: &[IndexExpr], extents: &[usize]) -> CodegenResult<BufferRegion> {
        if origin.len() != extents.len() {
            return Err(CodegenError::RegionOutOfBounds {
                buffer: self.name.clone(),
                reason: format!(
                    "origin has {} dimensions but extents have {}",
                    origin.len(),
                    extents.len()
                ),
            });
        }
        let ranges: Vec<_> = origin.iter().cloned().zip(extents.iter().copied()).collect();
        self.region(&ranges)
    }
}

/// A rectangular sub-region of a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BufferRegion {
    pub buffer: Buffer,
    /// Per-dimension `(min, extent)`.
    pub ranges: Vec<(IndexExpr, usize)>,
}

impl BufferRegion {
    pub fn new(buffer: Buffer, ranges: Vec<(IndexExpr, usize)>) -> CodegenResult<Self> {
        if ranges.len() != buffer.ndim() {
            return Err(CodegenError::RegionOutOfBounds {
                buffer: buffer.name.clone(),
                reason: format!(
                    "region has {} dimensions, buffer has {}",
                    ranges.len(),
                    buffer.ndim()
                ),
            });
        }
        for (dim, ((min, extent), &size)) in ranges.iter().zip(&buffer.shape).enumerate() {
            if *extent == 0 || *extent > size {
                return Err(CodegenError::RegionOutOfBounds {
                    buffer: buffer.name.clone(),
                    reason: format!("extent {} in dimension {} exceeds {}", extent, dim, size),
                });
            }
            if let Some(start) = min.as_const() {
                if start < 0 || start as usize + extent > size {
                    return Err(CodegenError::RegionOutOfBounds {
                        buffer: buffer.name.clone(),
                        reason: format!(
                            "range [{}, {}) in dimension {} exceeds {}",
                            start,
                            start as usize + extent,
                            dim,
                            size
                        ),
                    });
                }
            }
        }
        Ok(Self { buffer, ranges })
    }

    /// Flat element offset of the region origin.
    pub fn offset(&self) -> IndexExpr {
        self.ranges
            .iter()
            .zip(self.buffer.strides())
            .fold(IndexExpr::Const(0), |acc, ((min, _), stride)| {
                acc + min * (stride as i64)
            })
    }

    pub fn extents(&self) -> Vec<usize> {
        self.ranges.iter().map(|(_, extent)| *extent).collect()
    }

    /// Number of elements covered by the region.
    pub fn num_elements(&self) -> usize {
        self.ranges.iter().map(|(_, extent)| extent).product()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> Buffer {
        Buffer::global("A", &[1024, 1024], DType::Float32).unwrap()
    }

    #[test]
    fn test_strides_row_major() {
        let buf = Buffer::global("T", &[2, 3, 4], DType::Int8).unwrap();
        assert_eq!(buf.strides(), vec![12, 4, 1]);
        assert_eq!(buf.num_elements(), 24);
        assert_eq!(buf.size_bytes(), 24);
    }

    #[test]
    fn test_region_offset_linearization() {
        let region = matrix().slice(&[128..256, 256..512]).unwrap();
        assert_eq!(region.offset(), IndexExpr::Const(128 * 1024 + 256));
        assert_eq!(region.offset(), IndexExpr::Const(131328));
        assert_eq!(region.num_elements(), 128 * 256);
    }

    #[test]
    fn test_symbolic_tile_offset() {
        let bx = IndexExpr::ComputeId / 4i64;
        let by = IndexExpr::ComputeId % 4i64;
        let tile = matrix()
            .tile(&[bx * 128i64, by * 256i64], &[128, 256])
            .unwrap();
        let lookup = |_: &str| None;
        // cid 5 -> block (1, 1)
        assert_eq!(tile.offset().eval(5, &lookup), Some(128 * 1024 + 256));
    }

    #[test]
    fn test_region_bounds_are_checked() {
        assert!(matches!(
            matrix().slice(&[0..2048, 0..4]),
            Err(CodegenError::RegionOutOfBounds { .. })
        ));
        assert!(matches!(
            matrix().slice(&[1000..1100, 0..4]),
            Err(CodegenError::RegionOutOfBounds { .. })
        ));
        assert!(matches!(
            matrix().slice(&[0..4]),
            Err(CodegenError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_invalid_shape_rejected() {
        assert!(Buffer::local("x", &[0, 4], DType::Float32).is_err());
        assert!(Buffer::local("x", &[], DType::Float32).is_err());
    }
}
