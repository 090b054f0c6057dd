// Reference kernels built through the public builder API. vector_add is the single-unit
// end-to-end kernel: two HBM vectors are staged into VMEM under one sync flag, drained
// with the two-step sync_done/sync_clear protocol, added with one template call, and the
// result is written back and waited on with a single-step sync. dma_copy and tiled_add
// split an (m, n) matrix into (bm, bn) tiles, one per compute unit, and derive the tile
// origin from the compute-unit id with let-bound row and column indices.

//! Sample kernels used by the `dlcc demo` command and the tests.

use crate::core::{AddressSpace, CodegenError, CodegenResult, DType, IndexExpr};

use super::dma::{self, DmaOptions};
use super::kernel::{KernelBody, KernelBuilder};
use super::tile;

const HBM: AddressSpace = AddressSpace::HighBandwidthMemory;
const VMEM: AddressSpace = AddressSpace::VectorMemory;

/// `C = A + B` over `n` float32 elements on one compute unit.
pub fn vector_add(n: usize) -> CodegenResult<KernelBody> {
    let bytes = n * DType::Float32.bytes();
    let mut kb = KernelBuilder::new("vector_add", 1);
    let a_hbm = kb.param("A", &[n], DType::Float32)?;
    let b_hbm = kb.param("B", &[n], DType::Float32)?;
    let c_hbm = kb.param("C", &[n], DType::Float32)?;
    let a = kb.alloc_local("vmem_a", &[n], DType::Float32)?;
    let b = kb.alloc_local("vmem_b", &[n], DType::Float32)?;
    let c = kb.alloc_local("vmem_c", &[n], DType::Float32)?;
    let flag = kb.alloc_sync_flag("sync_flag")?;
    let load = DmaOptions::default().with_dst_flag(&flag);

    kb.dma(dma::dma(&a_hbm, HBM, &a, VMEM, bytes, &load)?);
    kb.dma(dma::dma(&b_hbm, HBM, &b, VMEM, bytes, &load)?);
    kb.sync(dma::sync_done(&flag));
    kb.sync(dma::sync_clear(&flag));
    kb.tile(tile::add(&c, &a, &b)?);
    kb.dma(dma::dma(&c, VMEM, &c_hbm, HBM, bytes, &load)?);
    kb.sync(dma::sync(&flag));
    kb.build()
}

fn grid(m: usize, n: usize, bm: usize, bn: usize) -> CodegenResult<(usize, usize)> {
    if bm == 0 || bn == 0 || m % bm != 0 || n % bn != 0 {
        return Err(CodegenError::InvalidKernel {
            reason: format!("{}x{} does not tile a {}x{} matrix", bm, bn, m, n),
        });
    }
    Ok((m / bm, n / bn))
}

/// Copy an `m x n` matrix `A` to `B` through VMEM, one `bm x bn` tile per unit.
pub fn dma_copy(m: usize, n: usize, bm: usize, bn: usize) -> CodegenResult<KernelBody> {
    let (rows, cols) = grid(m, n, bm, bn)?;
    let bytes = bm * bn * DType::Float32.bytes();
    let mut kb = KernelBuilder::new("dma_copy", rows * cols);
    let a_hbm = kb.param("A", &[m, n], DType::Float32)?;
    let b_hbm = kb.param("B", &[m, n], DType::Float32)?;
    let bx = kb.let_var("bx", IndexExpr::ComputeId / cols)?;
    let by = kb.let_var("by", IndexExpr::ComputeId % cols)?;
    let staging = kb.alloc_local("vmem_buf", &[bm, bn], DType::Float32)?;
    let flag = kb.alloc_sync_flag("sync_flag")?;

    let origin = [bx * bm, by * bn];
    let src = a_hbm.tile(&origin, &[bm, bn])?;
    let dst = b_hbm.tile(&origin, &[bm, bn])?;

    kb.dma(dma::dma(
        src,
        HBM,
        &staging,
        VMEM,
        bytes,
        &DmaOptions::default().with_src_flag(&flag),
    )?);
    kb.sync(dma::sync_done(&flag));
    kb.sync(dma::sync_clear(&flag));
    kb.dma(dma::dma(
        &staging,
        VMEM,
        dst,
        HBM,
        bytes,
        &DmaOptions::default().with_dst_flag(&flag),
    )?);
    kb.sync(dma::sync(&flag));
    kb.build()
}

/// `C = A + B` over `m x n` matrices, one `bm x bn` tile per unit.
pub fn tiled_add(m: usize, n: usize, bm: usize, bn: usize) -> CodegenResult<KernelBody> {
    let (rows, cols) = grid(m, n, bm, bn)?;
    let bytes = bm * bn * DType::Float32.bytes();
    let mut kb = KernelBuilder::new("tiled_add", rows * cols);
    let a_hbm = kb.param("A", &[m, n], DType::Float32)?;
    let b_hbm = kb.param("B", &[m, n], DType::Float32)?;
    let c_hbm = kb.param("C", &[m, n], DType::Float32)?;
    let bx = kb.let_var("bx", IndexExpr::ComputeId / cols)?;
    let by = kb.let_var("by", IndexExpr::ComputeId % cols)?;
    let a = kb.alloc_local("vmem_a", &[bm, bn], DType::Float32)?;
    let b = kb.alloc_local("vmem_b", &[bm, bn], DType::Float32)?;
    let c = kb.alloc_local("vmem_c", &[bm, bn], DType::Float32)?;
    let load_flag = kb.alloc_sync_flag("load_flag")?;
    let store_flag = kb.alloc_sync_flag("store_flag")?;

    let origin = [bx * bm, by * bn];
    let load = DmaOptions::default().with_dst_flag(&load_flag);
    kb.dma(dma::dma(a_hbm.tile(&origin, &[bm, bn])?, HBM, &a, VMEM, bytes, &load)?);
    kb.dma(dma::dma(b_hbm.tile(&origin, &[bm, bn])?, HBM, &b, VMEM, bytes, &load)?);
    kb.sync(dma::sync_gte(&load_flag, 2i64));
    kb.sync(dma::sync_clear(&load_flag));
    kb.tile(tile::add(&c, &a, &b)?);
    kb.dma(dma::dma(
        &c,
        VMEM,
        c_hbm.tile(&origin, &[bm, bn])?,
        HBM,
        bytes,
        &DmaOptions::default().with_dst_flag(&store_flag),
    )?);
    kb.sync(dma::sync(&store_flag));
    kb.build()
}
