// This module defines the kernel-body contract the code generator consumes: a named kernel
// with HBM parameters, VMEM local allocations, sync flags, a compute-unit grid size, and an
// ordered list of statements. Statements are let-bindings of index arithmetic over the
// compute-unit id, tile-operation calls, DMA transfers, sync intrinsics, and barriers.
// KernelBuilder is how callers (tests, samples, and any upstream lowering) assemble a body.
// build() checks the contract before anything is emitted: at least one compute unit,
// unique buffer and variable names, every referenced buffer declared, every variable bound
// before use, and every pointer range inside its buffer, per dimension, for each
// compute-unit id in [0, num_units). A let whose value cannot be evaluated for some unit
// (division by zero, overflow) rejects the body.

//! Kernel bodies and their builder.

use std::collections::{HashMap, HashSet};

use crate::core::{Buffer, CodegenError, CodegenResult, DType, IndexExpr};

use super::dma::{self, DmaCall, SyncCall, SyncFlag, SyncKind};
use super::operand::{AccessPtr, Operand, Scalar};
use super::tile::TileCall;

/// One statement of a kernel body.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `int name = value;`
    Let { name: String, value: IndexExpr },
    Tile(TileCall),
    Dma(DmaCall),
    Sync(SyncCall),
    Barrier,
}

impl Stmt {
    fn pointers(&self) -> Vec<&AccessPtr> {
        match self {
            Stmt::Tile(call) => std::iter::once(&call.dst)
                .chain(call.srcs.iter().filter_map(Operand::ptr))
                .collect(),
            Stmt::Dma(call) => vec![&call.src, &call.dst],
            Stmt::Let { .. } | Stmt::Sync(_) | Stmt::Barrier => Vec::new(),
        }
    }

    fn flags(&self) -> Vec<&str> {
        match self {
            Stmt::Dma(call) => call.flags().collect(),
            Stmt::Sync(call) => vec![call.flag.as_str()],
            _ => Vec::new(),
        }
    }

    fn exprs(&self) -> Vec<&IndexExpr> {
        let mut exprs: Vec<&IndexExpr> = self.pointers().into_iter().map(|p| &p.offset).collect();
        match self {
            Stmt::Let { value, .. } => exprs.push(value),
            Stmt::Tile(call) => {
                for op in &call.srcs {
                    if let Operand::Literal(Scalar::Index(expr)) = op {
                        exprs.push(expr);
                    }
                }
            }
            Stmt::Sync(SyncCall {
                kind: SyncKind::WaitGte(threshold),
                ..
            }) => exprs.push(threshold),
            _ => {}
        }
        exprs
    }
}

/// A finalized kernel body.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBody {
    pub name: String,
    /// Kernel parameters, in HBM.
    pub params: Vec<Buffer>,
    /// Size of the compute-unit grid.
    pub num_units: usize,
    /// Local allocations, sync flags included.
    pub allocations: Vec<Buffer>,
    pub body: Vec<Stmt>,
}

impl KernelBody {
    /// Look up a parameter or allocation by name.
    pub fn buffer(&self, name: &str) -> Option<&Buffer> {
        self.params
            .iter()
            .chain(&self.allocations)
            .find(|buf| buf.name == name)
    }

    pub fn sync_flags(&self) -> impl Iterator<Item = &Buffer> {
        self.allocations.iter().filter(|buf| buf.is_sync_flag())
    }
}

/// Incrementally assembles a [`KernelBody`].
#[derive(Debug)]
pub struct KernelBuilder {
    name: String,
    num_units: usize,
    params: Vec<Buffer>,
    allocations: Vec<Buffer>,
    body: Vec<Stmt>,
}

impl KernelBuilder {
    pub fn new(name: impl Into<String>, num_units: usize) -> Self {
        Self {
            name: name.into(),
            num_units,
            params: Vec::new(),
            allocations: Vec::new(),
            body: Vec::new(),
        }
    }

    fn ensure_unique(&self, name: &str) -> CodegenResult<()> {
        let bound_by_let = self
            .body
            .iter()
            .any(|stmt| matches!(stmt, Stmt::Let { name: n, .. } if n == name));
        let declared = self
            .params
            .iter()
            .chain(&self.allocations)
            .any(|buf| buf.name == name);
        if declared || bound_by_let {
            return Err(CodegenError::InvalidKernel {
                reason: format!("name '{}' declared twice in kernel '{}'", name, self.name),
            });
        }
        Ok(())
    }

    /// Declare a kernel parameter in HBM.
    pub fn param(&mut self, name: &str, shape: &[usize], dtype: DType) -> CodegenResult<Buffer> {
        self.ensure_unique(name)?;
        let buf = Buffer::global(name, shape, dtype)?;
        self.params.push(buf.clone());
        Ok(buf)
    }

    /// Allocate a VMEM buffer local to each compute unit.
    pub fn alloc_local(
        &mut self,
        name: &str,
        shape: &[usize],
        dtype: DType,
    ) -> CodegenResult<Buffer> {
        self.ensure_unique(name)?;
        let buf = Buffer::local(name, shape, dtype)?;
        self.allocations.push(buf.clone());
        Ok(buf)
    }

    /// Allocate a single-counter sync flag.
    pub fn alloc_sync_flag(&mut self, name: &str) -> CodegenResult<SyncFlag> {
        self.ensure_unique(name)?;
        let flag = dma::alloc_sync_flag(name, 1)?;
        self.allocations.push(flag.buffer().clone());
        Ok(flag)
    }

    /// Bind `name` to `value` and return the variable.
    pub fn let_var(&mut self, name: &str, value: IndexExpr) -> CodegenResult<IndexExpr> {
        self.ensure_unique(name)?;
        self.body.push(Stmt::Let {
            name: name.to_string(),
            value,
        });
        Ok(IndexExpr::var(name))
    }

    pub fn tile(&mut self, call: TileCall) -> &mut Self {
        self.body.push(Stmt::Tile(call));
        self
    }

    pub fn dma(&mut self, call: DmaCall) -> &mut Self {
        self.body.push(Stmt::Dma(call));
        self
    }

    pub fn sync(&mut self, call: SyncCall) -> &mut Self {
        self.body.push(Stmt::Sync(call));
        self
    }

    pub fn barrier(&mut self) -> &mut Self {
        self.body.push(Stmt::Barrier);
        self
    }

    /// Validate and finish the body.
    pub fn build(self) -> CodegenResult<KernelBody> {
        let kernel = KernelBody {
            name: self.name,
            params: self.params,
            num_units: self.num_units,
            allocations: self.allocations,
            body: self.body,
        };
        validate(&kernel)?;
        Ok(kernel)
    }
}

fn invalid(kernel: &KernelBody, reason: String) -> CodegenError {
    CodegenError::InvalidKernel {
        reason: format!("{}: {}", kernel.name, reason),
    }
}

/// Check the kernel-body contract.
pub fn validate(kernel: &KernelBody) -> CodegenResult<()> {
    if kernel.num_units == 0 {
        return Err(invalid(kernel, "num_units must be at least 1".to_string()));
    }

    let mut names = HashSet::new();
    for buf in kernel.params.iter().chain(&kernel.allocations) {
        if !names.insert(buf.name.as_str()) {
            return Err(invalid(kernel, format!("buffer '{}' declared twice", buf.name)));
        }
    }

    let mut bound: HashSet<&str> = HashSet::new();
    for stmt in &kernel.body {
        for ptr in stmt.pointers() {
            if kernel.buffer(&ptr.buffer).is_none() {
                return Err(CodegenError::UnknownBuffer {
                    name: ptr.buffer.clone(),
                });
            }
        }
        for flag in stmt.flags() {
            if !kernel.buffer(flag).is_some_and(Buffer::is_sync_flag) {
                return Err(CodegenError::InvalidSyncFlag {
                    flag: flag.to_string(),
                });
            }
        }
        for expr in stmt.exprs() {
            if let Some(var) = unbound_var(expr, &bound) {
                return Err(invalid(kernel, format!("variable '{}' used before its let", var)));
            }
        }
        if let Stmt::Let { name, .. } = stmt {
            if names.contains(name.as_str()) || !bound.insert(name.as_str()) {
                return Err(invalid(kernel, format!("variable '{}' bound twice", name)));
            }
        }
    }

    check_offsets(kernel)
}

fn unbound_var<'a>(expr: &'a IndexExpr, bound: &HashSet<&str>) -> Option<&'a str> {
    match expr {
        IndexExpr::Var(name) if !bound.contains(name.as_str()) => Some(name.as_str()),
        IndexExpr::Const(_) | IndexExpr::ComputeId | IndexExpr::Var(_) => None,
        IndexExpr::Add(a, b)
        | IndexExpr::Sub(a, b)
        | IndexExpr::Mul(a, b)
        | IndexExpr::Div(a, b)
        | IndexExpr::Mod(a, b) => unbound_var(a, bound).or_else(|| unbound_var(b, bound)),
    }
}

fn out_of_bounds(buffer: &str, cid: i64, reason: String) -> CodegenError {
    CodegenError::RegionOutOfBounds {
        buffer: buffer.to_string(),
        reason: format!("compute unit {} {}", cid, reason),
    }
}

/// Evaluate every pointer range for each compute-unit id.
fn check_offsets(kernel: &KernelBody) -> CodegenResult<()> {
    for cid in 0..kernel.num_units as i64 {
        let mut env: HashMap<&str, i64> = HashMap::new();
        for stmt in &kernel.body {
            if let Stmt::Let { name, value } = stmt {
                let lookup = |n: &str| env.get(n).copied();
                let Some(v) = value.eval(cid, &lookup) else {
                    return Err(invalid(
                        kernel,
                        format!(
                            "'{}' = {} cannot be evaluated for compute unit {}",
                            name, value, cid
                        ),
                    ));
                };
                env.insert(name.as_str(), v);
                continue;
            }
            for ptr in stmt.pointers() {
                let Some(buf) = kernel.buffer(&ptr.buffer) else {
                    continue;
                };
                let lookup = |n: &str| env.get(n).copied();
                let dims = ptr.ranges.iter().zip(&buf.shape).enumerate();
                for (dim, ((min, extent), &size)) in dims {
                    let Some(start) = min.eval(cid, &lookup) else {
                        return Err(invalid(
                            kernel,
                            format!(
                                "origin {} of '{}' cannot be evaluated for compute unit {}",
                                min, ptr.buffer, cid
                            ),
                        ));
                    };
                    if start < 0 || start as usize + extent > size {
                        return Err(out_of_bounds(
                            &ptr.buffer,
                            cid,
                            format!(
                                "accesses [{}, {}) in dimension {} of size {}",
                                start,
                                start + *extent as i64,
                                dim,
                                size
                            ),
                        ));
                    }
                }
                let size = buf.num_elements();
                let Some(offset) = ptr.offset.eval(cid, &lookup) else {
                    return Err(invalid(
                        kernel,
                        format!(
                            "offset {} of '{}' cannot be evaluated for compute unit {}",
                            ptr.offset, ptr.buffer, cid
                        ),
                    ));
                };
                if offset < 0 || offset as usize + ptr.extent > size {
                    return Err(out_of_bounds(
                        &ptr.buffer,
                        cid,
                        format!(
                            "accesses [{}, {}) of {} elements",
                            offset,
                            offset + ptr.extent as i64,
                            size
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AddressSpace;
    use crate::dlc::dma::DmaOptions;
    use crate::dlc::tile;

    #[test]
    fn test_builder_declares_buffers() {
        let mut kb = KernelBuilder::new("k", 1);
        let a = kb.param("A", &[256], DType::Float32).unwrap();
        let v = kb.alloc_local("a", &[256], DType::Float32).unwrap();
        let f = kb.alloc_sync_flag("flag").unwrap();
        assert_eq!(a.space, AddressSpace::HighBandwidthMemory);
        assert_eq!(v.space, AddressSpace::VectorMemory);
        assert!(f.buffer().is_sync_flag());

        let kernel = kb.build().unwrap();
        assert_eq!(kernel.params.len(), 1);
        assert_eq!(kernel.allocations.len(), 2);
        assert_eq!(kernel.sync_flags().count(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut kb = KernelBuilder::new("k", 1);
        kb.param("A", &[4], DType::Float32).unwrap();
        assert!(matches!(
            kb.alloc_local("A", &[4], DType::Float32),
            Err(CodegenError::InvalidKernel { .. })
        ));
        kb.let_var("i", IndexExpr::ComputeId).unwrap();
        assert!(kb.alloc_sync_flag("i").is_err());
    }

    #[test]
    fn test_zero_units_rejected() {
        let kb = KernelBuilder::new("k", 0);
        assert!(matches!(kb.build(), Err(CodegenError::InvalidKernel { .. })));
    }

    #[test]
    fn test_unknown_buffer_rejected() {
        let mut kb = KernelBuilder::new("k", 1);
        let a = kb.alloc_local("a", &[16], DType::Float32).unwrap();
        let stray = Buffer::local("stray", &[16], DType::Float32).unwrap();
        kb.tile(tile::copy(&a, &stray).unwrap());
        assert_eq!(
            kb.build(),
            Err(CodegenError::UnknownBuffer {
                name: "stray".to_string()
            })
        );
    }

    #[test]
    fn test_foreign_flag_rejected() {
        let mut kb = KernelBuilder::new("k", 1);
        let src = kb.param("A", &[4], DType::Float32).unwrap();
        let dst = kb.alloc_local("a", &[4], DType::Float32).unwrap();
        let foreign = dma::alloc_sync_flag("elsewhere", 1).unwrap();
        let opts = DmaOptions::default().with_dst_flag(&foreign);
        kb.dma(
            dma::dma(
                &src,
                AddressSpace::HighBandwidthMemory,
                &dst,
                AddressSpace::VectorMemory,
                16,
                &opts,
            )
            .unwrap(),
        );
        assert!(matches!(
            kb.build(),
            Err(CodegenError::InvalidSyncFlag { .. })
        ));
    }

    #[test]
    fn test_per_unit_offsets_are_checked() {
        let mut kb = KernelBuilder::new("k", 5);
        let g = kb.param("G", &[4, 64], DType::Float32).unwrap();
        let t = kb.alloc_local("t", &[1, 64], DType::Float32).unwrap();
        let row = kb.let_var("row", IndexExpr::ComputeId).unwrap();
        let src = g.tile(&[row, IndexExpr::Const(0)], &[1, 64]).unwrap();
        kb.dma(
            dma::dma(
                src,
                AddressSpace::HighBandwidthMemory,
                &t,
                AddressSpace::VectorMemory,
                256,
                &DmaOptions::default(),
            )
            .unwrap(),
        );
        // unit 4 reads row 4 of a 4-row buffer
        assert!(matches!(
            kb.build(),
            Err(CodegenError::RegionOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_unbound_variable_rejected() {
        let mut kb = KernelBuilder::new("k", 1);
        let g = kb.param("G", &[4, 64], DType::Float32).unwrap();
        let t = kb.alloc_local("t", &[1, 64], DType::Float32).unwrap();
        let src = g
            .tile(&[IndexExpr::var("r"), IndexExpr::Const(0)], &[1, 64])
            .unwrap();
        kb.dma(
            dma::dma(
                src,
                AddressSpace::HighBandwidthMemory,
                &t,
                AddressSpace::VectorMemory,
                256,
                &DmaOptions::default(),
            )
            .unwrap(),
        );
        assert!(matches!(
            kb.build(),
            Err(CodegenError::InvalidKernel { .. })
        ));
    }

    /// DMA from `G` (shape [4, 64]) into a [1, 64] tile whose origin is `origin`.
    fn row_tile_kernel(
        num_units: usize,
        origin: impl Fn(&mut KernelBuilder) -> [IndexExpr; 2],
    ) -> CodegenResult<KernelBody> {
        let mut kb = KernelBuilder::new("k", num_units);
        let g = kb.param("G", &[4, 64], DType::Float32).unwrap();
        let t = kb.alloc_local("t", &[1, 64], DType::Float32).unwrap();
        let origin = origin(&mut kb);
        let src = g.tile(&origin, &[1, 64]).unwrap();
        kb.dma(
            dma::dma(
                src,
                AddressSpace::HighBandwidthMemory,
                &t,
                AddressSpace::VectorMemory,
                256,
                &DmaOptions::default(),
            )
            .unwrap(),
        );
        kb.build()
    }

    #[test]
    fn test_symbolic_origin_checked_per_dimension() {
        // unit 1 covers columns 32..96 of a 64-column row; the flat range stays in bounds
        let result = row_tile_kernel(2, |kb| {
            let col = kb.let_var("col", IndexExpr::ComputeId * 32i64).unwrap();
            [IndexExpr::Const(0), col]
        });
        match result {
            Err(CodegenError::RegionOutOfBounds { buffer, reason }) => {
                assert_eq!(buffer, "G");
                assert!(reason.contains("compute unit 1"), "{}", reason);
                assert!(reason.contains("dimension 1"), "{}", reason);
            }
            other => panic!("expected RegionOutOfBounds, got {:?}", other),
        }

        let ok = row_tile_kernel(4, |kb| {
            let row = kb.let_var("row", IndexExpr::ComputeId).unwrap();
            [row, IndexExpr::Const(0)]
        });
        assert!(ok.is_ok());
    }

    #[test]
    fn test_unevaluable_let_rejected() {
        let result = row_tile_kernel(2, |kb| {
            let row = kb
                .let_var("row", IndexExpr::ComputeId / (IndexExpr::ComputeId - 1i64))
                .unwrap();
            [row, IndexExpr::Const(0)]
        });
        match result {
            Err(CodegenError::InvalidKernel { reason }) => {
                assert!(reason.contains("'row'"), "{}", reason);
                assert!(reason.contains("compute unit 1"), "{}", reason);
            }
            other => panic!("expected InvalidKernel, got {:?}", other),
        }
    }
}
