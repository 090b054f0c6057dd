// This module implements the DLC C source generator. It walks a validated KernelBody and
// prints one translation unit: a banner, the three fixed DLC headers, the template headers
// the kernels actually use, and one function per kernel. Kernel parameters are HBM
// pointers followed by a trailing int compute-unit id; local buffers are declared with
// VMEM_SPACE and sync flags (recognised by their role, never by their name) with
// SEMAPHORE_SPACE. Tile operations print as a single call into their compute template,
// DMA transfers as dlc_dma_new with NULL_SEMAPHORE for absent flags, and waits as the
// dlc_sync_* intrinsics. Every identifier goes through the session name supply so
// upstream names cannot collide with C keywords or header intrinsics. The sync-flag
// protocol is checked while walking the body; under the strict policy a violation aborts
// the kernel and no source is returned.

//! Kernel body to DLC C source.

use std::collections::{BTreeSet, HashMap};
use std::fmt::Write;

use bumpalo::Bump;

use crate::core::{AddressSpace, Buffer, CodegenResult, CodegenSession, DType, IndexExpr};
use crate::templates::TEMPLATE_HEADERS;

use super::dma::{DmaCall, FlagPolicy, SyncCall, SyncKind, SyncTracker};
use super::kernel::{self, KernelBody, Stmt};
use super::operand::{AccessPtr, Operand};
use super::tile::TileCall;

/// Headers every DLC translation unit includes.
pub const FIXED_HEADERS: [&str; 3] = ["typehint.h", "ldst.h", "kernel_arg_types.h"];

/// Transfer unit length passed to every DMA.
pub const DEFAULT_UNIT_LEN: usize = 128;

/// Options for source generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenOptions {
    /// Prepended to every kernel function name.
    pub name_prefix: String,
    /// Name of the trailing compute-unit id parameter.
    pub compute_id_name: String,
    pub flag_policy: FlagPolicy,
    pub unit_len: usize,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            name_prefix: String::new(),
            compute_id_name: "cid".to_string(),
            flag_policy: FlagPolicy::Strict,
            unit_len: DEFAULT_UNIT_LEN,
        }
    }
}

/// C source generator for DLC kernels.
pub struct DlcCodegen<'s, 'arena> {
    session: &'s CodegenSession<'arena>,
    options: CodegenOptions,
}

/// Source of one kernel function plus the template headers it needs.
struct EmittedKernel {
    text: String,
    headers: BTreeSet<usize>,
}

/// Per-kernel identifier mapping.
struct Names<'arena> {
    buffers: HashMap<String, &'arena str>,
    vars: HashMap<String, &'arena str>,
    cid: &'arena str,
}

impl<'arena> Names<'arena> {
    fn buffer<'a>(&'a self, name: &'a str) -> &'a str {
        self.buffers.get(name).copied().unwrap_or(name)
    }

    fn expr(&self, expr: &IndexExpr) -> String {
        expr.render(self.cid, &|name: &str| {
            self.vars.get(name).copied().unwrap_or(name).to_string()
        })
    }

    /// `name` or `name + offset`.
    fn ptr(&self, ptr: &AccessPtr) -> String {
        if ptr.offset.is_zero() {
            self.buffer(&ptr.buffer).to_string()
        } else {
            format!("{} + {}", self.buffer(&ptr.buffer), self.expr(&ptr.offset))
        }
    }

    /// Pointer argument cast to the template element type.
    fn typed_ptr(&self, ptr: &AccessPtr, dtype: DType) -> String {
        let qualifier = if ptr.mode.writes() { "" } else { "const " };
        if ptr.offset.is_zero() {
            format!("({}{} *){}", qualifier, dtype.c_type(), self.ptr(ptr))
        } else {
            format!("({}{} *)({})", qualifier, dtype.c_type(), self.ptr(ptr))
        }
    }
}

impl<'s, 'arena> DlcCodegen<'s, 'arena> {
    pub fn new(session: &'s CodegenSession<'arena>, options: CodegenOptions) -> Self {
        Self { session, options }
    }

    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Emit a full translation unit for one kernel.
    pub fn emit(&self, kernel: &KernelBody) -> CodegenResult<String> {
        self.emit_module(std::slice::from_ref(kernel))
    }

    /// Emit a translation unit holding every kernel, headers included once.
    pub fn emit_module(&self, kernels: &[KernelBody]) -> CodegenResult<String> {
        let mut functions = Vec::with_capacity(kernels.len());
        let mut headers = BTreeSet::new();
        for kernel in kernels {
            let emitted = self.emit_kernel(kernel)?;
            headers.extend(emitted.headers);
            functions.push(emitted.text);
        }

        let mut out = String::new();
        out.push_str("// DLC kernel source generated by dlc-backend\n");
        out.push_str("// Compile with: clang -target dlc -c <file>.c\n\n");
        for header in FIXED_HEADERS {
            let _ = writeln!(out, "#include \"{}\"", header);
        }
        for idx in headers {
            let _ = writeln!(out, "#include \"{}\"", TEMPLATE_HEADERS[idx]);
        }
        for function in functions {
            out.push('\n');
            out.push_str(&function);
        }
        Ok(out)
    }

    fn emit_kernel(&self, kernel: &KernelBody) -> CodegenResult<EmittedKernel> {
        kernel::validate(kernel)?;
        log::debug!(
            "Emitting kernel '{}' ({} statements, {} compute units)",
            kernel.name,
            kernel.body.len(),
            kernel.num_units
        );

        let session = self.session;
        let fn_name = session.begin_kernel(&format!("{}{}", self.options.name_prefix, kernel.name));
        let mut names = Names {
            buffers: HashMap::new(),
            vars: HashMap::new(),
            cid: "",
        };

        let mut params = Vec::new();
        for param in &kernel.params {
            let ident = session.fresh_name(&param.name);
            names.buffers.insert(param.name.clone(), ident);
            params.push(format!("{}* {}", param.dtype.c_type(), ident));
        }
        names.cid = session.fresh_name(&self.options.compute_id_name);
        params.push(format!("int {}", names.cid));

        let mut text = String::new();
        let _ = writeln!(text, "void {}({}) {{", fn_name, params.join(", "));
        let _ = writeln!(text, "  // compute units: {}", kernel.num_units);

        let mut tracker = SyncTracker::new(self.options.flag_policy);
        for buf in &kernel.allocations {
            let ident = session.fresh_name(&buf.name);
            names.buffers.insert(buf.name.clone(), ident);
            let _ = writeln!(text, "  {}", declare_local(buf, ident));
            if buf.is_sync_flag() {
                tracker.declare(&buf.name);
            }
        }

        let mut headers = BTreeSet::new();
        for stmt in &kernel.body {
            let line = match stmt {
                Stmt::Let { name, value } => {
                    let ident = session.fresh_name(name);
                    let line = format!("int {} = {};", ident, names.expr(value));
                    names.vars.insert(name.clone(), ident);
                    line
                }
                Stmt::Tile(call) => {
                    if let Some(idx) = TEMPLATE_HEADERS
                        .iter()
                        .position(|h| *h == call.template.family.header())
                    {
                        headers.insert(idx);
                    }
                    session.record_template_call(call.template.family.name(), call.template.tag);
                    self.tile_call(call, &names)
                }
                Stmt::Dma(call) => {
                    for flag in call.flags() {
                        tracker.on_dma(flag)?;
                    }
                    session.record_dma();
                    self.dma_call(call, &names)
                }
                Stmt::Sync(call) => {
                    tracker.on_sync(call)?;
                    session.record_sync();
                    sync_call(call, &names)
                }
                Stmt::Barrier => {
                    session.record_barrier();
                    "barrier();".to_string()
                }
            };
            log::trace!("  {}", line);
            let _ = writeln!(text, "  {}", line);
        }
        tracker.finish()?;

        text.push_str("}\n");
        session.record_kernel_emitted(text.len());
        Ok(EmittedKernel { text, headers })
    }

    fn tile_call(&self, call: &TileCall, names: &Names<'_>) -> String {
        let dtype = call.dtype();
        let mut args = vec![names.typed_ptr(&call.dst, dtype)];
        for src in &call.srcs {
            args.push(match src {
                Operand::Ptr { ptr, .. } => names.typed_ptr(ptr, dtype),
                Operand::Literal(value) => value.render(dtype, &|e: &IndexExpr| names.expr(e)),
            });
        }
        args.push(call.count.to_string());
        format!("{}({});", call.template.callee(), args.join(", "))
    }

    fn dma_call(&self, call: &DmaCall, names: &Names<'_>) -> String {
        let flag = |flag: &Option<String>| match flag {
            Some(name) => names.buffer(name).to_string(),
            None => "NULL_SEMAPHORE".to_string(),
        };
        format!(
            "dlc_dma_new({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {});",
            names.ptr(&call.src),
            call.src_space.c_name(),
            names.ptr(&call.dst),
            call.dst_space.c_name(),
            call.size_bytes,
            call.src_stride,
            call.dst_stride,
            flag(&call.src_flag),
            flag(&call.dst_flag),
            self.options.unit_len,
            call.addr_unit_shift()
        )
    }
}

fn declare_local(buf: &Buffer, ident: &str) -> String {
    let space = if buf.is_sync_flag() {
        AddressSpace::SemaphoreSpace
    } else {
        buf.space
    };
    match space.storage_qualifier() {
        Some(qualifier) => format!(
            "{} {} {}[{}];",
            buf.dtype.c_type(),
            qualifier,
            ident,
            buf.num_elements()
        ),
        None => format!("{} {}[{}];", buf.dtype.c_type(), ident, buf.num_elements()),
    }
}

fn sync_call(call: &SyncCall, names: &Names<'_>) -> String {
    let flag = names.buffer(&call.flag);
    match &call.kind {
        SyncKind::WaitGte(threshold) => format!(
            "{}({}, {});",
            call.kind.intrinsic(),
            flag,
            names.expr(threshold)
        ),
        _ => format!("{}({});", call.kind.intrinsic(), flag),
    }
}

/// Emit `kernel` with a throwaway session and default options.
pub fn generate_source(kernel: &KernelBody) -> CodegenResult<String> {
    let arena = Bump::new();
    let session = CodegenSession::new(&arena);
    DlcCodegen::new(&session, CodegenOptions::default()).emit(kernel)
}
