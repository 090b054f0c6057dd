// This module provides arena-based code generation session management using the bumpalo
// crate. CodegenSession owns the arena allocator and the state that outlives a single
// kernel: interned strings, the C identifier supply, and emission statistics. Kernel
// function names are unique across the whole translation unit; parameter, local, and
// sync-flag names are unique within the kernel currently being emitted and are released
// when the next kernel begins. Identifiers coming from upstream buffer names are sanitised
// into valid C identifiers and never collide with C keywords or with the intrinsic and
// macro names the DLC headers declare. SessionStats counts emitted kernels, template calls
// per family and tag, DMA transfers, sync intrinsics, and barriers.

//! Arena-based code generation session.
//!
//! All names handed out by the session are allocated in the arena and share
//! the session lifetime.

use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Identifiers the generated source must not redefine.
const RESERVED: &[&str] = &[
    "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
    "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
    "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch",
    "typedef", "union", "unsigned", "void", "volatile", "while", "half", "bfloat16_t",
    "int8_t", "uint8_t", "int16_t", "uint16_t", "uint32_t", "int64_t", "uint64_t", "SMEM",
    "HBM", "VMEM", "CMEM", "IMEM", "SEMAPHORE", "VMEM_SPACE", "SEMAPHORE_SPACE",
    "NULL_SEMAPHORE", "dlc_dma_new", "dlc_sync_new", "dlc_sync_done_new", "dlc_sync_gte_new",
    "dlc_sync_clear_new", "barrier",
];

/// Turn an arbitrary name into a C identifier that is not reserved.
pub fn sanitize_identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if ident.is_empty() {
        ident.push('v');
    }
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    if RESERVED.contains(&ident.as_str()) {
        ident.push('_');
    }
    ident
}

/// Arena-based code generation session.
pub struct CodegenSession<'arena> {
    /// Arena allocator for session objects.
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,

    /// String interning for efficient storage.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Kernel function names used in this translation unit.
    global_names: RefCell<HashSet<&'arena str>>,

    /// Names used inside the kernel being emitted.
    local_names: RefCell<HashSet<&'arena str>>,

    /// Kernel currently being emitted.
    current_kernel: RefCell<Option<&'arena str>>,
}

impl<'arena> CodegenSession<'arena> {
    /// Create a new session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            global_names: RefCell::new(HashSet::new()),
            local_names: RefCell::new(HashSet::new()),
            current_kernel: RefCell::new(None),
        }
    }

    /// Get access to the arena allocator.
    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Allocate an object in the session arena.
    pub fn alloc<T>(&self, value: T) -> &'arena mut T {
        self.arena.alloc(value)
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    fn unique_in(&self, set: &RefCell<HashSet<&'arena str>>, hint: &str) -> &'arena str {
        let base = sanitize_identifier(hint);
        let globals = self.global_names.borrow();
        let taken = |candidate: &str| {
            set.borrow().contains(candidate) || globals.contains(candidate)
        };
        let mut candidate = base.clone();
        let mut suffix = 1;
        while taken(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        drop(globals);
        let name = self.intern_str(&candidate);
        set.borrow_mut().insert(name);
        name
    }

    /// Start a new kernel: reserve its function name and release local names.
    pub fn begin_kernel(&self, name: &str) -> &'arena str {
        self.local_names.borrow_mut().clear();
        let empty = RefCell::new(HashSet::new());
        let unique = self.unique_in(&empty, name);
        self.global_names.borrow_mut().insert(unique);
        *self.current_kernel.borrow_mut() = Some(unique);
        log::debug!("Begin kernel '{}' as '{}'", name, unique);
        unique
    }

    /// A fresh identifier within the current kernel.
    pub fn fresh_name(&self, hint: &str) -> &'arena str {
        self.unique_in(&self.local_names, hint)
    }

    pub fn current_kernel(&self) -> Option<&'arena str> {
        *self.current_kernel.borrow()
    }

    /// Finish the current kernel.
    pub fn record_kernel_emitted(&self, source_len: usize) {
        let name = self.current_kernel.borrow_mut().take();
        let mut stats = self.stats.borrow_mut();
        stats.kernels_emitted += 1;
        stats.total_source_bytes += source_len;

        if let Some(name) = name {
            if stats.largest_kernel_size < source_len {
                stats.largest_kernel_size = source_len;
                stats.largest_kernel_name = name.to_string();
            }
        }
    }

    /// Record a template call site.
    pub fn record_template_call(&self, family: &str, tag: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.template_calls += 1;
        *stats
            .template_counts
            .entry(format!("{}<{}>", family, tag))
            .or_insert(0) += 1;
    }

    pub fn record_dma(&self) {
        self.stats.borrow_mut().dma_transfers += 1;
    }

    pub fn record_sync(&self) {
        self.stats.borrow_mut().sync_ops += 1;
    }

    pub fn record_barrier(&self) {
        self.stats.borrow_mut().barriers += 1;
    }

    /// Get session statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Code generation statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of kernel functions emitted.
    pub kernels_emitted: usize,

    /// Total bytes of kernel source produced.
    pub total_source_bytes: usize,

    /// Number of template call sites.
    pub template_calls: usize,

    /// Call sites per `family<TAG>`.
    pub template_counts: HashMap<String, usize>,

    pub dma_transfers: usize,

    pub sync_ops: usize,

    pub barriers: usize,

    /// Largest kernel emitted.
    pub largest_kernel_size: usize,

    pub largest_kernel_name: String,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Code Generation Statistics:")?;
        writeln!(f, "  Kernels emitted: {}", self.kernels_emitted)?;
        writeln!(f, "  Source size: {} bytes", self.total_source_bytes)?;
        writeln!(f, "  Template calls: {}", self.template_calls)?;
        writeln!(f, "  DMA transfers: {}", self.dma_transfers)?;
        writeln!(f, "  Sync operations: {}", self.sync_ops)?;
        writeln!(f, "  Barriers: {}", self.barriers)?;

        if !self.largest_kernel_name.is_empty() {
            writeln!(
                f,
                "  Largest kernel: {} ({} bytes)",
                self.largest_kernel_name, self.largest_kernel_size
            )?;
        }

        if !self.template_counts.is_empty() {
            writeln!(f, "  Template breakdown:")?;
            let mut sorted: Vec<_> = self.template_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (template, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", template, count)?;
            }
        }

        Ok(())
    }
}
