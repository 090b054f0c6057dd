// This module is the hub for the target-independent data model of the DLC backend: element
// types and their C spellings, the address-space enumeration, buffers and buffer regions,
// index arithmetic over the compute-unit id, the code generation error type, and the
// arena-based session that owns identifier supply and statistics. Nothing in here knows
// about templates, DMA intrinsics, or the external compiler; those live in the dlc and
// toolchain modules and build on these types.

//! Core data model shared by the code generator and its callers.
//!
//! # Key Components
//!
//! ## Element types (`dtype`)
//! - Closed dtype enumeration with a total, injective C type-name table
//!
//! ## Address spaces (`address_space`)
//! - The six DLC memory regions and their numeric codes
//!
//! ## Buffers (`buffer`)
//! - Shaped allocations and row-major sub-regions
//!
//! ## Index expressions (`expr`)
//! - Integer arithmetic over the compute-unit id with constant folding
//!
//! ## Session (`session`)
//! - Arena allocation, C identifier supply, emission statistics

pub mod address_space;
pub mod buffer;
pub mod dtype;
pub mod error;
pub mod expr;
pub mod session;

pub use address_space::AddressSpace;
pub use buffer::{Buffer, BufferRegion, BufferRole, Scope};
pub use dtype::DType;
pub use error::{CodegenError, CodegenResult};
pub use expr::IndexExpr;
pub use session::{sanitize_identifier, CodegenSession, SessionStats};
