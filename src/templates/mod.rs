// This module is the dispatch table from (operation kind, element type) to the shared
// compute templates shipped with the DLC kernel library. Element-wise tile operations are
// never inlined into the kernel; each call site names one template family specialised by
// an operation tag, and the template header provides one implementation per family. The
// table below is the single place that decides which pairs exist: arithmetic, fill, and
// copy cover every element type, abs and relu need a signed representation, and the
// transcendental ops are float-only. Anything outside the table fails with
// UnsupportedTemplate before a single line of source is produced.

//! Compute-template dispatch table.

use std::fmt;

use crate::core::{CodegenError, CodegenResult, DType};

/// Element-wise operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    AddScalar,
    SubScalar,
    MulScalar,
    DivScalar,
    Abs,
    Exp,
    Log,
    Sqrt,
    Rsqrt,
    Relu,
    Fill,
    Copy,
}

impl OpKind {
    /// Operation name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::AddScalar => "add_scalar",
            OpKind::SubScalar => "sub_scalar",
            OpKind::MulScalar => "mul_scalar",
            OpKind::DivScalar => "div_scalar",
            OpKind::Abs => "abs",
            OpKind::Exp => "exp",
            OpKind::Log => "log",
            OpKind::Sqrt => "sqrt",
            OpKind::Rsqrt => "rsqrt",
            OpKind::Relu => "relu",
            OpKind::Fill => "fill",
            OpKind::Copy => "copy",
        }
    }

    /// Scalar form of a binary operation.
    pub fn scalar_form(self) -> Option<OpKind> {
        match self {
            OpKind::Add => Some(OpKind::AddScalar),
            OpKind::Sub => Some(OpKind::SubScalar),
            OpKind::Mul => Some(OpKind::MulScalar),
            OpKind::Div => Some(OpKind::DivScalar),
            _ => None,
        }
    }

    pub fn is_scalar_form(self) -> bool {
        matches!(
            self,
            OpKind::AddScalar | OpKind::SubScalar | OpKind::MulScalar | OpKind::DivScalar
        )
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A template family; one C++ template per family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateFamily {
    BinaryOp,
    BinaryScalarOp,
    UnaryOp,
    Fill,
    Copy,
}

impl TemplateFamily {
    pub fn name(self) -> &'static str {
        match self {
            TemplateFamily::BinaryOp => "binary_op_template",
            TemplateFamily::BinaryScalarOp => "binary_scalar_op_template",
            TemplateFamily::UnaryOp => "unary_op_template",
            TemplateFamily::Fill => "fill_template",
            TemplateFamily::Copy => "copy_template",
        }
    }

    /// Header declaring the family.
    pub fn header(self) -> &'static str {
        match self {
            TemplateFamily::BinaryOp | TemplateFamily::BinaryScalarOp => {
                "tilelang_template/binary_ops.hpp"
            }
            TemplateFamily::UnaryOp => "tilelang_template/unary_ops.hpp",
            TemplateFamily::Fill | TemplateFamily::Copy => "tilelang_template/memory_ops.hpp",
        }
    }
}

/// Template headers in inclusion order.
pub const TEMPLATE_HEADERS: [&str; 3] = [
    "tilelang_template/binary_ops.hpp",
    "tilelang_template/unary_ops.hpp",
    "tilelang_template/memory_ops.hpp",
];

/// Which element types a template accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Support {
    AllTypes,
    SignedAndFloat,
    FloatOnly,
}

impl Support {
    fn accepts(self, dtype: DType) -> bool {
        match self {
            Support::AllTypes => true,
            Support::SignedAndFloat => dtype.is_float() || dtype.is_signed_int(),
            Support::FloatOnly => dtype.is_float(),
        }
    }
}

// --------------------------
// the dispatch table
// --------------------------

const TABLE: &[(OpKind, TemplateFamily, &str, Support)] = &[
    // binary, vector-vector
    (OpKind::Add, TemplateFamily::BinaryOp, "ADD", Support::AllTypes),
    (OpKind::Sub, TemplateFamily::BinaryOp, "SUB", Support::AllTypes),
    (OpKind::Mul, TemplateFamily::BinaryOp, "MUL", Support::AllTypes),
    (OpKind::Div, TemplateFamily::BinaryOp, "DIV", Support::AllTypes),
    // binary, vector-scalar
    (OpKind::AddScalar, TemplateFamily::BinaryScalarOp, "ADD", Support::AllTypes),
    (OpKind::SubScalar, TemplateFamily::BinaryScalarOp, "SUB", Support::AllTypes),
    (OpKind::MulScalar, TemplateFamily::BinaryScalarOp, "MUL", Support::AllTypes),
    (OpKind::DivScalar, TemplateFamily::BinaryScalarOp, "DIV", Support::AllTypes),
    // unary
    (OpKind::Abs, TemplateFamily::UnaryOp, "ABS", Support::SignedAndFloat),
    (OpKind::Relu, TemplateFamily::UnaryOp, "RELU", Support::SignedAndFloat),
    (OpKind::Exp, TemplateFamily::UnaryOp, "EXP", Support::FloatOnly),
    (OpKind::Log, TemplateFamily::UnaryOp, "LOG", Support::FloatOnly),
    (OpKind::Sqrt, TemplateFamily::UnaryOp, "SQRT", Support::FloatOnly),
    (OpKind::Rsqrt, TemplateFamily::UnaryOp, "RSQRT", Support::FloatOnly),
    // memory
    (OpKind::Fill, TemplateFamily::Fill, "FILL", Support::AllTypes),
    (OpKind::Copy, TemplateFamily::Copy, "COPY", Support::AllTypes),
];

/// A template specialised for one operation kind and element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateRef {
    pub family: TemplateFamily,
    pub tag: &'static str,
    pub dtype: DType,
}

impl TemplateRef {
    /// Callee spelling, e.g. `binary_op_template<ADD>`.
    pub fn callee(&self) -> String {
        format!("{}<{}>", self.family.name(), self.tag)
    }
}

impl fmt::Display for TemplateRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.callee(), self.dtype)
    }
}

/// Look up the template for `(op, dtype)`.
pub fn lookup(op: OpKind, dtype: DType) -> CodegenResult<TemplateRef> {
    TABLE
        .iter()
        .find(|(kind, ..)| *kind == op)
        .filter(|(.., support)| support.accepts(dtype))
        .map(|(_, family, tag, _)| TemplateRef {
            family: *family,
            tag: *tag,
            dtype,
        })
        .ok_or(CodegenError::UnsupportedTemplate {
            operation: op.name(),
            dtype: dtype.name(),
        })
}
