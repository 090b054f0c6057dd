//! Integer index arithmetic over the compute-unit id.
//!
//! Kernel bodies compute tile offsets from the compute-unit id (`cid`) and
//! from `let`-bound variables derived from it. `IndexExpr` is the small
//! expression language for that: constants fold eagerly, so fully static
//! offsets collapse to a single `Const`.

use std::fmt;
use std::ops::{Add, Div, Mul, Rem, Sub};

/// An integer index expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexExpr {
    Const(i64),
    /// The id of the executing compute unit, in `[0, num_units)`.
    ComputeId,
    /// A `let`-bound variable of the kernel body.
    Var(String),
    Add(Box<IndexExpr>, Box<IndexExpr>),
    Sub(Box<IndexExpr>, Box<IndexExpr>),
    Mul(Box<IndexExpr>, Box<IndexExpr>),
    /// Floor division; operands are non-negative indices.
    Div(Box<IndexExpr>, Box<IndexExpr>),
    Mod(Box<IndexExpr>, Box<IndexExpr>),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 2,
        }
    }

    fn fold(self, a: i64, b: i64) -> Option<i64> {
        match self {
            BinOp::Add => a.checked_add(b),
            BinOp::Sub => a.checked_sub(b),
            BinOp::Mul => a.checked_mul(b),
            BinOp::Div if b != 0 => Some(a.div_euclid(b)),
            BinOp::Mod if b != 0 => Some(a.rem_euclid(b)),
            _ => None,
        }
    }
}

impl IndexExpr {
    pub fn constant(value: i64) -> Self {
        IndexExpr::Const(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        IndexExpr::Var(name.into())
    }

    pub fn as_const(&self) -> Option<i64> {
        match self {
            IndexExpr::Const(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_const() == Some(0)
    }

    fn split(&self) -> Option<(BinOp, &IndexExpr, &IndexExpr)> {
        match self {
            IndexExpr::Add(a, b) => Some((BinOp::Add, a, b)),
            IndexExpr::Sub(a, b) => Some((BinOp::Sub, a, b)),
            IndexExpr::Mul(a, b) => Some((BinOp::Mul, a, b)),
            IndexExpr::Div(a, b) => Some((BinOp::Div, a, b)),
            IndexExpr::Mod(a, b) => Some((BinOp::Mod, a, b)),
            _ => None,
        }
    }

    /// Build `a <op> b`, folding constants and trivial identities.
    fn binary(op: BinOp, a: IndexExpr, b: IndexExpr) -> IndexExpr {
        if let (Some(x), Some(y)) = (a.as_const(), b.as_const()) {
            if let Some(v) = op.fold(x, y) {
                return IndexExpr::Const(v);
            }
        }
        match (op, a.as_const(), b.as_const()) {
            (BinOp::Add, Some(0), _) => return b,
            (BinOp::Add | BinOp::Sub, _, Some(0)) => return a,
            (BinOp::Mul, Some(0), _) | (BinOp::Mul, _, Some(0)) => return IndexExpr::Const(0),
            (BinOp::Mul, Some(1), _) => return b,
            (BinOp::Mul | BinOp::Div, _, Some(1)) => return a,
            (BinOp::Mod, _, Some(1)) => return IndexExpr::Const(0),
            _ => {}
        }
        let (a, b) = (Box::new(a), Box::new(b));
        match op {
            BinOp::Add => IndexExpr::Add(a, b),
            BinOp::Sub => IndexExpr::Sub(a, b),
            BinOp::Mul => IndexExpr::Mul(a, b),
            BinOp::Div => IndexExpr::Div(a, b),
            BinOp::Mod => IndexExpr::Mod(a, b),
        }
    }

    /// Evaluate with a concrete compute-unit id and variable lookup.
    pub fn eval<F>(&self, cid: i64, lookup: &F) -> Option<i64>
    where
        F: Fn(&str) -> Option<i64>,
    {
        match self {
            IndexExpr::Const(v) => Some(*v),
            IndexExpr::ComputeId => Some(cid),
            IndexExpr::Var(name) => lookup(name),
            _ => {
                let (op, a, b) = self.split()?;
                op.fold(a.eval(cid, lookup)?, b.eval(cid, lookup)?)
            }
        }
    }

    /// Whether the expression mentions `name` (or the compute id for `None`).
    pub fn references(&self, name: Option<&str>) -> bool {
        match (self, name) {
            (IndexExpr::ComputeId, None) => true,
            (IndexExpr::Var(v), Some(n)) => v == n,
            (IndexExpr::Const(_) | IndexExpr::ComputeId | IndexExpr::Var(_), _) => false,
            _ => self
                .split()
                .is_some_and(|(_, a, b)| a.references(name) || b.references(name)),
        }
    }

    /// Render as C, mapping the compute id and variables to identifiers.
    pub fn render<F>(&self, cid: &str, var: &F) -> String
    where
        F: Fn(&str) -> String,
    {
        let mut out = String::new();
        self.render_into(&mut out, cid, var, 0, false);
        out
    }

    fn render_into<F>(&self, out: &mut String, cid: &str, var: &F, parent: u8, right: bool)
    where
        F: Fn(&str) -> String,
    {
        match self {
            IndexExpr::Const(v) if *v < 0 && parent > 0 => out.push_str(&format!("({v})")),
            IndexExpr::Const(v) => out.push_str(&v.to_string()),
            IndexExpr::ComputeId => out.push_str(cid),
            IndexExpr::Var(name) => out.push_str(&var(name)),
            _ => {
                let Some((op, a, b)) = self.split() else {
                    return;
                };
                let prec = op.precedence();
                let wrap = prec < parent || (right && prec == parent);
                if wrap {
                    out.push('(');
                }
                a.render_into(out, cid, var, prec, false);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                b.render_into(out, cid, var, prec, true);
                if wrap {
                    out.push(')');
                }
            }
        }
    }
}

impl fmt::Display for IndexExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render("cid", &|name: &str| name.to_string()))
    }
}

impl From<i64> for IndexExpr {
    fn from(value: i64) -> Self {
        IndexExpr::Const(value)
    }
}

impl From<usize> for IndexExpr {
    fn from(value: usize) -> Self {
        IndexExpr::Const(value as i64)
    }
}

macro_rules! impl_index_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl<T: Into<IndexExpr>> $trait<T> for IndexExpr {
            type Output = IndexExpr;

            fn $method(self, rhs: T) -> IndexExpr {
                IndexExpr::binary($op, self, rhs.into())
            }
        }

        impl<T: Into<IndexExpr>> $trait<T> for &IndexExpr {
            type Output = IndexExpr;

            fn $method(self, rhs: T) -> IndexExpr {
                IndexExpr::binary($op, self.clone(), rhs.into())
            }
        }
    };
}

impl_index_op!(Add, add, BinOp::Add);
impl_index_op!(Sub, sub, BinOp::Sub);
impl_index_op!(Mul, mul, BinOp::Mul);
impl_index_op!(Div, div, BinOp::Div);
impl_index_op!(Rem, rem, BinOp::Mod);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_fold() {
        let e = IndexExpr::constant(128) * 1024i64 + 256i64;
        assert_eq!(e, IndexExpr::Const(131328));
    }

    #[test]
    fn test_identities() {
        let cid = IndexExpr::ComputeId;
        assert_eq!(&cid * 1i64, cid);
        assert_eq!(&cid + 0i64, cid);
        assert_eq!(&cid * 0i64, IndexExpr::Const(0));
        assert_eq!(&cid % 1i64, IndexExpr::Const(0));
    }

    #[test]
    fn test_render_precedence() {
        let bx = IndexExpr::ComputeId / 4i64;
        let e = bx * 128i64 * 1024i64 + (IndexExpr::ComputeId % 4i64) * 256i64;
        assert_eq!(e.to_string(), "cid / 4 * 128 * 1024 + cid % 4 * 256");

        let nested = IndexExpr::var("a") - (IndexExpr::var("b") + 1i64);
        assert_eq!(nested.to_string(), "a - (b + 1)");

        let grouped = (IndexExpr::var("a") + 1i64) * 2i64;
        assert_eq!(grouped.to_string(), "(a + 1) * 2");
    }

    #[test]
    fn test_eval_and_references() {
        let e = (IndexExpr::ComputeId / 4i64) * 128i64 + IndexExpr::var("k");
        let lookup = |name: &str| (name == "k").then_some(3);
        assert_eq!(e.eval(9, &lookup), Some(2 * 128 + 3));
        assert!(e.references(None));
        assert!(e.references(Some("k")));
        assert!(!e.references(Some("j")));
        assert_eq!(IndexExpr::var("j").eval(0, &lookup), None);
    }
}
