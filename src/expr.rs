//! Symbolic expression trees for per-element nonlinear equations.
//!
//! An element's nonlinear equation is a small program that assigns the
//! residual `res[i]` and Jacobian `J[i, j]` as a function of the nonlinear
//! variables `q[k]`. The core never evaluates these trees; it only rewrites
//! them so that the element-local indices line up with the whole-circuit
//! numbering when elements are concatenated.
//!
//! The only head the rewriter interprets is [`Expr::IndexRef`], representing
//! `name[idx0, idx1, …]`. Every other node is traversed structurally and
//! otherwise left alone.

use std::fmt;

use crate::errors::{DkCircuitError, Result};
use crate::math::Scalar;

/// Subscript counts required for the solver-facing references.
const REF_ARITY: [(&str, usize); 3] = [("q", 1), ("J", 2), ("res", 1)];

fn ref_arity(name: &str) -> Option<usize> {
    REF_ARITY
        .iter()
        .find(|(reference, _)| *reference == name)
        .map(|&(_, arity)| arity)
}

/// Node of a nonlinear-equation expression tree.
///
/// Subscripts are 0-based throughout.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer literal.
    Integer(i64),
    /// Floating-point literal.
    Number(Scalar),
    /// Named variable.
    Var(String),
    /// Subscripted reference `name[idx0, idx1, …]`.
    IndexRef {
        /// Referenced name.
        name: String,
        /// Subscript expressions.
        indices: Vec<Expr>,
    },
    /// Composite node with an opaque head tag and ordered children.
    Call {
        /// Head tag (`"+"`, `"exp"`, `"="`, …).
        head: String,
        /// Child expressions.
        args: Vec<Expr>,
    },
    /// Ordered sequence of statements.
    Block(Vec<Expr>),
    /// Lexical scope; element-local bindings inside do not leak out.
    Scope(Box<Expr>),
}

impl Expr {
    /// Named variable.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Subscripted reference `name[indices…]`.
    #[must_use]
    pub fn index(name: impl Into<String>, indices: Vec<Self>) -> Self {
        Self::IndexRef {
            name: name.into(),
            indices,
        }
    }

    /// Composite node `head(args…)`.
    #[must_use]
    pub fn call(head: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call {
            head: head.into(),
            args,
        }
    }

    /// Assignment statement `lhs = rhs`.
    #[must_use]
    pub fn assign(lhs: Self, rhs: Self) -> Self {
        Self::call("=", vec![lhs, rhs])
    }

    /// Sum `lhs + rhs`.
    #[must_use]
    pub fn add(lhs: Self, rhs: Self) -> Self {
        Self::call("+", vec![lhs, rhs])
    }

    /// Product `lhs * rhs`.
    #[must_use]
    pub fn mul(lhs: Self, rhs: Self) -> Self {
        Self::call("*", vec![lhs, rhs])
    }

    /// Statement sequence.
    #[must_use]
    pub fn block(stmts: Vec<Self>) -> Self {
        Self::Block(stmts)
    }

    /// Empty statement block, the default nonlinear equation.
    #[must_use]
    pub fn empty() -> Self {
        Self::Block(Vec::new())
    }

    /// Returns true for a block with no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Block(stmts) if stmts.is_empty())
    }
}

/// Validates every `q`/`J`/`res` reference in `expr`.
///
/// Rejects a reference subscripted with the wrong arity and any of the three
/// names appearing as a bare symbol. Elements run this at construction time,
/// which is what makes the later offset rewriting infallible.
pub fn validate_nonlinear_refs(expr: &Expr) -> Result<()> {
    match expr {
        Expr::Integer(_) | Expr::Number(_) => Ok(()),
        Expr::Var(name) => match ref_arity(name) {
            Some(_) => Err(DkCircuitError::UnindexedNonlinearVar(name.clone())),
            None => Ok(()),
        },
        Expr::IndexRef { name, indices } => {
            if let Some(expected) = ref_arity(name) {
                if indices.len() != expected {
                    return Err(DkCircuitError::NonlinearArity {
                        name: name.clone(),
                        expected,
                        found: indices.len(),
                    });
                }
            }
            indices.iter().try_for_each(validate_nonlinear_refs)
        }
        Expr::Call { args, .. } => args.iter().try_for_each(validate_nonlinear_refs),
        Expr::Block(stmts) => stmts.iter().try_for_each(validate_nonlinear_refs),
        Expr::Scope(body) => validate_nonlinear_refs(body),
    }
}

/// Rewrites `q`/`J`/`res` subscripts by the given global offsets.
///
/// `res[i]` becomes `res[row_offset + i]`, `J[i, j]` becomes
/// `J[row_offset + i, col_offset + j]`, and `q[k]` becomes
/// `q[col_offset + k]`. Integer-literal subscripts are folded; anything else
/// gets an explicit `offset + e` call node. The input must already have been
/// accepted by [`validate_nonlinear_refs`].
#[must_use]
pub fn offset_nonlinear_refs(expr: &Expr, row_offset: usize, col_offset: usize) -> Expr {
    let rewrite = |child: &Expr| offset_nonlinear_refs(child, row_offset, col_offset);
    match expr {
        Expr::Integer(_) | Expr::Number(_) | Expr::Var(_) => expr.clone(),
        Expr::IndexRef { name, indices } => {
            let offsets: Vec<usize> = match name.as_str() {
                "q" => vec![col_offset],
                "J" => vec![row_offset, col_offset],
                "res" => vec![row_offset],
                _ => Vec::new(),
            };
            let indices = if offsets.is_empty() {
                indices.iter().map(rewrite).collect()
            } else {
                debug_assert_eq!(indices.len(), offsets.len());
                indices
                    .iter()
                    .zip(offsets)
                    .map(|(index, offset)| offset_subscript(&rewrite(index), offset))
                    .collect()
            };
            Expr::IndexRef {
                name: name.clone(),
                indices,
            }
        }
        Expr::Call { head, args } => Expr::Call {
            head: head.clone(),
            args: args.iter().map(rewrite).collect(),
        },
        Expr::Block(stmts) => Expr::Block(stmts.iter().map(rewrite).collect()),
        Expr::Scope(body) => Expr::Scope(Box::new(rewrite(body))),
    }
}

fn offset_subscript(index: &Expr, offset: usize) -> Expr {
    if offset == 0 {
        return index.clone();
    }
    match index {
        Expr::Integer(value) => Expr::Integer(value + offset as i64),
        other => Expr::add(Expr::Integer(offset as i64), other.clone()),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Var(name) => f.write_str(name),
            Self::IndexRef { name, indices } => {
                write!(f, "{name}[")?;
                for (position, index) in indices.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{index}")?;
                }
                f.write_str("]")
            }
            Self::Call { head, args } if head == "=" && args.len() == 2 => {
                write!(f, "{} = {}", args[0], args[1])
            }
            Self::Call { head, args }
                if args.len() == 2 && matches!(head.as_str(), "+" | "-" | "*" | "/") =>
            {
                write!(f, "({} {head} {})", args[0], args[1])
            }
            Self::Call { head, args } => {
                write!(f, "{head}(")?;
                for (position, arg) in args.iter().enumerate() {
                    if position > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")
            }
            Self::Block(stmts) => {
                for (position, stmt) in stmts.iter().enumerate() {
                    if position > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{stmt}")?;
                }
                Ok(())
            }
            Self::Scope(body) => write!(f, "{{ {} }}", body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diode_eq() -> Expr {
        // res[0] = exp(q[0]) - q[1]; J[0, 0] = exp(q[0]); J[0, 1] = -1
        Expr::block(vec![
            Expr::assign(
                Expr::index("res", vec![Expr::Integer(0)]),
                Expr::call(
                    "-",
                    vec![
                        Expr::call("exp", vec![Expr::index("q", vec![Expr::Integer(0)])]),
                        Expr::index("q", vec![Expr::Integer(1)]),
                    ],
                ),
            ),
            Expr::assign(
                Expr::index("J", vec![Expr::Integer(0), Expr::Integer(0)]),
                Expr::call("exp", vec![Expr::index("q", vec![Expr::Integer(0)])]),
            ),
            Expr::assign(
                Expr::index("J", vec![Expr::Integer(0), Expr::Integer(1)]),
                Expr::Integer(-1),
            ),
        ])
    }

    #[test]
    fn valid_equation_passes_validation() {
        assert!(validate_nonlinear_refs(&diode_eq()).is_ok());
    }

    #[test]
    fn bare_reference_is_rejected() {
        let expr = Expr::assign(Expr::index("res", vec![Expr::Integer(0)]), Expr::var("q"));
        assert!(matches!(
            validate_nonlinear_refs(&expr),
            Err(DkCircuitError::UnindexedNonlinearVar(name)) if name == "q"
        ));
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let expr = Expr::index("J", vec![Expr::Integer(0)]);
        assert!(matches!(
            validate_nonlinear_refs(&expr),
            Err(DkCircuitError::NonlinearArity { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn arity_is_checked_inside_subscripts() {
        let expr = Expr::index("res", vec![Expr::var("q")]);
        assert!(validate_nonlinear_refs(&expr).is_err());
    }

    #[test]
    fn offsets_fold_into_integer_subscripts() {
        let rewritten = offset_nonlinear_refs(&diode_eq(), 1, 2);
        let expected = Expr::block(vec![
            Expr::assign(
                Expr::index("res", vec![Expr::Integer(1)]),
                Expr::call(
                    "-",
                    vec![
                        Expr::call("exp", vec![Expr::index("q", vec![Expr::Integer(2)])]),
                        Expr::index("q", vec![Expr::Integer(3)]),
                    ],
                ),
            ),
            Expr::assign(
                Expr::index("J", vec![Expr::Integer(1), Expr::Integer(2)]),
                Expr::call("exp", vec![Expr::index("q", vec![Expr::Integer(2)])]),
            ),
            Expr::assign(
                Expr::index("J", vec![Expr::Integer(1), Expr::Integer(3)]),
                Expr::Integer(-1),
            ),
        ]);
        assert_eq!(rewritten, expected);
    }

    #[test]
    fn zero_offsets_leave_the_tree_unchanged() {
        let eq = diode_eq();
        assert_eq!(offset_nonlinear_refs(&eq, 0, 0), eq);
    }

    #[test]
    fn symbolic_subscripts_gain_an_explicit_addition() {
        let expr = Expr::index("q", vec![Expr::var("k")]);
        let rewritten = offset_nonlinear_refs(&expr, 0, 3);
        assert_eq!(
            rewritten,
            Expr::index("q", vec![Expr::add(Expr::Integer(3), Expr::var("k"))])
        );
    }

    #[test]
    fn other_index_refs_are_left_alone() {
        let expr = Expr::index("lookup", vec![Expr::Integer(4)]);
        assert_eq!(offset_nonlinear_refs(&expr, 7, 7), expr);
    }

    #[test]
    fn display_renders_assignments_infix() {
        let expr = Expr::assign(
            Expr::index("res", vec![Expr::Integer(0)]),
            Expr::mul(
                Expr::index("q", vec![Expr::Integer(0)]),
                Expr::index("q", vec![Expr::Integer(1)]),
            ),
        );
        assert_eq!(expr.to_string(), "res[0] = (q[0] * q[1])");
    }
}
