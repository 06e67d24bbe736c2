//! Shared error types used across submodules.

use thiserror::Error;

/// Result type alias using [`DkCircuitError`].
pub type Result<T> = std::result::Result<T, DkCircuitError>;

/// Top-level error type for the crate.
///
/// Every failure is surfaced synchronously at the call site; nothing is
/// retried or recovered internally. Assembly is pure, so a caller may retry
/// after fixing its input.
#[derive(Debug, Error)]
pub enum DkCircuitError {
    /// A dimension symbol was bound to two different sizes during element
    /// construction.
    #[error("inconsistent sizes: {matrix} binds {symbol} to {found}, but {symbol} is already {expected}")]
    DimensionConflict {
        /// Dimension symbol in conflict (`nb`, `nx`, `nq`, `nu`, `nl`, `ny`, `n0`).
        symbol: &'static str,
        /// Matrix whose shape introduced the conflicting binding.
        matrix: &'static str,
        /// Previously bound size.
        expected: usize,
        /// Conflicting size implied by `matrix`.
        found: usize,
    },
    /// More linear equations than the element has variables to constrain.
    #[error("{nl} linear equations exceed nb + nx + nq = {limit}")]
    ExcessLinearEquations {
        /// Number of linear equations (`rows(mv)`).
        nl: usize,
        /// Upper bound `nb + nx + nq`.
        limit: usize,
    },
    /// A nonlinear equation indexes `q`, `J`, or `res` with the wrong number
    /// of subscripts.
    #[error("nonlinear equation indexes {name} with {found} subscript(s), expected {expected}")]
    NonlinearArity {
        /// Offending reference name.
        name: String,
        /// Required subscript count.
        expected: usize,
        /// Subscript count found in the expression.
        found: usize,
    },
    /// A nonlinear equation references `q`, `J`, or `res` as a bare symbol.
    #[error("nonlinear equation references {0} without subscripts")]
    UnindexedNonlinearVar(String),
    /// An element was queried against a circuit it has not been added to.
    #[error("element is not part of this circuit")]
    UnknownElement,
    /// A pin name is absent from the element's pin map.
    #[error("element has no pin named '{0}'")]
    UnknownPin(String),
    /// A pin map entry addresses a branch the element does not have.
    #[error("pin '{pin}' references branch {branch}, but the element has {nb} branch(es)")]
    PinBranchOutOfRange {
        /// Pin name carrying the bad entry.
        pin: String,
        /// Out-of-range branch index.
        branch: usize,
        /// Branch count of the element.
        nb: usize,
    },
    /// An incidence entry is outside {-1, 0, +1}.
    #[error("incidence entry at net {net}, branch {branch} is {value}, expected -1, 0, or +1")]
    IncidenceEntry {
        /// Row (net) of the offending entry.
        net: usize,
        /// Column (branch) of the offending entry.
        branch: usize,
        /// Stored value.
        value: i32,
    },
    /// A branch column touches more than two nets; the circuit is malformed.
    #[error("branch {branch} is incident to {nets} nets, expected at most 2")]
    BranchFanout {
        /// Offending branch column.
        branch: usize,
        /// Number of incident nets found.
        nets: usize,
    },
    /// The two incidence entries of a branch do not cancel.
    #[error("the polarities of branch {branch} do not cancel")]
    BranchPolarity {
        /// Offending branch column.
        branch: usize,
    },
}
