#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![warn(clippy::all, clippy::cargo, clippy::nursery, missing_docs)]
#![doc = include_str!("../README.md")]

/// Shared numerical primitives.
pub mod math;
/// Sparse matrix kernel: assembly, concatenation, canonicalization.
pub mod sparse;
/// Symbolic expression trees for per-element nonlinear equations.
pub mod expr;
/// Parameterized circuit elements and their coefficient matrices.
pub mod element;
/// Circuit assembly: elements, nets, and whole-circuit quantities.
pub mod circuit;
/// Kirchhoff topology reduction (tie and cutset matrices).
pub mod topo;
/// Error types shared between submodules.
pub mod errors;

/// Common exports for downstream crates.
pub mod prelude;
