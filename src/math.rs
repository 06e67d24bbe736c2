//! Shared numerical primitives anchored on `nalgebra`.

/// Primary scalar type used across the crate.
pub type Scalar = f64;
