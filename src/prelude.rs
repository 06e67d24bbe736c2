//! Convenience re-exports for assembling circuits.

pub use crate::circuit::{Circuit, Connector, NetId};
pub use crate::element::{Element, ElementBuilder, Pin, PinMap, Polarity};
pub use crate::errors::{DkCircuitError, Result};
pub use crate::expr::Expr;
pub use crate::math::Scalar;
pub use crate::topo::topomat;
