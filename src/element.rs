//! Parameterized circuit elements.
//!
//! An element contributes a set of linear constraints over its branch
//! voltages `v`, branch currents `i`, states `x`, state derivatives `x'`,
//! nonlinear variables `q`, and external inputs `u`:
//!
//! ```text
//! mv·v + mi·i + mx·x + mxd·x' + mq·q + mu·u + u0 = 0
//! ```
//!
//! together with an output projection (`pv`, `pi`, `px`, `pxd`, `pq`), an
//! optional symbolic nonlinear equation, and a pin map exposing branch ends
//! for wiring. Dimensions are tied together by the shared symbols `nb`
//! (branches), `nx` (states), `nq` (nonlinear variables), `nu` (inputs),
//! `nl` (linear equations), `ny` (outputs), and the constant column `n0 = 1`;
//! construction fails if two supplied matrices disagree on a symbol.
//!
//! Elements are immutable once built and freely shareable across circuits
//! behind an [`Arc`].

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::DMatrix;
use nalgebra_sparse::CscMatrix;

use crate::errors::{DkCircuitError, Result};
use crate::expr::{self, Expr};
use crate::math::Scalar;
use crate::sparse;

/// Orientation of a pin relative to its branch.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    /// Positive end of the branch.
    Pos,
    /// Negative end of the branch.
    Neg,
}

impl Polarity {
    /// Signed incidence contribution of this polarity.
    #[must_use]
    pub fn sign(self) -> i32 {
        match self {
            Self::Pos => 1,
            Self::Neg => -1,
        }
    }
}

/// Ordered pin map: pin name to the `(branch, polarity)` pairs it exposes.
pub type PinMap = Vec<(String, Vec<(usize, Polarity)>)>;

/// Dimension symbols shared between the coefficient matrices of one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dim {
    N0,
    Nb,
    Nx,
    Nq,
    Nu,
    Nl,
    Ny,
}

impl Dim {
    fn label(self) -> &'static str {
        match self {
            Self::N0 => "n0",
            Self::Nb => "nb",
            Self::Nx => "nx",
            Self::Nq => "nq",
            Self::Nu => "nu",
            Self::Nl => "nl",
            Self::Ny => "ny",
        }
    }
}

/// Immutable bundle of coefficient matrices, nonlinear equation, and pin map.
#[derive(Debug, Clone)]
pub struct Element {
    mv: CscMatrix<Scalar>,
    mi: CscMatrix<Scalar>,
    mx: CscMatrix<Scalar>,
    mxd: CscMatrix<Scalar>,
    mq: CscMatrix<Scalar>,
    mu: CscMatrix<Scalar>,
    u0: CscMatrix<Scalar>,
    pv: CscMatrix<Scalar>,
    pi: CscMatrix<Scalar>,
    px: CscMatrix<Scalar>,
    pxd: CscMatrix<Scalar>,
    pq: CscMatrix<Scalar>,
    nonlinear_eq: Expr,
    pins: PinMap,
}

/// Opaque handle to one pin of a shared element.
#[derive(Debug, Clone)]
pub struct Pin {
    element: Arc<Element>,
    name: String,
    branches: Vec<(usize, Polarity)>,
}

impl Pin {
    /// Element the pin belongs to.
    #[must_use]
    pub fn element(&self) -> &Arc<Element> {
        &self.element
    }

    /// Pin name within the element's pin map.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element-local `(branch, polarity)` pairs exposed by this pin.
    #[must_use]
    pub fn branches(&self) -> &[(usize, Polarity)] {
        &self.branches
    }
}

impl Element {
    /// Starts building an element.
    #[must_use]
    pub fn builder() -> ElementBuilder {
        ElementBuilder::default()
    }

    /// Number of branches.
    #[must_use]
    pub fn nb(&self) -> usize {
        self.mv.ncols()
    }

    /// Number of continuous states.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.mx.ncols()
    }

    /// Number of nonlinear variables.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.mq.ncols()
    }

    /// Number of external inputs.
    #[must_use]
    pub fn nu(&self) -> usize {
        self.mu.ncols()
    }

    /// Number of linear equations.
    #[must_use]
    pub fn nl(&self) -> usize {
        self.mv.nrows()
    }

    /// Number of outputs.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.pv.nrows()
    }

    /// Number of nonlinear equations, `nb + nx + nq - nl`.
    #[must_use]
    pub fn nn(&self) -> usize {
        self.nb() + self.nx() + self.nq() - self.nl()
    }

    /// Branch-voltage coefficients (`nl × nb`).
    #[must_use]
    pub fn mv(&self) -> &CscMatrix<Scalar> {
        &self.mv
    }

    /// Branch-current coefficients (`nl × nb`).
    #[must_use]
    pub fn mi(&self) -> &CscMatrix<Scalar> {
        &self.mi
    }

    /// State coefficients (`nl × nx`).
    #[must_use]
    pub fn mx(&self) -> &CscMatrix<Scalar> {
        &self.mx
    }

    /// State-derivative coefficients (`nl × nx`).
    #[must_use]
    pub fn mxd(&self) -> &CscMatrix<Scalar> {
        &self.mxd
    }

    /// Nonlinear-variable coefficients (`nl × nq`).
    #[must_use]
    pub fn mq(&self) -> &CscMatrix<Scalar> {
        &self.mq
    }

    /// Input coefficients (`nl × nu`).
    #[must_use]
    pub fn mu(&self) -> &CscMatrix<Scalar> {
        &self.mu
    }

    /// Constant column (`nl × 1`).
    #[must_use]
    pub fn u0(&self) -> &CscMatrix<Scalar> {
        &self.u0
    }

    /// Output projection onto branch voltages (`ny × nb`).
    #[must_use]
    pub fn pv(&self) -> &CscMatrix<Scalar> {
        &self.pv
    }

    /// Output projection onto branch currents (`ny × nb`).
    #[must_use]
    pub fn pi(&self) -> &CscMatrix<Scalar> {
        &self.pi
    }

    /// Output projection onto states (`ny × nx`).
    #[must_use]
    pub fn px(&self) -> &CscMatrix<Scalar> {
        &self.px
    }

    /// Output projection onto state derivatives (`ny × nx`).
    #[must_use]
    pub fn pxd(&self) -> &CscMatrix<Scalar> {
        &self.pxd
    }

    /// Output projection onto nonlinear variables (`ny × nq`).
    #[must_use]
    pub fn pq(&self) -> &CscMatrix<Scalar> {
        &self.pq
    }

    /// Nonlinear equation, an empty block when the element is linear.
    #[must_use]
    pub fn nonlinear_eq(&self) -> &Expr {
        &self.nonlinear_eq
    }

    /// Pin map in declaration order.
    #[must_use]
    pub fn pins(&self) -> &PinMap {
        &self.pins
    }

    /// Looks up a pin by name.
    ///
    /// # Errors
    ///
    /// [`DkCircuitError::UnknownPin`] when the name is absent.
    pub fn pin(self: &Arc<Self>, name: &str) -> Result<Pin> {
        self.pins
            .iter()
            .find(|(pin_name, _)| pin_name == name)
            .map(|(pin_name, branches)| Pin {
                element: Arc::clone(self),
                name: pin_name.clone(),
                branches: branches.clone(),
            })
            .ok_or_else(|| DkCircuitError::UnknownPin(name.to_owned()))
    }
}

/// Builder collecting the optional matrices, pin map, and nonlinear equation
/// of an [`Element`].
///
/// Matrices are supplied densely (elements are tiny) and stored sparsely.
/// Consistency of the shared dimension symbols is checked at [`build`]
/// (`ElementBuilder::build`) time; unsupplied matrices default to all-zeros
/// with sizes inferred from the supplied ones, or zero where no binding
/// exists.
#[derive(Debug, Clone, Default)]
pub struct ElementBuilder {
    mv: Option<DMatrix<Scalar>>,
    mi: Option<DMatrix<Scalar>>,
    mx: Option<DMatrix<Scalar>>,
    mxd: Option<DMatrix<Scalar>>,
    mq: Option<DMatrix<Scalar>>,
    mu: Option<DMatrix<Scalar>>,
    u0: Option<DMatrix<Scalar>>,
    pv: Option<DMatrix<Scalar>>,
    pi: Option<DMatrix<Scalar>>,
    px: Option<DMatrix<Scalar>>,
    pxd: Option<DMatrix<Scalar>>,
    pq: Option<DMatrix<Scalar>>,
    pins: Option<PinMap>,
    nonlinear_eq: Option<Expr>,
}

macro_rules! matrix_setter {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(mut self, matrix: DMatrix<Scalar>) -> Self {
            self.$name = Some(matrix);
            self
        }
    };
}

impl ElementBuilder {
    matrix_setter!(
        /// Branch-voltage coefficients (`nl × nb`).
        mv
    );
    matrix_setter!(
        /// Branch-current coefficients (`nl × nb`).
        mi
    );
    matrix_setter!(
        /// State coefficients (`nl × nx`).
        mx
    );
    matrix_setter!(
        /// State-derivative coefficients (`nl × nx`).
        mxd
    );
    matrix_setter!(
        /// Nonlinear-variable coefficients (`nl × nq`).
        mq
    );
    matrix_setter!(
        /// Input coefficients (`nl × nu`).
        mu
    );
    matrix_setter!(
        /// Constant column (`nl × 1`).
        u0
    );
    matrix_setter!(
        /// Output projection onto branch voltages (`ny × nb`).
        pv
    );
    matrix_setter!(
        /// Output projection onto branch currents (`ny × nb`).
        pi
    );
    matrix_setter!(
        /// Output projection onto states (`ny × nx`).
        px
    );
    matrix_setter!(
        /// Output projection onto state derivatives (`ny × nx`).
        pxd
    );
    matrix_setter!(
        /// Output projection onto nonlinear variables (`ny × nq`).
        pq
    );

    /// Pin map, replacing the default integer pin names.
    #[must_use]
    pub fn pins<N, P>(mut self, pins: P) -> Self
    where
        N: Into<String>,
        P: IntoIterator<Item = (N, Vec<(usize, Polarity)>)>,
    {
        self.pins = Some(
            pins.into_iter()
                .map(|(name, branches)| (name.into(), branches))
                .collect(),
        );
        self
    }

    /// Nonlinear equation assigning `res` and `J` from `q`.
    #[must_use]
    pub fn nonlinear_eq(mut self, eq: Expr) -> Self {
        self.nonlinear_eq = Some(eq);
        self
    }

    /// Finalizes the element.
    ///
    /// # Errors
    ///
    /// - [`DkCircuitError::DimensionConflict`] when two supplied matrices
    ///   disagree on a shared dimension symbol;
    /// - [`DkCircuitError::ExcessLinearEquations`] when `nl > nb + nx + nq`;
    /// - [`DkCircuitError::PinBranchOutOfRange`] for a pin entry addressing a
    ///   branch outside `0..nb`;
    /// - [`DkCircuitError::NonlinearArity`] /
    ///   [`DkCircuitError::UnindexedNonlinearVar`] for a malformed nonlinear
    ///   equation.
    pub fn build(self) -> Result<Element> {
        let mut sizes: HashMap<Dim, usize> = HashMap::from([(Dim::N0, 1)]);
        let supplied: [(&'static str, Option<&DMatrix<Scalar>>, Dim, Dim); 12] = [
            ("mv", self.mv.as_ref(), Dim::Nl, Dim::Nb),
            ("mi", self.mi.as_ref(), Dim::Nl, Dim::Nb),
            ("mx", self.mx.as_ref(), Dim::Nl, Dim::Nx),
            ("mxd", self.mxd.as_ref(), Dim::Nl, Dim::Nx),
            ("mq", self.mq.as_ref(), Dim::Nl, Dim::Nq),
            ("mu", self.mu.as_ref(), Dim::Nl, Dim::Nu),
            ("u0", self.u0.as_ref(), Dim::Nl, Dim::N0),
            ("pv", self.pv.as_ref(), Dim::Ny, Dim::Nb),
            ("pi", self.pi.as_ref(), Dim::Ny, Dim::Nb),
            ("px", self.px.as_ref(), Dim::Ny, Dim::Nx),
            ("pxd", self.pxd.as_ref(), Dim::Ny, Dim::Nx),
            ("pq", self.pq.as_ref(), Dim::Ny, Dim::Nq),
        ];
        for (name, matrix, row_sym, col_sym) in supplied {
            if let Some(m) = matrix {
                bind(&mut sizes, name, row_sym, m.nrows())?;
                bind(&mut sizes, name, col_sym, m.ncols())?;
            }
        }

        let dim = |sym: Dim| sizes.get(&sym).copied().unwrap_or(0);
        let (nb, nx, nq, nu) = (dim(Dim::Nb), dim(Dim::Nx), dim(Dim::Nq), dim(Dim::Nu));
        let (nl, ny) = (dim(Dim::Nl), dim(Dim::Ny));
        if nl > nb + nx + nq {
            return Err(DkCircuitError::ExcessLinearEquations {
                nl,
                limit: nb + nx + nq,
            });
        }

        let pins = match self.pins {
            Some(pins) => {
                for (name, branches) in &pins {
                    for &(branch, _) in branches {
                        if branch >= nb {
                            return Err(DkCircuitError::PinBranchOutOfRange {
                                pin: name.clone(),
                                branch,
                                nb,
                            });
                        }
                    }
                }
                pins
            }
            None => default_pins(nb),
        };

        let nonlinear_eq = self.nonlinear_eq.unwrap_or_else(Expr::empty);
        expr::validate_nonlinear_refs(&nonlinear_eq)?;

        Ok(Element {
            mv: finalize(self.mv, nl, nb),
            mi: finalize(self.mi, nl, nb),
            mx: finalize(self.mx, nl, nx),
            mxd: finalize(self.mxd, nl, nx),
            mq: finalize(self.mq, nl, nq),
            mu: finalize(self.mu, nl, nu),
            u0: finalize(self.u0, nl, 1),
            pv: finalize(self.pv, ny, nb),
            pi: finalize(self.pi, ny, nb),
            px: finalize(self.px, ny, nx),
            pxd: finalize(self.pxd, ny, nx),
            pq: finalize(self.pq, ny, nq),
            nonlinear_eq,
            pins,
        })
    }
}

fn bind(
    sizes: &mut HashMap<Dim, usize>,
    matrix: &'static str,
    sym: Dim,
    size: usize,
) -> Result<()> {
    match sizes.insert(sym, size) {
        Some(previous) if previous != size => Err(DkCircuitError::DimensionConflict {
            symbol: sym.label(),
            matrix,
            expected: previous,
            found: size,
        }),
        _ => Ok(()),
    }
}

fn finalize(matrix: Option<DMatrix<Scalar>>, nrows: usize, ncols: usize) -> CscMatrix<Scalar> {
    matrix.map_or_else(
        || CscMatrix::zeros(nrows, ncols),
        |dense| sparse::csc_from_dense(&dense),
    )
}

/// Default pin map: names `"1"…"2·nb"`, pin `2k+1` is the positive and pin
/// `2k+2` the negative end of branch `k`.
fn default_pins(nb: usize) -> PinMap {
    let mut pins = PinMap::with_capacity(2 * nb);
    for branch in 0..nb {
        pins.push(((2 * branch + 1).to_string(), vec![(branch, Polarity::Pos)]));
        pins.push(((2 * branch + 2).to_string(), vec![(branch, Polarity::Neg)]));
    }
    pins
}
