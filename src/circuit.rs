//! Mutable circuit assembly: elements, nets, and whole-circuit quantities.
//!
//! A [`Circuit`] owns an ordered list of shared [`Element`]s and a partition
//! of their pins into nets. Insertion order fixes the global branch, state,
//! nonlinear-variable, and input numbering: every whole-circuit matrix is the
//! block-diagonal concatenation of the per-element matrices in that order,
//! and the combined nonlinear equation is the per-element equations with
//! their `q`/`J`/`res` subscripts shifted to the global numbering.
//!
//! Nets are kept in slot storage so that a [`NetId`] stays valid across
//! merges: [`Circuit::connect`] folds all resolved nets into the first one,
//! tombstones the rest, and rewrites every name binding that pointed at a
//! removed net. Net names therefore survive arbitrary merge sequences as
//! aliases of the surviving net.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra_sparse::{coo::CooMatrix, CscMatrix};

use crate::element::{Element, Pin, PinMap, Polarity};
use crate::errors::{DkCircuitError, Result};
use crate::expr::{self, Expr};
use crate::math::Scalar;
use crate::sparse;
use crate::topo;

/// Stable handle to a net within one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetId(usize);

/// Endpoint accepted by [`Circuit::connect`]: a pin or a named net.
#[derive(Debug, Clone)]
pub enum Connector {
    /// A pin of some element; the element is added on first use.
    Pin(Pin),
    /// A user-chosen net name, registered on first use.
    Net(String),
}

impl From<Pin> for Connector {
    fn from(pin: Pin) -> Self {
        Self::Pin(pin)
    }
}

impl From<&str> for Connector {
    fn from(name: &str) -> Self {
        Self::Net(name.to_owned())
    }
}

impl From<String> for Connector {
    fn from(name: String) -> Self {
        Self::Net(name)
    }
}

/// Mutable collection of elements and nets.
#[derive(Debug, Default)]
pub struct Circuit {
    elements: Vec<Arc<Element>>,
    /// Slot storage; merged-away nets leave a `None` tombstone so earlier
    /// [`NetId`]s keep addressing the same slot.
    nets: Vec<Option<Vec<(usize, Polarity)>>>,
    net_names: HashMap<String, usize>,
}

impl Circuit {
    /// Creates an empty circuit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of elements.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Returns true when no elements are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = &Arc<Element>> {
        self.elements.iter()
    }

    /// Live nets in creation order, as slices of global
    /// `(branch, polarity)` pairs.
    pub fn nets(&self) -> impl Iterator<Item = &[(usize, Polarity)]> {
        self.nets.iter().flatten().map(Vec::as_slice)
    }

    /// Registered net names and the nets they currently resolve to.
    pub fn net_names(&self) -> impl Iterator<Item = (&str, NetId)> {
        self.net_names
            .iter()
            .map(|(name, &slot)| (name.as_str(), NetId(slot)))
    }

    /// Adds an element.
    ///
    /// Idempotent: a second `add` of the same allocation does nothing. On
    /// first addition, every pin of the element becomes its own singleton
    /// net.
    pub fn add(&mut self, element: &Arc<Element>) {
        self.ensure_added(element);
    }

    /// Adds several elements in iteration order.
    pub fn add_all<'a, I>(&mut self, elements: I)
    where
        I: IntoIterator<Item = &'a Arc<Element>>,
    {
        for element in elements {
            self.add(element);
        }
    }

    /// Global index of the element's first branch.
    ///
    /// # Errors
    ///
    /// [`DkCircuitError::UnknownElement`] when the element has not been
    /// added.
    pub fn branch_offset(&self, element: &Arc<Element>) -> Result<usize> {
        self.offset_of(element).ok_or(DkCircuitError::UnknownElement)
    }

    /// Net containing the given pin, adding its element first if necessary.
    pub fn net_of_pin(&mut self, pin: &Pin) -> NetId {
        let offset = self.ensure_added(pin.element());
        for (slot, net) in self.nets.iter().enumerate() {
            if let Some(entries) = net {
                if pin
                    .branches()
                    .iter()
                    .any(|&(branch, polarity)| entries.contains(&(offset + branch, polarity)))
                {
                    return NetId(slot);
                }
            }
        }
        unreachable!("every pin of an added element lies in exactly one net");
    }

    /// Net registered under `name`, creating an empty named net on first
    /// use. This is how user-declared nets (e.g. `"gnd"`) enter the
    /// partition before any pin connects to them.
    pub fn net_of_name(&mut self, name: &str) -> NetId {
        if let Some(&slot) = self.net_names.get(name) {
            return NetId(slot);
        }
        let slot = self.push_net(Vec::new());
        self.net_names.insert(name.to_owned(), slot);
        NetId(slot)
    }

    /// Entries of a net, or `None` for a handle whose net has since been
    /// merged away.
    #[must_use]
    pub fn net(&self, id: NetId) -> Option<&[(usize, Polarity)]> {
        self.nets.get(id.0).and_then(|net| net.as_deref())
    }

    /// Connects the given endpoints into a single net.
    ///
    /// Endpoints are resolved in order and deduplicated; every net after the
    /// first is folded into the first. The first net's identity survives,
    /// and name bindings of the folded nets are rewritten to it.
    pub fn connect<I>(&mut self, endpoints: I)
    where
        I: IntoIterator<Item = Connector>,
    {
        let mut resolved: Vec<usize> = Vec::new();
        for endpoint in endpoints {
            let NetId(slot) = match endpoint {
                Connector::Pin(pin) => self.net_of_pin(&pin),
                Connector::Net(name) => self.net_of_name(&name),
            };
            if !resolved.contains(&slot) {
                resolved.push(slot);
            }
        }
        let Some((&survivor, merged)) = resolved.split_first() else {
            return;
        };
        for &victim in merged {
            if let Some(entries) = self.nets[victim].take() {
                if let Some(target) = self.nets[survivor].as_mut() {
                    target.extend(entries);
                }
                for slot in self.net_names.values_mut() {
                    if *slot == victim {
                        *slot = survivor;
                    }
                }
            }
        }
    }

    fn offset_of(&self, element: &Arc<Element>) -> Option<usize> {
        let mut offset = 0;
        for present in &self.elements {
            if Arc::ptr_eq(present, element) {
                return Some(offset);
            }
            offset += present.nb();
        }
        None
    }

    /// Adds the element if absent; returns its global branch offset.
    fn ensure_added(&mut self, element: &Arc<Element>) -> usize {
        if let Some(offset) = self.offset_of(element) {
            return offset;
        }
        let offset = self.nb();
        self.elements.push(Arc::clone(element));
        let pins: &PinMap = element.pins();
        for (_, branches) in pins {
            let net = branches
                .iter()
                .map(|&(branch, polarity)| (offset + branch, polarity))
                .collect();
            self.push_net(net);
        }
        offset
    }

    fn push_net(&mut self, net: Vec<(usize, Polarity)>) -> usize {
        self.nets.push(Some(net));
        self.nets.len() - 1
    }
}

/// Whole-circuit dimension and matrix aggregates.
impl Circuit {
    /// Total branch count.
    #[must_use]
    pub fn nb(&self) -> usize {
        self.elements.iter().map(|element| element.nb()).sum()
    }

    /// Total state count.
    #[must_use]
    pub fn nx(&self) -> usize {
        self.elements.iter().map(|element| element.nx()).sum()
    }

    /// Total nonlinear-variable count.
    #[must_use]
    pub fn nq(&self) -> usize {
        self.elements.iter().map(|element| element.nq()).sum()
    }

    /// Total input count.
    #[must_use]
    pub fn nu(&self) -> usize {
        self.elements.iter().map(|element| element.nu()).sum()
    }

    /// Total linear-equation count.
    #[must_use]
    pub fn nl(&self) -> usize {
        self.elements.iter().map(|element| element.nl()).sum()
    }

    /// Total output count.
    #[must_use]
    pub fn ny(&self) -> usize {
        self.elements.iter().map(|element| element.ny()).sum()
    }

    /// Total nonlinear-equation count.
    #[must_use]
    pub fn nn(&self) -> usize {
        self.elements.iter().map(|element| element.nn()).sum()
    }

    /// Block-diagonal branch-voltage coefficients.
    #[must_use]
    pub fn mv(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.mv()))
    }

    /// Block-diagonal branch-current coefficients.
    #[must_use]
    pub fn mi(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.mi()))
    }

    /// Block-diagonal state coefficients.
    #[must_use]
    pub fn mx(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.mx()))
    }

    /// Block-diagonal state-derivative coefficients.
    #[must_use]
    pub fn mxd(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.mxd()))
    }

    /// Block-diagonal nonlinear-variable coefficients.
    #[must_use]
    pub fn mq(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.mq()))
    }

    /// Block-diagonal input coefficients.
    #[must_use]
    pub fn mu(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.mu()))
    }

    /// Stacked constant column.
    #[must_use]
    pub fn u0(&self) -> CscMatrix<Scalar> {
        sparse::vstack(self.elements.iter().map(|element| element.u0()))
    }

    /// Block-diagonal output projection onto branch voltages.
    #[must_use]
    pub fn pv(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.pv()))
    }

    /// Block-diagonal output projection onto branch currents.
    #[must_use]
    pub fn pi(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.pi()))
    }

    /// Block-diagonal output projection onto states.
    #[must_use]
    pub fn px(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.px()))
    }

    /// Block-diagonal output projection onto state derivatives.
    #[must_use]
    pub fn pxd(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.pxd()))
    }

    /// Block-diagonal output projection onto nonlinear variables.
    #[must_use]
    pub fn pq(&self) -> CscMatrix<Scalar> {
        sparse::block_diag(self.elements.iter().map(|element| element.pq()))
    }

    /// Combined nonlinear equation.
    ///
    /// Per-element equations appear in insertion order, each rewritten to
    /// the global `res`/`J` row numbering and `q` column numbering and
    /// wrapped in its own scope so element-local bindings cannot leak.
    #[must_use]
    pub fn nonlinear_eq(&self) -> Expr {
        let mut row_offset = 0;
        let mut col_offset = 0;
        let mut scopes = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let rewritten =
                expr::offset_nonlinear_refs(element.nonlinear_eq(), row_offset, col_offset);
            scopes.push(Expr::Scope(Box::new(rewritten)));
            row_offset += element.nn();
            col_offset += element.nq();
        }
        Expr::Block(scopes)
    }

    /// Signed net/branch incidence matrix.
    ///
    /// Rows are live nets in creation order, columns are global branches;
    /// an entry is the polarity of the branch end in that net. Entries that
    /// cancel (both ends of a branch merged into one net) are removed
    /// structurally.
    #[must_use]
    pub fn incidence(&self) -> CscMatrix<i32> {
        let live: Vec<&Vec<(usize, Polarity)>> = self.nets.iter().flatten().collect();
        let mut coo = CooMatrix::new(live.len(), self.nb());
        for (row, net) in live.iter().enumerate() {
            for &(branch, polarity) in net.iter() {
                coo.push(row, branch, polarity.sign());
            }
        }
        sparse::prune_zeros(&CscMatrix::from(&coo))
    }

    /// Tie and cutset matrices of the circuit, `(tv, ti)`.
    ///
    /// # Errors
    ///
    /// Propagates the incidence contract violations of
    /// [`topo::topomat`]; these indicate a malformed circuit (a branch in
    /// more than two nets).
    pub fn topomat(&self) -> Result<(CscMatrix<i32>, CscMatrix<i32>)> {
        topo::topomat(&self.incidence())
    }
}
