//! Variational nodes.
//!
//! A node pairs a prior `P` with a variational posterior `Q` (or
//! holds a constant) and is accessed through four capabilities:
//! `HasParameters`, `HasExpectations`, `ContributesElbo` and
//! `Updatable`. Node families that come in several flavours (`Z`,
//! `Tau`, `Theta`) are enums dispatched on their variant.
//!
//! Markov blankets are plain structs of borrowed collaborators, built
//! by the network right before an update or an ELBO evaluation.

pub mod alpha;
pub mod blanket;
pub mod constant;
pub mod factor;
pub mod observed;
pub mod spike_slab;
pub mod tau;
pub mod theta;
pub mod unobserved;

pub use alpha::AlphaNode;
pub use blanket::*;
pub use constant::ConstantNode;
pub use factor::FactorNode;
pub use observed::ObservedView;
pub use spike_slab::SpikeSlabNode;
pub use tau::TauNode;
pub use theta::ThetaNode;
pub use unobserved::Unobserved;

use crate::common::*;

/// Which distribution of a node to read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dist {
    P,
    Q,
}

/// Name and dimension: the structure shared by every node
pub trait Node {
    fn name(&self) -> &str;
    fn dim(&self) -> Dim;
}

pub trait HasParameters {
    fn parameters(&self, dist: Dist) -> ParamMap;
}

/// Side-effect-free reads of cached moments
pub trait HasExpectations {
    /// first moment `E`
    fn expectation(&self, dist: Dist) -> &Mat;
    fn expectations(&self, dist: Dist) -> ParamMap;
}

pub trait ContributesElbo: Node {
    /// Collaborators whose current expectations the node reads
    type Blanket<'a>;

    /// This node's term of the lower bound; zero unless overridden
    fn calculate_elbo(&self, _blanket: &Self::Blanket<'_>) -> f64 {
        0.
    }
}

pub trait Updatable: ContributesElbo {
    /// Coordinate-ascent update of `Q` given the blanket
    fn update_parameters(&mut self, blanket: &Self::Blanket<'_>) -> NodeResult<()>;

    /// Refresh the cached moments of `Q`
    fn update_expectations(&mut self) -> NodeResult<()>;

    fn update(&mut self, blanket: &Self::Blanket<'_>) -> NodeResult<()> {
        self.update_parameters(blanket)?;
        self.update_expectations()
    }
}

/// A borrowed node of any kind, for generic traversal (export,
/// invariant checks)
#[derive(Clone, Copy)]
pub enum NodeRef<'a> {
    Observed(&'a ObservedView),
    Factor(&'a FactorNode),
    SpikeSlab(&'a SpikeSlabNode),
    Alpha(&'a AlphaNode),
    Tau(&'a TauNode),
    Theta(&'a ThetaNode),
}

impl<'a> NodeRef<'a> {
    pub fn name(&self) -> &'a str {
        match *self {
            NodeRef::Observed(x) => x.name(),
            NodeRef::Factor(x) => x.name(),
            NodeRef::SpikeSlab(x) => x.name(),
            NodeRef::Alpha(x) => x.name(),
            NodeRef::Tau(x) => x.name(),
            NodeRef::Theta(x) => x.name(),
        }
    }

    pub fn dim(&self) -> Dim {
        match *self {
            NodeRef::Observed(x) => x.dim(),
            NodeRef::Factor(x) => x.dim(),
            NodeRef::SpikeSlab(x) => x.dim(),
            NodeRef::Alpha(x) => x.dim(),
            NodeRef::Tau(x) => x.dim(),
            NodeRef::Theta(x) => x.dim(),
        }
    }

    /// Family of `Q`; `None` for constants
    pub fn family(&self) -> Option<Family> {
        match *self {
            NodeRef::Observed(_) => None,
            NodeRef::Factor(x) => Some(x.family()),
            NodeRef::SpikeSlab(_) => Some(Family::BernoulliGaussian),
            NodeRef::Alpha(_) => Some(Family::Gamma),
            NodeRef::Tau(x) => x.is_learned().then_some(Family::Gamma),
            NodeRef::Theta(x) => x.is_learned().then_some(Family::Beta),
        }
    }

    pub fn parameters(&self, dist: Dist) -> ParamMap {
        match *self {
            NodeRef::Observed(x) => x.parameters(dist),
            NodeRef::Factor(x) => x.parameters(dist),
            NodeRef::SpikeSlab(x) => x.parameters(dist),
            NodeRef::Alpha(x) => x.parameters(dist),
            NodeRef::Tau(x) => x.parameters(dist),
            NodeRef::Theta(x) => x.parameters(dist),
        }
    }

    pub fn expectation(&self, dist: Dist) -> &'a Mat {
        match *self {
            NodeRef::Observed(x) => x.expectation(dist),
            NodeRef::Factor(x) => x.expectation(dist),
            NodeRef::SpikeSlab(x) => x.expectation(dist),
            NodeRef::Alpha(x) => x.expectation(dist),
            NodeRef::Tau(x) => x.expectation(dist),
            NodeRef::Theta(x) => x.expectation(dist),
        }
    }

    pub fn expectations(&self, dist: Dist) -> ParamMap {
        match *self {
            NodeRef::Observed(x) => x.expectations(dist),
            NodeRef::Factor(x) => x.expectations(dist),
            NodeRef::SpikeSlab(x) => x.expectations(dist),
            NodeRef::Alpha(x) => x.expectations(dist),
            NodeRef::Tau(x) => x.expectations(dist),
            NodeRef::Theta(x) => x.expectations(dist),
        }
    }
}
