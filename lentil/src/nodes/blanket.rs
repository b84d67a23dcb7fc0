//! Markov blankets: the collaborators each node family reads, as
//! typed borrowed slots.

use crate::common::*;
use crate::nodes::*;
use matrix_param::dmatrix_bernoulli_gaussian::BernoulliGaussianMatrix;

/// What one view contributes to the update of `Z`
pub struct ViewTerms<'a> {
    /// the data the loadings explain (pseudo-data for non-gaussian
    /// views); NaN is missing
    pub y: &'a Mat,
    pub sw: &'a BernoulliGaussianMatrix,
    /// `E[tau]`, `1 x D`
    pub tau: &'a Mat,
}

pub struct ZBlanket<'a> {
    pub views: Vec<ViewTerms<'a>>,
}

pub struct SwBlanket<'a> {
    pub y: &'a ObservedView,
    pub z: &'a FactorNode,
    pub tau: &'a TauNode,
    pub alpha: &'a AlphaNode,
    pub theta: &'a ThetaNode,
}

pub struct AlphaBlanket<'a> {
    pub sw: &'a SpikeSlabNode,
}

pub struct TauBlanket<'a> {
    pub y: &'a ObservedView,
    pub z: &'a FactorNode,
    pub sw: &'a SpikeSlabNode,
}

pub struct ThetaBlanket<'a> {
    pub sw: &'a SpikeSlabNode,
}

pub struct YBlanket<'a> {
    pub z: &'a FactorNode,
    pub sw: &'a SpikeSlabNode,
    pub tau: &'a TauNode,
}
