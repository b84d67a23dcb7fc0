use crate::traits::Family;

/// Errors raised by parameter matrices
#[derive(Debug, Clone, thiserror::Error)]
pub enum DistributionError {
    /// A parameter (or expectation override) does not have the shape
    /// implied by the declared dimension
    #[error("{family}: `{name}` has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        family: Family,
        name: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A parameter is not finite or lies outside the family's domain
    #[error("{family}: `{name}` is invalid: {detail}")]
    InvalidParameter {
        family: Family,
        name: &'static str,
        detail: String,
    },

    /// An expectation override named a moment the family does not have
    #[error("{family}: no moment called `{name}`")]
    UnknownMoment { family: Family, name: String },

    /// A factor index that does not exist was asked to be kept
    #[error("{family}: factor index {index} is out of range for {num_factors} factors")]
    FactorOutOfRange {
        family: Family,
        index: usize,
        num_factors: usize,
    },
}
