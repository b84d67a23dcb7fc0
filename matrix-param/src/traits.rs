use crate::dims::Dim;
use crate::error::DistributionError;
use nalgebra::DMatrix;
use serde::Serialize;
use std::collections::BTreeMap;

pub type Mat = DMatrix<f64>;

/// Distribution families a parameter matrix can belong to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Family {
    Gaussian,
    MultivariateGaussian,
    Gamma,
    Bernoulli,
    Beta,
    BernoulliGaussian,
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Family::Gaussian => "Gaussian",
            Family::MultivariateGaussian => "MultivariateGaussian",
            Family::Gamma => "Gamma",
            Family::Bernoulli => "Bernoulli",
            Family::Beta => "Beta",
            Family::BernoulliGaussian => "BernoulliGaussian",
        };
        write!(f, "{}", name)
    }
}

/// A named parameter or moment: either one matrix or a stack of
/// matrices (one covariance per sample)
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Matrix(Mat),
    Matrices(Vec<Mat>),
}

impl ParamValue {
    pub fn as_matrix(&self) -> Option<&Mat> {
        match self {
            ParamValue::Matrix(x) => Some(x),
            ParamValue::Matrices(_) => None,
        }
    }
}

/// name -> value, ordered by name
pub type ParamMap = BTreeMap<&'static str, ParamValue>;

/// Read-only access to the parameters of a distribution
pub trait HasParams {
    fn parameters(&self) -> ParamMap;
}

/// Read-only access to the cached moments of a distribution. Reads
/// never trigger recomputation.
pub trait HasMoments {
    /// The first moment `E`
    fn expectation(&self) -> &Mat;

    /// Every moment the family defines
    fn expectations(&self) -> ParamMap;
}

/// A parametric distribution over a matrix-shaped variable with
/// cached expectations
pub trait Distribution: HasParams + HasMoments + Clone + std::fmt::Debug {
    fn family(&self) -> Family;

    fn dim(&self) -> &Dim;

    /// Recompute every moment from the current parameters. Calling
    /// it twice without a parameter change gives identical moments.
    fn update_expectations(&mut self) -> Result<(), DistributionError>;

    /// Replace the cached moment `name` without touching the
    /// parameters, e.g., to seed a node with symmetry-breaking
    /// expectations. The next `update_expectations` discards it.
    fn override_expectation(&mut self, name: &str, value: Mat) -> Result<(), DistributionError>;

    /// Keep only the `keep` factor indices, in that order. A no-op
    /// for distributions without a factor axis.
    fn drop_factors(&mut self, keep: &[usize]) -> Result<(), DistributionError>;

    /// `-E_q[ln q]`, summed over every entry
    fn entropy(&self) -> f64;

    /// `KL(self || prior)`, summed over every entry, using the cached
    /// moments of `self`
    fn kl_divergence(&self, prior: &Self) -> f64;
}

/// A parameter matrix with two types of statistics `(a, b)`, e.g.,
/// Gamma shape/rate or Beta shape pair, whose conjugate update adds
/// expected sufficient statistics on top of the prior's statistics
pub trait TwoStatParam: Sized {
    type Mat;
    type Scalar;

    /// Every entry set to `(a, b)`
    fn new_const(dim: Dim, a: Self::Scalar, b: Self::Scalar) -> Result<Self, DistributionError>;

    fn stat_a(&self) -> &Self::Mat;
    fn stat_b(&self) -> &Self::Mat;

    /// `a = prior.a + add_a`, `b = prior.b + add_b`
    fn update_stat(
        &mut self,
        prior: &Self,
        add_a: &Self::Mat,
        add_b: &Self::Mat,
    ) -> Result<(), DistributionError>;

    /// `a = prior.a`, `b = prior.b`
    fn reset_stat(&mut self, prior: &Self);

    /// Refresh the cached moments from `(a, b)`
    fn calibrate(&mut self) -> Result<(), DistributionError>;
}

/// Check that `mat` has the shape of `dim`
pub fn check_shape(
    family: Family,
    name: &'static str,
    dim: &Dim,
    mat: &Mat,
) -> Result<(), DistributionError> {
    let expected = dim.shape();
    let found = mat.shape();
    if expected != found {
        return Err(DistributionError::ShapeMismatch {
            family,
            name,
            expected,
            found,
        });
    }
    Ok(())
}

/// Check that every entry of `mat` is finite
pub fn check_finite(family: Family, name: &'static str, mat: &Mat) -> Result<(), DistributionError> {
    if let Some((idx, x)) = mat.iter().enumerate().find(|(_, x)| !x.is_finite()) {
        let (i, j) = (idx % mat.nrows().max(1), idx / mat.nrows().max(1));
        return Err(DistributionError::InvalidParameter {
            family,
            name,
            detail: format!("non-finite value {} at ({}, {})", x, i, j),
        });
    }
    Ok(())
}

/// Check that every entry of `mat` is finite and strictly positive
pub fn check_positive(
    family: Family,
    name: &'static str,
    mat: &Mat,
) -> Result<(), DistributionError> {
    check_finite(family, name, mat)?;
    if let Some(x) = mat.iter().find(|&&x| x <= 0.) {
        return Err(DistributionError::InvalidParameter {
            family,
            name,
            detail: format!("{} is not positive", x),
        });
    }
    Ok(())
}

/// Check that every entry of `mat` is a probability, allowing for
/// round-off of `PROB_TOLERANCE`
pub fn check_probability(
    family: Family,
    name: &'static str,
    mat: &Mat,
) -> Result<(), DistributionError> {
    use crate::numerics::PROB_TOLERANCE;
    check_finite(family, name, mat)?;
    if let Some(x) = mat
        .iter()
        .find(|&&x| !(-PROB_TOLERANCE..=1. + PROB_TOLERANCE).contains(&x))
    {
        return Err(DistributionError::InvalidParameter {
            family,
            name,
            detail: format!("{} is not a probability", x),
        });
    }
    Ok(())
}

/// The error for an unknown moment name
pub fn unknown_moment(family: Family, name: &str) -> DistributionError {
    DistributionError::UnknownMoment {
        family,
        name: name.to_string(),
    }
}

/// Check that every index in `keep` is below `num_factors`
pub fn check_keep(family: Family, keep: &[usize], num_factors: usize) -> Result<(), DistributionError> {
    if let Some(&index) = keep.iter().find(|&&k| k >= num_factors) {
        return Err(DistributionError::FactorOutOfRange {
            family,
            index,
            num_factors,
        });
    }
    Ok(())
}
