use crate::dims::*;
use crate::error::DistributionError;
use crate::numerics::*;
use crate::traits::*;

/// Independent Bernoulli entries with success probability `theta`
#[derive(Clone, Debug)]
pub struct BernoulliMatrix {
    dim: Dim,
    theta: Mat,
    estimated_mean: Mat,
}

impl BernoulliMatrix {
    pub fn new(dim: Dim, theta: Mat) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        let mut ret = Self {
            dim,
            theta: Mat::from_element(nn, kk, 0.5),
            estimated_mean: Mat::zeros(nn, kk),
        };
        ret.set_theta(theta)?;
        ret.update_expectations()?;
        Ok(ret)
    }

    pub fn new_const(dim: Dim, theta: f64) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        Self::new(dim, Mat::from_element(nn, kk, theta))
    }

    pub fn theta(&self) -> &Mat {
        &self.theta
    }

    /// Probabilities within round-off of `[0, 1]` are clamped onto it
    pub fn set_theta(&mut self, theta: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "theta", &self.dim, &theta)?;
        check_probability(self.family(), "theta", &theta)?;
        self.theta = theta.map(|p| p.clamp(0., 1.));
        Ok(())
    }

    pub fn set_entry(&mut self, i: usize, j: usize, theta: f64) -> Result<(), DistributionError> {
        if !(-PROB_TOLERANCE..=1. + PROB_TOLERANCE).contains(&theta) {
            return Err(DistributionError::InvalidParameter {
                family: self.family(),
                name: "theta",
                detail: format!("({}, {}) = {}", i, j, theta),
            });
        }
        self.theta[(i, j)] = theta.clamp(0., 1.);
        Ok(())
    }
}

impl HasParams for BernoulliMatrix {
    fn parameters(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("theta", ParamValue::Matrix(self.theta.clone()));
        ret
    }
}

impl HasMoments for BernoulliMatrix {
    fn expectation(&self) -> &Mat {
        &self.estimated_mean
    }

    fn expectations(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.estimated_mean.clone()));
        ret
    }
}

impl Distribution for BernoulliMatrix {
    fn family(&self) -> Family {
        Family::Bernoulli
    }

    fn dim(&self) -> &Dim {
        &self.dim
    }

    fn update_expectations(&mut self) -> Result<(), DistributionError> {
        self.estimated_mean = self.theta.clone();
        Ok(())
    }

    fn override_expectation(&mut self, name: &str, value: Mat) -> Result<(), DistributionError> {
        if name != "E" {
            return Err(unknown_moment(self.family(), name));
        }
        check_shape(self.family(), "E", &self.dim, &value)?;
        check_probability(self.family(), "E", &value)?;
        self.estimated_mean = value;
        Ok(())
    }

    fn drop_factors(&mut self, keep: &[usize]) -> Result<(), DistributionError> {
        let Some(axis) = self.dim.factor_axis() else {
            return Ok(());
        };
        check_keep(self.family(), keep, self.dim.num_factors().unwrap_or(0))?;
        self.theta = select_along(&self.theta, axis, keep);
        self.estimated_mean = select_along(&self.estimated_mean, axis, keep);
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }

    fn entropy(&self) -> f64 {
        self.theta.iter().map(|&p| bernoulli_entropy(p)).sum()
    }

    fn kl_divergence(&self, prior: &Self) -> f64 {
        let cross: f64 = self
            .estimated_mean
            .iter()
            .zip(prior.theta.iter())
            .map(|(&e, &p0)| {
                let p0 = clamp_prob(p0);
                e * p0.ln() + (1. - e) * (1. - p0).ln()
            })
            .sum();
        -self.entropy() - cross
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn degenerate_probabilities_have_finite_kl() -> anyhow::Result<()> {
        let dim = Dim::per_factor(3);
        let q = BernoulliMatrix::new(dim, Mat::from_row_slice(1, 3, &[0., 1., 0.5]))?;
        let p = BernoulliMatrix::new(dim, Mat::from_row_slice(1, 3, &[1., 0., 0.5]))?;
        assert!(q.kl_divergence(&p).is_finite());
        assert!(q.entropy().is_finite());
        assert_abs_diff_eq!(q.entropy(), 2f64.ln(), epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn round_off_is_clamped_but_outliers_rejected() -> anyhow::Result<()> {
        let dim = Dim::per_factor(1);
        let q = BernoulliMatrix::new_const(dim, 1. + 1e-12)?;
        assert_eq!(q.theta()[(0, 0)], 1.);
        assert!(BernoulliMatrix::new_const(dim, 1.1).is_err());
        Ok(())
    }
}
