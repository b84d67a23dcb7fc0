use crate::dims::*;
use crate::error::DistributionError;
use crate::numerics::*;
use crate::traits::*;

/// Independent univariate Gaussians, one per entry
#[derive(Clone, Debug)]
pub struct GaussianMatrix {
    dim: Dim,
    ////////////////
    // parameters //
    ////////////////
    mean: Mat,
    var: Mat,
    //////////////////
    // expectations //
    //////////////////
    estimated_mean: Mat,
    estimated_second: Mat,
}

impl GaussianMatrix {
    pub fn new(dim: Dim, mean: Mat, var: Mat) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        let mut ret = Self {
            dim,
            mean: Mat::zeros(nn, kk),
            var: Mat::from_element(nn, kk, 1.),
            estimated_mean: Mat::zeros(nn, kk),
            estimated_second: Mat::zeros(nn, kk),
        };
        ret.set_params(mean, var)?;
        ret.update_expectations()?;
        Ok(ret)
    }

    /// Every entry `N(mean, var)`
    pub fn new_const(dim: Dim, mean: f64, var: f64) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        Self::new(
            dim,
            Mat::from_element(nn, kk, mean),
            Mat::from_element(nn, kk, var),
        )
    }

    pub fn mean(&self) -> &Mat {
        &self.mean
    }

    pub fn var(&self) -> &Mat {
        &self.var
    }

    /// `E[x^2]`
    pub fn second_moment(&self) -> &Mat {
        &self.estimated_second
    }

    /// Replace both parameters; expectations are stale until
    /// `update_expectations`
    pub fn set_params(&mut self, mean: Mat, var: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "mean", &self.dim, &mean)?;
        check_shape(self.family(), "var", &self.dim, &var)?;
        check_finite(self.family(), "mean", &mean)?;
        check_positive(self.family(), "var", &var)?;
        self.mean = mean;
        self.var = var;
        Ok(())
    }

    /// Set a single entry; expectations are stale until
    /// `update_expectations`
    pub fn set_entry(
        &mut self,
        i: usize,
        j: usize,
        mean: f64,
        var: f64,
    ) -> Result<(), DistributionError> {
        if !mean.is_finite() || !var.is_finite() || var <= 0. {
            return Err(DistributionError::InvalidParameter {
                family: self.family(),
                name: "var",
                detail: format!("({}, {}) = N({}, {})", i, j, mean, var),
            });
        }
        self.mean[(i, j)] = mean;
        self.var[(i, j)] = var;
        Ok(())
    }
}

impl HasParams for GaussianMatrix {
    fn parameters(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("mean", ParamValue::Matrix(self.mean.clone()));
        ret.insert("var", ParamValue::Matrix(self.var.clone()));
        ret
    }
}

impl HasMoments for GaussianMatrix {
    fn expectation(&self) -> &Mat {
        &self.estimated_mean
    }

    fn expectations(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.estimated_mean.clone()));
        ret.insert("E2", ParamValue::Matrix(self.estimated_second.clone()));
        ret
    }
}

impl Distribution for GaussianMatrix {
    fn family(&self) -> Family {
        Family::Gaussian
    }

    fn dim(&self) -> &Dim {
        &self.dim
    }

    fn update_expectations(&mut self) -> Result<(), DistributionError> {
        self.estimated_mean = self.mean.clone();
        self.estimated_second = self.mean.zip_map(&self.var, |m, v| m * m + v);
        Ok(())
    }

    fn override_expectation(&mut self, name: &str, value: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "E", &self.dim, &value)?;
        check_finite(self.family(), "E", &value)?;
        match name {
            "E" => {
                // keep the variance part of the second moment
                self.estimated_second = value.zip_map(&self.var, |m, v| m * m + v);
                self.estimated_mean = value;
            }
            "E2" => self.estimated_second = value,
            _ => return Err(unknown_moment(self.family(), name)),
        }
        Ok(())
    }

    fn drop_factors(&mut self, keep: &[usize]) -> Result<(), DistributionError> {
        let Some(axis) = self.dim.factor_axis() else {
            return Ok(());
        };
        check_keep(self.family(), keep, self.dim.num_factors().unwrap_or(0))?;
        self.mean = select_along(&self.mean, axis, keep);
        self.var = select_along(&self.var, axis, keep);
        self.estimated_mean = select_along(&self.estimated_mean, axis, keep);
        self.estimated_second = select_along(&self.estimated_second, axis, keep);
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }

    fn entropy(&self) -> f64 {
        self.var.iter().map(|&v| gaussian_entropy(v)).sum()
    }

    fn kl_divergence(&self, prior: &Self) -> f64 {
        // KL = E_q[ln q] - E_q[ln p], with E_q[(x - m0)^2] from the
        // cached moments
        let cross: f64 = self
            .estimated_mean
            .iter()
            .zip(self.estimated_second.iter())
            .zip(prior.mean.iter().zip(prior.var.iter()))
            .map(|((&e, &e2), (&m0, &v0))| {
                let v0 = floor_var(v0);
                -0.5 * (LN_2PI + v0.ln()) - 0.5 * (e2 - 2. * e * m0 + m0 * m0) / v0
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
    fn kl_to_itself_is_zero() -> anyhow::Result<()> {
        let dim = Dim::samples_factors(3, 2);
        let q = GaussianMatrix::new(
            dim,
            Mat::from_row_slice(3, 2, &[0.1, -1., 2., 0.5, 0., 3.]),
            Mat::from_row_slice(3, 2, &[1., 0.2, 0.5, 2., 1., 0.1]),
        )?;
        assert_abs_diff_eq!(q.kl_divergence(&q.clone()), 0., epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn kl_matches_closed_form() -> anyhow::Result<()> {
        let dim = Dim::per_factor(1);
        let q = GaussianMatrix::new_const(dim, 1., 0.5)?;
        let p = GaussianMatrix::new_const(dim, 0., 2.)?;
        let expected = 0.5 * ((2f64 / 0.5).ln() + (0.5 + 1.) / 2. - 1.);
        assert_abs_diff_eq!(q.kl_divergence(&p), expected, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn rejects_non_positive_variance() {
        let dim = Dim::per_factor(2);
        let ret = GaussianMatrix::new(dim, Mat::zeros(1, 2), Mat::from_element(1, 2, 0.));
        assert!(matches!(
            ret,
            Err(DistributionError::InvalidParameter { name: "var", .. })
        ));
    }
}
