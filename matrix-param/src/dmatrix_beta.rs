use crate::dims::*;
use crate::error::DistributionError;
use crate::numerics::*;
use crate::traits::*;

/// Independent Beta(a, b) entries
#[derive(Clone, Debug)]
pub struct BetaMatrix {
    dim: Dim,
    ///////////////////////////
    // sufficient statistics //
    ///////////////////////////
    a_stat: Mat,
    b_stat: Mat,
    //////////////////////////
    // estimated parameters //
    //////////////////////////
    estimated_mean: Mat,
    estimated_log_mean: Mat,
    estimated_log_mean_inv: Mat,
}

impl BetaMatrix {
    pub fn new(dim: Dim, a: Mat, b: Mat) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        let mut ret = Self {
            dim,
            a_stat: Mat::from_element(nn, kk, 1.),
            b_stat: Mat::from_element(nn, kk, 1.),
            estimated_mean: Mat::zeros(nn, kk),
            estimated_log_mean: Mat::zeros(nn, kk),
            estimated_log_mean_inv: Mat::zeros(nn, kk),
        };
        ret.set_params(a, b)?;
        ret.calibrate()?;
        Ok(ret)
    }

    pub fn set_params(&mut self, a: Mat, b: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "a", &self.dim, &a)?;
        check_shape(self.family(), "b", &self.dim, &b)?;
        check_positive(self.family(), "a", &a)?;
        check_positive(self.family(), "b", &b)?;
        self.a_stat = a;
        self.b_stat = b;
        Ok(())
    }

    /// `E[ln x]`
    pub fn log_mean(&self) -> &Mat {
        &self.estimated_log_mean
    }

    /// `E[ln (1 - x)]`
    pub fn log_mean_inv(&self) -> &Mat {
        &self.estimated_log_mean_inv
    }
}

impl TwoStatParam for BetaMatrix {
    type Mat = Mat;
    type Scalar = f64;

    fn new_const(dim: Dim, a: f64, b: f64) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        Self::new(
            dim,
            Mat::from_element(nn, kk, a),
            Mat::from_element(nn, kk, b),
        )
    }

    fn stat_a(&self) -> &Mat {
        &self.a_stat
    }

    fn stat_b(&self) -> &Mat {
        &self.b_stat
    }

    fn update_stat(&mut self, prior: &Self, add_a: &Mat, add_b: &Mat) -> Result<(), DistributionError> {
        self.set_params(&prior.a_stat + add_a, &prior.b_stat + add_b)
    }

    fn reset_stat(&mut self, prior: &Self) {
        self.a_stat.copy_from(&prior.a_stat);
        self.b_stat.copy_from(&prior.b_stat);
    }

    fn calibrate(&mut self) -> Result<(), DistributionError> {
        self.estimated_mean = self.a_stat.zip_map(&self.b_stat, |a, b| a / (a + b));
        self.estimated_log_mean = self
            .a_stat
            .zip_map(&self.b_stat, |a, b| digamma(a) - digamma(a + b));
        self.estimated_log_mean_inv = self
            .a_stat
            .zip_map(&self.b_stat, |a, b| digamma(b) - digamma(a + b));
        Ok(())
    }
}

impl HasParams for BetaMatrix {
    fn parameters(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("a", ParamValue::Matrix(self.a_stat.clone()));
        ret.insert("b", ParamValue::Matrix(self.b_stat.clone()));
        ret
    }
}

impl HasMoments for BetaMatrix {
    fn expectation(&self) -> &Mat {
        &self.estimated_mean
    }

    fn expectations(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.estimated_mean.clone()));
        ret.insert("lnE", ParamValue::Matrix(self.estimated_log_mean.clone()));
        ret.insert(
            "lnEInv",
            ParamValue::Matrix(self.estimated_log_mean_inv.clone()),
        );
        ret
    }
}

impl Distribution for BetaMatrix {
    fn family(&self) -> Family {
        Family::Beta
    }

    fn dim(&self) -> &Dim {
        &self.dim
    }

    fn update_expectations(&mut self) -> Result<(), DistributionError> {
        self.calibrate()
    }

    fn override_expectation(&mut self, name: &str, value: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "E", &self.dim, &value)?;
        match name {
            "E" => {
                check_probability(self.family(), "E", &value)?;
                self.estimated_mean = value;
            }
            "lnE" => {
                check_finite(self.family(), "lnE", &value)?;
                self.estimated_log_mean = value;
            }
            "lnEInv" => {
                check_finite(self.family(), "lnEInv", &value)?;
                self.estimated_log_mean_inv = value;
            }
            _ => return Err(unknown_moment(self.family(), name)),
        }
        Ok(())
    }

    fn drop_factors(&mut self, keep: &[usize]) -> Result<(), DistributionError> {
        let Some(axis) = self.dim.factor_axis() else {
            return Ok(());
        };
        check_keep(self.family(), keep, self.dim.num_factors().unwrap_or(0))?;
        self.a_stat = select_along(&self.a_stat, axis, keep);
        self.b_stat = select_along(&self.b_stat, axis, keep);
        self.estimated_mean = select_along(&self.estimated_mean, axis, keep);
        self.estimated_log_mean = select_along(&self.estimated_log_mean, axis, keep);
        self.estimated_log_mean_inv = select_along(&self.estimated_log_mean_inv, axis, keep);
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }

    fn entropy(&self) -> f64 {
        self.a_stat
            .iter()
            .zip(self.b_stat.iter())
            .map(|(&a, &b)| {
                ln_beta(a, b) - (a - 1.) * digamma(a) - (b - 1.) * digamma(b)
                    + (a + b - 2.) * digamma(a + b)
            })
            .sum()
    }

    fn kl_divergence(&self, prior: &Self) -> f64 {
        let cross: f64 = self
            .estimated_log_mean
            .iter()
            .zip(self.estimated_log_mean_inv.iter())
            .zip(prior.a_stat.iter().zip(prior.b_stat.iter()))
            .map(|((&ln_e, &ln_e_inv), (&a0, &b0))| {
                (a0 - 1.) * ln_e + (b0 - 1.) * ln_e_inv - ln_beta(a0, b0)
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
    fn uniform_moments() -> anyhow::Result<()> {
        let q = BetaMatrix::new_const(Dim::per_factor(2), 1., 1.)?;
        assert_abs_diff_eq!(q.expectation()[(0, 0)], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(q.log_mean()[(0, 1)], -1., epsilon = 1e-10);
        assert_abs_diff_eq!(q.log_mean_inv()[(0, 1)], -1., epsilon = 1e-10);
        assert_abs_diff_eq!(q.entropy(), 0., epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn kl_matches_closed_form() -> anyhow::Result<()> {
        let dim = Dim::per_factor(1);
        let (a, b, a0, b0) = (3., 2., 1.5, 4.);
        let q = BetaMatrix::new_const(dim, a, b)?;
        let p = BetaMatrix::new_const(dim, a0, b0)?;
        let expected = ln_beta(a0, b0) - ln_beta(a, b)
            + (a - a0) * digamma(a)
            + (b - b0) * digamma(b)
            + (a0 - a + b0 - b) * digamma(a + b);
        assert_abs_diff_eq!(q.kl_divergence(&p), expected, epsilon = 1e-10);
        Ok(())
    }
}
