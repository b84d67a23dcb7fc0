use crate::dims::*;
use crate::error::DistributionError;
use crate::numerics::*;
use crate::traits::*;

/// Independent Gamma(shape, rate) entries
#[derive(Clone, Debug)]
pub struct GammaMatrix {
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
}

impl GammaMatrix {
    pub fn new(dim: Dim, shape: Mat, rate: Mat) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        let mut ret = Self {
            dim,
            a_stat: Mat::from_element(nn, kk, 1.),
            b_stat: Mat::from_element(nn, kk, 1.),
            estimated_mean: Mat::zeros(nn, kk),
            estimated_log_mean: Mat::zeros(nn, kk),
        };
        ret.set_params(shape, rate)?;
        ret.calibrate()?;
        Ok(ret)
    }

    pub fn set_params(&mut self, shape: Mat, rate: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "shape", &self.dim, &shape)?;
        check_shape(self.family(), "rate", &self.dim, &rate)?;
        check_positive(self.family(), "shape", &shape)?;
        check_positive(self.family(), "rate", &rate)?;
        self.a_stat = shape;
        self.b_stat = rate;
        Ok(())
    }

    /// `E[ln x]`
    pub fn log_mean(&self) -> &Mat {
        &self.estimated_log_mean
    }
}

impl TwoStatParam for GammaMatrix {
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
        self.estimated_mean = self.a_stat.zip_map(&self.b_stat, |a, b| a / floor_rate(b));
        self.estimated_log_mean = self
            .a_stat
            .zip_map(&self.b_stat, |a, b| digamma(a) - floor_rate(b).ln());
        Ok(())
    }
}

impl HasParams for GammaMatrix {
    fn parameters(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("shape", ParamValue::Matrix(self.a_stat.clone()));
        ret.insert("rate", ParamValue::Matrix(self.b_stat.clone()));
        ret
    }
}

impl HasMoments for GammaMatrix {
    fn expectation(&self) -> &Mat {
        &self.estimated_mean
    }

    fn expectations(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.estimated_mean.clone()));
        ret.insert("lnE", ParamValue::Matrix(self.estimated_log_mean.clone()));
        ret
    }
}

impl Distribution for GammaMatrix {
    fn family(&self) -> Family {
        Family::Gamma
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
                check_positive(self.family(), "E", &value)?;
                self.estimated_mean = value;
            }
            "lnE" => {
                check_finite(self.family(), "lnE", &value)?;
                self.estimated_log_mean = value;
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
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }

    fn entropy(&self) -> f64 {
        self.a_stat
            .iter()
            .zip(self.b_stat.iter())
            .map(|(&a, &b)| a - floor_rate(b).ln() + ln_gamma(a) + (1. - a) * digamma(a))
            .sum()
    }

    fn kl_divergence(&self, prior: &Self) -> f64 {
        let cross: f64 = self
            .estimated_mean
            .iter()
            .zip(self.estimated_log_mean.iter())
            .zip(prior.a_stat.iter().zip(prior.b_stat.iter()))
            .map(|((&e, &ln_e), (&a0, &b0))| {
                a0 * floor_rate(b0).ln() - ln_gamma(a0) + (a0 - 1.) * ln_e - b0 * e
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
    fn kl_matches_closed_form() -> anyhow::Result<()> {
        let dim = Dim::per_factor(1);
        let (a, b, a0, b0) = (3.5_f64, 2.0_f64, 1.0_f64, 0.5_f64);
        let q = GammaMatrix::new_const(dim, a, b)?;
        let p = GammaMatrix::new_const(dim, a0, b0)?;
        let expected = (a - a0) * digamma(a) - ln_gamma(a) + ln_gamma(a0) + a0 * (b / b0).ln()
            + a * (b0 - b) / b;
        assert_abs_diff_eq!(q.kl_divergence(&p), expected, epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn update_stat_adds_to_prior() -> anyhow::Result<()> {
        let dim = Dim::per_feature(3);
        let prior = GammaMatrix::new_const(dim, 1e-3, 1e-3)?;
        let mut q = prior.clone();
        let add_a = Mat::from_element(1, 3, 5.);
        let add_b = Mat::from_row_slice(1, 3, &[1., 2., 4.]);
        q.update_stat(&prior, &add_a, &add_b)?;
        q.calibrate()?;
        assert_abs_diff_eq!(q.stat_a()[(0, 2)], 5.001, epsilon = 1e-12);
        assert_abs_diff_eq!(q.expectation()[(0, 1)], 5.001 / 2.001, epsilon = 1e-12);
        q.reset_stat(&prior);
        assert_abs_diff_eq!(q.stat_b()[(0, 2)], 1e-3, epsilon = 1e-15);
        Ok(())
    }

    #[test]
    fn vague_rates_keep_the_closed_form_moments() -> anyhow::Result<()> {
        let dim = Dim::per_factor(2);
        let p = GammaMatrix::new_const(dim, 1e-14, 1e-14)?;
        approx::assert_relative_eq!(p.expectation()[(0, 1)], 1., max_relative = 1e-12);
        approx::assert_relative_eq!(
            p.log_mean()[(0, 0)],
            digamma(1e-14) - 1e-14_f64.ln(),
            max_relative = 1e-12
        );
        Ok(())
    }
}
