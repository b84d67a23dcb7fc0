use crate::dims::*;
use crate::dmatrix_bernoulli::BernoulliMatrix;
use crate::dmatrix_gaussian::GaussianMatrix;
use crate::error::DistributionError;
use crate::numerics::*;
use crate::traits::*;

/// Spike-and-slab entries `w = s * slab` with
/// `s ~ Bernoulli(theta)`, `w | s = 1 ~ N(mean, var)` and
/// `w | s = 0 ~ N(0, spike_var)`.
///
/// The indicator and the slab are updated jointly, so the parameters
/// are always exposed together and the first moment is the joint
/// `E[s w]`, not the slab mean.
#[derive(Clone, Debug)]
pub struct BernoulliGaussianMatrix {
    dim: Dim,
    ////////////////
    // parameters //
    ////////////////
    indicator: BernoulliMatrix,
    slab: GaussianMatrix,
    spike_var: Mat,
    //////////////////
    // expectations //
    //////////////////
    estimated_s: Mat,
    estimated_w: Mat,
    estimated_sw: Mat,
    estimated_sww: Mat,
    estimated_ww: Mat,
}

impl BernoulliGaussianMatrix {
    pub fn new(
        dim: Dim,
        theta: Mat,
        mean: Mat,
        var: Mat,
        spike_var: Mat,
    ) -> Result<Self, DistributionError> {
        let (dd, kk) = dim.shape();
        let mut ret = Self {
            dim,
            indicator: BernoulliMatrix::new(dim, theta)?,
            slab: GaussianMatrix::new(dim, mean, var)?,
            spike_var: Mat::from_element(dd, kk, 1.),
            estimated_s: Mat::zeros(dd, kk),
            estimated_w: Mat::zeros(dd, kk),
            estimated_sw: Mat::zeros(dd, kk),
            estimated_sww: Mat::zeros(dd, kk),
            estimated_ww: Mat::zeros(dd, kk),
        };
        ret.set_spike_var(spike_var)?;
        ret.update_expectations()?;
        Ok(ret)
    }

    pub fn new_const(
        dim: Dim,
        theta: f64,
        mean: f64,
        var: f64,
        spike_var: f64,
    ) -> Result<Self, DistributionError> {
        let (dd, kk) = dim.shape();
        let fill = |x: f64| Mat::from_element(dd, kk, x);
        Self::new(dim, fill(theta), fill(mean), fill(var), fill(spike_var))
    }

    pub fn theta(&self) -> &Mat {
        self.indicator.theta()
    }

    pub fn mean(&self) -> &Mat {
        self.slab.mean()
    }

    pub fn var(&self) -> &Mat {
        self.slab.var()
    }

    pub fn spike_var(&self) -> &Mat {
        &self.spike_var
    }

    /// `E[s]`
    pub fn prob(&self) -> &Mat {
        &self.estimated_s
    }

    /// `E[s w^2]`
    pub fn sww(&self) -> &Mat {
        &self.estimated_sww
    }

    /// `E[w^2]` marginalised over `s`
    pub fn ww(&self) -> &Mat {
        &self.estimated_ww
    }

    pub fn set_spike_var(&mut self, spike_var: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "spike_var", &self.dim, &spike_var)?;
        check_positive(self.family(), "spike_var", &spike_var)?;
        self.spike_var = spike_var;
        Ok(())
    }

    /// Jointly set the indicator and slab of entry `(i, j)`;
    /// expectations are stale until `update_expectations`
    pub fn set_entry(
        &mut self,
        i: usize,
        j: usize,
        theta: f64,
        mean: f64,
        var: f64,
    ) -> Result<(), DistributionError> {
        self.indicator.set_entry(i, j, theta)?;
        self.slab.set_entry(i, j, mean, var)
    }

    /// Entry `(i, j)` of `E[s w]`, refreshed right away so a sweep
    /// over the entries of a row can read its own updates
    pub fn refresh_entry(&mut self, i: usize, j: usize) {
        let p = self.indicator.theta()[(i, j)];
        let m = self.slab.mean()[(i, j)];
        let v = self.slab.var()[(i, j)];
        let s0 = self.spike_var[(i, j)];
        self.estimated_s[(i, j)] = p;
        self.estimated_sw[(i, j)] = p * m;
        self.estimated_w[(i, j)] = p * m;
        self.estimated_sww[(i, j)] = p * (m * m + v);
        self.estimated_ww[(i, j)] = p * (m * m + v) + (1. - p) * s0;
    }
}

impl HasParams for BernoulliGaussianMatrix {
    fn parameters(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("theta", ParamValue::Matrix(self.theta().clone()));
        ret.insert("mean", ParamValue::Matrix(self.mean().clone()));
        ret.insert("var", ParamValue::Matrix(self.var().clone()));
        ret.insert("spike_var", ParamValue::Matrix(self.spike_var.clone()));
        ret
    }
}

impl HasMoments for BernoulliGaussianMatrix {
    fn expectation(&self) -> &Mat {
        &self.estimated_sw
    }

    fn expectations(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.estimated_sw.clone()));
        ret.insert("ES", ParamValue::Matrix(self.estimated_s.clone()));
        ret.insert("EW", ParamValue::Matrix(self.estimated_w.clone()));
        ret.insert("ESW", ParamValue::Matrix(self.estimated_sw.clone()));
        ret.insert("ESWW", ParamValue::Matrix(self.estimated_sww.clone()));
        ret.insert("EWW", ParamValue::Matrix(self.estimated_ww.clone()));
        ret
    }
}

impl Distribution for BernoulliGaussianMatrix {
    fn family(&self) -> Family {
        Family::BernoulliGaussian
    }

    fn dim(&self) -> &Dim {
        &self.dim
    }

    fn update_expectations(&mut self) -> Result<(), DistributionError> {
        self.indicator.update_expectations()?;
        self.slab.update_expectations()?;

        let p = self.indicator.expectation();
        let m = self.slab.expectation();
        let m2 = self.slab.second_moment();

        self.estimated_s = p.clone();
        self.estimated_sw = p.component_mul(m);
        self.estimated_w = self.estimated_sw.clone();
        self.estimated_sww = p.component_mul(m2);
        self.estimated_ww = &self.estimated_sww
            + p.zip_map(&self.spike_var, |p, s0| (1. - p) * s0);
        Ok(())
    }

    fn override_expectation(&mut self, name: &str, value: Mat) -> Result<(), DistributionError> {
        check_shape(self.family(), "E", &self.dim, &value)?;
        check_finite(self.family(), "E", &value)?;
        match name {
            "E" | "ESW" => {
                self.estimated_w = value.clone();
                self.estimated_sw = value;
            }
            "EW" => self.estimated_w = value,
            "ES" => {
                check_probability(self.family(), "ES", &value)?;
                self.estimated_s = value;
            }
            "ESWW" => self.estimated_sww = value,
            "EWW" => self.estimated_ww = value,
            _ => return Err(unknown_moment(self.family(), name)),
        }
        Ok(())
    }

    fn drop_factors(&mut self, keep: &[usize]) -> Result<(), DistributionError> {
        let Some(axis) = self.dim.factor_axis() else {
            return Ok(());
        };
        check_keep(self.family(), keep, self.dim.num_factors().unwrap_or(0))?;
        self.indicator.drop_factors(keep)?;
        self.slab.drop_factors(keep)?;
        self.spike_var = select_along(&self.spike_var, axis, keep);
        self.estimated_s = select_along(&self.estimated_s, axis, keep);
        self.estimated_w = select_along(&self.estimated_w, axis, keep);
        self.estimated_sw = select_along(&self.estimated_sw, axis, keep);
        self.estimated_sww = select_along(&self.estimated_sww, axis, keep);
        self.estimated_ww = select_along(&self.estimated_ww, axis, keep);
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }

    fn entropy(&self) -> f64 {
        self.theta()
            .iter()
            .zip(self.var().iter())
            .zip(self.spike_var.iter())
            .map(|((&p, &v), &s0)| {
                bernoulli_entropy(p) + p * gaussian_entropy(v) + (1. - p) * gaussian_entropy(s0)
            })
            .sum()
    }

    fn kl_divergence(&self, prior: &Self) -> f64 {
        let (dd, kk) = self.dim.shape();
        let mut cross = 0.;
        for k in 0..kk {
            for d in 0..dd {
                let es = self.estimated_s[(d, k)];
                let esw = self.estimated_sw[(d, k)];
                let esww = self.estimated_sww[(d, k)];
                let eww = self.estimated_ww[(d, k)];

                let p0 = clamp_prob(prior.theta()[(d, k)]);
                let m0 = prior.mean()[(d, k)];
                let v0 = floor_var(prior.var()[(d, k)]);
                let s0 = floor_var(prior.spike_var[(d, k)]);

                cross += es * p0.ln() + (1. - es) * (1. - p0).ln();
                cross += -0.5 * es * (LN_2PI + v0.ln())
                    - 0.5 * (esww - 2. * m0 * esw + es * m0 * m0) / v0;
                cross += -0.5 * (1. - es) * (LN_2PI + s0.ln()) - 0.5 * (eww - esww) / s0;
            }
        }
        -self.entropy() - cross
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn kl_to_itself_is_zero() -> anyhow::Result<()> {
        let dim = Dim::features_factors(2, 2);
        let q = BernoulliGaussianMatrix::new(
            dim,
            Mat::from_row_slice(2, 2, &[0.1, 0.9, 0.5, 0.3]),
            Mat::from_row_slice(2, 2, &[1., -2., 0.3, 0.]),
            Mat::from_row_slice(2, 2, &[0.5, 1., 2., 0.1]),
            Mat::from_element(2, 2, 0.7),
        )?;
        assert_abs_diff_eq!(q.kl_divergence(&q.clone()), 0., epsilon = 1e-10);
        Ok(())
    }

    #[test]
    fn refresh_entry_agrees_with_full_refresh() -> anyhow::Result<()> {
        let dim = Dim::features_factors(2, 3);
        let mut q = BernoulliGaussianMatrix::new_const(dim, 0.5, 0., 1., 1.)?;
        q.set_entry(1, 2, 0.25, 3., 0.5)?;
        q.refresh_entry(1, 2);
        let partial = q.expectations();
        q.update_expectations()?;
        let full = q.expectations();
        for (name, x) in partial.iter() {
            let (Some(x), Some(y)) = (x.as_matrix(), full[name].as_matrix()) else {
                panic!("{} is not a matrix", name);
            };
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(q.ww()[(1, 2)], 0.25 * 9.5 + 0.75, epsilon = 1e-12);
        Ok(())
    }
}
