use crate::dims::*;
use crate::error::DistributionError;
use crate::numerics::*;
use crate::traits::*;
use nalgebra::{Cholesky, DVector, Dyn};

/// One multivariate Gaussian per row: row `n` of an `N x K` matrix is
/// `N(mean[n,], cov[n])` with a full `K x K` covariance
#[derive(Clone, Debug)]
pub struct MvGaussianMatrix {
    dim: Dim,
    ////////////////
    // parameters //
    ////////////////
    mean: Mat,
    cov: Vec<Mat>,
    //////////////////
    // expectations //
    //////////////////
    estimated_mean: Mat,
    estimated_second_diag: Mat,
    estimated_second: Vec<Mat>,
}

/// Cholesky factor of a covariance, retried once with a small ridge
pub fn cholesky_with_jitter(cov: &Mat) -> Option<Cholesky<f64, Dyn>> {
    if let Some(chol) = Cholesky::new(cov.clone()) {
        return Some(chol);
    }
    let kk = cov.nrows().max(1);
    let jitter = VAR_FLOOR + cov.trace() / kk as f64 * 1e-8;
    let mut ridge = cov.clone();
    for k in 0..cov.nrows() {
        ridge[(k, k)] += jitter;
    }
    Cholesky::new(ridge)
}

fn ln_det(chol: &Cholesky<f64, Dyn>) -> f64 {
    2. * chol
        .l_dirty()
        .diagonal()
        .iter()
        .map(|&d| floor_var(d).ln())
        .sum::<f64>()
}

impl MvGaussianMatrix {
    /// Every row `N(mean[n,], cov[n])`
    pub fn new(dim: Dim, mean: Mat, cov: Vec<Mat>) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        let mut ret = Self {
            dim,
            mean: Mat::zeros(nn, kk),
            cov: vec![Mat::identity(kk, kk); nn],
            estimated_mean: Mat::zeros(nn, kk),
            estimated_second_diag: Mat::zeros(nn, kk),
            estimated_second: vec![Mat::zeros(kk, kk); nn],
        };
        ret.set_params(mean, cov)?;
        ret.update_expectations()?;
        Ok(ret)
    }

    /// Every row `N(mean * 1, var * I)`
    pub fn new_isotropic(dim: Dim, mean: f64, var: f64) -> Result<Self, DistributionError> {
        let (nn, kk) = dim.shape();
        Self::new(
            dim,
            Mat::from_element(nn, kk, mean),
            vec![Mat::identity(kk, kk) * var; nn],
        )
    }

    pub fn mean(&self) -> &Mat {
        &self.mean
    }

    pub fn cov(&self) -> &[Mat] {
        &self.cov
    }

    /// `E[z_n z_n']` for every row
    pub fn second_moments(&self) -> &[Mat] {
        &self.estimated_second
    }

    /// `E[z_nk^2]` as an `N x K` matrix
    pub fn second_moment_diag(&self) -> &Mat {
        &self.estimated_second_diag
    }

    pub fn set_params(&mut self, mean: Mat, cov: Vec<Mat>) -> Result<(), DistributionError> {
        check_shape(self.family(), "mean", &self.dim, &mean)?;
        check_finite(self.family(), "mean", &mean)?;
        let (nn, kk) = self.dim.shape();
        if cov.len() != nn {
            return Err(DistributionError::ShapeMismatch {
                family: self.family(),
                name: "cov",
                expected: (nn, kk * kk),
                found: (cov.len(), kk * kk),
            });
        }
        for c in cov.iter() {
            self.check_cov(c)?;
        }
        self.mean = mean;
        self.cov = cov;
        Ok(())
    }

    /// Set row `n`; expectations are stale until `update_expectations`
    pub fn set_row(
        &mut self,
        n: usize,
        mean: &DVector<f64>,
        cov: Mat,
    ) -> Result<(), DistributionError> {
        self.check_cov(&cov)?;
        if mean.len() != self.dim.cols.len || mean.iter().any(|x| !x.is_finite()) {
            return Err(DistributionError::InvalidParameter {
                family: self.family(),
                name: "mean",
                detail: format!("row {} is not a finite {}-vector", n, self.dim.cols.len),
            });
        }
        self.mean.row_mut(n).copy_from(&mean.transpose());
        self.cov[n] = cov;
        Ok(())
    }

    fn check_cov(&self, cov: &Mat) -> Result<(), DistributionError> {
        let kk = self.dim.cols.len;
        if cov.shape() != (kk, kk) {
            return Err(DistributionError::ShapeMismatch {
                family: self.family(),
                name: "cov",
                expected: (kk, kk),
                found: cov.shape(),
            });
        }
        check_finite(self.family(), "cov", cov)?;
        if kk > 0 && cholesky_with_jitter(cov).is_none() {
            return Err(DistributionError::InvalidParameter {
                family: self.family(),
                name: "cov",
                detail: "not positive definite".to_string(),
            });
        }
        Ok(())
    }
}

impl HasParams for MvGaussianMatrix {
    fn parameters(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("mean", ParamValue::Matrix(self.mean.clone()));
        ret.insert("cov", ParamValue::Matrices(self.cov.clone()));
        ret
    }
}

impl HasMoments for MvGaussianMatrix {
    fn expectation(&self) -> &Mat {
        &self.estimated_mean
    }

    fn expectations(&self) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.estimated_mean.clone()));
        ret.insert("E2", ParamValue::Matrix(self.estimated_second_diag.clone()));
        ret.insert("EE", ParamValue::Matrices(self.estimated_second.clone()));
        ret
    }
}

impl Distribution for MvGaussianMatrix {
    fn family(&self) -> Family {
        Family::MultivariateGaussian
    }

    fn dim(&self) -> &Dim {
        &self.dim
    }

    fn update_expectations(&mut self) -> Result<(), DistributionError> {
        self.estimated_mean = self.mean.clone();
        self.estimated_second = self
            .cov
            .iter()
            .enumerate()
            .map(|(n, cov)| {
                let m = self.mean.row(n);
                cov + m.transpose() * m
            })
            .collect();
        let (nn, kk) = self.dim.shape();
        self.estimated_second_diag =
            Mat::from_fn(nn, kk, |n, k| self.estimated_second[n][(k, k)]);
        Ok(())
    }

    fn override_expectation(&mut self, name: &str, value: Mat) -> Result<(), DistributionError> {
        if name != "E" {
            return Err(unknown_moment(self.family(), name));
        }
        check_shape(self.family(), "E", &self.dim, &value)?;
        check_finite(self.family(), "E", &value)?;
        for (n, cov) in self.cov.iter().enumerate() {
            let m = value.row(n);
            self.estimated_second[n] = cov + m.transpose() * m;
        }
        let (nn, kk) = self.dim.shape();
        self.estimated_second_diag =
            Mat::from_fn(nn, kk, |n, k| self.estimated_second[n][(k, k)]);
        self.estimated_mean = value;
        Ok(())
    }

    fn drop_factors(&mut self, keep: &[usize]) -> Result<(), DistributionError> {
        check_keep(self.family(), keep, self.dim.cols.len)?;
        let shrink = |x: &Mat| x.select_rows(keep).select_columns(keep);
        self.mean = self.mean.select_columns(keep);
        self.cov = self.cov.iter().map(shrink).collect();
        self.estimated_mean = self.estimated_mean.select_columns(keep);
        self.estimated_second_diag = self.estimated_second_diag.select_columns(keep);
        self.estimated_second = self.estimated_second.iter().map(shrink).collect();
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }

    fn entropy(&self) -> f64 {
        let kk = self.dim.cols.len as f64;
        self.cov
            .iter()
            .map(|cov| {
                let ld = cholesky_with_jitter(cov).map(|c| ln_det(&c)).unwrap_or(0.);
                0.5 * (kk * (LN_2PI + 1.) + ld)
            })
            .sum()
    }

    fn kl_divergence(&self, prior: &Self) -> f64 {
        let kk = self.dim.cols.len;
        let cross: f64 = (0..self.dim.rows.len)
            .map(|n| {
                let Some(chol) = cholesky_with_jitter(&prior.cov[n]) else {
                    return f64::NAN;
                };
                let m0 = prior.mean.row(n).transpose();
                let e = self.estimated_mean.row(n).transpose();
                // E[(z - m0)(z - m0)']
                let centred =
                    &self.estimated_second[n] - &e * m0.transpose() - &m0 * e.transpose()
                        + &m0 * m0.transpose();
                let quad = chol.solve(&centred).trace();
                -0.5 * (kk as f64 * LN_2PI + ln_det(&chol)) - 0.5 * quad
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
    fn second_moment_adds_outer_product() -> anyhow::Result<()> {
        let dim = Dim::samples_factors(1, 2);
        let cov = Mat::from_row_slice(2, 2, &[1., 0.3, 0.3, 2.]);
        let q = MvGaussianMatrix::new(dim, Mat::from_row_slice(1, 2, &[1., -2.]), vec![cov])?;
        let ee = &q.second_moments()[0];
        assert_abs_diff_eq!(ee[(0, 0)], 2., epsilon = 1e-12);
        assert_abs_diff_eq!(ee[(0, 1)], 0.3 - 2., epsilon = 1e-12);
        assert_abs_diff_eq!(ee[(1, 1)], 6., epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn kl_matches_diagonal_case() -> anyhow::Result<()> {
        use crate::dmatrix_gaussian::GaussianMatrix;
        let dim = Dim::samples_factors(2, 3);
        let mean = Mat::from_row_slice(2, 3, &[0.5, -1., 0., 2., 0.1, -0.3]);
        let var = Mat::from_row_slice(2, 3, &[0.5, 1., 2., 0.1, 0.7, 1.5]);
        let q_diag = GaussianMatrix::new(dim, mean.clone(), var.clone())?;
        let p_diag = GaussianMatrix::new_const(dim, 0., 1.)?;

        let cov = (0..2)
            .map(|n| Mat::from_diagonal(&var.row(n).transpose()))
            .collect();
        let q = MvGaussianMatrix::new(dim, mean, cov)?;
        let p = MvGaussianMatrix::new_isotropic(dim, 0., 1.)?;

        assert_abs_diff_eq!(q.entropy(), q_diag.entropy(), epsilon = 1e-10);
        assert_abs_diff_eq!(
            q.kl_divergence(&p),
            q_diag.kl_divergence(&p_diag),
            epsilon = 1e-10
        );
        Ok(())
    }

    #[test]
    fn rejects_indefinite_covariance() {
        let dim = Dim::samples_factors(1, 2);
        let cov = Mat::from_row_slice(2, 2, &[1., 3., 3., 1.]);
        let ret = MvGaussianMatrix::new(dim, Mat::zeros(1, 2), vec![cov]);
        assert!(ret.is_err());
    }
}
