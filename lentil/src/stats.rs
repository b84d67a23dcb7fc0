//! Posterior summaries shared by the `Tau` update, the ELBO, the
//! drop rules and the export.

use crate::common::*;
use crate::nodes::FactorNode;
use matrix_param::dmatrix_bernoulli_gaussian::BernoulliGaussianMatrix;
use matrix_util::dmatrix_stat::r_squared;

/// Number of observed entries per feature, `1 x D`
pub fn observed_counts(y: &Mat) -> Mat {
    Mat::from_fn(1, y.ncols(), |_, d| {
        y.column(d).iter().filter(|x| x.is_finite()).count() as f64
    })
}

/// `E[sum_n (y_nd - z_n' sw_d)^2]` over observed entries, `1 x D`
pub fn expected_rss(y: &Mat, z: &FactorNode, sw: &BernoulliGaussianMatrix) -> Mat {
    let ez = z.mean();
    let ez2 = z.second_diag();
    let esw = sw.expectation();
    let esww = sw.sww();
    let (nn, dd) = y.shape();
    let kk = esw.ncols();

    let mut ret = Mat::zeros(1, dd);
    for d in 0..dd {
        let w: DVec = esw.row(d).transpose();
        let w_var = (0..kk)
            .map(|k| esww[(d, k)] - esw[(d, k)] * esw[(d, k)])
            .collect::<Vec<_>>();

        let mut acc = 0.;
        for n in (0..nn).filter(|&n| y[(n, d)].is_finite()) {
            let y_nd = y[(n, d)];
            let fit = (0..kk).map(|k| ez[(n, k)] * w[k]).sum::<f64>();
            let spread = (0..kk).map(|k| w_var[k] * ez2[(n, k)]).sum::<f64>();
            acc += y_nd * y_nd - 2. * y_nd * fit + z.quad_form(n, &w) + spread;
        }
        ret[(0, d)] = acc.max(0.);
    }
    ret
}

/// `E[Z] E[SW]'` restricted to factor `k`
fn rank_one_fit(ez: &Mat, esw: &Mat, k: usize) -> Mat {
    ez.column(k) * esw.column(k).transpose()
}

/// Variance explained by every factor in every view, `M x K`, with
/// `R^2 = 1 - sum (y - z_k w_k')^2 / sum y^2` over observed entries
pub fn r2_per_factor(ys: &[&Mat], z: &FactorNode, sws: &[&BernoulliGaussianMatrix]) -> Mat {
    let ez = z.mean();
    let kk = ez.ncols();
    Mat::from_fn(ys.len(), kk, |m, k| {
        r_squared(ys[m], &rank_one_fit(ez, sws[m].expectation(), k))
    })
}

/// Variance explained by all factors together, one per view
pub fn r2_per_view(ys: &[&Mat], z: &FactorNode, sws: &[&BernoulliGaussianMatrix]) -> Vec<f64> {
    let ez = z.mean();
    ys.iter()
        .zip(sws.iter())
        .map(|(y, sw)| r_squared(y, &(ez * sw.expectation().transpose())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_param::dmatrix_gaussian::GaussianMatrix;

    fn point_mass_z(ez: Mat) -> anyhow::Result<FactorNode> {
        let (nn, kk) = ez.shape();
        let q = GaussianMatrix::new(
            Dim::samples_factors(nn, kk),
            ez,
            Mat::from_element(nn, kk, 1e-12),
        )?;
        Ok(FactorNode::univariate(q.clone(), q)?)
    }

    #[test]
    fn rss_adds_posterior_spread() -> anyhow::Result<()> {
        let z = point_mass_z(Mat::from_row_slice(2, 1, &[1., 2.]))?;
        let sw = BernoulliGaussianMatrix::new_const(Dim::features_factors(1, 1), 1., 1., 0.5, 1.)?;
        let y = Mat::from_row_slice(2, 1, &[1., f64::NAN]);

        // residual zero, spread var(w) * E[z^2] = 0.5
        let rss = expected_rss(&y, &z, &sw);
        approx::assert_abs_diff_eq!(rss[(0, 0)], 0.5, epsilon = 1e-9);
        assert_eq!(observed_counts(&y)[(0, 0)], 1.);
        Ok(())
    }

    #[test]
    fn a_perfect_factor_explains_everything() -> anyhow::Result<()> {
        let z = point_mass_z(Mat::from_row_slice(3, 2, &[1., 0., -1., 0., 2., 0.]))?;
        let sw = BernoulliGaussianMatrix::new_const(Dim::features_factors(2, 2), 1., 1., 1e-9, 1.)?;
        let y = z.mean() * sw.expectation().transpose();

        let r2 = r2_per_factor(&[&y], &z, &[&sw]);
        approx::assert_abs_diff_eq!(r2[(0, 0)], 1., epsilon = 1e-9);
        approx::assert_abs_diff_eq!(r2[(0, 1)], 0., epsilon = 1e-9);
        approx::assert_abs_diff_eq!(r2_per_view(&[&y], &z, &[&sw])[0], 1., epsilon = 1e-9);
        Ok(())
    }
}
