use crate::common::*;
use crate::error::AtNode;
use crate::nodes::*;
use matrix_param::dmatrix_gaussian::GaussianMatrix;
use matrix_param::dmatrix_mv_gaussian::{cholesky_with_jitter, MvGaussianMatrix};
use matrix_param::numerics::floor_var;

/// The shared latent factors `Z` (`N x K`)
#[derive(Clone, Debug)]
pub enum FactorNode {
    /// mean-field over every entry
    Univariate(Unobserved<GaussianMatrix>),
    /// a full `K x K` covariance per sample
    Multivariate(Unobserved<MvGaussianMatrix>),
}

pub const FACTOR_NODE: &str = "Z";

impl FactorNode {
    pub fn univariate(p: GaussianMatrix, q: GaussianMatrix) -> NodeResult<Self> {
        Ok(FactorNode::Univariate(Unobserved::new(FACTOR_NODE, p, q)?))
    }

    pub fn multivariate(p: MvGaussianMatrix, q: MvGaussianMatrix) -> NodeResult<Self> {
        Ok(FactorNode::Multivariate(Unobserved::new(FACTOR_NODE, p, q)?))
    }

    pub fn family(&self) -> Family {
        match self {
            FactorNode::Univariate(_) => Family::Gaussian,
            FactorNode::Multivariate(_) => Family::MultivariateGaussian,
        }
    }

    pub fn num_samples(&self) -> usize {
        self.dim().rows.len
    }

    pub fn num_factors(&self) -> usize {
        self.dim().cols.len
    }

    /// `E[Z]` under `Q`
    pub fn mean(&self) -> &Mat {
        self.expectation(Dist::Q)
    }

    /// `E[z_nk^2]` under `Q`
    pub fn second_diag(&self) -> &Mat {
        match self {
            FactorNode::Univariate(x) => x.q().second_moment(),
            FactorNode::Multivariate(x) => x.q().second_moment_diag(),
        }
    }

    /// `sum_n E[z_n z_n']` over every sample
    pub fn second_moment_total(&self) -> Mat {
        match self {
            FactorNode::Univariate(x) => {
                let e = x.q().expectation();
                let e2 = x.q().second_moment();
                let mut ret = e.transpose() * e;
                for k in 0..e.ncols() {
                    ret[(k, k)] += e2.column(k).sum() - e.column(k).norm_squared();
                }
                ret
            }
            FactorNode::Multivariate(x) => {
                let kk = self.num_factors();
                x.q()
                    .second_moments()
                    .iter()
                    .fold(Mat::zeros(kk, kk), |acc, s| acc + s)
            }
        }
    }

    /// `sum_n E[z_n z_n']` over the given samples
    pub fn second_moment_sum<I: IntoIterator<Item = usize>>(&self, rows: I) -> Mat {
        let kk = self.num_factors();
        let mut ret = Mat::zeros(kk, kk);
        match self {
            FactorNode::Univariate(x) => {
                let e = x.q().expectation();
                let e2 = x.q().second_moment();
                for n in rows {
                    for j in 0..kk {
                        for k in 0..kk {
                            ret[(j, k)] += if j == k {
                                e2[(n, k)]
                            } else {
                                e[(n, j)] * e[(n, k)]
                            };
                        }
                    }
                }
            }
            FactorNode::Multivariate(x) => {
                let ss = x.q().second_moments();
                for n in rows {
                    ret += &ss[n];
                }
            }
        }
        ret
    }

    /// `w' E[z_n z_n'] w`
    pub fn quad_form(&self, n: usize, w: &DVec) -> f64 {
        match self {
            FactorNode::Univariate(x) => {
                let e = x.q().expectation();
                let e2 = x.q().second_moment();
                let mut dot = 0.;
                let mut spread = 0.;
                for k in 0..w.len() {
                    dot += e[(n, k)] * w[k];
                    spread += w[k] * w[k] * (e2[(n, k)] - e[(n, k)] * e[(n, k)]);
                }
                dot * dot + spread
            }
            FactorNode::Multivariate(x) => w.dot(&(&x.q().second_moments()[n] * w)),
        }
    }

    /// Seed `E[Z]`
    pub fn override_expectation(&mut self, value: Mat) -> NodeResult<()> {
        match self {
            FactorNode::Univariate(x) => x.override_expectation("E", value),
            FactorNode::Multivariate(x) => x.override_expectation("E", value),
        }
    }

    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        match self {
            FactorNode::Univariate(x) => x.drop_factors(keep),
            FactorNode::Multivariate(x) => x.drop_factors(keep),
        }
    }
}

impl Node for FactorNode {
    fn name(&self) -> &str {
        FACTOR_NODE
    }

    fn dim(&self) -> Dim {
        match self {
            FactorNode::Univariate(x) => x.dim(),
            FactorNode::Multivariate(x) => x.dim(),
        }
    }
}

impl HasParameters for FactorNode {
    fn parameters(&self, dist: Dist) -> ParamMap {
        match self {
            FactorNode::Univariate(x) => x.parameters(dist),
            FactorNode::Multivariate(x) => x.parameters(dist),
        }
    }
}

impl HasExpectations for FactorNode {
    fn expectation(&self, dist: Dist) -> &Mat {
        match self {
            FactorNode::Univariate(x) => x.expectation(dist),
            FactorNode::Multivariate(x) => x.expectation(dist),
        }
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        match self {
            FactorNode::Univariate(x) => x.expectations(dist),
            FactorNode::Multivariate(x) => x.expectations(dist),
        }
    }
}

impl ContributesElbo for FactorNode {
    type Blanket<'a> = ZBlanket<'a>;

    /// `-KL(Q || P)`
    fn calculate_elbo(&self, _blanket: &ZBlanket<'_>) -> f64 {
        match self {
            FactorNode::Univariate(x) => -x.kl_divergence(),
            FactorNode::Multivariate(x) => -x.kl_divergence(),
        }
    }
}

impl Updatable for FactorNode {
    fn update_parameters(&mut self, blanket: &ZBlanket<'_>) -> NodeResult<()> {
        match self {
            FactorNode::Univariate(x) => update_univariate(x, blanket),
            FactorNode::Multivariate(x) => update_multivariate(x, blanket),
        }
    }

    fn update_expectations(&mut self) -> NodeResult<()> {
        match self {
            FactorNode::Univariate(x) => x.update_expectations(),
            FactorNode::Multivariate(x) => x.update_expectations(),
        }
    }
}

/// Entry-wise coordinate ascent, one factor at a time. Residuals
/// `y - E[Z] E[SW]'` are kept current so every entry sees the entries
/// updated before it.
fn update_univariate(
    node: &mut Unobserved<GaussianMatrix>,
    blanket: &ZBlanket<'_>,
) -> NodeResult<()> {
    let name = node.name().to_string();
    let (nn, kk) = node.dim().shape();
    let prior_mean = node.p().mean().clone();
    let prior_var = node.p().var().clone();
    let mut ez = node.q().expectation().clone();

    let mut resid = blanket
        .views
        .iter()
        .map(|v| v.y - &ez * v.sw.expectation().transpose())
        .collect::<Vec<_>>();

    for k in 0..kk {
        for n in 0..nn {
            let old = ez[(n, k)];
            let mut prec = 1. / floor_var(prior_var[(n, k)]);
            let mut num = prior_mean[(n, k)] * prec;

            for (view, r) in blanket.views.iter().zip(resid.iter()) {
                let esw = view.sw.expectation();
                let esww = view.sw.sww();
                for d in 0..view.y.ncols() {
                    if !view.y[(n, d)].is_finite() {
                        continue;
                    }
                    let tau = view.tau[(0, d)];
                    prec += tau * esww[(d, k)];
                    num += tau * esw[(d, k)] * (r[(n, d)] + old * esw[(d, k)]);
                }
            }

            let var = 1. / prec;
            let mean = num * var;

            for (view, r) in blanket.views.iter().zip(resid.iter_mut()) {
                let esw = view.sw.expectation();
                for d in 0..view.y.ncols() {
                    if view.y[(n, d)].is_finite() {
                        r[(n, d)] -= (mean - old) * esw[(d, k)];
                    }
                }
            }

            ez[(n, k)] = mean;
            node.q_mut().set_entry(n, k, mean, var).at_node(&name)?;
        }
    }
    Ok(())
}

/// `lam += tau * E[sw_d sw_d']`; loadings are independent across
/// factors under `Q`
fn add_feature_precision(lam: &mut Mat, tau: f64, esw: &Mat, esww: &Mat, d: usize) {
    let kk = lam.nrows();
    for j in 0..kk {
        for k in 0..kk {
            lam[(j, k)] += tau
                * if j == k {
                    esww[(d, k)]
                } else {
                    esw[(d, j)] * esw[(d, k)]
                };
        }
    }
}

/// Exact update of each sample's `K`-dimensional Gaussian
fn update_multivariate(
    node: &mut Unobserved<MvGaussianMatrix>,
    blanket: &ZBlanket<'_>,
) -> NodeResult<()> {
    let name = node.name().to_string();
    let (nn, kk) = node.dim().shape();
    let singular = |what: &str| LentilError::Numerical {
        node: name.clone(),
        detail: format!("{} is not positive definite", what),
    };

    // precision contributed by a fully observed sample
    let complete = blanket
        .views
        .iter()
        .map(|v| {
            let mut lam = Mat::zeros(kk, kk);
            for d in 0..v.y.ncols() {
                add_feature_precision(
                    &mut lam,
                    v.tau[(0, d)],
                    v.sw.expectation(),
                    v.sw.sww(),
                    d,
                );
            }
            lam
        })
        .collect::<Vec<_>>();

    for n in 0..nn {
        let prior_prec = cholesky_with_jitter(&node.p().cov()[n])
            .ok_or_else(|| singular("prior covariance"))?
            .inverse();
        let mut h: DVec = &prior_prec * node.p().mean().row(n).transpose();
        let mut lam = prior_prec;

        for (view, full) in blanket.views.iter().zip(complete.iter()) {
            let esw = view.sw.expectation();
            let dd = view.y.ncols();
            if (0..dd).all(|d| view.y[(n, d)].is_finite()) {
                lam += full;
            } else {
                for d in (0..dd).filter(|&d| view.y[(n, d)].is_finite()) {
                    add_feature_precision(&mut lam, view.tau[(0, d)], esw, view.sw.sww(), d);
                }
            }
            for d in (0..dd).filter(|&d| view.y[(n, d)].is_finite()) {
                h += esw.row(d).transpose() * (view.tau[(0, d)] * view.y[(n, d)]);
            }
        }

        let cov = cholesky_with_jitter(&lam)
            .ok_or_else(|| singular("posterior precision"))?
            .inverse();
        let mean = &cov * h;
        node.q_mut().set_row(n, &mean, cov).at_node(&name)?;
    }
    Ok(())
}
