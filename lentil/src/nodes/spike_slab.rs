use crate::common::*;
use crate::error::AtNode;
use crate::nodes::*;
use matrix_param::dmatrix_bernoulli_gaussian::BernoulliGaussianMatrix;
use matrix_param::numerics::{clamp_prob, floor_rate, sigmoid, LN_2PI};

/// Spike-and-slab loadings `SW` of one view (`D x K`)
///
/// `Q` factorises over entries as `q(s) q(w | s)` with the spike branch
/// `q(w | s = 0)` pinned to the prior `N(0, 1 / E[alpha])`. `P` is a
/// plug-in snapshot of the current prior moments, refreshed on every
/// update, so that `P` and `Q` can be read side by side.
#[derive(Clone, Debug)]
pub struct SpikeSlabNode {
    node: Unobserved<BernoulliGaussianMatrix>,
}

impl SpikeSlabNode {
    pub fn new(view: &str, p: BernoulliGaussianMatrix, q: BernoulliGaussianMatrix) -> NodeResult<Self> {
        Ok(Self {
            node: Unobserved::new(&format!("SW[{}]", view), p, q)?,
        })
    }

    pub fn q(&self) -> &BernoulliGaussianMatrix {
        self.node.q()
    }

    pub fn num_features(&self) -> usize {
        self.dim().rows.len
    }

    pub fn num_factors(&self) -> usize {
        self.dim().cols.len
    }

    pub fn override_expectation(&mut self, moment: &str, value: Mat) -> NodeResult<()> {
        self.node.override_expectation(moment, value)
    }

    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        self.node.drop_factors(keep)
    }

    fn refresh_prior(&mut self, theta: &Mat, spike_var: &Mat) -> NodeResult<()> {
        let (dd, kk) = self.dim().shape();
        let theta = Mat::from_fn(dd, kk, |_, k| clamp_prob(theta[(0, k)]));
        let p = BernoulliGaussianMatrix::new(
            self.dim(),
            theta,
            Mat::zeros(dd, kk),
            spike_var.clone(),
            spike_var.clone(),
        )
        .at_node(self.node.name())?;
        *self.node.p_mut() = p;
        Ok(())
    }
}

impl Node for SpikeSlabNode {
    fn name(&self) -> &str {
        self.node.name()
    }

    fn dim(&self) -> Dim {
        self.node.dim()
    }
}

impl HasParameters for SpikeSlabNode {
    fn parameters(&self, dist: Dist) -> ParamMap {
        self.node.parameters(dist)
    }
}

impl HasExpectations for SpikeSlabNode {
    fn expectation(&self, dist: Dist) -> &Mat {
        self.node.expectation(dist)
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        self.node.expectations(dist)
    }
}

impl ContributesElbo for SpikeSlabNode {
    type Blanket<'a> = SwBlanket<'a>;

    /// `E[ln p(w | alpha)] + E[ln p(s | theta)] + H[q(s, w)]`
    fn calculate_elbo(&self, blanket: &SwBlanket<'_>) -> f64 {
        let q = self.node.q();
        let (dd, kk) = self.dim().shape();
        let ealpha = blanket.alpha.mean();
        let lnalpha = blanket.alpha.log_mean();
        let lntheta = blanket.theta.log_mean();
        let lntheta_inv = blanket.theta.log_mean_inv();

        let mut lik = 0.;
        for k in 0..kk {
            for d in 0..dd {
                let es = q.prob()[(d, k)];
                lik += 0.5 * lnalpha[(0, k)] - 0.5 * LN_2PI - 0.5 * ealpha[(0, k)] * q.ww()[(d, k)];
                lik += es * lntheta[(0, k)] + (1. - es) * lntheta_inv[(0, k)];
            }
        }
        lik + q.entropy()
    }
}

impl Updatable for SpikeSlabNode {
    /// One sweep over features; within a feature the factors are
    /// visited in order and each reads the ones updated before it
    fn update_parameters(&mut self, blanket: &SwBlanket<'_>) -> NodeResult<()> {
        let name = self.node.name().to_string();
        let y = blanket.y.effective();
        let (dd, kk) = self.dim().shape();
        let nn = y.nrows();

        let tau = blanket.tau.mean();
        let ealpha = blanket.alpha.mean();
        let lntheta = blanket.theta.log_mean();
        let lntheta_inv = blanket.theta.log_mean_inv();
        let ez = blanket.z.mean();

        let spike_var = Mat::from_fn(dd, kk, |_, k| 1. / floor_rate(ealpha[(0, k)]));
        self.node
            .q_mut()
            .set_spike_var(spike_var.clone())
            .at_node(&name)?;

        let complete = blanket.z.second_moment_total();

        for d in 0..dd {
            let observed = (0..nn)
                .filter(|&n| y[(n, d)].is_finite())
                .collect::<Vec<_>>();

            let partial;
            let zz: &Mat = if observed.len() == nn {
                &complete
            } else {
                partial = blanket.z.second_moment_sum(observed.iter().copied());
                &partial
            };

            let mut zy = DVec::zeros(kk);
            for &n in observed.iter() {
                for k in 0..kk {
                    zy[k] += y[(n, d)] * ez[(n, k)];
                }
            }

            let tau_d = tau[(0, d)];
            for k in 0..kk {
                let esw = self.node.q().expectation();
                let cross = (0..kk)
                    .filter(|&j| j != k)
                    .map(|j| esw[(d, j)] * zz[(k, j)])
                    .sum::<f64>();

                let alpha_k = floor_rate(ealpha[(0, k)]);
                let denom = tau_d * zz[(k, k)] + alpha_k;
                let foo = tau_d * (zy[k] - cross);
                let log_odds = lntheta[(0, k)] - lntheta_inv[(0, k)] + 0.5 * alpha_k.ln()
                    - 0.5 * denom.ln()
                    + 0.5 * foo * foo / denom;

                let q = self.node.q_mut();
                q.set_entry(d, k, sigmoid(log_odds), foo / denom, 1. / denom)
                    .at_node(&name)?;
                q.refresh_entry(d, k);
            }
        }

        self.refresh_prior(blanket.theta.mean(), &spike_var)
    }

    fn update_expectations(&mut self) -> NodeResult<()> {
        self.node.update_expectations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_param::dmatrix_gamma::GammaMatrix;
    use matrix_param::traits::TwoStatParam;

    #[test]
    fn strong_signal_switches_the_slab_on() -> anyhow::Result<()> {
        let nn = 50;
        let dim = Dim::features_factors(2, 1);
        let q = BernoulliGaussianMatrix::new_const(dim, 0.5, 0., 1., 1.)?;
        let mut sw = SpikeSlabNode::new("v", q.clone(), q)?;

        // feature 0 follows z, feature 1 is unrelated noise
        let zvals = Mat::from_fn(nn, 1, |n, _| if n % 2 == 0 { 1. } else { -1. });
        let y = Mat::from_fn(nn, 2, |n, d| {
            if d == 0 {
                2. * zvals[(n, 0)]
            } else if n % 4 < 2 {
                0.01
            } else {
                -0.01
            }
        });

        let zq = matrix_param::dmatrix_gaussian::GaussianMatrix::new(
            Dim::samples_factors(nn, 1),
            zvals,
            Mat::from_element(nn, 1, 1e-6),
        )?;
        let z = FactorNode::univariate(zq.clone(), zq)?;
        let yv = ObservedView::gaussian("v", y)?;
        let tau = TauNode::fixed("v", Mat::from_element(1, 2, 100.))?;
        let alpha_q = GammaMatrix::new_const(Dim::per_factor(1), 1., 1.)?;
        let alpha = AlphaNode::new("v", alpha_q.clone(), alpha_q)?;
        let theta = ThetaNode::fixed("v", 0.5, 1)?;

        sw.update(&SwBlanket {
            y: &yv,
            z: &z,
            tau: &tau,
            alpha: &alpha,
            theta: &theta,
        })?;

        let prob = sw.q().prob();
        assert!(prob[(0, 0)] > 0.99);
        assert!(prob[(1, 0)] < 0.5);
        approx::assert_abs_diff_eq!(sw.q().mean()[(0, 0)], 2., epsilon = 1e-2);
        Ok(())
    }
}
