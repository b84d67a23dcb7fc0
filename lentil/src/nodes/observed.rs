use crate::common::*;
use crate::config::Likelihood;
use crate::nodes::*;
use crate::stats::{expected_rss, observed_counts};
use matrix_param::numerics::{ln_gamma, sigmoid, softplus, LN_2PI};

/// Gaussian surrogate of a non-gaussian likelihood: around the current
/// linear predictor `zeta`, `ln p(y | x) >= c - kappa / 2 (x - y_hat)^2`
#[derive(Clone, Debug)]
struct PseudoData {
    y: Mat,
    /// curvature bound per feature, `1 x D`
    kappa: Mat,
    /// `c` summed over observed entries
    offset: f64,
}

/// The data of one view (`N x D`). Missing entries are NaN.
#[derive(Clone, Debug)]
pub struct ObservedView {
    likelihood: Likelihood,
    data: ConstantNode,
    num_observed: Mat,
    pseudo: Option<PseudoData>,
}

const MIN_RATE: f64 = 1e-10;

impl ObservedView {
    pub fn gaussian(view: &str, y: Mat) -> NodeResult<Self> {
        Self::new(view, Likelihood::Gaussian, y)
    }

    /// Non-gaussian views start from pseudo-data around `zeta = 0`
    pub fn new(view: &str, likelihood: Likelihood, y: Mat) -> NodeResult<Self> {
        let (nn, dd) = y.shape();
        let kappa = match likelihood {
            Likelihood::Gaussian => None,
            Likelihood::Bernoulli => Some(Mat::from_element(1, dd, 0.25)),
            Likelihood::Poisson => Some(Mat::from_fn(1, dd, |_, d| {
                let ymax = y
                    .column(d)
                    .iter()
                    .filter(|x| x.is_finite())
                    .fold(0_f64, |a, &b| a.max(b));
                0.25 + 0.17 * ymax
            })),
        };

        let mut ret = Self {
            likelihood,
            num_observed: observed_counts(&y),
            data: ConstantNode::new(&format!("Y[{}]", view), Dim::samples_features(nn, dd), y)?,
            pseudo: None,
        };
        if let Some(kappa) = kappa {
            ret.pseudo = Some(ret.pseudo_data(&Mat::zeros(nn, dd), kappa));
        }
        Ok(ret)
    }

    pub fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    /// The raw data
    pub fn data(&self) -> &Mat {
        self.data.value()
    }

    /// What the loadings are fit to: the data, or the pseudo-data of a
    /// non-gaussian view
    pub fn effective(&self) -> &Mat {
        match &self.pseudo {
            Some(pseudo) => &pseudo.y,
            None => self.data.value(),
        }
    }

    /// Observed entries per feature, `1 x D`
    pub fn num_observed(&self) -> &Mat {
        &self.num_observed
    }

    /// Fixed noise precision standing in for `Tau`
    pub fn kappa(&self) -> Option<&Mat> {
        self.pseudo.as_ref().map(|x| &x.kappa)
    }

    fn pseudo_data(&self, zeta: &Mat, kappa: Mat) -> PseudoData {
        let y = self.data.value();
        let mut offset = 0.;
        let pseudo = Mat::from_fn(y.nrows(), y.ncols(), |n, d| {
            let y_nd = y[(n, d)];
            if !y_nd.is_finite() {
                return f64::NAN;
            }
            let x = zeta[(n, d)];
            let (grad, log_lik) = match self.likelihood {
                Likelihood::Gaussian => (0., 0.),
                Likelihood::Bernoulli => (y_nd - sigmoid(x), y_nd * x - softplus(x)),
                Likelihood::Poisson => {
                    let rate = softplus(x).max(MIN_RATE);
                    (
                        sigmoid(x) * (y_nd / rate - 1.),
                        y_nd * rate.ln() - rate - ln_gamma(y_nd + 1.),
                    )
                }
            };
            let k = kappa[(0, d)];
            offset += log_lik + grad * grad / (2. * k);
            x + grad / k
        });
        PseudoData {
            y: pseudo,
            kappa,
            offset,
        }
    }
}

impl Node for ObservedView {
    fn name(&self) -> &str {
        self.data.name()
    }

    fn dim(&self) -> Dim {
        self.data.dim()
    }
}

impl HasParameters for ObservedView {
    fn parameters(&self, dist: Dist) -> ParamMap {
        self.data.parameters(dist)
    }
}

impl HasExpectations for ObservedView {
    fn expectation(&self, dist: Dist) -> &Mat {
        self.data.expectation(dist)
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        let mut ret = self.data.expectations(dist);
        if let Some(pseudo) = &self.pseudo {
            ret.insert("pseudo", ParamValue::Matrix(pseudo.y.clone()));
        }
        ret
    }
}

impl ContributesElbo for ObservedView {
    type Blanket<'a> = YBlanket<'a>;

    /// `E[ln p(Y | Z, SW, tau)]`, or its quadratic lower bound for a
    /// non-gaussian view
    fn calculate_elbo(&self, blanket: &YBlanket<'_>) -> f64 {
        let rss = expected_rss(self.effective(), blanket.z, blanket.sw.q());
        match &self.pseudo {
            None => {
                let etau = blanket.tau.mean();
                let lntau = blanket.tau.log_mean();
                let nobs = &self.num_observed;
                (0..rss.ncols())
                    .map(|d| {
                        let n_d = nobs[(0, d)];
                        -0.5 * n_d * LN_2PI + 0.5 * n_d * lntau[(0, d)]
                            - 0.5 * etau[(0, d)] * rss[(0, d)]
                    })
                    .sum()
            }
            Some(pseudo) => {
                pseudo.offset
                    - 0.5
                        * (0..rss.ncols())
                            .map(|d| pseudo.kappa[(0, d)] * rss[(0, d)])
                            .sum::<f64>()
            }
        }
    }
}

impl Updatable for ObservedView {
    /// Re-centre the pseudo-data at `E[Z] E[SW]'`; the raw data never
    /// change
    fn update_parameters(&mut self, blanket: &YBlanket<'_>) -> NodeResult<()> {
        let Some(pseudo) = self.pseudo.take() else {
            return Ok(());
        };
        let zeta = blanket.z.mean() * blanket.sw.q().expectation().transpose();
        self.pseudo = Some(self.pseudo_data(&zeta, pseudo.kappa));
        Ok(())
    }

    fn update_expectations(&mut self) -> NodeResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bernoulli_pseudo_data_at_zero() -> anyhow::Result<()> {
        let y = Mat::from_row_slice(2, 2, &[1., 0., f64::NAN, 1.]);
        let view = ObservedView::new("b", Likelihood::Bernoulli, y)?;

        // zeta = 0: y_hat = (y - 1/2) / (1/4)
        let pseudo = view.effective();
        approx::assert_abs_diff_eq!(pseudo[(0, 0)], 2., epsilon = 1e-12);
        approx::assert_abs_diff_eq!(pseudo[(0, 1)], -2., epsilon = 1e-12);
        assert!(pseudo[(1, 0)].is_nan());
        assert_eq!(view.num_observed()[(0, 0)], 1.);
        assert_eq!(view.kappa().map(|k| k[(0, 0)]), Some(0.25));
        Ok(())
    }

    #[test]
    fn gaussian_view_fits_the_data() -> anyhow::Result<()> {
        let y = Mat::from_row_slice(1, 2, &[0.5, -1.]);
        let view = ObservedView::gaussian("g", y.clone())?;
        assert_eq!(view.effective(), &y);
        assert!(view.kappa().is_none());
        assert_eq!(view.name(), "Y[g]");
        Ok(())
    }
}
