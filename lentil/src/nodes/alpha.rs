use crate::common::*;
use crate::error::AtNode;
use crate::nodes::*;
use matrix_param::dmatrix_gamma::GammaMatrix;
use matrix_param::traits::TwoStatParam;

/// ARD precision of each factor's loadings in one view (`1 x K`)
#[derive(Clone, Debug)]
pub struct AlphaNode {
    node: Unobserved<GammaMatrix>,
}

impl AlphaNode {
    pub fn new(view: &str, p: GammaMatrix, q: GammaMatrix) -> NodeResult<Self> {
        Ok(Self {
            node: Unobserved::new(&format!("Alpha[{}]", view), p, q)?,
        })
    }

    /// `E[alpha]`
    pub fn mean(&self) -> &Mat {
        self.node.q().expectation()
    }

    /// `E[ln alpha]`
    pub fn log_mean(&self) -> &Mat {
        self.node.q().log_mean()
    }

    pub fn override_expectation(&mut self, moment: &str, value: Mat) -> NodeResult<()> {
        self.node.override_expectation(moment, value)
    }

    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        self.node.drop_factors(keep)
    }
}

impl Node for AlphaNode {
    fn name(&self) -> &str {
        self.node.name()
    }

    fn dim(&self) -> Dim {
        self.node.dim()
    }
}

impl HasParameters for AlphaNode {
    fn parameters(&self, dist: Dist) -> ParamMap {
        self.node.parameters(dist)
    }
}

impl HasExpectations for AlphaNode {
    fn expectation(&self, dist: Dist) -> &Mat {
        self.node.expectation(dist)
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        self.node.expectations(dist)
    }
}

impl ContributesElbo for AlphaNode {
    type Blanket<'a> = AlphaBlanket<'a>;

    fn calculate_elbo(&self, _blanket: &AlphaBlanket<'_>) -> f64 {
        -self.node.kl_divergence()
    }
}

impl Updatable for AlphaNode {
    /// `a = a0 + D / 2`, `b = b0 + sum_d E[w_dk^2] / 2`
    fn update_parameters(&mut self, blanket: &AlphaBlanket<'_>) -> NodeResult<()> {
        let eww = blanket.sw.q().ww();
        let dd = eww.nrows() as f64;
        let kk = eww.ncols();

        let add_a = Mat::from_element(1, kk, 0.5 * dd);
        let add_b = Mat::from_fn(1, kk, |_, k| 0.5 * eww.column(k).sum());

        let prior = self.node.p().clone();
        self.node
            .q_mut()
            .update_stat(&prior, &add_a, &add_b)
            .at_node(self.node.name())
    }

    fn update_expectations(&mut self) -> NodeResult<()> {
        self.node.update_expectations()
    }
}
