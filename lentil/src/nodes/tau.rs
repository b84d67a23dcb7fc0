use crate::common::*;
use crate::error::AtNode;
use crate::nodes::*;
use crate::stats::expected_rss;
use matrix_param::dmatrix_gamma::GammaMatrix;
use matrix_param::traits::TwoStatParam;

/// Noise precision of each feature of one view (`1 x D`)
#[derive(Clone, Debug)]
pub enum TauNode {
    /// gaussian views
    Learned(Unobserved<GammaMatrix>),
    /// the curvature bound of a non-gaussian view
    Fixed { node: ConstantNode, log_value: Mat },
}

impl TauNode {
    pub fn learned(view: &str, p: GammaMatrix, q: GammaMatrix) -> NodeResult<Self> {
        Ok(TauNode::Learned(Unobserved::new(
            &format!("Tau[{}]", view),
            p,
            q,
        )?))
    }

    pub fn fixed(view: &str, value: Mat) -> NodeResult<Self> {
        let name = format!("Tau[{}]", view);
        if value.iter().any(|&x| !(x.is_finite() && x > 0.)) {
            return Err(LentilError::Config(format!(
                "`{}` must be positive and finite",
                name
            )));
        }
        let dd = value.ncols();
        Ok(TauNode::Fixed {
            log_value: value.map(f64::ln),
            node: ConstantNode::new(&name, Dim::per_feature(dd), value)?,
        })
    }

    pub fn is_learned(&self) -> bool {
        matches!(self, TauNode::Learned(_))
    }

    /// `E[tau]`
    pub fn mean(&self) -> &Mat {
        self.expectation(Dist::Q)
    }

    /// `E[ln tau]`
    pub fn log_mean(&self) -> &Mat {
        match self {
            TauNode::Learned(x) => x.q().log_mean(),
            TauNode::Fixed { log_value, .. } => log_value,
        }
    }

    pub fn override_expectation(&mut self, moment: &str, value: Mat) -> NodeResult<()> {
        match self {
            TauNode::Learned(x) => x.override_expectation(moment, value),
            TauNode::Fixed { node, .. } => Err(LentilError::Config(format!(
                "`{}` is fixed; its expectations cannot be seeded",
                node.name()
            ))),
        }
    }
}

impl Node for TauNode {
    fn name(&self) -> &str {
        match self {
            TauNode::Learned(x) => x.name(),
            TauNode::Fixed { node, .. } => node.name(),
        }
    }

    fn dim(&self) -> Dim {
        match self {
            TauNode::Learned(x) => x.dim(),
            TauNode::Fixed { node, .. } => node.dim(),
        }
    }
}

impl HasParameters for TauNode {
    fn parameters(&self, dist: Dist) -> ParamMap {
        match self {
            TauNode::Learned(x) => x.parameters(dist),
            TauNode::Fixed { node, .. } => node.parameters(dist),
        }
    }
}

impl HasExpectations for TauNode {
    fn expectation(&self, dist: Dist) -> &Mat {
        match self {
            TauNode::Learned(x) => x.expectation(dist),
            TauNode::Fixed { node, .. } => node.expectation(dist),
        }
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        match self {
            TauNode::Learned(x) => x.expectations(dist),
            TauNode::Fixed { node, log_value } => {
                let mut ret = node.expectations(dist);
                ret.insert("lnE", ParamValue::Matrix(log_value.clone()));
                ret
            }
        }
    }
}

impl ContributesElbo for TauNode {
    type Blanket<'a> = TauBlanket<'a>;

    fn calculate_elbo(&self, _blanket: &TauBlanket<'_>) -> f64 {
        match self {
            TauNode::Learned(x) => -x.kl_divergence(),
            TauNode::Fixed { .. } => 0.,
        }
    }
}

impl Updatable for TauNode {
    /// `a = a0 + N_d / 2`, `b = b0 + E[RSS_d] / 2` over the observed
    /// entries of each feature
    fn update_parameters(&mut self, blanket: &TauBlanket<'_>) -> NodeResult<()> {
        let TauNode::Learned(node) = self else {
            return Ok(());
        };
        let add_a = blanket.y.num_observed() * 0.5;
        let add_b = expected_rss(blanket.y.effective(), blanket.z, blanket.sw.q()) * 0.5;

        let prior = node.p().clone();
        node.q_mut()
            .update_stat(&prior, &add_a, &add_b)
            .at_node(node.name())
    }

    fn update_expectations(&mut self) -> NodeResult<()> {
        match self {
            TauNode::Learned(x) => x.update_expectations(),
            TauNode::Fixed { .. } => Ok(()),
        }
    }
}
