use crate::common::*;
use crate::error::AtNode;
use crate::nodes::*;
use matrix_param::dmatrix_beta::BetaMatrix;
use matrix_param::numerics::clamp_prob;
use matrix_param::traits::TwoStatParam;

/// Prior probability that a loading is active, per factor (`1 x K`)
#[derive(Clone, Debug)]
pub enum ThetaNode {
    Learned(Unobserved<BetaMatrix>),
    /// a fixed probability, with its logs cached
    Fixed {
        node: ConstantNode,
        log_value: Mat,
        log_value_inv: Mat,
    },
}

impl ThetaNode {
    pub fn learned(view: &str, p: BetaMatrix, q: BetaMatrix) -> NodeResult<Self> {
        Ok(ThetaNode::Learned(Unobserved::new(
            &format!("Theta[{}]", view),
            p,
            q,
        )?))
    }

    pub fn fixed(view: &str, value: f64, kk: usize) -> NodeResult<Self> {
        let name = format!("Theta[{}]", view);
        if !(0. ..=1.).contains(&value) {
            return Err(LentilError::Config(format!(
                "`{}` must be a probability, got {}",
                name, value
            )));
        }
        let value = Mat::from_element(1, kk, value);
        Ok(ThetaNode::Fixed {
            log_value: value.map(|x| clamp_prob(x).ln()),
            log_value_inv: value.map(|x| (1. - clamp_prob(x)).ln()),
            node: ConstantNode::new(&name, Dim::per_factor(kk), value)?,
        })
    }

    pub fn is_learned(&self) -> bool {
        matches!(self, ThetaNode::Learned(_))
    }

    /// `E[theta]`
    pub fn mean(&self) -> &Mat {
        self.expectation(Dist::Q)
    }

    /// `E[ln theta]`
    pub fn log_mean(&self) -> &Mat {
        match self {
            ThetaNode::Learned(x) => x.q().log_mean(),
            ThetaNode::Fixed { log_value, .. } => log_value,
        }
    }

    /// `E[ln (1 - theta)]`
    pub fn log_mean_inv(&self) -> &Mat {
        match self {
            ThetaNode::Learned(x) => x.q().log_mean_inv(),
            ThetaNode::Fixed { log_value_inv, .. } => log_value_inv,
        }
    }

    pub fn override_expectation(&mut self, moment: &str, value: Mat) -> NodeResult<()> {
        match self {
            ThetaNode::Learned(x) => x.override_expectation(moment, value),
            ThetaNode::Fixed { node, .. } => Err(LentilError::Config(format!(
                "`{}` is fixed; its expectations cannot be seeded",
                node.name()
            ))),
        }
    }

    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        match self {
            ThetaNode::Learned(x) => x.drop_factors(keep),
            ThetaNode::Fixed {
                node,
                log_value,
                log_value_inv,
            } => {
                node.drop_factors(keep)?;
                *log_value = log_value.select_columns(keep);
                *log_value_inv = log_value_inv.select_columns(keep);
                Ok(())
            }
        }
    }
}

impl Node for ThetaNode {
    fn name(&self) -> &str {
        match self {
            ThetaNode::Learned(x) => x.name(),
            ThetaNode::Fixed { node, .. } => node.name(),
        }
    }

    fn dim(&self) -> Dim {
        match self {
            ThetaNode::Learned(x) => x.dim(),
            ThetaNode::Fixed { node, .. } => node.dim(),
        }
    }
}

impl HasParameters for ThetaNode {
    fn parameters(&self, dist: Dist) -> ParamMap {
        match self {
            ThetaNode::Learned(x) => x.parameters(dist),
            ThetaNode::Fixed { node, .. } => node.parameters(dist),
        }
    }
}

impl HasExpectations for ThetaNode {
    fn expectation(&self, dist: Dist) -> &Mat {
        match self {
            ThetaNode::Learned(x) => x.expectation(dist),
            ThetaNode::Fixed { node, .. } => node.expectation(dist),
        }
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        match self {
            ThetaNode::Learned(x) => x.expectations(dist),
            ThetaNode::Fixed {
                node,
                log_value,
                log_value_inv,
            } => {
                let mut ret = node.expectations(dist);
                ret.insert("lnE", ParamValue::Matrix(log_value.clone()));
                ret.insert("lnEInv", ParamValue::Matrix(log_value_inv.clone()));
                ret
            }
        }
    }
}

impl ContributesElbo for ThetaNode {
    type Blanket<'a> = ThetaBlanket<'a>;

    fn calculate_elbo(&self, _blanket: &ThetaBlanket<'_>) -> f64 {
        match self {
            ThetaNode::Learned(x) => -x.kl_divergence(),
            ThetaNode::Fixed { .. } => 0.,
        }
    }
}

impl Updatable for ThetaNode {
    /// `a = a0 + sum_d E[s_dk]`, `b = b0 + sum_d (1 - E[s_dk])`
    fn update_parameters(&mut self, blanket: &ThetaBlanket<'_>) -> NodeResult<()> {
        let ThetaNode::Learned(node) = self else {
            return Ok(());
        };
        let es = blanket.sw.q().prob();
        let kk = es.ncols();
        let dd = es.nrows() as f64;
        let add_a = Mat::from_fn(1, kk, |_, k| es.column(k).sum());
        let add_b = Mat::from_fn(1, kk, |_, k| dd - add_a[(0, k)]);

        let prior = node.p().clone();
        node.q_mut()
            .update_stat(&prior, &add_a, &add_b)
            .at_node(node.name())
    }

    fn update_expectations(&mut self) -> NodeResult<()> {
        match self {
            ThetaNode::Learned(x) => x.update_expectations(),
            ThetaNode::Fixed { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_theta_drops_with_the_factors() -> anyhow::Result<()> {
        let mut theta = ThetaNode::fixed("v", 0.25, 3)?;
        theta.drop_factors(&[0, 2])?;
        assert_eq!(theta.dim().shape(), (1, 2));
        assert_eq!(theta.log_mean().ncols(), 2);
        approx::assert_abs_diff_eq!(theta.log_mean_inv()[(0, 1)], 0.75_f64.ln(), epsilon = 1e-12);
        assert!(!theta.is_learned());
        Ok(())
    }
}
