use crate::common::*;
use crate::error::AtNode;
use crate::nodes::*;

/// A node that owns a prior `P` and a variational posterior `Q` of
/// the same family and dimension
#[derive(Clone, Debug)]
pub struct Unobserved<D: Distribution> {
    name: String,
    p: D,
    q: D,
}

impl<D: Distribution> Unobserved<D> {
    pub fn new(name: &str, p: D, q: D) -> NodeResult<Self> {
        if p.dim() != q.dim() {
            return Err(LentilError::Config(format!(
                "`{}`: prior {} and posterior {} differ",
                name,
                p.dim(),
                q.dim()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            p,
            q,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dim(&self) -> Dim {
        *self.q.dim()
    }

    pub fn p(&self) -> &D {
        &self.p
    }

    pub fn q(&self) -> &D {
        &self.q
    }

    /// Only the node's own update routines mutate `P` and `Q`
    pub(crate) fn p_mut(&mut self) -> &mut D {
        &mut self.p
    }

    pub(crate) fn q_mut(&mut self) -> &mut D {
        &mut self.q
    }

    pub fn dist(&self, dist: Dist) -> &D {
        match dist {
            Dist::P => &self.p,
            Dist::Q => &self.q,
        }
    }

    pub fn update_expectations(&mut self) -> NodeResult<()> {
        self.q.update_expectations().at_node(&self.name)
    }

    /// Seed a moment of `Q` that differs from what its parameters
    /// imply
    pub fn override_expectation(&mut self, moment: &str, value: Mat) -> NodeResult<()> {
        self.q
            .override_expectation(moment, value)
            .config_at_node(&self.name)
    }

    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        self.p.drop_factors(keep).at_node(&self.name)?;
        self.q.drop_factors(keep).at_node(&self.name)
    }

    /// `KL(Q || P)` from the cached moments of `Q`
    pub fn kl_divergence(&self) -> f64 {
        self.q.kl_divergence(&self.p)
    }
}

impl<D: Distribution> HasParameters for Unobserved<D> {
    fn parameters(&self, dist: Dist) -> ParamMap {
        self.dist(dist).parameters()
    }
}

impl<D: Distribution> HasExpectations for Unobserved<D> {
    fn expectation(&self, dist: Dist) -> &Mat {
        self.dist(dist).expectation()
    }

    fn expectations(&self, dist: Dist) -> ParamMap {
        self.dist(dist).expectations()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use matrix_param::dmatrix_bernoulli::BernoulliMatrix;

    #[test]
    fn bernoulli_node_reads_prior_and_posterior_apart() -> anyhow::Result<()> {
        let dim = Dim::features_factors(2, 3);
        let p = BernoulliMatrix::new_const(dim, 0.5)?;
        let q = BernoulliMatrix::new(
            dim,
            Mat::from_row_slice(2, 3, &[0.9, 0.1, 0.4, 0.2, 0.7, 1.]),
        )?;
        let mut node = Unobserved::new("S[v]", p, q)?;

        assert_eq!(node.name(), "S[v]");
        assert_eq!(node.dim().shape(), (2, 3));
        assert_abs_diff_eq!(node.expectation(Dist::P)[(1, 2)], 0.5);
        assert_abs_diff_eq!(node.expectation(Dist::Q)[(1, 2)], 1.);

        let theta = node.parameters(Dist::Q);
        assert_eq!(
            theta.get("theta").and_then(|x| x.as_matrix()),
            Some(node.q().expectation())
        );
        assert!(node.expectations(Dist::P).contains_key("E"));
        assert!(node.kl_divergence() > 0.);

        node.override_expectation("E", Mat::from_element(2, 3, 0.5))?;
        assert_abs_diff_eq!(node.q().expectation()[(0, 0)], 0.5);
        assert_abs_diff_eq!(node.q().theta()[(0, 0)], 0.9);
        assert!(matches!(
            node.override_expectation("lnE", Mat::zeros(2, 3)),
            Err(LentilError::NodeConfig { .. })
        ));

        node.update_expectations()?;
        node.drop_factors(&[2, 0])?;
        assert_eq!(node.dim().shape(), (2, 2));
        assert_eq!(node.p().dim().shape(), (2, 2));
        assert_abs_diff_eq!(node.expectation(Dist::Q)[(0, 0)], 0.4);
        assert_abs_diff_eq!(node.expectation(Dist::Q)[(1, 1)], 0.2);
        Ok(())
    }

    #[test]
    fn mismatched_prior_is_rejected() -> anyhow::Result<()> {
        let p = BernoulliMatrix::new_const(Dim::features_factors(2, 3), 0.5)?;
        let q = BernoulliMatrix::new_const(Dim::features_factors(2, 2), 0.5)?;
        assert!(matches!(
            Unobserved::new("S[v]", p, q),
            Err(LentilError::Config(_))
        ));
        Ok(())
    }
}
