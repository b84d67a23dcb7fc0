use crate::common::*;
use crate::nodes::*;
use matrix_param::dims::select_along;

/// An observed or fixed value. Its expectation is the value itself
/// and no update ever changes it.
#[derive(Clone, Debug)]
pub struct ConstantNode {
    name: String,
    dim: Dim,
    value: Mat,
}

impl ConstantNode {
    pub fn new(name: &str, dim: Dim, value: Mat) -> NodeResult<Self> {
        if dim.shape() != value.shape() {
            return Err(LentilError::Config(format!(
                "constant `{}` has shape {:?}, declared {}",
                name,
                value.shape(),
                dim
            )));
        }
        Ok(Self {
            name: name.to_string(),
            dim,
            value,
        })
    }

    pub fn value(&self) -> &Mat {
        &self.value
    }

    /// Entries that are observed, i.e., finite
    pub fn is_observed(&self, i: usize, j: usize) -> bool {
        self.value[(i, j)].is_finite()
    }

    /// Keep the `keep` factors if the value is factor-indexed
    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        let Some(axis) = self.dim.factor_axis() else {
            return Ok(());
        };
        let kk = self.dim.num_factors().unwrap_or(0);
        if let Some(&index) = keep.iter().find(|&&k| k >= kk) {
            return Err(LentilError::Numerical {
                node: self.name.clone(),
                detail: format!("factor {} is out of range for {} factors", index, kk),
            });
        }
        self.value = select_along(&self.value, axis, keep);
        self.dim = self.dim.with_factors(keep.len());
        Ok(())
    }
}

impl Node for ConstantNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> Dim {
        self.dim
    }
}

impl HasParameters for ConstantNode {
    fn parameters(&self, _dist: Dist) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("value", ParamValue::Matrix(self.value.clone()));
        ret
    }
}

impl HasExpectations for ConstantNode {
    fn expectation(&self, _dist: Dist) -> &Mat {
        &self.value
    }

    fn expectations(&self, _dist: Dist) -> ParamMap {
        let mut ret = ParamMap::new();
        ret.insert("E", ParamValue::Matrix(self.value.clone()));
        ret
    }
}

impl ContributesElbo for ConstantNode {
    type Blanket<'a> = ();
}

/// Both updates are no-ops: a constant keeps its value.
impl Updatable for ConstantNode {
    fn update_parameters(&mut self, _blanket: &()) -> NodeResult<()> {
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
    fn updates_never_touch_the_value() -> anyhow::Result<()> {
        let value = Mat::from_row_slice(2, 3, &[1., f64::NAN, 3., 4., 5., 6.]);
        let mut node = ConstantNode::new("Y", Dim::samples_features(2, 3), value.clone())?;
        node.update(&())?;
        node.update_parameters(&())?;
        node.update_expectations()?;

        let stored = node.value();
        for (a, b) in stored.iter().zip(value.iter()) {
            assert!(a == b || (a.is_nan() && b.is_nan()));
        }
        assert!(!node.is_observed(0, 1));
        assert_eq!(node.calculate_elbo(&()), 0.);
        assert_eq!(node.expectation(Dist::Q).shape(), (2, 3));
        Ok(())
    }
}
