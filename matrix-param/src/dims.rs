use nalgebra::DMatrix;
use serde::Serialize;

/// Names of the axes a parameter matrix can be indexed by
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum AxisName {
    Samples,
    Features,
    Factors,
    /// a singleton axis for vectors, e.g., one value per factor
    Unit,
}

impl std::fmt::Display for AxisName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AxisName::Samples => "samples",
            AxisName::Features => "features",
            AxisName::Factors => "factors",
            AxisName::Unit => "unit",
        };
        write!(f, "{}", name)
    }
}

/// A named axis with its length
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Axis {
    pub name: AxisName,
    pub len: usize,
}

/// Dimension of a node: an ordered pair of named axes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Dim {
    pub rows: Axis,
    pub cols: Axis,
}

impl Dim {
    pub fn new(rows: (AxisName, usize), cols: (AxisName, usize)) -> Self {
        Self {
            rows: Axis {
                name: rows.0,
                len: rows.1,
            },
            cols: Axis {
                name: cols.0,
                len: cols.1,
            },
        }
    }

    /// `N x K`
    pub fn samples_factors(nn: usize, kk: usize) -> Self {
        Self::new((AxisName::Samples, nn), (AxisName::Factors, kk))
    }

    /// `D x K`
    pub fn features_factors(dd: usize, kk: usize) -> Self {
        Self::new((AxisName::Features, dd), (AxisName::Factors, kk))
    }

    /// `N x D`
    pub fn samples_features(nn: usize, dd: usize) -> Self {
        Self::new((AxisName::Samples, nn), (AxisName::Features, dd))
    }

    /// `1 x K`
    pub fn per_factor(kk: usize) -> Self {
        Self::new((AxisName::Unit, 1), (AxisName::Factors, kk))
    }

    /// `1 x D`
    pub fn per_feature(dd: usize) -> Self {
        Self::new((AxisName::Unit, 1), (AxisName::Features, dd))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows.len, self.cols.len)
    }

    /// Which axis (0 = rows, 1 = columns) indexes factors, if any
    pub fn factor_axis(&self) -> Option<usize> {
        if self.cols.name == AxisName::Factors {
            Some(1)
        } else if self.rows.name == AxisName::Factors {
            Some(0)
        } else {
            None
        }
    }

    pub fn num_factors(&self) -> Option<usize> {
        match self.factor_axis() {
            Some(0) => Some(self.rows.len),
            Some(_) => Some(self.cols.len),
            None => None,
        }
    }

    /// The same dimension with the factor axis resized to `kk`
    pub fn with_factors(&self, kk: usize) -> Self {
        let mut ret = *self;
        match self.factor_axis() {
            Some(0) => ret.rows.len = kk,
            Some(_) => ret.cols.len = kk,
            None => {}
        }
        ret
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}[{}] x {}[{}]",
            self.rows.name, self.rows.len, self.cols.name, self.cols.len
        )
    }
}

/// Keep the `keep` indices along `axis` (0 = rows, 1 = columns)
pub fn select_along(mat: &DMatrix<f64>, axis: usize, keep: &[usize]) -> DMatrix<f64> {
    if axis == 0 {
        mat.select_rows(keep)
    } else {
        mat.select_columns(keep)
    }
}
