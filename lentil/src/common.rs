pub use log::{debug, info, warn};

pub use matrix_param::dims::{AxisName, Dim};
pub use matrix_param::traits::{Distribution, Family, HasMoments, HasParams, ParamMap, ParamValue};

pub type Mat = nalgebra::DMatrix<f64>;
pub type DVec = nalgebra::DVector<f64>;

pub use crate::error::{LentilError, NodeResult};
