pub mod dims;
pub mod dmatrix_bernoulli;
pub mod dmatrix_bernoulli_gaussian;
pub mod dmatrix_beta;
pub mod dmatrix_gamma;
pub mod dmatrix_gaussian;
pub mod dmatrix_mv_gaussian;
pub mod error;
pub mod io;
pub mod numerics;
pub mod traits;
