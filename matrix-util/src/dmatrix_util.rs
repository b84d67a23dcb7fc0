pub use nalgebra::{DMatrix, DVector};
pub use rand::Rng;
pub use rand_distr::StandardNormal;

use crate::traits::*;
use num_traits::{Float, FromPrimitive};

impl<T> SampleOps for DMatrix<T>
where
    T: Float + FromPrimitive + nalgebra::Scalar,
{
    type Mat = Self;
    type Scalar = T;

    fn rnorm_with<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        // sequential, so that the same seed gives the same matrix
        DMatrix::from_fn(dd, nn, |_, _| {
            let x: f64 = rng.sample(StandardNormal);
            T::from_f64(x).unwrap_or_else(T::zero)
        })
    }
}

/// mean of the finite entries of a column
fn finite_mean<'a, T, I>(xx: I) -> T
where
    T: Float + 'a,
    I: Iterator<Item = &'a T>,
{
    let (n, s1) = xx
        .filter(|x| x.is_finite())
        .fold((T::zero(), T::zero()), |(n, s1), &x| (n + T::one(), s1 + x));
    if n > T::zero() {
        s1 / n
    } else {
        T::zero()
    }
}

impl<T> MatOps for DMatrix<T>
where
    T: Float + FromPrimitive + nalgebra::Scalar,
{
    fn centre_columns_inplace(&mut self) {
        for mut x_j in self.column_iter_mut() {
            let mu = finite_mean(x_j.iter());
            x_j.apply(|x| {
                if x.is_finite() {
                    *x = *x - mu;
                }
            });
        }
    }
}
