use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_stat::r_squared;
use matrix_util::traits::{ColumnStatOps, SampleOps};
use nalgebra::DMatrix;
use rand::SeedableRng;

#[test]
fn correlation_with_itself_and_negation() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let xx = DMatrix::<f64>::rnorm_with(100, 3, &mut rng);
    let neg = -&xx;

    let r = xx.column_correlation(&xx)?;
    for k in 0..3 {
        assert_abs_diff_eq!(r[(k, k)], 1.0, epsilon = 1e-10);
    }

    let r = xx.column_correlation(&neg)?;
    for k in 0..3 {
        assert_abs_diff_eq!(r[(k, k)], -1.0, epsilon = 1e-10);
    }
    Ok(())
}

#[test]
fn correlation_rejects_row_mismatch() {
    let xx = DMatrix::<f64>::zeros(10, 2);
    let yy = DMatrix::<f64>::zeros(11, 2);
    assert!(xx.column_correlation(&yy).is_err());
}

#[test]
fn r_squared_ignores_missing() {
    let observed = DMatrix::<f64>::from_row_slice(2, 2, &[1., -1., f64::NAN, 2.]);
    let fitted = DMatrix::<f64>::from_row_slice(2, 2, &[1., -1., 100., 2.]);
    assert_abs_diff_eq!(r_squared(&observed, &fitted), 1.0, epsilon = 1e-12);

    let zeros = DMatrix::<f64>::zeros(2, 2);
    assert_abs_diff_eq!(r_squared(&observed, &zeros), 0.0, epsilon = 1e-12);
}

#[test]
fn total_sum_squares_and_count() {
    let xx = DMatrix::<f64>::from_row_slice(3, 1, &[1., f64::NAN, 3.]);
    assert_eq!(xx.num_finite(), 2);
    assert_abs_diff_eq!(xx.column_total_sum_squares()[0], 2.0, epsilon = 1e-12);
}
