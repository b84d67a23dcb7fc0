use approx::assert_abs_diff_eq;
use matrix_util::traits::MatOps;
use nalgebra::DMatrix;

#[test]
fn centre_columns_skips_missing() {
    let mut xx = DMatrix::<f64>::from_row_slice(4, 2, &[1., 10., 2., f64::NAN, 3., 20., 6., 30.]);
    xx.centre_columns_inplace();

    assert_abs_diff_eq!(xx[(0, 0)], -2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(xx[(3, 0)], 3.0, epsilon = 1e-12);
    assert!(xx[(1, 1)].is_nan());
    assert_abs_diff_eq!(xx[(0, 1)], -10.0, epsilon = 1e-12);
    assert_abs_diff_eq!(xx[(3, 1)], 10.0, epsilon = 1e-12);
}

#[test]
fn centre_columns_of_a_missing_column() {
    let mut xx = DMatrix::<f64>::from_element(3, 1, f64::NAN);
    xx.centre_columns_inplace();
    assert!(xx.iter().all(|x| x.is_nan()));
}
