use matrix_util::traits::{IoOps, SampleOps};
use rand::SeedableRng;

#[test]
fn dmatrix_io_test() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(1);
    let xx = nalgebra::DMatrix::<f64>::rnorm_with(50, 50, &mut rng);

    let dir = tempfile::tempdir()?;
    let tsv_file = dir.path().join("xx.tsv.gz");
    let file = tsv_file.to_string_lossy();
    xx.to_tsv(&file)?;

    let yy = nalgebra::DMatrix::<f64>::read_file_delim(&file, "\t", None)?;

    approx::assert_abs_diff_eq!(xx, yy, epsilon = 1e-12);

    Ok(())
}

#[test]
fn dmatrix_io_with_names_and_missing() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(2);
    let mut xx = nalgebra::DMatrix::<f64>::rnorm_with(4, 3, &mut rng);
    xx[(1, 2)] = f64::NAN;

    let rows: Vec<Box<str>> = (0..4).map(|i| format!("s{}", i).into_boxed_str()).collect();
    let cols: Vec<Box<str>> = (0..3).map(|j| format!("f{}", j).into_boxed_str()).collect();

    let dir = tempfile::tempdir()?;
    let tsv_file = dir.path().join("xx.tsv");
    let file = tsv_file.to_string_lossy();
    xx.write_data_with_names(&file, "\t", &rows, &cols)?;

    let read = nalgebra::DMatrix::<f64>::read_data_with_names(&file, "\t")?;

    assert_eq!(read.rows, rows);
    assert_eq!(read.cols, cols);
    assert!(read.mat[(1, 2)].is_nan());

    for i in 0..4 {
        for j in 0..3 {
            if (i, j) != (1, 2) {
                approx::assert_abs_diff_eq!(read.mat[(i, j)], xx[(i, j)], epsilon = 1e-12);
            }
        }
    }

    Ok(())
}
