use crate::traits::ColumnStatOps;
use nalgebra::DMatrix;

impl ColumnStatOps for DMatrix<f64> {
    type Mat = DMatrix<f64>;
    type Scalar = f64;

    fn column_correlation(&self, other: &Self) -> anyhow::Result<Self::Mat> {
        if self.nrows() != other.nrows() {
            return Err(anyhow::anyhow!(
                "correlation needs the same number of rows: {} vs {}",
                self.nrows(),
                other.nrows()
            ));
        }

        let mut ret = DMatrix::<f64>::zeros(self.ncols(), other.ncols());

        for (i, x_i) in self.column_iter().enumerate() {
            for (j, y_j) in other.column_iter().enumerate() {
                let (mut n, mut sx, mut sy) = (0_f64, 0_f64, 0_f64);
                let (mut sxx, mut syy, mut sxy) = (0_f64, 0_f64, 0_f64);
                for (&x, &y) in x_i.iter().zip(y_j.iter()) {
                    if x.is_finite() && y.is_finite() {
                        n += 1.;
                        sx += x;
                        sy += y;
                        sxx += x * x;
                        syy += y * y;
                        sxy += x * y;
                    }
                }
                if n < 2. {
                    continue;
                }
                let cov = sxy - sx * sy / n;
                let vx = sxx - sx * sx / n;
                let vy = syy - sy * sy / n;
                let denom = (vx * vy).sqrt();
                ret[(i, j)] = if denom > 0. { cov / denom } else { 0. };
            }
        }
        Ok(ret)
    }

    fn column_total_sum_squares(&self) -> Vec<f64> {
        self.column_iter()
            .map(|x_j| {
                let (n, s1) = x_j
                    .iter()
                    .filter(|x| x.is_finite())
                    .fold((0_f64, 0_f64), |(n, s1), &x| (n + 1., s1 + x));
                if n < 1. {
                    return 0.;
                }
                let mu = s1 / n;
                x_j.iter()
                    .filter(|x| x.is_finite())
                    .map(|&x| (x - mu) * (x - mu))
                    .sum()
            })
            .collect()
    }

    fn num_finite(&self) -> usize {
        self.iter().filter(|x| x.is_finite()).count()
    }
}

/// Coefficient of determination of `fitted` against `observed`
/// computed over the finite entries of `observed`, against the
/// overall (not per-column) mean of zero-centred data
///
/// `R² = 1 - Σ (y - ŷ)² / Σ y²`
pub fn r_squared(observed: &DMatrix<f64>, fitted: &DMatrix<f64>) -> f64 {
    let (ss_res, ss_tot) = observed
        .iter()
        .zip(fitted.iter())
        .filter(|(y, _)| y.is_finite())
        .fold((0_f64, 0_f64), |(res, tot), (&y, &yhat)| {
            (res + (y - yhat) * (y - yhat), tot + y * y)
        });
    if ss_tot > 0. {
        1. - ss_res / ss_tot
    } else {
        0.
    }
}
