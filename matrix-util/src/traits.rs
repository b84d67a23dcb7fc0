/// A matrix carried together with its row and column names
pub struct MatWithNames<Mat> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: Mat,
}

/// Column-wise transformations. Non-finite entries are treated as
/// missing: they are skipped in the statistics and left untouched.
pub trait MatOps {
    fn centre_columns_inplace(&mut self);
}

/// Operations to sample random matrices
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from `N(0,1)` with a caller-owned generator,
    /// so that the draws can be reproduced from a seed
    fn rnorm_with<R: rand::Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat;
}

/// Column statistics that ignore non-finite (missing) entries
pub trait ColumnStatOps {
    type Mat;
    type Scalar;

    /// Pearson correlation between every column of `self` and every
    /// column of `other` (`self.ncols() x other.ncols()`). Rows where
    /// either side is missing are skipped pairwise.
    fn column_correlation(&self, other: &Self) -> anyhow::Result<Self::Mat>;

    /// Sum of squared deviations from the column means
    fn column_total_sum_squares(&self) -> Vec<Self::Scalar>;

    /// Number of finite entries
    fn num_finite(&self) -> usize;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    fn read_file_delim(
        file: &str,
        delim: &str,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    /// Read a matrix whose first line holds the column names and
    /// whose first field on every other line is the row name
    fn read_data_with_names(
        file: &str,
        delim: &str,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn write_data_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}
