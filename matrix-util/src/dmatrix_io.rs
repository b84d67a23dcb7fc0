use crate::common_io::{parse_with_missing, read_lines_of_words_delim, write_lines};
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use num_traits::{Float, FromPrimitive};

use std::fmt::Display;

fn parse_row<T>(words: &[Box<str>]) -> anyhow::Result<Vec<T>>
where
    T: Float + FromPrimitive,
{
    words
        .iter()
        .map(|w| {
            let x = parse_with_missing(w)?;
            T::from_f64(x).ok_or(anyhow::anyhow!("failed to convert {}", x))
        })
        .collect()
}

fn format_value<T: Float + Display>(x: T) -> String {
    if x.is_finite() {
        format!("{}", x)
    } else {
        "NA".to_string()
    }
}

impl<T> IoOps for DMatrix<T>
where
    T: Float + FromPrimitive + nalgebra::Scalar + Send + Display + Copy,
{
    type Scalar = T;
    type Mat = Self;

    fn read_file_delim(
        tsv_file: &str,
        delim: &str,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let hdr_line = match skip {
            Some(skip) => skip as i64,
            None => -1, // no skipping
        };

        let lines = read_lines_of_words_delim(tsv_file, delim, hdr_line)?.lines;

        if lines.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", tsv_file));
        }

        let ncols = lines[0].len();
        let nrows = lines.len();
        let mut data = Vec::with_capacity(nrows * ncols);

        for (i, words) in lines.iter().enumerate() {
            if words.len() != ncols {
                return Err(anyhow::anyhow!(
                    "line {} of {} has {} fields, expected {}",
                    i + 1,
                    tsv_file,
                    words.len(),
                    ncols
                ));
            }
            data.extend(parse_row::<T>(words)?);
        }

        Ok(DMatrix::<T>::from_row_iterator(nrows, ncols, data))
    }

    fn read_data_with_names(
        file: &str,
        delim: &str,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let out = read_lines_of_words_delim(file, delim, 0)?;

        if out.lines.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file));
        }

        let ncols = out.lines[0].len().saturating_sub(1);

        // the header may or may not have a name for the row-name column
        let cols: Vec<Box<str>> = if out.header.len() == ncols + 1 {
            out.header[1..].to_vec()
        } else if out.header.len() == ncols {
            out.header.clone()
        } else {
            return Err(anyhow::anyhow!(
                "header of {} has {} fields for {} data columns",
                file,
                out.header.len(),
                ncols
            ));
        };

        let mut rows = Vec::with_capacity(out.lines.len());
        let mut data = Vec::with_capacity(out.lines.len() * ncols);

        for (i, words) in out.lines.iter().enumerate() {
            if words.len() != ncols + 1 {
                return Err(anyhow::anyhow!(
                    "line {} of {} has {} fields, expected {}",
                    i + 2,
                    file,
                    words.len(),
                    ncols + 1
                ));
            }
            rows.push(words[0].clone());
            data.extend(parse_row::<T>(&words[1..])?);
        }

        let nrows = rows.len();
        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data),
        })
    }

    fn write_file_delim(&self, tsv_file: &str, delim: &str) -> anyhow::Result<()> {
        // par_iter() or par_bridge() will
        // mess up the order of the rows
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|&x| format_value(x))
                    .collect::<Vec<String>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect::<Vec<_>>();

        write_lines(&lines, tsv_file)?;
        Ok(())
    }

    fn write_data_with_names(
        &self,
        file: &str,
        delim: &str,
        row_names: &[Box<str>],
        column_names: &[Box<str>],
    ) -> anyhow::Result<()> {
        if row_names.len() != self.nrows() || column_names.len() != self.ncols() {
            return Err(anyhow::anyhow!(
                "names ({} x {}) don't match the matrix ({} x {})",
                row_names.len(),
                column_names.len(),
                self.nrows(),
                self.ncols()
            ));
        }

        let mut lines = Vec::with_capacity(self.nrows() + 1);
        lines.push(
            std::iter::once("name".to_string())
                .chain(column_names.iter().map(|x| x.to_string()))
                .collect::<Vec<_>>()
                .join(delim)
                .into_boxed_str(),
        );

        for (name, row) in row_names.iter().zip(self.row_iter()) {
            lines.push(
                std::iter::once(name.to_string())
                    .chain(row.iter().map(|&x| format_value(x)))
                    .collect::<Vec<_>>()
                    .join(delim)
                    .into_boxed_str(),
            );
        }

        write_lines(&lines, file)
    }
}
