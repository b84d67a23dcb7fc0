use crate::traits::*;
use matrix_util::traits::IoOps;

/// Write every entry of `params` to `{header}.{name}.tsv.gz` and
/// return the file names
pub fn write_param_map(params: &ParamMap, header: &str) -> anyhow::Result<Vec<String>> {
    let mut files = Vec::with_capacity(params.len());
    for (name, value) in params.iter() {
        let file = format!("{}.{}.tsv.gz", header, name);
        write_param_value(value, &file)?;
        files.push(file);
    }
    Ok(files)
}

/// Write one parameter value; a stack of `K x K` matrices becomes
/// one `K * K` row per matrix
pub fn write_param_value(value: &ParamValue, file: &str) -> anyhow::Result<()> {
    match value {
        ParamValue::Matrix(x) => x.to_tsv(file),
        ParamValue::Matrices(xs) => flatten_stack(xs).to_tsv(file),
    }
}

fn flatten_stack(xs: &[Mat]) -> Mat {
    let ncol = xs.first().map(|x| x.len()).unwrap_or(0);
    Mat::from_fn(xs.len(), ncol, |i, j| xs[i].as_slice()[j])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flatten_is_column_major() {
        let xs = vec![Mat::from_row_slice(2, 2, &[1., 2., 3., 4.]); 3];
        let flat = flatten_stack(&xs);
        assert_eq!(flat.shape(), (3, 4));
        assert_eq!(flat.row(2).iter().copied().collect::<Vec<_>>(), vec![1., 3., 2., 4.]);
    }
}
