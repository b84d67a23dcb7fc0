use crate::common::*;
use crate::config::Likelihood;
use matrix_util::traits::{IoOps, MatOps};

/// One observed view: `N x D`, missing entries are NaN
#[derive(Clone, Debug)]
pub struct ViewData {
    pub name: Box<str>,
    pub y: Mat,
    pub feature_names: Vec<Box<str>>,
}

/// Views sharing the same samples
#[derive(Clone, Debug)]
pub struct MultiViewData {
    pub views: Vec<ViewData>,
    pub sample_names: Vec<Box<str>>,
}

fn default_names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (0..n)
        .map(|i| format!("{}_{}", prefix, i).into_boxed_str())
        .collect()
}

impl MultiViewData {
    /// Views named `view_0, view_1, ...` with generic sample and
    /// feature names
    pub fn from_matrices(ys: Vec<Mat>) -> Self {
        let nn = ys.first().map(|y| y.nrows()).unwrap_or(0);
        let views = ys
            .into_iter()
            .enumerate()
            .map(|(m, y)| ViewData {
                name: format!("view_{}", m).into_boxed_str(),
                feature_names: default_names(&format!("view_{}_feature", m), y.ncols()),
                y,
            })
            .collect();
        Self {
            views,
            sample_names: default_names("sample", nn),
        }
    }

    /// Read one TSV per view. Each file has a header of feature names
    /// and sample names in the first column; every view must list the
    /// same samples in the same order.
    pub fn read_tsv_files(
        files: &[Box<str>],
        view_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<Self> {
        if let Some(names) = view_names {
            if names.len() != files.len() {
                return Err(anyhow::anyhow!(
                    "{} view names for {} files",
                    names.len(),
                    files.len()
                ));
            }
        }

        let mut views = Vec::with_capacity(files.len());
        let mut sample_names: Option<Vec<Box<str>>> = None;

        for (m, file) in files.iter().enumerate() {
            let data = Mat::read_data_with_names(file, "\t")?;
            info!("read {}: {} x {}", file, data.mat.nrows(), data.mat.ncols());

            match &sample_names {
                Some(names) if names != &data.rows => {
                    return Err(anyhow::anyhow!(
                        "samples of {} don't match those of {}",
                        file,
                        files[0]
                    ));
                }
                Some(_) => {}
                None => sample_names = Some(data.rows.clone()),
            }

            let name = match view_names {
                Some(names) => names[m].clone(),
                None => matrix_util::common_io::basename(file)?,
            };

            views.push(ViewData {
                name,
                y: data.mat,
                feature_names: data.cols,
            });
        }

        Ok(Self {
            views,
            sample_names: sample_names.unwrap_or_default(),
        })
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    pub fn num_samples(&self) -> usize {
        self.sample_names.len()
    }

    pub fn view_names(&self) -> Vec<Box<str>> {
        self.views.iter().map(|v| v.name.clone()).collect()
    }

    /// Check dimensions and the support of every view under its
    /// likelihood
    pub fn check(&self, likelihoods: &[Likelihood]) -> NodeResult<()> {
        let err = |msg: String| Err(LentilError::Config(msg));
        if self.views.is_empty() {
            return err("no views".into());
        }
        if likelihoods.len() != self.views.len() {
            return err(format!(
                "{} likelihoods for {} views",
                likelihoods.len(),
                self.views.len()
            ));
        }
        let nn = self.num_samples();
        for (view, lik) in self.views.iter().zip(likelihoods) {
            if view.y.nrows() != nn {
                return err(format!(
                    "view `{}` has {} samples, expected {}",
                    view.name,
                    view.y.nrows(),
                    nn
                ));
            }
            if view.y.ncols() == 0 || view.feature_names.len() != view.y.ncols() {
                return err(format!(
                    "view `{}` has {} features and {} feature names",
                    view.name,
                    view.y.ncols(),
                    view.feature_names.len()
                ));
            }
            if view.y.iter().any(|x| x.is_infinite()) {
                return err(format!("view `{}` has infinite values", view.name));
            }
            if !view.y.iter().any(|x| x.is_finite()) {
                return err(format!("view `{}` has no observed values", view.name));
            }
            let observed = view.y.iter().filter(|x| x.is_finite());
            match lik {
                Likelihood::Gaussian => {}
                Likelihood::Bernoulli => {
                    if observed.clone().any(|&x| x != 0. && x != 1.) {
                        return err(format!("bernoulli view `{}` is not binary", view.name));
                    }
                }
                Likelihood::Poisson => {
                    if observed.clone().any(|&x| x < 0. || x.fract() != 0.) {
                        return err(format!(
                            "poisson view `{}` has values that are not counts",
                            view.name
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Centre every gaussian view per feature over its observed values
    pub fn centre_gaussian_views(&mut self, likelihoods: &[Likelihood]) {
        for (view, lik) in self.views.iter_mut().zip(likelihoods) {
            if *lik == Likelihood::Gaussian {
                view.y.centre_columns_inplace();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_binary_bernoulli() {
        let y = Mat::from_row_slice(2, 2, &[0., 1., f64::NAN, 2.]);
        let data = MultiViewData::from_matrices(vec![y]);
        assert!(data.check(&[Likelihood::Bernoulli]).is_err());
        assert!(data.check(&[Likelihood::Gaussian]).is_ok());
    }

    #[test]
    fn rejects_sample_mismatch() {
        let data = MultiViewData::from_matrices(vec![Mat::zeros(3, 2), Mat::zeros(4, 2)]);
        let ret = data.check(&[Likelihood::Gaussian; 2]);
        assert!(matches!(ret, Err(LentilError::Config(_))));
    }
}
