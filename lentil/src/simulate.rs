//! Synthetic multi-view data from a known sparse factor model.

use crate::common::*;
use crate::config::Likelihood;
use crate::data::{MultiViewData, ViewData};
use matrix_param::numerics::{sigmoid, softplus};
use matrix_util::traits::{IoOps, SampleOps};

use rand::{Rng, SeedableRng};
use rand_distr::{Distribution as RandDistribution, Gamma, Normal, Poisson};

#[derive(Clone, Debug)]
pub struct SimParams {
    pub num_samples: usize,
    /// one entry per view
    pub num_features: Vec<usize>,
    pub num_factors: usize,
    /// one entry per view; all gaussian if empty
    pub likelihoods: Vec<Likelihood>,
    /// probability that a loading is non-zero
    pub active_prob: f64,
    /// probability that a factor is switched off in a view; each factor
    /// stays on in at least one view
    pub inactive_factor_prob: f64,
    /// Gamma `(shape, rate)` of the noise precision of each feature
    pub noise_precision: (f64, f64),
    /// fraction of entries replaced by NaN
    pub missing_frac: f64,
    pub seed: u64,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            num_samples: 200,
            num_features: vec![100, 100],
            num_factors: 3,
            likelihoods: vec![],
            active_prob: 0.5,
            inactive_factor_prob: 0.,
            noise_precision: (10., 1.),
            missing_frac: 0.,
            seed: 42,
        }
    }
}

/// The data together with the truth that generated them
#[derive(Clone, Debug)]
pub struct SimulatedData {
    pub data: MultiViewData,
    pub likelihoods: Vec<Likelihood>,
    /// `N x K`
    pub z: Mat,
    /// `D x K` per view
    pub w: Vec<Mat>,
    /// `1 x K` per view: whether the factor is on
    pub active: Vec<Vec<bool>>,
    /// `1 x D` per view
    pub tau: Vec<Mat>,
}

fn distr_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow::anyhow!("invalid simulation parameter: {}", e)
}

pub fn simulate(params: &SimParams) -> anyhow::Result<SimulatedData> {
    let mm = params.num_features.len();
    let nn = params.num_samples;
    let kk = params.num_factors;

    if mm == 0 || nn == 0 || kk == 0 {
        return Err(anyhow::anyhow!("need at least one view, sample and factor"));
    }
    let likelihoods = if params.likelihoods.is_empty() {
        vec![Likelihood::Gaussian; mm]
    } else {
        params.likelihoods.clone()
    };
    if likelihoods.len() != mm {
        return Err(anyhow::anyhow!(
            "{} likelihoods for {} views",
            likelihoods.len(),
            mm
        ));
    }
    for (name, p) in [
        ("active_prob", params.active_prob),
        ("inactive_factor_prob", params.inactive_factor_prob),
        ("missing_frac", params.missing_frac),
    ] {
        if !(0. ..=1.).contains(&p) {
            return Err(anyhow::anyhow!("`{}` must be in [0, 1], got {}", name, p));
        }
    }

    info!(
        "Simulating {} views of {} samples from {} factors",
        mm, nn, kk
    );

    let mut rng = rand::rngs::StdRng::seed_from_u64(params.seed);
    let normal = Normal::new(0., 1.).map_err(distr_err)?;
    let (shape, rate) = params.noise_precision;
    let gamma = Gamma::new(shape, 1. / rate).map_err(distr_err)?;

    let z = Mat::rnorm_with(nn, kk, &mut rng);

    // which factor is on in which view
    let mut active = (0..mm)
        .map(|_| {
            (0..kk)
                .map(|_| !rng.random_bool(params.inactive_factor_prob))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    for k in 0..kk {
        if !active.iter().any(|a| a[k]) {
            active[k % mm][k] = true;
        }
    }

    let mut views = Vec::with_capacity(mm);
    let mut ws = Vec::with_capacity(mm);
    let mut taus = Vec::with_capacity(mm);

    for (m, (&dd, &likelihood)) in params.num_features.iter().zip(likelihoods.iter()).enumerate() {
        let w = Mat::from_fn(dd, kk, |_, k| {
            if active[m][k] && rng.random_bool(params.active_prob) {
                normal.sample(&mut rng)
            } else {
                0.
            }
        });
        let tau = Mat::from_fn(1, dd, |_, _| gamma.sample(&mut rng));
        let eta = &z * w.transpose();

        let mut y = Mat::zeros(nn, dd);
        for d in 0..dd {
            let sd = 1. / tau[(0, d)].sqrt();
            for n in 0..nn {
                let x = eta[(n, d)];
                y[(n, d)] = match likelihood {
                    Likelihood::Gaussian => x + sd * normal.sample(&mut rng),
                    Likelihood::Bernoulli => {
                        if rng.random_bool(sigmoid(x)) {
                            1.
                        } else {
                            0.
                        }
                    }
                    Likelihood::Poisson => {
                        let rate = softplus(x).max(1e-10);
                        Poisson::new(rate).map_err(distr_err)?.sample(&mut rng)
                    }
                };
            }
        }

        if params.missing_frac > 0. {
            for x in y.iter_mut() {
                if rng.random_bool(params.missing_frac) {
                    *x = f64::NAN;
                }
            }
        }

        let name = format!("view_{}", m).into_boxed_str();
        views.push(ViewData {
            feature_names: (0..dd)
                .map(|d| format!("{}_feature_{}", name, d).into_boxed_str())
                .collect(),
            name,
            y,
        });
        ws.push(w);
        taus.push(tau);
    }

    Ok(SimulatedData {
        data: MultiViewData {
            views,
            sample_names: (0..nn)
                .map(|n| format!("sample_{}", n).into_boxed_str())
                .collect(),
        },
        likelihoods,
        z,
        w: ws,
        active,
        tau: taus,
    })
}

pub fn factor_names(kk: usize) -> Vec<Box<str>> {
    (0..kk).map(|k| format!("factor_{}", k).into_boxed_str()).collect()
}

impl SimulatedData {
    /// Write `{out}.{view}.tsv.gz` per view, and the truth as
    /// `{out}.z.tsv.gz`, `{out}.{view}.w.tsv.gz`
    pub fn write_tsv(&self, out: &str) -> anyhow::Result<Vec<Box<str>>> {
        let kk = self.z.ncols();
        let factors = factor_names(kk);
        let mut view_files = vec![];

        self.z.write_data_with_names(
            &format!("{}.z.tsv.gz", out),
            "\t",
            &self.data.sample_names,
            &factors,
        )?;

        for (view, w) in self.data.views.iter().zip(self.w.iter()) {
            let file = format!("{}.{}.tsv.gz", out, view.name);
            view.y
                .write_data_with_names(&file, "\t", &self.data.sample_names, &view.feature_names)?;
            w.write_data_with_names(
                &format!("{}.{}.w.tsv.gz", out, view.name),
                "\t",
                &view.feature_names,
                &factors,
            )?;
            view_files.push(file.into_boxed_str());
        }
        Ok(view_files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_data() -> anyhow::Result<()> {
        let params = SimParams {
            num_samples: 20,
            num_features: vec![5, 7],
            missing_frac: 0.1,
            ..Default::default()
        };
        let a = simulate(&params)?;
        let b = simulate(&params)?;
        assert_eq!(a.z, b.z);
        assert_eq!(a.w[1], b.w[1]);
        assert_eq!(a.data.views[1].y.shape(), (20, 7));
        let c = simulate(&SimParams { seed: 7, ..params })?;
        assert_ne!(a.z, c.z);
        Ok(())
    }

    #[test]
    fn every_factor_is_on_somewhere() -> anyhow::Result<()> {
        let sim = simulate(&SimParams {
            num_factors: 6,
            inactive_factor_prob: 0.9,
            ..Default::default()
        })?;
        for k in 0..6 {
            assert!(sim.active.iter().any(|a| a[k]));
        }
        for (w, a) in sim.w.iter().zip(sim.active.iter()) {
            for k in (0..6).filter(|&k| !a[k]) {
                assert_eq!(w.column(k).abs().sum(), 0.);
            }
        }
        Ok(())
    }

    #[test]
    fn binary_and_count_views() -> anyhow::Result<()> {
        let sim = simulate(&SimParams {
            num_samples: 30,
            num_features: vec![4, 4],
            likelihoods: vec![Likelihood::Bernoulli, Likelihood::Poisson],
            ..Default::default()
        })?;
        assert!(sim.data.views[0].y.iter().all(|&x| x == 0. || x == 1.));
        assert!(sim.data.views[1]
            .y
            .iter()
            .all(|&x| x >= 0. && x.fract() == 0.));
        Ok(())
    }
}
