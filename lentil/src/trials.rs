//! Independent training runs from different seeds.

use crate::common::*;
use crate::config::{Config, ModelSpec};
use crate::data::MultiViewData;
use crate::network::{BayesNet, TrainSummary};

use indicatif::ParallelProgressIterator;
use rand::SeedableRng;
use rayon::prelude::*;

/// One trained network with the seed that initialised it
#[derive(Clone, Debug)]
pub struct TrialResult {
    pub seed: u64,
    pub net: BayesNet,
    pub summary: TrainSummary,
}

/// Build a network from `spec`, seeded by `seed`, and train it
pub fn run_trial(data: &MultiViewData, spec: &ModelSpec, seed: u64) -> NodeResult<TrialResult> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let mut net = BayesNet::build(data, spec, &mut rng)?;
    let summary = net.train()?;
    info!(
        "trial seed {}: ELBO = {:.4}, K = {}, converged = {}",
        seed,
        summary.final_elbo(),
        summary.num_factors,
        summary.converged
    );
    Ok(TrialResult { seed, net, summary })
}

/// Run `ntrials` trials with seeds `spec.train.seed + t` in parallel.
/// Results come sorted by final ELBO, best first.
pub fn run_trials(
    data: &MultiViewData,
    spec: &ModelSpec,
    ntrials: usize,
) -> anyhow::Result<Vec<TrialResult>> {
    if ntrials == 0 {
        return Err(anyhow::anyhow!("need at least one trial"));
    }
    let base = spec.train.seed;

    let mut results = (0..ntrials)
        .into_par_iter()
        .progress_count(ntrials as u64)
        .map(|t| run_trial(data, spec, base + t as u64))
        .collect::<NodeResult<Vec<_>>>()?;

    results.sort_by(|a, b| b.summary.final_elbo().total_cmp(&a.summary.final_elbo()));
    Ok(results)
}

/// Check `config` against `data`, centre gaussian views if configured
/// and run the trials
pub fn fit(
    mut data: MultiViewData,
    config: &Config,
    ntrials: usize,
) -> anyhow::Result<(MultiViewData, Vec<TrialResult>)> {
    let spec = config.resolve(data.num_views())?;
    data.check(&spec.likelihoods)?;
    if spec.center_features {
        data.centre_gaussian_views(&spec.likelihoods);
    }
    let results = run_trials(&data, &spec, ntrials)?;
    Ok((data, results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulate::{simulate, SimParams};

    #[test]
    fn trials_are_sorted_and_reproducible() -> anyhow::Result<()> {
        let sim = simulate(&SimParams {
            num_samples: 40,
            num_features: vec![10, 8],
            num_factors: 2,
            ..Default::default()
        })?;
        let mut config = Config::default();
        config.model.num_factors = 3;
        config.train.maxiter = 30;

        let (_, results) = fit(sim.data.clone(), &config, 3)?;
        assert_eq!(results.len(), 3);
        for pair in results.windows(2) {
            assert!(pair[0].summary.final_elbo() >= pair[1].summary.final_elbo());
        }

        let spec = config.resolve(2)?;
        let mut data = sim.data;
        data.centre_gaussian_views(&spec.likelihoods);
        let again = run_trial(&data, &spec, results[0].seed)?;
        approx::assert_relative_eq!(
            again.summary.final_elbo(),
            results[0].summary.final_elbo(),
            max_relative = 1e-12
        );
        Ok(())
    }
}
