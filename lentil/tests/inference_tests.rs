use lentil::common::*;
use lentil::simulate::{simulate, SimParams, SimulatedData};
use lentil::{fit, BayesNet, Config, LentilError, Likelihood, MultiViewData, TrainSummary};
use matrix_util::traits::{ColumnStatOps, SampleOps};
use rand::SeedableRng;

fn assert_mostly_increasing(summary: &TrainSummary) {
    let trace = summary
        .elbo_trace
        .iter()
        .map(|x| x.total)
        .collect::<Vec<_>>();
    assert!(trace.len() > 1, "too few ELBO records: {}", trace.len());
    assert!(trace.iter().all(|x| x.is_finite()));

    let pairs = trace.len() - 1;
    let increasing = trace
        .windows(2)
        .filter(|w| w[1] >= w[0] - 1e-6 * w[0].abs().max(1.))
        .count();
    assert!(
        increasing as f64 >= 0.95 * pairs as f64,
        "ELBO increased in only {} of {} steps",
        increasing,
        pairs
    );
}

/// For every true factor the best absolute correlation with any
/// inferred factor
fn best_correlations(truth: &Mat, inferred: &Mat) -> anyhow::Result<Vec<f64>> {
    let cor = truth.column_correlation(inferred)?;
    Ok(cor
        .row_iter()
        .map(|r| r.iter().map(|x| x.abs()).fold(0., f64::max))
        .collect())
}

fn two_gaussian_views() -> anyhow::Result<SimulatedData> {
    simulate(&SimParams::default())
}

#[test]
fn recovers_the_simulated_factors() -> anyhow::Result<()> {
    let sim = two_gaussian_views()?;
    let mut config = Config::default();
    config.model.num_factors = 3;

    let (_, trials) = fit(sim.data.clone(), &config, 1)?;
    let best = &trials[0];
    assert_eq!(best.summary.num_factors, 3);
    assert_mostly_increasing(&best.summary);

    let cor = best_correlations(&sim.z, best.net.z.mean())?;
    let recovered = cor.iter().filter(|&&r| r > 0.9).count();
    assert!(recovered >= 2, "correlations with the truth: {:?}", cor);

    let r2 = best.net.r2_per_view();
    assert!(r2.iter().all(|&x| x > 0.5), "R2 per view: {:?}", r2);
    Ok(())
}

#[test]
fn multivariate_factors_fit_the_same_data() -> anyhow::Result<()> {
    let sim = simulate(&SimParams {
        num_samples: 100,
        num_features: vec![40, 30],
        num_factors: 2,
        ..Default::default()
    })?;
    let mut config = Config::default();
    config.model.num_factors = 2;
    config.model.factor_posterior = "multivariate".into();
    config.train.maxiter = 200;

    let (_, trials) = fit(sim.data.clone(), &config, 1)?;
    let best = &trials[0];
    assert_mostly_increasing(&best.summary);

    let cor = best_correlations(&sim.z, best.net.z.mean())?;
    assert!(cor.iter().any(|&r| r > 0.9), "correlations: {:?}", cor);
    Ok(())
}

#[test]
fn missing_entries_keep_the_elbo_increasing() -> anyhow::Result<()> {
    let sim = simulate(&SimParams {
        num_samples: 80,
        num_features: vec![30, 20],
        num_factors: 2,
        missing_frac: 0.2,
        seed: 7,
        ..Default::default()
    })?;
    let mut config = Config::default();
    config.model.num_factors = 4;
    config.train.maxiter = 150;

    let (_, trials) = fit(sim.data, &config, 1)?;
    assert_mostly_increasing(&trials[0].summary);
    Ok(())
}

#[test]
fn dropping_factors_keeps_every_node_consistent() -> anyhow::Result<()> {
    let sim = simulate(&SimParams {
        num_samples: 100,
        num_features: vec![50, 40],
        num_factors: 2,
        ..Default::default()
    })?;
    let mut config = Config::default();
    config.model.num_factors = 6;
    config.train.maxiter = 200;
    config.train.drop.by_r2 = Some(0.01);
    config.train.drop.by_cor = Some(0.95);

    let (_, trials) = fit(sim.data, &config, 1)?;
    let net = &trials[0].net;
    let kk = net.num_factors();

    assert!(kk >= 1 && kk < 6, "K = {}", kk);
    assert_eq!(trials[0].summary.num_factors, kk);
    net.check_factor_axes()?;

    assert_eq!(net.z.mean().ncols(), kk);
    for v in net.views.iter() {
        assert_eq!(v.alpha.mean().ncols(), kk);
        assert_eq!(v.theta.mean().ncols(), kk);
        assert_eq!(v.sw.num_factors(), kk);
    }
    assert_eq!(net.r2_per_factor().shape(), (2, kk));
    Ok(())
}

#[test]
fn observed_data_are_left_untouched() -> anyhow::Result<()> {
    let sim = simulate(&SimParams {
        num_samples: 50,
        num_features: vec![20, 10],
        num_factors: 2,
        ..Default::default()
    })?;
    let mut config = Config::default();
    config.model.num_factors = 3;
    config.train.maxiter = 20;

    let (data, trials) = fit(sim.data, &config, 1)?;
    for (v, y) in trials[0].net.views.iter().zip(data.views.iter()) {
        assert_eq!(v.y.data(), &y.y);
        assert_eq!(v.y.effective(), &y.y);
    }
    Ok(())
}

#[test]
fn binary_and_count_views_train() -> anyhow::Result<()> {
    let likelihoods = vec![Likelihood::Gaussian, Likelihood::Bernoulli, Likelihood::Poisson];
    let sim = simulate(&SimParams {
        num_samples: 80,
        num_features: vec![20, 20, 20],
        num_factors: 2,
        likelihoods: likelihoods.clone(),
        ..Default::default()
    })?;
    let mut config = Config::default();
    config.model.num_factors = 3;
    config.model.likelihoods = likelihoods.iter().map(|x| x.to_string()).collect();
    config.train.maxiter = 50;

    let (data, trials) = fit(sim.data, &config, 1)?;
    let best = &trials[0];
    assert!(best.summary.final_elbo().is_finite());
    assert_eq!(best.net.views[1].y.likelihood(), Likelihood::Bernoulli);

    // the pseudo-data replace the raw data of non-gaussian views
    assert_eq!(best.net.views[1].y.data(), &data.views[1].y);
    assert_ne!(best.net.views[1].y.effective(), &data.views[1].y);
    assert!(best.net.views[2].y.kappa().is_some());
    assert!(best.net.views[0].y.kappa().is_none());
    Ok(())
}

#[test]
fn non_finite_elbo_names_a_node() -> anyhow::Result<()> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(3);
    let y = Mat::rnorm_with(10, 4, &mut rng);
    let data = MultiViewData::from_matrices(vec![y]);
    let mut config = Config::default();
    config.model.num_factors = 2;
    let spec = config.resolve(1)?;

    let mut net = BayesNet::build(&data, &spec, &mut rng)?;
    net.z.override_expectation(Mat::from_element(10, 2, 1e200))?;

    match net.calculate_elbo(0) {
        Err(LentilError::NonFiniteElbo { node, value }) => {
            assert!(!value.is_finite());
            assert!(net.nodes().iter().any(|x| x.name() == node), "{}", node);
        }
        other => panic!("expected a non-finite ELBO, got {:?}", other.map(|x| x.total)),
    }
    Ok(())
}
