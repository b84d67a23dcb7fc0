//! Configuration bundle of a model fit.
//!
//! `Config` is what users write (JSON); optional values are `Option`s
//! and names are strings. `Config::resolve` checks everything once,
//! before any node is built, and returns a `ModelSpec` with parsed
//! enums and concrete hyperparameters.

use crate::common::*;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::str::FromStr;

/// Observation model of a view
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Likelihood {
    Gaussian,
    Bernoulli,
    Poisson,
}

impl FromStr for Likelihood {
    type Err = LentilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gaussian" => Ok(Likelihood::Gaussian),
            "bernoulli" => Ok(Likelihood::Bernoulli),
            "poisson" => Ok(Likelihood::Poisson),
            _ => Err(LentilError::Config(format!(
                "invalid likelihood `{}` (gaussian, bernoulli or poisson)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for Likelihood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Likelihood::Gaussian => "gaussian",
            Likelihood::Bernoulli => "bernoulli",
            Likelihood::Poisson => "poisson",
        };
        write!(f, "{}", name)
    }
}

/// Groups of nodes the schedule can name. One group covers the node
/// of that kind in every view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum NodeGroup {
    /// pseudo-data of non-gaussian views
    Y,
    Z,
    SW,
    Alpha,
    Tau,
    Theta,
}

impl NodeGroup {
    pub const ALL: [NodeGroup; 6] = [
        NodeGroup::Y,
        NodeGroup::Z,
        NodeGroup::SW,
        NodeGroup::Alpha,
        NodeGroup::Tau,
        NodeGroup::Theta,
    ];
}

impl FromStr for NodeGroup {
    type Err = LentilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeGroup::ALL
            .into_iter()
            .find(|g| g.to_string() == s)
            .ok_or_else(|| {
                LentilError::Config(format!(
                    "unknown schedule entry `{}` (Y, Z, SW, Alpha, Tau or Theta)",
                    s
                ))
            })
    }
}

impl std::fmt::Display for NodeGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeGroup::Y => "Y",
            NodeGroup::Z => "Z",
            NodeGroup::SW => "SW",
            NodeGroup::Alpha => "Alpha",
            NodeGroup::Tau => "Tau",
            NodeGroup::Theta => "Theta",
        };
        write!(f, "{}", name)
    }
}

/// Variational family of the factor matrix
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FactorPosterior {
    /// one Gaussian per entry
    Univariate,
    /// one multivariate Gaussian per sample
    Multivariate,
}

impl FromStr for FactorPosterior {
    type Err = LentilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "univariate" => Ok(FactorPosterior::Univariate),
            "multivariate" => Ok(FactorPosterior::Multivariate),
            _ => Err(LentilError::Config(format!(
                "invalid factor posterior `{}` (univariate or multivariate)",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GaussianPrior {
    pub mean: f64,
    pub var: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GammaPrior {
    pub a: f64,
    pub b: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BetaPrior {
    pub a: f64,
    pub b: f64,
}

/// Prior hyperparameters; `tau` is required for gaussian views and
/// `theta` when it is learned
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Priors {
    pub z: Option<GaussianPrior>,
    pub alpha: Option<GammaPrior>,
    pub tau: Option<GammaPrior>,
    pub theta: Option<BetaPrior>,
}

impl Default for Priors {
    fn default() -> Self {
        Self {
            z: Some(GaussianPrior { mean: 0., var: 1. }),
            alpha: Some(GammaPrior { a: 1e-14, b: 1e-14 }),
            tau: Some(GammaPrior { a: 1e-14, b: 1e-14 }),
            theta: Some(BetaPrior { a: 1., b: 1. }),
        }
    }
}

/// How to seed `E[Z]`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZInitMean {
    /// standard normal draws
    Random,
    Zeros,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ZInit {
    pub mean: ZInitMean,
    pub var: f64,
}

impl Default for ZInit {
    fn default() -> Self {
        Self {
            mean: ZInitMean::Random,
            var: 1.,
        }
    }
}

/// Initial Gamma posterior: missing `a`/`b` fall back to the prior;
/// `e` overrides the first moment
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GammaInit {
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub e: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SwInit {
    pub theta: f64,
    pub mean: f64,
    pub var: f64,
    /// variance of the spike; `1 / E[alpha]` if absent
    pub spike_var: Option<f64>,
}

impl Default for SwInit {
    fn default() -> Self {
        Self {
            theta: 0.5,
            mean: 0.,
            var: 1.,
            spike_var: None,
        }
    }
}

/// Initial Beta posterior of a learned `Theta`, or its fixed value
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ThetaInit {
    pub a: Option<f64>,
    pub b: Option<f64>,
    pub value: f64,
}

impl Default for ThetaInit {
    fn default() -> Self {
        Self {
            a: None,
            b: None,
            value: 0.5,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InitOptions {
    pub z: ZInit,
    pub alpha: GammaInit,
    pub tau: GammaInit,
    pub sw: SwInit,
    pub theta: ThetaInit,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            z: ZInit::default(),
            alpha: GammaInit {
                a: None,
                b: None,
                e: Some(100.),
            },
            tau: GammaInit {
                a: None,
                b: None,
                e: Some(100.),
            },
            sw: SwInit::default(),
            theta: ThetaInit::default(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// one per view
    pub likelihoods: Vec<String>,
    /// initial number of factors
    pub num_factors: usize,
    pub learn_theta: bool,
    /// `univariate` or `multivariate`
    pub factor_posterior: String,
    /// centre gaussian views per feature
    pub center_features: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            likelihoods: vec![],
            num_factors: 10,
            learn_theta: true,
            factor_posterior: "univariate".into(),
            center_features: true,
        }
    }
}

/// Thresholds of the factor-dropping rules; `None` disables a rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DropOptions {
    /// drop a factor whose mean squared `E[Z]` falls below this
    pub by_norm: Option<f64>,
    /// drop a factor whose largest share of explained variance falls
    /// below this
    pub by_pvar: Option<f64>,
    /// drop the later of two factors whose absolute correlation
    /// exceeds this
    pub by_cor: Option<f64>,
    /// drop a factor that explains less than this `R^2` in every view
    pub by_r2: Option<f64>,
}

impl DropOptions {
    pub fn any(&self) -> bool {
        self.by_norm.is_some()
            || self.by_pvar.is_some()
            || self.by_cor.is_some()
            || self.by_r2.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainOptions {
    pub schedule: Vec<String>,
    pub maxiter: usize,
    /// absolute ELBO change regarded as convergence
    pub tolerance: f64,
    /// keep iterating after convergence
    pub forceiter: bool,
    /// compute the ELBO every `elbofreq` iterations
    pub elbofreq: usize,
    /// first iteration at which factors may be dropped
    pub start_drop: usize,
    /// try to drop factors every `freq_drop` iterations
    pub freq_drop: usize,
    pub drop: DropOptions,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            schedule: ["SW", "Z", "Alpha", "Tau", "Theta", "Y"]
                .iter()
                .map(|x| x.to_string())
                .collect(),
            maxiter: 1000,
            tolerance: 1e-2,
            forceiter: false,
            elbofreq: 1,
            start_drop: 1,
            freq_drop: 1,
            drop: DropOptions::default(),
            seed: 42,
        }
    }
}

impl TrainOptions {
    /// Whether the drop rules run before iteration `iter`
    pub fn drops_at(&self, iter: usize) -> bool {
        iter >= self.start_drop && (iter - self.start_drop) % self.freq_drop.max(1) == 0
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelOptions,
    pub priors: Priors,
    pub init: InitOptions,
    pub train: TrainOptions,
}

/// A checked configuration
#[derive(Clone, Debug)]
pub struct ModelSpec {
    pub likelihoods: Vec<Likelihood>,
    pub num_factors: usize,
    pub learn_theta: bool,
    pub factor_posterior: FactorPosterior,
    pub center_features: bool,
    pub prior_z: GaussianPrior,
    pub prior_alpha: GammaPrior,
    /// present whenever a gaussian view exists
    pub prior_tau: Option<GammaPrior>,
    /// present whenever theta is learned
    pub prior_theta: Option<BetaPrior>,
    pub init: InitOptions,
    pub schedule: Vec<NodeGroup>,
    pub train: TrainOptions,
}

fn config_err<T>(msg: String) -> NodeResult<T> {
    Err(LentilError::Config(msg))
}

fn check_positive(name: &str, x: f64) -> NodeResult<()> {
    if !(x.is_finite() && x > 0.) {
        return config_err(format!("`{}` must be positive and finite, got {}", name, x));
    }
    Ok(())
}

fn check_unit(name: &str, x: f64) -> NodeResult<()> {
    if !(0. ..=1.).contains(&x) {
        return config_err(format!("`{}` must be in [0, 1], got {}", name, x));
    }
    Ok(())
}

impl Config {
    pub fn from_json_file(file: &str) -> anyhow::Result<Self> {
        let reader = matrix_util::common_io::open_buf_reader(file)?;
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn to_json_file(&self, file: &str) -> anyhow::Result<()> {
        let mut writer = matrix_util::common_io::open_buf_writer(file)?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Check the whole configuration against `num_views` views and
    /// resolve optional values
    pub fn resolve(&self, num_views: usize) -> NodeResult<ModelSpec> {
        let model = &self.model;
        if num_views == 0 {
            return config_err("no views".into());
        }

        let likelihoods = if model.likelihoods.is_empty() {
            vec![Likelihood::Gaussian; num_views]
        } else {
            model
                .likelihoods
                .iter()
                .map(|x| x.parse())
                .collect::<NodeResult<Vec<_>>>()?
        };
        if likelihoods.len() != num_views {
            return config_err(format!(
                "{} likelihoods for {} views",
                likelihoods.len(),
                num_views
            ));
        }

        if model.num_factors == 0 {
            return config_err("`num_factors` must be at least 1".into());
        }
        let factor_posterior: FactorPosterior = model.factor_posterior.parse()?;

        let Some(prior_z) = self.priors.z else {
            return config_err("missing prior of Z".into());
        };
        check_positive("priors.z.var", prior_z.var)?;
        if !prior_z.mean.is_finite() {
            return config_err("`priors.z.mean` must be finite".into());
        }

        let Some(prior_alpha) = self.priors.alpha else {
            return config_err("missing prior of Alpha".into());
        };
        check_positive("priors.alpha.a", prior_alpha.a)?;
        check_positive("priors.alpha.b", prior_alpha.b)?;

        let prior_tau = if likelihoods.contains(&Likelihood::Gaussian) {
            let Some(tau) = self.priors.tau else {
                return config_err("missing prior of Tau required by a gaussian view".into());
            };
            check_positive("priors.tau.a", tau.a)?;
            check_positive("priors.tau.b", tau.b)?;
            Some(tau)
        } else {
            None
        };

        let prior_theta = if model.learn_theta {
            let Some(theta) = self.priors.theta else {
                return config_err("missing prior of Theta, which is learned".into());
            };
            check_positive("priors.theta.a", theta.a)?;
            check_positive("priors.theta.b", theta.b)?;
            Some(theta)
        } else {
            None
        };

        let init = &self.init;
        check_positive("init.z.var", init.z.var)?;
        for (name, gamma) in [("alpha", &init.alpha), ("tau", &init.tau)] {
            for (x, what) in [(gamma.a, "a"), (gamma.b, "b"), (gamma.e, "e")] {
                if let Some(x) = x {
                    check_positive(&format!("init.{}.{}", name, what), x)?;
                }
            }
        }
        check_unit("init.sw.theta", init.sw.theta)?;
        check_positive("init.sw.var", init.sw.var)?;
        if let Some(s0) = init.sw.spike_var {
            check_positive("init.sw.spike_var", s0)?;
        }
        check_unit("init.theta.value", init.theta.value)?;
        for (x, what) in [(init.theta.a, "a"), (init.theta.b, "b")] {
            if let Some(x) = x {
                check_positive(&format!("init.theta.{}", what), x)?;
            }
        }

        let schedule = resolve_schedule(&self.train.schedule)?;

        let train = &self.train;
        if train.maxiter == 0 || train.elbofreq == 0 || train.freq_drop == 0 {
            return config_err("`maxiter`, `elbofreq` and `freq_drop` must be positive".into());
        }
        if !(train.tolerance.is_finite() && train.tolerance >= 0.) {
            return config_err(format!("invalid tolerance {}", train.tolerance));
        }
        let drop = &train.drop;
        for (name, x) in [
            ("by_norm", drop.by_norm),
            ("by_pvar", drop.by_pvar),
            ("by_cor", drop.by_cor),
            ("by_r2", drop.by_r2),
        ] {
            if let Some(x) = x {
                if !(x.is_finite() && x >= 0.) {
                    return config_err(format!("invalid drop threshold {} = {}", name, x));
                }
            }
        }

        Ok(ModelSpec {
            likelihoods,
            num_factors: model.num_factors,
            learn_theta: model.learn_theta,
            factor_posterior,
            center_features: model.center_features,
            prior_z,
            prior_alpha,
            prior_tau,
            prior_theta,
            init: init.clone(),
            schedule,
            train: train.clone(),
        })
    }
}

/// Parse schedule entries; each group at most once
pub fn resolve_schedule(entries: &[String]) -> NodeResult<Vec<NodeGroup>> {
    if entries.is_empty() {
        return config_err("empty schedule".into());
    }
    let mut ret: Vec<NodeGroup> = Vec::with_capacity(entries.len());
    for x in entries {
        let group: NodeGroup = x.parse()?;
        if ret.contains(&group) {
            return config_err(format!("`{}` appears twice in the schedule", group));
        }
        ret.push(group);
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_resolves() -> anyhow::Result<()> {
        let spec = Config::default().resolve(2)?;
        assert_eq!(spec.likelihoods, vec![Likelihood::Gaussian; 2]);
        assert_eq!(spec.schedule.len(), 6);
        assert_eq!(spec.schedule[0], NodeGroup::SW);
        Ok(())
    }

    #[test]
    fn json_fills_defaults() -> anyhow::Result<()> {
        let json = r#"{
            "model": { "likelihoods": ["gaussian", "bernoulli"], "num_factors": 3 },
            "train": { "maxiter": 20, "drop": { "by_r2": 0.01 } }
        }"#;
        let config: Config = serde_json::from_str(json)?;
        let spec = config.resolve(2)?;
        assert_eq!(spec.num_factors, 3);
        assert_eq!(spec.likelihoods[1], Likelihood::Bernoulli);
        assert_eq!(spec.train.maxiter, 20);
        assert_eq!(spec.train.drop.by_r2, Some(0.01));
        assert_eq!(spec.train.drop.by_cor, None);
        assert!(spec.prior_theta.is_some());
        Ok(())
    }

    #[test]
    fn drops_follow_start_and_frequency() {
        let opts = TrainOptions {
            start_drop: 2,
            freq_drop: 3,
            ..Default::default()
        };
        let due = (0..10).filter(|&i| opts.drops_at(i)).collect::<Vec<_>>();
        assert_eq!(due, vec![2, 5, 8]);

        let every = TrainOptions::default();
        assert!(!every.drops_at(0));
        assert!((1..5).all(|i| every.drops_at(i)));
    }
}
