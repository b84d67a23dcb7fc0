//! The Bayesian network of a multi-view factor model: one shared
//! factor node `Z` and, per view, the data `Y` with its loadings `SW`,
//! ARD precisions `Alpha`, noise precisions `Tau` and sparsity
//! probabilities `Theta`.

use crate::common::*;
use crate::config::{FactorPosterior, Likelihood, ModelSpec, NodeGroup, TrainOptions, ZInitMean};
use crate::data::MultiViewData;
use crate::drop_rules::factors_to_keep;
use crate::error::AtNode;
use crate::nodes::*;
use crate::stats::{r2_per_factor, r2_per_view};

use matrix_param::dmatrix_bernoulli_gaussian::BernoulliGaussianMatrix;
use matrix_param::dmatrix_beta::BetaMatrix;
use matrix_param::dmatrix_gamma::GammaMatrix;
use matrix_param::dmatrix_gaussian::GaussianMatrix;
use matrix_param::dmatrix_mv_gaussian::MvGaussianMatrix;
use matrix_param::traits::TwoStatParam;
use matrix_util::traits::SampleOps;

use serde::Serialize;
use std::collections::BTreeMap;

/// Relative size of an ELBO decrease reported as a warning
const ELBO_DECREASE_SLACK: f64 = 1e-6;

/// The nodes owned by one view
#[derive(Clone, Debug)]
pub struct ViewNodes {
    pub name: Box<str>,
    pub y: ObservedView,
    pub sw: SpikeSlabNode,
    pub alpha: AlphaNode,
    pub tau: TauNode,
    pub theta: ThetaNode,
}

#[derive(Clone, Debug, Serialize)]
pub struct ElboRecord {
    pub iter: usize,
    pub total: f64,
    /// contribution of every node, by name
    pub terms: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainSummary {
    pub num_iter: usize,
    pub converged: bool,
    pub num_factors: usize,
    /// iteration whose state the network holds after training
    pub kept_iter: Option<usize>,
    pub elbo_trace: Vec<ElboRecord>,
}

impl TrainSummary {
    /// ELBO of the state the network holds after training
    pub fn final_elbo(&self) -> f64 {
        self.elbo_trace
            .iter()
            .rev()
            .find(|x| Some(x.iter) == self.kept_iter)
            .map(|x| x.total)
            .unwrap_or(f64::NEG_INFINITY)
    }
}

#[derive(Clone, Debug)]
pub struct BayesNet {
    pub z: FactorNode,
    pub views: Vec<ViewNodes>,
    schedule: Vec<NodeGroup>,
    train: TrainOptions,
}

fn gamma_posterior(
    dim: Dim,
    prior: &GammaMatrix,
    init: &crate::config::GammaInit,
) -> Result<GammaMatrix, matrix_param::error::DistributionError> {
    let a = init.a.unwrap_or(prior.stat_a()[(0, 0)]);
    let b = init.b.unwrap_or(prior.stat_b()[(0, 0)]);
    GammaMatrix::new_const(dim, a, b)
}

/// Overwrite `E` and `lnE` of a Gamma posterior with a constant
fn seed_gamma_mean(
    e: Option<f64>,
    dim: Dim,
    mut set: impl FnMut(&str, Mat) -> NodeResult<()>,
) -> NodeResult<()> {
    if let Some(e) = e {
        let (r, c) = dim.shape();
        set("E", Mat::from_element(r, c, e))?;
        set("lnE", Mat::from_element(r, c, e.ln()))?;
    }
    Ok(())
}

impl BayesNet {
    /// Build every node from checked options. `data` should already be
    /// centred as configured; `rng` seeds `E[Z]`.
    pub fn build<R: rand::Rng + ?Sized>(
        data: &MultiViewData,
        spec: &ModelSpec,
        rng: &mut R,
    ) -> NodeResult<Self> {
        data.check(&spec.likelihoods)?;

        let nn = data.num_samples();
        let kk = spec.num_factors;
        let init = &spec.init;

        //////////////////////
        // shared factors Z //
        //////////////////////

        let z_dim = Dim::samples_factors(nn, kk);
        let z_mean = match init.z.mean {
            ZInitMean::Random => Mat::rnorm_with(nn, kk, rng),
            ZInitMean::Zeros => Mat::zeros(nn, kk),
        };
        let pz = spec.prior_z;
        let z = match spec.factor_posterior {
            FactorPosterior::Univariate => {
                let p = GaussianMatrix::new_const(z_dim, pz.mean, pz.var)
                    .config_at_node("Z")?;
                let q = GaussianMatrix::new(z_dim, z_mean, Mat::from_element(nn, kk, init.z.var))
                    .config_at_node("Z")?;
                FactorNode::univariate(p, q)?
            }
            FactorPosterior::Multivariate => {
                let p = MvGaussianMatrix::new_isotropic(z_dim, pz.mean, pz.var)
                    .config_at_node("Z")?;
                let cov = vec![Mat::identity(kk, kk) * init.z.var; nn];
                let q = MvGaussianMatrix::new(z_dim, z_mean, cov).config_at_node("Z")?;
                FactorNode::multivariate(p, q)?
            }
        };

        let mut views = Vec::with_capacity(data.num_views());
        for (view, &likelihood) in data.views.iter().zip(spec.likelihoods.iter()) {
            let vname = view.name.as_ref();
            let dd = view.y.ncols();
            let node_name = |kind: &str| format!("{}[{}]", kind, vname);

            // alpha //
            let dim = Dim::per_factor(kk);
            let pa = spec.prior_alpha;
            let p = GammaMatrix::new_const(dim, pa.a, pa.b).config_at_node(&node_name("Alpha"))?;
            let q = gamma_posterior(dim, &p, &init.alpha).config_at_node(&node_name("Alpha"))?;
            let mut alpha = AlphaNode::new(vname, p, q)?;
            seed_gamma_mean(init.alpha.e, dim, |m, x| alpha.override_expectation(m, x))?;

            // data and noise //
            let y = ObservedView::new(vname, likelihood, view.y.clone())?;
            let tau = match (likelihood, y.kappa(), spec.prior_tau) {
                (Likelihood::Gaussian, _, Some(pt)) => {
                    let dim = Dim::per_feature(dd);
                    let p = GammaMatrix::new_const(dim, pt.a, pt.b)
                        .config_at_node(&node_name("Tau"))?;
                    let q = gamma_posterior(dim, &p, &init.tau).config_at_node(&node_name("Tau"))?;
                    let mut tau = TauNode::learned(vname, p, q)?;
                    seed_gamma_mean(init.tau.e, dim, |m, x| tau.override_expectation(m, x))?;
                    tau
                }
                (_, Some(kappa), _) => TauNode::fixed(vname, kappa.clone())?,
                _ => {
                    return Err(LentilError::Config(format!(
                        "no noise model for {} view `{}`",
                        likelihood, vname
                    )))
                }
            };

            // theta //
            let theta = match spec.prior_theta {
                Some(pt) if spec.learn_theta => {
                    let dim = Dim::per_factor(kk);
                    let p = BetaMatrix::new_const(dim, pt.a, pt.b)
                        .config_at_node(&node_name("Theta"))?;
                    let q = BetaMatrix::new_const(
                        dim,
                        init.theta.a.unwrap_or(pt.a),
                        init.theta.b.unwrap_or(pt.b),
                    )
                    .config_at_node(&node_name("Theta"))?;
                    ThetaNode::learned(vname, p, q)?
                }
                _ => ThetaNode::fixed(vname, init.theta.value, kk)?,
            };

            // loadings //
            let dim = Dim::features_factors(dd, kk);
            let ealpha = alpha.mean();
            let spike = Mat::from_fn(dd, kk, |_, k| {
                init.sw
                    .spike_var
                    .unwrap_or_else(|| 1. / ealpha[(0, k)])
            });
            let etheta = theta.mean();
            let p = BernoulliGaussianMatrix::new(
                dim,
                Mat::from_fn(dd, kk, |_, k| etheta[(0, k)]),
                Mat::zeros(dd, kk),
                spike.clone(),
                spike.clone(),
            )
            .config_at_node(&node_name("SW"))?;
            let q = BernoulliGaussianMatrix::new(
                dim,
                Mat::from_element(dd, kk, init.sw.theta),
                Mat::from_element(dd, kk, init.sw.mean),
                Mat::from_element(dd, kk, init.sw.var),
                spike,
            )
            .config_at_node(&node_name("SW"))?;
            let sw = SpikeSlabNode::new(vname, p, q)?;

            views.push(ViewNodes {
                name: view.name.clone(),
                y,
                sw,
                alpha,
                tau,
                theta,
            });
        }

        let ret = Self {
            z,
            views,
            schedule: spec.schedule.clone(),
            train: spec.train.clone(),
        };
        ret.check_factor_axes()?;
        Ok(ret)
    }

    pub fn num_factors(&self) -> usize {
        self.z.num_factors()
    }

    pub fn schedule(&self) -> &[NodeGroup] {
        &self.schedule
    }

    /// Every node, `Z` first, then each view's nodes in a fixed order
    pub fn nodes(&self) -> Vec<NodeRef<'_>> {
        let mut ret = vec![NodeRef::Factor(&self.z)];
        for v in self.views.iter() {
            ret.push(NodeRef::Observed(&v.y));
            ret.push(NodeRef::SpikeSlab(&v.sw));
            ret.push(NodeRef::Alpha(&v.alpha));
            ret.push(NodeRef::Tau(&v.tau));
            ret.push(NodeRef::Theta(&v.theta));
        }
        ret
    }

    /// Update every node of a group with its current blanket
    pub fn update_group(&mut self, group: NodeGroup) -> NodeResult<()> {
        match group {
            NodeGroup::Z => {
                let blanket = ZBlanket {
                    views: self
                        .views
                        .iter()
                        .map(|v| ViewTerms {
                            y: v.y.effective(),
                            sw: v.sw.q(),
                            tau: v.tau.mean(),
                        })
                        .collect(),
                };
                self.z.update(&blanket)?;
            }
            NodeGroup::SW => {
                let z = &self.z;
                for v in self.views.iter_mut() {
                    v.sw.update(&SwBlanket {
                        y: &v.y,
                        z,
                        tau: &v.tau,
                        alpha: &v.alpha,
                        theta: &v.theta,
                    })?;
                }
            }
            NodeGroup::Alpha => {
                for v in self.views.iter_mut() {
                    v.alpha.update(&AlphaBlanket { sw: &v.sw })?;
                }
            }
            NodeGroup::Tau => {
                let z = &self.z;
                for v in self.views.iter_mut() {
                    v.tau.update(&TauBlanket {
                        y: &v.y,
                        z,
                        sw: &v.sw,
                    })?;
                }
            }
            NodeGroup::Theta => {
                for v in self.views.iter_mut() {
                    v.theta.update(&ThetaBlanket { sw: &v.sw })?;
                }
            }
            NodeGroup::Y => {
                let z = &self.z;
                for v in self.views.iter_mut() {
                    v.y.update(&YBlanket {
                        z,
                        sw: &v.sw,
                        tau: &v.tau,
                    })?;
                }
            }
        }
        Ok(())
    }

    /// One pass of the schedule
    pub fn iterate(&mut self) -> NodeResult<()> {
        for group in self.schedule.clone() {
            let tic = std::time::Instant::now();
            self.update_group(group)?;
            debug!("updated {} in {:?}", group, tic.elapsed());
        }
        Ok(())
    }

    /// The evidence lower bound with every node's term; a non-finite
    /// term is an error naming its node
    pub fn calculate_elbo(&self, iter: usize) -> NodeResult<ElboRecord> {
        let z = &self.z;
        let mut terms = BTreeMap::new();

        let zblanket = ZBlanket {
            views: self
                .views
                .iter()
                .map(|v| ViewTerms {
                    y: v.y.effective(),
                    sw: v.sw.q(),
                    tau: v.tau.mean(),
                })
                .collect(),
        };
        terms.insert(z.name().to_string(), z.calculate_elbo(&zblanket));

        for v in self.views.iter() {
            let y = v.y.calculate_elbo(&YBlanket {
                z,
                sw: &v.sw,
                tau: &v.tau,
            });
            let sw = v.sw.calculate_elbo(&SwBlanket {
                y: &v.y,
                z,
                tau: &v.tau,
                alpha: &v.alpha,
                theta: &v.theta,
            });
            let alpha = v.alpha.calculate_elbo(&AlphaBlanket { sw: &v.sw });
            let tau = v.tau.calculate_elbo(&TauBlanket {
                y: &v.y,
                z,
                sw: &v.sw,
            });
            let theta = v.theta.calculate_elbo(&ThetaBlanket { sw: &v.sw });

            terms.insert(v.y.name().to_string(), y);
            terms.insert(v.sw.name().to_string(), sw);
            terms.insert(v.alpha.name().to_string(), alpha);
            terms.insert(v.tau.name().to_string(), tau);
            terms.insert(v.theta.name().to_string(), theta);
        }

        if let Some((node, &value)) = terms.iter().find(|(_, x)| !x.is_finite()) {
            return Err(LentilError::NonFiniteElbo {
                node: node.clone(),
                value,
            });
        }

        Ok(ElboRecord {
            iter,
            total: terms.values().sum(),
            terms,
        })
    }

    /// `R^2` of every factor in every view, `M x K`
    pub fn r2_per_factor(&self) -> Mat {
        let ys = self.views.iter().map(|v| v.y.effective()).collect::<Vec<_>>();
        let sws = self.views.iter().map(|v| v.sw.q()).collect::<Vec<_>>();
        r2_per_factor(&ys, &self.z, &sws)
    }

    /// `R^2` of all factors together, one per view
    pub fn r2_per_view(&self) -> Vec<f64> {
        let ys = self.views.iter().map(|v| v.y.effective()).collect::<Vec<_>>();
        let sws = self.views.iter().map(|v| v.sw.q()).collect::<Vec<_>>();
        r2_per_view(&ys, &self.z, &sws)
    }

    /// Keep factors `keep` in every factor-indexed node at once
    pub fn drop_factors(&mut self, keep: &[usize]) -> NodeResult<()> {
        let kk = self.num_factors();
        if keep.is_empty() {
            return Err(LentilError::DropAllFactors(kk));
        }
        self.z.drop_factors(keep)?;
        for v in self.views.iter_mut() {
            v.sw.drop_factors(keep)?;
            v.alpha.drop_factors(keep)?;
            v.theta.drop_factors(keep)?;
        }
        self.check_factor_axes()
    }

    /// Every factor-indexed node has `K` factors and its expectations
    /// have the shape of its dimension
    pub fn check_factor_axes(&self) -> NodeResult<()> {
        let kk = self.num_factors();
        for node in self.nodes() {
            let dim = node.dim();
            let Some(found) = dim.num_factors() else {
                continue;
            };
            let stale = |found: usize| LentilError::StaleFactorAxis {
                node: node.name().to_string(),
                expected: kk,
                found,
            };
            if found != kk {
                return Err(stale(found));
            }
            for dist in [Dist::P, Dist::Q] {
                for value in node.expectations(dist).values() {
                    if let Some(mat) = value.as_matrix() {
                        if mat.shape() != dim.shape() {
                            return Err(stale(mat.ncols()));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply the enabled drop rules; true if any factor went away
    pub fn apply_drop_rules(&mut self) -> NodeResult<bool> {
        let kk = self.num_factors();
        let keep = factors_to_keep(&self.train.drop, self.z.mean(), &self.r2_per_factor())?;
        if keep.len() == kk {
            return Ok(false);
        }
        info!("dropping {} of {} factors", kk - keep.len(), kk);
        self.drop_factors(&keep)?;
        Ok(true)
    }

    /// Coordinate ascent until the ELBO changes by less than the
    /// tolerance or `maxiter` passes. Without convergence the nodes are
    /// left at the state of the highest recorded ELBO.
    pub fn train(&mut self) -> NodeResult<TrainSummary> {
        let opts = self.train.clone();
        let mut elbo_trace: Vec<ElboRecord> = Vec::new();
        let mut converged = false;
        let mut dropped_since_elbo = false;
        let mut num_iter = 0;

        // highest ELBO so far with the nodes that produced it
        let mut best: Option<(f64, usize, FactorNode, Vec<ViewNodes>)> = None;

        for iter in 0..opts.maxiter {
            if opts.drop.any() && opts.drops_at(iter) && self.apply_drop_rules()? {
                dropped_since_elbo = true;
            }

            self.iterate()?;
            num_iter = iter + 1;

            if num_iter % opts.elbofreq != 0 && num_iter != opts.maxiter {
                continue;
            }

            let record = self.calculate_elbo(iter)?;
            let elbo = record.total;

            if let Some(prev) = elbo_trace.last().map(|x| x.total) {
                let delta = elbo - prev;
                if !dropped_since_elbo {
                    if delta < -ELBO_DECREASE_SLACK * prev.abs().max(1.) {
                        warn!("iter {:4}: ELBO decreased by {:.4e}", iter, -delta);
                    }
                    if delta.abs() < opts.tolerance {
                        converged = true;
                    }
                }
            }
            dropped_since_elbo = false;

            if iter % 10 == 0 {
                info!(
                    "iter {:4}: ELBO = {:12.4}, K = {}",
                    iter,
                    elbo,
                    self.num_factors()
                );
            }
            elbo_trace.push(record);

            if best.as_ref().map_or(true, |(b, ..)| elbo > *b) {
                best = Some((elbo, iter, self.z.clone(), self.views.clone()));
            }

            if converged && !opts.forceiter {
                info!("converged at iteration {} (ELBO = {:.4})", iter, elbo);
                break;
            }
        }

        let mut kept_iter = elbo_trace.last().map(|x| x.iter);

        if !converged {
            warn!("no convergence after {} iterations", num_iter);
            if let Some((elbo, iter, z, views)) = best {
                if Some(iter) != kept_iter {
                    info!("keeping the state of iteration {} (ELBO = {:.4})", iter, elbo);
                    self.z = z;
                    self.views = views;
                    kept_iter = Some(iter);
                }
            }
        }

        Ok(TrainSummary {
            num_iter,
            converged,
            num_factors: self.num_factors(),
            kept_iter,
            elbo_trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use rand::SeedableRng;

    fn small_data() -> MultiViewData {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let z = Mat::rnorm_with(30, 2, &mut rng);
        let w1 = Mat::rnorm_with(8, 2, &mut rng);
        let w2 = Mat::rnorm_with(5, 2, &mut rng);
        let y1 = &z * w1.transpose() + Mat::rnorm_with(30, 8, &mut rng) * 0.1;
        let y2 = &z * w2.transpose() + Mat::rnorm_with(30, 5, &mut rng) * 0.1;
        MultiViewData::from_matrices(vec![y1, y2])
    }

    #[test]
    fn built_nodes_have_consistent_factor_axes() -> anyhow::Result<()> {
        let data = small_data();
        let mut config = Config::default();
        config.model.num_factors = 4;
        let spec = config.resolve(2)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut net = BayesNet::build(&data, &spec, &mut rng)?;

        assert_eq!(net.nodes().len(), 11);
        net.drop_factors(&[0, 3])?;
        assert_eq!(net.num_factors(), 2);
        for node in net.nodes() {
            if let Some(kk) = node.dim().num_factors() {
                assert_eq!(kk, 2, "{}", node.name());
            }
        }
        assert!(matches!(
            net.drop_factors(&[]),
            Err(LentilError::DropAllFactors(2))
        ));
        Ok(())
    }

    #[test]
    fn seeded_expectations_reach_the_first_update() -> anyhow::Result<()> {
        let data = small_data();
        let spec = Config::default().resolve(2)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let net = BayesNet::build(&data, &spec, &mut rng)?;
        approx::assert_abs_diff_eq!(net.views[0].alpha.mean()[(0, 0)], 100., epsilon = 1e-12);
        approx::assert_abs_diff_eq!(
            net.views[1].tau.log_mean()[(0, 0)],
            100_f64.ln(),
            epsilon = 1e-12
        );
        Ok(())
    }

    fn train_small(config: &Config) -> anyhow::Result<(BayesNet, TrainSummary)> {
        let spec = config.resolve(2)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        let mut data = small_data();
        data.centre_gaussian_views(&spec.likelihoods);
        let mut net = BayesNet::build(&data, &spec, &mut rng)?;
        let summary = net.train()?;
        Ok((net, summary))
    }

    fn recorded_iters(summary: &TrainSummary) -> Vec<usize> {
        summary.elbo_trace.iter().map(|x| x.iter).collect()
    }

    #[test]
    fn default_priors_keep_closed_form_moments() -> anyhow::Result<()> {
        let data = small_data();
        let spec = Config::default().resolve(2)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let net = BayesNet::build(&data, &spec, &mut rng)?;

        for v in net.views.iter() {
            let params = v.alpha.parameters(Dist::P);
            let (Some(shape), Some(rate)) = (
                params.get("shape").and_then(|x| x.as_matrix()),
                params.get("rate").and_then(|x| x.as_matrix()),
            ) else {
                panic!("missing gamma parameters");
            };
            let expected = shape[(0, 0)] / rate[(0, 0)];
            approx::assert_relative_eq!(
                v.alpha.expectation(Dist::P)[(0, 0)],
                expected,
                max_relative = 1e-10
            );
        }
        Ok(())
    }

    #[test]
    fn unobserved_feature_keeps_the_prior_noise() -> anyhow::Result<()> {
        let mut data = small_data();
        data.views[0].y.column_mut(0).fill(f64::NAN);
        let spec = Config::default().resolve(2)?;
        let mut rng = rand::rngs::StdRng::seed_from_u64(0);
        let mut net = BayesNet::build(&data, &spec, &mut rng)?;

        net.update_group(NodeGroup::Tau)?;
        let prior = spec.prior_tau.map(|x| x.a / x.b).unwrap_or(f64::NAN);
        approx::assert_relative_eq!(net.views[0].tau.mean()[(0, 0)], prior, max_relative = 1e-10);
        assert!(net.views[0].tau.mean()[(0, 1)].is_finite());
        Ok(())
    }

    #[test]
    fn runs_out_of_iterations_without_converging() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 3;
        config.train.tolerance = 0.;
        config.train.maxiter = 5;

        let (net, summary) = train_small(&config)?;
        assert!(!summary.converged);
        assert_eq!(summary.num_iter, 5);
        assert_eq!(recorded_iters(&summary), vec![0, 1, 2, 3, 4]);

        let best = summary
            .elbo_trace
            .iter()
            .map(|x| x.total)
            .fold(f64::NEG_INFINITY, f64::max);
        approx::assert_abs_diff_eq!(summary.final_elbo(), best, epsilon = 1e-12);
        approx::assert_relative_eq!(
            net.calculate_elbo(0)?.total,
            best,
            max_relative = 1e-10
        );
        Ok(())
    }

    #[test]
    fn stops_once_the_elbo_settles() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 3;
        config.train.tolerance = 1e12;
        config.train.maxiter = 50;

        let (_, summary) = train_small(&config)?;
        assert!(summary.converged);
        assert_eq!(summary.num_iter, 2);
        assert_eq!(recorded_iters(&summary), vec![0, 1]);
        assert_eq!(summary.kept_iter, Some(1));
        Ok(())
    }

    #[test]
    fn forced_iterations_run_past_convergence() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 3;
        config.train.tolerance = 1e12;
        config.train.forceiter = true;
        config.train.maxiter = 6;

        let (_, summary) = train_small(&config)?;
        assert!(summary.converged);
        assert_eq!(summary.num_iter, 6);
        assert_eq!(recorded_iters(&summary), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(summary.kept_iter, Some(5));
        Ok(())
    }

    #[test]
    fn elbo_is_recorded_every_few_iterations_and_at_the_end() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 3;
        config.train.tolerance = 0.;
        config.train.elbofreq = 3;
        config.train.maxiter = 10;

        let (_, summary) = train_small(&config)?;
        assert_eq!(summary.num_iter, 10);
        assert_eq!(recorded_iters(&summary), vec![2, 5, 8, 9]);
        Ok(())
    }

    #[test]
    fn drops_wait_for_the_first_drop_iteration() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 4;
        config.train.tolerance = 0.;
        config.train.forceiter = true;
        config.train.drop.by_cor = Some(0.);
        config.train.start_drop = 3;

        config.train.maxiter = 3;
        let (net, _) = train_small(&config)?;
        assert_eq!(net.num_factors(), 4);

        // every factor correlates a little with the first one
        config.train.maxiter = 4;
        let (net, summary) = train_small(&config)?;
        assert_eq!(net.num_factors(), 1);
        assert_eq!(summary.num_factors, 1);
        net.check_factor_axes()?;
        Ok(())
    }

    #[test]
    fn convergence_is_not_tested_across_a_drop() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 3;
        config.train.tolerance = 1e12;
        config.train.maxiter = 50;
        config.train.drop.by_cor = Some(0.);
        config.train.start_drop = 1;

        let (net, summary) = train_small(&config)?;
        assert!(summary.converged);
        assert_eq!(net.num_factors(), 1);
        assert_eq!(summary.num_iter, 3);
        assert_eq!(recorded_iters(&summary), vec![0, 1, 2]);
        Ok(())
    }

    #[test]
    fn without_convergence_the_best_state_is_kept() -> anyhow::Result<()> {
        let mut config = Config::default();
        config.model.num_factors = 4;
        config.train.tolerance = 0.;
        config.train.maxiter = 6;
        config.train.drop.by_cor = Some(0.);
        config.train.start_drop = 5;

        // two strong factors squeezed into one at the last iteration
        let (net, summary) = train_small(&config)?;
        assert!(!summary.converged);
        assert_eq!(recorded_iters(&summary).len(), 6);
        assert_ne!(summary.kept_iter, Some(5));
        assert_eq!(net.num_factors(), 4);
        assert_eq!(summary.num_factors, 4);
        net.check_factor_axes()?;

        let last = summary.elbo_trace.last().map(|x| x.total).unwrap_or(f64::NAN);
        assert!(summary.final_elbo() > last);
        approx::assert_relative_eq!(
            net.calculate_elbo(0)?.total,
            summary.final_elbo(),
            max_relative = 1e-10
        );
        Ok(())
    }
}
