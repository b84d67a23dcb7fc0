//! Rules that prune inactive factors during training.

use crate::common::*;
use crate::config::DropOptions;
use matrix_util::traits::ColumnStatOps;
use std::collections::BTreeSet;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DropRule {
    /// mean of `E[z_nk]^2` below the threshold
    Norm(f64),
    /// largest per-view share of explained variance below the
    /// threshold
    Pvar(f64),
    /// the later of two factors whose absolute correlation exceeds the
    /// threshold
    Cor(f64),
    /// `R^2` at or below the threshold in every view
    R2(f64),
}

impl std::fmt::Display for DropRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropRule::Norm(x) => write!(f, "by_norm({})", x),
            DropRule::Pvar(x) => write!(f, "by_pvar({})", x),
            DropRule::Cor(x) => write!(f, "by_cor({})", x),
            DropRule::R2(x) => write!(f, "by_r2({})", x),
        }
    }
}

/// Enabled rules in the order they are applied
pub fn enabled_rules(opts: &DropOptions) -> Vec<DropRule> {
    [
        opts.by_norm.map(DropRule::Norm),
        opts.by_pvar.map(DropRule::Pvar),
        opts.by_cor.map(DropRule::Cor),
        opts.by_r2.map(DropRule::R2),
    ]
    .into_iter()
    .flatten()
    .collect()
}

impl DropRule {
    /// Factors the rule would drop given `E[Z]` (`N x K`) and the
    /// per-view, per-factor `R^2` (`M x K`)
    pub fn inactive(&self, ez: &Mat, r2: &Mat) -> NodeResult<BTreeSet<usize>> {
        let kk = ez.ncols();
        let ret = match *self {
            DropRule::Norm(thr) => (0..kk)
                .filter(|&k| {
                    let n = ez.nrows().max(1) as f64;
                    ez.column(k).norm_squared() / n < thr
                })
                .collect(),
            DropRule::Pvar(thr) => (0..kk)
                .filter(|&k| {
                    let best_share = (0..r2.nrows())
                        .map(|m| {
                            let total = r2.row(m).iter().map(|x| x.max(0.)).sum::<f64>();
                            if total > 0. {
                                r2[(m, k)] / total
                            } else {
                                0.
                            }
                        })
                        .fold(f64::NEG_INFINITY, f64::max);
                    best_share < thr
                })
                .collect(),
            DropRule::Cor(thr) => {
                let cor = ez
                    .column_correlation(ez)
                    .map_err(|e| LentilError::Numerical {
                        node: "Z".into(),
                        detail: e.to_string(),
                    })?;
                let mut ret = BTreeSet::new();
                for i in 0..kk {
                    for j in (i + 1)..kk {
                        if !ret.contains(&i) && cor[(i, j)].abs() > thr {
                            ret.insert(j);
                        }
                    }
                }
                ret
            }
            DropRule::R2(thr) => (0..kk)
                .filter(|&k| (0..r2.nrows()).all(|m| r2[(m, k)] <= thr))
                .collect(),
        };
        Ok(ret)
    }
}

/// Factors to keep after applying every enabled rule. A rule whose
/// addition would empty the model is skipped.
pub fn factors_to_keep(opts: &DropOptions, ez: &Mat, r2: &Mat) -> NodeResult<Vec<usize>> {
    let kk = ez.ncols();
    let mut drop = BTreeSet::new();

    for rule in enabled_rules(opts) {
        let inactive = rule.inactive(ez, r2)?;
        let merged = drop.union(&inactive).copied().collect::<BTreeSet<_>>();
        if merged.len() >= kk {
            warn!("{} would drop all {} factors; skipped", rule, kk);
            continue;
        }
        if merged.len() > drop.len() {
            debug!("{} marks factors {:?}", rule, inactive);
        }
        drop = merged;
    }

    Ok((0..kk).filter(|k| !drop.contains(k)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_factors() -> (Mat, Mat) {
        // factor 1 is tiny, factor 2 copies factor 0
        let ez = Mat::from_fn(20, 3, |n, k| {
            let x = (n as f64 - 9.5) / 10.;
            match k {
                0 => x,
                1 => 1e-4 * if n % 2 == 0 { 1. } else { -1. },
                _ => 2. * x + 1e-3 * (n % 3) as f64,
            }
        });
        let r2 = Mat::from_row_slice(2, 3, &[0.5, 0.0, 0.2, 0.3, 0.001, 0.1]);
        (ez, r2)
    }

    #[test]
    fn each_rule_finds_its_factor() -> anyhow::Result<()> {
        let (ez, r2) = three_factors();
        assert_eq!(DropRule::Norm(1e-3).inactive(&ez, &r2)?, BTreeSet::from([1]));
        assert_eq!(DropRule::Cor(0.95).inactive(&ez, &r2)?, BTreeSet::from([2]));
        assert_eq!(DropRule::R2(0.01).inactive(&ez, &r2)?, BTreeSet::from([1]));
        assert_eq!(DropRule::Pvar(0.05).inactive(&ez, &r2)?, BTreeSet::from([1]));
        Ok(())
    }

    #[test]
    fn rules_are_combined() -> anyhow::Result<()> {
        let (ez, r2) = three_factors();
        let opts = DropOptions {
            by_norm: Some(1e-3),
            by_cor: Some(0.95),
            ..Default::default()
        };
        assert_eq!(factors_to_keep(&opts, &ez, &r2)?, vec![0]);
        Ok(())
    }

    #[test]
    fn never_drops_everything() -> anyhow::Result<()> {
        let (ez, r2) = three_factors();
        let opts = DropOptions {
            by_r2: Some(10.),
            by_norm: Some(1e-3),
            ..Default::default()
        };
        // by_r2 alone would drop all three
        assert_eq!(factors_to_keep(&opts, &ez, &r2)?, vec![0, 2]);
        Ok(())
    }
}
