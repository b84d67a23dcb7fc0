//! The trained model as JSON and TSV.

use crate::common::*;
use crate::config::Likelihood;
use crate::data::MultiViewData;
use crate::network::ElboRecord;
use crate::nodes::{Dist, HasExpectations};
use crate::simulate::factor_names;
use crate::trials::TrialResult;

use matrix_param::io::write_param_map;
use matrix_util::common_io::{open_buf_writer, write_lines};
use matrix_util::traits::IoOps;
use serde::Serialize;
use std::io::Write;

/// `parameters(Q)` and `expectations(Q)` of one node
#[derive(Clone, Debug, Serialize)]
pub struct NodeSummary {
    pub name: String,
    /// `None` for constants
    pub family: Option<Family>,
    pub dim: Dim,
    pub parameters: ParamMap,
    pub expectations: ParamMap,
}

#[derive(Clone, Debug, Serialize)]
pub struct TrainedModel {
    pub seed: u64,
    pub num_factors: usize,
    pub converged: bool,
    pub num_iter: usize,
    pub final_elbo: f64,
    pub elbo_trace: Vec<ElboRecord>,
    pub view_names: Vec<Box<str>>,
    pub sample_names: Vec<Box<str>>,
    pub feature_names: Vec<Vec<Box<str>>>,
    pub likelihoods: Vec<Likelihood>,
    /// all factors together, one per view
    pub r2_per_view: Vec<f64>,
    /// view x factor
    pub r2_per_factor: Vec<Vec<f64>>,
    pub nodes: Vec<NodeSummary>,
}

impl TrainedModel {
    pub fn new(trial: &TrialResult, data: &MultiViewData) -> Self {
        let net = &trial.net;
        let r2 = net.r2_per_factor();

        let nodes = net
            .nodes()
            .into_iter()
            .map(|node| NodeSummary {
                name: node.name().to_string(),
                family: node.family(),
                dim: node.dim(),
                parameters: node.parameters(Dist::Q),
                expectations: node.expectations(Dist::Q),
            })
            .collect();

        Self {
            seed: trial.seed,
            num_factors: net.num_factors(),
            converged: trial.summary.converged,
            num_iter: trial.summary.num_iter,
            final_elbo: trial.summary.final_elbo(),
            elbo_trace: trial.summary.elbo_trace.clone(),
            view_names: data.view_names(),
            sample_names: data.sample_names.clone(),
            feature_names: data.views.iter().map(|v| v.feature_names.clone()).collect(),
            likelihoods: net.views.iter().map(|v| v.y.likelihood()).collect(),
            r2_per_view: net.r2_per_view(),
            r2_per_factor: r2
                .row_iter()
                .map(|row| row.iter().copied().collect())
                .collect(),
            nodes,
        }
    }

    pub fn to_json_file(&self, file: &str) -> anyhow::Result<()> {
        let mut writer = open_buf_writer(file)?;
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Write `E[Z]`, `E[SW]`, `E[S]`, variance explained, the ELBO trace
/// and the `P` and `Q` tables of every latent node under the prefix
/// `out`
pub fn write_tsv(trial: &TrialResult, data: &MultiViewData, out: &str) -> anyhow::Result<()> {
    let net = &trial.net;
    let factors = factor_names(net.num_factors());

    net.z.mean().write_data_with_names(
        &format!("{}.z.tsv.gz", out),
        "\t",
        &data.sample_names,
        &factors,
    )?;

    for (v, view) in net.views.iter().zip(data.views.iter()) {
        v.sw.expectation(Dist::Q).write_data_with_names(
            &format!("{}.{}.w.tsv.gz", out, v.name),
            "\t",
            &view.feature_names,
            &factors,
        )?;
        v.sw.q().prob().write_data_with_names(
            &format!("{}.{}.s.tsv.gz", out, v.name),
            "\t",
            &view.feature_names,
            &factors,
        )?;
    }

    net.r2_per_factor().write_data_with_names(
        &format!("{}.r2.tsv.gz", out),
        "\t",
        &data.view_names(),
        &factors,
    )?;

    let mut lines: Vec<Box<str>> = vec!["iter\telbo".into()];
    lines.extend(
        trial
            .summary
            .elbo_trace
            .iter()
            .map(|x| format!("{}\t{}", x.iter, x.total).into_boxed_str()),
    );
    write_lines(&lines, &format!("{}.elbo.tsv.gz", out))?;

    write_node_tables(trial, out)?;

    info!("wrote {}.*.tsv.gz", out);
    Ok(())
}

/// `SW[rna]` becomes `SW.rna`
fn node_file_name(name: &str) -> String {
    name.replace('[', ".").replace(']', "")
}

/// `{out}.{node}.{P|Q}.{name}.tsv.gz` for every parameter and moment
fn write_node_tables(trial: &TrialResult, out: &str) -> anyhow::Result<Vec<String>> {
    let mut files = vec![];
    for node in trial.net.nodes() {
        if node.family().is_none() {
            continue;
        }
        for (dist, tag) in [(Dist::P, "P"), (Dist::Q, "Q")] {
            let header = format!("{}.{}.{}", out, node_file_name(node.name()), tag);
            files.extend(write_param_map(&node.parameters(dist), &header)?);
            files.extend(write_param_map(&node.expectations(dist), &header)?);
        }
    }
    debug!("wrote {} node tables", files.len());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::simulate::{simulate, SimParams};
    use crate::trials::fit;

    #[test]
    fn export_lists_every_node() -> anyhow::Result<()> {
        let sim = simulate(&SimParams {
            num_samples: 20,
            num_features: vec![6, 4],
            num_factors: 2,
            ..Default::default()
        })?;
        let mut config = Config::default();
        config.model.num_factors = 2;
        config.train.maxiter = 5;
        let (data, trials) = fit(sim.data, &config, 1)?;
        let model = TrainedModel::new(&trials[0], &data);

        assert_eq!(model.nodes.len(), 11);
        assert_eq!(model.nodes[0].name, "Z");
        assert_eq!(model.r2_per_factor.len(), 2);
        assert!(model.nodes.iter().any(|x| x.name == "SW[view_1]"));

        let dir = tempfile::tempdir()?;
        let json = dir.path().join("model.json");
        let json = json.to_str().ok_or(anyhow::anyhow!("path"))?;
        model.to_json_file(json)?;
        let parsed: serde_json::Value =
            serde_json::from_reader(matrix_util::common_io::open_buf_reader(json)?)?;
        assert_eq!(parsed["num_factors"], 2);

        let prefix = dir.path().join("fit");
        write_tsv(&trials[0], &data, prefix.to_str().ok_or(anyhow::anyhow!("path"))?)?;
        assert!(dir.path().join("fit.view_0.w.tsv.gz").exists());
        assert!(dir.path().join("fit.Alpha.view_1.Q.rate.tsv.gz").exists());
        assert!(dir.path().join("fit.SW.view_0.P.theta.tsv.gz").exists());
        assert!(!dir.path().join("fit.Y.view_0.Q.E.tsv.gz").exists());

        // the table holds what the node reports
        let z = Mat::read_file_delim(
            &dir.path().join("fit.Z.Q.E.tsv.gz").to_string_lossy(),
            "\t",
            None,
        )?;
        approx::assert_abs_diff_eq!(z, trials[0].net.z.mean().clone(), epsilon = 1e-6);
        Ok(())
    }
}
