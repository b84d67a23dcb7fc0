use clap::Args;
use lentil::export::{write_tsv, TrainedModel};
use lentil::{fit, Config, MultiViewData};
use log::info;
use matrix_util::common_io::mkdir;
use rayon::ThreadPoolBuilder;

#[derive(Args, Debug)]
pub struct FitArgs {
    /// one TSV per view: a header of feature names, sample names in the
    /// first column, `NaN`/`NA` for missing entries
    #[arg(required = true)]
    data_files: Vec<Box<str>>,

    /// view names, one per data file; file basenames if omitted
    #[arg(long, value_delimiter = ',')]
    view_names: Vec<Box<str>>,

    /// JSON configuration (model, priors, init, train); defaults if
    /// omitted
    #[arg(short, long)]
    config: Option<Box<str>>,

    /// likelihood per view (gaussian, bernoulli, poisson)
    #[arg(short = 'l', long, value_delimiter = ',')]
    likelihoods: Vec<Box<str>>,

    /// initial number of factors
    #[arg(short = 'k', long)]
    num_factors: Option<usize>,

    /// `univariate` or `multivariate` posterior of the factors
    #[arg(long)]
    factor_posterior: Option<Box<str>>,

    /// maximum number of iterations
    #[arg(long)]
    maxiter: Option<usize>,

    /// absolute ELBO change regarded as convergence
    #[arg(long)]
    tolerance: Option<f64>,

    /// drop factors explaining less than this R² in every view
    #[arg(long)]
    drop_r2: Option<f64>,

    /// base random seed; trial `t` uses `seed + t`
    #[arg(long)]
    seed: Option<u64>,

    /// number of independent trials
    #[arg(short = 't', long, default_value_t = 1)]
    ntrials: usize,

    /// write every trial, not just the best one
    #[arg(long, default_value_t = false)]
    keep_all: bool,

    /// maximum number of threads
    #[arg(long, default_value_t = 16)]
    max_threads: usize,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

impl FitArgs {
    /// The JSON configuration with command-line overrides on top
    fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(file) => Config::from_json_file(file)?,
            None => Config::default(),
        };
        if !self.likelihoods.is_empty() {
            config.model.likelihoods = self.likelihoods.iter().map(|x| x.to_string()).collect();
        }
        if let Some(kk) = self.num_factors {
            config.model.num_factors = kk;
        }
        if let Some(x) = &self.factor_posterior {
            config.model.factor_posterior = x.to_string();
        }
        if let Some(x) = self.maxiter {
            config.train.maxiter = x;
        }
        if let Some(x) = self.tolerance {
            config.train.tolerance = x;
        }
        if let Some(x) = self.drop_r2 {
            config.train.drop.by_r2 = Some(x);
        }
        if let Some(x) = self.seed {
            config.train.seed = x;
        }
        Ok(config)
    }
}

pub fn run_fit(args: &FitArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    mkdir(&args.out)?;

    let max_threads = num_cpus::get().min(args.max_threads);
    ThreadPoolBuilder::new()
        .num_threads(max_threads)
        .build_global()?;
    info!("will use {} threads", rayon::current_num_threads());

    let config = args.config()?;
    config.to_json_file(&format!("{}.config.json", args.out))?;

    let view_names = (!args.view_names.is_empty()).then_some(args.view_names.as_slice());
    let data = MultiViewData::read_tsv_files(&args.data_files, view_names)?;

    let (data, trials) = fit(data, &config, args.ntrials)?;

    for (rank, trial) in trials.iter().enumerate() {
        if rank > 0 && !args.keep_all {
            break;
        }
        let out = if rank == 0 {
            args.out.to_string()
        } else {
            format!("{}.trial_{}", args.out, trial.seed)
        };
        TrainedModel::new(trial, &data).to_json_file(&format!("{}.model.json", out))?;
        write_tsv(trial, &data, &out)?;
    }

    let best = &trials[0];
    info!(
        "best trial: seed {}, ELBO {:.4}, K = {}, converged = {}",
        best.seed,
        best.summary.final_elbo(),
        best.summary.num_factors,
        best.summary.converged
    );
    Ok(())
}
