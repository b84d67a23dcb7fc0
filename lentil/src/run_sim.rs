use clap::Args;
use lentil::simulate::{simulate, SimParams};
use lentil::Likelihood;
use log::info;
use matrix_util::common_io::{mkdir, write_lines};

#[derive(Args, Debug)]
pub struct SimArgs {
    /// number of samples shared by the views
    #[arg(short = 'n', long, default_value_t = 200)]
    num_samples: usize,

    /// number of features per view, e.g., `-d 100,100`
    #[arg(short = 'd', long, value_delimiter = ',', default_values_t = vec![100, 100])]
    num_features: Vec<usize>,

    /// number of true factors
    #[arg(short = 'k', long, default_value_t = 3)]
    num_factors: usize,

    /// likelihood per view (gaussian, bernoulli, poisson); all
    /// gaussian if omitted
    #[arg(short = 'l', long, value_delimiter = ',')]
    likelihoods: Vec<Box<str>>,

    /// probability that a loading is non-zero
    #[arg(long, default_value_t = 0.5)]
    active_prob: f64,

    /// probability that a factor is switched off in a view
    #[arg(long, default_value_t = 0.)]
    inactive_factor_prob: f64,

    /// fraction of missing entries
    #[arg(long, default_value_t = 0.)]
    missing_frac: f64,

    /// random seed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// output header
    #[arg(long, short, required = true)]
    out: Box<str>,

    /// verbosity
    #[arg(long, short)]
    verbose: bool,
}

pub fn run_simulate(args: &SimArgs) -> anyhow::Result<()> {
    if args.verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    mkdir(&args.out)?;

    let likelihoods = args
        .likelihoods
        .iter()
        .map(|x| x.parse::<Likelihood>())
        .collect::<Result<Vec<_>, _>>()?;

    let params = SimParams {
        num_samples: args.num_samples,
        num_features: args.num_features.clone(),
        num_factors: args.num_factors,
        likelihoods,
        active_prob: args.active_prob,
        inactive_factor_prob: args.inactive_factor_prob,
        missing_frac: args.missing_frac,
        seed: args.seed,
        ..Default::default()
    };

    let sim = simulate(&params)?;
    let files = sim.write_tsv(&args.out)?;

    let manifest = sim
        .data
        .views
        .iter()
        .zip(sim.likelihoods.iter())
        .zip(files.iter())
        .map(|((v, lik), file)| format!("{}\t{}\t{}", v.name, lik, file).into_boxed_str())
        .collect::<Vec<_>>();
    write_lines(&manifest, &format!("{}.views.tsv", args.out))?;

    info!("wrote {} views under {}", files.len(), args.out);
    Ok(())
}
