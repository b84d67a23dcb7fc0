mod run_fit;
mod run_sim;

use run_fit::*;
use run_sim::*;

use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LENTIL",
    long_about = "Latent factors shared across several data views, fit by\n\
		  coordinate ascent variational inference with sparse\n\
		  spike-and-slab loadings and per-view ARD priors"
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Simulate multi-view data from a sparse factor model",
        long_about = "Simulate views sharing the same samples.\n\
		      Writes one TSV per view, the true factors and loadings,\n\
		      and a manifest `{out}.views.tsv`.\n"
    )]
    Simulate(SimArgs),

    #[command(
        about = "Fit a multi-view factor model",
        long_about = "Read one TSV per view and fit the factor model\n\
		      (1) Centre gaussian views\n\
		      (2) Run independent trials from different seeds\n\
		      (3) Write the best trial as JSON and TSV files.\n"
    )]
    Fit(FitArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Simulate(args) => {
            run_simulate(args)?;
        }
        Commands::Fit(args) => {
            run_fit(args)?;
        }
    }

    info!("Done");
    Ok(())
}
