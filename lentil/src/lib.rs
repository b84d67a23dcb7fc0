//! Multi-view latent factor analysis by coordinate ascent variational
//! inference.
//!
//! Several data views sharing the same samples are explained by one
//! latent factor matrix `Z` and a sparse spike-and-slab loading matrix
//! per view, with ARD precisions that switch factors off per view.

pub mod common;
pub mod config;
pub mod data;
pub mod drop_rules;
pub mod error;
pub mod export;
pub mod network;
pub mod nodes;
pub mod simulate;
pub mod stats;
pub mod trials;

pub use config::{Config, Likelihood, ModelSpec, NodeGroup};
pub use data::{MultiViewData, ViewData};
pub use error::{LentilError, NodeResult};
pub use export::TrainedModel;
pub use network::{BayesNet, ElboRecord, TrainSummary};
pub use trials::{fit, run_trial, run_trials, TrialResult};
