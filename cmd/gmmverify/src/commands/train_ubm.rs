use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_gmm::{train_gmm, FeatureSet};
use tracing::info;

use super::load_config;
use crate::Cli;

/// Train a background model on pooled feature files.
///
/// Flags override the corresponding `--config` fields.
#[derive(Args)]
pub struct TrainUbmCommand {
    /// Feature files to pool
    #[arg(long, num_args = 1.., required = true)]
    features: Vec<PathBuf>,

    /// Output model file (.json, .msgpack or .yaml)
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Number of mixture components
    #[arg(long)]
    gaussians: Option<usize>,

    /// K-means iteration cap
    #[arg(long)]
    iterk: Option<usize>,

    /// EM iteration cap
    #[arg(long)]
    iterg: Option<usize>,

    /// Convergence threshold for K-means and EM
    #[arg(long)]
    convergence_threshold: Option<f64>,

    /// Variance floor
    #[arg(long)]
    variance_threshold: Option<f64>,

    /// Run K-means on std-normalized features
    #[arg(long)]
    norm_kmeans: bool,

    /// Update weights during EM (true/false)
    #[arg(long)]
    update_weights: Option<bool>,

    /// Update means during EM (true/false)
    #[arg(long)]
    update_means: Option<bool>,

    /// Update variances during EM (true/false)
    #[arg(long)]
    update_variances: Option<bool>,

    /// K-means initialization seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl TrainUbmCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let mut cfg = load_config(cli)?;
        if let Some(k) = self.gaussians {
            cfg.n_gaussians = k;
        }
        if let Some(v) = self.iterk {
            cfg.iterk = v;
        }
        if let Some(v) = self.iterg {
            cfg.iterg = v;
        }
        if let Some(v) = self.convergence_threshold {
            cfg.convergence_threshold = v;
        }
        if let Some(v) = self.variance_threshold {
            cfg.variance_threshold = v;
        }
        cfg.norm_kmeans |= self.norm_kmeans;
        if let Some(v) = self.update_weights {
            cfg.update_weights = v;
        }
        if let Some(v) = self.update_means {
            cfg.update_means = v;
        }
        if let Some(v) = self.update_variances {
            cfg.update_variances = v;
        }

        let mut train = cfg.train_config();
        train.seed = self.seed;

        let data = FeatureSet::load_many(&self.features).context("failed to load features")?;
        info!(files = self.features.len(), frames = data.len(), dim = data.dim(), "features loaded");

        let ubm = train_gmm(&data, &train)?;
        ubm.save(&self.output)
            .with_context(|| format!("failed to save {}", self.output.display()))?;
        println!(
            "Background model ({} x {}) saved to {}",
            ubm.n_gaussians(),
            ubm.dim(),
            self.output.display()
        );
        Ok(())
    }
}
