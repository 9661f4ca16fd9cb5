use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use giztoy_gmm::{adapt_gmm, FeatureSet, Gmm};

use super::load_config;
use crate::Cli;

/// MAP-adapt a client model from the background model.
#[derive(Args)]
pub struct EnrolCommand {
    /// Background model file
    #[arg(long)]
    ubm: PathBuf,

    /// Enrolment feature files
    #[arg(long, num_args = 1.., required = true)]
    features: Vec<PathBuf>,

    /// Output model file
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Relevance factor
    #[arg(long)]
    relevance_factor: Option<f64>,

    /// EM iteration cap
    #[arg(long)]
    iterg: Option<usize>,
}

impl EnrolCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let mut cfg = load_config(cli)?;
        if let Some(r) = self.relevance_factor {
            cfg.relevance_factor = r;
        }
        if let Some(v) = self.iterg {
            cfg.iterg = v;
        }
        cfg.validate()?;

        let ubm = Gmm::load(&self.ubm)
            .with_context(|| format!("failed to load background model {}", self.ubm.display()))?;
        let data = FeatureSet::load_many(&self.features).context("failed to load features")?;

        let model = adapt_gmm(&data, &ubm, &cfg.adapt_config())?;
        model
            .save(&self.output)
            .with_context(|| format!("failed to save {}", self.output.display()))?;
        println!("Client model saved to {}", self.output.display());
        Ok(())
    }
}
