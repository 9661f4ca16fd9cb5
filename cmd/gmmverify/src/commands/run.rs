use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use giztoy_gmm::Gmm;
use giztoy_verify::{GmmExperiment, ManifestProtocol};

use super::load_config;
use crate::Cli;

/// Score every identity of a group and write a score file.
///
/// Each line reads `real_id claimed_id probe_label score`.
#[derive(Args)]
pub struct RunCommand {
    /// Protocol manifest (YAML or JSON)
    #[arg(long)]
    manifest: PathBuf,

    /// Directory manifest paths are relative to
    #[arg(long)]
    features_dir: PathBuf,

    /// Background model file
    #[arg(long)]
    ubm: PathBuf,

    /// Directory for cached models and statistics
    #[arg(long)]
    models_dir: PathBuf,

    /// Evaluation group
    #[arg(long, default_value = "dev")]
    group: String,

    /// Score file to write
    #[arg(short = 'o', long)]
    output: PathBuf,

    /// Use linear scoring
    #[arg(long)]
    linear_scoring: bool,

    /// Apply ZT-norm (requires linear scoring)
    #[arg(long)]
    ztnorm: bool,
}

impl RunCommand {
    pub fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let mut cfg = load_config(cli)?;
        cfg.linear_scoring |= self.linear_scoring;
        cfg.ztnorm |= self.ztnorm;

        let protocol = Arc::new(
            ManifestProtocol::load(&self.manifest, &self.features_dir)
                .with_context(|| format!("failed to load manifest {}", self.manifest.display()))?,
        );
        let ubm = Gmm::load(&self.ubm)
            .with_context(|| format!("failed to load background model {}", self.ubm.display()))?;

        let mut experiment =
            GmmExperiment::new(cfg, protocol.clone(), protocol, ubm, &self.models_dir)?;

        let file = File::create(&self.output)
            .with_context(|| format!("failed to create {}", self.output.display()))?;
        let mut sink = BufWriter::new(file);
        let report = experiment.run(&self.group, &mut sink)?;

        println!(
            "Scored {} models, {} lines written to {}",
            report.models,
            report.lines,
            self.output.display()
        );
        match report.spot_check.values() {
            Some(v) => println!("Spot check: {:.15} {:.15} {:.15} {:.15}", v[0], v[1], v[2], v[3]),
            None => println!(
                "Spot check: client {:?} impostor {:?}",
                report.spot_check.client, report.spot_check.impostor
            ),
        }
        Ok(())
    }
}
