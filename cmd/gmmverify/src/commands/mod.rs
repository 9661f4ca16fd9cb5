//! CLI commands module.

mod enrol;
mod run;
mod train_ubm;

pub use enrol::EnrolCommand;
pub use run::RunCommand;
pub use train_ubm::TrainUbmCommand;

use anyhow::Context;
use giztoy_verify::ExperimentConfig;

use crate::Cli;

/// Loads `--config` when given, defaults otherwise.
pub(crate) fn load_config(cli: &Cli) -> anyhow::Result<ExperimentConfig> {
    match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ExperimentConfig::default()),
    }
}
