use std::path::Path;

use giztoy_gmm::{AdaptConfig, TrainConfig};
use serde::{Deserialize, Serialize};

use crate::VerifyError;

/// Experiment settings, usually read from YAML.
///
/// Missing fields take their defaults, so a partial file such as
///
/// ```yaml
/// linear_scoring: true
/// ztnorm: true
/// relevance_factor: 4.0
/// ```
///
/// is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Mixture components of a background model (default: 5).
    pub n_gaussians: usize,
    /// K-means iteration cap for background training (default: 25).
    pub iterk: usize,
    /// EM iteration cap for background training and adaptation (default: 50).
    pub iterg: usize,
    pub convergence_threshold: f64,
    pub variance_threshold: f64,
    /// Run background K-means on std-normalized frames.
    pub norm_kmeans: bool,
    /// Background EM update flags (default: all true).
    pub update_weights: bool,
    pub update_means: bool,
    pub update_variances: bool,
    pub relevance_factor: f64,
    pub responsibilities_threshold: f64,
    pub adapt_weight: bool,
    pub adapt_variance: bool,
    pub legacy_map: bool,
    pub legacy_alpha: f64,

    /// Score with sufficient statistics instead of per-frame likelihoods.
    pub linear_scoring: bool,
    /// Divide linear scores by the probe frame count.
    pub frame_length_normalisation: bool,
    /// Apply ZT-norm; needs `linear_scoring`.
    pub ztnorm: bool,
    /// Constant all ZT-norm inputs are divided by (default: 4161).
    pub n_blocks: usize,

    /// Extension of persisted models and statistics: json, msgpack or yaml.
    pub model_extension: String,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            n_gaussians: 5,
            iterk: 25,
            iterg: 50,
            convergence_threshold: 1e-5,
            variance_threshold: 0.001,
            norm_kmeans: false,
            update_weights: true,
            update_means: true,
            update_variances: true,
            relevance_factor: 0.001,
            responsibilities_threshold: 0.0,
            adapt_weight: false,
            adapt_variance: false,
            legacy_map: false,
            legacy_alpha: 0.5,
            linear_scoring: false,
            frame_length_normalisation: false,
            ztnorm: false,
            n_blocks: 4161,
            model_extension: "json".into(),
        }
    }
}

impl ExperimentConfig {
    /// Reads a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, VerifyError> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text).map_err(|e| {
            VerifyError::Configuration(format!("{}: {e}", path.display()))
        })
    }

    pub fn validate(&self) -> Result<(), VerifyError> {
        if self.ztnorm && !self.linear_scoring {
            return Err(VerifyError::Configuration(
                "ztnorm requires linear_scoring".into(),
            ));
        }
        if self.iterk == 0 {
            return Err(VerifyError::Configuration("iterk must be positive".into()));
        }
        if self.n_blocks == 0 {
            return Err(VerifyError::Configuration("n_blocks must be positive".into()));
        }
        if !self.legacy_map && !(self.relevance_factor > 0.0) {
            return Err(VerifyError::Configuration(
                "relevance_factor must be positive".into(),
            ));
        }
        if !matches!(
            self.model_extension.as_str(),
            "json" | "msgpack" | "mp" | "yaml" | "yml"
        ) {
            return Err(VerifyError::Configuration(format!(
                "unsupported model_extension {:?}",
                self.model_extension
            )));
        }
        self.train_config().validate()?;
        self.adapt_config().validate()?;
        Ok(())
    }

    /// Background model training parameters.
    pub fn train_config(&self) -> TrainConfig {
        TrainConfig {
            n_gaussians: self.n_gaussians,
            iterk: self.iterk,
            iterg: self.iterg,
            convergence_threshold: self.convergence_threshold,
            variance_threshold: self.variance_threshold,
            norm_kmeans: self.norm_kmeans,
            update_weights: self.update_weights,
            update_means: self.update_means,
            update_variances: self.update_variances,
            ..TrainConfig::default()
        }
    }

    /// Client model adaptation parameters.
    pub fn adapt_config(&self) -> AdaptConfig {
        AdaptConfig {
            iterg: self.iterg,
            convergence_threshold: self.convergence_threshold,
            variance_threshold: self.variance_threshold,
            adapt_weight: self.adapt_weight,
            adapt_variance: self.adapt_variance,
            relevance_factor: self.relevance_factor,
            responsibilities_threshold: self.responsibilities_threshold,
            legacy_map: self.legacy_map,
            legacy_alpha: self.legacy_alpha,
        }
    }
}
