use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::em::MlGmmTrainer;
use crate::kmeans::KMeansTrainer;
use crate::map::MapGmmTrainer;
use crate::normalize::{normalize_std, scale_columns};
use crate::solver::{ClusteringSolver, EmSolver, KMeansOptions, MapOptions, MapSolver, MlOptions};
use crate::{FeatureSet, Gmm, GmmError};

/// Parameters for background model training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Number of mixture components (default: 5).
    pub n_gaussians: usize,
    /// K-means iteration cap (default: 25).
    pub iterk: usize,
    /// EM iteration cap (default: 25).
    pub iterg: usize,
    /// Relative change that stops K-means and EM (default: 1e-5).
    pub convergence_threshold: f64,
    /// Variance floor (default: 0.001).
    pub variance_threshold: f64,
    pub update_weights: bool,
    pub update_means: bool,
    pub update_variances: bool,
    /// Run K-means on std-normalized data (default: false).
    pub norm_kmeans: bool,
    /// Seed for K-means initialization (default: 0).
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            n_gaussians: 5,
            iterk: 25,
            iterg: 25,
            convergence_threshold: 1e-5,
            variance_threshold: 0.001,
            update_weights: true,
            update_means: true,
            update_variances: true,
            norm_kmeans: false,
            seed: 0,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), GmmError> {
        if self.n_gaussians == 0 {
            return Err(GmmError::InvalidConfig("n_gaussians must be positive".into()));
        }
        if !(self.variance_threshold >= 0.0) {
            return Err(GmmError::InvalidConfig(
                "variance_threshold must be non-negative".into(),
            ));
        }
        if !(self.convergence_threshold >= 0.0) {
            return Err(GmmError::InvalidConfig(
                "convergence_threshold must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Parameters for MAP adaptation of a prior model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptConfig {
    /// EM iteration cap (default: 25).
    pub iterg: usize,
    /// Relative change that stops adaptation (default: 1e-5).
    pub convergence_threshold: f64,
    /// Variance floor applied to prior and adapted model (default: 0.001).
    pub variance_threshold: f64,
    pub adapt_weight: bool,
    pub adapt_variance: bool,
    /// Relevance factor (default: 0.001).
    pub relevance_factor: f64,
    /// Responsibility floor below which a component keeps its prior; never
    /// lower than machine epsilon (default: 0).
    pub responsibilities_threshold: f64,
    /// Use a fixed adaptation coefficient instead of the relevance factor.
    pub legacy_map: bool,
    /// Coefficient for `legacy_map` (default: 0.5).
    pub legacy_alpha: f64,
}

impl Default for AdaptConfig {
    fn default() -> Self {
        Self {
            iterg: 25,
            convergence_threshold: 1e-5,
            variance_threshold: 0.001,
            adapt_weight: false,
            adapt_variance: false,
            relevance_factor: 0.001,
            responsibilities_threshold: 0.0,
            legacy_map: false,
            legacy_alpha: 0.5,
        }
    }
}

impl AdaptConfig {
    pub fn validate(&self) -> Result<(), GmmError> {
        if !self.legacy_map && !(self.relevance_factor > 0.0) {
            return Err(GmmError::InvalidConfig(
                "relevance_factor must be positive".into(),
            ));
        }
        if self.legacy_map && !(0.0..=1.0).contains(&self.legacy_alpha) {
            return Err(GmmError::InvalidConfig(
                "legacy_alpha must be within [0, 1]".into(),
            ));
        }
        if !(self.variance_threshold >= 0.0) || !(self.responsibilities_threshold >= 0.0) {
            return Err(GmmError::InvalidConfig(
                "thresholds must be non-negative".into(),
            ));
        }
        Ok(())
    }

    fn map_options(&self) -> MapOptions {
        MapOptions {
            max_iterations: self.iterg,
            convergence_threshold: self.convergence_threshold,
            relevance_factor: self.relevance_factor,
            adapt_variances: self.adapt_variance,
            adapt_weights: self.adapt_weight,
            responsibilities_threshold: self.responsibilities_threshold,
            legacy_alpha: self.legacy_map.then_some(self.legacy_alpha),
        }
    }
}

/// Trains a background GMM: K-means initialization followed by ML EM.
pub struct GmmTrainer {
    cfg: TrainConfig,
    clustering: Box<dyn ClusteringSolver>,
    em: Box<dyn EmSolver>,
}

impl GmmTrainer {
    pub fn new(
        cfg: TrainConfig,
        clustering: Box<dyn ClusteringSolver>,
        em: Box<dyn EmSolver>,
    ) -> Self {
        Self {
            cfg,
            clustering,
            em,
        }
    }

    /// Creates a trainer backed by [`KMeansTrainer`] and [`MlGmmTrainer`].
    pub fn with_reference_solvers(cfg: TrainConfig) -> Self {
        Self::new(cfg, Box::new(KMeansTrainer::new()), Box::new(MlGmmTrainer::new()))
    }

    pub fn config(&self) -> &TrainConfig {
        &self.cfg
    }

    /// Trains a GMM on `data`.
    ///
    /// With `norm_kmeans`, K-means runs on std-normalized frames and the
    /// recovered means/variances are scaled back by `std` / `std²` before
    /// EM, which always runs on the raw frames.
    pub fn train(&self, data: &FeatureSet) -> Result<Gmm, GmmError> {
        let cfg = &self.cfg;
        cfg.validate()?;
        if data.is_empty() {
            return Err(GmmError::EmptyData("cannot train a gmm on zero frames"));
        }

        let (kdata, std) = if cfg.norm_kmeans {
            let (normalized, std) = normalize_std(data)?;
            (Cow::Owned(normalized), Some(std))
        } else {
            (Cow::Borrowed(data), None)
        };

        let kopts = KMeansOptions {
            max_iterations: cfg.iterk,
            convergence_threshold: cfg.convergence_threshold,
            seed: cfg.seed,
        };
        let mut clusters = self.clustering.cluster(&kdata, cfg.n_gaussians, &kopts)?;

        if let Some(std) = std {
            scale_columns(&mut clusters.means, &std);
            let std2: Vec<f64> = std.iter().map(|s| s * s).collect();
            scale_columns(&mut clusters.variances, &std2);
        }
        debug!(n_gaussians = cfg.n_gaussians, "kmeans initialization done");

        let mut gmm = Gmm::from_parts(
            clusters.means,
            clusters.variances,
            clusters.weights,
            cfg.variance_threshold,
        )?;

        let mopts = MlOptions {
            max_iterations: cfg.iterg,
            convergence_threshold: cfg.convergence_threshold,
            update_means: cfg.update_means,
            update_variances: cfg.update_variances,
            update_weights: cfg.update_weights,
        };
        let outcome = self.em.train(&mut gmm, data, &mopts)?;
        info!(
            frames = data.len(),
            n_gaussians = cfg.n_gaussians,
            iterations = outcome.iterations,
            converged = outcome.converged,
            average_log_likelihood = outcome.average_output,
            "gmm trained"
        );
        Ok(gmm)
    }
}

/// MAP-adapts a prior (background) GMM to enrolment data.
pub struct GmmAdapter {
    cfg: AdaptConfig,
    solver: Box<dyn MapSolver>,
}

impl GmmAdapter {
    pub fn new(cfg: AdaptConfig, solver: Box<dyn MapSolver>) -> Self {
        Self { cfg, solver }
    }

    /// Creates an adapter backed by [`MapGmmTrainer`].
    pub fn with_reference_solver(cfg: AdaptConfig) -> Self {
        Self::new(cfg, Box::new(MapGmmTrainer::new()))
    }

    pub fn config(&self) -> &AdaptConfig {
        &self.cfg
    }

    /// Returns a new model adapted from `prior`; `prior` itself is not modified.
    pub fn adapt(&self, data: &FeatureSet, prior: &Gmm) -> Result<Gmm, GmmError> {
        self.cfg.validate()?;
        let mut prior = prior.clone();
        prior.set_variance_floor(self.cfg.variance_threshold);

        let mut gmm = prior.clone();
        let outcome = self
            .solver
            .adapt(&prior, &mut gmm, data, &self.cfg.map_options())?;
        debug!(
            frames = data.len(),
            iterations = outcome.iterations,
            converged = outcome.converged,
            "gmm adapted"
        );
        Ok(gmm)
    }
}

/// Trains a background GMM with the reference solvers.
pub fn train_gmm(data: &FeatureSet, cfg: &TrainConfig) -> Result<Gmm, GmmError> {
    GmmTrainer::with_reference_solvers(cfg.clone()).train(data)
}

/// MAP-adapts `prior` to `data` with the reference solver.
pub fn adapt_gmm(data: &FeatureSet, prior: &Gmm, cfg: &AdaptConfig) -> Result<Gmm, GmmError> {
    GmmAdapter::with_reference_solver(cfg.clone()).adapt(data, prior)
}
