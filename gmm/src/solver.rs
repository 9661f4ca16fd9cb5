use crate::{FeatureSet, Gmm, GmmError};

/// Options for a K-means run.
#[derive(Debug, Clone)]
pub struct KMeansOptions {
    /// Hard cap on iterations; reaching it is not an error.
    pub max_iterations: usize,
    /// Relative change of the average minimum distance that stops the run.
    pub convergence_threshold: f64,
    /// Seed for choosing the initial means.
    pub seed: u64,
}

/// Per-cluster parameters recovered after K-means.
#[derive(Debug, Clone, PartialEq)]
pub struct Clusters {
    pub means: Vec<Vec<f64>>,
    pub variances: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
}

/// Options for maximum-likelihood EM training.
#[derive(Debug, Clone)]
pub struct MlOptions {
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    pub update_means: bool,
    pub update_variances: bool,
    pub update_weights: bool,
}

/// Options for MAP adaptation.
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub max_iterations: usize,
    pub convergence_threshold: f64,
    /// Reynolds relevance factor `r` in `alpha = n / (n + r)`.
    pub relevance_factor: f64,
    pub adapt_variances: bool,
    pub adapt_weights: bool,
    /// Components whose accumulated responsibility is below this value keep
    /// their prior parameters. Values below machine epsilon act as epsilon.
    pub responsibilities_threshold: f64,
    /// Fixed adaptation coefficient replacing the data-dependent alpha
    /// (legacy adaptation). `None` uses the relevance factor.
    pub legacy_alpha: Option<f64>,
}

/// Result of an iterative training run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmOutcome {
    /// Number of M-steps performed.
    pub iterations: usize,
    /// Whether the convergence threshold was met before the cap.
    pub converged: bool,
    /// Average per-frame log-likelihood (or distance, for K-means) at the end.
    pub average_output: f64,
}

/// Clusters a feature set into `n_clusters` groups.
///
/// Implementations must be safe for concurrent use.
pub trait ClusteringSolver: Send + Sync {
    fn cluster(
        &self,
        data: &FeatureSet,
        n_clusters: usize,
        opts: &KMeansOptions,
    ) -> Result<Clusters, GmmError>;
}

/// Refines an initialized GMM by maximum-likelihood EM, in place.
pub trait EmSolver: Send + Sync {
    fn train(&self, gmm: &mut Gmm, data: &FeatureSet, opts: &MlOptions)
        -> Result<EmOutcome, GmmError>;
}

/// MAP-adapts `gmm` (initialized as a copy of `prior`) to `data`, in place.
pub trait MapSolver: Send + Sync {
    fn adapt(
        &self,
        prior: &Gmm,
        gmm: &mut Gmm,
        data: &FeatureSet,
        opts: &MapOptions,
    ) -> Result<EmOutcome, GmmError>;
}
