//! Diagonal-covariance Gaussian mixture models for speaker verification.
//!
//! # Pipeline
//!
//! 1. [`GmmTrainer::train`]: pooled background frames -> world model (UBM).
//!    Features are variance-normalized, clustered with K-means and refined
//!    with maximum-likelihood EM.
//! 2. [`GmmAdapter::adapt`]: enrolment frames + UBM -> client model by
//!    relevance-MAP adaptation.
//! 3. [`linear_scoring`] / [`llr_scoring`]: client models x probes ->
//!    [`ScoreMatrix`].
//! 4. [`zt_norm`]: optional cohort normalization of the raw scores.
//!
//! The numerical solvers sit behind [`ClusteringSolver`], [`EmSolver`] and
//! [`MapSolver`], so the drivers can run against other implementations.
//!
//! # Persistence
//!
//! Models, statistics and feature sets serialize with serde. The file
//! extension picks the encoding:
//!
//! ```text
//! .json          JSON
//! .msgpack, .mp  MessagePack
//! .yaml, .yml    YAML
//! ```

mod em;
mod error;
mod features;
mod kmeans;
mod machine;
mod map;
pub mod normalize;
pub mod persist;
mod scoring;
mod solver;
mod stats;
mod train;
pub mod ztnorm;

pub use em::MlGmmTrainer;
pub use error::GmmError;
pub use features::FeatureSet;
pub use kmeans::KMeansTrainer;
pub use machine::{Gmm, WEIGHT_TOLERANCE};
pub use map::MapGmmTrainer;
pub use normalize::{normalize_std, scale_columns};
pub use persist::Format;
pub use scoring::{linear_scoring, llr_scoring, ScoreMatrix};
pub use solver::{
    ClusteringSolver, Clusters, EmOutcome, EmSolver, KMeansOptions, MapOptions, MapSolver,
    MlOptions,
};
pub use stats::GmmStats;
pub use train::{adapt_gmm, train_gmm, AdaptConfig, GmmAdapter, GmmTrainer, TrainConfig};
pub use ztnorm::{same_value, zt_norm};
