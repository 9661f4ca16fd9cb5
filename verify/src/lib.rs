//! GMM-UBM verification experiments.
//!
//! [`GmmExperiment`] ties a [`Protocol`] (which files belong to whom), a
//! background model and the [`giztoy_gmm`] primitives together:
//!
//! 1. client models are MAP-adapted on first use and cached on disk
//!    ([`ModelCache`]);
//! 2. probes are scored directly or by linear scoring over cached
//!    statistics ([`StatsCache`]);
//! 3. with ZT-norm enabled, cohort scores are precomputed once per group
//!    ([`ZtNormState`]) and applied to every score matrix;
//! 4. [`GmmExperiment::run`] writes one `real_id claimed_id label score`
//!    line per probe and returns a [`RunReport`].

pub mod cache;
pub mod config;
mod error;
pub mod experiment;
pub mod protocol;
pub mod ztnorm;

pub use cache::{ModelCache, StatsCache};
pub use config::ExperimentConfig;
pub use error::VerifyError;
pub use experiment::{GmmExperiment, RunReport, ScoredProbe, SpotCheck};
pub use protocol::{
    IdentityEntry, IdentityResolver, Manifest, ManifestProtocol, Probe, ProbeClass, ProbeEntry,
    Protocol,
};
pub use ztnorm::ZtNormState;
