use crate::em::{run_em, RESPONSIBILITY_EPSILON};
use crate::solver::{EmOutcome, MapOptions, MapSolver};
use crate::{FeatureSet, Gmm, GmmError, GmmStats};

/// Reference MAP adaptation solver (Reynolds-style relevance MAP).
///
/// For component `k` with accumulated responsibility `n_k`:
///
/// ```text
/// alpha_k = n_k / (n_k + r)             (or a fixed legacy alpha)
/// mu_k    = alpha_k * E_k[x]  + (1 - alpha_k) * mu_prior_k
/// var_k   = alpha_k * E_k[x²] + (1 - alpha_k) * (var_prior_k + mu_prior_k²) - mu_k²
/// w_k     ∝ alpha_k * n_k / T + (1 - alpha_k) * w_prior_k
/// ```
///
/// Means always adapt; variances and weights only when requested.
/// Components whose `n_k` is below the responsibility threshold (at least
/// machine epsilon) get `alpha_k = 0` and keep the prior, in legacy mode too.
#[derive(Debug, Clone, Default)]
pub struct MapGmmTrainer;

impl MapGmmTrainer {
    pub fn new() -> Self {
        Self
    }
}

impl MapSolver for MapGmmTrainer {
    fn adapt(
        &self,
        prior: &Gmm,
        gmm: &mut Gmm,
        data: &FeatureSet,
        opts: &MapOptions,
    ) -> Result<EmOutcome, GmmError> {
        if prior.n_gaussians() != gmm.n_gaussians() {
            return Err(GmmError::DimensionMismatch {
                expected: prior.n_gaussians(),
                got: gmm.n_gaussians(),
            });
        }
        if prior.dim() != gmm.dim() {
            return Err(GmmError::DimensionMismatch {
                expected: prior.dim(),
                got: gmm.dim(),
            });
        }
        run_em(
            gmm,
            data,
            opts.max_iterations,
            opts.convergence_threshold,
            |gmm, stats| map_step(prior, gmm, stats, opts),
        )
    }
}

fn adaptation_coefficients(stats: &GmmStats, opts: &MapOptions) -> Vec<f64> {
    let threshold = opts.responsibilities_threshold.max(RESPONSIBILITY_EPSILON);
    stats
        .n
        .iter()
        .map(|&n| {
            if n < threshold {
                return 0.0;
            }
            match opts.legacy_alpha {
                Some(alpha) => alpha,
                None => n / (n + opts.relevance_factor),
            }
        })
        .collect()
}

fn map_step(
    prior: &Gmm,
    gmm: &mut Gmm,
    stats: &GmmStats,
    opts: &MapOptions,
) -> Result<(), GmmError> {
    let alpha = adaptation_coefficients(stats, opts);
    let k = gmm.n_gaussians();

    if opts.adapt_weights {
        let t = stats.t as f64;
        let weights = (0..k)
            .map(|i| alpha[i] * stats.n[i] / t + (1.0 - alpha[i]) * prior.weights()[i])
            .collect();
        gmm.set_weights(weights)?;
    }

    let means: Vec<Vec<f64>> = (0..k)
        .map(|i| {
            let n = stats.n[i].max(RESPONSIBILITY_EPSILON);
            stats.sum_px[i]
                .iter()
                .zip(&prior.means()[i])
                .map(|(px, mp)| alpha[i] * px / n + (1.0 - alpha[i]) * mp)
                .collect()
        })
        .collect();

    if opts.adapt_variances {
        let variances = (0..k)
            .map(|i| {
                let n = stats.n[i].max(RESPONSIBILITY_EPSILON);
                (0..gmm.dim())
                    .map(|d| {
                        let mp = prior.means()[i][d];
                        let vp = prior.variances()[i][d];
                        alpha[i] * stats.sum_pxx[i][d] / n + (1.0 - alpha[i]) * (vp + mp * mp)
                            - means[i][d] * means[i][d]
                    })
                    .collect()
            })
            .collect();
        gmm.set_variances(variances)?;
    }

    gmm.set_means(means)
}
