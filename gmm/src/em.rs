use tracing::debug;

use crate::solver::{EmOutcome, EmSolver, MlOptions};
use crate::{FeatureSet, Gmm, GmmError, GmmStats};

/// Floor applied to accumulated responsibilities before dividing by them.
pub(crate) const RESPONSIBILITY_EPSILON: f64 = f64::EPSILON;

/// Relative-change stopping rule shared by K-means and EM.
pub(crate) fn has_converged(prev: f64, cur: f64, threshold: f64) -> bool {
    if prev == cur {
        return true;
    }
    ((prev - cur) / prev).abs() <= threshold
}

/// Generic EM driver.
///
/// Runs an E-step, then alternates M-step and E-step until the average
/// log-likelihood changes by at most `threshold` (relative) or
/// `max_iterations` M-steps have run. Hitting the cap is a soft stop.
pub(crate) fn run_em<F>(
    gmm: &mut Gmm,
    data: &FeatureSet,
    max_iterations: usize,
    threshold: f64,
    mut m_step: F,
) -> Result<EmOutcome, GmmError>
where
    F: FnMut(&mut Gmm, &GmmStats) -> Result<(), GmmError>,
{
    if data.is_empty() {
        return Err(GmmError::EmptyData("cannot train a gmm on zero frames"));
    }

    let mut stats = gmm.statistics(data)?;
    let mut avg = stats.average_log_likelihood();

    for iteration in 1..=max_iterations {
        let prev = avg;
        m_step(gmm, &stats)?;
        stats.reset();
        gmm.acc_statistics(data, &mut stats)?;
        avg = stats.average_log_likelihood();
        debug!(iteration, average_log_likelihood = avg, "em step");
        if has_converged(prev, avg, threshold) {
            return Ok(EmOutcome {
                iterations: iteration,
                converged: true,
                average_output: avg,
            });
        }
    }

    debug!(max_iterations, average_log_likelihood = avg, "em stopped at iteration cap");
    Ok(EmOutcome {
        iterations: max_iterations,
        converged: false,
        average_output: avg,
    })
}

/// Reference maximum-likelihood EM solver for diagonal GMMs.
#[derive(Debug, Clone, Default)]
pub struct MlGmmTrainer;

impl MlGmmTrainer {
    pub fn new() -> Self {
        Self
    }
}

impl EmSolver for MlGmmTrainer {
    fn train(
        &self,
        gmm: &mut Gmm,
        data: &FeatureSet,
        opts: &MlOptions,
    ) -> Result<EmOutcome, GmmError> {
        run_em(
            gmm,
            data,
            opts.max_iterations,
            opts.convergence_threshold,
            |gmm, stats| ml_step(gmm, stats, opts),
        )
    }
}

fn ml_step(gmm: &mut Gmm, stats: &GmmStats, opts: &MlOptions) -> Result<(), GmmError> {
    if opts.update_weights {
        let t = stats.t as f64;
        gmm.set_weights(stats.n.iter().map(|n| n / t).collect())?;
    }

    if opts.update_means {
        let means = stats
            .sum_px
            .iter()
            .zip(&stats.n)
            .map(|(px, n)| {
                let n = n.max(RESPONSIBILITY_EPSILON);
                px.iter().map(|v| v / n).collect()
            })
            .collect();
        gmm.set_means(means)?;
    }

    if opts.update_variances {
        let variances = stats
            .sum_pxx
            .iter()
            .zip(&stats.n)
            .zip(gmm.means())
            .map(|((pxx, n), mean)| {
                let n = n.max(RESPONSIBILITY_EPSILON);
                pxx.iter().zip(mean).map(|(v, m)| v / n - m * m).collect()
            })
            .collect();
        gmm.set_variances(variances)?;
    }
    Ok(())
}
