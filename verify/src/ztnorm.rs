use std::sync::Arc;

use giztoy_gmm::{linear_scoring, same_value, zt_norm, Gmm, GmmStats, ScoreMatrix};

use crate::VerifyError;

/// Cohort data ZT-norm needs, computed once per evaluation group.
#[derive(Debug)]
pub struct ZtNormState {
    tnorm_models: Vec<Arc<Gmm>>,
    znorm_stats: Vec<Arc<GmmStats>>,
    d: ScoreMatrix,
    same: Vec<Vec<bool>>,
}

impl ZtNormState {
    /// Scores every T-norm model against every Z-norm statistic and builds
    /// the same-identity mask.
    ///
    /// `tnorm_real_ids[t]` is the real identity behind T-norm model `t`;
    /// `znorm_real_ids[z]` the one behind Z-norm statistic `z`.
    pub fn new(
        ubm: &Gmm,
        tnorm_models: Vec<Arc<Gmm>>,
        tnorm_real_ids: &[String],
        znorm_stats: Vec<Arc<GmmStats>>,
        znorm_real_ids: &[String],
    ) -> Result<Self, VerifyError> {
        if tnorm_models.is_empty() || znorm_stats.is_empty() {
            return Err(VerifyError::Configuration(
                "zt-norm needs at least one t-norm model and one z-norm probe".into(),
            ));
        }
        if tnorm_models.len() != tnorm_real_ids.len() || znorm_stats.len() != znorm_real_ids.len()
        {
            return Err(VerifyError::Configuration(
                "zt-norm cohort ids do not match cohort data".into(),
            ));
        }
        let d = linear_scoring(&tnorm_models, ubm, &znorm_stats, false)?;
        let same = same_value(tnorm_real_ids, znorm_real_ids);
        Ok(Self {
            tnorm_models,
            znorm_stats,
            d,
            same,
        })
    }

    /// Raw T-norm × Z-norm score matrix.
    pub fn d(&self) -> &ScoreMatrix {
        &self.d
    }

    /// `mask()[t][z]` is true when T-norm model `t` and Z-norm probe `z`
    /// share a real identity.
    pub fn mask(&self) -> &[Vec<bool>] {
        &self.same
    }

    pub fn tnorm_len(&self) -> usize {
        self.tnorm_models.len()
    }

    pub fn znorm_len(&self) -> usize {
        self.znorm_stats.len()
    }

    /// ZT-normalizes `raw`, the linear scores of `models` against
    /// `probe_stats`. Every input matrix is divided by `n_blocks` first.
    pub fn apply(
        &self,
        ubm: &Gmm,
        models: &[Arc<Gmm>],
        raw: &ScoreMatrix,
        probe_stats: &[Arc<GmmStats>],
        n_blocks: usize,
    ) -> Result<ScoreMatrix, VerifyError> {
        let k = n_blocks as f64;
        let a = raw.divided_by(k);
        let b = linear_scoring(models, ubm, &self.znorm_stats, false)?.divided_by(k);
        let c = linear_scoring(&self.tnorm_models, ubm, probe_stats, false)?.divided_by(k);
        let d = self.d.divided_by(k);
        Ok(zt_norm(&a, &b, &c, &d, &self.same)?)
    }
}
