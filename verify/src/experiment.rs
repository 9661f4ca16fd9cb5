use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use giztoy_gmm::{linear_scoring, llr_scoring, FeatureSet, Gmm, GmmAdapter, ScoreMatrix};
use tracing::{debug, info};

use crate::cache::{ModelCache, StatsCache};
use crate::config::ExperimentConfig;
use crate::protocol::{IdentityResolver, Probe, ProbeClass, Protocol};
use crate::ztnorm::ZtNormState;
use crate::VerifyError;

/// A probe with its (possibly normalized) score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredProbe {
    pub probe: Probe,
    pub score: f64,
}

impl ScoredProbe {
    /// Score-file line: `real_id claimed_id label score`.
    pub fn line(&self) -> String {
        format!(
            "{} {} {} {}",
            self.probe.real_id, self.probe.claimed_id, self.probe.label, self.score
        )
    }
}

/// Leading scores of the first identity of a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpotCheck {
    /// Up to two client scores.
    pub client: Vec<f64>,
    /// Up to two impostor scores.
    pub impostor: Vec<f64>,
}

impl SpotCheck {
    /// `[client0, client1, impostor0, impostor1]`, when all four exist.
    pub fn values(&self) -> Option<[f64; 4]> {
        match (self.client.as_slice(), self.impostor.as_slice()) {
            ([c0, c1], [i0, i1]) => Some([*c0, *c1, *i0, *i1]),
            _ => None,
        }
    }
}

/// Summary of [`GmmExperiment::run`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Identities evaluated.
    pub models: usize,
    /// Score lines written.
    pub lines: usize,
    pub spot_check: SpotCheck,
}

/// GMM-UBM verification experiment over one protocol.
///
/// Client models are MAP-adapted from the background model on first use
/// and cached in `models_dir` together with the probe statistics used by
/// linear scoring.
pub struct GmmExperiment {
    cfg: ExperimentConfig,
    protocol: Arc<dyn Protocol>,
    resolver: Arc<dyn IdentityResolver>,
    ubm: Gmm,
    adapter: GmmAdapter,
    models: ModelCache,
    stats: StatsCache,
    ztnorm: Option<ZtNormState>,
}

impl GmmExperiment {
    pub fn new(
        cfg: ExperimentConfig,
        protocol: Arc<dyn Protocol>,
        resolver: Arc<dyn IdentityResolver>,
        ubm: Gmm,
        models_dir: impl Into<PathBuf>,
    ) -> Result<Self, VerifyError> {
        cfg.validate()?;
        let models_dir = models_dir.into();
        std::fs::create_dir_all(&models_dir)?;
        let adapter = GmmAdapter::with_reference_solver(cfg.adapt_config());
        Ok(Self {
            models: ModelCache::new(&models_dir, &cfg.model_extension),
            stats: StatsCache::new(&models_dir, &cfg.model_extension),
            cfg,
            protocol,
            resolver,
            ubm,
            adapter,
            ztnorm: None,
        })
    }

    /// Replaces the adapter, e.g. to plug in another MAP solver.
    pub fn with_adapter(mut self, adapter: GmmAdapter) -> Self {
        self.adapter = adapter;
        self
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.cfg
    }

    pub fn ubm(&self) -> &Gmm {
        &self.ubm
    }

    pub fn model_cache(&self) -> &ModelCache {
        &self.models
    }

    pub fn ztnorm_state(&self) -> Option<&ZtNormState> {
        self.ztnorm.as_ref()
    }

    /// Adapts a model for `id` from its enrolment files.
    pub fn train(&self, id: &str) -> Result<Gmm, VerifyError> {
        let files = self.protocol.enrol_files(id)?;
        if files.is_empty() {
            return Err(VerifyError::Configuration(format!(
                "identity {id:?} has no enrolment files"
            )));
        }
        let data = FeatureSet::load_many(&files)?;
        debug!(id, files = files.len(), frames = data.len(), "adapting model");
        Ok(self.adapter.adapt(&data, &self.ubm)?)
    }

    /// Returns the model of `id`, loading or training it on first use.
    pub fn get_model(&self, id: &str) -> Result<Arc<Gmm>, VerifyError> {
        self.models.get_or_train(id, || self.train(id))
    }

    /// Builds the ZT-norm cohort state.
    ///
    /// T-norm models come from the model cache; Z-norm statistics are the
    /// client probes of every Z-norm identity, tagged with its real identity.
    pub fn precompute_ztnorm(&mut self) -> Result<(), VerifyError> {
        let tnorm_ids = self.protocol.tnorm_ids()?;
        let znorm_ids = self.protocol.znorm_ids()?;

        let mut tnorm_models = Vec::with_capacity(tnorm_ids.len());
        let mut tnorm_real = Vec::with_capacity(tnorm_ids.len());
        for id in &tnorm_ids {
            tnorm_models.push(self.get_model(id)?);
            tnorm_real.push(self.resolver.real_id(id)?);
        }

        let mut znorm_stats = Vec::new();
        let mut znorm_real = Vec::new();
        for id in &znorm_ids {
            let real = self.resolver.real_id(id)?;
            for file in self.protocol.znorm_files(id)? {
                znorm_stats.push(self.stats.get_or_compute(&self.ubm, &file, id)?);
                znorm_real.push(real.clone());
            }
        }

        let state = ZtNormState::new(
            &self.ubm,
            tnorm_models,
            &tnorm_real,
            znorm_stats,
            &znorm_real,
        )?;
        info!(
            tnorm = state.tnorm_len(),
            znorm = state.znorm_len(),
            "zt-norm cohorts ready"
        );
        self.ztnorm = Some(state);
        Ok(())
    }

    /// Scores `models` against `probes`; rows are models, columns probes.
    ///
    /// Linear scoring uses cached statistics of each probe, keyed by its
    /// claimed identity. With ZT-norm enabled the state must have been built
    /// by [`precompute_ztnorm`](Self::precompute_ztnorm).
    pub fn scores(&self, models: &[Arc<Gmm>], probes: &[Probe]) -> Result<ScoreMatrix, VerifyError> {
        if !self.cfg.linear_scoring {
            if self.cfg.ztnorm {
                return Err(VerifyError::Configuration(
                    "ztnorm requires linear_scoring".into(),
                ));
            }
            let data = probes
                .iter()
                .map(|p| FeatureSet::load(&p.path))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(llr_scoring(models, &self.ubm, &data)?);
        }

        let stats = probes
            .iter()
            .map(|p| self.stats.get_or_compute(&self.ubm, &p.path, &p.claimed_id))
            .collect::<Result<Vec<_>, _>>()?;
        let raw = linear_scoring(
            models,
            &self.ubm,
            &stats,
            self.cfg.frame_length_normalisation,
        )?;
        if !self.cfg.ztnorm {
            return Ok(raw);
        }

        let state = self.ztnorm.as_ref().ok_or_else(|| {
            VerifyError::Configuration("zt-norm state has not been precomputed".into())
        })?;
        state.apply(&self.ubm, models, &raw, &stats, self.cfg.n_blocks)
    }

    fn scores_for(&self, id: &str, class: ProbeClass) -> Result<Vec<ScoredProbe>, VerifyError> {
        let probes = self.protocol.probes(id, class)?;
        if probes.is_empty() {
            return Err(VerifyError::Configuration(format!(
                "identity {id:?} has no {class:?} probes"
            )));
        }
        let model = self.get_model(id)?;
        let scores = self.scores(&[model], &probes)?;
        Ok(probes
            .into_iter()
            .zip(scores.row(0))
            .map(|(probe, &score)| ScoredProbe { probe, score })
            .collect())
    }

    /// Scores the client probes of `id` against its model.
    pub fn scores_client(&self, id: &str) -> Result<Vec<ScoredProbe>, VerifyError> {
        self.scores_for(id, ProbeClass::Client)
    }

    /// Scores the impostor probes of `id` against its model.
    pub fn scores_impostor(&self, id: &str) -> Result<Vec<ScoredProbe>, VerifyError> {
        self.scores_for(id, ProbeClass::Impostor)
    }

    /// Evaluates every identity of `group`, writing one line per probe to
    /// `sink` in enumeration order. Any error aborts the group.
    ///
    /// The ZT-norm state is built at the start and discarded at the end of
    /// the group, whether or not it succeeds.
    pub fn run<W: Write>(&mut self, group: &str, sink: &mut W) -> Result<RunReport, VerifyError> {
        let ids = self.protocol.models(group)?;
        if ids.is_empty() {
            return Err(VerifyError::Configuration(format!(
                "group {group:?} has no models"
            )));
        }
        info!(group, models = ids.len(), ztnorm = self.cfg.ztnorm, "run started");

        let result = self.run_group(&ids, sink);
        self.ztnorm = None;
        let report = result?;

        info!(group, models = report.models, lines = report.lines, "run finished");
        Ok(report)
    }

    fn run_group<W: Write>(&mut self, ids: &[String], sink: &mut W) -> Result<RunReport, VerifyError> {
        if self.cfg.ztnorm {
            self.precompute_ztnorm()?;
        }

        let mut report = RunReport::default();
        for (i, id) in ids.iter().enumerate() {
            let client = self.scores_client(id)?;
            let impostor = self.scores_impostor(id)?;
            if i == 0 {
                report.spot_check = SpotCheck {
                    client: client.iter().take(2).map(|s| s.score).collect(),
                    impostor: impostor.iter().take(2).map(|s| s.score).collect(),
                };
            }
            for scored in client.iter().chain(&impostor) {
                writeln!(sink, "{}", scored.line())?;
                report.lines += 1;
            }
            report.models += 1;
        }
        sink.flush()?;
        Ok(report)
    }
}
