use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use giztoy_gmm::{FeatureSet, Gmm, GmmStats};
use tracing::{debug, info};

use crate::VerifyError;

/// Identity → model registry with write-through persistence.
///
/// Lookups go memory, then `<dir>/<id>.<ext>`, then the training closure.
/// The lock is held while training, so an identity is trained at most once
/// even when the cache is shared between threads. Entries are never evicted.
pub struct ModelCache {
    dir: PathBuf,
    extension: String,
    models: Mutex<HashMap<String, Arc<Gmm>>>,
}

impl ModelCache {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            models: Mutex::new(HashMap::new()),
        }
    }

    /// File a model for `id` is persisted to.
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{}", self.extension))
    }

    /// Returns the cached model without loading or training.
    pub fn get(&self, id: &str) -> Option<Arc<Gmm>> {
        self.models.lock().unwrap().get(id).cloned()
    }

    /// Returns the model for `id`, loading or training it on first use.
    ///
    /// A persisted file that fails to load is an error; it is never
    /// silently retrained.
    pub fn get_or_train<F>(&self, id: &str, train: F) -> Result<Arc<Gmm>, VerifyError>
    where
        F: FnOnce() -> Result<Gmm, VerifyError>,
    {
        let mut models = self.models.lock().unwrap();
        if let Some(gmm) = models.get(id) {
            debug!(id, "model cache hit");
            return Ok(Arc::clone(gmm));
        }

        let path = self.path_for(id);
        let gmm = if path.exists() {
            debug!(id, path = %path.display(), "loading model");
            Gmm::load(&path)?
        } else {
            let gmm = train()?;
            std::fs::create_dir_all(&self.dir)?;
            gmm.save(&path)?;
            info!(id, path = %path.display(), "model trained and saved");
            gmm
        };

        let gmm = Arc::new(gmm);
        models.insert(id.to_string(), Arc::clone(&gmm));
        Ok(gmm)
    }

    pub fn len(&self) -> usize {
        self.models.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-file sufficient statistics against the background model.
///
/// Files are named `statswm_<basename>_<id>.<ext>` inside the cache
/// directory, where `basename` is the probe file stem. Two different probe
/// files that map to the same name under one identity are rejected.
pub struct StatsCache {
    dir: PathBuf,
    extension: String,
    stats: Mutex<HashMap<PathBuf, (PathBuf, Arc<GmmStats>)>>,
}

impl StatsCache {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// File the statistics of `probe` under identity `id` are persisted to.
    pub fn path_for(&self, probe: &Path, id: &str) -> Result<PathBuf, VerifyError> {
        let stem = probe
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                VerifyError::Protocol(format!("probe path {} has no file name", probe.display()))
            })?;
        Ok(self
            .dir
            .join(format!("statswm_{stem}_{id}.{}", self.extension)))
    }

    /// Returns the statistics of `probe`, loading them from disk or
    /// accumulating them against `ubm` and persisting on first use.
    pub fn get_or_compute(
        &self,
        ubm: &Gmm,
        probe: &Path,
        id: &str,
    ) -> Result<Arc<GmmStats>, VerifyError> {
        let path = self.path_for(probe, id)?;
        let mut cache = self.stats.lock().unwrap();
        if let Some((owner, stats)) = cache.get(&path) {
            if owner != probe {
                return Err(VerifyError::Protocol(format!(
                    "probes {} and {} share statistics file {}",
                    owner.display(),
                    probe.display(),
                    path.display()
                )));
            }
            return Ok(Arc::clone(stats));
        }

        let stats = if path.exists() {
            let stats = GmmStats::load(&path)?;
            if stats.n_gaussians() != ubm.n_gaussians() || stats.dim() != ubm.dim() {
                return Err(giztoy_gmm::GmmError::persistence(
                    &path,
                    format!(
                        "statistics are {}x{}, background model is {}x{}",
                        stats.n_gaussians(),
                        stats.dim(),
                        ubm.n_gaussians(),
                        ubm.dim()
                    ),
                )
                .into());
            }
            stats
        } else {
            let data = FeatureSet::load(probe)?;
            let stats = ubm.statistics(&data)?;
            std::fs::create_dir_all(&self.dir)?;
            stats.save(&path)?;
            debug!(probe = %probe.display(), path = %path.display(), "statistics saved");
            stats
        };

        let stats = Arc::new(stats);
        cache.insert(path, (probe.to_path_buf(), Arc::clone(&stats)));
        Ok(stats)
    }

    pub fn len(&self) -> usize {
        self.stats.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn model(shift: f64) -> Gmm {
        Gmm::from_parts(
            vec![vec![shift, 0.0], vec![shift + 3.0, 1.0]],
            vec![vec![1.0, 1.0], vec![0.5, 2.0]],
            vec![0.4, 0.6],
            1e-3,
        )
        .unwrap()
    }

    #[test]
    fn model_cache_trains_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path(), "json");
        let calls = Cell::new(0);
        let train = || {
            calls.set(calls.get() + 1);
            Ok(model(1.0))
        };

        let a = cache.get_or_train("c1", train).unwrap();
        let b = cache
            .get_or_train("c1", || {
                calls.set(calls.get() + 1);
                Ok(model(2.0))
            })
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(cache.path_for("c1").exists());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn model_cache_reuses_persisted_models() {
        let dir = tempfile::tempdir().unwrap();
        ModelCache::new(dir.path(), "msgpack")
            .get_or_train("c1", || Ok(model(1.0)))
            .unwrap();

        let fresh = ModelCache::new(dir.path(), "msgpack");
        assert!(fresh.get("c1").is_none());
        let loaded = fresh
            .get_or_train("c1", || panic!("must load from disk"))
            .unwrap();
        assert_eq!(*loaded, model(1.0));
    }

    #[test]
    fn corrupted_model_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path(), "json");
        std::fs::write(cache.path_for("c1"), "{ broken").unwrap();
        let err = cache
            .get_or_train("c1", || panic!("must not retrain"))
            .unwrap_err();
        assert!(matches!(
            err,
            VerifyError::Gmm(giztoy_gmm::GmmError::Persistence { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn training_errors_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ModelCache::new(dir.path(), "json");
        assert!(cache
            .get_or_train("c1", || Err(VerifyError::Configuration("no data".into())))
            .is_err());
        assert!(!cache.path_for("c1").exists());
        assert!(cache.get_or_train("c1", || Ok(model(0.0))).is_ok());
    }

    #[test]
    fn stats_cache_naming_and_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let probe = dir.path().join("probe_07.json");
        FeatureSet::from_frames(2, vec![vec![0.5, 0.1], vec![2.0, 1.5]])
            .unwrap()
            .save(&probe)
            .unwrap();

        let ubm = model(0.0);
        let cache = StatsCache::new(dir.path().join("models"), "msgpack");
        let path = cache.path_for(&probe, "c3").unwrap();
        assert!(path.ends_with("models/statswm_probe_07_c3.msgpack"));

        let first = cache.get_or_compute(&ubm, &probe, "c3").unwrap();
        assert_eq!(first.t, 2);
        assert!(path.exists());

        std::fs::remove_file(&probe).unwrap();
        let fresh = StatsCache::new(dir.path().join("models"), "msgpack");
        let second = fresh.get_or_compute(&ubm, &probe, "c3").unwrap();
        assert_eq!(*first, *second);
    }

    #[test]
    fn stats_name_collisions_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ubm = model(0.0);
        let mut probes = Vec::new();
        for sub in ["a", "b"] {
            std::fs::create_dir_all(dir.path().join(sub)).unwrap();
            let probe = dir.path().join(sub).join("p.json");
            FeatureSet::from_frames(2, vec![vec![0.5, 0.1]])
                .unwrap()
                .save(&probe)
                .unwrap();
            probes.push(probe);
        }
        let cache = StatsCache::new(dir.path().join("models"), "msgpack");
        cache.get_or_compute(&ubm, &probes[0], "c1").unwrap();
        cache.get_or_compute(&ubm, &probes[0], "c1").unwrap();
        let err = cache.get_or_compute(&ubm, &probes[1], "c1").unwrap_err();
        assert!(matches!(err, VerifyError::Protocol(_)), "{err:?}");
        // Another identity gets its own file.
        cache.get_or_compute(&ubm, &probes[1], "c2").unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn stats_with_wrong_shape_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = StatsCache::new(dir.path(), "json");
        let probe = Path::new("p.json");
        GmmStats::new(3, 2)
            .save(&cache.path_for(probe, "c1").unwrap())
            .unwrap();
        assert!(cache.get_or_compute(&model(0.0), probe, "c1").is_err());
    }
}
