use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use giztoy_gmm::{
    train_gmm, EmOutcome, FeatureSet, Gmm, GmmAdapter, GmmError, MapGmmTrainer, MapOptions,
    MapSolver, TrainConfig,
};
use giztoy_verify::{
    ExperimentConfig, GmmExperiment, IdentityEntry, Manifest, ManifestProtocol, ProbeClass,
    ProbeEntry, VerifyError,
};

const DIM: usize = 3;

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 11) as f64) / ((1u64 << 53) as f64) - 0.5
    }
}

/// Reference MAP solver that counts how often it runs.
struct CountingMap {
    calls: Arc<AtomicUsize>,
}

impl MapSolver for CountingMap {
    fn adapt(
        &self,
        prior: &Gmm,
        gmm: &mut Gmm,
        data: &FeatureSet,
        opts: &MapOptions,
    ) -> Result<EmOutcome, GmmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MapGmmTrainer::new().adapt(prior, gmm, data, opts)
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    features: PathBuf,
    manifest: Manifest,
    ubm: Gmm,
}

fn frames(center: [f64; DIM], n: usize, rng: &mut Lcg) -> Vec<Vec<f64>> {
    (0..n)
        .map(|_| center.iter().map(|c| c + rng.next()).collect())
        .collect()
}

fn save(dir: &Path, name: &str, frames: Vec<Vec<f64>>) -> PathBuf {
    FeatureSet::from_frames(DIM, frames)
        .unwrap()
        .save(&dir.join(name))
        .unwrap();
    PathBuf::from(name)
}

/// Three dev identities and three T/Z-norm cohort identities, each a tight
/// cluster around its own center. Cohort `t3` is an alias of the person
/// behind `t1`.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let features = dir.path().join("features");
    std::fs::create_dir_all(&features).unwrap();
    let mut rng = Lcg(7);

    let people: [(&str, Option<&str>, [f64; DIM]); 6] = [
        ("c1", None, [0.0, 0.0, 0.0]),
        ("c2", None, [6.0, 0.0, 0.0]),
        ("c3", None, [0.0, 6.0, 0.0]),
        ("t1", Some("p1"), [0.0, 0.0, 6.0]),
        ("t2", Some("p2"), [6.0, 6.0, 0.0]),
        ("t3", Some("p1"), [6.0, 0.0, 6.0]),
    ];

    let mut manifest = Manifest::default();
    let mut pooled = Vec::new();
    let mut client_probes: Vec<(String, Vec<PathBuf>)> = Vec::new();
    for (id, real, center) in people {
        let mut entry = IdentityEntry {
            real_id: real.map(str::to_string),
            ..Default::default()
        };
        for i in 0..2 {
            let f = frames(center, 20, &mut rng);
            pooled.extend(f.clone());
            entry.enrol.push(save(&features, &format!("{id}_enrol_{i}.json"), f));
        }
        let mut probes = Vec::new();
        for i in 0..2 {
            let p = save(
                &features,
                &format!("{id}_probe_{i}.json"),
                frames(center, 10, &mut rng),
            );
            entry.probes.push(ProbeEntry {
                path: p.clone(),
                real_id: real.unwrap_or(id).to_string(),
                class: ProbeClass::Client,
                label: None,
            });
            probes.push(p);
        }
        client_probes.push((id.to_string(), probes));
        manifest.identities.insert(id.to_string(), entry);
    }

    // Impostor probes of each dev identity: the client probes of the other
    // dev identities.
    let dev = ["c1", "c2", "c3"];
    for id in dev {
        let impostors: Vec<ProbeEntry> = client_probes
            .iter()
            .filter(|(other, _)| other != id && dev.contains(&other.as_str()))
            .flat_map(|(other, paths)| {
                paths.iter().map(move |p| ProbeEntry {
                    path: p.clone(),
                    real_id: other.clone(),
                    class: ProbeClass::Impostor,
                    label: None,
                })
            })
            .collect();
        if let Some(entry) = manifest.identities.get_mut(id) {
            entry.probes.extend(impostors);
        }
    }
    manifest
        .groups
        .insert("dev".into(), dev.iter().map(|s| s.to_string()).collect());
    manifest.tnorm = vec!["t1".into(), "t2".into(), "t3".into()];

    let ubm_cfg = TrainConfig {
        n_gaussians: 5,
        iterk: 50,
        iterg: 25,
        convergence_threshold: 5e-4,
        variance_threshold: 1e-3,
        ..TrainConfig::default()
    };
    let ubm = train_gmm(&FeatureSet::from_frames(DIM, pooled).unwrap(), &ubm_cfg).unwrap();

    Fixture {
        _dir: dir,
        features,
        manifest,
        ubm,
    }
}

fn config() -> ExperimentConfig {
    ExperimentConfig {
        iterg: 1,
        iterk: 50,
        convergence_threshold: 5e-4,
        variance_threshold: 1e-3,
        relevance_factor: 4.0,
        responsibilities_threshold: 0.0,
        linear_scoring: true,
        ztnorm: true,
        model_extension: "msgpack".into(),
        ..ExperimentConfig::default()
    }
}

fn experiment(fx: &Fixture, models_dir: &Path, calls: &Arc<AtomicUsize>) -> GmmExperiment {
    let cfg = config();
    let protocol = Arc::new(ManifestProtocol::new(fx.manifest.clone(), &fx.features));
    let adapter = GmmAdapter::new(
        cfg.adapt_config(),
        Box::new(CountingMap {
            calls: Arc::clone(calls),
        }),
    );
    GmmExperiment::new(cfg, protocol.clone(), protocol, fx.ubm.clone(), models_dir)
        .unwrap()
        .with_adapter(adapter)
}

fn parse(out: &[u8]) -> Vec<(String, String, String, f64)> {
    String::from_utf8(out.to_vec())
        .unwrap()
        .lines()
        .map(|l| {
            let f: Vec<&str> = l.split(' ').collect();
            assert_eq!(f.len(), 4, "{l}");
            (f[0].into(), f[1].into(), f[2].into(), f[3].parse().unwrap())
        })
        .collect()
}

#[test]
fn linear_scoring_with_ztnorm_end_to_end() {
    let fx = fixture();
    let models_dir = fx.features.parent().unwrap().join("models");
    let calls = Arc::new(AtomicUsize::new(0));
    let mut exp = experiment(&fx, &models_dir, &calls);

    let mut out = Vec::new();
    let report = exp.run("dev", &mut out).unwrap();

    // 3 identities × (2 client + 4 impostor probes).
    assert_eq!(report.models, 3);
    assert_eq!(report.lines, 18);
    // Every dev and cohort model trained exactly once.
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let lines = parse(&out);
    assert_eq!(lines.len(), 18);
    assert!(lines.iter().all(|l| l.3.is_finite()));
    assert_eq!(
        (lines[0].0.as_str(), lines[0].1.as_str(), lines[0].2.as_str()),
        ("c1", "c1", "c1_probe_0")
    );
    assert_eq!(
        (lines[2].0.as_str(), lines[2].1.as_str()),
        ("c2", "c1")
    );

    let spot = report.spot_check.values().unwrap();
    assert_eq!(spot, [lines[0].3, lines[1].3, lines[2].3, lines[3].3]);

    let (mut client, mut impostor) = (Vec::new(), Vec::new());
    for (real, claimed, _, score) in &lines {
        if real == claimed {
            client.push(*score);
        } else {
            impostor.push(*score);
        }
    }
    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    assert!(mean(&client) > mean(&impostor), "{client:?} vs {impostor:?}");

    // The cohort state only lives for the group.
    assert!(exp.ztnorm_state().is_none());

    // t1 and t3 are the same person: their z-norm probes mask each other.
    exp.precompute_ztnorm().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let state = exp.ztnorm_state().unwrap();
    assert_eq!((state.tnorm_len(), state.znorm_len()), (3, 6));
    let row = |t: usize| state.mask()[t].clone();
    assert_eq!(row(0), vec![true, true, false, false, true, true]);
    assert_eq!(row(1), vec![false, false, true, true, false, false]);
    assert_eq!(row(2), row(0));

    for id in ["c1", "c2", "c3", "t1", "t2", "t3"] {
        assert!(models_dir.join(format!("{id}.msgpack")).exists(), "{id}");
    }
    assert!(models_dir.join("statswm_t2_probe_1_t2.msgpack").exists());
    assert!(models_dir.join("statswm_c2_probe_0_c1.msgpack").exists());
}

#[test]
fn znorm_mask_depends_on_real_identity_only() {
    let fx = fixture();
    let models_dir = fx.features.parent().unwrap().join("models");
    let calls = Arc::new(AtomicUsize::new(0));

    // t1 and t3 resolve to the same real identity, so swapping one for the
    // other in the z-norm cohort changes the claimed ids but not the mask.
    let mut masks = Vec::new();
    for znorm in [["t1", "t2"], ["t3", "t2"]] {
        let mut manifest = fx.manifest.clone();
        manifest.znorm = Some(znorm.iter().map(|s| s.to_string()).collect());
        let cfg = config();
        let protocol = Arc::new(ManifestProtocol::new(manifest, &fx.features));
        let adapter = GmmAdapter::new(
            cfg.adapt_config(),
            Box::new(CountingMap {
                calls: Arc::clone(&calls),
            }),
        );
        let mut exp = GmmExperiment::new(cfg, protocol.clone(), protocol, fx.ubm.clone(), &models_dir)
            .unwrap()
            .with_adapter(adapter);
        exp.precompute_ztnorm().unwrap();
        let state = exp.ztnorm_state().unwrap();
        assert_eq!((state.tnorm_len(), state.znorm_len()), (3, 4));
        masks.push(state.mask().to_vec());
    }
    assert_eq!(masks[0], masks[1]);
    assert_eq!(
        masks[0],
        vec![
            vec![true, true, false, false],
            vec![false, false, true, true],
            vec![true, true, false, false],
        ]
    );
}

#[test]
fn failed_run_discards_ztnorm_state() {
    let fx = fixture();
    let models_dir = fx.features.parent().unwrap().join("models");
    let calls = Arc::new(AtomicUsize::new(0));
    let mut exp = experiment(&fx, &models_dir, &calls);
    std::fs::remove_file(fx.features.join("c2_probe_1.json")).unwrap();
    assert!(exp.run("dev", &mut Vec::new()).is_err());
    assert!(exp.ztnorm_state().is_none());
}

#[test]
fn persisted_models_are_reused_across_runs() {
    let fx = fixture();
    let root = fx.features.parent().unwrap().to_path_buf();
    let calls = Arc::new(AtomicUsize::new(0));

    let mut first = Vec::new();
    experiment(&fx, &root.join("models"), &calls)
        .run("dev", &mut first)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let mut second = Vec::new();
    experiment(&fx, &root.join("models"), &calls)
        .run("dev", &mut second)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 6, "second run must not retrain");
    assert_eq!(first, second);

    // A fresh models directory retrains and reproduces the same scores.
    let mut fresh = Vec::new();
    experiment(&fx, &root.join("models-fresh"), &calls)
        .run("dev", &mut fresh)
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 12);
    assert_eq!(first, fresh);
}

#[test]
fn corrupted_model_aborts_the_run() {
    let fx = fixture();
    let models_dir = fx.features.parent().unwrap().join("models");
    let calls = Arc::new(AtomicUsize::new(0));
    experiment(&fx, &models_dir, &calls)
        .run("dev", &mut Vec::new())
        .unwrap();

    std::fs::write(models_dir.join("c2.msgpack"), "this is not a model").unwrap();
    let before = calls.load(Ordering::SeqCst);
    let err = experiment(&fx, &models_dir, &calls)
        .run("dev", &mut Vec::new())
        .unwrap_err();
    assert!(
        matches!(err, VerifyError::Gmm(GmmError::Persistence { .. })),
        "{err:?}"
    );
    assert_eq!(calls.load(Ordering::SeqCst), before);
}

#[test]
fn direct_scoring_run() {
    let fx = fixture();
    let models_dir = fx.features.parent().unwrap().join("models");
    let calls = Arc::new(AtomicUsize::new(0));
    let cfg = ExperimentConfig {
        linear_scoring: false,
        ztnorm: false,
        ..config()
    };
    let protocol = Arc::new(ManifestProtocol::new(fx.manifest.clone(), &fx.features));
    let mut exp = GmmExperiment::new(cfg, protocol.clone(), protocol, fx.ubm.clone(), &models_dir)
        .unwrap();

    let mut out = Vec::new();
    let report = exp.run("dev", &mut out).unwrap();
    assert_eq!(report.lines, 18);
    assert!(exp.ztnorm_state().is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    for (real, claimed, _, score) in parse(&out) {
        if real == claimed {
            assert!(score > 0.0, "client score {score}");
        }
    }
}
