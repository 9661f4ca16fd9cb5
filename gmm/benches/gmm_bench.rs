use criterion::{black_box, criterion_group, criterion_main, Criterion};
use giztoy_gmm::{
    linear_scoring, train_gmm, zt_norm, FeatureSet, Gmm, GmmStats, ScoreMatrix, TrainConfig,
};

fn random_frames(dim: usize, n: usize, seed: u64) -> FeatureSet {
    let mut state = seed;
    let frames = (0..n)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                    ((state >> 33) as f64) / (u32::MAX as f64) * 4.0 - 1.0
                })
                .collect()
        })
        .collect();
    FeatureSet::from_frames(dim, frames).unwrap()
}

fn ubm(dim: usize, k: usize) -> Gmm {
    let cfg = TrainConfig {
        n_gaussians: k,
        iterk: 10,
        iterg: 5,
        ..TrainConfig::default()
    };
    train_gmm(&random_frames(dim, 2000, 7), &cfg).unwrap()
}

fn bench_acc_statistics(c: &mut Criterion) {
    let ubm = ubm(19, 32);
    let data = random_frames(19, 500, 42);
    let mut stats = GmmStats::new(32, 19);

    c.bench_function("acc_statistics/500x19/k32", |b| {
        b.iter(|| {
            stats.reset();
            ubm.acc_statistics(black_box(&data), &mut stats).unwrap();
        })
    });
}

fn bench_linear_scoring(c: &mut Criterion) {
    let ubm = ubm(19, 32);
    let models: Vec<Gmm> = (0..20)
        .map(|i| {
            let mut m = ubm.clone();
            let means = m
                .means()
                .iter()
                .map(|row| row.iter().map(|v| v + i as f64 * 0.01).collect())
                .collect();
            m.set_means(means).unwrap();
            m
        })
        .collect();
    let stats: Vec<GmmStats> = (0..50)
        .map(|i| ubm.statistics(&random_frames(19, 100, 1000 + i)).unwrap())
        .collect();

    c.bench_function("linear_scoring/20x50", |b| {
        b.iter(|| linear_scoring(black_box(&models), &ubm, black_box(&stats), false).unwrap())
    });
}

fn matrix(rows: usize, cols: usize, seed: u64) -> ScoreMatrix {
    let f = random_frames(cols, rows, seed);
    ScoreMatrix::from_rows(f.frames().to_vec()).unwrap()
}

fn bench_zt_norm(c: &mut Criterion) {
    let a = matrix(50, 200, 1);
    let b = matrix(50, 100, 2);
    let cohort = matrix(60, 200, 3);
    let d = matrix(60, 100, 4);
    let same = vec![vec![false; 100]; 60];

    c.bench_function("zt_norm/50x200", |bch| {
        bch.iter(|| zt_norm(black_box(&a), &b, &cohort, &d, &same).unwrap())
    });
}

criterion_group!(benches, bench_acc_statistics, bench_linear_scoring, bench_zt_norm);
criterion_main!(benches);
