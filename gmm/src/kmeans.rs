use tracing::debug;

use crate::em::has_converged;
use crate::solver::{Clusters, ClusteringSolver, KMeansOptions};
use crate::{FeatureSet, GmmError};

/// Reference K-means solver with Euclidean distance.
///
/// Initial means are distinct frames drawn with a seeded generator, so runs
/// are reproducible for a given seed.
#[derive(Debug, Clone, Default)]
pub struct KMeansTrainer;

impl KMeansTrainer {
    pub fn new() -> Self {
        Self
    }
}

impl ClusteringSolver for KMeansTrainer {
    fn cluster(
        &self,
        data: &FeatureSet,
        n_clusters: usize,
        opts: &KMeansOptions,
    ) -> Result<Clusters, GmmError> {
        if n_clusters == 0 {
            return Err(GmmError::InvalidConfig("n_clusters must be positive".into()));
        }
        if data.len() < n_clusters {
            return Err(GmmError::InvalidConfig(format!(
                "need at least {n_clusters} frames for {n_clusters} clusters, got {}",
                data.len()
            )));
        }

        let mut means = initial_means(data, n_clusters, opts.seed);
        let mut avg = assign(data, &means).average_min_distance;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < opts.max_iterations {
            let prev = avg;
            let acc = assign(data, &means);
            for (k, mean) in means.iter_mut().enumerate() {
                // Empty clusters keep their previous mean.
                if acc.counts[k] > 0 {
                    let n = acc.counts[k] as f64;
                    for (m, s) in mean.iter_mut().zip(&acc.sums[k]) {
                        *m = s / n;
                    }
                }
            }
            iterations += 1;
            avg = assign(data, &means).average_min_distance;
            debug!(iteration = iterations, average_min_distance = avg, "kmeans step");
            if has_converged(prev, avg, opts.convergence_threshold) {
                converged = true;
                break;
            }
        }
        debug!(iterations, converged, "kmeans done");

        let ClusterStats { variances, weights } = cluster_stats(data, &means);
        Ok(Clusters {
            means,
            variances,
            weights,
        })
    }
}

pub(crate) struct ClusterStats {
    pub variances: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
}

struct Assignment {
    counts: Vec<usize>,
    sums: Vec<Vec<f64>>,
    average_min_distance: f64,
}

fn sq_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn closest(means: &[Vec<f64>], x: &[f64]) -> (usize, f64) {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (k, m) in means.iter().enumerate() {
        let d = sq_distance(m, x);
        if d < best_dist {
            best = k;
            best_dist = d;
        }
    }
    (best, best_dist)
}

fn assign(data: &FeatureSet, means: &[Vec<f64>]) -> Assignment {
    let mut counts = vec![0usize; means.len()];
    let mut sums = vec![vec![0.0; data.dim()]; means.len()];
    let mut total = 0.0;
    for x in data.iter() {
        let (k, dist) = closest(means, x);
        counts[k] += 1;
        for (s, xi) in sums[k].iter_mut().zip(x) {
            *s += xi;
        }
        total += dist;
    }
    Assignment {
        counts,
        sums,
        average_min_distance: total / data.len() as f64,
    }
}

/// Variance and weight of each cluster after hard assignment to `means`.
///
/// Variances are `E[x²] - E[x]²` over the frames of the cluster; weights
/// are cluster sizes over the frame count. An empty cluster gets zero
/// weight and zero variance (the GMM floor raises it later).
pub(crate) fn cluster_stats(data: &FeatureSet, means: &[Vec<f64>]) -> ClusterStats {
    let k = means.len();
    let dim = data.dim();
    let mut weights = vec![0.0; k];
    let mut first = vec![vec![0.0; dim]; k];
    let mut second = vec![vec![0.0; dim]; k];
    for x in data.iter() {
        let (c, _) = closest(means, x);
        weights[c] += 1.0;
        for d in 0..dim {
            first[c][d] += x[d];
            second[c][d] += x[d] * x[d];
        }
    }
    let mut variances = vec![vec![0.0; dim]; k];
    for c in 0..k {
        if weights[c] == 0.0 {
            continue;
        }
        for d in 0..dim {
            let mean = first[c][d] / weights[c];
            variances[c][d] = second[c][d] / weights[c] - mean * mean;
        }
    }
    let n = data.len() as f64;
    weights.iter_mut().for_each(|w| *w /= n);
    ClusterStats { variances, weights }
}

/// Picks `k` distinct frames with a partial Fisher-Yates shuffle.
fn initial_means(data: &FeatureSet, k: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = Lcg::new(seed);
    let mut idx: Vec<usize> = (0..data.len()).collect();
    for i in 0..k {
        let j = i + rng.below(idx.len() - i);
        idx.swap(i, j);
    }
    idx[..k].iter().map(|&i| data.frames()[i].clone()).collect()
}

/// 64-bit linear congruential generator (Knuth MMIX constants).
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self {
            state: seed ^ 0x9E37_79B9_7F4A_7C15,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 11
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
