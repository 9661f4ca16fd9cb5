use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{persist, FeatureSet, GmmError, GmmStats};

/// Tolerance used when checking that mixture weights sum to one.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Diagonal-covariance Gaussian mixture model.
///
/// `K` components over `D` dimensions. Shapes are fixed at construction;
/// every variance stays at or above [`Gmm::variance_floor`] and the weights
/// always sum to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gmm {
    means: Vec<Vec<f64>>,
    variances: Vec<Vec<f64>>,
    weights: Vec<f64>,
    #[serde(default)]
    variance_floor: f64,
}

impl Gmm {
    /// Creates a model with zero means, unit variances and uniform weights.
    /// Panics if `n_gaussians` or `dim` is 0.
    pub fn new(n_gaussians: usize, dim: usize) -> Self {
        assert!(n_gaussians > 0, "gmm: n_gaussians must be positive");
        assert!(dim > 0, "gmm: dim must be positive");
        Self {
            means: vec![vec![0.0; dim]; n_gaussians],
            variances: vec![vec![1.0; dim]; n_gaussians],
            weights: vec![1.0 / n_gaussians as f64; n_gaussians],
            variance_floor: 0.0,
        }
    }

    /// Builds a model from explicit parameters.
    ///
    /// Variances are floored by `variance_floor`; weights are renormalized.
    pub fn from_parts(
        means: Vec<Vec<f64>>,
        variances: Vec<Vec<f64>>,
        weights: Vec<f64>,
        variance_floor: f64,
    ) -> Result<Self, GmmError> {
        let k = means.len();
        if k == 0 {
            return Err(GmmError::EmptyData("gmm needs at least one component"));
        }
        let dim = means[0].len();
        if dim == 0 {
            return Err(GmmError::EmptyData("gmm needs a positive dimension"));
        }
        let mut gmm = Self::new(k, dim);
        gmm.set_means(means)?;
        gmm.variance_floor = variance_floor;
        gmm.set_variances(variances)?;
        gmm.set_weights(weights)?;
        Ok(gmm)
    }

    pub fn n_gaussians(&self) -> usize {
        self.weights.len()
    }

    pub fn dim(&self) -> usize {
        self.means[0].len()
    }

    pub fn means(&self) -> &[Vec<f64>] {
        &self.means
    }

    pub fn variances(&self) -> &[Vec<f64>] {
        &self.variances
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn variance_floor(&self) -> f64 {
        self.variance_floor
    }

    fn check_matrix(&self, m: &[Vec<f64>]) -> Result<(), GmmError> {
        if m.len() != self.n_gaussians() {
            return Err(GmmError::DimensionMismatch {
                expected: self.n_gaussians(),
                got: m.len(),
            });
        }
        let dim = self.dim();
        if let Some(row) = m.iter().find(|r| r.len() != dim) {
            return Err(GmmError::DimensionMismatch {
                expected: dim,
                got: row.len(),
            });
        }
        Ok(())
    }

    pub fn set_means(&mut self, means: Vec<Vec<f64>>) -> Result<(), GmmError> {
        self.check_matrix(&means)?;
        self.means = means;
        Ok(())
    }

    /// Replaces the variances, applying the current floor.
    pub fn set_variances(&mut self, variances: Vec<Vec<f64>>) -> Result<(), GmmError> {
        self.check_matrix(&variances)?;
        self.variances = variances;
        self.apply_variance_floor();
        Ok(())
    }

    /// Replaces the weights, renormalizing them to sum to one.
    pub fn set_weights(&mut self, weights: Vec<f64>) -> Result<(), GmmError> {
        if weights.len() != self.n_gaussians() {
            return Err(GmmError::DimensionMismatch {
                expected: self.n_gaussians(),
                got: weights.len(),
            });
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GmmError::InvalidConfig(
                "weights must be finite and non-negative".into(),
            ));
        }
        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(GmmError::InvalidConfig("weights sum to zero".into()));
        }
        self.weights = weights.into_iter().map(|w| w / sum).collect();
        Ok(())
    }

    /// Sets the variance floor and raises every variance below it.
    pub fn set_variance_floor(&mut self, floor: f64) {
        self.variance_floor = floor;
        self.apply_variance_floor();
    }

    fn apply_variance_floor(&mut self) {
        let floor = self.variance_floor;
        for v in self.variances.iter_mut().flatten() {
            if !(*v >= floor) {
                *v = floor;
            }
        }
    }

    /// Per-component constant `log w_k - 0.5 (D log 2π + Σ_d log σ²_kd)`.
    fn log_constants(&self) -> Vec<f64> {
        let d_log_2pi = self.dim() as f64 * (2.0 * PI).ln();
        self.weights
            .iter()
            .zip(&self.variances)
            .map(|(w, var)| {
                let log_det: f64 = var.iter().map(|v| v.ln()).sum();
                w.ln() - 0.5 * (d_log_2pi + log_det)
            })
            .collect()
    }

    /// Fills `out[k]` with the log weighted likelihood of component `k` and
    /// returns the log-likelihood of the frame under the whole mixture.
    fn log_weighted_gaussians(&self, consts: &[f64], x: &[f64], out: &mut [f64]) -> f64 {
        for k in 0..self.n_gaussians() {
            let mut acc = 0.0;
            for ((xi, mu), var) in x.iter().zip(&self.means[k]).zip(&self.variances[k]) {
                let diff = xi - mu;
                acc += diff * diff / var;
            }
            out[k] = consts[k] - 0.5 * acc;
        }
        log_sum_exp(out)
    }

    /// Log-likelihood of a single frame.
    pub fn log_likelihood(&self, x: &[f64]) -> Result<f64, GmmError> {
        self.check_frame(x)?;
        let consts = self.log_constants();
        let mut buf = vec![0.0; self.n_gaussians()];
        Ok(self.log_weighted_gaussians(&consts, x, &mut buf))
    }

    /// Sum of frame log-likelihoods over the whole set.
    pub fn log_likelihood_sum(&self, data: &FeatureSet) -> Result<f64, GmmError> {
        self.check_data(data)?;
        let consts = self.log_constants();
        let mut buf = vec![0.0; self.n_gaussians()];
        Ok(data
            .iter()
            .map(|x| self.log_weighted_gaussians(&consts, x, &mut buf))
            .sum())
    }

    /// Accumulates sufficient statistics of `data` into `stats`.
    pub fn acc_statistics(&self, data: &FeatureSet, stats: &mut GmmStats) -> Result<(), GmmError> {
        self.check_data(data)?;
        stats.check_shape(self.n_gaussians(), self.dim())?;
        let consts = self.log_constants();
        let mut lw = vec![0.0; self.n_gaussians()];
        for x in data.iter() {
            let ll = self.log_weighted_gaussians(&consts, x, &mut lw);
            stats.t += 1;
            stats.log_likelihood += ll;
            for k in 0..self.n_gaussians() {
                let post = (lw[k] - ll).exp();
                if post == 0.0 || !post.is_finite() {
                    continue;
                }
                stats.n[k] += post;
                for (d, xi) in x.iter().enumerate() {
                    stats.sum_px[k][d] += post * xi;
                    stats.sum_pxx[k][d] += post * xi * xi;
                }
            }
        }
        Ok(())
    }

    /// Convenience wrapper returning fresh statistics for `data`.
    pub fn statistics(&self, data: &FeatureSet) -> Result<GmmStats, GmmError> {
        let mut stats = GmmStats::new(self.n_gaussians(), self.dim());
        self.acc_statistics(data, &mut stats)?;
        Ok(stats)
    }

    fn check_frame(&self, x: &[f64]) -> Result<(), GmmError> {
        if x.len() != self.dim() {
            return Err(GmmError::DimensionMismatch {
                expected: self.dim(),
                got: x.len(),
            });
        }
        Ok(())
    }

    fn check_data(&self, data: &FeatureSet) -> Result<(), GmmError> {
        if data.dim() != self.dim() {
            return Err(GmmError::DimensionMismatch {
                expected: self.dim(),
                got: data.dim(),
            });
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), GmmError> {
        persist::save(self, path)
    }

    /// Loads a model and checks its invariants; violations are reported as
    /// persistence errors. Loaded values are kept bit for bit.
    pub fn load(path: &Path) -> Result<Self, GmmError> {
        let gmm: Gmm = persist::load(path)?;
        gmm.check_invariants()
            .map_err(|reason| GmmError::persistence(path, reason))?;
        Ok(gmm)
    }

    fn check_invariants(&self) -> Result<(), String> {
        let k = self.weights.len();
        if k == 0 || self.means.len() != k || self.variances.len() != k {
            return Err(format!(
                "{} means, {} variances and {} weights",
                self.means.len(),
                self.variances.len(),
                k
            ));
        }
        let dim = self.means[0].len();
        if dim == 0 {
            return Err("zero-dimensional model".into());
        }
        if self
            .means
            .iter()
            .chain(&self.variances)
            .any(|row| row.len() != dim)
        {
            return Err(format!("rows must all have {dim} dimensions"));
        }
        if self.means.iter().flatten().any(|m| !m.is_finite()) {
            return Err("non-finite mean".into());
        }
        let floor = self.variance_floor;
        if let Some(v) = self
            .variances
            .iter()
            .flatten()
            .find(|v| !v.is_finite() || **v < floor)
        {
            return Err(format!("variance {v} below floor {floor}"));
        }
        if self.weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err("weights must be finite and non-negative".into());
        }
        let weight_sum: f64 = self.weights.iter().sum();
        if (weight_sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(format!("weights sum to {weight_sum}"));
        }
        Ok(())
    }
}

/// Numerically stable `log Σ exp(v_i)`.
pub(crate) fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}
