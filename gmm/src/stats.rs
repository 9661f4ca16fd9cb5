use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{persist, GmmError};

/// Zeroth, first and second order statistics of a feature set accumulated
/// against a fixed GMM.
///
/// `n[k]` is the summed responsibility of component `k`, `sum_px[k]` the
/// responsibility-weighted sum of frames and `sum_pxx[k]` the weighted sum
/// of squared frames (element-wise).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmmStats {
    pub t: usize,
    pub log_likelihood: f64,
    pub n: Vec<f64>,
    pub sum_px: Vec<Vec<f64>>,
    pub sum_pxx: Vec<Vec<f64>>,
}

impl GmmStats {
    /// Creates zeroed statistics for `n_gaussians` components of dimension `dim`.
    pub fn new(n_gaussians: usize, dim: usize) -> Self {
        Self {
            t: 0,
            log_likelihood: 0.0,
            n: vec![0.0; n_gaussians],
            sum_px: vec![vec![0.0; dim]; n_gaussians],
            sum_pxx: vec![vec![0.0; dim]; n_gaussians],
        }
    }

    pub fn n_gaussians(&self) -> usize {
        self.n.len()
    }

    pub fn dim(&self) -> usize {
        self.sum_px.first().map_or(0, Vec::len)
    }

    /// Zeroes all accumulators, keeping the shape.
    pub fn reset(&mut self) {
        self.t = 0;
        self.log_likelihood = 0.0;
        self.n.iter_mut().for_each(|v| *v = 0.0);
        for row in self.sum_px.iter_mut().chain(self.sum_pxx.iter_mut()) {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
    }

    /// Adds the accumulators of `other` into `self`.
    pub fn merge(&mut self, other: &GmmStats) -> Result<(), GmmError> {
        self.check_shape(other.n_gaussians(), other.dim())?;
        self.t += other.t;
        self.log_likelihood += other.log_likelihood;
        for k in 0..self.n.len() {
            self.n[k] += other.n[k];
            for d in 0..self.sum_px[k].len() {
                self.sum_px[k][d] += other.sum_px[k][d];
                self.sum_pxx[k][d] += other.sum_pxx[k][d];
            }
        }
        Ok(())
    }

    /// Mean log-likelihood per frame, or 0 when nothing was accumulated.
    pub fn average_log_likelihood(&self) -> f64 {
        if self.t == 0 {
            0.0
        } else {
            self.log_likelihood / self.t as f64
        }
    }

    pub(crate) fn check_shape(&self, n_gaussians: usize, dim: usize) -> Result<(), GmmError> {
        if self.n_gaussians() != n_gaussians {
            return Err(GmmError::DimensionMismatch {
                expected: n_gaussians,
                got: self.n_gaussians(),
            });
        }
        if self.dim() != dim {
            return Err(GmmError::DimensionMismatch {
                expected: dim,
                got: self.dim(),
            });
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), String> {
        let k = self.n.len();
        if k == 0 {
            return Err("no components".into());
        }
        if self.sum_px.len() != k || self.sum_pxx.len() != k {
            return Err("component count differs between accumulators".into());
        }
        let dim = self.dim();
        if dim == 0 {
            return Err("zero dimension".into());
        }
        if self
            .sum_px
            .iter()
            .chain(self.sum_pxx.iter())
            .any(|row| row.len() != dim)
        {
            return Err("ragged accumulator rows".into());
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), GmmError> {
        persist::save(self, path)
    }

    pub fn load(path: &Path) -> Result<Self, GmmError> {
        let stats: GmmStats = persist::load(path)?;
        stats
            .validate()
            .map_err(|reason| GmmError::persistence(path, reason))?;
        Ok(stats)
    }
}
