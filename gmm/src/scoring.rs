use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{FeatureSet, Gmm, GmmError, GmmStats};

/// Dense `rows × cols` score matrix; rows are models, columns are probes.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl ScoreMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Builds a matrix from row vectors of equal length.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, GmmError> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(bad) = rows.iter().find(|r| r.len() != cols) {
            return Err(GmmError::DimensionMismatch {
                expected: cols,
                got: bad.len(),
            });
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f64) {
        self.data[r * self.cols + c] = v;
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// Iterates over column `c`, top to bottom.
    pub fn column(&self, c: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.rows).map(move |r| self.get(r, c))
    }

    /// Returns a copy with every entry divided by `divisor`.
    pub fn divided_by(&self, divisor: f64) -> Self {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|v| v / divisor).collect(),
        }
    }
}

impl fmt::Debug for ScoreMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<&[f64]> = (0..self.rows).map(|r| self.row(r)).collect();
        f.debug_struct("ScoreMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("data", &rows)
            .finish()
    }
}

impl AsRef<Gmm> for Gmm {
    fn as_ref(&self) -> &Gmm {
        self
    }
}

impl AsRef<GmmStats> for GmmStats {
    fn as_ref(&self) -> &GmmStats {
        self
    }
}

fn check_same_shape(ubm: &Gmm, k: usize, dim: usize) -> Result<(), GmmError> {
    if k != ubm.n_gaussians() {
        return Err(GmmError::DimensionMismatch {
            expected: ubm.n_gaussians(),
            got: k,
        });
    }
    if dim != ubm.dim() {
        return Err(GmmError::DimensionMismatch {
            expected: ubm.dim(),
            got: dim,
        });
    }
    Ok(())
}

/// Linear approximation of the log-likelihood ratio.
///
/// ```text
/// score[m][n] = Σ_k Σ_d (μ_m[k,d] - μ_ubm[k,d]) / σ²_ubm[k,d] · (F_n[k,d] - N_n[k] · μ_ubm[k,d])
/// ```
///
/// With `frame_length_normalisation` each column is divided by the probe's
/// frame count.
pub fn linear_scoring<M, S>(
    models: &[M],
    ubm: &Gmm,
    stats: &[S],
    frame_length_normalisation: bool,
) -> Result<ScoreMatrix, GmmError>
where
    M: AsRef<Gmm>,
    S: AsRef<GmmStats>,
{
    let k = ubm.n_gaussians();
    let dim = ubm.dim();

    let offsets: Vec<Vec<f64>> = models
        .iter()
        .map(|m| {
            let m = m.as_ref();
            check_same_shape(ubm, m.n_gaussians(), m.dim())?;
            let mut a = Vec::with_capacity(k * dim);
            for g in 0..k {
                for d in 0..dim {
                    a.push((m.means()[g][d] - ubm.means()[g][d]) / ubm.variances()[g][d]);
                }
            }
            Ok(a)
        })
        .collect::<Result<_, GmmError>>()?;

    let centered: Vec<(Vec<f64>, usize)> = stats
        .iter()
        .map(|s| {
            let s = s.as_ref();
            check_same_shape(ubm, s.n_gaussians(), s.dim())?;
            let mut b = Vec::with_capacity(k * dim);
            for g in 0..k {
                for d in 0..dim {
                    b.push(s.sum_px[g][d] - s.n[g] * ubm.means()[g][d]);
                }
            }
            Ok((b, s.t))
        })
        .collect::<Result<_, GmmError>>()?;

    let mut scores = ScoreMatrix::zeros(models.len(), stats.len());
    for (i, a) in offsets.iter().enumerate() {
        for (j, (b, t)) in centered.iter().enumerate() {
            let mut score: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
            if frame_length_normalisation && *t > 0 {
                score /= *t as f64;
            }
            scores.set(i, j, score);
        }
    }
    Ok(scores)
}

/// Exact frame-accumulated log-likelihood ratio:
/// `score[m][n] = Σ_x log p_m(x) - log p_ubm(x)` over the frames of probe `n`.
pub fn llr_scoring<M>(
    models: &[M],
    ubm: &Gmm,
    probes: &[FeatureSet],
) -> Result<ScoreMatrix, GmmError>
where
    M: AsRef<Gmm>,
{
    let ubm_ll: Vec<f64> = probes
        .iter()
        .map(|p| ubm.log_likelihood_sum(p))
        .collect::<Result<_, _>>()?;

    let mut scores = ScoreMatrix::zeros(models.len(), probes.len());
    for (i, m) in models.iter().enumerate() {
        for (j, p) in probes.iter().enumerate() {
            let ll = m.as_ref().log_likelihood_sum(p)?;
            scores.set(i, j, ll - ubm_ll[j]);
        }
    }
    Ok(scores)
}
