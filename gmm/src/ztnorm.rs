//! ZT-norm score normalization.
//!
//! Naming follows the usual speaker-verification convention:
//!
//! ```text
//! A  models  × probes    raw scores to normalize
//! B  models  × zprobes   Z-norm cohort scores of the models
//! C  tmodels × probes    T-norm cohort model scores of the probes
//! D  tmodels × zprobes   T-norm cohort models against Z-norm probes
//! ```
//!
//! `same[t][z]` flags cohort pairs that share a real identity; those cells
//! of `D` are left out of the impostor statistics.

use tracing::warn;

use crate::{GmmError, ScoreMatrix};

/// Builds the same-identity mask: `out[i][j] = a[i] == b[j]`.
pub fn same_value<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Vec<bool>> {
    a.iter()
        .map(|x| b.iter().map(|y| x == y).collect())
        .collect()
}

/// Mean and unbiased standard deviation; a std that is zero or cannot be
/// estimated (fewer than two values) is reported as 1.
fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut n = 0.0;
    let mut sum = 0.0;
    let mut sumsq = 0.0;
    for v in values {
        n += 1.0;
        sum += v;
        sumsq += v * v;
    }
    if n < 2.0 {
        warn!(samples = n, "too few samples in zt-norm cohort, using std 1");
        let mean = if n == 0.0 { 0.0 } else { sum };
        return (mean, 1.0);
    }
    let mean = sum / n;
    let var = (sumsq - n * mean * mean) / (n - 1.0);
    let std = if var > 0.0 { var.sqrt() } else { 0.0 };
    if std <= f64::MIN_POSITIVE {
        warn!(samples = n, "zero standard deviation in zt-norm cohort, using 1");
        return (mean, 1.0);
    }
    (mean, std)
}

fn check(what: &str, m: &ScoreMatrix, rows: usize, cols: usize) -> Result<(), GmmError> {
    if m.rows() != rows || m.cols() != cols {
        return Err(GmmError::InvalidConfig(format!(
            "{what} is {}x{}, expected {rows}x{cols}",
            m.rows(),
            m.cols()
        )));
    }
    Ok(())
}

/// Z-normalizes `a` row by row with the statistics of the matching row of
/// `cohort`.
pub fn z_norm(a: &ScoreMatrix, cohort: &ScoreMatrix) -> Result<ScoreMatrix, GmmError> {
    check("z-norm cohort", cohort, a.rows(), cohort.cols())?;
    let mut out = ScoreMatrix::zeros(a.rows(), a.cols());
    for i in 0..a.rows() {
        let (mean, std) = mean_std(cohort.row(i).iter().copied());
        for j in 0..a.cols() {
            out.set(i, j, (a.get(i, j) - mean) / std);
        }
    }
    Ok(out)
}

/// T-normalizes `a` column by column with the statistics of the matching
/// column of `cohort`.
pub fn t_norm(a: &ScoreMatrix, cohort: &ScoreMatrix) -> Result<ScoreMatrix, GmmError> {
    check("t-norm cohort", cohort, cohort.rows(), a.cols())?;
    let mut out = ScoreMatrix::zeros(a.rows(), a.cols());
    for j in 0..a.cols() {
        let (mean, std) = mean_std(cohort.column(j));
        for i in 0..a.rows() {
            out.set(i, j, (a.get(i, j) - mean) / std);
        }
    }
    Ok(out)
}

/// ZT-norm: Z-norm of `a` by `b`, Z-norm of `c` by the impostor part of
/// `d`, then T-norm of the result by the normalized `c`.
///
/// Returns a new matrix shaped like `a`.
pub fn zt_norm(
    a: &ScoreMatrix,
    b: &ScoreMatrix,
    c: &ScoreMatrix,
    d: &ScoreMatrix,
    same: &[Vec<bool>],
) -> Result<ScoreMatrix, GmmError> {
    let (n_models, n_probes) = (a.rows(), a.cols());
    let (n_tnorm, n_znorm) = (c.rows(), b.cols());
    check("B", b, n_models, n_znorm)?;
    check("C", c, n_tnorm, n_probes)?;
    check("D", d, n_tnorm, n_znorm)?;
    if same.len() != n_tnorm || same.iter().any(|r| r.len() != n_znorm) {
        return Err(GmmError::InvalidConfig(format!(
            "same-identity mask must be {n_tnorm}x{n_znorm}"
        )));
    }

    let za = z_norm(a, b)?;

    let mut zc = ScoreMatrix::zeros(n_tnorm, n_probes);
    for t in 0..n_tnorm {
        let impostors = d
            .row(t)
            .iter()
            .zip(&same[t])
            .filter(|(_, same)| !**same)
            .map(|(v, _)| *v);
        let (mean, std) = mean_std(impostors);
        for j in 0..n_probes {
            zc.set(t, j, (c.get(t, j) - mean) / std);
        }
    }

    t_norm(&za, &zc)
}
