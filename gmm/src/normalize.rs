use crate::{FeatureSet, GmmError};

/// Normalizes every frame by the per-dimension standard deviation.
///
/// Mean and variance are population statistics over all frames (divide by
/// `N`), with variance computed as `E[x²] - E[x]²`. Returns the scaled copy
/// together with the std vector, which is later needed to bring K-means
/// parameters back to the original feature scale.
///
/// Fails with [`GmmError::Degenerate`] when a dimension has zero (or
/// non-finite) standard deviation, since the division would not be finite.
pub fn normalize_std(data: &FeatureSet) -> Result<(FeatureSet, Vec<f64>), GmmError> {
    if data.is_empty() {
        return Err(GmmError::EmptyData("cannot normalize an empty feature set"));
    }

    let dim = data.dim();
    let n = data.len() as f64;
    let mut mean = vec![0.0f64; dim];
    let mut std = vec![0.0f64; dim];

    for frame in data.iter() {
        for d in 0..dim {
            mean[d] += frame[d];
            std[d] += frame[d] * frame[d];
        }
    }
    for d in 0..dim {
        mean[d] /= n;
        std[d] /= n;
        std[d] -= mean[d] * mean[d];
        std[d] = std[d].sqrt();
        if !std[d].is_finite() || std[d] <= 0.0 {
            return Err(GmmError::Degenerate { dim: d });
        }
    }

    let frames = data
        .iter()
        .map(|frame| frame.iter().zip(&std).map(|(x, s)| x / s).collect())
        .collect();
    let normalized = FeatureSet::from_frames(dim, frames)?;
    Ok((normalized, std))
}

/// Multiplies column `j` of every row by `factors[j]`, in place.
pub fn scale_columns(rows: &mut [Vec<f64>], factors: &[f64]) {
    for row in rows.iter_mut() {
        for (x, f) in row.iter_mut().zip(factors) {
            *x *= f;
        }
    }
}
