use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{persist, GmmError};

/// An ordered sequence of feature frames sharing one dimensionality.
///
/// Frames keep insertion order: when loaded from several files the result
/// is file order, then within-file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    dim: usize,
    frames: Vec<Vec<f64>>,
}

impl FeatureSet {
    /// Creates an empty set of `dim`-dimensional frames.
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            frames: Vec::new(),
        }
    }

    /// Builds a set from frames, checking that every frame has length `dim`.
    pub fn from_frames(dim: usize, frames: Vec<Vec<f64>>) -> Result<Self, GmmError> {
        if let Some(bad) = frames.iter().find(|f| f.len() != dim) {
            return Err(GmmError::DimensionMismatch {
                expected: dim,
                got: bad.len(),
            });
        }
        Ok(Self { dim, frames })
    }

    /// Appends one frame.
    pub fn push(&mut self, frame: Vec<f64>) -> Result<(), GmmError> {
        if frame.len() != self.dim {
            return Err(GmmError::DimensionMismatch {
                expected: self.dim,
                got: frame.len(),
            });
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Appends all frames of `other`.
    pub fn extend(&mut self, other: FeatureSet) -> Result<(), GmmError> {
        if other.dim != self.dim {
            return Err(GmmError::DimensionMismatch {
                expected: self.dim,
                got: other.dim,
            });
        }
        self.frames.extend(other.frames);
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Vec<f64>] {
        &self.frames
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.frames.iter().map(|f| f.as_slice())
    }

    /// Loads one feature file.
    pub fn load(path: &Path) -> Result<Self, GmmError> {
        let set: FeatureSet = persist::load(path)?;
        // Re-validate: the container does not enforce frame lengths.
        Self::from_frames(set.dim, set.frames).map_err(|e| GmmError::persistence(path, e))
    }

    /// Loads and concatenates several feature files in the given order.
    pub fn load_many<P: AsRef<Path>>(paths: &[P]) -> Result<Self, GmmError> {
        let mut iter = paths.iter();
        let first = iter
            .next()
            .ok_or(GmmError::EmptyData("no feature files given"))?;
        let mut set = Self::load(first.as_ref())?;
        for p in iter {
            set.extend(Self::load(p.as_ref())?)?;
        }
        Ok(set)
    }

    /// Writes the set to `path`.
    pub fn save(&self, path: &Path) -> Result<(), GmmError> {
        persist::save(self, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_rejects_wrong_length() {
        let mut set = FeatureSet::new(2);
        set.push(vec![1.0, 2.0]).unwrap();
        let err = set.push(vec![1.0]).unwrap_err();
        assert!(matches!(
            err,
            GmmError::DimensionMismatch { expected: 2, got: 1 }
        ));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn load_many_keeps_file_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.msgpack");
        FeatureSet::from_frames(1, vec![vec![1.0], vec![2.0]])
            .unwrap()
            .save(&a)
            .unwrap();
        FeatureSet::from_frames(1, vec![vec![3.0]])
            .unwrap()
            .save(&b)
            .unwrap();

        let set = FeatureSet::load_many(&[&b, &a]).unwrap();
        let values: Vec<f64> = set.iter().map(|f| f[0]).collect();
        assert_eq!(values, vec![3.0, 1.0, 2.0]);
    }

    #[test]
    fn load_many_rejects_mixed_dims() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        FeatureSet::from_frames(1, vec![vec![1.0]]).unwrap().save(&a).unwrap();
        FeatureSet::from_frames(2, vec![vec![1.0, 2.0]])
            .unwrap()
            .save(&b)
            .unwrap();
        assert!(FeatureSet::load_many(&[a, b]).is_err());
    }

    #[test]
    fn load_rejects_inconsistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, br#"{"dim":2,"frames":[[1.0,2.0],[3.0]]}"#).unwrap();
        let err = FeatureSet::load(&path).unwrap_err();
        assert!(matches!(err, GmmError::Persistence { .. }));
    }

    #[test]
    fn load_many_empty() {
        let paths: Vec<&Path> = Vec::new();
        assert!(matches!(
            FeatureSet::load_many(&paths),
            Err(GmmError::EmptyData(_))
        ));
    }
}
