//! File persistence for features, models and statistics.
//!
//! The container format is chosen by file extension:
//!
//! ```text
//! .json          serde_json
//! .msgpack, .mp  rmp-serde (MessagePack)
//! .yaml, .yml    serde_yaml
//! ```

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::GmmError;

/// Serialization container selected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    MessagePack,
    Yaml,
}

impl Format {
    /// Resolves the format of `path` from its extension.
    pub fn from_path(path: &Path) -> Result<Self, GmmError> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "json" => Ok(Self::Json),
            "msgpack" | "mp" => Ok(Self::MessagePack),
            "yaml" | "yml" => Ok(Self::Yaml),
            _ => Err(GmmError::persistence(
                path,
                format!("unsupported file extension {ext:?}"),
            )),
        }
    }
}

/// Writes `value` to `path` in the format implied by its extension.
pub fn save<T: Serialize>(value: &T, path: &Path) -> Result<(), GmmError> {
    let bytes = match Format::from_path(path)? {
        Format::Json => serde_json::to_vec(value).map_err(|e| GmmError::persistence(path, e))?,
        Format::MessagePack => {
            rmp_serde::to_vec_named(value).map_err(|e| GmmError::persistence(path, e))?
        }
        Format::Yaml => serde_yaml::to_string(value)
            .map_err(|e| GmmError::persistence(path, e))?
            .into_bytes(),
    };
    fs::write(path, bytes).map_err(|e| GmmError::persistence(path, e))
}

/// Reads a value from `path` in the format implied by its extension.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, GmmError> {
    let format = Format::from_path(path)?;
    let data = fs::read(path).map_err(|e| GmmError::persistence(path, e))?;
    match format {
        Format::Json => serde_json::from_slice(&data).map_err(|e| GmmError::persistence(path, e)),
        Format::MessagePack => {
            rmp_serde::from_slice(&data).map_err(|e| GmmError::persistence(path, e))
        }
        Format::Yaml => serde_yaml::from_slice(&data).map_err(|e| GmmError::persistence(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a.json")).unwrap(), Format::Json);
        assert_eq!(Format::from_path(Path::new("a.MP")).unwrap(), Format::MessagePack);
        assert_eq!(Format::from_path(Path::new("dir/b.yml")).unwrap(), Format::Yaml);
        assert!(Format::from_path(Path::new("model.hdf5")).is_err());
        assert!(Format::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn save_and_load_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let value = vec![vec![1.5f64, -2.0], vec![0.25, 3.0]];
        for name in ["v.json", "v.msgpack", "v.yaml"] {
            let path = dir.path().join(name);
            save(&value, &path).unwrap();
            let back: Vec<Vec<f64>> = load(&path).unwrap();
            assert_eq!(back, value, "format {name}");
        }
    }

    #[test]
    fn load_missing_file_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load::<Vec<f64>>(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, GmmError::Persistence { .. }));
    }

    #[test]
    fn load_garbage_is_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{not json").unwrap();
        let err = load::<Vec<f64>>(&path).unwrap_err();
        assert!(matches!(err, GmmError::Persistence { .. }));
    }
}
