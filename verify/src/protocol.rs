//! Database and protocol access.
//!
//! An experiment only needs a handful of queries from its database: the
//! models of a group, enrolment and probe files per identity, and the
//! cohort identities used by ZT-norm. [`Protocol`] captures those;
//! [`IdentityResolver`] maps cohort pseudo-identities to the person behind
//! them. [`ManifestProtocol`] implements both from a YAML or JSON manifest:
//!
//! ```yaml
//! groups:
//!   dev: [c001, c002]
//! tnorm: [t001, t002]
//! # znorm defaults to the tnorm list
//! identities:
//!   c001:
//!     enrol: [c001/enrol_0.json, c001/enrol_1.json]
//!     probes:
//!       - { path: c001/probe_0.json, real_id: c001, class: client }
//!       - { path: c002/probe_0.json, real_id: c002, class: impostor }
//!   t001:
//!     real_id: c009
//!     enrol: [t001/enrol_0.json]
//!     probes:
//!       - { path: t001/probe_0.json, real_id: c009, class: client }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::VerifyError;

/// Whether a probe belongs to the claimed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeClass {
    Client,
    Impostor,
}

/// One probe file scored against a claimed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    pub path: PathBuf,
    pub claimed_id: String,
    pub real_id: String,
    pub label: String,
}

/// Queries an experiment issues against its database.
pub trait Protocol: Send + Sync {
    /// Model identities of an evaluation group, in evaluation order.
    fn models(&self, group: &str) -> Result<Vec<String>, VerifyError>;

    /// Enrolment feature files of an identity.
    fn enrol_files(&self, id: &str) -> Result<Vec<PathBuf>, VerifyError>;

    /// Probes scored against `id`.
    fn probes(&self, id: &str, class: ProbeClass) -> Result<Vec<Probe>, VerifyError>;

    /// T-norm cohort identities.
    fn tnorm_ids(&self) -> Result<Vec<String>, VerifyError>;

    /// Z-norm cohort identities.
    fn znorm_ids(&self) -> Result<Vec<String>, VerifyError>;

    /// Feature files that make up the Z-norm statistics of `id`.
    fn znorm_files(&self, id: &str) -> Result<Vec<PathBuf>, VerifyError>;
}

/// Maps an identity (possibly a cohort alias) to the real person.
pub trait IdentityResolver: Send + Sync {
    fn real_id(&self, id: &str) -> Result<String, VerifyError>;
}

/// Serialized manifest read by [`ManifestProtocol`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tnorm: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub znorm: Option<Vec<String>>,
    #[serde(default)]
    pub identities: BTreeMap<String, IdentityEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Real identity; defaults to the entry key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub real_id: Option<String>,
    #[serde(default)]
    pub enrol: Vec<PathBuf>,
    #[serde(default)]
    pub probes: Vec<ProbeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeEntry {
    pub path: PathBuf,
    pub real_id: String,
    pub class: ProbeClass,
    /// Label written to the score file; defaults to the file stem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// [`Protocol`] and [`IdentityResolver`] backed by a [`Manifest`].
///
/// Relative file paths are resolved against `features_dir`.
#[derive(Debug, Clone)]
pub struct ManifestProtocol {
    manifest: Manifest,
    features_dir: PathBuf,
}

impl ManifestProtocol {
    pub fn new(manifest: Manifest, features_dir: impl Into<PathBuf>) -> Self {
        Self {
            manifest,
            features_dir: features_dir.into(),
        }
    }

    /// Reads a manifest; `.json` files are parsed as JSON, anything else as YAML.
    pub fn load(path: &Path, features_dir: impl Into<PathBuf>) -> Result<Self, VerifyError> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let manifest: Manifest = if is_json {
            serde_json::from_str(&text)
                .map_err(|e| VerifyError::Protocol(format!("{}: {e}", path.display())))?
        } else {
            serde_yaml::from_str(&text)
                .map_err(|e| VerifyError::Protocol(format!("{}: {e}", path.display())))?
        };
        Ok(Self::new(manifest, features_dir))
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn identity(&self, id: &str) -> Result<&IdentityEntry, VerifyError> {
        self.manifest
            .identities
            .get(id)
            .ok_or_else(|| VerifyError::Protocol(format!("unknown identity {id:?}")))
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.features_dir.join(path)
    }
}

impl Protocol for ManifestProtocol {
    fn models(&self, group: &str) -> Result<Vec<String>, VerifyError> {
        self.manifest
            .groups
            .get(group)
            .cloned()
            .ok_or_else(|| VerifyError::Protocol(format!("unknown group {group:?}")))
    }

    fn enrol_files(&self, id: &str) -> Result<Vec<PathBuf>, VerifyError> {
        Ok(self
            .identity(id)?
            .enrol
            .iter()
            .map(|p| self.resolve(p))
            .collect())
    }

    fn probes(&self, id: &str, class: ProbeClass) -> Result<Vec<Probe>, VerifyError> {
        Ok(self
            .identity(id)?
            .probes
            .iter()
            .filter(|p| p.class == class)
            .map(|p| Probe {
                path: self.resolve(&p.path),
                claimed_id: id.to_string(),
                real_id: p.real_id.clone(),
                label: p.label.clone().unwrap_or_else(|| {
                    p.path
                        .file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default()
                }),
            })
            .collect())
    }

    fn tnorm_ids(&self) -> Result<Vec<String>, VerifyError> {
        Ok(self.manifest.tnorm.clone())
    }

    fn znorm_ids(&self) -> Result<Vec<String>, VerifyError> {
        Ok(self
            .manifest
            .znorm
            .clone()
            .unwrap_or_else(|| self.manifest.tnorm.clone()))
    }

    fn znorm_files(&self, id: &str) -> Result<Vec<PathBuf>, VerifyError> {
        Ok(self
            .probes(id, ProbeClass::Client)?
            .into_iter()
            .map(|p| p.path)
            .collect())
    }
}

impl IdentityResolver for ManifestProtocol {
    fn real_id(&self, id: &str) -> Result<String, VerifyError> {
        let entry = self.identity(id)?;
        Ok(entry.real_id.clone().unwrap_or_else(|| id.to_string()))
    }
}
