//! Local model repository
//!
//! A repository is a directory of `<name>.json` metadata files. A single
//! model pairs its metadata with `<name>.onnx` weights; a bag lists member
//! names plus optional per-source weights and owns no weights of its own.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use sf_core::{BagOfModels, ModelSpec};

use crate::engine::{ModelMeta, OnnxSeparationModel};
use crate::error::{ModelError, ModelResult};
use crate::registry::AliasRegistry;

/// Metadata file contents: either a bag manifest or single-model capabilities.
///
/// The `models` key distinguishes the two; a file carrying both layouts is
/// parsed as a bag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RepoEntry {
    Bag(BagManifest),
    Single(ModelMeta),
}

#[derive(Debug, Clone, Deserialize)]
struct BagManifest {
    /// Member model names, resolved against the same repository
    models: Vec<String>,
    /// Per-member weight vectors over each member's own sources
    #[serde(default)]
    weights: Option<Vec<Vec<f32>>>,
}

/// Model names found in a repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoListing {
    pub single: Vec<String>,
    pub bag: Vec<String>,
}

/// A directory of model metadata and weights
pub struct LocalRepo {
    root: PathBuf,
    registry: AliasRegistry,
}

impl LocalRepo {
    /// Open a repository rooted at `root`, resolving names through the
    /// default alias table
    pub fn open(root: impl Into<PathBuf>) -> ModelResult<Self> {
        Self::with_registry(root, AliasRegistry::with_defaults())
    }

    /// Open a repository with a caller-provided alias table
    pub fn with_registry(root: impl Into<PathBuf>, registry: AliasRegistry) -> ModelResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(ModelError::NotFound(format!(
                "model repository {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root, registry })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load a model or bag by name
    pub fn load(&self, name: &str) -> ModelResult<ModelSpec> {
        let resolved = self.registry.resolve(name);
        match self.read_entry(resolved)? {
            RepoEntry::Single(meta) => {
                let model: Arc<dyn sf_core::Model> = self.load_single(resolved, meta)?;
                Ok(ModelSpec::Single(model))
            }
            RepoEntry::Bag(manifest) => {
                log::info!(
                    "loading bag '{resolved}' with {} members",
                    manifest.models.len()
                );
                let mut members = Vec::with_capacity(manifest.models.len());
                for member_name in &manifest.models {
                    let member = self.registry.resolve(member_name);
                    match self.read_entry(member)? {
                        RepoEntry::Single(meta) => {
                            let model: Arc<dyn sf_core::Model> =
                                self.load_single(member, meta)?;
                            members.push(model);
                        }
                        RepoEntry::Bag(_) => {
                            return Err(ModelError::InvalidMetadata {
                                name: resolved.to_string(),
                                reason: format!("member '{member}' is itself a bag"),
                            });
                        }
                    }
                }
                let bag = BagOfModels::new(members, manifest.weights).map_err(|e| {
                    ModelError::InvalidMetadata {
                        name: resolved.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(ModelSpec::Bag(bag))
            }
        }
    }

    /// Enumerate the repository's model names, split by kind
    pub fn list_models(&self) -> ModelResult<RepoListing> {
        let mut listing = RepoListing::default();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.read_entry(name)? {
                RepoEntry::Single(_) => listing.single.push(name.to_string()),
                RepoEntry::Bag(_) => listing.bag.push(name.to_string()),
            }
        }
        listing.single.sort();
        listing.bag.sort();
        Ok(listing)
    }

    fn read_entry(&self, name: &str) -> ModelResult<RepoEntry> {
        let path = self.root.join(format!("{name}.json"));
        if !path.exists() {
            return Err(ModelError::NotFound(name.to_string()));
        }
        let text = std::fs::read_to_string(&path)?;
        serde_json::from_str(&text).map_err(|e| ModelError::InvalidMetadata {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn load_single(&self, name: &str, meta: ModelMeta) -> ModelResult<Arc<OnnxSeparationModel>> {
        meta.validate(name)?;
        let weights = self.root.join(format!("{name}.onnx"));
        if !weights.exists() {
            return Err(ModelError::NotFound(format!(
                "weights file {} for model '{name}'",
                weights.display()
            )));
        }
        Ok(Arc::new(OnnxSeparationModel::load(&weights, meta)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_json(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{name}.json")), body).unwrap();
    }

    const SINGLE_META: &str = r#"{
        "sources": ["drums", "bass", "other", "vocals"],
        "sample_rate": 44100,
        "audio_channels": 2,
        "segment": 7.8
    }"#;

    #[test]
    fn test_open_requires_directory() {
        assert!(LocalRepo::open("/nonexistent/repo").is_err());
    }

    #[test]
    fn test_list_models_splits_by_kind() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), "four_stem", SINGLE_META);
        write_json(
            dir.path(),
            "ensemble",
            r#"{"models": ["four_stem"], "weights": [[1.0, 1.0, 1.0, 1.0]]}"#,
        );

        let repo = LocalRepo::open(dir.path()).unwrap();
        let listing = repo.list_models().unwrap();
        assert_eq!(listing.single, vec!["four_stem".to_string()]);
        assert_eq!(listing.bag, vec!["ensemble".to_string()]);
    }

    #[test]
    fn test_unknown_name_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repo = LocalRepo::open(dir.path()).unwrap();
        assert!(matches!(
            repo.load("missing"),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn test_single_without_weights_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), "four_stem", SINGLE_META);

        let repo = LocalRepo::open(dir.path()).unwrap();
        // metadata exists but four_stem.onnx does not
        assert!(matches!(
            repo.load("four_stem"),
            Err(ModelError::NotFound(_))
        ));
    }

    #[test]
    fn test_malformed_metadata_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), "broken", r#"{"sources": "not-a-list"}"#);

        let repo = LocalRepo::open(dir.path()).unwrap();
        assert!(matches!(
            repo.load("broken"),
            Err(ModelError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_nested_bag_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_json(dir.path(), "inner", r#"{"models": ["x"]}"#);
        write_json(dir.path(), "outer", r#"{"models": ["inner"]}"#);

        let repo = LocalRepo::open(dir.path()).unwrap();
        assert!(matches!(
            repo.load("outer"),
            Err(ModelError::InvalidMetadata { .. })
        ));
    }

    #[test]
    fn test_load_resolves_aliases() {
        let dir = tempfile::tempdir().unwrap();
        // only the current name exists on disk
        write_json(dir.path(), "demucs", SINGLE_META);

        let repo = LocalRepo::open(dir.path()).unwrap();
        // legacy name resolves to "demucs", which then fails on the missing
        // weights file rather than on the metadata lookup
        let err = repo.load("demucs_quantized").unwrap_err();
        assert!(err.to_string().contains("demucs"));
    }
}
