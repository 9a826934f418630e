use std::path::Path;

use graphca_domain::{ResourceId, ResourceKind};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;
use crate::raw::RawManifest;

/// One desired resource as written on disk: a resource type, an optional
/// existing object ID and the attribute map handed to the resource's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Manifest {
    pub kind:   ResourceKind,
    pub id:     Option<ResourceId>,
    pub fields: Map<String, Value>,
    /// File the manifest was read from.
    pub source: String,
}

pub fn load_manifest(path: &Path) -> Result<Manifest, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let raw: RawManifest = serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
        path: path.display().to_string(),
        source: e,
    })?;
    debug!("Loading {} manifest from {}", raw.kind, path.display());
    convert_manifest(raw, path)
}

/// Load every `*.yml` / `*.yaml` file directly under `dir`, in file-name order.
pub fn load_manifests(dir: &Path) -> Result<Vec<Manifest>, ConfigError> {
    let entries = std::fs::read_dir(dir).map_err(|e| ConfigError::Io {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );
        if path.is_file() && is_yaml {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|p| load_manifest(p)).collect()
}

fn convert_manifest(raw: RawManifest, path: &Path) -> Result<Manifest, ConfigError> {
    let kind: ResourceKind = raw.kind.parse()?;
    let id = raw.id.as_deref().map(ResourceId::parse_uuid).transpose()?;
    Ok(Manifest {
        kind,
        id,
        fields: raw.fields,
        source: path.display().to_string(),
    })
}
