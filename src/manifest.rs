//! Loading RedisEntry manifests from YAML.
//!
//! A file may hold several documents separated by `---`. Documents of any
//! other kind are skipped.

use std::path::{Path, PathBuf};

use redis_ctrl_core::{Error, Result};
use redis_ctrl_reconciler::types::DEFAULT_NAMESPACE;
use redis_ctrl_reconciler::{DesiredEntry, EntryId};
use serde::Deserialize;
use tracing::debug;

/// Kind accepted by the loader.
pub const KIND: &str = "RedisEntry";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    #[serde(default)]
    kind: Option<String>,
    metadata: Metadata,
    spec: DesiredEntry,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
}

/// Load every entry under `path`.
///
/// `path` is either a single file or a directory whose `*.yaml` and `*.yml`
/// files are read in name order.
pub fn load_entries(path: &Path) -> Result<Vec<(EntryId, DesiredEntry)>> {
    if !path.exists() {
        return Err(Error::PathNotFound {
            path: path.to_path_buf(),
        });
    }

    let files = if path.is_dir() {
        manifest_files(path)?
    } else {
        vec![path.to_path_buf()]
    };

    let mut entries = Vec::new();
    for file in files {
        let text = std::fs::read_to_string(&file)
            .map_err(|e| Error::file_read_failed(&file, e.to_string()))?;
        entries.extend(parse_entries(&file, &text)?);
    }
    Ok(entries)
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Parse all RedisEntry documents in `text`.
pub fn parse_entries(origin: &Path, text: &str) -> Result<Vec<(EntryId, DesiredEntry)>> {
    let mut entries = Vec::new();

    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::yaml_parse_failed(origin, &e))?;
        if value.is_null() {
            continue;
        }

        let manifest: Manifest =
            serde_yaml::from_value(value).map_err(|e| Error::yaml_parse_failed(origin, &e))?;
        if manifest.kind.as_deref().is_some_and(|kind| kind != KIND) {
            debug!(path = %origin.display(), kind = ?manifest.kind, "Skipping document");
            continue;
        }

        let id = EntryId::new(
            manifest
                .metadata
                .namespace
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            manifest.metadata.name,
        );
        manifest
            .spec
            .validate()
            .map_err(|reason| Error::invalid_entry(id.to_string(), reason))?;
        entries.push((id, manifest.spec));
    }

    Ok(entries)
}
