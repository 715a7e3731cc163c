use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tempfile::Builder;

use crate::error::TriadError;

pub const SCHEMA_VERSION: u32 = 1;

pub const SAMPLES: &str = "biosamples_flattened";
pub const TRIAD_VALUES: &str = "env_triad_value_counts";
pub const TRIAD_COMPONENTS: &str = "env_triad_value_components";
pub const SCOPE_ENTRIES: &str = "env_triad_in_scope_curies_lc";
pub const PREFIX_USAGE: &str = "env_triad_in_scope_prefix_lc_counts";
pub const LABEL_STATS: &str = "env_triad_component_labels";
pub const MATERIALIZED: &str = "env_triads";
pub const COMPONENT_PREFIX_USAGE: &str = "env_triad_component_prefix_lc_counts";
pub const COMPONENT_CURIES: &str = "env_triad_component_curies_uc";
pub const FLATTENED: &str = "env_triads_flattened";

pub const KNOWN_COLLECTIONS: [&str; 10] = [
    SAMPLES,
    TRIAD_VALUES,
    TRIAD_COMPONENTS,
    SCOPE_ENTRIES,
    PREFIX_USAGE,
    COMPONENT_PREFIX_USAGE,
    COMPONENT_CURIES,
    LABEL_STATS,
    MATERIALIZED,
    FLATTENED,
];

/// A directory of named collections, each a JSON Lines file with a metadata
/// sidecar and optional secondary indexes.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    pub rows: usize,
    pub written_at: String,
    pub schema_version: u32,
    #[serde(default)]
    pub applied_passes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Created,
    AlreadyExists,
}

/// Posting list from the values found at a dotted path to row ordinals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Index {
    pub collection: String,
    pub path: String,
    pub postings: BTreeMap<String, Vec<usize>>,
}

impl Index {
    pub fn lookup(&self, key: &str) -> &[usize] {
        self.postings.get(key).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Store {
    pub fn open(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure_root(&self) -> Result<(), TriadError> {
        fs::create_dir_all(self.collections_dir().as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))
    }

    pub fn collection_path(&self, name: &str) -> Utf8PathBuf {
        self.collections_dir().join(format!("{name}.jsonl"))
    }

    pub fn meta_path(&self, name: &str) -> Utf8PathBuf {
        self.collections_dir().join(format!("{name}.meta.json"))
    }

    pub fn index_path(&self, name: &str, path: &str) -> Utf8PathBuf {
        self.index_dir(name).join(format!("{path}.json"))
    }

    fn collections_dir(&self) -> Utf8PathBuf {
        self.root.join("collections")
    }

    fn index_dir(&self, name: &str) -> Utf8PathBuf {
        self.root.join("indexes").join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.collection_path(name).as_std_path().exists()
    }

    pub fn metadata(&self, name: &str) -> Result<Option<CollectionMeta>, TriadError> {
        let path = self.meta_path(name);
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        let meta = serde_json::from_str(&content).map_err(|err| TriadError::Serialization {
            collection: name.to_string(),
            message: err.to_string(),
        })?;
        Ok(Some(meta))
    }

    pub fn count(&self, name: &str) -> Result<usize, TriadError> {
        if let Some(meta) = self.metadata(name)? {
            return Ok(meta.rows);
        }
        if !self.exists(name) {
            return Ok(0);
        }
        Ok(self.read_values(name)?.len())
    }

    pub fn is_populated(&self, name: &str) -> Result<bool, TriadError> {
        Ok(self.count(name)? > 0)
    }

    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>, TriadError> {
        let path = self.collection_path(name);
        if !path.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(path.as_std_path())
            .map_err(|err| TriadError::Filesystem(format!("open {path}: {err}")))?;
        let mut rows = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|err| TriadError::Filesystem(err.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            let row = serde_json::from_str(&line).map_err(|err| TriadError::Serialization {
                collection: name.to_string(),
                message: format!("line {}: {err}", line_no + 1),
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    pub fn read_values(&self, name: &str) -> Result<Vec<Value>, TriadError> {
        self.read(name)
    }

    /// Drop-and-recompute: replaces the rows, resets metadata and drops
    /// every index of the collection.
    pub fn write_collection<T: Serialize>(
        &self,
        name: &str,
        rows: &[T],
    ) -> Result<CollectionMeta, TriadError> {
        self.drop_indexes(name)?;
        self.write_rows(name, rows)?;
        let meta = CollectionMeta {
            name: name.to_string(),
            rows: rows.len(),
            written_at: Utc::now().to_rfc3339(),
            schema_version: SCHEMA_VERSION,
            applied_passes: Vec::new(),
        };
        self.write_meta(&meta)?;
        Ok(meta)
    }

    /// In-place mutation: replaces the rows but keeps indexes and pass
    /// markers. Callers must not change indexed keys or row order.
    pub fn rewrite_collection<T: Serialize>(
        &self,
        name: &str,
        rows: &[T],
    ) -> Result<CollectionMeta, TriadError> {
        let mut meta = self
            .metadata(name)?
            .ok_or_else(|| TriadError::UnknownCollection(name.to_string()))?;
        self.write_rows(name, rows)?;
        meta.rows = rows.len();
        meta.written_at = Utc::now().to_rfc3339();
        self.write_meta(&meta)?;
        Ok(meta)
    }

    pub fn drop_collection(&self, name: &str) -> Result<bool, TriadError> {
        let existed = self.exists(name);
        for path in [self.collection_path(name), self.meta_path(name)] {
            if path.as_std_path().exists() {
                fs::remove_file(path.as_std_path())
                    .map_err(|err| TriadError::Filesystem(err.to_string()))?;
            }
        }
        self.drop_indexes(name)?;
        Ok(existed)
    }

    pub fn list_collections(&self) -> Result<Vec<CollectionMeta>, TriadError> {
        let mut entries = Vec::new();
        for name in KNOWN_COLLECTIONS {
            if let Some(meta) = self.metadata(name)? {
                entries.push(meta);
            }
        }
        Ok(entries)
    }

    pub fn has_pass(&self, name: &str, pass: &str) -> Result<bool, TriadError> {
        Ok(self
            .metadata(name)?
            .map(|meta| meta.applied_passes.iter().any(|applied| applied == pass))
            .unwrap_or(false))
    }

    pub fn mark_pass(&self, name: &str, pass: &str) -> Result<(), TriadError> {
        let mut meta = self
            .metadata(name)?
            .ok_or_else(|| TriadError::UnknownCollection(name.to_string()))?;
        if !meta.applied_passes.iter().any(|applied| applied == pass) {
            meta.applied_passes.push(pass.to_string());
            self.write_meta(&meta)?;
        }
        Ok(())
    }

    pub fn unmark_pass(&self, name: &str, pass: &str) -> Result<(), TriadError> {
        let Some(mut meta) = self.metadata(name)? else {
            return Ok(());
        };
        let before = meta.applied_passes.len();
        meta.applied_passes.retain(|applied| applied != pass);
        if meta.applied_passes.len() != before {
            self.write_meta(&meta)?;
        }
        Ok(())
    }

    pub fn create_index(&self, name: &str, path: &str) -> Result<IndexOutcome, TriadError> {
        if self.has_index(name, path) {
            return Ok(IndexOutcome::AlreadyExists);
        }
        let rows = self.read_values(name)?;
        let mut postings = BTreeMap::<String, Vec<usize>>::new();
        for (ordinal, row) in rows.iter().enumerate() {
            for key in values_at_path(row, path) {
                let Some(key) = index_key(key) else {
                    continue;
                };
                let entry = postings.entry(key).or_default();
                if entry.last() != Some(&ordinal) {
                    entry.push(ordinal);
                }
            }
        }
        let index = Index {
            collection: name.to_string(),
            path: path.to_string(),
            postings,
        };
        let content = serde_json::to_vec(&index).map_err(|err| TriadError::Serialization {
            collection: name.to_string(),
            message: err.to_string(),
        })?;
        Self::write_bytes_atomic(&self.index_path(name, path), &content)?;
        Ok(IndexOutcome::Created)
    }

    pub fn has_index(&self, name: &str, path: &str) -> bool {
        self.index_path(name, path).as_std_path().exists()
    }

    pub fn require_index(&self, name: &str, path: &str) -> Result<(), TriadError> {
        if self.has_index(name, path) {
            Ok(())
        } else {
            Err(TriadError::IndexMissing {
                collection: name.to_string(),
                path: path.to_string(),
            })
        }
    }

    pub fn load_index(&self, name: &str, path: &str) -> Result<Index, TriadError> {
        self.require_index(name, path)?;
        let content = fs::read(self.index_path(name, path).as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        serde_json::from_slice(&content).map_err(|err| TriadError::Serialization {
            collection: name.to_string(),
            message: err.to_string(),
        })
    }

    pub fn list_indexes(&self, name: &str) -> Result<Vec<String>, TriadError> {
        let dir = self.index_dir(name);
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in
            fs::read_dir(dir.as_std_path()).map_err(|err| TriadError::Filesystem(err.to_string()))?
        {
            let entry = entry.map_err(|err| TriadError::Filesystem(err.to_string()))?;
            let file_name = entry.file_name().to_string_lossy().to_string();
            if let Some(path) = file_name.strip_suffix(".json") {
                paths.push(path.to_string());
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn drop_indexes(&self, name: &str) -> Result<(), TriadError> {
        let dir = self.index_dir(name);
        if dir.as_std_path().exists() {
            fs::remove_dir_all(dir.as_std_path())
                .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    fn write_meta(&self, meta: &CollectionMeta) -> Result<(), TriadError> {
        let content =
            serde_json::to_vec_pretty(meta).map_err(|err| TriadError::Serialization {
                collection: meta.name.clone(),
                message: err.to_string(),
            })?;
        Self::write_bytes_atomic(&self.meta_path(&meta.name), &content)
    }

    fn write_rows<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), TriadError> {
        let path = self.collection_path(name);
        let parent = path
            .parent()
            .ok_or_else(|| TriadError::Filesystem("invalid collection path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        let mut temp = Builder::new()
            .prefix(&format!(".{name}"))
            .tempfile_in(parent.as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            for row in rows {
                serde_json::to_writer(&mut writer, row).map_err(|err| {
                    TriadError::Serialization {
                        collection: name.to_string(),
                        message: err.to_string(),
                    }
                })?;
                writer
                    .write_all(b"\n")
                    .map_err(|err| TriadError::Filesystem(err.to_string()))?;
            }
            writer
                .flush()
                .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        }
        temp.persist(path.as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), TriadError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| TriadError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

/// Resolves a dotted path against a document, descending into every element
/// when a step lands on an array.
pub fn values_at_path<'a>(value: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![value];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for node in current {
            collect_segment(node, segment, &mut next);
        }
        current = next;
    }
    current
        .into_iter()
        .flat_map(|node| match node {
            Value::Array(items) => items.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect()
}

fn collect_segment<'a>(node: &'a Value, segment: &str, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(segment) {
                out.push(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_segment(item, segment, out);
            }
        }
        _ => {}
    }
}

fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn dotted_path_descends_into_arrays() {
        let doc = json!({
            "env_medium": {
                "components": [{"label": "soil"}, {"label": "water"}, {"raw": "x"}]
            }
        });
        let labels = values_at_path(&doc, "env_medium.components.label");
        assert_eq!(labels, vec![&json!("soil"), &json!("water")]);
        assert!(values_at_path(&doc, "env_broad_scale.components.label").is_empty());
    }

    #[test]
    fn layout_paths() {
        let store = Store::open("/tmp/envtriad-store");
        assert!(store
            .collection_path(MATERIALIZED)
            .ends_with("collections/env_triads.jsonl"));
        assert!(store
            .index_path(MATERIALIZED, "env_medium.components.label")
            .ends_with("indexes/env_triads/env_medium.components.label.json"));
    }
}
