//! Deep merge of layered YAML documents.
//!
//! Layers are applied left to right: the first document is the base and every
//! following document is an overlay. Scalars from later layers win, mappings
//! are merged recursively and sequences follow the configured
//! [`ArrayMergeStrategy`].

use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{model::Error, utils};

/// How two sequences found under the same key are combined
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ArrayMergeStrategy {
    /// The overlay sequence replaces the base sequence
    #[default]
    Replace,
    /// Overlay items are appended to the base items, duplicates included
    Concat,
    /// Sequences are treated as sets of mappings identified by the given field
    MergeByKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MergeOptions {
    pub array_merge_strategy: ArrayMergeStrategy,
}

impl MergeOptions {
    pub fn by_key(key: &str) -> Self {
        MergeOptions { array_merge_strategy: ArrayMergeStrategy::MergeByKey(key.to_owned()) }
    }

    pub fn concat() -> Self {
        MergeOptions { array_merge_strategy: ArrayMergeStrategy::Concat }
    }
}

/// Empty YAML mapping
pub fn empty_document() -> Value {
    Value::Mapping(Mapping::new())
}

/// Deeply merges `source` on top of `target`
pub fn deep_merge(target: Value, source: Value, options: &MergeOptions) -> Value {
    match (target, source) {
        (Value::Mapping(mut target_map), Value::Mapping(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(slot) => {
                        let current = std::mem::take(slot);
                        *slot = deep_merge(current, source_value, options);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
            Value::Mapping(target_map)
        }
        (Value::Sequence(target_items), Value::Sequence(source_items)) => match &options.array_merge_strategy {
            ArrayMergeStrategy::Replace => Value::Sequence(source_items),
            ArrayMergeStrategy::Concat => Value::Sequence(target_items.into_iter().chain(source_items).collect()),
            ArrayMergeStrategy::MergeByKey(key) => Value::Sequence(merge_sequences_by_key(target_items, source_items, key, options)),
        },
        (_, source) => source,
    }
}

/// Merges two sequences of mappings by the value of `key`.
/// Matching items are deep merged in place, everything else is appended in source order.
fn merge_sequences_by_key(target: Vec<Value>, source: Vec<Value>, key: &str, options: &MergeOptions) -> Vec<Value> {
    let mut result = target;
    for source_item in source {
        let source_key = source_item.as_mapping().and_then(|mapping| mapping.get(key)).cloned();
        let Some(source_key) = source_key else {
            result.push(source_item);
            continue;
        };
        let existing = result
            .iter()
            .position(|item| item.as_mapping().and_then(|mapping| mapping.get(key)) == Some(&source_key));
        match existing {
            Some(index) => {
                let current = std::mem::take(&mut result[index]);
                result[index] = deep_merge(current, source_item, options);
            }
            None => result.push(source_item),
        }
    }
    result
}

/// Merges already parsed documents. An empty list yields an empty mapping.
pub fn merge_documents<I>(documents: I, options: &MergeOptions) -> Value
where
    I: IntoIterator<Item = Value>,
{
    documents
        .into_iter()
        .fold(empty_document(), |merged, document| deep_merge(merged, normalize_document(document), options))
}

fn normalize_document(document: Value) -> Value {
    match document {
        Value::Mapping(_) => document,
        Value::Null => empty_document(),
        other => {
            warn!("Ignoring YAML layer whose top level is not a mapping: {:?}", other);
            empty_document()
        }
    }
}

/// Reads and parses a single YAML layer
pub async fn read_yaml_file(path: &Path) -> Result<Value, Error> {
    let content = tokio::fs::read_to_string(path).await?;
    if content.trim().is_empty() {
        return Ok(empty_document());
    }
    Ok(normalize_document(serde_yaml::from_str(&content)?))
}

/// Merges every file in `paths`. All of them must exist.
pub async fn merge_yaml_files<P: AsRef<Path>>(paths: &[P], options: &MergeOptions) -> Result<Value, Error> {
    let mut merged = empty_document();
    for path in paths {
        let document = read_yaml_file(path.as_ref()).await?;
        merged = deep_merge(merged, document, options);
    }
    Ok(merged)
}

/// Merges the files in `paths` that exist, skipping the others
pub async fn merge_yaml_files_if_exists<P: AsRef<Path>>(paths: &[P], options: &MergeOptions) -> Result<Value, Error> {
    let mut existing: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            existing.push(path.to_path_buf());
        } else {
            info!("YAML file {} does not exist", path.display());
        }
    }
    merge_yaml_files(&existing, options).await
}

/// Merges `input_paths` and writes the result to `output_path`
pub async fn merge_yaml_files_to_file<P: AsRef<Path>>(input_paths: &[P], output_path: &Path, options: &MergeOptions) -> Result<Value, Error> {
    let merged = merge_yaml_files(input_paths, options).await?;
    utils::write_yaml_file(output_path, &merged).await?;
    info!("Merged {} YAML files into {}", input_paths.len(), output_path.display());
    Ok(merged)
}
