//! Loads a topology document from a single file or a fragment directory.
//!
//! Directory mode merges `base.yml`, every fragment under `domains/` in
//! filename-sorted order, and an optional `policies.yml` into one in-memory
//! document before validation runs, so downstream stages never know which
//! mode produced it.

use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::document::Document;
use crate::errors::LoadError;

const BASE_FRAGMENT: &str = "base.yml";
const DOMAINS_SUBDIR: &str = "domains";
const POLICIES_FRAGMENT: &str = "policies.yml";

/// Loads and, in directory mode, merges the document at `path`.
pub fn load_document(path: &Path) -> Result<Document, LoadError> {
    if path.is_dir() {
        load_fragment_dir(path)
    } else {
        let value = read_fragment(path)?;
        from_value(path, value)
    }
}

fn load_fragment_dir(dir: &Path) -> Result<Document, LoadError> {
    let base_path = dir.join(BASE_FRAGMENT);
    if !base_path.is_file() {
        return Err(LoadError::new(
            &base_path,
            "required base fragment is missing",
        ));
    }
    let mut merged = read_fragment(&base_path)?;

    for fragment_path in sorted_domain_fragments(dir)? {
        let fragment = read_fragment(&fragment_path)?;
        merged = merge_fragments(&fragment_path, merged, fragment)?;
    }

    let policies_path = dir.join(POLICIES_FRAGMENT);
    if policies_path.is_file() {
        let fragment = read_fragment(&policies_path)?;
        merged = merge_fragments(&policies_path, merged, fragment)?;
    }

    from_value(dir, Value::Mapping(merged))
}

fn sorted_domain_fragments(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let domains_dir = dir.join(DOMAINS_SUBDIR);
    if !domains_dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&domains_dir)
        .map_err(|e| LoadError::new(&domains_dir, format!("reading fragment directory: {e}")))?;

    let mut fragments = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| LoadError::new(&domains_dir, format!("iterating fragments: {e}")))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yml") | Some("yaml") | Some("json") => fragments.push(path),
            _ => continue,
        }
    }
    fragments.sort();
    Ok(fragments)
}

fn read_fragment(path: &Path) -> Result<Mapping, LoadError> {
    let bytes = fs::read_to_string(path)
        .map_err(|e| LoadError::new(path, format!("reading fragment: {e}")))?;

    let value: Value = if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
        serde_json::from_str(&bytes)
            .map_err(|e| LoadError::new(path, format!("malformed JSON: {e}")))?
    } else {
        serde_yaml::from_str(&bytes)
            .map_err(|e| LoadError::new(path, format!("malformed YAML: {e}")))?
    };

    match value {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(LoadError::new(
            path,
            "fragment root must be a mapping of top-level keys",
        )),
    }
}

/// Merges `fragment` into `merged`. Sequences concatenate (fragments were
/// already sorted by filename), mappings union with duplicate inner keys
/// rejected, and colliding scalars are an error.
fn merge_fragments(
    fragment_path: &Path,
    mut merged: Mapping,
    fragment: Mapping,
) -> Result<Mapping, LoadError> {
    for (key, incoming) in fragment {
        let key_name = key.as_str().unwrap_or("<non-string key>").to_string();
        match merged.get_mut(&key) {
            None => {
                merged.insert(key, incoming);
            }
            Some(Value::Sequence(existing)) => {
                let Value::Sequence(items) = incoming else {
                    return Err(LoadError::new(
                        fragment_path,
                        format!("top-level key '{key_name}' is a list elsewhere but not here"),
                    ));
                };
                existing.extend(items);
            }
            Some(Value::Mapping(existing)) => {
                let Value::Mapping(entries) = incoming else {
                    return Err(LoadError::new(
                        fragment_path,
                        format!("top-level key '{key_name}' is a mapping elsewhere but not here"),
                    ));
                };
                for (inner_key, inner_value) in entries {
                    let inner_name = inner_key.as_str().unwrap_or("<non-string key>").to_string();
                    if existing.contains_key(&inner_key) {
                        return Err(LoadError::new(
                            fragment_path,
                            format!("'{key_name}.{inner_name}' is already defined by an earlier fragment"),
                        ));
                    }
                    existing.insert(inner_key, inner_value);
                }
            }
            Some(_) => {
                return Err(LoadError::new(
                    fragment_path,
                    format!("scalar top-level key '{key_name}' is already defined by an earlier fragment"),
                ));
            }
        }
    }
    Ok(merged)
}

fn from_value(origin: &Path, value: impl Into<Value>) -> Result<Document, LoadError> {
    serde_yaml::from_value(value.into())
        .map_err(|e| LoadError::new(origin, format!("invalid document: {e}")))
}
