//! Migration of stored record shapes into the canonical [`Record`].
//!
//! The store document accumulated several shapes for the same data over
//! time: a single `image`, a nested `files.{images,solutions}` block with
//! bare filenames, a single `solutionLink` tagged by `solutionType`, and a
//! `solutionPdfLink`. [`normalize_record`] folds all of them into
//! `images` / `solutionLinks` / `solutionFiles` once, on read and after
//! every merge, so nothing else needs to know they ever existed.

use serde_json::{Map, Value};

use crate::assets::AssetDirs;
use crate::error::{CatalogError, Result};
use crate::models::{AssetClass, Record, SolutionFile};

/// Keys consumed by normalization and never persisted.
const LEGACY_KEYS: &[&str] = &[
    "image",
    "files",
    "solutionLink",
    "solutionType",
    "solutionPdfLink",
    "solution",
];

/// Free-form text fields. Older writers stored some of them as numbers.
const TEXT_FIELDS: &[&str] = &[
    "type",
    "brand",
    "difficulty",
    "personalBest",
    "averageTime",
    "notes",
    "time",
    "moves",
];

/// Converts one raw store entry into a canonical record.
///
/// Fails with [`CatalogError::Validation`] when the entry cannot be read as a
/// record at all (wrong field types, missing `id` or `name`).
pub fn normalize_record(raw: Value, assets: &AssetDirs) -> Result<Record> {
    let Value::Object(mut map) = raw else {
        return Err(CatalogError::validation("record must be a JSON object"));
    };

    if let Some(Value::Number(n)) = map.get("id") {
        let id = n.to_string();
        map.insert("id".to_string(), Value::String(id));
    }
    let id = map
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_default();

    for key in TEXT_FIELDS {
        if let Some(v) = map.get_mut(*key) {
            if let Value::Number(_) | Value::Bool(_) = v {
                *v = Value::String(v.to_string());
            }
        }
    }

    let mut images = take_string_array(&mut map, "images")?;
    let mut solution_links = take_string_array(&mut map, "solutionLinks")?;
    let mut solution_files: Vec<SolutionFile> = match map.remove("solutionFiles") {
        None | Some(Value::Null) => Vec::new(),
        Some(v) => serde_json::from_value(v)
            .map_err(|e| CatalogError::validation(format!("solutionFiles: {}", e)))?,
    };

    if let Some(Value::String(single)) = map.get("image") {
        if !single.is_empty() && !images.contains(single) {
            images.insert(0, single.clone());
        }
    }

    if let Some(Value::Object(files)) = map.get("files") {
        if let Some(Value::Array(names)) = files.get("images") {
            for name in names.iter().filter_map(Value::as_str) {
                let url = assets.url(&id, AssetClass::Image, name);
                if !images.contains(&url) {
                    images.push(url);
                }
            }
        }
        if let Some(Value::Array(entries)) = files.get("solutions") {
            for entry in entries {
                let (filename, display) = match entry {
                    Value::String(f) => (f.as_str(), None),
                    Value::Object(o) => match o.get("filename").and_then(Value::as_str) {
                        Some(f) => (
                            f,
                            o.get("name")
                                .or_else(|| o.get("displayName"))
                                .and_then(Value::as_str),
                        ),
                        None => continue,
                    },
                    _ => continue,
                };
                let path = assets.url(&id, AssetClass::Solution, filename);
                push_solution_file(&mut solution_files, path, display);
            }
        }
    }

    // Bare filenames refer to the record's own image directory.
    for image in images.iter_mut() {
        if !image.starts_with('/') && !image.starts_with("http") {
            *image = assets.url(&id, AssetClass::Image, image);
        }
    }

    let solution_type = map.get("solutionType").and_then(Value::as_str).unwrap_or("");
    if let Some(link) = map.get("solutionLink").and_then(Value::as_str) {
        if !link.is_empty() {
            if solution_type == "pdf" {
                push_solution_file(&mut solution_files, link.to_string(), None);
            } else if !solution_links.iter().any(|l| l == link) {
                solution_links.push(link.to_string());
            }
        }
    }
    if let Some(link) = map.get("solutionPdfLink").and_then(Value::as_str) {
        if !link.is_empty() {
            push_solution_file(&mut solution_files, link.to_string(), None);
        }
    }

    for key in LEGACY_KEYS {
        map.remove(*key);
    }
    map.insert("images".to_string(), to_value(&images)?);
    map.insert("solutionLinks".to_string(), to_value(&solution_links)?);
    map.insert("solutionFiles".to_string(), to_value(&solution_files)?);
    // `null` (and an empty date) means "absent" for the optional fields.
    if map.get("dateObtained").and_then(Value::as_str) == Some("") {
        map.remove("dateObtained");
    }
    map.retain(|_, v| !v.is_null());

    serde_json::from_value(Value::Object(map))
        .map_err(|e| CatalogError::validation(format!("malformed record {:?}: {}", id, e)))
}

fn take_string_array(map: &mut Map<String, Value>, key: &str) -> Result<Vec<String>> {
    match map.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(v) => {
            serde_json::from_value(v).map_err(|e| CatalogError::validation(format!("{}: {}", key, e)))
        }
    }
}

fn push_solution_file(files: &mut Vec<SolutionFile>, path: String, display: Option<&str>) {
    if files.iter().any(|f| f.path == path) {
        return;
    }
    let display_name = match display {
        Some(d) if !d.is_empty() => d.to_string(),
        _ => file_stem(&path),
    };
    files.push(SolutionFile { path, display_name });
}

/// Last path segment without its extension.
fn file_stem(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => name[..dot].to_string(),
        _ => name.to_string(),
    }
}

fn to_value<T: serde::Serialize>(v: &T) -> Result<Value> {
    Ok(serde_json::to_value(v)?)
}
