//! The record store: one JSON document holding every record in insertion
//! order.
//!
//! Every operation reads the whole document and every mutation rewrites it
//! whole. There is no lock around the read-modify-write cycle, so two
//! concurrent mutations can interleave and the later write silently drops
//! the earlier change. Callers that need isolation must serialize requests
//! themselves.

use chrono::Utc;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::assets::AssetDirs;
use crate::config::{Config, ValidationConfig};
use crate::error::{CatalogError, Result};
use crate::models::{validate_date, validate_id, validate_name, Record};
use crate::normalize::normalize_record;

/// Field names a client may set through [`RecordStore::update`]. Anything
/// else in an update payload is dropped without error.
pub const UPDATABLE_FIELDS: &[&str] = &[
    "name",
    "type",
    "brand",
    "dateObtained",
    "difficulty",
    "personalBest",
    "averageTime",
    "solved",
    "images",
    "solutionType",
    "solutionLink",
    "solutionLinks",
    "solutionFiles",
    "notes",
    "tags",
    // solve-log fields
    "scramble",
    "time",
    "date",
    "moves",
    "image",
    "solution",
];

/// Fields whose presence marks a creation payload as a collection item.
const COLLECTION_FIELDS: &[&str] = &["type", "brand", "dateObtained"];

/// Fields of the legacy solve-log schema.
const SOLVE_LOG_FIELDS: &[&str] = &["scramble", "time", "date"];

#[derive(Debug, Clone)]
pub struct RecordStore {
    path: PathBuf,
    assets: AssetDirs,
    limits: ValidationConfig,
}

impl RecordStore {
    pub fn new(path: impl AsRef<Path>, assets: AssetDirs, limits: ValidationConfig) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            assets,
            limits,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.store.path,
            AssetDirs::new(&config.assets, &config.uploads),
            config.validation.clone(),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn assets(&self) -> &AssetDirs {
        &self.assets
    }

    /// Creates the document as an empty array when it does not exist yet.
    pub async fn ensure_document(&self) -> Result<()> {
        if tokio::fs::try_exists(&self.path).await? {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, b"[]").await?;
        info!(path = %self.path.display(), "initialized empty store document");
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Record>> {
        self.ensure_document().await?;
        let content = tokio::fs::read_to_string(&self.path).await?;
        let raw: Vec<Value> = serde_json::from_str(&content)
            .map_err(|e| CatalogError::CorruptStore(e.to_string()))?;
        let records = raw
            .into_iter()
            .map(|entry| {
                normalize_record(entry, &self.assets)
                    .map_err(|e| CatalogError::CorruptStore(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(count = records.len(), "read store document");
        Ok(records)
    }

    async fn write_all(&self, records: &[Record]) -> Result<()> {
        self.ensure_document().await?;
        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Every record, in insertion order.
    pub async fn list_all(&self) -> Result<Vec<Record>> {
        self.read_all().await
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Record> {
        self.read_all()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("record {}", id)))
    }

    /// The id the next creation without a client-supplied id would get.
    pub async fn next_id(&self) -> Result<String> {
        Ok(next_id(&self.read_all().await?))
    }

    /// Validates `payload`, assigns an id, appends the record, and persists.
    pub async fn create(&self, payload: Value) -> Result<Record> {
        let Value::Object(fields) = payload else {
            return Err(CatalogError::validation("request body must be a JSON object"));
        };

        let name = string_field(&fields, "name")?.unwrap_or_default();
        validate_name(&name, self.limits.max_name_length)?;

        let mut records = self.read_all().await?;
        let present = |keys: &[&str]| {
            keys.iter()
                .any(|k| fields.get(*k).is_some_and(|v| !v.is_null()))
        };
        // Collection fields win; a bare `{name}` is a collection item too.
        let is_solve_log = !present(COLLECTION_FIELDS) && present(SOLVE_LOG_FIELDS);
        let record = if is_solve_log {
            self.build_solve_log(&fields, &records)?
        } else {
            self.build_collection_item(&fields, &records)?
        };

        records.push(record.clone());
        self.write_all(&records).await?;
        info!(id = %record.id, name = %record.name, "created record");
        Ok(record)
    }

    fn build_collection_item(&self, fields: &Map<String, Value>, records: &[Record]) -> Result<Record> {
        let supplied = |id: String| -> Result<String> {
            validate_id(&id)?;
            if records.iter().any(|r| r.id == id) {
                return Err(CatalogError::Conflict(id));
            }
            Ok(id)
        };
        let id = match fields.get("id") {
            None | Some(Value::Null) => next_id(records),
            Some(Value::String(s)) if s.is_empty() => next_id(records),
            Some(Value::String(s)) => supplied(s.clone())?,
            Some(Value::Number(n)) => supplied(n.to_string())?,
            Some(other) => return Err(CatalogError::InvalidId(other.to_string())),
        };
        // A generated id can only collide after a timestamp fallback.
        let taken = |candidate: &str| records.iter().any(|r| r.id == candidate);
        let id = if taken(&id) {
            let mut millis = Utc::now().timestamp_millis();
            while taken(&millis.to_string()) {
                millis += 1;
            }
            millis.to_string()
        } else {
            id
        };

        let mut map = whitelisted(fields);
        map.insert("id".to_string(), Value::String(id));
        match string_field(fields, "dateObtained")? {
            Some(d) if !d.is_empty() => validate_date("dateObtained", &d)?,
            _ => {
                let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
                map.insert("dateObtained".to_string(), Value::String(today));
            }
        }

        let record = normalize_record(Value::Object(map), &self.assets)?;
        record.validate(self.limits.max_name_length)?;
        Ok(record)
    }

    fn build_solve_log(&self, fields: &Map<String, Value>, records: &[Record]) -> Result<Record> {
        let required = |key: &str| -> Result<String> {
            match string_field(fields, key)? {
                Some(v) if !v.is_empty() => Ok(v),
                _ => Err(CatalogError::validation(format!(
                    "solve entries require scramble, time, and date (missing {})",
                    key
                ))),
            }
        };
        let scramble = required("scramble")?;
        let time = required("time")?;
        let date = required("date")?;

        if scramble.chars().count() > self.limits.max_scramble_length {
            return Err(CatalogError::validation(format!(
                "scramble is too long (max {} characters)",
                self.limits.max_scramble_length
            )));
        }
        if time.chars().count() > self.limits.max_time_length {
            return Err(CatalogError::validation(format!(
                "time is too long (max {} characters)",
                self.limits.max_time_length
            )));
        }
        validate_date("date", &date)?;

        let mut map = Map::new();
        map.insert("id".to_string(), Value::String(next_id(records)));
        for key in ["name", "image"] {
            if let Some(v) = fields.get(key) {
                map.insert(key.to_string(), v.clone());
            }
        }
        map.insert("scramble".to_string(), Value::String(scramble));
        map.insert("time".to_string(), Value::String(time));
        map.insert("date".to_string(), Value::String(date));
        let moves = string_field(fields, "moves")?.unwrap_or_default();
        map.insert("moves".to_string(), Value::String(moves));

        normalize_record(Value::Object(map), &self.assets)
    }

    /// Shallow-merges the whitelisted fields of `payload` into the record.
    pub async fn update(&self, id: &str, payload: Value) -> Result<Record> {
        validate_id(id)?;
        let Value::Object(fields) = payload else {
            return Err(CatalogError::validation("request body must be a JSON object"));
        };

        let mut records = self.read_all().await?;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("record {}", id)))?;

        let Value::Object(mut merged) = serde_json::to_value(&records[index])? else {
            return Err(CatalogError::CorruptStore(format!("record {} is not an object", id)));
        };
        let updates = whitelisted(&fields);
        let ignored = fields.len() - updates.len();
        merged.extend(updates);

        let record = normalize_record(Value::Object(merged), &self.assets)?;
        record.validate(self.limits.max_name_length)?;

        records[index] = record.clone();
        self.write_all(&records).await?;
        info!(id, ignored_fields = ignored, "updated record");
        Ok(record)
    }

    /// Removes the record, then makes a best-effort attempt to remove its
    /// asset directory. Cleanup failure is logged, never returned.
    pub async fn delete(&self, id: &str) -> Result<Record> {
        validate_id(id)?;
        let mut records = self.read_all().await?;
        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("record {}", id)))?;

        let removed = records.remove(index);
        self.write_all(&records).await?;
        info!(id, "deleted record");

        if let Err(e) = self.assets.remove_all(id).await {
            warn!(id, error = %e, "failed to remove asset directory");
        }
        Ok(removed)
    }
}

/// One greater than the largest purely numeric id, as a string.
///
/// Falls back to the current time in milliseconds if the numeric space is
/// exhausted.
pub fn next_id(records: &[Record]) -> String {
    let max = records
        .iter()
        .filter_map(|r| r.id.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    match max.checked_add(1) {
        Some(next) => next.to_string(),
        None => Utc::now().timestamp_millis().to_string(),
    }
}

fn whitelisted(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(k, _)| UPDATABLE_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(CatalogError::validation(format!("{} must be a string", key))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetsConfig, UploadsConfig};
    use crate::models::AssetClass;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> RecordStore {
        let assets = AssetsConfig {
            root: tmp.path().join("public"),
            ..AssetsConfig::default()
        };
        RecordStore::new(
            tmp.path().join("data").join("cubes.json"),
            AssetDirs::new(&assets, &UploadsConfig::default()),
            ValidationConfig::default(),
        )
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_list_initializes_empty_document() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        assert!(s.list_all().await.unwrap().is_empty());
        let content = std::fs::read_to_string(s.path()).unwrap();
        assert_eq!(content.trim(), "[]");
    }

    #[tokio::test]
    async fn test_collection_scenario() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);

        let void = s.create(json!({"name": "Void Cube"})).await.unwrap();
        assert_eq!(void.id, "1");
        assert!(!void.solved);
        assert!(void.images.is_empty());

        let pyra = s.create(json!({"name": "Pyraminx", "id": "5"})).await.unwrap();
        assert_eq!(pyra.id, "5");

        let third = s.create(json!({"name": "Skewb"})).await.unwrap();
        assert_eq!(third.id, "6");

        s.delete("5").await.unwrap();
        assert_eq!(ids(&s.list_all().await.unwrap()), vec!["1", "6"]);
    }

    #[tokio::test]
    async fn test_duplicate_id_conflicts_and_leaves_store_unchanged() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "A", "id": "7"})).await.unwrap();
        let before = std::fs::read_to_string(s.path()).unwrap();

        let err = s.create(json!({"name": "B", "id": "7"})).await.unwrap_err();
        assert!(matches!(err, CatalogError::Conflict(_)));
        assert_eq!(std::fs::read_to_string(s.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_create_validation() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        for bad in [
            json!({}),
            json!({"name": ""}),
            json!({"name": "x".repeat(101)}),
            json!({"name": "A", "dateObtained": "2024-13-01"}),
            json!({"name": "A", "id": "../up"}),
            json!({"name": "A", "solved": "yes"}),
            json!("just a string"),
        ] {
            let err = s.create(bad.clone()).await.unwrap_err();
            assert_eq!(err.status_code(), 400, "expected 400 for {}", bad);
        }
        assert!(s.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_get_round_trip() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let created = s
            .create(json!({
                "name": "GAN 356",
                "type": "3x3",
                "brand": "GAN",
                "dateObtained": "2022-12-24",
                "difficulty": "medium",
                "personalBest": "14.02",
                "averageTime": "19.5",
                "solved": true,
                "notes": "gift",
                "tags": ["speed", "magnetic"],
                "solutionLinks": ["https://example.com/cfop"]
            }))
            .await
            .unwrap();
        let fetched = s.get_by_id(&created.id).await.unwrap();
        assert_eq!(created, fetched);
        assert_eq!(fetched.brand, "GAN");
        assert_eq!(fetched.date_obtained.as_deref(), Some("2022-12-24"));
        assert_eq!(fetched.tags, vec!["speed", "magnetic"]);
    }

    #[tokio::test]
    async fn test_create_defaults_date_obtained_to_today() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let r = s.create(json!({"name": "Clock"})).await.unwrap();
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert_eq!(r.date_obtained.as_deref(), Some(today.as_str()));
    }

    #[tokio::test]
    async fn test_solve_log_create() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let r = s
            .create(json!({"name": "Morning", "scramble": "R U R' U'", "time": "21.4", "date": "2024-03-02"}))
            .await
            .unwrap();
        assert_eq!(r.id, "1");
        assert_eq!(r.time.as_deref(), Some("21.4"));
        assert_eq!(r.moves.as_deref(), Some(""));
        assert!(r.date_obtained.is_none());

        let missing = s
            .create(json!({"name": "Evening", "scramble": "F2"}))
            .await
            .unwrap_err();
        assert!(missing.to_string().contains("time"));

        let long_time = s
            .create(json!({"name": "E", "scramble": "F", "time": "9".repeat(21), "date": "2024-03-02"}))
            .await
            .unwrap_err();
        assert!(long_time.to_string().contains("time is too long"));
    }

    #[tokio::test]
    async fn test_update_merges_whitelist_only() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "Megaminx", "brand": "QiYi"})).await.unwrap();

        let updated = s
            .update("1", json!({"solved": true, "notes": "finally", "color": "black", "id": "99"}))
            .await
            .unwrap();
        assert!(updated.solved);
        assert_eq!(updated.notes, "finally");
        assert_eq!(updated.id, "1");
        assert_eq!(updated.brand, "QiYi");

        let fetched = s.get_by_id("1").await.unwrap();
        assert_eq!(fetched, updated);
        let raw = std::fs::read_to_string(s.path()).unwrap();
        assert!(!raw.contains("color"));
    }

    #[tokio::test]
    async fn test_update_folds_legacy_link() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "Square-1"})).await.unwrap();
        let updated = s
            .update("1", json!({"solutionType": "link", "solutionLink": "https://x.test/sq1"}))
            .await
            .unwrap();
        assert_eq!(updated.solution_links, vec!["https://x.test/sq1"]);
    }

    #[tokio::test]
    async fn test_update_errors() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "Skewb"})).await.unwrap();

        let err = s.update("42", json!({"name": "x"})).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        let err = s.update("a/b", json!({"name": "x"})).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidId(_)));
        let err = s.update("1", json!({"name": ""})).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(s.get_by_id("1").await.unwrap().name, "Skewb");
    }

    #[tokio::test]
    async fn test_delete_unknown_leaves_store_unchanged() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "A"})).await.unwrap();
        let err = s.delete("2").await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
        assert_eq!(s.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_asset_directory() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "A"})).await.unwrap();
        let dir = s.assets().ensure("1", AssetClass::Image).await.unwrap();
        std::fs::write(dir.join("image-1.jpg"), b"jpg").unwrap();

        s.delete("1").await.unwrap();
        assert!(!s.assets().record_dir("1").exists());
        assert!(s.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_succeeds_when_asset_cleanup_fails() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "A"})).await.unwrap();
        // a plain file where the directory should be makes removal fail
        let dir = s.assets().record_dir("1");
        std::fs::create_dir_all(dir.parent().unwrap()).unwrap();
        std::fs::write(&dir, b"not a directory").unwrap();

        let removed = s.delete("1").await.unwrap();
        assert_eq!(removed.id, "1");
        assert!(s.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_collection_fields_win_over_solve_log_fields() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        let r = s
            .create(json!({"name": "GAN", "type": "3x3", "brand": "GAN", "date": "2024-01-01"}))
            .await
            .unwrap();
        assert_eq!(r.kind, "3x3");
        assert_eq!(r.date.as_deref(), Some("2024-01-01"));
        assert!(r.date_obtained.is_some());

        let r = s
            .create(json!({"name": "Timed", "type": "3x3", "time": "12.3"}))
            .await
            .unwrap();
        assert_eq!(r.time.as_deref(), Some("12.3"));
        assert_eq!(ids(&s.list_all().await.unwrap()), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_generated_id_collision_falls_back_to_timestamp() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        s.create(json!({"name": "Max", "id": u64::MAX.to_string()}))
            .await
            .unwrap();
        // overflow fallback: the next generated id is a timestamp
        let second = s.create(json!({"name": "A"})).await.unwrap();
        assert!(second.id.parse::<i64>().unwrap() > 0);
        let third = s.create(json!({"name": "B"})).await.unwrap();
        assert_ne!(third.id, second.id);
        assert_eq!(s.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let tmp = TempDir::new().unwrap();
        let s = store(&tmp);
        std::fs::create_dir_all(s.path().parent().unwrap()).unwrap();
        std::fs::write(s.path(), "{ not json").unwrap();
        let err = s.list_all().await.unwrap_err();
        assert!(matches!(err, CatalogError::CorruptStore(_)));
        assert!(err.is_internal());
    }

    #[test]
    fn test_next_id_ignores_non_numeric() {
        let records = vec![
            Record::new("3", "a"),
            Record::new("legacy-x", "b"),
            Record::new("12", "c"),
        ];
        assert_eq!(next_id(&records), "13");
        assert_eq!(next_id(&[]), "1");
    }
}
