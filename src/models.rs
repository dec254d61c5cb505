//! Core data models: the canonical catalog record and asset classes.
//!
//! Records are persisted exactly as serialized here (camelCase JSON). Older
//! document shapes are migrated by [`crate::normalize`] before they reach
//! this type, so nothing downstream inspects legacy field names.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

/// Longest id accepted from clients. Ids name directories on disk.
pub const MAX_ID_LENGTH: usize = 64;

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_obtained: Option<String>,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub personal_best: String,
    #[serde(default)]
    pub average_time: String,
    #[serde(default)]
    pub solved: bool,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Public URLs of the record's images, in display order.
    #[serde(default)]
    pub images: Vec<String>,
    /// External solution pages.
    #[serde(default)]
    pub solution_links: Vec<String>,
    /// Uploaded solution documents.
    #[serde(default)]
    pub solution_files: Vec<SolutionFile>,

    // Solve-log entries (the original minimal schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scramble: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub moves: Option<String>,
}

impl Record {
    /// A record with only `id` and `name` set; every other field empty.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: String::new(),
            brand: String::new(),
            date_obtained: None,
            difficulty: String::new(),
            personal_best: String::new(),
            average_time: String::new(),
            solved: false,
            notes: String::new(),
            tags: Vec::new(),
            images: Vec::new(),
            solution_links: Vec::new(),
            solution_files: Vec::new(),
            scramble: None,
            time: None,
            date: None,
            moves: None,
        }
    }

    /// Checks the invariants every stored record must satisfy.
    pub fn validate(&self, max_name_length: usize) -> Result<()> {
        validate_name(&self.name, max_name_length)?;
        if let Some(d) = &self.date_obtained {
            validate_date("dateObtained", d)?;
        }
        if let Some(d) = &self.date {
            validate_date("date", d)?;
        }
        Ok(())
    }
}

/// An uploaded solution document attached to a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionFile {
    pub path: String,
    #[serde(alias = "name", default)]
    pub display_name: String,
}

/// The category of an asset: decides its subdirectory and filename pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetClass {
    Image,
    Solution,
}

impl AssetClass {
    /// Filename prefix before the sequence number.
    pub fn prefix(self) -> &'static str {
        match self {
            AssetClass::Image => "image",
            AssetClass::Solution => "solution",
        }
    }
}

/// Ids must be usable as a single directory name component.
pub fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id.len() <= MAX_ID_LENGTH
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CatalogError::InvalidId(id.to_string()))
    }
}

pub fn validate_name(name: &str, max_len: usize) -> Result<()> {
    if name.trim().is_empty() {
        return Err(CatalogError::validation("name is required"));
    }
    if name.chars().count() > max_len {
        return Err(CatalogError::validation(format!(
            "name is too long (max {} characters)",
            max_len
        )));
    }
    Ok(())
}

/// Accepts only real calendar dates in `YYYY-MM-DD` form.
pub fn validate_date(field: &str, value: &str) -> Result<()> {
    let well_formed = value.len() == 10 && NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok();
    if well_formed {
        Ok(())
    } else {
        Err(CatalogError::validation(format!(
            "{} must be a valid date (YYYY-MM-DD), got {:?}",
            field, value
        )))
    }
}
