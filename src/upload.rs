//! Multipart asset uploads.
//!
//! An upload request is read completely (record id plus file parts) and
//! validated as a whole before anything touches the disk: a request with one
//! oversized or disallowed file writes nothing. Accepted files are then
//! numbered through [`AssetDirs::next_sequence`] and written one at a time,
//! so a batch of N images for a record holding `image-1..k` becomes
//! `image-(k+1)..(k+N)`.

use axum::extract::Multipart;
use serde::Serialize;
use tracing::info;

use crate::assets::{extension_of, AssetDirs};
use crate::config::UploadsConfig;
use crate::error::{CatalogError, Result};
use crate::models::{validate_id, AssetClass};

/// Multipart field carrying the owning record's id.
pub const RECORD_ID_FIELD: &str = "cubeId";

/// One file part of an upload request.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A parsed upload request.
#[derive(Debug, Default)]
pub struct UploadRequest {
    pub record_id: Option<String>,
    pub files: Vec<IncomingFile>,
    /// Set when a part exceeded the size limit while streaming; the rest of
    /// that part is discarded.
    pub oversized: bool,
}

/// A file written to the asset tree.
#[derive(Debug, Clone, Serialize)]
pub struct StoredAsset {
    pub filename: String,
    pub url: String,
    pub original_name: String,
}

/// Limits and allow-lists applied to uploads, derived from `[uploads]`.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    max_file_bytes: u64,
    max_images: usize,
    max_solutions: usize,
    image_extensions: Vec<String>,
    image_mime_types: Vec<String>,
    document_extensions: Vec<String>,
    document_mime_types: Vec<String>,
}

impl UploadPolicy {
    pub fn new(config: &UploadsConfig) -> Self {
        let lower = |v: &[String]| -> Vec<String> { v.iter().map(|s| s.to_ascii_lowercase()).collect() };
        Self {
            max_file_bytes: config.max_file_size_bytes(),
            max_images: config.max_images_per_request,
            max_solutions: config.max_solutions_per_request,
            image_extensions: lower(&config.image_extensions),
            image_mime_types: lower(&config.image_mime_types),
            document_extensions: lower(&config.document_extensions),
            document_mime_types: lower(&config.document_mime_types),
        }
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Files accepted in one request of this class. Solutions are uploaded
    /// one document per request.
    pub fn max_files(&self, class: AssetClass) -> usize {
        match class {
            AssetClass::Image => self.max_images,
            AssetClass::Solution => 1,
        }
    }

    /// Upper bound for a whole multipart body.
    pub fn body_limit(&self) -> usize {
        let files = self.max_images.max(self.max_solutions) as u64;
        (self.max_file_bytes.saturating_mul(files) + 1024 * 1024) as usize
    }

    fn allowed(&self, class: AssetClass) -> (&[String], &[String]) {
        match class {
            AssetClass::Image => (&self.image_extensions, &self.image_mime_types),
            AssetClass::Solution => (&self.document_extensions, &self.document_mime_types),
        }
    }

    /// Validates a whole request. Returns the checked record id.
    pub fn check<'a>(&self, class: AssetClass, request: &'a UploadRequest) -> Result<&'a str> {
        if request.oversized {
            return Err(self.too_large());
        }
        if request.files.is_empty() {
            return Err(CatalogError::validation("no file provided"));
        }
        let max = self.max_files(class);
        if request.files.len() > max {
            return Err(CatalogError::validation(format!(
                "too many files (max {} per upload)",
                max
            )));
        }
        let record_id = request
            .record_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CatalogError::validation("record id (cubeId) is required"))?;
        validate_id(record_id)?;

        let (extensions, mime_types) = self.allowed(class);
        for file in &request.files {
            if file.bytes.len() as u64 > self.max_file_bytes {
                return Err(self.too_large());
            }
            let ext = extension_of(&file.original_name);
            if !extensions.contains(&ext) {
                return Err(CatalogError::validation(format!(
                    "file type not allowed: {} (accepted: {})",
                    file.original_name,
                    extensions.join(", ")
                )));
            }
            if !mime_types.contains(&file.content_type.to_ascii_lowercase()) {
                return Err(CatalogError::validation(format!(
                    "MIME type not allowed: {}",
                    file.content_type
                )));
            }
        }
        Ok(record_id)
    }

    fn too_large(&self) -> CatalogError {
        CatalogError::validation(format!(
            "file too large (max {} MB)",
            self.max_file_bytes / (1024 * 1024)
        ))
    }
}

/// Reads every part of a multipart body. File parts are taken from
/// `file_field`; other unknown parts are ignored.
pub async fn read_multipart(
    mut multipart: Multipart,
    file_field: &str,
    max_file_bytes: u64,
) -> Result<UploadRequest> {
    let mut request = UploadRequest::default();
    let malformed = |e: axum::extract::multipart::MultipartError| {
        CatalogError::validation(format!("malformed upload: {}", e.body_text()))
    };

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == RECORD_ID_FIELD {
            request.record_id = Some(field.text().await.map_err(malformed)?.trim().to_string());
        } else if name == file_field {
            let original_name = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let mut bytes = Vec::new();
            while let Some(chunk) = field.chunk().await.map_err(malformed)? {
                if (bytes.len() + chunk.len()) as u64 > max_file_bytes {
                    request.oversized = true;
                    break;
                }
                bytes.extend_from_slice(&chunk);
            }
            request.files.push(IncomingFile {
                original_name,
                content_type,
                bytes,
            });
        }
    }
    Ok(request)
}

/// Validates and writes an upload; returns the stored assets in order.
pub async fn store_upload(
    assets: &AssetDirs,
    policy: &UploadPolicy,
    class: AssetClass,
    request: UploadRequest,
) -> Result<Vec<StoredAsset>> {
    let record_id = policy.check(class, &request)?.to_string();

    let mut stored = Vec::with_capacity(request.files.len());
    for file in request.files {
        let n = assets.next_sequence(&record_id, class).await?;
        let filename = AssetDirs::file_name(class, n, &extension_of(&file.original_name));
        let path = assets.class_dir(&record_id, class).join(&filename);
        tokio::fs::write(&path, &file.bytes).await?;
        info!(
            record = %record_id,
            original = %file.original_name,
            stored = %filename,
            bytes = file.bytes.len(),
            "stored upload"
        );
        stored.push(StoredAsset {
            url: assets.url(&record_id, class, &filename),
            filename,
            original_name: file.original_name,
        });
    }
    Ok(stored)
}
