//! Per-record asset tree: naming, directory lifecycle, and asset deletion.
//!
//! Layout under the configured asset root:
//!
//! ```text
//! <root>/<cubes_dir>/cube-<id>/<images_subdir>/image-<n>.<ext>
//! <root>/<cubes_dir>/cube-<id>/<solutions_subdir>/solution-<n>.pdf
//! <root>/<trash_dir>/<unix-millis>-<filename>        (trash_on_delete)
//! ```
//!
//! Public URLs mirror the on-disk path below `<root>`:
//! `/<cubes_dir>/cube-<id>/<subdir>/<file>`.
//!
//! # Sequence numbering
//!
//! [`AssetDirs::next_sequence`] scans the class directory on every call and
//! returns one past the highest number found. Nothing is reserved, so two
//! uploads for the same record racing each other can pick the same number
//! and the later write replaces the earlier file.

use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

use crate::config::{AssetsConfig, UploadsConfig};
use crate::error::{CatalogError, Result};
use crate::models::{validate_id, AssetClass};

/// One asset as reported by [`AssetDirs::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetEntry {
    pub filename: String,
    pub url: String,
}

/// All assets currently stored for a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssetListing {
    pub images: Vec<AssetEntry>,
    pub solutions: Vec<AssetEntry>,
}

/// Owns the asset tree below the configured root.
#[derive(Debug, Clone)]
pub struct AssetDirs {
    root: PathBuf,
    cubes_dir: String,
    images_subdir: String,
    solutions_subdir: String,
    trash_on_delete: bool,
    trash_dir: String,
    image_extensions: Vec<String>,
}

impl AssetDirs {
    pub fn new(assets: &AssetsConfig, uploads: &UploadsConfig) -> Self {
        Self {
            root: assets.root.clone(),
            cubes_dir: assets.cubes_dir.clone(),
            images_subdir: assets.images_subdir.clone(),
            solutions_subdir: assets.solutions_subdir.clone(),
            trash_on_delete: assets.trash_on_delete,
            trash_dir: assets.trash_dir.clone(),
            image_extensions: uploads
                .image_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory served under `/<cubes_dir>`.
    pub fn cubes_root(&self) -> PathBuf {
        self.root.join(&self.cubes_dir)
    }

    pub fn cubes_dir(&self) -> &str {
        &self.cubes_dir
    }

    fn subdir(&self, class: AssetClass) -> &str {
        match class {
            AssetClass::Image => &self.images_subdir,
            AssetClass::Solution => &self.solutions_subdir,
        }
    }

    fn record_dir_name(id: &str) -> String {
        format!("cube-{}", id)
    }

    /// The subtree holding every asset of a record.
    pub fn record_dir(&self, id: &str) -> PathBuf {
        self.cubes_root().join(Self::record_dir_name(id))
    }

    pub fn class_dir(&self, id: &str, class: AssetClass) -> PathBuf {
        self.record_dir(id).join(self.subdir(class))
    }

    /// Public URL of an asset file.
    pub fn url(&self, id: &str, class: AssetClass, filename: &str) -> String {
        format!(
            "/{}/{}/{}/{}",
            self.cubes_dir,
            Self::record_dir_name(id),
            self.subdir(class),
            filename
        )
    }

    /// Filename for sequence number `n`. `ext` includes the leading dot.
    pub fn file_name(class: AssetClass, n: u32, ext: &str) -> String {
        match class {
            AssetClass::Image => format!("image-{}{}", n, ext),
            AssetClass::Solution => format!("solution-{}.pdf", n),
        }
    }

    /// Creates the class directory for a record if it is missing.
    pub async fn ensure(&self, id: &str, class: AssetClass) -> Result<PathBuf> {
        validate_id(id)?;
        let dir = self.class_dir(id, class);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Next free sequence number for `class` under the record.
    pub async fn next_sequence(&self, id: &str, class: AssetClass) -> Result<u32> {
        let dir = self.ensure(id, class).await?;
        let names = read_file_names(&dir).await?;
        let max = names
            .iter()
            .filter_map(|name| self.parse_sequence(class, name))
            .max()
            .unwrap_or(0);
        let next = max.checked_add(1).ok_or_else(|| {
            CatalogError::validation(format!(
                "no {} sequence numbers left for record {}",
                class.prefix(),
                id
            ))
        })?;
        debug!(record = id, class = class.prefix(), next, "scanned asset directory");
        Ok(next)
    }

    /// Sequence number embedded in `name`, if it follows the class pattern.
    pub fn parse_sequence(&self, class: AssetClass, name: &str) -> Option<u32> {
        let rest = name.strip_prefix(class.prefix())?.strip_prefix('-')?;
        let dot = rest.find('.')?;
        let (digits, ext) = rest.split_at(dot);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let ext_ok = match class {
            AssetClass::Image => self
                .image_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
            AssetClass::Solution => ext == ".pdf",
        };
        if !ext_ok {
            return None;
        }
        digits.parse().ok()
    }

    /// Removes the record's whole asset subtree. Missing is not an error.
    pub async fn remove_all(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let dir = self.record_dir(id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(record = id, dir = %dir.display(), "removed asset directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists a record's images and solution documents, ordered by sequence.
    pub async fn list(&self, id: &str) -> Result<AssetListing> {
        validate_id(id)?;
        let mut listing = AssetListing::default();
        for class in [AssetClass::Image, AssetClass::Solution] {
            let dir = self.class_dir(id, class);
            let mut names: Vec<String> = match read_file_names(&dir).await {
                Ok(names) => names,
                Err(CatalogError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    Vec::new()
                }
                Err(e) => return Err(e),
            };
            names.retain(|n| self.is_class_file(class, n));
            names.sort_by_key(|n| (self.parse_sequence(class, n).unwrap_or(u32::MAX), n.clone()));
            let entries = names
                .into_iter()
                .map(|filename| AssetEntry {
                    url: self.url(id, class, &filename),
                    filename,
                })
                .collect();
            match class {
                AssetClass::Image => listing.images = entries,
                AssetClass::Solution => listing.solutions = entries,
            }
        }
        Ok(listing)
    }

    fn is_class_file(&self, class: AssetClass, name: &str) -> bool {
        let ext = extension_of(name);
        match class {
            AssetClass::Image => self.image_extensions.iter().any(|e| *e == ext),
            AssetClass::Solution => ext == ".pdf",
        }
    }

    /// Resolves a public asset URL path to a file inside `class`'s directory
    /// of some record.
    pub fn resolve(&self, url_path: &str, class: AssetClass) -> Result<PathBuf> {
        let invalid = || CatalogError::InvalidPath(url_path.to_string());
        let relative = url_path.trim_start_matches('/');
        let mut segments = Vec::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(s) => segments.push(s.to_str().ok_or_else(invalid)?),
                _ => return Err(invalid()),
            }
        }
        // <cubes_dir>/cube-<id>/<subdir>/<file>
        let [cubes, record, subdir, file] = segments.as_slice() else {
            return Err(invalid());
        };
        if *cubes != self.cubes_dir || *subdir != self.subdir(class) {
            return Err(invalid());
        }
        let id = record.strip_prefix("cube-").ok_or_else(invalid)?;
        validate_id(id).map_err(|_| invalid())?;
        Ok(self.class_dir(id, class).join(file))
    }

    /// Deletes one asset by public URL path, or moves it to the trash
    /// directory when `trash_on_delete` is configured.
    pub async fn delete_asset(&self, url_path: &str, class: AssetClass) -> Result<()> {
        let path = self.resolve(url_path, class)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(CatalogError::NotFound(format!("{} {}", class.prefix(), url_path))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound(format!("{} {}", class.prefix(), url_path)))
            }
            Err(e) => return Err(e.into()),
        }

        if self.trash_on_delete {
            let trashed = self.move_to_trash(&path).await?;
            info!(asset = url_path, trash = %trashed.display(), "moved asset to trash");
        } else {
            tokio::fs::remove_file(&path).await?;
            info!(asset = url_path, "deleted asset");
        }
        Ok(())
    }

    /// Renames `path` into the trash directory with a timestamp prefix.
    /// A rename keeps the move atomic on a single volume.
    async fn move_to_trash(&self, path: &Path) -> Result<PathBuf> {
        let trash = self.root.join(&self.trash_dir);
        tokio::fs::create_dir_all(&trash).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = trash.join(format!(
            "{}-{}",
            chrono::Utc::now().timestamp_millis(),
            filename
        ));
        tokio::fs::rename(path, &target).await?;
        Ok(target)
    }
}

/// Lowercased extension including the dot, or `""`.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_ascii_lowercase()))
        .unwrap_or_default()
}

async fn read_file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    Ok(names)
}
