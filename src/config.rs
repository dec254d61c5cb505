use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// The JSON document holding every record.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssetsConfig {
    #[serde(default = "default_assets_root")]
    pub root: PathBuf,
    #[serde(default = "default_cubes_dir")]
    pub cubes_dir: String,
    #[serde(default = "default_images_subdir")]
    pub images_subdir: String,
    #[serde(default = "default_solutions_subdir")]
    pub solutions_subdir: String,
    /// Move deleted assets into `trash_dir` instead of unlinking them.
    #[serde(default)]
    pub trash_on_delete: bool,
    #[serde(default = "default_trash_dir")]
    pub trash_dir: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            root: default_assets_root(),
            cubes_dir: default_cubes_dir(),
            images_subdir: default_images_subdir(),
            solutions_subdir: default_solutions_subdir(),
            trash_on_delete: false,
            trash_dir: default_trash_dir(),
        }
    }
}

fn default_assets_root() -> PathBuf {
    PathBuf::from("public")
}
fn default_cubes_dir() -> String {
    "cubes".to_string()
}
fn default_images_subdir() -> String {
    "images".to_string()
}
fn default_solutions_subdir() -> String {
    "solutions".to_string()
}
fn default_trash_dir() -> String {
    "trash".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadsConfig {
    #[serde(default = "default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "default_max_images")]
    pub max_images_per_request: usize,
    #[serde(default = "default_max_solutions")]
    pub max_solutions_per_request: usize,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_image_mime_types")]
    pub image_mime_types: Vec<String>,
    #[serde(default = "default_document_extensions")]
    pub document_extensions: Vec<String>,
    #[serde(default = "default_document_mime_types")]
    pub document_mime_types: Vec<String>,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: default_max_file_size_mb(),
            max_images_per_request: default_max_images(),
            max_solutions_per_request: default_max_solutions(),
            image_extensions: default_image_extensions(),
            image_mime_types: default_image_mime_types(),
            document_extensions: default_document_extensions(),
            document_mime_types: default_document_mime_types(),
        }
    }
}

impl UploadsConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }
}

fn default_max_file_size_mb() -> u64 {
    10
}
fn default_max_images() -> usize {
    10
}
fn default_max_solutions() -> usize {
    5
}
fn default_image_extensions() -> Vec<String> {
    [".jpg", ".jpeg", ".png", ".gif", ".webp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_image_mime_types() -> Vec<String> {
    [
        "image/jpeg",
        "image/jpg",
        "image/png",
        "image/gif",
        "image/webp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_document_extensions() -> Vec<String> {
    vec![".pdf".to_string()]
}
fn default_document_mime_types() -> Vec<String> {
    vec!["application/pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValidationConfig {
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    #[serde(default = "default_max_scramble_length")]
    pub max_scramble_length: usize,
    #[serde(default = "default_max_time_length")]
    pub max_time_length: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            max_scramble_length: default_max_scramble_length(),
            max_time_length: default_max_time_length(),
        }
    }
}

fn default_max_name_length() -> usize {
    100
}
fn default_max_scramble_length() -> usize {
    500
}
fn default_max_time_length() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// bcrypt hash of the admin password. Auth is disabled when unset.
    #[serde(default)]
    pub admin_password_hash: Option<String>,
    #[serde(default)]
    pub token_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_password_hash: None,
            token_secret: String::new(),
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

impl AuthConfig {
    pub fn is_enabled(&self) -> bool {
        self.admin_password_hash.is_some()
    }
}

fn default_token_ttl_hours() -> u64 {
    12
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate_config(&config)?;

    Ok(config)
}

pub fn validate_config(config: &Config) -> Result<()> {
    // Validate asset layout
    for (key, value) in [
        ("assets.cubes_dir", &config.assets.cubes_dir),
        ("assets.images_subdir", &config.assets.images_subdir),
        ("assets.solutions_subdir", &config.assets.solutions_subdir),
        ("assets.trash_dir", &config.assets.trash_dir),
    ] {
        if !is_single_segment(value) {
            anyhow::bail!("{} must be a single non-empty path segment, got '{}'", key, value);
        }
    }
    if config.assets.images_subdir == config.assets.solutions_subdir {
        anyhow::bail!("assets.images_subdir and assets.solutions_subdir must differ");
    }

    // Validate uploads
    let uploads = &config.uploads;
    if uploads.max_file_size_mb == 0 {
        anyhow::bail!("uploads.max_file_size_mb must be > 0");
    }
    if uploads.max_images_per_request == 0 || uploads.max_solutions_per_request == 0 {
        anyhow::bail!("uploads per-request file limits must be > 0");
    }
    for ext in uploads
        .image_extensions
        .iter()
        .chain(uploads.document_extensions.iter())
    {
        if !ext.starts_with('.') || ext.len() < 2 {
            anyhow::bail!("upload extensions must look like '.ext', got '{}'", ext);
        }
    }

    // Validate field limits
    let v = &config.validation;
    if v.max_name_length == 0 || v.max_scramble_length == 0 || v.max_time_length == 0 {
        anyhow::bail!("validation limits must be > 0");
    }

    // Validate auth
    if config.auth.is_enabled() {
        if config.auth.token_secret.is_empty() {
            anyhow::bail!("auth.token_secret must be set when auth.admin_password_hash is set");
        }
        if config.auth.token_ttl_hours == 0 {
            anyhow::bail!("auth.token_ttl_hours must be > 0");
        }
    }

    Ok(())
}

fn is_single_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}
