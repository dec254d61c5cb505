//! Error taxonomy shared by the record store, asset manager, and HTTP layer.
//!
//! Every variant maps to exactly one HTTP status (see
//! [`CatalogError::status_code`]). Client errors carry a human-readable
//! message that is returned verbatim; server errors are logged and replaced
//! with a generic message before leaving the process.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// A field is missing, oversized, or malformed.
    #[error("{0}")]
    Validation(String),

    #[error("invalid id: {0:?}")]
    InvalidId(String),

    /// An asset path that does not resolve inside the asset tree.
    #[error("invalid asset path: {0}")]
    InvalidPath(String),

    #[error("authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("a record with id {0:?} already exists")]
    Conflict(String),

    #[error("store document is corrupt: {0}")]
    CorruptStore(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// HTTP status code for this error class.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::InvalidId(_) | Self::InvalidPath(_) => 400,
            Self::Unauthorized => 401,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::CorruptStore(_) | Self::Io(_) | Self::Json(_) => 500,
        }
    }

    /// Machine-readable code used in the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_request",
            Self::InvalidId(_) => "invalid_id",
            Self::InvalidPath(_) => "invalid_path",
            Self::Unauthorized => "unauthorized",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::CorruptStore(_) | Self::Io(_) | Self::Json(_) => "internal",
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status_code() >= 500
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CatalogError::validation("name is required").status_code(), 400);
        assert_eq!(CatalogError::InvalidId("../x".into()).status_code(), 400);
        assert_eq!(CatalogError::Unauthorized.status_code(), 401);
        assert_eq!(CatalogError::NotFound("record 7".into()).status_code(), 404);
        assert_eq!(CatalogError::Conflict("5".into()).status_code(), 409);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        assert!(CatalogError::from(io).is_internal());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            CatalogError::NotFound("record 7".into()).to_string(),
            "record 7 not found"
        );
        assert_eq!(
            CatalogError::Conflict("5".into()).to_string(),
            "a record with id \"5\" already exists"
        );
    }
}
