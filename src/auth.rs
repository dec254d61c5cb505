//! Admin authentication.
//!
//! The admin password is checked against a bcrypt hash from `[auth]`. A
//! successful login yields a bearer token of the form
//! `<expiry-unix-secs>.<hex HMAC-SHA256(secret, expiry)>`; mutating routes
//! require it in the `Authorization` header. With no hash configured,
//! authentication is disabled and every caller is treated as the admin.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::{CatalogError, Result};

type HmacSha256 = Hmac<Sha256>;

/// A freshly issued session token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Unix timestamp (seconds) after which the token is rejected.
    pub expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    password_hash: Option<String>,
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl Authenticator {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            password_hash: config.admin_password_hash.clone(),
            secret: config.token_secret.as_bytes().to_vec(),
            ttl_secs: (config.token_ttl_hours as i64).saturating_mul(3600),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Verifies the admin password and issues a token.
    ///
    /// Returns `Ok(None)` when authentication is disabled.
    pub fn login(&self, password: &str) -> Result<Option<IssuedToken>> {
        let Some(hash) = &self.password_hash else {
            return Ok(None);
        };
        let valid = bcrypt::verify(password, hash).unwrap_or_else(|e| {
            warn!(error = %e, "admin password hash could not be checked");
            false
        });
        if !valid {
            return Err(CatalogError::Unauthorized);
        }
        let expires_at = Utc::now().timestamp().saturating_add(self.ttl_secs);
        Ok(Some(IssuedToken {
            token: self.sign(expires_at),
            expires_at,
        }))
    }

    /// Checks an `Authorization` header value.
    pub fn authorize(&self, header: Option<&str>) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let token = header
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(CatalogError::Unauthorized)?;
        if self.verify(token, Utc::now().timestamp()) {
            Ok(())
        } else {
            debug!("rejected bearer token");
            Err(CatalogError::Unauthorized)
        }
    }

    fn mac(&self, expires_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(expires_at.to_string().as_bytes());
        mac
    }

    fn sign(&self, expires_at: i64) -> String {
        let tag = self.mac(expires_at).finalize().into_bytes();
        format!("{}.{}", expires_at, hex::encode(tag))
    }

    fn verify(&self, token: &str, now: i64) -> bool {
        let Some((expiry, tag)) = token.split_once('.') else {
            return false;
        };
        let Ok(expires_at) = expiry.parse::<i64>() else {
            return false;
        };
        if expires_at <= now {
            return false;
        }
        let Ok(tag) = hex::decode(tag) else {
            return false;
        };
        self.mac(expires_at).verify_slice(&tag).is_ok()
    }
}
