//! Core runtime configuration.
//!
//! This module defines configuration that is resolved once at process startup and then
//! passed into services. Request handling never reads process-wide environment
//! variables; binaries read them and hand the raw values to the parsers below.

use crate::constants::{
    DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_STORAGE_DIR,
    DEFAULT_TOKEN_TTL_HOURS, DEFAULT_VAPID_SUBJECT, MAX_TOKEN_TTL_HOURS, MIN_JWT_SECRET_BYTES,
};
use crate::{ClinicError, ClinicResult};
use chrono::Duration;
use std::path::{Path, PathBuf};

/// Core configuration resolved at startup.
#[derive(Clone)]
pub struct ClinicConfig {
    database_url: String,
    max_connections: u32,
    jwt_secret: Vec<u8>,
    token_ttl: Duration,
    storage_dir: PathBuf,
    max_upload_bytes: usize,
    vapid_private_key: Option<String>,
    vapid_subject: String,
}

impl std::fmt::Debug for ClinicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClinicConfig")
            .field("max_connections", &self.max_connections)
            .field("token_ttl_hours", &self.token_ttl.num_hours())
            .field("storage_dir", &self.storage_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("push_enabled", &self.vapid_private_key.is_some())
            .field("vapid_subject", &self.vapid_subject)
            .finish_non_exhaustive()
    }
}

impl ClinicConfig {
    /// Create a new `ClinicConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ClinicError::Config`] if:
    /// - `database_url` is empty,
    /// - `jwt_secret` is shorter than [`MIN_JWT_SECRET_BYTES`],
    /// - `token_ttl` is not positive,
    /// - `vapid_subject` is not a `mailto:` or `https:` URI.
    pub fn new(
        database_url: String,
        jwt_secret: Vec<u8>,
        token_ttl: Duration,
        storage_dir: PathBuf,
    ) -> ClinicResult<Self> {
        if database_url.trim().is_empty() {
            return Err(ClinicError::Config("DATABASE_URL cannot be empty".into()));
        }
        if jwt_secret.len() < MIN_JWT_SECRET_BYTES {
            return Err(ClinicError::Config(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_BYTES} bytes"
            )));
        }
        if token_ttl <= Duration::zero() {
            return Err(ClinicError::Config("token TTL must be positive".into()));
        }

        Ok(Self {
            database_url,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            jwt_secret,
            token_ttl,
            storage_dir,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            vapid_private_key: None,
            vapid_subject: DEFAULT_VAPID_SUBJECT.into(),
        })
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }

    pub fn with_vapid(
        mut self,
        private_key: Option<String>,
        subject: Option<String>,
    ) -> ClinicResult<Self> {
        self.vapid_private_key = private_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if let Some(subject) = subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()) {
            if !(subject.starts_with("mailto:") || subject.starts_with("https://")) {
                return Err(ClinicError::Config(
                    "VAPID_SUBJECT must be a mailto: or https:// URI".into(),
                ));
            }
            self.vapid_subject = subject;
        }
        Ok(self)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn jwt_secret(&self) -> &[u8] {
        &self.jwt_secret
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn vapid_private_key(&self) -> Option<&str> {
        self.vapid_private_key.as_deref()
    }

    pub fn vapid_subject(&self) -> &str {
        &self.vapid_subject
    }
}

/// Parse the token lifetime from an optional string value (whole hours).
///
/// If `value` is `None` or empty/whitespace, returns [`DEFAULT_TOKEN_TTL_HOURS`].
pub fn token_ttl_from_env_value(value: Option<String>) -> ClinicResult<Duration> {
    let hours = match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => DEFAULT_TOKEN_TTL_HOURS,
        Some(v) => v
            .parse::<i64>()
            .map_err(|_| ClinicError::Config(format!("TOKEN_TTL_HOURS is not a number: {v}")))?,
    };
    if !(1..=MAX_TOKEN_TTL_HOURS).contains(&hours) {
        return Err(ClinicError::Config(format!(
            "TOKEN_TTL_HOURS must be between 1 and {MAX_TOKEN_TTL_HOURS}"
        )));
    }
    Ok(Duration::hours(hours))
}

/// Parse a boolean flag such as `RUN_MIGRATIONS`; unset means `default`.
pub fn flag_from_env_value(value: Option<String>, default: bool) -> ClinicResult<bool> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ClinicError::Config(format!("not a boolean: {other}"))),
    }
}

/// Parse a positive integer such as `DATABASE_MAX_CONNECTIONS`; unset means `default`.
pub fn positive_from_env_value<T>(value: Option<String>, default: T, name: &str) -> ClinicResult<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(v) => match v.parse::<T>() {
            Ok(n) if n > T::default() => Ok(n),
            _ => Err(ClinicError::Config(format!(
                "{name} must be a positive integer"
            ))),
        },
    }
}

/// Resolve the upload storage root, creating it when missing.
pub fn resolve_storage_dir(override_dir: Option<PathBuf>) -> ClinicResult<PathBuf> {
    let dir = override_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
    if dir.exists() && !dir.is_dir() {
        return Err(ClinicError::Config(format!(
            "storage path is not a directory: {}",
            dir.display()
        )));
    }
    std::fs::create_dir_all(&dir).map_err(|e| {
        ClinicError::Config(format!(
            "cannot create storage directory {}: {e}",
            dir.display()
        ))
    })?;
    Ok(dir)
}
