//! Constants used throughout the clinic core crate.

/// Default listen address for the REST server.
pub const DEFAULT_REST_ADDR: &str = "0.0.0.0:3000";

/// Default directory holding upload buckets when none is configured.
pub const DEFAULT_STORAGE_DIR: &str = "storage";

/// Default token lifetime in hours.
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 12;

/// Longest accepted token lifetime in hours (30 days).
pub const MAX_TOKEN_TTL_HOURS: i64 = 720;

/// Minimum length of `JWT_SECRET` in bytes.
pub const MIN_JWT_SECRET_BYTES: usize = 32;

/// Default pool size for Postgres connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default upload size cap (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Default VAPID subject when none is configured.
pub const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@localhost";

/// Timeline page size bounds.
pub const DEFAULT_TIMELINE_LIMIT: i64 = 50;
pub const MAX_TIMELINE_LIMIT: i64 = 100;

/// ICD-10 search page size bounds.
pub const DEFAULT_ICD10_LIMIT: i64 = 20;
pub const MAX_ICD10_LIMIT: i64 = 50;

/// Longest free-text field accepted (notes, descriptions).
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Longest short name accepted (group names, plan titles, person names).
pub const MAX_NAME_CHARS: usize = 200;
