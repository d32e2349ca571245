use crate::lifecycle::TreatmentStatus;

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("missing required fields")]
    MissingFields,
    #[error("invalid {field}: {reason}")]
    InvalidInput {
        field: &'static str,
        reason: String,
    },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account disabled")]
    AccountDisabled,
    #[error("permission denied")]
    PermissionDenied,
    #[error("{0} already exists")]
    AlreadyExists(&'static str),
    #[error("cannot move treatment item from {from} to {to}")]
    InvalidStatusTransition {
        from: TreatmentStatus,
        to: TreatmentStatus,
    },
    #[error("treatment group is already cancelled")]
    AlreadyCancelled,
    #[error("invalid pagination cursor")]
    InvalidCursor,

    #[error("invalid token: {0}")]
    InvalidToken(&'static str),
    #[error("failed to sign token: {0}")]
    TokenSigning(String),
    #[error("malformed password hash")]
    MalformedPasswordHash,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("file storage error: {0}")]
    Files(#[from] clinic_files::FilesError),
    #[error("failed to serialize: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ClinicError {
    pub fn invalid(field: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.to_string(),
        }
    }

    /// Maps a Postgres unique-constraint violation to [`ClinicError::AlreadyExists`].
    pub fn from_unique_violation(err: sqlx::Error, entity: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::AlreadyExists(entity),
            _ => Self::Database(err),
        }
    }

    /// Maps a Postgres foreign-key violation to [`ClinicError::NotFound`].
    pub fn from_foreign_key_violation(err: sqlx::Error, entity: &'static str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => Self::NotFound(entity),
            _ => Self::Database(err),
        }
    }
}

pub type ClinicResult<T> = std::result::Result<T, ClinicError>;
