//! Shared application state and startup configuration.

use std::path::PathBuf;
use std::sync::Arc;

use clinic_core::config::{
    flag_from_env_value, positive_from_env_value, resolve_storage_dir, token_ttl_from_env_value,
};
use clinic_core::repositories::{
    AdminService, DoctorService, Icd10Service, NoteService, PatientFileService, PatientService,
    PushSubscriptionService, TimelineService, TreatmentGroupService, TreatmentService,
};
use clinic_core::{ClinicConfig, TokenService, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_UPLOAD_BYTES};
use clinic_push::{PushService, VapidKeys};
use sqlx::postgres::{PgPool, PgPoolOptions};

/// Application state for the REST API server
///
/// Holds one handle per service; every service wraps the same pool and is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<ClinicConfig>,
    pub tokens: TokenService,
    pub admins: AdminService,
    pub doctors: DoctorService,
    pub patients: PatientService,
    pub notes: NoteService,
    pub icd10: Icd10Service,
    pub treatments: TreatmentService,
    pub groups: TreatmentGroupService,
    pub timeline: TimelineService,
    pub files: PatientFileService,
    pub subscriptions: PushSubscriptionService,
    pub push: Arc<PushService>,
}

impl AppState {
    /// Builds the state from a pool and resolved configuration.
    ///
    /// # Errors
    /// Returns an error if the configured VAPID private key cannot be decoded.
    pub fn new(pool: PgPool, cfg: ClinicConfig) -> anyhow::Result<Self> {
        let vapid = cfg
            .vapid_private_key()
            .map(VapidKeys::from_base64_private)
            .transpose()?;
        if vapid.is_none() {
            tracing::warn!("VAPID_PRIVATE_KEY not set; push notifications are disabled");
        }
        let push = PushService::new(vapid, cfg.vapid_subject())?;

        Ok(Self {
            tokens: TokenService::from_config(&cfg),
            admins: AdminService::new(pool.clone()),
            doctors: DoctorService::new(pool.clone()),
            patients: PatientService::new(pool.clone()),
            notes: NoteService::new(pool.clone()),
            icd10: Icd10Service::new(pool.clone()),
            treatments: TreatmentService::new(pool.clone()),
            groups: TreatmentGroupService::new(pool.clone()),
            timeline: TimelineService::new(pool.clone()),
            files: PatientFileService::new(pool.clone(), cfg.storage_dir(), cfg.max_upload_bytes()),
            subscriptions: PushSubscriptionService::new(pool),
            push: Arc::new(push),
            cfg: Arc::new(cfg),
        })
    }
}

/// Reads the server configuration from the process environment.
///
/// # Errors
/// Returns an error if a required variable is missing or any value fails validation.
pub fn config_from_env() -> anyhow::Result<ClinicConfig> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let jwt_secret =
        std::env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
    let token_ttl = token_ttl_from_env_value(std::env::var("TOKEN_TTL_HOURS").ok())?;
    let storage_dir =
        resolve_storage_dir(std::env::var("CLINIC_STORAGE_DIR").ok().map(PathBuf::from))?;

    let cfg = ClinicConfig::new(database_url, jwt_secret.into_bytes(), token_ttl, storage_dir)?
        .with_max_connections(positive_from_env_value(
            std::env::var("DATABASE_MAX_CONNECTIONS").ok(),
            DEFAULT_MAX_CONNECTIONS,
            "DATABASE_MAX_CONNECTIONS",
        )?)
        .with_max_upload_bytes(positive_from_env_value(
            std::env::var("MAX_UPLOAD_BYTES").ok(),
            DEFAULT_MAX_UPLOAD_BYTES,
            "MAX_UPLOAD_BYTES",
        )?)
        .with_vapid(
            std::env::var("VAPID_PRIVATE_KEY").ok(),
            std::env::var("VAPID_SUBJECT").ok(),
        )?;
    Ok(cfg)
}

/// Whether embedded migrations should run at startup (`RUN_MIGRATIONS`, default on).
pub fn run_migrations_from_env() -> anyhow::Result<bool> {
    Ok(flag_from_env_value(std::env::var("RUN_MIGRATIONS").ok(), true)?)
}

/// Opens the connection pool and, when enabled, applies migrations.
pub async fn connect(cfg: &ClinicConfig, run_migrations: bool) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections())
        .connect(cfg.database_url())
        .await?;
    if run_migrations {
        clinic_core::MIGRATOR.run(&pool).await?;
        tracing::info!("database migrations applied");
    }
    Ok(pool)
}
