use crate::{ClinicCode, ClinicError, ClinicResult, NonEmptyText};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Tenant records. Clinics are created by operators through the CLI.
#[derive(Clone, Debug)]
pub struct ClinicService {
    pool: PgPool,
}

impl ClinicService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, code: &ClinicCode, name: &NonEmptyText) -> ClinicResult<Clinic> {
        let clinic = sqlx::query_as::<_, Clinic>(
            "INSERT INTO clinics (id, code, name) VALUES ($1, $2, $3)
             RETURNING id, code, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(code.as_str())
        .bind(name.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ClinicError::from_unique_violation(e, "clinic"))?;

        tracing::info!(clinic_id = %clinic.id, code = %clinic.code, "clinic created");
        Ok(clinic)
    }

    pub async fn find_by_code(&self, code: &ClinicCode) -> ClinicResult<Option<Clinic>> {
        Ok(sqlx::query_as::<_, Clinic>(
            "SELECT id, code, name, created_at FROM clinics WHERE code = $1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn require_by_code(&self, code: &ClinicCode) -> ClinicResult<Clinic> {
        self.find_by_code(code)
            .await?
            .ok_or(ClinicError::NotFound("clinic"))
    }
}
