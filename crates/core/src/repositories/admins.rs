use super::{hash_password_blocking, verify_password_blocking};
use crate::{
    ClinicCode, ClinicError, ClinicResult, EmailAddress, NonEmptyText, Principal, Role,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub clinic_code: String,
    pub email: String,
    pub display_name: String,
    pub is_super: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: Uuid,
    clinic_id: Uuid,
    clinic_code: String,
    email: String,
    display_name: String,
    is_super: bool,
    created_at: DateTime<Utc>,
    password_hash: String,
}

impl From<AdminRow> for Admin {
    fn from(row: AdminRow) -> Self {
        Self {
            id: row.id,
            clinic_id: row.clinic_id,
            clinic_code: row.clinic_code,
            email: row.email,
            display_name: row.display_name,
            is_super: row.is_super,
            created_at: row.created_at,
        }
    }
}

impl Admin {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            role: Role::Admin,
            clinic_id: self.clinic_id,
            clinic_code: self.clinic_code.clone(),
        }
    }
}

const SELECT_ADMIN: &str = "SELECT a.id, a.clinic_id, c.code AS clinic_code, a.email, a.display_name,
        a.is_super, a.created_at, a.password_hash
     FROM admins a JOIN clinics c ON c.id = a.clinic_id";

#[derive(Clone, Debug)]
pub struct AdminService {
    pool: PgPool,
}

impl AdminService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        clinic_id: Uuid,
        email: &EmailAddress,
        display_name: &NonEmptyText,
        password: &str,
        is_super: bool,
    ) -> ClinicResult<Admin> {
        let password_hash = hash_password_blocking(password).await?;
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO admins (id, clinic_id, email, display_name, password_hash, is_super)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(clinic_id)
        .bind(email.as_str())
        .bind(display_name.as_str())
        .bind(&password_hash)
        .bind(is_super)
        .execute(&self.pool)
        .await
        .map_err(|e| match ClinicError::from_unique_violation(e, "admin") {
            ClinicError::Database(e) => ClinicError::from_foreign_key_violation(e, "clinic"),
            other => other,
        })?;

        tracing::info!(admin_id = %id, clinic_id = %clinic_id, "admin created");
        self.get(clinic_id, id).await
    }

    pub async fn get(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<Admin> {
        sqlx::query_as::<_, AdminRow>(&format!(
            "{SELECT_ADMIN} WHERE a.clinic_id = $1 AND a.id = $2"
        ))
        .bind(clinic_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Admin::from)
        .ok_or(ClinicError::NotFound("admin"))
    }

    /// Checks credentials. Unknown clinic, unknown email and wrong password are
    /// indistinguishable to the caller.
    pub async fn authenticate(
        &self,
        clinic_code: &ClinicCode,
        email: &EmailAddress,
        password: &str,
    ) -> ClinicResult<Admin> {
        let row = sqlx::query_as::<_, AdminRow>(&format!(
            "{SELECT_ADMIN} WHERE c.code = $1 AND a.email = $2"
        ))
        .bind(clinic_code.as_str())
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ClinicError::InvalidCredentials)?;

        if !verify_password_blocking(password, &row.password_hash).await? {
            tracing::warn!(admin_id = %row.id, "admin login with wrong password");
            return Err(ClinicError::InvalidCredentials);
        }
        Ok(row.into())
    }
}
