use super::{hash_password_blocking, verify_password_blocking};
use crate::{
    ClinicCode, ClinicError, ClinicResult, DoctorPermissions, EmailAddress, NonEmptyText,
    Principal, Role,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub clinic_code: String,
    pub email: String,
    pub display_name: String,
    pub specialty: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Doctor {
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id,
            role: Role::Doctor,
            clinic_id: self.clinic_id,
            clinic_code: self.clinic_code.clone(),
        }
    }
}

#[derive(sqlx::FromRow)]
struct DoctorRow {
    id: Uuid,
    clinic_id: Uuid,
    clinic_code: String,
    email: String,
    display_name: String,
    specialty: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    password_hash: String,
}

impl From<DoctorRow> for Doctor {
    fn from(row: DoctorRow) -> Self {
        Self {
            id: row.id,
            clinic_id: row.clinic_id,
            clinic_code: row.clinic_code,
            email: row.email,
            display_name: row.display_name,
            specialty: row.specialty,
            active: row.active,
            created_at: row.created_at,
        }
    }
}

const SELECT_DOCTOR: &str = "SELECT d.id, d.clinic_id, c.code AS clinic_code, d.email, d.display_name,
        d.specialty, d.active, d.created_at, d.password_hash
     FROM doctors d JOIN clinics c ON c.id = d.clinic_id";

#[derive(Clone, Debug)]
pub struct NewDoctor {
    pub email: EmailAddress,
    pub display_name: NonEmptyText,
    pub password: String,
    pub specialty: Option<NonEmptyText>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct DoctorUpdate {
    pub display_name: Option<NonEmptyText>,
    pub specialty: Option<NonEmptyText>,
    pub active: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct DoctorService {
    pool: PgPool,
}

impl DoctorService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, clinic_id: Uuid) -> ClinicResult<Vec<Doctor>> {
        let rows = sqlx::query_as::<_, DoctorRow>(&format!(
            "{SELECT_DOCTOR} WHERE d.clinic_id = $1 ORDER BY d.display_name, d.id"
        ))
        .bind(clinic_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Doctor::from).collect())
    }

    pub async fn get(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<Doctor> {
        sqlx::query_as::<_, DoctorRow>(&format!(
            "{SELECT_DOCTOR} WHERE d.clinic_id = $1 AND d.id = $2"
        ))
        .bind(clinic_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Doctor::from)
        .ok_or(ClinicError::NotFound("doctor"))
    }

    pub async fn create(&self, clinic_id: Uuid, new: NewDoctor) -> ClinicResult<Doctor> {
        let password_hash = hash_password_blocking(&new.password).await?;
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO doctors (id, clinic_id, email, display_name, specialty, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(id)
        .bind(clinic_id)
        .bind(new.email.as_str())
        .bind(new.display_name.as_str())
        .bind(new.specialty.as_ref().map(NonEmptyText::as_str))
        .bind(&password_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| ClinicError::from_unique_violation(e, "doctor"))?;

        tracing::info!(doctor_id = %id, clinic_id = %clinic_id, "doctor created");
        self.get(clinic_id, id).await
    }

    pub async fn update(
        &self,
        clinic_id: Uuid,
        id: Uuid,
        update: DoctorUpdate,
    ) -> ClinicResult<Doctor> {
        let result = sqlx::query(
            "UPDATE doctors SET
                 display_name = COALESCE($3, display_name),
                 specialty = COALESCE($4, specialty),
                 active = COALESCE($5, active)
             WHERE clinic_id = $1 AND id = $2",
        )
        .bind(clinic_id)
        .bind(id)
        .bind(update.display_name.as_ref().map(NonEmptyText::as_str))
        .bind(update.specialty.as_ref().map(NonEmptyText::as_str))
        .bind(update.active)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ClinicError::NotFound("doctor"));
        }

        if update.active == Some(false) {
            tracing::info!(doctor_id = %id, "doctor deactivated");
        }
        self.get(clinic_id, id).await
    }

    /// Stored permissions, or the defaults when none were ever set.
    pub async fn permissions(&self, clinic_id: Uuid, doctor_id: Uuid) -> ClinicResult<DoctorPermissions> {
        let row: Option<(Option<bool>, Option<bool>, Option<bool>)> = sqlx::query_as(
            "SELECT p.can_view_all_patients, p.can_edit_treatments, p.can_manage_groups
             FROM doctors d LEFT JOIN doctor_permissions p ON p.doctor_id = d.id
             WHERE d.clinic_id = $1 AND d.id = $2",
        )
        .bind(clinic_id)
        .bind(doctor_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Err(ClinicError::NotFound("doctor")),
            Some((Some(view_all), Some(edit), Some(manage))) => Ok(DoctorPermissions {
                can_view_all_patients: view_all,
                can_edit_treatments: edit,
                can_manage_groups: manage,
            }),
            Some(_) => Ok(DoctorPermissions::default()),
        }
    }

    pub async fn set_permissions(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        permissions: DoctorPermissions,
    ) -> ClinicResult<DoctorPermissions> {
        let result = sqlx::query(
            "INSERT INTO doctor_permissions
                 (doctor_id, can_view_all_patients, can_edit_treatments, can_manage_groups)
             SELECT d.id, $3, $4, $5 FROM doctors d WHERE d.clinic_id = $1 AND d.id = $2
             ON CONFLICT (doctor_id) DO UPDATE SET
                 can_view_all_patients = EXCLUDED.can_view_all_patients,
                 can_edit_treatments = EXCLUDED.can_edit_treatments,
                 can_manage_groups = EXCLUDED.can_manage_groups,
                 updated_at = now()",
        )
        .bind(clinic_id)
        .bind(doctor_id)
        .bind(permissions.can_view_all_patients)
        .bind(permissions.can_edit_treatments)
        .bind(permissions.can_manage_groups)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ClinicError::NotFound("doctor"));
        }

        tracing::info!(doctor_id = %doctor_id, ?permissions, "doctor permissions updated");
        Ok(permissions)
    }

    /// Checks credentials and that the account is active.
    pub async fn authenticate(
        &self,
        clinic_code: &ClinicCode,
        email: &EmailAddress,
        password: &str,
    ) -> ClinicResult<Doctor> {
        let row = sqlx::query_as::<_, DoctorRow>(&format!(
            "{SELECT_DOCTOR} WHERE c.code = $1 AND d.email = $2"
        ))
        .bind(clinic_code.as_str())
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ClinicError::InvalidCredentials)?;

        if !verify_password_blocking(password, &row.password_hash).await? {
            tracing::warn!(doctor_id = %row.id, "doctor login with wrong password");
            return Err(ClinicError::InvalidCredentials);
        }
        if !row.active {
            return Err(ClinicError::AccountDisabled);
        }
        Ok(row.into())
    }

    /// Like [`DoctorService::get`], but rejects deactivated accounts. Used on every
    /// doctor request so deactivation takes effect before tokens expire.
    pub async fn require_active(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<Doctor> {
        let doctor = self.get(clinic_id, id).await?;
        if !doctor.active {
            return Err(ClinicError::AccountDisabled);
        }
        Ok(doctor)
    }
}
