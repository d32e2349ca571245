use super::timeline::insert_event;
use super::{escape_like, hash_password_blocking, verify_password_blocking};
use crate::timeline::NewTimelineEvent;
use crate::{
    ClinicCode, ClinicError, ClinicResult, EmailAddress, EventType, NonEmptyText, Principal, Role,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Whether the patient has portal credentials.
    pub has_login: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

const PATIENT_COLUMNS: &str = "p.id, p.clinic_id, p.first_name, p.last_name, p.email, p.phone,
    p.birth_date, p.password_hash IS NOT NULL AS has_login, p.created_at, p.updated_at";

#[derive(Clone, Debug)]
pub struct NewPatient {
    pub first_name: NonEmptyText,
    pub last_name: NonEmptyText,
    pub email: Option<EmailAddress>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub password: Option<String>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct PatientUpdate {
    pub first_name: Option<NonEmptyText>,
    pub last_name: Option<NonEmptyText>,
    pub email: Option<EmailAddress>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub password: Option<String>,
}

impl PatientUpdate {
    /// Names of the fields this update touches, for the timeline.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.first_name.is_some() {
            fields.push("firstName");
        }
        if self.last_name.is_some() {
            fields.push("lastName");
        }
        if self.email.is_some() {
            fields.push("email");
        }
        if self.phone.is_some() {
            fields.push("phone");
        }
        if self.birth_date.is_some() {
            fields.push("birthDate");
        }
        if self.password.is_some() {
            fields.push("password");
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.field_names().is_empty()
    }
}

/// Loads a patient inside a clinic, failing with `patient` not found otherwise.
pub(crate) async fn require_patient(
    conn: &mut PgConnection,
    clinic_id: Uuid,
    patient_id: Uuid,
) -> ClinicResult<Patient> {
    sqlx::query_as::<_, Patient>(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.clinic_id = $1 AND p.id = $2"
    ))
    .bind(clinic_id)
    .bind(patient_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(ClinicError::NotFound("patient"))
}

#[derive(Clone, Debug)]
pub struct PatientService {
    pool: PgPool,
}

impl PatientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lists patients by name. `search` matches first name, last name or email.
    pub async fn list(&self, clinic_id: Uuid, search: Option<&str>) -> ClinicResult<Vec<Patient>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)));
        Ok(sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients p
             WHERE p.clinic_id = $1
               AND ($2::text IS NULL
                    OR p.first_name ILIKE $2 OR p.last_name ILIKE $2 OR p.email ILIKE $2
                    OR (p.first_name || ' ' || p.last_name) ILIKE $2)
             ORDER BY p.last_name, p.first_name, p.id"
        ))
        .bind(clinic_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Patients a doctor may see: everyone when `view_all`, otherwise those the doctor
    /// has recorded an encounter for or is assigned to through a treatment group.
    pub async fn list_for_doctor(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        view_all: bool,
    ) -> ClinicResult<Vec<Patient>> {
        Ok(sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients p
             WHERE p.clinic_id = $1
               AND ($3 OR {DOCTOR_LINK})
             ORDER BY p.last_name, p.first_name, p.id"
        ))
        .bind(clinic_id)
        .bind(doctor_id)
        .bind(view_all)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Fails with [`ClinicError::PermissionDenied`] when the doctor may not see the patient.
    pub async fn ensure_doctor_access(
        &self,
        clinic_id: Uuid,
        doctor_id: Uuid,
        patient_id: Uuid,
        view_all: bool,
    ) -> ClinicResult<()> {
        let visible: Option<bool> = sqlx::query_scalar(&format!(
            "SELECT ($4 OR {DOCTOR_LINK}) FROM patients p WHERE p.clinic_id = $1 AND p.id = $3"
        ))
        .bind(clinic_id)
        .bind(doctor_id)
        .bind(patient_id)
        .bind(view_all)
        .fetch_optional(&self.pool)
        .await?;

        match visible {
            None => Err(ClinicError::NotFound("patient")),
            Some(false) => Err(ClinicError::PermissionDenied),
            Some(true) => Ok(()),
        }
    }

    pub async fn get(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<Patient> {
        let mut conn = self.pool.acquire().await?;
        require_patient(&mut conn, clinic_id, id).await
    }

    pub async fn create(&self, actor: &Principal, new: NewPatient) -> ClinicResult<Patient> {
        let password_hash = match new.password.as_deref() {
            Some(password) => Some(hash_password_blocking(password).await?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        let patient = sqlx::query_as::<_, Patient>(
            "INSERT INTO patients AS p
                 (id, clinic_id, first_name, last_name, email, phone, birth_date, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING p.id, p.clinic_id, p.first_name, p.last_name, p.email, p.phone,
                 p.birth_date, p.password_hash IS NOT NULL AS has_login, p.created_at, p.updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(actor.clinic_id)
        .bind(new.first_name.as_str())
        .bind(new.last_name.as_str())
        .bind(new.email.as_ref().map(EmailAddress::as_str))
        .bind(new.phone.as_deref())
        .bind(new.birth_date)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ClinicError::from_unique_violation(e, "patient"))?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::PatientCreated,
                json!({ "patientName": patient.full_name() }),
            )
            .for_patient(patient.id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(patient_id = %patient.id, "patient created");
        Ok(patient)
    }

    /// Applies a partial update and records which fields changed.
    pub async fn update(
        &self,
        actor: &Principal,
        id: Uuid,
        update: PatientUpdate,
    ) -> ClinicResult<Patient> {
        if update.is_empty() {
            return Err(ClinicError::MissingFields);
        }
        let password_hash = match update.password.as_deref() {
            Some(password) => Some(hash_password_blocking(password).await?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE patients SET
                 first_name = COALESCE($3, first_name),
                 last_name = COALESCE($4, last_name),
                 email = COALESCE($5, email),
                 phone = COALESCE($6, phone),
                 birth_date = COALESCE($7, birth_date),
                 password_hash = COALESCE($8, password_hash),
                 updated_at = now()
             WHERE clinic_id = $1 AND id = $2",
        )
        .bind(actor.clinic_id)
        .bind(id)
        .bind(update.first_name.as_ref().map(NonEmptyText::as_str))
        .bind(update.last_name.as_ref().map(NonEmptyText::as_str))
        .bind(update.email.as_ref().map(EmailAddress::as_str))
        .bind(update.phone.as_deref())
        .bind(update.birth_date)
        .bind(password_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| ClinicError::from_unique_violation(e, "patient"))?;
        if updated.rows_affected() == 0 {
            return Err(ClinicError::NotFound("patient"));
        }

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::PatientUpdated,
                json!({ "fields": update.field_names() }),
            )
            .for_patient(id),
        )
        .await?;
        let patient = require_patient(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;
        Ok(patient)
    }

    /// Deletes a patient and, through cascades, their clinical records and files.
    pub async fn delete(&self, actor: &Principal, id: Uuid) -> ClinicResult<()> {
        let mut tx = self.pool.begin().await?;
        let patient = require_patient(&mut tx, actor.clinic_id, id).await?;

        sqlx::query("DELETE FROM patients WHERE clinic_id = $1 AND id = $2")
            .bind(actor.clinic_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::PatientDeleted,
                json!({ "patientId": patient.id, "patientName": patient.full_name() }),
            ),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(patient_id = %id, "patient deleted");
        Ok(())
    }

    /// Checks portal credentials. Patients without a password cannot log in.
    pub async fn authenticate(
        &self,
        clinic_code: &ClinicCode,
        email: &EmailAddress,
        password: &str,
    ) -> ClinicResult<(Principal, Patient)> {
        #[derive(sqlx::FromRow)]
        struct LoginRow {
            id: Uuid,
            clinic_code: String,
            password_hash: Option<String>,
        }

        let row = sqlx::query_as::<_, LoginRow>(
            "SELECT p.id, c.code AS clinic_code, p.password_hash
             FROM patients p JOIN clinics c ON c.id = p.clinic_id
             WHERE c.code = $1 AND p.email = $2",
        )
        .bind(clinic_code.as_str())
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ClinicError::InvalidCredentials)?;

        let Some(stored) = row.password_hash.as_deref() else {
            return Err(ClinicError::InvalidCredentials);
        };
        if !verify_password_blocking(password, stored).await? {
            tracing::warn!(patient_id = %row.id, "patient login with wrong password");
            return Err(ClinicError::InvalidCredentials);
        }

        let patient = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients p WHERE p.id = $1"
        ))
        .bind(row.id)
        .fetch_one(&self.pool)
        .await?;
        let principal = Principal {
            id: patient.id,
            role: Role::Patient,
            clinic_id: patient.clinic_id,
            clinic_code: row.clinic_code,
        };
        Ok((principal, patient))
    }
}

/// SQL predicate over `p` (patients), `$1` (clinic) and `$2` (doctor).
const DOCTOR_LINK: &str = "(EXISTS (SELECT 1 FROM encounters e
                  WHERE e.patient_id = p.id AND e.doctor_id = $2)
             OR EXISTS (SELECT 1 FROM treatment_groups g
                  JOIN treatment_group_doctors gd ON gd.group_id = g.id
                  WHERE g.clinic_id = $1 AND g.patient_id = p.id AND gd.doctor_id = $2))";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::fixtures;

    #[test]
    fn test_update_field_names() {
        let update = PatientUpdate {
            email: Some(EmailAddress::parse("a@b.example").unwrap()),
            phone: Some("0123 456".into()),
            ..Default::default()
        };
        assert_eq!(update.field_names(), vec!["email", "phone"]);
        assert!(!update.is_empty());
        assert!(PatientUpdate::default().is_empty());
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn test_doctor_access_follows_links(pool: PgPool) {
        let admin = fixtures::clinic(&pool).await;
        let doctor = fixtures::doctor(&pool, &admin, "Dr Ames").await;
        let patient_id = fixtures::patient(&pool, &admin, "Ann", "Lee").await;
        let patients = PatientService::new(pool.clone());
        let clinic_id = admin.clinic_id;

        assert!(matches!(
            patients.ensure_doctor_access(clinic_id, doctor.id, patient_id, false).await,
            Err(ClinicError::PermissionDenied)
        ));
        patients
            .ensure_doctor_access(clinic_id, doctor.id, patient_id, true)
            .await
            .unwrap();
        assert!(patients
            .list_for_doctor(clinic_id, doctor.id, false)
            .await
            .unwrap()
            .is_empty());

        sqlx::query(
            "INSERT INTO encounters (id, clinic_id, patient_id, doctor_id, occurred_at)
             VALUES ($1, $2, $3, $4, now())",
        )
        .bind(Uuid::new_v4())
        .bind(clinic_id)
        .bind(patient_id)
        .bind(doctor.id)
        .execute(&pool)
        .await
        .unwrap();

        patients
            .ensure_doctor_access(clinic_id, doctor.id, patient_id, false)
            .await
            .unwrap();
        assert_eq!(
            patients.list_for_doctor(clinic_id, doctor.id, false).await.unwrap().len(),
            1
        );
        assert!(matches!(
            patients.ensure_doctor_access(clinic_id, doctor.id, Uuid::new_v4(), false).await,
            Err(ClinicError::NotFound("patient"))
        ));

        let elsewhere = fixtures::clinic(&pool).await;
        assert!(matches!(
            patients.get(elsewhere.clinic_id, patient_id).await,
            Err(ClinicError::NotFound("patient"))
        ));
    }
}
