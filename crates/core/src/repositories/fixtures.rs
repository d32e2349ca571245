//! Database fixtures for `#[sqlx::test]` cases.

use super::patients::{NewPatient, PatientService};
use crate::{NonEmptyText, Principal, Role};
use sqlx::PgPool;
use uuid::Uuid;

/// Creates a clinic and returns an admin principal for it. The admin has no row;
/// nothing below the API layer looks one up.
pub(crate) async fn clinic(pool: &PgPool) -> Principal {
    let id = Uuid::new_v4();
    let code = format!("clinic-{}", &id.simple().to_string()[..8]);
    sqlx::query("INSERT INTO clinics (id, code, name) VALUES ($1, $2, 'Smile Dental')")
        .bind(id)
        .bind(&code)
        .execute(pool)
        .await
        .unwrap();
    Principal {
        id: Uuid::new_v4(),
        role: Role::Admin,
        clinic_id: id,
        clinic_code: code,
    }
}

/// Inserts an active doctor directly, skipping password hashing.
pub(crate) async fn doctor(pool: &PgPool, admin: &Principal, name: &str) -> Principal {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO doctors (id, clinic_id, email, display_name, password_hash)
         VALUES ($1, $2, $3, $4, 'unused')",
    )
    .bind(id)
    .bind(admin.clinic_id)
    .bind(format!("{}@smile.example", id.simple()))
    .bind(name)
    .execute(pool)
    .await
    .unwrap();
    Principal {
        id,
        role: Role::Doctor,
        clinic_id: admin.clinic_id,
        clinic_code: admin.clinic_code.clone(),
    }
}

pub(crate) async fn patient(pool: &PgPool, admin: &Principal, first: &str, last: &str) -> Uuid {
    let new = NewPatient {
        first_name: NonEmptyText::new(first).unwrap(),
        last_name: NonEmptyText::new(last).unwrap(),
        email: None,
        phone: None,
        birth_date: None,
        password: None,
    };
    PatientService::new(pool.clone())
        .create(admin, new)
        .await
        .unwrap()
        .id
}

pub(crate) async fn icd10(pool: &PgPool, code: &str, description: &str) {
    sqlx::query("INSERT INTO icd10_codes (code, description) VALUES ($1, $2)")
        .bind(code)
        .bind(description)
        .execute(pool)
        .await
        .unwrap();
}
