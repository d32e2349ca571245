//! Postgres-backed services.
//!
//! Each service wraps a [`PgPool`] and scopes every query by clinic. Writes that record a
//! timeline event run in one transaction with the event insert.

pub mod admins;
pub mod clinics;
pub mod doctors;
pub mod files;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod icd10;
pub mod notes;
pub mod patients;
pub mod push_subscriptions;
pub mod timeline;
pub mod treatment_groups;
pub mod treatments;

pub use admins::{Admin, AdminService};
pub use clinics::{Clinic, ClinicService};
pub use doctors::{Doctor, DoctorService, DoctorUpdate, NewDoctor};
pub use files::{PatientFile, PatientFileService};
pub use icd10::{Icd10Entry, Icd10Service};
pub use notes::{Note, NoteService};
pub use patients::{NewPatient, Patient, PatientService, PatientUpdate};
pub use push_subscriptions::{PushSubscriptionService, StoredSubscription};
pub use timeline::{TimelineQuery, TimelineService};
pub use treatment_groups::{
    GroupCancellation, GroupDoctor, GroupFilter, GroupUpdate, NewGroup, TreatmentGroup,
    TreatmentGroupDetail, TreatmentGroupService,
};
pub use treatments::{
    Diagnosis, Encounter, NewItem, StatusChange, TreatmentItem, TreatmentPlan, TreatmentService,
};

use crate::{password, ClinicResult};

/// Runs PBKDF2 verification on the blocking pool.
pub(crate) async fn verify_password_blocking(password: &str, stored: &str) -> ClinicResult<bool> {
    let (password, stored) = (password.to_owned(), stored.to_owned());
    tokio::task::spawn_blocking(move || password::verify_password(&password, &stored)).await?
}

pub(crate) async fn hash_password_blocking(password: &str) -> ClinicResult<String> {
    password::check_policy(password)?;
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || password::hash_password(&password)).await?
}

/// Escapes `%`, `_` and `\` for use inside a `LIKE` pattern.
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("caries"), "caries");
    }

    #[tokio::test]
    async fn test_blocking_password_helpers() {
        let stored = crate::password::hash_with_iterations("password123", 1_000);
        assert!(verify_password_blocking("password123", &stored).await.unwrap());
        assert!(!verify_password_blocking("password124", &stored).await.unwrap());
        assert!(hash_password_blocking("short").await.is_err());
    }
}
