//! Doctor endpoints: visible patients and treatment records.
//!
//! Reads of a patient's records require the patient to be visible to the doctor; writes
//! additionally require `canEditTreatments`.

use api_shared::{
    CreateDiagnosisReq, CreateEncounterReq, CreateItemReq, CreatePlanReq, DiagnosisRes,
    EncounterRes, ErrorRes, FilesRes, ItemRes, OkRes, PatientsRes, PlanRes, TreatmentsRes,
    UpdateItemStatusReq,
};
use axum::extract::State;
use axum::response::Json;
use clinic_core::repositories::{NewItem, StatusChange};
use clinic_core::validation::{optional_body, optional_tooth, required_name, required_text, tooth};
use clinic_core::{ClinicError, Icd10Code, TreatmentStatus, MAX_NAME_CHARS};
use clinic_push::PushPayload;
use uuid::Uuid;

use crate::error::{ApiResult, OrFailed};
use crate::extract::{ApiJson, ApiPath, DoctorAuth};
use crate::notify;
use crate::state::AppState;

impl DoctorAuth {
    pub(crate) async fn ensure_patient_access(
        &self,
        state: &AppState,
        patient_id: Uuid,
    ) -> ApiResult<()> {
        state
            .patients
            .ensure_doctor_access(
                self.principal.clinic_id,
                self.principal.id,
                patient_id,
                self.permissions.can_view_all_patients,
            )
            .await?;
        Ok(())
    }
}

/// The patient-facing notification for a status change, if the new status warrants one.
fn status_notification(change: &StatusChange) -> Option<PushPayload> {
    if !change.changed || !change.item.status.notifies_patient() {
        return None;
    }
    let item = &change.item;
    let body = match item.status {
        TreatmentStatus::Approved => {
            format!("{} on tooth {} has been approved", item.procedure_code, item.tooth)
        }
        TreatmentStatus::Planned => {
            format!("{} on tooth {} has been scheduled", item.procedure_code, item.tooth)
        }
        _ => format!("{} on tooth {} is complete", item.procedure_code, item.tooth),
    };
    Some(PushPayload {
        title: "Treatment update".into(),
        body,
        url: Some("/treatments".into()),
    })
}

#[utoipa::path(
    get,
    path = "/api/doctor/patients",
    responses((status = 200, description = "Patients visible to the doctor", body = PatientsRes)),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_patients(
    State(state): State<AppState>,
    auth: DoctorAuth,
) -> ApiResult<Json<PatientsRes>> {
    let patients = state
        .patients
        .list_for_doctor(
            auth.principal.clinic_id,
            auth.principal.id,
            auth.permissions.can_view_all_patients,
        )
        .await?;
    Ok(Json(PatientsRes {
        ok: true,
        patients: patients.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/doctor/patients/{id}/treatments",
    params(("id" = Uuid, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Encounters with diagnoses, plans and items", body = TreatmentsRes),
        (status = 403, description = "Patient not visible to this doctor", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn patient_treatments(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> ApiResult<Json<TreatmentsRes>> {
    auth.ensure_patient_access(&state, patient_id).await?;
    let encounters = state
        .treatments
        .patient_treatments(auth.principal.clinic_id, patient_id)
        .await?;
    Ok(Json(TreatmentsRes {
        ok: true,
        encounters: encounters.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/doctor/patients/{id}/files",
    params(("id" = Uuid, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Files of the patient", body = FilesRes),
        (status = 403, description = "Patient not visible to this doctor", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn patient_files(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> ApiResult<Json<FilesRes>> {
    auth.ensure_patient_access(&state, patient_id).await?;
    let files = state
        .files
        .list(auth.principal.clinic_id, patient_id)
        .await?;
    Ok(Json(FilesRes {
        ok: true,
        files: files.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/encounters",
    request_body = CreateEncounterReq,
    responses(
        (status = 200, description = "Encounter recorded", body = EncounterRes),
        (status = 403, description = "Missing canEditTreatments", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_encounter(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiJson(req): ApiJson<CreateEncounterReq>,
) -> ApiResult<Json<EncounterRes>> {
    auth.permissions.require_edit_treatments()?;
    let patient_id = req.patient_id.ok_or(ClinicError::MissingFields)?;
    let notes = optional_body(req.notes.as_deref(), "notes")?;
    let encounter = state
        .treatments
        .create_encounter(&auth.principal, patient_id, req.occurred_at, notes.as_ref())
        .await
        .or_failed("create_encounter")?;
    Ok(Json(EncounterRes {
        ok: true,
        encounter: encounter.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/encounters/{id}/diagnoses",
    params(("id" = Uuid, Path, description = "Encounter id")),
    request_body = CreateDiagnosisReq,
    responses(
        (status = 200, description = "Diagnosis added", body = DiagnosisRes),
        (status = 400, description = "Invalid ICD-10 code or tooth", body = ErrorRes),
        (status = 404, description = "Encounter or code not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn add_diagnosis(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(encounter_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateDiagnosisReq>,
) -> ApiResult<Json<DiagnosisRes>> {
    auth.permissions.require_edit_treatments()?;
    let raw_code = req
        .icd10_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(ClinicError::MissingFields)?;
    let code = Icd10Code::parse(raw_code).map_err(|e| ClinicError::invalid("icd10Code", e))?;
    let tooth = optional_tooth(req.tooth)?;
    let notes = optional_body(req.notes.as_deref(), "notes")?;
    let diagnosis = state
        .treatments
        .add_diagnosis(&auth.principal, encounter_id, &code, tooth, notes.as_ref())
        .await
        .or_failed("add_diagnosis")?;
    Ok(Json(DiagnosisRes {
        ok: true,
        diagnosis: diagnosis.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/diagnoses/{id}/plans",
    params(("id" = Uuid, Path, description = "Diagnosis id")),
    request_body = CreatePlanReq,
    responses(
        (status = 200, description = "Plan added", body = PlanRes),
        (status = 404, description = "Diagnosis not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn add_plan(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(diagnosis_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreatePlanReq>,
) -> ApiResult<Json<PlanRes>> {
    auth.permissions.require_edit_treatments()?;
    let title = required_name(req.title.as_deref(), "title")?;
    let plan = state
        .treatments
        .add_plan(&auth.principal, diagnosis_id, &title)
        .await
        .or_failed("add_plan")?;
    Ok(Json(PlanRes {
        ok: true,
        plan: plan.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/plans/{id}/items",
    params(("id" = Uuid, Path, description = "Plan id")),
    request_body = CreateItemReq,
    responses(
        (status = 200, description = "Item added", body = ItemRes),
        (status = 400, description = "Invalid tooth or status", body = ErrorRes),
        (status = 404, description = "Plan or group not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn add_item(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(plan_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<CreateItemReq>,
) -> ApiResult<Json<ItemRes>> {
    auth.permissions.require_edit_treatments()?;
    let new = NewItem {
        tooth: tooth(req.tooth)?,
        procedure_code: required_text(
            req.procedure_code.as_deref(),
            "procedureCode",
            MAX_NAME_CHARS,
        )?,
        description: optional_body(req.description.as_deref(), "description")?,
        status: req
            .status
            .as_deref()
            .map(str::parse::<TreatmentStatus>)
            .transpose()?,
        price_cents: req.price_cents,
        group_id: req.group_id,
    };
    if new.price_cents.is_some_and(|p| p < 0) {
        return Err(ClinicError::invalid("priceCents", "must not be negative").into());
    }
    let item = state
        .treatments
        .add_item(&auth.principal, plan_id, new)
        .await
        .or_failed("add_item")?;
    Ok(Json(ItemRes {
        ok: true,
        item: item.into(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/doctor/items/{id}/status",
    params(("id" = Uuid, Path, description = "Treatment item id")),
    request_body = UpdateItemStatusReq,
    responses(
        (status = 200, description = "Status changed (or unchanged if equal)", body = ItemRes),
        (status = 400, description = "Unknown status", body = ErrorRes),
        (status = 409, description = "Transition not allowed", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_item_status(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(item_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateItemStatusReq>,
) -> ApiResult<Json<ItemRes>> {
    auth.permissions.require_edit_treatments()?;
    let next: TreatmentStatus = req
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ClinicError::MissingFields)?
        .parse()?;
    let change = state
        .treatments
        .change_item_status(&auth.principal, item_id, next)
        .await
        .or_failed("update_status")?;
    if change.changed {
        tracing::info!(
            "treatment item {item_id} moved from {} to {}",
            change.previous,
            change.item.status
        );
    }
    if let Some(payload) = status_notification(&change) {
        notify::notify_patient(&state, change.patient_id, payload);
    }
    Ok(Json(ItemRes {
        ok: true,
        item: change.item.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/doctor/items/{id}",
    params(("id" = Uuid, Path, description = "Treatment item id")),
    responses(
        (status = 200, description = "Item deleted", body = OkRes),
        (status = 404, description = "Item not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "doctor"
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_item(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiPath(item_id): ApiPath<Uuid>,
) -> ApiResult<Json<OkRes>> {
    auth.permissions.require_edit_treatments()?;
    state
        .treatments
        .delete_item(&auth.principal, item_id)
        .await
        .or_failed("delete_item")?;
    Ok(Json(OkRes::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use clinic_core::repositories::TreatmentItem;

    fn change(previous: TreatmentStatus, next: TreatmentStatus) -> StatusChange {
        let now = Utc::now();
        StatusChange {
            item: TreatmentItem {
                id: Uuid::new_v4(),
                plan_id: Uuid::new_v4(),
                group_id: None,
                tooth: 36,
                procedure_code: "D2740".into(),
                description: None,
                status: next,
                price_cents: None,
                created_at: now,
                updated_at: now,
            },
            previous,
            patient_id: Uuid::new_v4(),
            changed: previous != next,
        }
    }

    #[test]
    fn test_status_notification_only_for_patient_facing_moves() {
        let payload =
            status_notification(&change(TreatmentStatus::Proposed, TreatmentStatus::Approved))
                .unwrap();
        assert_eq!(payload.body, "D2740 on tooth 36 has been approved");

        let payload =
            status_notification(&change(TreatmentStatus::Planned, TreatmentStatus::Done)).unwrap();
        assert_eq!(payload.body, "D2740 on tooth 36 is complete");

        assert!(status_notification(&change(TreatmentStatus::Draft, TreatmentStatus::Proposed))
            .is_none());
        assert!(status_notification(&change(TreatmentStatus::Done, TreatmentStatus::Done)).is_none());
        assert!(
            status_notification(&change(TreatmentStatus::Draft, TreatmentStatus::Cancelled))
                .is_none()
        );
    }
}
