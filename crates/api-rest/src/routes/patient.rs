//! Patient portal endpoints. Everything is scoped to the calling patient.

use api_shared::{ErrorRes, FilesRes, PatientTreatmentsRes, TimelineParams, TimelineRes};
use axum::extract::State;
use axum::response::{Json, Response};
use clinic_core::ClinicError;
use uuid::Uuid;

use super::{file_response, timeline_query, timeline_res};
use crate::error::ApiResult;
use crate::extract::{ApiPath, ApiQuery, PatientAuth};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/patient/treatments",
    responses((status = 200, description = "Own treatment groups with items", body = PatientTreatmentsRes)),
    security(("bearer_auth" = [])),
    tag = "patient"
)]
#[axum::debug_handler(state = AppState)]
pub async fn treatments(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
) -> ApiResult<Json<PatientTreatmentsRes>> {
    let groups = state
        .groups
        .patient_groups(patient.clinic_id, patient.id)
        .await?;
    Ok(Json(PatientTreatmentsRes {
        ok: true,
        groups: groups.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/patient/files",
    responses((status = 200, description = "Own files", body = FilesRes)),
    security(("bearer_auth" = [])),
    tag = "patient"
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_files(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
) -> ApiResult<Json<FilesRes>> {
    let files = state.files.list(patient.clinic_id, patient.id).await?;
    Ok(Json(FilesRes {
        ok: true,
        files: files.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/patient/files/{id}",
    params(("id" = Uuid, Path, description = "File id")),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "patient"
)]
#[axum::debug_handler(state = AppState)]
pub async fn download_file(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    let (file, bytes) = state.files.read(patient.clinic_id, id).await?;
    // Another patient's file is reported as missing.
    if file.patient_id != patient.id {
        return Err(ClinicError::NotFound("file").into());
    }
    Ok(file_response(file, bytes))
}

#[utoipa::path(
    get,
    path = "/api/patient/timeline",
    params(TimelineParams),
    responses(
        (status = 200, description = "Own patient-facing events, newest first", body = TimelineRes),
        (status = 400, description = "Malformed cursor", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "patient"
)]
#[axum::debug_handler(state = AppState)]
pub async fn timeline(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
    ApiQuery(params): ApiQuery<TimelineParams>,
) -> ApiResult<Json<TimelineRes>> {
    let query = timeline_query(params, Some(patient.id), true)?;
    let page = state.timeline.list(patient.clinic_id, query).await?;
    Ok(Json(timeline_res(page)))
}
