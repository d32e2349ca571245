//! Admin endpoints: staff, patients, notes, timeline, manual push and files.

use api_shared::{
    CreateDoctorReq, CreateNoteReq, CreatePatientReq, DoctorRes, DoctorsRes, ErrorRes, FileRes,
    FilesRes, NoteRes, NotesRes, OkRes, PatientFilterParams, PatientRes, PatientSearchParams,
    PatientsRes, PermissionsReq, PermissionsRes, PushSendReq, PushSendRes, TimelineParams,
    TimelineRes, UpdateDoctorReq, UpdatePatientReq,
};
use axum::extract::{Multipart, State};
use axum::response::{Json, Response};
use clinic_core::repositories::{DoctorUpdate, NewDoctor, NewPatient, PatientUpdate};
use clinic_core::validation::{
    optional_email, optional_phone, optional_text, required_email, required_name, required_text,
};
use clinic_core::{
    ClinicError, DoctorPermissions, EventType, NewTimelineEvent, Role, MAX_NAME_CHARS,
    MAX_TEXT_CHARS,
};
use clinic_push::PushPayload;
use serde_json::json;
use uuid::Uuid;

use super::{file_response, read_upload, timeline_query, timeline_res};
use crate::error::{ApiResult, OrFailed};
use crate::extract::{AdminAuth, ApiJson, ApiPath, ApiQuery};
use crate::notify;
use crate::state::AppState;

/// A non-blank password, or `missing_fields`.
fn required_password(value: Option<String>) -> ApiResult<String> {
    value
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ClinicError::MissingFields.into())
}

#[utoipa::path(
    get,
    path = "/api/admin/doctors",
    responses((status = 200, description = "Doctors of the clinic", body = DoctorsRes)),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_doctors(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
) -> ApiResult<Json<DoctorsRes>> {
    let doctors = state.doctors.list(admin.clinic_id).await?;
    Ok(Json(DoctorsRes {
        ok: true,
        doctors: doctors.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/doctors",
    request_body = CreateDoctorReq,
    responses(
        (status = 200, description = "Doctor created", body = DoctorRes),
        (status = 400, description = "Missing or invalid fields", body = ErrorRes),
        (status = 409, description = "Email already registered", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_doctor(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiJson(req): ApiJson<CreateDoctorReq>,
) -> ApiResult<Json<DoctorRes>> {
    let new = NewDoctor {
        email: required_email(req.email.as_deref())?,
        display_name: required_name(req.display_name.as_deref(), "displayName")?,
        password: required_password(req.password)?,
        specialty: optional_text(req.specialty.as_deref(), "specialty", MAX_NAME_CHARS)?,
    };
    let doctor = state
        .doctors
        .create(admin.clinic_id, new)
        .await
        .or_failed("create_doctor")?;
    tracing::info!("admin {} created doctor {}", admin.id, doctor.id);
    Ok(Json(DoctorRes {
        ok: true,
        doctor: doctor.into(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/admin/doctors/{id}",
    params(("id" = Uuid, Path, description = "Doctor id")),
    request_body = UpdateDoctorReq,
    responses(
        (status = 200, description = "Doctor updated", body = DoctorRes),
        (status = 404, description = "Doctor not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_doctor(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateDoctorReq>,
) -> ApiResult<Json<DoctorRes>> {
    let update = DoctorUpdate {
        display_name: optional_text(req.display_name.as_deref(), "displayName", MAX_NAME_CHARS)?,
        specialty: optional_text(req.specialty.as_deref(), "specialty", MAX_NAME_CHARS)?,
        active: req.active,
    };
    if update.display_name.is_none() && update.specialty.is_none() && update.active.is_none() {
        return Err(ClinicError::MissingFields.into());
    }
    let doctor = state
        .doctors
        .update(admin.clinic_id, id, update)
        .await
        .or_failed("update_doctor")?;
    Ok(Json(DoctorRes {
        ok: true,
        doctor: doctor.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/doctors/{id}/permissions",
    params(("id" = Uuid, Path, description = "Doctor id")),
    responses(
        (status = 200, description = "Effective permissions", body = PermissionsRes),
        (status = 404, description = "Doctor not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_permissions(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<PermissionsRes>> {
    let permissions = state.doctors.permissions(admin.clinic_id, id).await?;
    Ok(Json(PermissionsRes {
        ok: true,
        permissions: permissions.into(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/admin/doctors/{id}/permissions",
    params(("id" = Uuid, Path, description = "Doctor id")),
    request_body = PermissionsReq,
    responses(
        (status = 200, description = "Permissions stored", body = PermissionsRes),
        (status = 400, description = "Missing fields", body = ErrorRes),
        (status = 404, description = "Doctor not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn set_permissions(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<PermissionsReq>,
) -> ApiResult<Json<PermissionsRes>> {
    let (Some(can_view_all_patients), Some(can_edit_treatments), Some(can_manage_groups)) = (
        req.can_view_all_patients,
        req.can_edit_treatments,
        req.can_manage_groups,
    ) else {
        return Err(ClinicError::MissingFields.into());
    };
    let permissions = DoctorPermissions {
        can_view_all_patients,
        can_edit_treatments,
        can_manage_groups,
    };
    let stored = state
        .doctors
        .set_permissions(admin.clinic_id, id, permissions)
        .await
        .or_failed("set_permissions")?;
    tracing::info!("admin {} updated permissions of doctor {id}", admin.id);
    Ok(Json(PermissionsRes {
        ok: true,
        permissions: stored.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/patients",
    params(PatientSearchParams),
    responses((status = 200, description = "Patients of the clinic", body = PatientsRes)),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_patients(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiQuery(params): ApiQuery<PatientSearchParams>,
) -> ApiResult<Json<PatientsRes>> {
    let patients = state
        .patients
        .list(admin.clinic_id, params.search.as_deref())
        .await?;
    Ok(Json(PatientsRes {
        ok: true,
        patients: patients.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/patients",
    request_body = CreatePatientReq,
    responses(
        (status = 200, description = "Patient registered", body = PatientRes),
        (status = 400, description = "Missing or invalid fields", body = ErrorRes),
        (status = 409, description = "Email already registered", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_patient(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiJson(req): ApiJson<CreatePatientReq>,
) -> ApiResult<Json<PatientRes>> {
    let new = NewPatient {
        first_name: required_name(req.first_name.as_deref(), "firstName")?,
        last_name: required_name(req.last_name.as_deref(), "lastName")?,
        email: optional_email(req.email.as_deref())?,
        phone: optional_phone(req.phone.as_deref())?,
        birth_date: req.birth_date,
        password: req.password.filter(|p| !p.trim().is_empty()),
    };
    if new.password.is_some() && new.email.is_none() {
        // Portal logins are looked up by email.
        return Err(ClinicError::MissingFields.into());
    }
    let patient = state
        .patients
        .create(&admin, new)
        .await
        .or_failed("create_patient")?;
    Ok(Json(PatientRes {
        ok: true,
        patient: patient.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/patients/{id}",
    params(("id" = Uuid, Path, description = "Patient id")),
    responses(
        (status = 200, description = "The patient", body = PatientRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_patient(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<PatientRes>> {
    let patient = state.patients.get(admin.clinic_id, id).await?;
    Ok(Json(PatientRes {
        ok: true,
        patient: patient.into(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/admin/patients/{id}",
    params(("id" = Uuid, Path, description = "Patient id")),
    request_body = UpdatePatientReq,
    responses(
        (status = 200, description = "Patient updated", body = PatientRes),
        (status = 400, description = "Missing or invalid fields", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_patient(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdatePatientReq>,
) -> ApiResult<Json<PatientRes>> {
    let update = PatientUpdate {
        first_name: optional_text(req.first_name.as_deref(), "firstName", MAX_NAME_CHARS)?,
        last_name: optional_text(req.last_name.as_deref(), "lastName", MAX_NAME_CHARS)?,
        email: optional_email(req.email.as_deref())?,
        phone: optional_phone(req.phone.as_deref())?,
        birth_date: req.birth_date,
        password: req.password.filter(|p| !p.trim().is_empty()),
    };
    let patient = state
        .patients
        .update(&admin, id, update)
        .await
        .or_failed("update_patient")?;
    Ok(Json(PatientRes {
        ok: true,
        patient: patient.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/admin/patients/{id}",
    params(("id" = Uuid, Path, description = "Patient id")),
    responses(
        (status = 200, description = "Patient removed with their records", body = OkRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_patient(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<OkRes>> {
    state
        .patients
        .delete(&admin, id)
        .await
        .or_failed("delete_patient")?;
    tracing::info!("admin {} deleted patient {id}", admin.id);
    Ok(Json(OkRes::new()))
}

#[utoipa::path(
    get,
    path = "/api/admin/notes",
    params(PatientFilterParams),
    responses((status = 200, description = "Notes, newest first", body = NotesRes)),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_notes(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiQuery(params): ApiQuery<PatientFilterParams>,
) -> ApiResult<Json<NotesRes>> {
    let notes = state.notes.list(admin.clinic_id, params.patient_id).await?;
    Ok(Json(NotesRes {
        ok: true,
        notes: notes.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/notes",
    request_body = CreateNoteReq,
    responses(
        (status = 200, description = "Note added", body = NoteRes),
        (status = 400, description = "Missing fields", body = ErrorRes),
        (status = 404, description = "Patient not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn create_note(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiJson(req): ApiJson<CreateNoteReq>,
) -> ApiResult<Json<NoteRes>> {
    let body = required_text(req.body.as_deref(), "body", MAX_TEXT_CHARS)?;
    let note = state
        .notes
        .create(&admin, &body, req.patient_id)
        .await
        .or_failed("create_note")?;
    Ok(Json(NoteRes {
        ok: true,
        note: note.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/admin/notes/{id}",
    params(("id" = Uuid, Path, description = "Note id")),
    responses(
        (status = 200, description = "Note deleted", body = OkRes),
        (status = 403, description = "Neither the author nor a super admin", body = ErrorRes),
        (status = 404, description = "Note not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn delete_note(
    State(state): State<AppState>,
    AdminAuth(principal): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<OkRes>> {
    let admin = state.admins.get(principal.clinic_id, principal.id).await?;
    state
        .notes
        .delete(&principal, admin.is_super, id)
        .await
        .or_failed("delete_note")?;
    Ok(Json(OkRes::new()))
}

#[utoipa::path(
    get,
    path = "/api/admin/timeline",
    params(TimelineParams),
    responses(
        (status = 200, description = "Events, newest first", body = TimelineRes),
        (status = 400, description = "Malformed cursor", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn timeline(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiQuery(params): ApiQuery<TimelineParams>,
) -> ApiResult<Json<TimelineRes>> {
    let patient_id = params.patient_id;
    let query = timeline_query(params, patient_id, false)?;
    let page = state.timeline.list(admin.clinic_id, query).await?;
    Ok(Json(timeline_res(page)))
}

#[utoipa::path(
    post,
    path = "/api/admin/push/send",
    request_body = PushSendReq,
    responses(
        (status = 200, description = "Delivery counts", body = PushSendRes),
        (status = 400, description = "Missing fields", body = ErrorRes),
        (status = 404, description = "Patient not found or push disabled", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn send_push(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiJson(req): ApiJson<PushSendReq>,
) -> ApiResult<Json<PushSendRes>> {
    let patient_id = req.patient_id.ok_or(ClinicError::MissingFields)?;
    let title = required_name(req.title.as_deref(), "title")?;
    let body = required_text(req.body.as_deref(), "body", MAX_TEXT_CHARS)?;
    let url = req.url.filter(|u| !u.trim().is_empty());
    let patient = state.patients.get(admin.clinic_id, patient_id).await?;

    let payload = PushPayload {
        title: title.into_inner(),
        body: body.into_inner(),
        url,
    };
    let report = notify::deliver(&state, Role::Patient, patient.id, &payload)
        .await
        .or_failed("send_push")?;
    state
        .timeline
        .record(
            &NewTimelineEvent::new(
                &admin,
                EventType::PushSent,
                json!({ "title": payload.title, "delivered": report.delivered }),
            )
            .for_patient(patient.id),
        )
        .await
        .or_failed("send_push")?;
    tracing::info!(
        "admin {} pushed to patient {}: {} delivered",
        admin.id,
        patient.id,
        report.delivered
    );
    Ok(Json(PushSendRes {
        ok: true,
        delivered: report.delivered,
        removed: report.removed,
        failed: report.failed,
    }))
}

#[utoipa::path(
    post,
    path = "/api/admin/patients/{id}/files",
    params(("id" = Uuid, Path, description = "Patient id")),
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Multipart form with a `file` field"
    ),
    responses(
        (status = 200, description = "File stored", body = FileRes),
        (status = 413, description = "File too large", body = ErrorRes),
        (status = 415, description = "Unsupported media type", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(patient_id): ApiPath<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<FileRes>> {
    let (filename, bytes) = read_upload(multipart).await?;
    let file = state
        .files
        .upload(&admin, patient_id, bytes.to_vec(), &filename)
        .await
        .or_failed("upload")?;
    Ok(Json(FileRes {
        ok: true,
        file: file.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/patients/{id}/files",
    params(("id" = Uuid, Path, description = "Patient id")),
    responses((status = 200, description = "Files of the patient", body = FilesRes)),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn list_files(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(patient_id): ApiPath<Uuid>,
) -> ApiResult<Json<FilesRes>> {
    state.patients.get(admin.clinic_id, patient_id).await?;
    let files = state.files.list(admin.clinic_id, patient_id).await?;
    Ok(Json(FilesRes {
        ok: true,
        files: files.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/files/{id}",
    params(("id" = Uuid, Path, description = "File id")),
    responses(
        (status = 200, description = "File content"),
        (status = 404, description = "File not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "admin"
)]
#[axum::debug_handler(state = AppState)]
pub async fn download_file(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Response> {
    let (file, bytes) = state.files.read(admin.clinic_id, id).await?;
    Ok(file_response(file, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_password() {
        assert_eq!(required_password(Some("password123".into())).unwrap(), "password123");
        assert_eq!(
            required_password(Some("   ".into())).err().unwrap().code(),
            "missing_fields"
        );
        assert!(required_password(None).is_err());
    }
}
