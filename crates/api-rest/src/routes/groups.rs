//! Treatment group endpoints, mounted for doctors at `/api/doctor/treatment-groups` and
//! for admins at `/api/admin/treatment-groups`.
//!
//! Handlers are generic over [`GroupActor`]; the router instantiates each once per mount.

use api_shared::{
    AssignDoctorReq, AttachItemsReq, CreateGroupReq, ErrorRes, GroupCancelRes, GroupRes,
    GroupsRes, OkRes, PatientFilterParams, UpdateGroupReq,
};
use axum::extract::State;
use axum::response::Json;
use clinic_core::repositories::{GroupFilter, GroupUpdate, NewGroup, TreatmentGroupDetail};
use clinic_core::validation::{optional_body, optional_text, required_name};
use clinic_core::{ClinicError, GroupStatus, MAX_NAME_CHARS};
use clinic_push::PushPayload;
use uuid::Uuid;

use crate::error::{ApiResult, OrFailed};
use crate::extract::{ApiJson, ApiPath, ApiQuery, GroupActor};
use crate::notify;
use crate::state::AppState;

/// Rejects callers who may not see the group's patient.
async fn ensure_visible<G: GroupActor>(
    state: &AppState,
    actor: &G,
    detail: &TreatmentGroupDetail,
) -> ApiResult<()> {
    let Some(doctor_id) = actor.restricted_to() else {
        return Ok(());
    };
    let assigned = detail.doctors.iter().any(|d| d.doctor_id == doctor_id);
    if !assigned {
        state
            .patients
            .ensure_doctor_access(
                actor.principal().clinic_id,
                doctor_id,
                detail.group.patient_id,
                false,
            )
            .await?;
    }
    Ok(())
}

/// Loads a group the caller may see.
async fn visible_group<G: GroupActor>(
    state: &AppState,
    actor: &G,
    id: Uuid,
) -> ApiResult<TreatmentGroupDetail> {
    let detail = state.groups.get(actor.principal().clinic_id, id).await?;
    ensure_visible(state, actor, &detail).await?;
    Ok(detail)
}

fn group_notification(detail: &TreatmentGroupDetail, what: &str) -> PushPayload {
    PushPayload {
        title: "Treatment plan".into(),
        body: format!("Treatment group \"{}\" was {what}", detail.group.name),
        url: Some("/treatments".into()),
    }
}

#[utoipa::path(
    post,
    path = "/api/doctor/treatment-groups",
    request_body = CreateGroupReq,
    responses(
        (status = 200, description = "Group created with its doctor assignments", body = GroupRes),
        (status = 400, description = "Missing or invalid fields", body = ErrorRes),
        (status = 403, description = "Missing canManageGroups", body = ErrorRes),
        (status = 404, description = "Patient or doctor not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn create_group<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiJson(req): ApiJson<CreateGroupReq>,
) -> ApiResult<Json<GroupRes>> {
    actor.require_manage()?;
    let new = NewGroup {
        patient_id: req.patient_id.ok_or(ClinicError::MissingFields)?,
        name: required_name(req.name.as_deref(), "name")?,
        description: optional_body(req.description.as_deref(), "description")?,
        doctor_ids: req.doctor_ids,
        primary_doctor_id: req.primary_doctor_id,
    };
    let detail = state
        .groups
        .create(actor.principal(), new)
        .await
        .or_failed("create_group")?;
    notify::notify_patient(
        &state,
        detail.group.patient_id,
        group_notification(&detail, "created"),
    );
    Ok(Json(GroupRes {
        ok: true,
        group: detail.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/doctor/treatment-groups",
    params(PatientFilterParams),
    responses((status = 200, description = "Groups with calculated status and item counts", body = GroupsRes)),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn list_groups<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiQuery(params): ApiQuery<PatientFilterParams>,
) -> ApiResult<Json<GroupsRes>> {
    let filter = GroupFilter {
        patient_id: params.patient_id,
        assigned_doctor: actor.restricted_to(),
    };
    let groups = state
        .groups
        .list(actor.principal().clinic_id, filter)
        .await?;
    Ok(Json(GroupsRes {
        ok: true,
        groups: groups.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/doctor/treatment-groups/{id}",
    params(("id" = Uuid, Path, description = "Treatment group id")),
    responses(
        (status = 200, description = "Group with doctors and items", body = GroupRes),
        (status = 404, description = "Group not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn get_group<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<GroupRes>> {
    let detail = visible_group(&state, &actor, id).await?;
    Ok(Json(GroupRes {
        ok: true,
        group: detail.into(),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/doctor/treatment-groups/{id}",
    params(("id" = Uuid, Path, description = "Treatment group id")),
    request_body = UpdateGroupReq,
    responses(
        (status = 200, description = "Group updated", body = GroupRes),
        (status = 400, description = "Invalid status", body = ErrorRes),
        (status = 409, description = "Group is cancelled", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn update_group<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<UpdateGroupReq>,
) -> ApiResult<Json<GroupRes>> {
    actor.require_manage()?;
    visible_group(&state, &actor, id).await?;
    let update = GroupUpdate {
        name: optional_text(req.name.as_deref(), "name", MAX_NAME_CHARS)?,
        description: optional_body(req.description.as_deref(), "description")?,
        status: req
            .status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse::<GroupStatus>)
            .transpose()?,
    };
    let detail = state
        .groups
        .update(actor.principal(), id, update)
        .await
        .or_failed("update_group")?;
    Ok(Json(GroupRes {
        ok: true,
        group: detail.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/treatment-groups/{id}/doctors",
    params(("id" = Uuid, Path, description = "Treatment group id")),
    request_body = AssignDoctorReq,
    responses(
        (status = 200, description = "Doctor assigned", body = GroupRes),
        (status = 404, description = "Group or doctor not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn assign_doctor<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AssignDoctorReq>,
) -> ApiResult<Json<GroupRes>> {
    actor.require_manage()?;
    let doctor_id = req.doctor_id.ok_or(ClinicError::MissingFields)?;
    visible_group(&state, &actor, id).await?;
    let detail = state
        .groups
        .assign_doctor(actor.principal(), id, doctor_id, req.is_primary)
        .await
        .or_failed("assign_doctor")?;
    Ok(Json(GroupRes {
        ok: true,
        group: detail.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/doctor/treatment-groups/{id}/doctors/{doctor_id}",
    params(
        ("id" = Uuid, Path, description = "Treatment group id"),
        ("doctor_id" = Uuid, Path, description = "Doctor id")
    ),
    responses(
        (status = 200, description = "Doctor unassigned", body = GroupRes),
        (status = 404, description = "Assignment not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn unassign_doctor<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath((id, doctor_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<Json<GroupRes>> {
    actor.require_manage()?;
    visible_group(&state, &actor, id).await?;
    let detail = state
        .groups
        .unassign_doctor(actor.principal(), id, doctor_id)
        .await
        .or_failed("unassign_doctor")?;
    Ok(Json(GroupRes {
        ok: true,
        group: detail.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/treatment-groups/{id}/items",
    params(("id" = Uuid, Path, description = "Treatment group id")),
    request_body = AttachItemsReq,
    responses(
        (status = 200, description = "Items attached", body = GroupRes),
        (status = 400, description = "No items given", body = ErrorRes),
        (status = 404, description = "Group or item not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn attach_items<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<AttachItemsReq>,
) -> ApiResult<Json<GroupRes>> {
    actor.require_manage()?;
    if req.item_ids.is_empty() {
        return Err(ClinicError::MissingFields.into());
    }
    visible_group(&state, &actor, id).await?;
    let detail = state
        .groups
        .attach_items(actor.principal(), id, &req.item_ids)
        .await
        .or_failed("attach_items")?;
    Ok(Json(GroupRes {
        ok: true,
        group: detail.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/treatment-groups/{id}/cancel",
    params(("id" = Uuid, Path, description = "Treatment group id")),
    responses(
        (status = 200, description = "Group and its open items cancelled", body = GroupCancelRes),
        (status = 409, description = "Already cancelled", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn cancel_group<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<GroupCancelRes>> {
    actor.require_manage()?;
    visible_group(&state, &actor, id).await?;
    let cancellation = state
        .groups
        .cancel(actor.principal(), id)
        .await
        .or_failed("cancel_group")?;
    notify::notify_patient(
        &state,
        cancellation.group.group.patient_id,
        group_notification(&cancellation.group, "cancelled"),
    );
    Ok(Json(GroupCancelRes {
        ok: true,
        cancelled_items: cancellation.cancelled_items,
        group: cancellation.group.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/doctor/treatment-groups/{id}",
    params(("id" = Uuid, Path, description = "Treatment group id")),
    responses(
        (status = 200, description = "Group deleted; its items are kept", body = OkRes),
        (status = 404, description = "Group not found", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "treatment-groups"
)]
pub async fn delete_group<G: GroupActor>(
    State(state): State<AppState>,
    actor: G,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<OkRes>> {
    actor.require_manage()?;
    visible_group(&state, &actor, id).await?;
    state
        .groups
        .delete(actor.principal(), id)
        .await
        .or_failed("delete_group")?;
    Ok(Json(OkRes::new()))
}
