//! Web push: the public VAPID key and subscription management for every role.

use api_shared::{ErrorRes, OkRes, SubscribeReq, UnsubscribeReq, VapidKeyRes};
use axum::extract::State;
use axum::response::Json;
use clinic_core::{ClinicError, Principal};
use clinic_push::PushService;

use crate::error::{ApiError, ApiResult, OrFailed};
use crate::extract::{AdminAuth, ApiJson, DoctorAuth, PatientAuth};
use crate::state::AppState;

/// A non-blank value, or `missing_fields`.
fn required(value: Option<String>) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ClinicError::MissingFields.into())
}

async fn subscribe(state: &AppState, owner: &Principal, req: SubscribeReq) -> ApiResult<OkRes> {
    let endpoint = required(req.endpoint)?;
    let keys = req.keys.unwrap_or_default();
    let p256dh = required(keys.p256dh)?;
    let auth = required(keys.auth)?;
    PushService::validate_endpoint(&endpoint)?;

    state
        .subscriptions
        .upsert(owner, &endpoint, &p256dh, &auth)
        .await
        .or_failed("subscribe")?;
    tracing::debug!("{} {} subscribed to push", owner.role, owner.id);
    Ok(OkRes::new())
}

async fn unsubscribe(
    state: &AppState,
    owner: &Principal,
    req: UnsubscribeReq,
) -> ApiResult<OkRes> {
    let endpoint = required(req.endpoint)?;
    if !state
        .subscriptions
        .remove(owner, &endpoint)
        .await
        .or_failed("unsubscribe")?
    {
        tracing::debug!("{} {} had no subscription to remove", owner.role, owner.id);
    }
    Ok(OkRes::new())
}

#[utoipa::path(
    get,
    path = "/api/push/vapid-public-key",
    responses(
        (status = 200, description = "Application server key for PushManager.subscribe", body = VapidKeyRes),
        (status = 404, description = "Push is not configured", body = ErrorRes)
    ),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn vapid_public_key(State(state): State<AppState>) -> ApiResult<Json<VapidKeyRes>> {
    let key = state.push.public_key().ok_or(ApiError::PushDisabled)?;
    Ok(Json(VapidKeyRes {
        ok: true,
        public_key: key.to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/patient/push/subscribe",
    request_body = SubscribeReq,
    responses(
        (status = 200, description = "Subscription stored", body = OkRes),
        (status = 400, description = "Missing fields or invalid endpoint", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn patient_subscribe(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
    ApiJson(req): ApiJson<SubscribeReq>,
) -> ApiResult<Json<OkRes>> {
    Ok(Json(subscribe(&state, &patient, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/patient/push/subscribe",
    request_body = UnsubscribeReq,
    responses((status = 200, description = "Subscription removed", body = OkRes)),
    security(("bearer_auth" = [])),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn patient_unsubscribe(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
    ApiJson(req): ApiJson<UnsubscribeReq>,
) -> ApiResult<Json<OkRes>> {
    Ok(Json(unsubscribe(&state, &patient, req).await?))
}

#[utoipa::path(
    post,
    path = "/api/doctor/push/subscribe",
    request_body = SubscribeReq,
    responses(
        (status = 200, description = "Subscription stored", body = OkRes),
        (status = 400, description = "Missing fields or invalid endpoint", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn doctor_subscribe(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiJson(req): ApiJson<SubscribeReq>,
) -> ApiResult<Json<OkRes>> {
    Ok(Json(subscribe(&state, &auth.principal, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/doctor/push/subscribe",
    request_body = UnsubscribeReq,
    responses((status = 200, description = "Subscription removed", body = OkRes)),
    security(("bearer_auth" = [])),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn doctor_unsubscribe(
    State(state): State<AppState>,
    auth: DoctorAuth,
    ApiJson(req): ApiJson<UnsubscribeReq>,
) -> ApiResult<Json<OkRes>> {
    Ok(Json(unsubscribe(&state, &auth.principal, req).await?))
}

#[utoipa::path(
    post,
    path = "/api/admin/push/subscribe",
    request_body = SubscribeReq,
    responses(
        (status = 200, description = "Subscription stored", body = OkRes),
        (status = 400, description = "Missing fields or invalid endpoint", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn admin_subscribe(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiJson(req): ApiJson<SubscribeReq>,
) -> ApiResult<Json<OkRes>> {
    Ok(Json(subscribe(&state, &admin, req).await?))
}

#[utoipa::path(
    delete,
    path = "/api/admin/push/subscribe",
    request_body = UnsubscribeReq,
    responses((status = 200, description = "Subscription removed", body = OkRes)),
    security(("bearer_auth" = [])),
    tag = "push"
)]
#[axum::debug_handler(state = AppState)]
pub async fn admin_unsubscribe(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    ApiJson(req): ApiJson<UnsubscribeReq>,
) -> ApiResult<Json<OkRes>> {
    Ok(Json(unsubscribe(&state, &admin, req).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_trims_and_rejects_blank() {
        assert_eq!(required(Some("  https://push.example/x ".into())).unwrap(), "https://push.example/x");
        assert_eq!(required(Some("   ".into())).err().unwrap().code(), "missing_fields");
        assert_eq!(required(None).err().unwrap().code(), "missing_fields");
    }
}
