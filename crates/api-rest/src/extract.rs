//! Request extractors: bearer authentication with role guards, and JSON/query/path
//! wrappers whose rejections use the API error envelope.

use api_shared::auth::bearer_token;
use axum::extract::{FromRequest, FromRequestParts, Path, Query};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::Json;
use chrono::Utc;
use clinic_core::{ClinicError, DoctorPermissions, Principal, Role};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// JSON body with `invalid_json` rejections.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string with `invalid_query` rejections.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Path parameters with `invalid_id` rejections.
#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// Verifies the bearer token and returns the caller. No role check.
fn authenticate(parts: &Parts, state: &AppState) -> ApiResult<Principal> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    let token = bearer_token(header).ok_or(ApiError::MissingToken)?;
    let claims = state.tokens.verify(token, Utc::now())?;
    Ok(claims.into())
}

/// Loads a doctor's permissions, rejecting deactivated accounts.
async fn doctor_context(state: &AppState, principal: &Principal) -> ApiResult<DoctorPermissions> {
    state
        .doctors
        .require_active(principal.clinic_id, principal.id)
        .await
        .map_err(|err| match err {
            // The account was removed after the token was issued.
            ClinicError::NotFound(_) => ClinicError::InvalidToken("subject"),
            other => other,
        })?;
    Ok(state
        .doctors
        .permissions(principal.clinic_id, principal.id)
        .await?)
}

/// An authenticated clinic administrator.
#[derive(Clone, Debug)]
pub struct AdminAuth(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let principal = authenticate(parts, state)?;
        if principal.role != Role::Admin {
            return Err(ApiError::WrongRole("admin_required"));
        }
        Ok(Self(principal))
    }
}

/// An authenticated, active doctor together with their current permissions.
#[derive(Clone, Debug)]
pub struct DoctorAuth {
    pub principal: Principal,
    pub permissions: DoctorPermissions,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for DoctorAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let principal = authenticate(parts, state)?;
        if principal.role != Role::Doctor {
            return Err(ApiError::WrongRole("doctor_required"));
        }
        let permissions = doctor_context(state, &principal).await?;
        Ok(Self {
            principal,
            permissions,
        })
    }
}

/// An authenticated patient using the portal.
#[derive(Clone, Debug)]
pub struct PatientAuth(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for PatientAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let principal = authenticate(parts, state)?;
        if principal.role != Role::Patient {
            return Err(ApiError::WrongRole("patient_required"));
        }
        Ok(Self(principal))
    }
}

/// Either an admin or an active doctor.
#[derive(Clone, Debug)]
pub struct StaffAuth(pub Principal);

#[axum::async_trait]
impl FromRequestParts<AppState> for StaffAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> ApiResult<Self> {
        let principal = authenticate(parts, state)?;
        match principal.role {
            Role::Admin => {}
            Role::Doctor => {
                doctor_context(state, &principal).await?;
            }
            Role::Patient => return Err(ApiError::WrongRole("staff_required")),
        }
        Ok(Self(principal))
    }
}

/// Who may work with treatment groups, and how far.
///
/// Admins have full access. Doctors need `canManageGroups` to write and, without
/// `canViewAllPatients`, only see groups they are assigned to.
pub trait GroupActor:
    FromRequestParts<AppState, Rejection = ApiError> + Send + Sync + 'static
{
    fn principal(&self) -> &Principal;

    fn require_manage(&self) -> ApiResult<()>;

    /// The doctor whose patient visibility limits what this caller sees, if any.
    fn restricted_to(&self) -> Option<Uuid>;
}

impl GroupActor for AdminAuth {
    fn principal(&self) -> &Principal {
        &self.0
    }

    fn require_manage(&self) -> ApiResult<()> {
        Ok(())
    }

    fn restricted_to(&self) -> Option<Uuid> {
        None
    }
}

impl GroupActor for DoctorAuth {
    fn principal(&self) -> &Principal {
        &self.principal
    }

    fn require_manage(&self) -> ApiResult<()> {
        Ok(self.permissions.require_manage_groups()?)
    }

    fn restricted_to(&self) -> Option<Uuid> {
        (!self.permissions.can_view_all_patients).then_some(self.principal.id)
    }
}
