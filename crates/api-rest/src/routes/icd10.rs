//! ICD-10 catalogue lookups for staff.

use api_shared::{ErrorRes, Icd10Res, Icd10SearchParams, Icd10SearchRes};
use axum::extract::State;
use axum::response::Json;
use clinic_core::validation::page_limit;
use clinic_core::{ClinicError, Icd10Code, DEFAULT_ICD10_LIMIT, MAX_ICD10_LIMIT};

use crate::error::ApiResult;
use crate::extract::{ApiPath, ApiQuery, StaffAuth};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/api/icd10/search",
    params(Icd10SearchParams),
    responses(
        (status = 200, description = "Matching catalogue entries", body = Icd10SearchRes),
        (status = 400, description = "Empty query", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "icd10"
)]
#[axum::debug_handler(state = AppState)]
pub async fn search(
    State(state): State<AppState>,
    _staff: StaffAuth,
    ApiQuery(params): ApiQuery<Icd10SearchParams>,
) -> ApiResult<Json<Icd10SearchRes>> {
    let query = params.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(ClinicError::MissingFields.into());
    }
    let limit = page_limit(params.limit, DEFAULT_ICD10_LIMIT, MAX_ICD10_LIMIT);
    let results = state.icd10.search(query, limit).await?;
    Ok(Json(Icd10SearchRes {
        ok: true,
        results: results.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/icd10/{code}",
    params(("code" = String, Path, description = "ICD-10 code, with or without the dot")),
    responses(
        (status = 200, description = "Catalogue entry", body = Icd10Res),
        (status = 400, description = "Malformed code", body = ErrorRes),
        (status = 404, description = "Unknown code", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "icd10"
)]
#[axum::debug_handler(state = AppState)]
pub async fn get_code(
    State(state): State<AppState>,
    _staff: StaffAuth,
    ApiPath(code): ApiPath<String>,
) -> ApiResult<Json<Icd10Res>> {
    let code = Icd10Code::parse(&code).map_err(|e| ClinicError::invalid("icd10Code", e))?;
    let entry = state.icd10.get(&code).await?;
    Ok(Json(Icd10Res {
        ok: true,
        code: entry.into(),
    }))
}
