use api_shared::{HealthRes, HealthService};
use axum::response::Json;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    ),
    tag = "system"
)]
/// Health check endpoint
///
/// Used by monitoring and load balancers. It does not touch the database.
pub async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}
