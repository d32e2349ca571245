//! # API REST
//!
//! REST API implementation for the clinic backend.
//!
//! Handles:
//! - HTTP endpoints with axum, grouped by audience under `/api/admin`, `/api/doctor`,
//!   `/api/patient`, `/api/icd10` and `/api/push`
//! - Bearer authentication and role guards ([`extract`])
//! - The `{"ok": false, "error": "<code>"}` failure envelope ([`error`])
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (CORS, body limits, request tracing)
//!
//! Uses `api-shared` for wire types and `clinic-core` for everything behind the handlers.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod extract;
pub mod notify;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::{ApiError, ApiResult};
pub use openapi::ApiDoc;
pub use state::AppState;

use extract::{AdminAuth, DoctorAuth, GroupActor};
use routes::{admin, auth, doctor, groups, icd10, patient, push, system};

/// Multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// The treatment group surface for one kind of caller.
fn group_routes<G: GroupActor>() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(groups::create_group::<G>).get(groups::list_groups::<G>),
        )
        .route(
            "/:id",
            get(groups::get_group::<G>)
                .patch(groups::update_group::<G>)
                .delete(groups::delete_group::<G>),
        )
        .route("/:id/doctors", post(groups::assign_doctor::<G>))
        .route(
            "/:id/doctors/:doctor_id",
            delete(groups::unassign_doctor::<G>),
        )
        .route("/:id/items", post(groups::attach_items::<G>))
        .route("/:id/cancel", post(groups::cancel_group::<G>))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::admin_login))
        .route("/me", get(auth::admin_me))
        .route(
            "/doctors",
            get(admin::list_doctors).post(admin::create_doctor),
        )
        .route("/doctors/:id", patch(admin::update_doctor))
        .route(
            "/doctors/:id/permissions",
            get(admin::get_permissions).put(admin::set_permissions),
        )
        .route(
            "/patients",
            get(admin::list_patients).post(admin::create_patient),
        )
        .route(
            "/patients/:id",
            get(admin::get_patient)
                .patch(admin::update_patient)
                .delete(admin::delete_patient),
        )
        .route(
            "/patients/:id/files",
            get(admin::list_files).post(admin::upload_file),
        )
        .route("/files/:id", get(admin::download_file))
        .route("/notes", get(admin::list_notes).post(admin::create_note))
        .route("/notes/:id", delete(admin::delete_note))
        .route("/timeline", get(admin::timeline))
        .route("/push/send", post(admin::send_push))
        .route(
            "/push/subscribe",
            post(push::admin_subscribe).delete(push::admin_unsubscribe),
        )
        .nest("/treatment-groups", group_routes::<AdminAuth>())
}

fn doctor_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::doctor_login))
        .route("/me", get(auth::doctor_me))
        .route("/patients", get(doctor::list_patients))
        .route("/patients/:id/treatments", get(doctor::patient_treatments))
        .route("/patients/:id/files", get(doctor::patient_files))
        .route("/encounters", post(doctor::create_encounter))
        .route("/encounters/:id/diagnoses", post(doctor::add_diagnosis))
        .route("/diagnoses/:id/plans", post(doctor::add_plan))
        .route("/plans/:id/items", post(doctor::add_item))
        .route("/items/:id", delete(doctor::delete_item))
        .route("/items/:id/status", patch(doctor::update_item_status))
        .route(
            "/push/subscribe",
            post(push::doctor_subscribe).delete(push::doctor_unsubscribe),
        )
        .nest("/treatment-groups", group_routes::<DoctorAuth>())
}

fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::patient_login))
        .route("/me", get(auth::patient_me).patch(auth::update_patient_me))
        .route("/treatments", get(patient::treatments))
        .route("/files", get(patient::list_files))
        .route("/files/:id", get(patient::download_file))
        .route("/timeline", get(patient::timeline))
        .route(
            "/push/subscribe",
            post(push::patient_subscribe).delete(push::patient_unsubscribe),
        )
}

/// Builds the complete HTTP application.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.cfg.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(system::health))
        .nest("/api/admin", admin_routes())
        .nest("/api/doctor", doctor_routes())
        .nest("/api/patient", patient_routes())
        .route("/api/icd10/search", get(icd10::search))
        .route("/api/icd10/:code", get(icd10::get_code))
        .route("/api/push/vapid-public-key", get(push::vapid_public_key))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {err}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!("failed to listen for SIGTERM: {err}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("-- Shutdown signal received, draining connections");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono::{Duration, Utc};
    use clinic_core::{ClinicConfig, Principal, Role};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;
    use uuid::Uuid;

    /// State over a pool that never connects; only requests rejected before any query
    /// are exercised here.
    fn test_state() -> AppState {
        state_with(test_config())
    }

    fn test_config() -> ClinicConfig {
        ClinicConfig::new(
            "postgres://clinic@localhost/clinic_test".into(),
            b"0123456789abcdef0123456789abcdef".to_vec(),
            Duration::hours(1),
            std::env::temp_dir(),
        )
        .unwrap()
    }

    fn state_with(cfg: ClinicConfig) -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy(cfg.database_url())
            .unwrap();
        AppState::new(pool, cfg).unwrap()
    }

    fn token_for(state: &AppState, role: Role) -> String {
        let principal = Principal {
            id: Uuid::new_v4(),
            role,
            clinic_id: Uuid::new_v4(),
            clinic_code: "smile-dental".into(),
        };
        state.tokens.issue(&principal, Utc::now()).unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_with(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let (status, body) = send(app, get_with("/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_missing_token() {
        let app = build_router(test_state());
        let (status, body) = send(app, get_with("/api/admin/doctors", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, serde_json::json!({ "ok": false, "error": "missing_token" }));
    }

    #[tokio::test]
    async fn test_garbage_token() {
        let app = build_router(test_state());
        let (status, body) = send(app, get_with("/api/patient/me", Some("not.a.token"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_token");
    }

    #[tokio::test]
    async fn test_wrong_role() {
        let state = test_state();
        let token = token_for(&state, Role::Patient);
        let app = build_router(state);

        let (status, body) = send(app.clone(), get_with("/api/admin/doctors", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "admin_required");

        let (status, body) = send(
            app.clone(),
            get_with("/api/admin/treatment-groups", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "admin_required");

        let (status, body) = send(app, get_with("/api/icd10/search?q=K02", Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "staff_required");
    }

    #[tokio::test]
    async fn test_patient_timeline_rejects_bad_cursor() {
        let state = test_state();
        let token = token_for(&state, Role::Patient);
        let app = build_router(state);
        let (status, body) = send(
            app,
            get_with("/api/patient/timeline?cursor=garbage", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_cursor");
    }

    #[tokio::test]
    async fn test_invalid_json_body() {
        let app = build_router(test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/admin/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_json");
    }

    fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/api/admin/patients/{}/files", Uuid::new_v4()))
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XBOUNDARY")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_over_body_limit_is_file_too_large() {
        let state = state_with(test_config().with_max_upload_bytes(1024));
        let token = token_for(&state, Role::Admin);
        let app = build_router(state);

        let mut body = b"--XBOUNDARY\r\nContent-Disposition: form-data; name=\"file\"; \
filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\n"
            .to_vec();
        body.extend(std::iter::repeat(0u8).take(200 * 1024));
        body.extend_from_slice(b"\r\n--XBOUNDARY--\r\n");

        let (status, body) = send(app, upload_request(&token, body)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body, serde_json::json!({ "ok": false, "error": "file_too_large" }));
    }

    #[tokio::test]
    async fn test_truncated_upload_is_invalid_multipart() {
        let state = test_state();
        let token = token_for(&state, Role::Admin);
        let app = build_router(state);

        let body = b"--XBOUNDARY\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\nabc".to_vec();
        let (status, body) = send(app, upload_request(&token, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_multipart");
    }

    #[tokio::test]
    async fn test_vapid_key_without_push() {
        let app = build_router(test_state());
        let (status, body) = send(app, get_with("/api/push/vapid-public-key", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "push_disabled");
    }
}
