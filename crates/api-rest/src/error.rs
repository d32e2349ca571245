//! HTTP error mapping.
//!
//! Every failure leaves the API as `{"ok": false, "error": "<code>"}`. Internal failures
//! are logged with their cause. Write handlers name them `<operation>_failed` through
//! [`OrFailed`]; everywhere else they collapse to `internal_error`.

use api_shared::ErrorRes;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use clinic_core::ClinicError;
use clinic_push::PushError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing bearer token")]
    MissingToken,
    /// Authenticated, but as the wrong role. Carries the error code.
    #[error("role check failed: {0}")]
    WrongRole(&'static str),
    #[error("push notifications are not configured")]
    PushDisabled,
    #[error("invalid request body: {0}")]
    InvalidBody(String),
    #[error("invalid multipart body: {0}")]
    InvalidMultipart(String),
    #[error("invalid query string: {0}")]
    InvalidQuery(String),
    #[error("invalid path parameter: {0}")]
    InvalidPath(String),
    #[error("invalid push subscription: {0}")]
    InvalidSubscription(#[from] PushError),
    #[error(transparent)]
    Clinic(#[from] ClinicError),
    #[error("{operation} failed: {source}")]
    Failed {
        operation: &'static str,
        #[source]
        source: Box<ApiError>,
    },
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingToken => StatusCode::UNAUTHORIZED,
            Self::WrongRole(_) => StatusCode::FORBIDDEN,
            Self::PushDisabled => StatusCode::NOT_FOUND,
            Self::InvalidBody(_)
            | Self::InvalidMultipart(_)
            | Self::InvalidQuery(_)
            | Self::InvalidPath(_)
            | Self::InvalidSubscription(_) => StatusCode::BAD_REQUEST,
            Self::Clinic(err) => clinic_status(err),
            Self::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> String {
        match self {
            Self::MissingToken => "missing_token".into(),
            Self::WrongRole(code) => (*code).into(),
            Self::PushDisabled => "push_disabled".into(),
            Self::InvalidBody(_) => "invalid_json".into(),
            Self::InvalidMultipart(_) => "invalid_multipart".into(),
            Self::InvalidQuery(_) => "invalid_query".into(),
            Self::InvalidPath(_) => "invalid_id".into(),
            Self::InvalidSubscription(_) => "invalid_subscription".into(),
            Self::Clinic(err) => clinic_code(err),
            Self::Failed { operation, .. } => format!("{operation}_failed"),
        }
    }
}

/// Renames server-side failures of a write after the operation that hit them.
/// Client errors pass through unchanged.
pub trait OrFailed<T> {
    fn or_failed(self, operation: &'static str) -> ApiResult<T>;
}

impl<T, E: Into<ApiError>> OrFailed<T> for Result<T, E> {
    fn or_failed(self, operation: &'static str) -> ApiResult<T> {
        self.map_err(|err| {
            let err = err.into();
            if err.status().is_server_error() {
                ApiError::Failed {
                    operation,
                    source: Box::new(err),
                }
            } else {
                err
            }
        })
    }
}

fn clinic_status(err: &ClinicError) -> StatusCode {
    use clinic_files::FilesError;
    match err {
        ClinicError::MissingFields | ClinicError::InvalidCursor => StatusCode::BAD_REQUEST,
        ClinicError::InvalidInput { field: "file", .. } => StatusCode::PAYLOAD_TOO_LARGE,
        ClinicError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        ClinicError::NotFound(_) => StatusCode::NOT_FOUND,
        ClinicError::InvalidCredentials | ClinicError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
        ClinicError::AccountDisabled | ClinicError::PermissionDenied => StatusCode::FORBIDDEN,
        ClinicError::AlreadyExists(_)
        | ClinicError::InvalidStatusTransition { .. }
        | ClinicError::AlreadyCancelled => StatusCode::CONFLICT,
        ClinicError::Files(FilesError::Empty) => StatusCode::BAD_REQUEST,
        ClinicError::Files(FilesError::UnsupportedMediaType(_)) => {
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        }
        ClinicError::Files(FilesError::NotFound(_)) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn clinic_code(err: &ClinicError) -> String {
    use clinic_files::FilesError;
    match err {
        ClinicError::MissingFields => "missing_fields".into(),
        ClinicError::InvalidInput { field: "file", .. } => "file_too_large".into(),
        ClinicError::InvalidInput { field, .. } => format!("invalid_{}", snake_case(field)),
        ClinicError::NotFound(entity) => format!("{entity}_not_found"),
        ClinicError::InvalidCredentials => "invalid_credentials".into(),
        ClinicError::AccountDisabled => "account_disabled".into(),
        ClinicError::PermissionDenied => "permission_denied".into(),
        ClinicError::AlreadyExists(entity) => format!("{entity}_exists"),
        ClinicError::InvalidStatusTransition { .. } => "invalid_status_transition".into(),
        ClinicError::AlreadyCancelled => "already_cancelled".into(),
        ClinicError::InvalidCursor => "invalid_cursor".into(),
        ClinicError::InvalidToken(_) => "invalid_token".into(),
        ClinicError::Files(FilesError::Empty) => "empty_file".into(),
        ClinicError::Files(FilesError::UnsupportedMediaType(_)) => "unsupported_media_type".into(),
        ClinicError::Files(FilesError::NotFound(_)) => "file_not_found".into(),
        _ => "internal_error".into(),
    }
}

/// `icd10Code` -> `icd10_code`.
fn snake_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for c in field.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidQuery(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::InvalidPath(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
        } else {
            tracing::debug!("request rejected: {}", self);
        }
        (status, Json(ErrorRes::new(self.code()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::TreatmentStatus;

    #[test]
    fn test_codes_and_statuses() {
        let cases: Vec<(ApiError, StatusCode, &str)> = vec![
            (ApiError::MissingToken, StatusCode::UNAUTHORIZED, "missing_token"),
            (ApiError::WrongRole("admin_required"), StatusCode::FORBIDDEN, "admin_required"),
            (ApiError::PushDisabled, StatusCode::NOT_FOUND, "push_disabled"),
            (ClinicError::MissingFields.into(), StatusCode::BAD_REQUEST, "missing_fields"),
            (
                ClinicError::invalid("icd10Code", "bad").into(),
                StatusCode::BAD_REQUEST,
                "invalid_icd10_code",
            ),
            (ClinicError::invalid("status", "x").into(), StatusCode::BAD_REQUEST, "invalid_status"),
            (ClinicError::NotFound("icd10").into(), StatusCode::NOT_FOUND, "icd10_not_found"),
            (
                ClinicError::NotFound("treatment_group").into(),
                StatusCode::NOT_FOUND,
                "treatment_group_not_found",
            ),
            (ClinicError::AccountDisabled.into(), StatusCode::FORBIDDEN, "account_disabled"),
            (
                ClinicError::InvalidStatusTransition {
                    from: TreatmentStatus::Done,
                    to: TreatmentStatus::Draft,
                }
                .into(),
                StatusCode::CONFLICT,
                "invalid_status_transition",
            ),
            (ClinicError::AlreadyCancelled.into(), StatusCode::CONFLICT, "already_cancelled"),
            (ClinicError::AlreadyExists("doctor").into(), StatusCode::CONFLICT, "doctor_exists"),
            (ClinicError::InvalidToken("expired").into(), StatusCode::UNAUTHORIZED, "invalid_token"),
            (ClinicError::InvalidCursor.into(), StatusCode::BAD_REQUEST, "invalid_cursor"),
            (
                ClinicError::invalid("file", "too big").into(),
                StatusCode::PAYLOAD_TOO_LARGE,
                "file_too_large",
            ),
            (
                ClinicError::Config("x".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status(), status, "{err}");
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn test_or_failed_names_server_errors_only() {
        let failed: ApiResult<()> =
            Err(ClinicError::Config("pool closed".into())).or_failed("create_group");
        let err = failed.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "create_group_failed");

        let rejected: ApiResult<()> = Err(ClinicError::AlreadyCancelled).or_failed("cancel_group");
        let err = rejected.unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "already_cancelled");

        let ok: ApiResult<u8> = Ok::<u8, ClinicError>(7).or_failed("upload");
        assert_eq!(ok.unwrap(), 7);
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("icd10Code"), "icd10_code");
        assert_eq!(snake_case("patientId"), "patient_id");
        assert_eq!(snake_case("tooth"), "tooth");
    }
}
