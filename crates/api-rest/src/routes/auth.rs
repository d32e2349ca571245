//! Login and "who am I" endpoints for the three roles.

use api_shared::{
    AdminDto, AdminRes, DoctorDto, DoctorMeRes, ErrorRes, LoginAdminRes, LoginDoctorRes,
    LoginPatientRes, LoginReq, PatientDto, PatientRes, UpdateContactReq,
};
use axum::extract::State;
use axum::response::Json;
use chrono::Utc;
use clinic_core::repositories::PatientUpdate;
use clinic_core::validation::{optional_email, optional_phone};
use clinic_core::{ClinicCode, ClinicError, EmailAddress};

use crate::error::{ApiResult, OrFailed};
use crate::extract::{AdminAuth, ApiJson, DoctorAuth, PatientAuth};
use crate::state::AppState;

struct Credentials {
    clinic_code: ClinicCode,
    email: EmailAddress,
    password: String,
}

/// Missing fields are reported as such; anything malformed is just a failed login.
fn credentials(req: LoginReq) -> ApiResult<Credentials> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(code), Some(email), Some(password)) = (
        present(req.clinic_code),
        present(req.email),
        present(req.password),
    ) else {
        return Err(ClinicError::MissingFields.into());
    };
    Ok(Credentials {
        clinic_code: ClinicCode::parse(&code).map_err(|_| ClinicError::InvalidCredentials)?,
        email: EmailAddress::parse(&email).map_err(|_| ClinicError::InvalidCredentials)?,
        password,
    })
}

#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Token issued", body = LoginAdminRes),
        (status = 400, description = "Missing fields", body = ErrorRes),
        (status = 401, description = "Invalid credentials", body = ErrorRes)
    ),
    tag = "auth"
)]
#[axum::debug_handler(state = AppState)]
pub async fn admin_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginReq>,
) -> ApiResult<Json<LoginAdminRes>> {
    let creds = credentials(req)?;
    let admin = state
        .admins
        .authenticate(&creds.clinic_code, &creds.email, &creds.password)
        .await?;
    let token = state.tokens.issue(&admin.principal(), Utc::now())?;
    tracing::info!("admin {} signed in to clinic {}", admin.id, admin.clinic_code);
    Ok(Json(LoginAdminRes {
        ok: true,
        token,
        admin: admin.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/doctor/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Token issued", body = LoginDoctorRes),
        (status = 400, description = "Missing fields", body = ErrorRes),
        (status = 401, description = "Invalid credentials", body = ErrorRes),
        (status = 403, description = "Account disabled", body = ErrorRes)
    ),
    tag = "auth"
)]
#[axum::debug_handler(state = AppState)]
pub async fn doctor_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginReq>,
) -> ApiResult<Json<LoginDoctorRes>> {
    let creds = credentials(req)?;
    let doctor = state
        .doctors
        .authenticate(&creds.clinic_code, &creds.email, &creds.password)
        .await?;
    let token = state.tokens.issue(&doctor.principal(), Utc::now())?;
    tracing::info!("doctor {} signed in to clinic {}", doctor.id, doctor.clinic_code);
    Ok(Json(LoginDoctorRes {
        ok: true,
        token,
        doctor: doctor.into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/patient/login",
    request_body = LoginReq,
    responses(
        (status = 200, description = "Token issued", body = LoginPatientRes),
        (status = 400, description = "Missing fields", body = ErrorRes),
        (status = 401, description = "Invalid credentials", body = ErrorRes)
    ),
    tag = "auth"
)]
#[axum::debug_handler(state = AppState)]
pub async fn patient_login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginReq>,
) -> ApiResult<Json<LoginPatientRes>> {
    let creds = credentials(req)?;
    let (principal, patient) = state
        .patients
        .authenticate(&creds.clinic_code, &creds.email, &creds.password)
        .await?;
    let token = state.tokens.issue(&principal, Utc::now())?;
    tracing::info!("patient {} signed in to clinic {}", patient.id, principal.clinic_code);
    Ok(Json(LoginPatientRes {
        ok: true,
        token,
        patient: patient.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/admin/me",
    responses((status = 200, description = "The signed-in admin", body = AdminRes)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
#[axum::debug_handler(state = AppState)]
pub async fn admin_me(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
) -> ApiResult<Json<AdminRes>> {
    let admin = state.admins.get(admin.clinic_id, admin.id).await?;
    Ok(Json(AdminRes {
        ok: true,
        admin: AdminDto::from(admin),
    }))
}

#[utoipa::path(
    get,
    path = "/api/doctor/me",
    responses((status = 200, description = "The signed-in doctor and their permissions", body = DoctorMeRes)),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
#[axum::debug_handler(state = AppState)]
pub async fn doctor_me(
    State(state): State<AppState>,
    auth: DoctorAuth,
) -> ApiResult<Json<DoctorMeRes>> {
    let doctor = state
        .doctors
        .get(auth.principal.clinic_id, auth.principal.id)
        .await?;
    Ok(Json(DoctorMeRes {
        ok: true,
        doctor: DoctorDto::from(doctor),
        permissions: auth.permissions.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/patient/me",
    responses((status = 200, description = "The signed-in patient", body = PatientRes)),
    security(("bearer_auth" = [])),
    tag = "patient"
)]
#[axum::debug_handler(state = AppState)]
pub async fn patient_me(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
) -> ApiResult<Json<PatientRes>> {
    let patient = state.patients.get(patient.clinic_id, patient.id).await?;
    Ok(Json(PatientRes {
        ok: true,
        patient: PatientDto::from(patient),
    }))
}

#[utoipa::path(
    patch,
    path = "/api/patient/me",
    request_body = UpdateContactReq,
    responses(
        (status = 200, description = "Contact details updated", body = PatientRes),
        (status = 400, description = "Missing or invalid fields", body = ErrorRes)
    ),
    security(("bearer_auth" = [])),
    tag = "patient"
)]
#[axum::debug_handler(state = AppState)]
pub async fn update_patient_me(
    State(state): State<AppState>,
    PatientAuth(patient): PatientAuth,
    ApiJson(req): ApiJson<UpdateContactReq>,
) -> ApiResult<Json<PatientRes>> {
    let update = PatientUpdate {
        email: optional_email(req.email.as_deref())?,
        phone: optional_phone(req.phone.as_deref())?,
        ..PatientUpdate::default()
    };
    let updated = state
        .patients
        .update(&patient, patient.id, update)
        .await
        .or_failed("update_profile")?;
    Ok(Json(PatientRes {
        ok: true,
        patient: updated.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    fn login(code: Option<&str>, email: Option<&str>, password: Option<&str>) -> LoginReq {
        LoginReq {
            clinic_code: code.map(String::from),
            email: email.map(String::from),
            password: password.map(String::from),
        }
    }

    #[test]
    fn test_credentials_missing_fields() {
        let err = credentials(login(Some("smile"), None, Some("password123"))).err().unwrap();
        assert_eq!(err.code(), "missing_fields");
        let err = credentials(login(Some("smile"), Some("  "), Some("password123"))).err().unwrap();
        assert_eq!(err.code(), "missing_fields");
    }

    #[test]
    fn test_credentials_malformed_values_are_invalid_credentials() {
        let err = credentials(login(Some("smile"), Some("not-an-email"), Some("pw")))
            .err()
            .unwrap();
        assert!(matches!(err, ApiError::Clinic(ClinicError::InvalidCredentials)));
    }

    #[test]
    fn test_credentials_normalise_email() {
        let creds = credentials(login(Some("smile"), Some("Dr.Ames@Example.com"), Some("pw"))).unwrap();
        assert_eq!(creds.email.as_str(), "dr.ames@example.com");
        assert_eq!(creds.password, "pw");
    }
}
