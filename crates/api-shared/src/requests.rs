//! Request bodies and query parameters.
//!
//! Fields a handler requires are still `Option` here so that an absent field is reported
//! as `missing_fields` instead of a generic JSON error.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginReq {
    pub clinic_code: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDoctorReq {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub password: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDoctorReq {
    pub display_name: Option<String>,
    pub specialty: Option<String>,
    pub active: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsReq {
    pub can_view_all_patients: Option<bool>,
    pub can_edit_treatments: Option<bool>,
    pub can_manage_groups: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePatientReq {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub birth_date: Option<NaiveDate>,
    /// Enables portal login when set.
    pub password: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientReq {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub birth_date: Option<NaiveDate>,
    pub password: Option<String>,
}

/// The subset of their record a patient may change themselves.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContactReq {
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateNoteReq {
    pub body: Option<String>,
    pub patient_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PushSendReq {
    pub patient_id: Option<Uuid>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKeysReq {
    pub p256dh: Option<String>,
    pub auth: Option<String>,
}

/// A browser `PushSubscription` as produced by `subscription.toJSON()`.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeReq {
    pub endpoint: Option<String>,
    pub keys: Option<SubscriptionKeysReq>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UnsubscribeReq {
    pub endpoint: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateEncounterReq {
    pub patient_id: Option<Uuid>,
    /// Defaults to now.
    pub occurred_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDiagnosisReq {
    pub icd10_code: Option<String>,
    /// FDI tooth number.
    pub tooth: Option<i64>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePlanReq {
    pub title: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemReq {
    /// FDI tooth number.
    pub tooth: Option<i64>,
    pub procedure_code: Option<String>,
    pub description: Option<String>,
    /// Defaults to `draft`.
    pub status: Option<String>,
    pub price_cents: Option<i64>,
    pub group_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemStatusReq {
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupReq {
    pub patient_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub doctor_ids: Vec<Uuid>,
    pub primary_doctor_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupReq {
    pub name: Option<String>,
    pub description: Option<String>,
    /// One of `planned`, `in_progress`, `completed`.
    pub status: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignDoctorReq {
    pub doctor_id: Option<Uuid>,
    #[serde(default)]
    pub is_primary: bool,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttachItemsReq {
    #[serde(default)]
    pub item_ids: Vec<Uuid>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PatientSearchParams {
    /// Matches first name, last name or email.
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct PatientFilterParams {
    pub patient_id: Option<Uuid>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TimelineParams {
    pub patient_id: Option<Uuid>,
    /// 1..=100, default 50.
    pub limit: Option<i64>,
    /// `nextCursor` from the previous page.
    pub cursor: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct Icd10SearchParams {
    pub q: Option<String>,
    /// 1..=50, default 20.
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_accept_camel_case() {
        let req: CreateGroupReq = serde_json::from_str(
            r#"{"patientId":"7f1c1c1e-4a53-4a4e-9b69-5b8d8d0a3c11","name":"Crowns","primaryDoctorId":null}"#,
        )
        .unwrap();
        assert_eq!(req.name.as_deref(), Some("Crowns"));
        assert!(req.doctor_ids.is_empty());

        let req: SubscribeReq = serde_json::from_str(
            r#"{"endpoint":"https://push.example/abc","keys":{"p256dh":"BP","auth":"au"}}"#,
        )
        .unwrap();
        assert_eq!(req.keys.unwrap().auth.as_deref(), Some("au"));
    }

    #[test]
    fn test_missing_fields_deserialize_as_none() {
        let req: LoginReq = serde_json::from_str("{}").unwrap();
        assert!(req.clinic_code.is_none() && req.email.is_none() && req.password.is_none());
    }
}
