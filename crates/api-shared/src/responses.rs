//! Response envelopes and resource representations.
//!
//! Resources are flattened into plain DTOs so the OpenAPI document does not depend on the
//! storage models; status enums travel as their snake_case strings.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::repositories::{
    Admin, Diagnosis, Doctor, Encounter, GroupDoctor, Icd10Entry, Note, Patient, PatientFile,
    TreatmentGroup, TreatmentGroupDetail, TreatmentItem, TreatmentPlan,
};
use clinic_core::{DoctorPermissions, TimelineEvent};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Failure body: `{"ok": false, "error": "<code>"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub ok: bool,
    pub error: String,
}

impl ErrorRes {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: code.into(),
        }
    }
}

/// Bare success body for writes that return nothing else.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OkRes {
    pub ok: bool,
}

impl OkRes {
    pub fn new() -> Self {
        Self { ok: true }
    }
}

impl Default for OkRes {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminDto {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub clinic_code: String,
    pub email: String,
    pub display_name: String,
    pub is_super: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Admin> for AdminDto {
    fn from(admin: Admin) -> Self {
        Self {
            id: admin.id,
            clinic_id: admin.clinic_id,
            clinic_code: admin.clinic_code,
            email: admin.email,
            display_name: admin.display_name,
            is_super: admin.is_super,
            created_at: admin.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DoctorDto {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub clinic_code: String,
    pub email: String,
    pub display_name: String,
    pub specialty: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Doctor> for DoctorDto {
    fn from(doctor: Doctor) -> Self {
        Self {
            id: doctor.id,
            clinic_id: doctor.clinic_id,
            clinic_code: doctor.clinic_code,
            email: doctor.email,
            display_name: doctor.display_name,
            specialty: doctor.specialty,
            active: doctor.active,
            created_at: doctor.created_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsDto {
    pub can_view_all_patients: bool,
    pub can_edit_treatments: bool,
    pub can_manage_groups: bool,
}

impl From<DoctorPermissions> for PermissionsDto {
    fn from(p: DoctorPermissions) -> Self {
        Self {
            can_view_all_patients: p.can_view_all_patients,
            can_edit_treatments: p.can_edit_treatments,
            can_manage_groups: p.can_manage_groups,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientDto {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub birth_date: Option<NaiveDate>,
    /// Whether a portal password is set.
    pub has_login: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Patient> for PatientDto {
    fn from(p: Patient) -> Self {
        Self {
            id: p.id,
            clinic_id: p.clinic_id,
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            phone: p.phone,
            birth_date: p.birth_date,
            has_login: p.has_login,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NoteDto {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub author_name: String,
    pub patient_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl From<Note> for NoteDto {
    fn from(n: Note) -> Self {
        Self {
            id: n.id,
            admin_id: n.admin_id,
            author_name: n.author_name,
            patient_id: n.patient_id,
            body: n.body,
            created_at: n.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEventDto {
    pub id: Uuid,
    pub patient_id: Option<Uuid>,
    pub actor_role: String,
    pub actor_id: Uuid,
    pub event_type: String,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    /// Human-readable sentence describing the event.
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl From<TimelineEvent> for TimelineEventDto {
    fn from(e: TimelineEvent) -> Self {
        Self {
            id: e.id,
            patient_id: e.patient_id,
            actor_role: e.actor_role.as_str().to_owned(),
            actor_id: e.actor_id,
            event_type: e.event_type.as_str().to_owned(),
            details: e.details,
            summary: e.summary,
            created_at: e.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileDto {
    pub id: Uuid,
    pub patient_id: Uuid,
    /// SHA-256 of the content, hex encoded.
    pub hash: String,
    pub media_type: String,
    pub size_bytes: i64,
    pub original_filename: String,
    pub uploaded_by_role: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl From<PatientFile> for FileDto {
    fn from(f: PatientFile) -> Self {
        Self {
            id: f.id,
            patient_id: f.patient_id,
            hash: f.hash,
            media_type: f.media_type,
            size_bytes: f.size_bytes,
            original_filename: f.original_filename,
            uploaded_by_role: f.uploaded_by_role,
            uploaded_by: f.uploaded_by,
            created_at: f.created_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Icd10Dto {
    pub code: String,
    pub description: String,
    pub category: Option<String>,
}

impl From<Icd10Entry> for Icd10Dto {
    fn from(e: Icd10Entry) -> Self {
        Self {
            code: e.code,
            description: e.description,
            category: e.category,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemDto {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub group_id: Option<Uuid>,
    pub tooth: i16,
    pub procedure_code: String,
    pub description: Option<String>,
    /// `draft`, `proposed`, `approved`, `planned`, `done` or `cancelled`.
    pub status: String,
    pub price_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TreatmentItem> for ItemDto {
    fn from(i: TreatmentItem) -> Self {
        Self {
            id: i.id,
            plan_id: i.plan_id,
            group_id: i.group_id,
            tooth: i.tooth,
            procedure_code: i.procedure_code,
            description: i.description,
            status: i.status.as_str().to_owned(),
            price_cents: i.price_cents,
            created_at: i.created_at,
            updated_at: i.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlanDto {
    pub id: Uuid,
    pub diagnosis_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<ItemDto>,
}

impl From<TreatmentPlan> for PlanDto {
    fn from(p: TreatmentPlan) -> Self {
        Self {
            id: p.id,
            diagnosis_id: p.diagnosis_id,
            title: p.title,
            created_at: p.created_at,
            items: p.items.into_iter().map(ItemDto::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisDto {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub icd10_code: String,
    pub icd10_description: String,
    pub tooth: Option<i16>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub plans: Vec<PlanDto>,
}

impl From<Diagnosis> for DiagnosisDto {
    fn from(d: Diagnosis) -> Self {
        Self {
            id: d.id,
            encounter_id: d.encounter_id,
            icd10_code: d.icd10_code,
            icd10_description: d.icd10_description,
            tooth: d.tooth,
            notes: d.notes,
            created_at: d.created_at,
            plans: d.plans.into_iter().map(PlanDto::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EncounterDto {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub diagnoses: Vec<DiagnosisDto>,
}

impl From<Encounter> for EncounterDto {
    fn from(e: Encounter) -> Self {
        Self {
            id: e.id,
            patient_id: e.patient_id,
            doctor_id: e.doctor_id,
            doctor_name: e.doctor_name,
            occurred_at: e.occurred_at,
            notes: e.notes,
            created_at: e.created_at,
            diagnoses: e.diagnoses.into_iter().map(DiagnosisDto::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupDto {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub name: String,
    pub description: Option<String>,
    /// Stored status.
    pub status: String,
    /// Status derived from the group's items.
    pub calculated_status: String,
    pub item_count: usize,
    pub done_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TreatmentGroup> for GroupDto {
    fn from(g: TreatmentGroup) -> Self {
        Self {
            id: g.id,
            patient_id: g.patient_id,
            patient_name: g.patient_name,
            name: g.name,
            description: g.description,
            status: g.status.as_str().to_owned(),
            calculated_status: g.calculated_status.as_str().to_owned(),
            item_count: g.item_count,
            done_count: g.done_count,
            created_at: g.created_at,
            updated_at: g.updated_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupDoctorDto {
    pub doctor_id: Uuid,
    pub display_name: String,
    pub specialty: Option<String>,
    pub is_primary: bool,
    pub assigned_at: DateTime<Utc>,
}

impl From<GroupDoctor> for GroupDoctorDto {
    fn from(d: GroupDoctor) -> Self {
        Self {
            doctor_id: d.doctor_id,
            display_name: d.display_name,
            specialty: d.specialty,
            is_primary: d.is_primary,
            assigned_at: d.assigned_at,
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupDetailDto {
    #[serde(flatten)]
    pub group: GroupDto,
    pub doctors: Vec<GroupDoctorDto>,
    pub items: Vec<ItemDto>,
}

impl From<TreatmentGroupDetail> for GroupDetailDto {
    fn from(d: TreatmentGroupDetail) -> Self {
        Self {
            group: d.group.into(),
            doctors: d.doctors.into_iter().map(GroupDoctorDto::from).collect(),
            items: d.items.into_iter().map(ItemDto::from).collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LoginAdminRes {
    pub ok: bool,
    pub token: String,
    pub admin: AdminDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LoginDoctorRes {
    pub ok: bool,
    pub token: String,
    pub doctor: DoctorDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct LoginPatientRes {
    pub ok: bool,
    pub token: String,
    pub patient: PatientDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct AdminRes {
    pub ok: bool,
    pub admin: AdminDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DoctorRes {
    pub ok: bool,
    pub doctor: DoctorDto,
}

/// A doctor's own profile together with what they may do.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DoctorMeRes {
    pub ok: bool,
    pub doctor: DoctorDto,
    pub permissions: PermissionsDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DoctorsRes {
    pub ok: bool,
    pub doctors: Vec<DoctorDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PermissionsRes {
    pub ok: bool,
    pub permissions: PermissionsDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PatientRes {
    pub ok: bool,
    pub patient: PatientDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PatientsRes {
    pub ok: bool,
    pub patients: Vec<PatientDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct NoteRes {
    pub ok: bool,
    pub note: NoteDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct NotesRes {
    pub ok: bool,
    pub notes: Vec<NoteDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineRes {
    pub ok: bool,
    pub events: Vec<TimelineEventDto>,
    /// Absent on the last page.
    pub next_cursor: Option<String>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct FileRes {
    pub ok: bool,
    pub file: FileDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct FilesRes {
    pub ok: bool,
    pub files: Vec<FileDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Icd10Res {
    pub ok: bool,
    pub code: Icd10Dto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Icd10SearchRes {
    pub ok: bool,
    pub results: Vec<Icd10Dto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct TreatmentsRes {
    pub ok: bool,
    pub encounters: Vec<EncounterDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct EncounterRes {
    pub ok: bool,
    pub encounter: EncounterDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct DiagnosisRes {
    pub ok: bool,
    pub diagnosis: DiagnosisDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PlanRes {
    pub ok: bool,
    pub plan: PlanDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ItemRes {
    pub ok: bool,
    pub item: ItemDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct GroupsRes {
    pub ok: bool,
    pub groups: Vec<GroupDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct GroupRes {
    pub ok: bool,
    pub group: GroupDetailDto,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GroupCancelRes {
    pub ok: bool,
    pub group: GroupDetailDto,
    pub cancelled_items: u64,
}

/// A patient's own treatment groups, each with its items.
#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct PatientTreatmentsRes {
    pub ok: bool,
    pub groups: Vec<GroupDetailDto>,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VapidKeyRes {
    pub ok: bool,
    pub public_key: String,
}

/// Outcome counts of a manual push to every subscription of a patient.
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct PushSendRes {
    pub ok: bool,
    pub delivered: usize,
    pub removed: usize,
    pub failed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_core::{GroupStatus, TreatmentStatus};

    fn item(status: TreatmentStatus) -> TreatmentItem {
        let now = Utc::now();
        TreatmentItem {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            group_id: None,
            tooth: 36,
            procedure_code: "D2740".into(),
            description: None,
            status,
            price_cents: Some(95_000),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_error_res_shape() {
        let body = serde_json::to_value(ErrorRes::new("missing_token")).unwrap();
        assert_eq!(body, serde_json::json!({"ok": false, "error": "missing_token"}));
    }

    #[test]
    fn test_item_dto_uses_status_string() {
        let body = serde_json::to_value(ItemDto::from(item(TreatmentStatus::Approved))).unwrap();
        assert_eq!(body["status"], "approved");
        assert_eq!(body["procedureCode"], "D2740");
        assert_eq!(body["priceCents"], 95_000);
    }

    #[test]
    fn test_group_detail_flattens_group_fields() {
        let now = Utc::now();
        let detail = TreatmentGroupDetail {
            group: TreatmentGroup {
                id: Uuid::new_v4(),
                clinic_id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                patient_name: "Ada Lovelace".into(),
                name: "Crowns".into(),
                description: None,
                status: GroupStatus::Planned,
                calculated_status: GroupStatus::InProgress,
                item_count: 2,
                done_count: 1,
                created_at: now,
                updated_at: now,
            },
            doctors: Vec::new(),
            items: vec![item(TreatmentStatus::Done), item(TreatmentStatus::Planned)],
        };
        let body = serde_json::to_value(GroupDetailDto::from(detail)).unwrap();
        assert_eq!(body["name"], "Crowns");
        assert_eq!(body["calculatedStatus"], "in_progress");
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert!(body.get("group").is_none());
    }

    #[test]
    fn test_timeline_res_serialises_next_cursor() {
        let res = TimelineRes {
            ok: true,
            events: Vec::new(),
            next_cursor: None,
        };
        let body = serde_json::to_value(res).unwrap();
        assert!(body["nextCursor"].is_null());
    }
}
