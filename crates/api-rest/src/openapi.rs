//! OpenAPI document served at `/api-docs/openapi.json`.
//!
//! Treatment group paths are documented once under the doctor mount; the admin mount at
//! `/api/admin/treatment-groups` shares the same handlers and bodies.

use api_shared::*;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::routes::{admin, auth, doctor, groups, icd10, patient, push, system};

#[derive(OpenApi)]
#[openapi(
    paths(
        system::health,
        auth::admin_login,
        auth::doctor_login,
        auth::patient_login,
        auth::admin_me,
        auth::doctor_me,
        auth::patient_me,
        auth::update_patient_me,
        admin::list_doctors,
        admin::create_doctor,
        admin::update_doctor,
        admin::get_permissions,
        admin::set_permissions,
        admin::list_patients,
        admin::create_patient,
        admin::get_patient,
        admin::update_patient,
        admin::delete_patient,
        admin::list_notes,
        admin::create_note,
        admin::delete_note,
        admin::timeline,
        admin::send_push,
        admin::upload_file,
        admin::list_files,
        admin::download_file,
        icd10::search,
        icd10::get_code,
        doctor::list_patients,
        doctor::patient_treatments,
        doctor::patient_files,
        doctor::create_encounter,
        doctor::add_diagnosis,
        doctor::add_plan,
        doctor::add_item,
        doctor::update_item_status,
        doctor::delete_item,
        groups::create_group,
        groups::list_groups,
        groups::get_group,
        groups::update_group,
        groups::assign_doctor,
        groups::unassign_doctor,
        groups::attach_items,
        groups::cancel_group,
        groups::delete_group,
        patient::treatments,
        patient::list_files,
        patient::download_file,
        patient::timeline,
        push::vapid_public_key,
        push::patient_subscribe,
        push::patient_unsubscribe,
        push::doctor_subscribe,
        push::doctor_unsubscribe,
        push::admin_subscribe,
        push::admin_unsubscribe,
    ),
    components(schemas(
        HealthRes,
        ErrorRes,
        OkRes,
        LoginReq,
        CreateDoctorReq,
        UpdateDoctorReq,
        PermissionsReq,
        CreatePatientReq,
        UpdatePatientReq,
        UpdateContactReq,
        CreateNoteReq,
        PushSendReq,
        SubscriptionKeysReq,
        SubscribeReq,
        UnsubscribeReq,
        CreateEncounterReq,
        CreateDiagnosisReq,
        CreatePlanReq,
        CreateItemReq,
        UpdateItemStatusReq,
        CreateGroupReq,
        UpdateGroupReq,
        AssignDoctorReq,
        AttachItemsReq,
        AdminDto,
        DoctorDto,
        PermissionsDto,
        PatientDto,
        NoteDto,
        TimelineEventDto,
        FileDto,
        Icd10Dto,
        ItemDto,
        PlanDto,
        DiagnosisDto,
        EncounterDto,
        GroupDto,
        GroupDoctorDto,
        GroupDetailDto,
        LoginAdminRes,
        LoginDoctorRes,
        LoginPatientRes,
        AdminRes,
        DoctorRes,
        DoctorMeRes,
        DoctorsRes,
        PermissionsRes,
        PatientRes,
        PatientsRes,
        NoteRes,
        NotesRes,
        TimelineRes,
        FileRes,
        FilesRes,
        Icd10Res,
        Icd10SearchRes,
        TreatmentsRes,
        EncounterRes,
        DiagnosisRes,
        PlanRes,
        ItemRes,
        GroupsRes,
        GroupRes,
        GroupCancelRes,
        PatientTreatmentsRes,
        VapidKeyRes,
        PushSendRes,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Login and current account"),
        (name = "admin", description = "Clinic administration"),
        (name = "doctor", description = "Treatment records"),
        (name = "treatment-groups", description = "Treatment groups, also mounted under /api/admin"),
        (name = "icd10", description = "Diagnosis catalogue"),
        (name = "patient", description = "Patient portal"),
        (name = "push", description = "Web push subscriptions"),
        (name = "system", description = "Health")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme referenced by the protected paths.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::PathItemType;

    #[test]
    fn test_document_lists_paths_and_security() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/health"));
        assert!(doc.paths.paths.contains_key("/api/doctor/treatment-groups/{id}/cancel"));
        assert!(doc.paths.paths.contains_key("/api/icd10/{code}"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }

    #[test]
    fn test_upload_documents_multipart_body() {
        let doc = ApiDoc::openapi();
        let upload = doc
            .paths
            .paths
            .get("/api/admin/patients/{id}/files")
            .and_then(|item| item.operations.get(&PathItemType::Post))
            .expect("upload operation");
        let body = upload.request_body.as_ref().expect("request body");
        assert!(body.content.contains_key("multipart/form-data"));
    }
}
