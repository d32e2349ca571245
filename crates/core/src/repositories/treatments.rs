//! Clinical chain: encounter → diagnosis → treatment plan → treatment item.

use super::patients::require_patient;
use super::timeline::insert_event;
use crate::timeline::NewTimelineEvent;
use crate::{
    ClinicError, ClinicResult, EventType, Icd10Code, NonEmptyText, Principal, ToothNumber,
    TreatmentStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Encounter {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub diagnoses: Vec<Diagnosis>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnosis {
    pub id: Uuid,
    pub encounter_id: Uuid,
    pub icd10_code: String,
    pub icd10_description: String,
    pub tooth: Option<i16>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub plans: Vec<TreatmentPlan>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentPlan {
    pub id: Uuid,
    pub diagnosis_id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub items: Vec<TreatmentItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentItem {
    pub id: Uuid,
    pub plan_id: Uuid,
    pub group_id: Option<Uuid>,
    pub tooth: i16,
    pub procedure_code: String,
    pub description: Option<String>,
    pub status: TreatmentStatus,
    pub price_cents: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct EncounterRow {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    doctor_name: String,
    occurred_at: DateTime<Utc>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct DiagnosisRow {
    id: Uuid,
    encounter_id: Uuid,
    icd10_code: String,
    icd10_description: String,
    tooth: Option<i16>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    diagnosis_id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ItemRow {
    id: Uuid,
    plan_id: Uuid,
    group_id: Option<Uuid>,
    tooth: i16,
    procedure_code: String,
    description: Option<String>,
    status: String,
    price_cents: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for TreatmentItem {
    type Error = ClinicError;

    fn try_from(row: ItemRow) -> ClinicResult<Self> {
        Ok(Self {
            id: row.id,
            plan_id: row.plan_id,
            group_id: row.group_id,
            tooth: row.tooth,
            procedure_code: row.procedure_code,
            description: row.description,
            status: row.status.parse()?,
            price_cents: row.price_cents,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) const ITEM_COLUMNS: &str = "i.id, i.plan_id, i.group_id, i.tooth, i.procedure_code,
    i.description, i.status, i.price_cents, i.created_at, i.updated_at";

/// Joins an item (`i`) up to its encounter (`e`) so queries can scope by clinic.
pub(crate) const ITEM_TO_ENCOUNTER: &str = "treatment_items i
    JOIN treatment_plans tp ON tp.id = i.plan_id
    JOIN diagnoses dg ON dg.id = tp.diagnosis_id
    JOIN encounters e ON e.id = dg.encounter_id";

pub(crate) fn items_from_rows(rows: Vec<ItemRow>) -> ClinicResult<Vec<TreatmentItem>> {
    rows.into_iter().map(TreatmentItem::try_from).collect()
}

/// A new treatment item. `status` defaults to `draft`.
#[derive(Clone, Debug)]
pub struct NewItem {
    pub tooth: ToothNumber,
    pub procedure_code: NonEmptyText,
    pub description: Option<NonEmptyText>,
    pub status: Option<TreatmentStatus>,
    pub price_cents: Option<i64>,
    pub group_id: Option<Uuid>,
}

/// Result of a status update.
#[derive(Clone, Debug)]
pub struct StatusChange {
    pub item: TreatmentItem,
    pub previous: TreatmentStatus,
    pub patient_id: Uuid,
    /// `false` for a same-status update, which writes nothing.
    pub changed: bool,
}

#[derive(Clone, Debug)]
pub struct TreatmentService {
    pool: PgPool,
}

impl TreatmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_encounter(
        &self,
        doctor: &Principal,
        patient_id: Uuid,
        occurred_at: Option<DateTime<Utc>>,
        notes: Option<&NonEmptyText>,
    ) -> ClinicResult<Encounter> {
        let mut tx = self.pool.begin().await?;
        require_patient(&mut tx, doctor.clinic_id, patient_id).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO encounters (id, clinic_id, patient_id, doctor_id, occurred_at, notes)
             VALUES ($1, $2, $3, $4, COALESCE($5, now()), $6)",
        )
        .bind(id)
        .bind(doctor.clinic_id)
        .bind(patient_id)
        .bind(doctor.id)
        .bind(occurred_at)
        .bind(notes.map(NonEmptyText::as_str))
        .execute(&mut *tx)
        .await
        .map_err(|e| ClinicError::from_foreign_key_violation(e, "doctor"))?;

        let encounter = fetch_encounter(&mut tx, doctor.clinic_id, id).await?;
        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                doctor,
                EventType::EncounterCreated,
                json!({ "encounterId": id, "doctorName": encounter.doctor_name }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;
        Ok(encounter)
    }

    /// Adds a diagnosis. The code must exist in the catalogue.
    pub async fn add_diagnosis(
        &self,
        doctor: &Principal,
        encounter_id: Uuid,
        code: &Icd10Code,
        tooth: Option<ToothNumber>,
        notes: Option<&NonEmptyText>,
    ) -> ClinicResult<Diagnosis> {
        let mut tx = self.pool.begin().await?;
        let patient_id: Uuid = sqlx::query_scalar(
            "SELECT patient_id FROM encounters WHERE clinic_id = $1 AND id = $2",
        )
        .bind(doctor.clinic_id)
        .bind(encounter_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ClinicError::NotFound("encounter"))?;

        let description: String =
            sqlx::query_scalar("SELECT description FROM icd10_codes WHERE code = $1")
                .bind(code.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(ClinicError::NotFound("icd10"))?;

        let row = sqlx::query_as::<_, DiagnosisRow>(
            "INSERT INTO diagnoses (id, encounter_id, icd10_code, tooth, notes)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, encounter_id, icd10_code, $6::text AS icd10_description, tooth, notes,
                 created_at",
        )
        .bind(Uuid::new_v4())
        .bind(encounter_id)
        .bind(code.as_str())
        .bind(tooth.map(|t| i16::from(t.value())))
        .bind(notes.map(NonEmptyText::as_str))
        .bind(&description)
        .fetch_one(&mut *tx)
        .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                doctor,
                EventType::DiagnosisAdded,
                json!({
                    "diagnosisId": row.id,
                    "icd10Code": row.icd10_code,
                    "description": description,
                    "tooth": row.tooth,
                }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;

        Ok(diagnosis_from_row(row, Vec::new()))
    }

    pub async fn add_plan(
        &self,
        doctor: &Principal,
        diagnosis_id: Uuid,
        title: &NonEmptyText,
    ) -> ClinicResult<TreatmentPlan> {
        let mut tx = self.pool.begin().await?;
        let patient_id: Uuid = sqlx::query_scalar(
            "SELECT e.patient_id FROM diagnoses dg JOIN encounters e ON e.id = dg.encounter_id
             WHERE e.clinic_id = $1 AND dg.id = $2",
        )
        .bind(doctor.clinic_id)
        .bind(diagnosis_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ClinicError::NotFound("diagnosis"))?;

        let row = sqlx::query_as::<_, PlanRow>(
            "INSERT INTO treatment_plans (id, diagnosis_id, title) VALUES ($1, $2, $3)
             RETURNING id, diagnosis_id, title, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(diagnosis_id)
        .bind(title.as_str())
        .fetch_one(&mut *tx)
        .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                doctor,
                EventType::TreatmentPlanCreated,
                json!({ "planId": row.id, "diagnosisId": diagnosis_id, "title": row.title }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;

        Ok(TreatmentPlan {
            id: row.id,
            diagnosis_id: row.diagnosis_id,
            title: row.title,
            created_at: row.created_at,
            items: Vec::new(),
        })
    }

    pub async fn add_item(
        &self,
        doctor: &Principal,
        plan_id: Uuid,
        new: NewItem,
    ) -> ClinicResult<TreatmentItem> {
        let mut tx = self.pool.begin().await?;
        let patient_id: Uuid = sqlx::query_scalar(
            "SELECT e.patient_id FROM treatment_plans tp
             JOIN diagnoses dg ON dg.id = tp.diagnosis_id
             JOIN encounters e ON e.id = dg.encounter_id
             WHERE e.clinic_id = $1 AND tp.id = $2",
        )
        .bind(doctor.clinic_id)
        .bind(plan_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ClinicError::NotFound("plan"))?;

        if let Some(group_id) = new.group_id {
            ensure_group_accepts_items(&mut tx, doctor.clinic_id, group_id, patient_id).await?;
        }

        let status = new.status.unwrap_or(TreatmentStatus::Draft);
        let row = sqlx::query_as::<_, ItemRow>(
            "INSERT INTO treatment_items AS i
                 (id, plan_id, group_id, tooth, procedure_code, description, status, price_cents)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING i.id, i.plan_id, i.group_id, i.tooth, i.procedure_code,
                 i.description, i.status, i.price_cents, i.created_at, i.updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(plan_id)
        .bind(new.group_id)
        .bind(i16::from(new.tooth.value()))
        .bind(new.procedure_code.as_str())
        .bind(new.description.as_ref().map(NonEmptyText::as_str))
        .bind(status.as_str())
        .bind(new.price_cents)
        .fetch_one(&mut *tx)
        .await?;
        let item = TreatmentItem::try_from(row)?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                doctor,
                EventType::TreatmentItemCreated,
                json!({
                    "itemId": item.id,
                    "procedureCode": item.procedure_code,
                    "tooth": item.tooth,
                    "status": item.status,
                }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;
        Ok(item)
    }

    /// Moves an item along its lifecycle. The row is locked for the duration so
    /// concurrent updates cannot both pass the transition check.
    pub async fn change_item_status(
        &self,
        doctor: &Principal,
        item_id: Uuid,
        next: TreatmentStatus,
    ) -> ClinicResult<StatusChange> {
        let mut tx = self.pool.begin().await?;
        let (current, patient_id) = lock_item(&mut tx, doctor.clinic_id, item_id).await?;
        let previous = current.status;
        previous.transition_to(next)?;

        if previous == next {
            return Ok(StatusChange {
                item: current,
                previous,
                patient_id,
                changed: false,
            });
        }

        let row = sqlx::query_as::<_, ItemRow>(
            "UPDATE treatment_items AS i SET status = $2, updated_at = now() WHERE i.id = $1
             RETURNING i.id, i.plan_id, i.group_id, i.tooth, i.procedure_code,
                 i.description, i.status, i.price_cents, i.created_at, i.updated_at",
        )
        .bind(item_id)
        .bind(next.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let item = TreatmentItem::try_from(row)?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                doctor,
                EventType::TreatmentItemStatusChanged,
                json!({
                    "itemId": item.id,
                    "procedureCode": item.procedure_code,
                    "tooth": item.tooth,
                    "from": previous,
                    "to": next,
                }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(item_id = %item_id, from = %previous, to = %next, "treatment item status changed");
        Ok(StatusChange {
            item,
            previous,
            patient_id,
            changed: true,
        })
    }

    pub async fn delete_item(&self, doctor: &Principal, item_id: Uuid) -> ClinicResult<()> {
        let mut tx = self.pool.begin().await?;
        let (item, patient_id) = lock_item(&mut tx, doctor.clinic_id, item_id).await?;

        sqlx::query("DELETE FROM treatment_items WHERE id = $1")
            .bind(item_id)
            .execute(&mut *tx)
            .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                doctor,
                EventType::TreatmentItemDeleted,
                json!({
                    "itemId": item.id,
                    "procedureCode": item.procedure_code,
                    "tooth": item.tooth,
                }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Full treatment history of a patient, newest encounter first.
    pub async fn patient_treatments(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
    ) -> ClinicResult<Vec<Encounter>> {
        let mut conn = self.pool.acquire().await?;
        require_patient(&mut conn, clinic_id, patient_id).await?;

        let encounters = sqlx::query_as::<_, EncounterRow>(&format!(
            "{SELECT_ENCOUNTER} WHERE e.clinic_id = $1 AND e.patient_id = $2
             ORDER BY e.occurred_at DESC, e.id"
        ))
        .bind(clinic_id)
        .bind(patient_id)
        .fetch_all(&mut *conn)
        .await?;
        let encounter_ids: Vec<Uuid> = encounters.iter().map(|e| e.id).collect();

        let diagnoses = sqlx::query_as::<_, DiagnosisRow>(
            "SELECT dg.id, dg.encounter_id, dg.icd10_code, c.description AS icd10_description,
                 dg.tooth, dg.notes, dg.created_at
             FROM diagnoses dg JOIN icd10_codes c ON c.code = dg.icd10_code
             WHERE dg.encounter_id = ANY($1)
             ORDER BY dg.created_at, dg.id",
        )
        .bind(&encounter_ids)
        .fetch_all(&mut *conn)
        .await?;
        let diagnosis_ids: Vec<Uuid> = diagnoses.iter().map(|d| d.id).collect();

        let plans = sqlx::query_as::<_, PlanRow>(
            "SELECT id, diagnosis_id, title, created_at FROM treatment_plans
             WHERE diagnosis_id = ANY($1) ORDER BY created_at, id",
        )
        .bind(&diagnosis_ids)
        .fetch_all(&mut *conn)
        .await?;
        let plan_ids: Vec<Uuid> = plans.iter().map(|p| p.id).collect();

        let items = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM treatment_items i
             WHERE i.plan_id = ANY($1) ORDER BY i.tooth, i.created_at, i.id"
        ))
        .bind(&plan_ids)
        .fetch_all(&mut *conn)
        .await?;

        assemble(encounters, diagnoses, plans, items_from_rows(items)?)
    }
}

const SELECT_ENCOUNTER: &str = "SELECT e.id, e.patient_id, e.doctor_id, d.display_name AS doctor_name,
        e.occurred_at, e.notes, e.created_at
     FROM encounters e JOIN doctors d ON d.id = e.doctor_id";

async fn fetch_encounter(
    conn: &mut PgConnection,
    clinic_id: Uuid,
    id: Uuid,
) -> ClinicResult<Encounter> {
    let row = sqlx::query_as::<_, EncounterRow>(&format!(
        "{SELECT_ENCOUNTER} WHERE e.clinic_id = $1 AND e.id = $2"
    ))
    .bind(clinic_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(ClinicError::NotFound("encounter"))?;
    Ok(encounter_from_row(row, Vec::new()))
}

/// Locks an item row and returns it with its patient.
async fn lock_item(
    conn: &mut PgConnection,
    clinic_id: Uuid,
    item_id: Uuid,
) -> ClinicResult<(TreatmentItem, Uuid)> {
    #[derive(sqlx::FromRow)]
    struct LockedRow {
        #[sqlx(flatten)]
        item: ItemRow,
        patient_id: Uuid,
    }

    let row = sqlx::query_as::<_, LockedRow>(&format!(
        "SELECT {ITEM_COLUMNS}, e.patient_id FROM {ITEM_TO_ENCOUNTER}
         WHERE e.clinic_id = $1 AND i.id = $2
         FOR UPDATE OF i"
    ))
    .bind(clinic_id)
    .bind(item_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(ClinicError::NotFound("item"))?;

    Ok((TreatmentItem::try_from(row.item)?, row.patient_id))
}

/// Items may only join an open group of the same patient.
async fn ensure_group_accepts_items(
    conn: &mut PgConnection,
    clinic_id: Uuid,
    group_id: Uuid,
    patient_id: Uuid,
) -> ClinicResult<()> {
    let group: Option<(Uuid, String)> = sqlx::query_as(
        "SELECT patient_id, status FROM treatment_groups WHERE clinic_id = $1 AND id = $2",
    )
    .bind(clinic_id)
    .bind(group_id)
    .fetch_optional(&mut *conn)
    .await?;

    match group {
        None => Err(ClinicError::NotFound("treatment_group")),
        Some((_, status)) if status == "cancelled" => Err(ClinicError::AlreadyCancelled),
        Some((owner, _)) if owner != patient_id => Err(ClinicError::invalid(
            "groupId",
            "treatment group belongs to another patient",
        )),
        Some(_) => Ok(()),
    }
}

fn encounter_from_row(row: EncounterRow, diagnoses: Vec<Diagnosis>) -> Encounter {
    Encounter {
        id: row.id,
        patient_id: row.patient_id,
        doctor_id: row.doctor_id,
        doctor_name: row.doctor_name,
        occurred_at: row.occurred_at,
        notes: row.notes,
        created_at: row.created_at,
        diagnoses,
    }
}

fn diagnosis_from_row(row: DiagnosisRow, plans: Vec<TreatmentPlan>) -> Diagnosis {
    Diagnosis {
        id: row.id,
        encounter_id: row.encounter_id,
        icd10_code: row.icd10_code,
        icd10_description: row.icd10_description,
        tooth: row.tooth,
        notes: row.notes,
        created_at: row.created_at,
        plans,
    }
}

/// Nests flat rows into encounters, keeping each level's query order.
fn assemble(
    encounters: Vec<EncounterRow>,
    diagnoses: Vec<DiagnosisRow>,
    plans: Vec<PlanRow>,
    items: Vec<TreatmentItem>,
) -> ClinicResult<Vec<Encounter>> {
    let mut items_by_plan: HashMap<Uuid, Vec<TreatmentItem>> = HashMap::new();
    for item in items {
        items_by_plan.entry(item.plan_id).or_default().push(item);
    }

    let mut plans_by_diagnosis: HashMap<Uuid, Vec<TreatmentPlan>> = HashMap::new();
    for plan in plans {
        let items = items_by_plan.remove(&plan.id).unwrap_or_default();
        plans_by_diagnosis
            .entry(plan.diagnosis_id)
            .or_default()
            .push(TreatmentPlan {
                id: plan.id,
                diagnosis_id: plan.diagnosis_id,
                title: plan.title,
                created_at: plan.created_at,
                items,
            });
    }

    let mut diagnoses_by_encounter: HashMap<Uuid, Vec<Diagnosis>> = HashMap::new();
    for row in diagnoses {
        let plans = plans_by_diagnosis.remove(&row.id).unwrap_or_default();
        diagnoses_by_encounter
            .entry(row.encounter_id)
            .or_default()
            .push(diagnosis_from_row(row, plans));
    }

    Ok(encounters
        .into_iter()
        .map(|row| {
            let diagnoses = diagnoses_by_encounter.remove(&row.id).unwrap_or_default();
            encounter_from_row(row, diagnoses)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_nests_rows() {
        let now = Utc::now();
        let (encounter_id, diagnosis_id, plan_id) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let encounters = vec![EncounterRow {
            id: encounter_id,
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            doctor_name: "Dr Ames".into(),
            occurred_at: now,
            notes: None,
            created_at: now,
        }];
        let diagnoses = vec![DiagnosisRow {
            id: diagnosis_id,
            encounter_id,
            icd10_code: "K02.1".into(),
            icd10_description: "Caries of dentine".into(),
            tooth: Some(36),
            notes: None,
            created_at: now,
        }];
        let plans = vec![PlanRow {
            id: plan_id,
            diagnosis_id,
            title: "Restore 36".into(),
            created_at: now,
        }];
        let items = vec![TreatmentItem {
            id: Uuid::new_v4(),
            plan_id,
            group_id: None,
            tooth: 36,
            procedure_code: "D2391".into(),
            description: None,
            status: TreatmentStatus::Draft,
            price_cents: Some(12_000),
            created_at: now,
            updated_at: now,
        }];

        let nested = assemble(encounters, diagnoses, plans, items).unwrap();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].diagnoses.len(), 1);
        assert_eq!(nested[0].diagnoses[0].plans.len(), 1);
        assert_eq!(nested[0].diagnoses[0].plans[0].items[0].procedure_code, "D2391");
    }

    #[test]
    fn test_item_row_rejects_unknown_status() {
        let now = Utc::now();
        let row = ItemRow {
            id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            group_id: None,
            tooth: 11,
            procedure_code: "D0120".into(),
            description: None,
            status: "archived".into(),
            price_cents: None,
            created_at: now,
            updated_at: now,
        };
        assert!(TreatmentItem::try_from(row).is_err());
    }
}
