//! Treatment groups: named bundles of treatment items for one patient, with assigned
//! doctors and a status derived from the items.
//!
//! Every multi-row write here (creation with assignments, primary hand-over, cancellation
//! cascade) runs in one transaction together with its timeline event. The group row is
//! locked with `FOR UPDATE` first so concurrent writers serialise on it.

use super::patients::require_patient;
use super::timeline::insert_event;
use super::treatments::{
    items_from_rows, ItemRow, TreatmentItem, ITEM_COLUMNS, ITEM_TO_ENCOUNTER,
};
use crate::timeline::NewTimelineEvent;
use crate::{
    ClinicError, ClinicResult, EventType, GroupStatus, NonEmptyText, Principal, Role,
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
pub struct TreatmentGroup {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub name: String,
    pub description: Option<String>,
    /// Status as last written.
    pub status: GroupStatus,
    /// Status derived from the items; see [`GroupStatus::derive`].
    pub calculated_status: GroupStatus,
    pub item_count: usize,
    pub done_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GroupDoctor {
    pub doctor_id: Uuid,
    pub display_name: String,
    pub specialty: Option<String>,
    pub is_primary: bool,
    pub assigned_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentGroupDetail {
    #[serde(flatten)]
    pub group: TreatmentGroup,
    pub doctors: Vec<GroupDoctor>,
    pub items: Vec<TreatmentItem>,
}

impl TreatmentGroupDetail {
    pub fn primary_doctor(&self) -> Option<&GroupDoctor> {
        self.doctors.iter().find(|d| d.is_primary)
    }
}

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: Uuid,
    clinic_id: Uuid,
    patient_id: Uuid,
    patient_name: String,
    name: String,
    description: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GroupRow {
    fn into_group(self, item_statuses: &[TreatmentStatus]) -> ClinicResult<TreatmentGroup> {
        let status: GroupStatus = self.status.parse()?;
        Ok(TreatmentGroup {
            id: self.id,
            clinic_id: self.clinic_id,
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            name: self.name,
            description: self.description,
            status,
            calculated_status: GroupStatus::derive(status, item_statuses),
            item_count: item_statuses.len(),
            done_count: item_statuses
                .iter()
                .filter(|s| **s == TreatmentStatus::Done)
                .count(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_GROUP: &str = "SELECT g.id, g.clinic_id, g.patient_id,
        p.first_name || ' ' || p.last_name AS patient_name,
        g.name, g.description, g.status, g.created_at, g.updated_at
     FROM treatment_groups g JOIN patients p ON p.id = g.patient_id";

#[derive(Clone, Debug)]
pub struct NewGroup {
    pub patient_id: Uuid,
    pub name: NonEmptyText,
    pub description: Option<NonEmptyText>,
    pub doctor_ids: Vec<Uuid>,
    pub primary_doctor_id: Option<Uuid>,
}

impl NewGroup {
    /// Doctors to assign and which of them is primary.
    ///
    /// Duplicates are dropped; an explicit primary is added when missing from the list;
    /// otherwise the first listed doctor is primary. A doctor creating a group without
    /// naming anyone is assigned as primary.
    pub fn assignments(&self, creator: &Principal) -> (Vec<Uuid>, Option<Uuid>) {
        let mut doctors: Vec<Uuid> = Vec::with_capacity(self.doctor_ids.len() + 1);
        for id in &self.doctor_ids {
            if !doctors.contains(id) {
                doctors.push(*id);
            }
        }
        if doctors.is_empty() && self.primary_doctor_id.is_none() && creator.role == Role::Doctor
        {
            doctors.push(creator.id);
        }
        let primary = match self.primary_doctor_id {
            Some(primary) => {
                if !doctors.contains(&primary) {
                    doctors.insert(0, primary);
                }
                Some(primary)
            }
            None => doctors.first().copied(),
        };
        (doctors, primary)
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Clone, Debug, Default)]
pub struct GroupUpdate {
    pub name: Option<NonEmptyText>,
    pub description: Option<NonEmptyText>,
    pub status: Option<GroupStatus>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GroupFilter {
    pub patient_id: Option<Uuid>,
    /// Only groups this doctor is assigned to.
    pub assigned_doctor: Option<Uuid>,
}

/// Result of cancelling a group.
#[derive(Clone, Debug)]
pub struct GroupCancellation {
    pub group: TreatmentGroupDetail,
    pub cancelled_items: u64,
}

#[derive(Clone, Debug)]
pub struct TreatmentGroupService {
    pool: PgPool,
}

impl TreatmentGroupService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, actor: &Principal, new: NewGroup) -> ClinicResult<TreatmentGroupDetail> {
        let (doctor_ids, primary) = new.assignments(actor);

        let mut tx = self.pool.begin().await?;
        require_patient(&mut tx, actor.clinic_id, new.patient_id).await?;

        let doctor_names = active_doctor_names(&mut tx, actor.clinic_id, &doctor_ids).await?;

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO treatment_groups (id, clinic_id, patient_id, name, description, status)
             VALUES ($1, $2, $3, $4, $5, 'planned')",
        )
        .bind(id)
        .bind(actor.clinic_id)
        .bind(new.patient_id)
        .bind(new.name.as_str())
        .bind(new.description.as_ref().map(NonEmptyText::as_str))
        .execute(&mut *tx)
        .await?;

        for doctor_id in &doctor_ids {
            sqlx::query(
                "INSERT INTO treatment_group_doctors (group_id, doctor_id, is_primary)
                 VALUES ($1, $2, $3)",
            )
            .bind(id)
            .bind(doctor_id)
            .bind(Some(*doctor_id) == primary)
            .execute(&mut *tx)
            .await?;
        }

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::TreatmentGroupCreated,
                json!({
                    "groupId": id,
                    "groupName": new.name.as_str(),
                    "doctors": doctor_names,
                }),
            )
            .for_patient(new.patient_id),
        )
        .await?;

        let detail = load_detail(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;

        tracing::info!(group_id = %id, doctors = doctor_ids.len(), "treatment group created");
        Ok(detail)
    }

    pub async fn list(&self, clinic_id: Uuid, filter: GroupFilter) -> ClinicResult<Vec<TreatmentGroup>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, GroupRow>(&format!(
            "{SELECT_GROUP}
             WHERE g.clinic_id = $1
               AND ($2::uuid IS NULL OR g.patient_id = $2)
               AND ($3::uuid IS NULL OR EXISTS (
                    SELECT 1 FROM treatment_group_doctors gd
                    WHERE gd.group_id = g.id AND gd.doctor_id = $3))
             ORDER BY g.created_at DESC, g.id"
        ))
        .bind(clinic_id)
        .bind(filter.patient_id)
        .bind(filter.assigned_doctor)
        .fetch_all(&mut *conn)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let statuses = item_statuses(&mut conn, &ids).await?;
        rows.into_iter()
            .map(|row| {
                let items = statuses.get(&row.id).map(Vec::as_slice).unwrap_or_default();
                row.into_group(items)
            })
            .collect()
    }

    pub async fn get(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<TreatmentGroupDetail> {
        let mut conn = self.pool.acquire().await?;
        load_detail(&mut conn, clinic_id, id).await
    }

    /// Every group of a patient with doctors and items, newest first.
    pub async fn patient_groups(
        &self,
        clinic_id: Uuid,
        patient_id: Uuid,
    ) -> ClinicResult<Vec<TreatmentGroupDetail>> {
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM treatment_groups WHERE clinic_id = $1 AND patient_id = $2
             ORDER BY created_at DESC, id",
        )
        .bind(clinic_id)
        .bind(patient_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            groups.push(load_detail(&mut conn, clinic_id, id).await?);
        }
        Ok(groups)
    }

    /// Updates name, description or stored status. `cancelled` is only reachable
    /// through [`TreatmentGroupService::cancel`].
    pub async fn update(
        &self,
        actor: &Principal,
        id: Uuid,
        update: GroupUpdate,
    ) -> ClinicResult<TreatmentGroupDetail> {
        if update.status == Some(GroupStatus::Cancelled) {
            return Err(ClinicError::invalid("status", "use the cancel operation"));
        }
        if update.name.is_none() && update.description.is_none() && update.status.is_none() {
            return Err(ClinicError::MissingFields);
        }

        let mut tx = self.pool.begin().await?;
        let locked = lock_group(&mut tx, actor.clinic_id, id).await?;
        if locked.status == GroupStatus::Cancelled {
            return Err(ClinicError::AlreadyCancelled);
        }

        sqlx::query(
            "UPDATE treatment_groups SET
                 name = COALESCE($2, name),
                 description = COALESCE($3, description),
                 status = COALESCE($4, status),
                 updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(update.name.as_ref().map(NonEmptyText::as_str))
        .bind(update.description.as_ref().map(NonEmptyText::as_str))
        .bind(update.status.map(GroupStatus::as_str))
        .execute(&mut *tx)
        .await?;

        let name = update
            .name
            .as_ref()
            .map(|n| n.as_str().to_string())
            .unwrap_or(locked.name);
        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::TreatmentGroupUpdated,
                json!({ "groupId": id, "groupName": name, "status": update.status }),
            )
            .for_patient(locked.patient_id),
        )
        .await?;

        let detail = load_detail(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Assigns a doctor, or changes an existing assignment's primary flag. Making a
    /// doctor primary demotes the previous primary.
    pub async fn assign_doctor(
        &self,
        actor: &Principal,
        id: Uuid,
        doctor_id: Uuid,
        is_primary: bool,
    ) -> ClinicResult<TreatmentGroupDetail> {
        let mut tx = self.pool.begin().await?;
        let locked = lock_group(&mut tx, actor.clinic_id, id).await?;
        let doctor_name = active_doctor_names(&mut tx, actor.clinic_id, &[doctor_id])
            .await?
            .pop()
            .unwrap_or_default();

        if is_primary {
            sqlx::query(
                "UPDATE treatment_group_doctors SET is_primary = FALSE
                 WHERE group_id = $1 AND is_primary AND doctor_id <> $2",
            )
            .bind(id)
            .bind(doctor_id)
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query(
            "INSERT INTO treatment_group_doctors (group_id, doctor_id, is_primary)
             VALUES ($1, $2, $3)
             ON CONFLICT (group_id, doctor_id) DO UPDATE SET is_primary = EXCLUDED.is_primary",
        )
        .bind(id)
        .bind(doctor_id)
        .bind(is_primary)
        .execute(&mut *tx)
        .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::DoctorAssigned,
                json!({
                    "groupId": id,
                    "groupName": locked.name,
                    "doctorId": doctor_id,
                    "doctorName": doctor_name,
                    "isPrimary": is_primary,
                }),
            )
            .for_patient(locked.patient_id),
        )
        .await?;

        let detail = load_detail(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    pub async fn unassign_doctor(
        &self,
        actor: &Principal,
        id: Uuid,
        doctor_id: Uuid,
    ) -> ClinicResult<TreatmentGroupDetail> {
        let mut tx = self.pool.begin().await?;
        let locked = lock_group(&mut tx, actor.clinic_id, id).await?;

        let doctor_name: Option<String> = sqlx::query_scalar(
            "DELETE FROM treatment_group_doctors gd USING doctors d
             WHERE gd.group_id = $1 AND gd.doctor_id = $2 AND d.id = gd.doctor_id
             RETURNING d.display_name",
        )
        .bind(id)
        .bind(doctor_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(doctor_name) = doctor_name else {
            return Err(ClinicError::NotFound("assignment"));
        };

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::DoctorUnassigned,
                json!({
                    "groupId": id,
                    "groupName": locked.name,
                    "doctorId": doctor_id,
                    "doctorName": doctor_name,
                }),
            )
            .for_patient(locked.patient_id),
        )
        .await?;

        let detail = load_detail(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Attaches existing items of the group's patient. Items already in another group
    /// are moved.
    pub async fn attach_items(
        &self,
        actor: &Principal,
        id: Uuid,
        item_ids: &[Uuid],
    ) -> ClinicResult<TreatmentGroupDetail> {
        let mut wanted: Vec<Uuid> = item_ids.to_vec();
        wanted.sort_unstable();
        wanted.dedup();
        if wanted.is_empty() {
            return Err(ClinicError::MissingFields);
        }

        let mut tx = self.pool.begin().await?;
        let locked = lock_group(&mut tx, actor.clinic_id, id).await?;
        if locked.status == GroupStatus::Cancelled {
            return Err(ClinicError::AlreadyCancelled);
        }

        let owners: Vec<(Uuid, Uuid)> = sqlx::query_as(&format!(
            "SELECT i.id, e.patient_id FROM {ITEM_TO_ENCOUNTER}
             WHERE e.clinic_id = $1 AND i.id = ANY($2)"
        ))
        .bind(actor.clinic_id)
        .bind(&wanted)
        .fetch_all(&mut *tx)
        .await?;
        if owners.len() != wanted.len() {
            return Err(ClinicError::NotFound("item"));
        }
        if owners.iter().any(|(_, patient)| *patient != locked.patient_id) {
            return Err(ClinicError::invalid(
                "itemIds",
                "items must belong to the group's patient",
            ));
        }

        sqlx::query(
            "UPDATE treatment_items SET group_id = $1, updated_at = now() WHERE id = ANY($2)",
        )
        .bind(id)
        .bind(&wanted)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE treatment_groups SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::TreatmentGroupUpdated,
                json!({
                    "groupId": id,
                    "groupName": locked.name,
                    "attachedItems": wanted.len(),
                }),
            )
            .for_patient(locked.patient_id),
        )
        .await?;

        let detail = load_detail(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;
        Ok(detail)
    }

    /// Cancels the group and every open item in it.
    pub async fn cancel(&self, actor: &Principal, id: Uuid) -> ClinicResult<GroupCancellation> {
        let mut tx = self.pool.begin().await?;
        let locked = lock_group(&mut tx, actor.clinic_id, id).await?;
        if locked.status == GroupStatus::Cancelled {
            return Err(ClinicError::AlreadyCancelled);
        }

        sqlx::query(
            "UPDATE treatment_groups SET status = 'cancelled', updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let cancelled_items = sqlx::query(
            "UPDATE treatment_items SET status = 'cancelled', updated_at = now()
             WHERE group_id = $1 AND status NOT IN ('done', 'cancelled')",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::TreatmentGroupCancelled,
                json!({
                    "groupId": id,
                    "groupName": locked.name,
                    "cancelledItems": cancelled_items,
                }),
            )
            .for_patient(locked.patient_id),
        )
        .await?;

        let group = load_detail(&mut tx, actor.clinic_id, id).await?;
        tx.commit().await?;

        tracing::info!(group_id = %id, cancelled_items, "treatment group cancelled");
        Ok(GroupCancellation {
            group,
            cancelled_items,
        })
    }

    /// Deletes the group. Its items stay in their plans, detached.
    pub async fn delete(&self, actor: &Principal, id: Uuid) -> ClinicResult<()> {
        let mut tx = self.pool.begin().await?;
        let locked = lock_group(&mut tx, actor.clinic_id, id).await?;

        let detached = sqlx::query(
            "UPDATE treatment_items SET group_id = NULL, updated_at = now() WHERE group_id = $1",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        sqlx::query("DELETE FROM treatment_groups WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::TreatmentGroupDeleted,
                json!({ "groupId": id, "groupName": locked.name, "detachedItems": detached }),
            )
            .for_patient(locked.patient_id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(group_id = %id, detached, "treatment group deleted");
        Ok(())
    }
}

struct LockedGroup {
    patient_id: Uuid,
    name: String,
    status: GroupStatus,
}

async fn lock_group(conn: &mut PgConnection, clinic_id: Uuid, id: Uuid) -> ClinicResult<LockedGroup> {
    let row: Option<(Uuid, String, String)> = sqlx::query_as(
        "SELECT patient_id, name, status FROM treatment_groups
         WHERE clinic_id = $1 AND id = $2 FOR UPDATE",
    )
    .bind(clinic_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    let (patient_id, name, status) = row.ok_or(ClinicError::NotFound("treatment_group"))?;
    Ok(LockedGroup {
        patient_id,
        name,
        status: status.parse()?,
    })
}

/// Display names of the given active doctors, in input order. Fails with `doctor`
/// not found if any id is unknown, inactive, or from another clinic.
async fn active_doctor_names(
    conn: &mut PgConnection,
    clinic_id: Uuid,
    ids: &[Uuid],
) -> ClinicResult<Vec<String>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let found: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT id, display_name FROM doctors WHERE clinic_id = $1 AND active AND id = ANY($2)",
    )
    .bind(clinic_id)
    .bind(ids)
    .fetch_all(&mut *conn)
    .await?;

    let by_id: HashMap<Uuid, String> = found.into_iter().collect();
    ids.iter()
        .map(|id| by_id.get(id).cloned().ok_or(ClinicError::NotFound("doctor")))
        .collect()
}

async fn item_statuses(
    conn: &mut PgConnection,
    group_ids: &[Uuid],
) -> ClinicResult<HashMap<Uuid, Vec<TreatmentStatus>>> {
    let rows: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT group_id, status FROM treatment_items WHERE group_id = ANY($1)",
    )
    .bind(group_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut statuses: HashMap<Uuid, Vec<TreatmentStatus>> = HashMap::new();
    for (group_id, status) in rows {
        statuses.entry(group_id).or_default().push(status.parse()?);
    }
    Ok(statuses)
}

async fn load_detail(
    conn: &mut PgConnection,
    clinic_id: Uuid,
    id: Uuid,
) -> ClinicResult<TreatmentGroupDetail> {
    let row = sqlx::query_as::<_, GroupRow>(&format!(
        "{SELECT_GROUP} WHERE g.clinic_id = $1 AND g.id = $2"
    ))
    .bind(clinic_id)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(ClinicError::NotFound("treatment_group"))?;

    let doctors = sqlx::query_as::<_, GroupDoctor>(
        "SELECT gd.doctor_id, d.display_name, d.specialty, gd.is_primary, gd.assigned_at
         FROM treatment_group_doctors gd JOIN doctors d ON d.id = gd.doctor_id
         WHERE gd.group_id = $1
         ORDER BY gd.is_primary DESC, gd.assigned_at, d.display_name",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let items = items_from_rows(
        sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM treatment_items i
             WHERE i.group_id = $1 ORDER BY i.tooth, i.created_at, i.id"
        ))
        .bind(id)
        .fetch_all(&mut *conn)
        .await?,
    )?;

    let statuses: Vec<TreatmentStatus> = items.iter().map(|i| i.status).collect();
    Ok(TreatmentGroupDetail {
        group: row.into_group(&statuses)?,
        doctors,
        items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::fixtures;
    use crate::repositories::treatments::{NewItem, TreatmentService};
    use crate::{Icd10Code, ToothNumber};

    fn principal(role: Role) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role,
            clinic_id: Uuid::new_v4(),
            clinic_code: "smile".into(),
        }
    }

    fn new_group(doctor_ids: Vec<Uuid>, primary: Option<Uuid>) -> NewGroup {
        NewGroup {
            patient_id: Uuid::new_v4(),
            name: NonEmptyText::new("Crowns").unwrap(),
            description: None,
            doctor_ids,
            primary_doctor_id: primary,
        }
    }

    #[test]
    fn test_doctor_creator_becomes_primary() {
        let doctor = principal(Role::Doctor);
        let (doctors, primary) = new_group(vec![], None).assignments(&doctor);
        assert_eq!(doctors, vec![doctor.id]);
        assert_eq!(primary, Some(doctor.id));
    }

    #[test]
    fn test_admin_creator_without_doctors_assigns_nobody() {
        let (doctors, primary) = new_group(vec![], None).assignments(&principal(Role::Admin));
        assert!(doctors.is_empty());
        assert!(primary.is_none());
    }

    #[test]
    fn test_first_listed_doctor_is_primary_by_default() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (doctors, primary) =
            new_group(vec![a, b, a], None).assignments(&principal(Role::Admin));
        assert_eq!(doctors, vec![a, b]);
        assert_eq!(primary, Some(a));
    }

    #[test]
    fn test_explicit_primary_is_added_when_missing() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (doctors, primary) = new_group(vec![a], Some(b)).assignments(&principal(Role::Doctor));
        assert_eq!(doctors, vec![b, a]);
        assert_eq!(primary, Some(b));
    }

    #[test]
    fn test_group_row_derives_calculated_status() {
        let now = Utc::now();
        let row = GroupRow {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            patient_name: "Ann Lee".into(),
            name: "Crowns".into(),
            description: None,
            status: "planned".into(),
            created_at: now,
            updated_at: now,
        };
        let group = row
            .into_group(&[TreatmentStatus::Done, TreatmentStatus::Cancelled])
            .unwrap();
        assert_eq!(group.status, GroupStatus::Planned);
        assert_eq!(group.calculated_status, GroupStatus::Completed);
        assert_eq!(group.item_count, 2);
        assert_eq!(group.done_count, 1);
    }

    fn item(tooth: i64, code: &str, status: TreatmentStatus, group_id: Uuid) -> NewItem {
        NewItem {
            tooth: ToothNumber::new(tooth).unwrap(),
            procedure_code: NonEmptyText::new(code).unwrap(),
            description: None,
            status: Some(status),
            price_cents: None,
            group_id: Some(group_id),
        }
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn test_cancel_cascades_to_open_items(pool: PgPool) {
        let admin = fixtures::clinic(&pool).await;
        let doctor = fixtures::doctor(&pool, &admin, "Dr Ames").await;
        let patient_id = fixtures::patient(&pool, &admin, "Ann", "Lee").await;
        fixtures::icd10(&pool, "K02.1", "Caries of dentine").await;

        let groups = TreatmentGroupService::new(pool.clone());
        let treatments = TreatmentService::new(pool.clone());

        let mut new = new_group(vec![], None);
        new.patient_id = patient_id;
        let group = groups.create(&doctor, new).await.unwrap();
        assert_eq!(group.primary_doctor().map(|d| d.doctor_id), Some(doctor.id));

        let encounter = treatments
            .create_encounter(&doctor, patient_id, None, None)
            .await
            .unwrap();
        let diagnosis = treatments
            .add_diagnosis(&doctor, encounter.id, &Icd10Code::parse("K02.1").unwrap(), None, None)
            .await
            .unwrap();
        let plan = treatments
            .add_plan(&doctor, diagnosis.id, &NonEmptyText::new("Restore lower left").unwrap())
            .await
            .unwrap();

        let group_id = group.group.id;
        let draft = treatments
            .add_item(&doctor, plan.id, item(36, "D2391", TreatmentStatus::Draft, group_id))
            .await
            .unwrap();
        assert_eq!(draft.status, TreatmentStatus::Draft);
        let approved = treatments
            .add_item(&doctor, plan.id, item(37, "D2392", TreatmentStatus::Draft, group_id))
            .await
            .unwrap();
        treatments
            .change_item_status(&doctor, approved.id, TreatmentStatus::Approved)
            .await
            .unwrap();
        let done = treatments
            .add_item(&doctor, plan.id, item(35, "D1110", TreatmentStatus::Planned, group_id))
            .await
            .unwrap();
        let change = treatments
            .change_item_status(&doctor, done.id, TreatmentStatus::Done)
            .await
            .unwrap();
        assert!(change.changed);

        let before = groups.get(admin.clinic_id, group_id).await.unwrap();
        assert_eq!(before.group.calculated_status, GroupStatus::InProgress);
        assert_eq!(before.group.done_count, 1);

        let cancellation = groups.cancel(&doctor, group_id).await.unwrap();
        assert_eq!(cancellation.cancelled_items, 2);
        assert_eq!(cancellation.group.group.status, GroupStatus::Cancelled);
        assert_eq!(cancellation.group.group.calculated_status, GroupStatus::Cancelled);
        let statuses: HashMap<Uuid, TreatmentStatus> = cancellation
            .group
            .items
            .iter()
            .map(|i| (i.id, i.status))
            .collect();
        assert_eq!(statuses[&draft.id], TreatmentStatus::Cancelled);
        assert_eq!(statuses[&approved.id], TreatmentStatus::Cancelled);
        assert_eq!(statuses[&done.id], TreatmentStatus::Done);

        assert!(matches!(
            groups.cancel(&doctor, group_id).await,
            Err(ClinicError::AlreadyCancelled)
        ));
        let rename = GroupUpdate {
            name: Some(NonEmptyText::new("Renamed").unwrap()),
            ..Default::default()
        };
        assert!(matches!(
            groups.update(&doctor, group_id, rename).await,
            Err(ClinicError::AlreadyCancelled)
        ));
        assert!(matches!(
            treatments
                .add_item(&doctor, plan.id, item(34, "D2391", TreatmentStatus::Draft, group_id))
                .await,
            Err(ClinicError::AlreadyCancelled)
        ));

        let cancelled_events: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM timeline_events
             WHERE patient_id = $1 AND event_type = 'treatment_group_cancelled'
               AND details->>'cancelledItems' = '2'",
        )
        .bind(patient_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(cancelled_events, 1);
        let plan_events: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM timeline_events
             WHERE patient_id = $1 AND event_type = 'treatment_plan_created'",
        )
        .bind(patient_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(plan_events, 1);
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn test_primary_doctor_hand_over(pool: PgPool) {
        let admin = fixtures::clinic(&pool).await;
        let ames = fixtures::doctor(&pool, &admin, "Dr Ames").await;
        let brook = fixtures::doctor(&pool, &admin, "Dr Brook").await;
        let cole = fixtures::doctor(&pool, &admin, "Dr Cole").await;
        let patient_id = fixtures::patient(&pool, &admin, "Ann", "Lee").await;
        let groups = TreatmentGroupService::new(pool.clone());

        let mut new = new_group(vec![ames.id, brook.id], None);
        new.patient_id = patient_id;
        let group = groups.create(&admin, new).await.unwrap();
        let id = group.group.id;
        assert_eq!(group.primary_doctor().map(|d| d.doctor_id), Some(ames.id));

        let detail = groups.assign_doctor(&admin, id, brook.id, true).await.unwrap();
        assert_eq!(detail.primary_doctor().map(|d| d.doctor_id), Some(brook.id));
        assert_eq!(detail.doctors.iter().filter(|d| d.is_primary).count(), 1);
        assert_eq!(detail.doctors.len(), 2);

        let detail = groups.assign_doctor(&admin, id, cole.id, true).await.unwrap();
        assert_eq!(detail.primary_doctor().map(|d| d.doctor_id), Some(cole.id));
        assert_eq!(detail.doctors.iter().filter(|d| d.is_primary).count(), 1);
        assert_eq!(detail.doctors.len(), 3);

        let detail = groups.unassign_doctor(&admin, id, cole.id).await.unwrap();
        assert!(detail.primary_doctor().is_none());
        assert!(matches!(
            groups.unassign_doctor(&admin, id, cole.id).await,
            Err(ClinicError::NotFound("assignment"))
        ));

        let listed = groups
            .list(
                admin.clinic_id,
                GroupFilter {
                    assigned_doctor: Some(brook.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        let listed = groups
            .list(
                admin.clinic_id,
                GroupFilter {
                    assigned_doctor: Some(cole.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(listed.is_empty());
    }
}
