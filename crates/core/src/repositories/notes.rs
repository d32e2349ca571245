use super::patients::require_patient;
use super::timeline::insert_event;
use crate::timeline::NewTimelineEvent;
use crate::{ClinicError, ClinicResult, EventType, NonEmptyText, Principal};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Internal staff note, optionally about one patient. Never shown to patients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub admin_id: Uuid,
    pub author_name: String,
    pub patient_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

const SELECT_NOTE: &str = "SELECT n.id, n.clinic_id, n.admin_id, a.display_name AS author_name,
        n.patient_id, n.body, n.created_at
     FROM admin_notes n JOIN admins a ON a.id = n.admin_id";

#[derive(Clone, Debug)]
pub struct NoteService {
    pool: PgPool,
}

impl NoteService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, clinic_id: Uuid, patient_id: Option<Uuid>) -> ClinicResult<Vec<Note>> {
        Ok(sqlx::query_as::<_, Note>(&format!(
            "{SELECT_NOTE}
             WHERE n.clinic_id = $1 AND ($2::uuid IS NULL OR n.patient_id = $2)
             ORDER BY n.created_at DESC, n.id DESC"
        ))
        .bind(clinic_id)
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn create(
        &self,
        author: &Principal,
        body: &NonEmptyText,
        patient_id: Option<Uuid>,
    ) -> ClinicResult<Note> {
        let mut tx = self.pool.begin().await?;
        if let Some(patient_id) = patient_id {
            require_patient(&mut tx, author.clinic_id, patient_id).await?;
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO admin_notes (id, clinic_id, admin_id, patient_id, body)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(author.clinic_id)
        .bind(author.id)
        .bind(patient_id)
        .bind(body.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| ClinicError::from_foreign_key_violation(e, "admin"))?;

        let mut event = NewTimelineEvent::new(
            author,
            EventType::NoteAdded,
            json!({ "noteId": id, "preview": body.as_str() }),
        );
        if let Some(patient_id) = patient_id {
            event = event.for_patient(patient_id);
        }
        insert_event(&mut tx, &event).await?;

        let note = sqlx::query_as::<_, Note>(&format!("{SELECT_NOTE} WHERE n.id = $1"))
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(note)
    }

    /// Deletes a note. Only its author or a super admin may do so.
    pub async fn delete(&self, actor: &Principal, is_super: bool, id: Uuid) -> ClinicResult<()> {
        let author: Option<Uuid> = sqlx::query_scalar(
            "SELECT admin_id FROM admin_notes WHERE clinic_id = $1 AND id = $2",
        )
        .bind(actor.clinic_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match author {
            None => return Err(ClinicError::NotFound("note")),
            Some(author) if author != actor.id && !is_super => {
                return Err(ClinicError::PermissionDenied)
            }
            Some(_) => {}
        }

        sqlx::query("DELETE FROM admin_notes WHERE clinic_id = $1 AND id = $2")
            .bind(actor.clinic_id)
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!(note_id = %id, admin_id = %actor.id, "note deleted");
        Ok(())
    }
}
