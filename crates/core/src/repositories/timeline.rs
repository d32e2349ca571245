use crate::timeline::{NewTimelineEvent, TimelineCursor, TimelineEvent, TimelinePage, TimelineRow};
use crate::{ClinicResult, EventType};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// Appends one event using an existing connection or transaction.
pub(crate) async fn insert_event(
    conn: &mut PgConnection,
    event: &NewTimelineEvent,
) -> ClinicResult<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO timeline_events
             (id, clinic_id, patient_id, actor_role, actor_id, event_type, details)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(event.clinic_id)
    .bind(event.patient_id)
    .bind(event.actor_role.as_str())
    .bind(event.actor_id)
    .bind(event.event_type.as_str())
    .bind(&event.details)
    .execute(&mut *conn)
    .await?;

    tracing::debug!(event_id = %id, event_type = %event.event_type, "timeline event recorded");
    Ok(id)
}

/// Which events a timeline read covers.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimelineQuery {
    pub patient_id: Option<Uuid>,
    /// Leaves out staff-only events (admin notes) for patient-facing feeds.
    pub patient_facing: bool,
    pub limit: i64,
    pub cursor: Option<TimelineCursor>,
}

#[derive(Clone, Debug)]
pub struct TimelineService {
    pool: PgPool,
}

impl TimelineService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, event: &NewTimelineEvent) -> ClinicResult<Uuid> {
        let mut conn = self.pool.acquire().await?;
        insert_event(&mut conn, event).await
    }

    /// Returns one page, newest first. Rows sharing a timestamp are ordered by id so the
    /// cursor always points at a unique position.
    pub async fn list(&self, clinic_id: Uuid, query: TimelineQuery) -> ClinicResult<TimelinePage> {
        let limit = query.limit.max(1);
        let rows = sqlx::query_as::<_, TimelineRow>(
            "SELECT id, clinic_id, patient_id, actor_role, actor_id, event_type, details, created_at
             FROM timeline_events
             WHERE clinic_id = $1
               AND ($2::uuid IS NULL OR patient_id = $2)
               AND ($3::timestamptz IS NULL OR (created_at, id) < ($3, $4::uuid))
               AND (NOT $5 OR event_type <> $6)
             ORDER BY created_at DESC, id DESC
             LIMIT $7",
        )
        .bind(clinic_id)
        .bind(query.patient_id)
        .bind(query.cursor.map(|c| c.created_at))
        .bind(query.cursor.map(|c| c.id))
        .bind(query.patient_facing)
        .bind(EventType::NoteAdded.as_str())
        .bind(limit + 1)
        .fetch_all(&self.pool)
        .await?;

        let events = rows
            .into_iter()
            .map(TimelineEvent::try_from)
            .collect::<ClinicResult<Vec<_>>>()?;

        Ok(TimelinePage::from_overfetch(events, limit as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::fixtures;
    use serde_json::json;
    use std::collections::HashSet;

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn test_keyset_walk_is_descending_and_complete(pool: PgPool) {
        let admin = fixtures::clinic(&pool).await;
        let patient_id = fixtures::patient(&pool, &admin, "Ann", "Lee").await;
        let other_clinic = fixtures::clinic(&pool).await;
        let timeline = TimelineService::new(pool.clone());

        for n in 0..8 {
            let event = NewTimelineEvent::new(&admin, EventType::PushSent, json!({ "n": n }))
                .for_patient(patient_id);
            timeline.record(&event).await.unwrap();
        }
        timeline
            .record(&NewTimelineEvent::new(&other_clinic, EventType::PushSent, json!({})))
            .await
            .unwrap();

        // patient_created plus the eight pushes
        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = timeline
                .list(
                    admin.clinic_id,
                    TimelineQuery {
                        patient_id: Some(patient_id),
                        patient_facing: false,
                        limit: 2,
                        cursor,
                    },
                )
                .await
                .unwrap();
            assert!(page.events.len() <= 2);
            seen.extend(page.events);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen.len(), 9);
        let ids: HashSet<Uuid> = seen.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 9);
        for pair in seen.windows(2) {
            assert!((pair[0].created_at, pair[0].id) > (pair[1].created_at, pair[1].id));
        }
        assert_eq!(seen.last().map(|e| e.event_type), Some(EventType::PatientCreated));
        assert!(seen.iter().all(|e| e.clinic_id == admin.clinic_id));
    }

    #[sqlx::test(migrator = "crate::MIGRATOR")]
    async fn test_patient_facing_feed_hides_notes(pool: PgPool) {
        let admin = fixtures::clinic(&pool).await;
        let patient_id = fixtures::patient(&pool, &admin, "Ann", "Lee").await;
        let timeline = TimelineService::new(pool.clone());
        timeline
            .record(
                &NewTimelineEvent::new(&admin, EventType::NoteAdded, json!({ "preview": "x" }))
                    .for_patient(patient_id),
            )
            .await
            .unwrap();

        let query = |patient_facing| TimelineQuery {
            patient_id: Some(patient_id),
            patient_facing,
            limit: 50,
            cursor: None,
        };
        let staff = timeline.list(admin.clinic_id, query(false)).await.unwrap();
        assert_eq!(staff.events.len(), 2);
        let facing = timeline.list(admin.clinic_id, query(true)).await.unwrap();
        assert_eq!(facing.events.len(), 1);
        assert_eq!(facing.events[0].event_type, EventType::PatientCreated);
        assert!(facing.next_cursor.is_none());
    }
}
