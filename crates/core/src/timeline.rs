//! Timeline events: the append-only per-clinic activity feed.
//!
//! Every write in the system records one [`NewTimelineEvent`]. Reads return
//! [`TimelineEvent`]s newest first, each carrying a rendered `summary` sentence.
//! Pages are keyset-paginated on `(created_at, id)` with an opaque [`TimelineCursor`].

use crate::auth::Role;
use crate::{ClinicError, ClinicResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! event_types {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// Kind of a timeline event; stored as its snake_case name.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum EventType {
            $($variant),+
        }

        impl EventType {
            pub const ALL: &'static [EventType] = &[$(EventType::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(EventType::$variant => $name),+
                }
            }
        }

        impl FromStr for EventType {
            type Err = ClinicError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(EventType::$variant),)+
                    other => Err(ClinicError::invalid("eventType", other)),
                }
            }
        }
    };
}

event_types! {
    PatientCreated => "patient_created",
    PatientUpdated => "patient_updated",
    PatientDeleted => "patient_deleted",
    NoteAdded => "note_added",
    EncounterCreated => "encounter_created",
    DiagnosisAdded => "diagnosis_added",
    TreatmentPlanCreated => "treatment_plan_created",
    TreatmentItemCreated => "treatment_item_created",
    TreatmentItemStatusChanged => "treatment_item_status_changed",
    TreatmentItemDeleted => "treatment_item_deleted",
    TreatmentGroupCreated => "treatment_group_created",
    TreatmentGroupUpdated => "treatment_group_updated",
    TreatmentGroupCancelled => "treatment_group_cancelled",
    TreatmentGroupDeleted => "treatment_group_deleted",
    DoctorAssigned => "doctor_assigned",
    DoctorUnassigned => "doctor_unassigned",
    FileUploaded => "file_uploaded",
    PushSent => "push_sent",
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event about to be appended.
#[derive(Clone, Debug)]
pub struct NewTimelineEvent {
    pub clinic_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub actor_role: Role,
    pub actor_id: Uuid,
    pub event_type: EventType,
    pub details: Value,
}

impl NewTimelineEvent {
    pub fn new(actor: &crate::Principal, event_type: EventType, details: Value) -> Self {
        Self {
            clinic_id: actor.clinic_id,
            patient_id: None,
            actor_role: actor.role,
            actor_id: actor.id,
            event_type,
            details,
        }
    }

    pub fn for_patient(mut self, patient_id: Uuid) -> Self {
        self.patient_id = Some(patient_id);
        self
    }
}

/// A stored event, as returned to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEvent {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub actor_role: Role,
    pub actor_id: Uuid,
    pub event_type: EventType,
    pub details: Value,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Raw `timeline_events` row.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TimelineRow {
    pub id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub actor_role: String,
    pub actor_id: Uuid,
    pub event_type: String,
    pub details: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TimelineRow> for TimelineEvent {
    type Error = ClinicError;

    fn try_from(row: TimelineRow) -> ClinicResult<Self> {
        let event_type: EventType = row.event_type.parse()?;
        let summary = render_summary(event_type, &row.details);
        Ok(Self {
            id: row.id,
            clinic_id: row.clinic_id,
            patient_id: row.patient_id,
            actor_role: row.actor_role.parse()?,
            actor_id: row.actor_id,
            event_type,
            details: row.details,
            summary,
            created_at: row.created_at,
        })
    }
}

impl TimelineEvent {
    pub fn cursor(&self) -> TimelineCursor {
        TimelineCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

fn text<'a>(details: &'a Value, key: &str) -> Option<&'a str> {
    details
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn number(details: &Value, key: &str) -> Option<i64> {
    details.get(key).and_then(Value::as_i64)
}

/// `treatment group "Name"`, or `a treatment group` when the name is missing.
fn group_phrase(details: &Value) -> String {
    text(details, "groupName")
        .or_else(|| text(details, "name"))
        .map(|n| format!("treatment group \"{n}\""))
        .unwrap_or_else(|| "a treatment group".to_string())
}

fn capitalise(phrase: String) -> String {
    let mut chars = phrase.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => phrase,
    }
}

fn procedure_phrase(details: &Value) -> String {
    let procedure = text(details, "procedureCode").unwrap_or("Treatment");
    match number(details, "tooth") {
        Some(tooth) => format!("{procedure} on tooth {tooth}"),
        None => procedure.to_string(),
    }
}

fn preview(body: &str) -> String {
    const MAX: usize = 80;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(MAX).collect();
        format!("{}…", cut.trim_end())
    }
}

/// Renders a human-readable sentence for an event. Missing detail fields fall back to
/// generic wording rather than failing.
pub fn render_summary(event_type: EventType, details: &Value) -> String {
    match event_type {
        EventType::PatientCreated => match text(details, "patientName") {
            Some(name) => format!("Patient {name} was registered"),
            None => "A patient was registered".to_string(),
        },
        EventType::PatientUpdated => {
            let fields: Vec<&str> = details
                .get("fields")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if fields.is_empty() {
                "Patient details were updated".to_string()
            } else {
                format!("Patient details were updated ({})", fields.join(", "))
            }
        }
        EventType::PatientDeleted => match text(details, "patientName") {
            Some(name) => format!("Patient {name} was removed"),
            None => "A patient was removed".to_string(),
        },
        EventType::NoteAdded => match text(details, "preview") {
            Some(body) => format!("Note added: {}", preview(body)),
            None => "A note was added".to_string(),
        },
        EventType::EncounterCreated => match text(details, "doctorName") {
            Some(doctor) => format!("Visit recorded by {doctor}"),
            None => "A visit was recorded".to_string(),
        },
        EventType::DiagnosisAdded => {
            let code = text(details, "icd10Code").unwrap_or("unknown code");
            let mut sentence = format!("Diagnosis {code}");
            if let Some(description) = text(details, "description") {
                sentence.push_str(&format!(" ({description})"));
            }
            if let Some(tooth) = number(details, "tooth") {
                sentence.push_str(&format!(" on tooth {tooth}"));
            }
            sentence.push_str(" was added");
            sentence
        }
        EventType::TreatmentPlanCreated => match text(details, "title") {
            Some(title) => format!("Treatment plan \"{title}\" was created"),
            None => "A treatment plan was created".to_string(),
        },
        EventType::TreatmentItemCreated => {
            format!("{} was added to the plan", procedure_phrase(details))
        }
        EventType::TreatmentItemStatusChanged => {
            match (text(details, "from"), text(details, "to")) {
                (Some(from), Some(to)) => {
                    format!("{} moved from {from} to {to}", procedure_phrase(details))
                }
                (None, Some(to)) => format!("{} is now {to}", procedure_phrase(details)),
                _ => format!("{} changed status", procedure_phrase(details)),
            }
        }
        EventType::TreatmentItemDeleted => {
            format!("{} was removed from the plan", procedure_phrase(details))
        }
        EventType::TreatmentGroupCreated => {
            format!("{} was created", capitalise(group_phrase(details)))
        }
        EventType::TreatmentGroupUpdated => {
            let group = capitalise(group_phrase(details));
            match text(details, "status") {
                Some(status) => format!("{group} was updated (status {status})"),
                None => format!("{group} was updated"),
            }
        }
        EventType::TreatmentGroupCancelled => {
            let group = capitalise(group_phrase(details));
            match number(details, "cancelledItems") {
                Some(1) => format!("{group} was cancelled (1 item cancelled)"),
                Some(n) => format!("{group} was cancelled ({n} items cancelled)"),
                None => format!("{group} was cancelled"),
            }
        }
        EventType::TreatmentGroupDeleted => {
            format!("{} was deleted", capitalise(group_phrase(details)))
        }
        EventType::DoctorAssigned => {
            let doctor = text(details, "doctorName").unwrap_or("A doctor");
            let role = if details.get("isPrimary").and_then(Value::as_bool) == Some(true) {
                " as primary doctor"
            } else {
                ""
            };
            format!("{doctor} was assigned to {}{role}", group_phrase(details))
        }
        EventType::DoctorUnassigned => {
            let doctor = text(details, "doctorName").unwrap_or("A doctor");
            format!("{doctor} was removed from {}", group_phrase(details))
        }
        EventType::FileUploaded => match text(details, "filename") {
            Some(name) => format!("File {name} was uploaded"),
            None => "A file was uploaded".to_string(),
        },
        EventType::PushSent => match text(details, "title") {
            Some(title) => format!("Notification sent: {title}"),
            None => "A notification was sent".to_string(),
        },
    }
}

/// Opaque keyset cursor: the `(created_at, id)` of the last event on a page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl TimelineCursor {
    pub fn encode(&self) -> String {
        let raw = format!("{}:{}", self.created_at.timestamp_micros(), self.id);
        URL_SAFE_NO_PAD.encode(raw)
    }

    /// # Errors
    ///
    /// Returns [`ClinicError::InvalidCursor`] for anything [`TimelineCursor::encode`]
    /// could not have produced.
    pub fn decode(cursor: &str) -> ClinicResult<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(cursor.trim())
            .map_err(|_| ClinicError::InvalidCursor)?;
        let raw = String::from_utf8(raw).map_err(|_| ClinicError::InvalidCursor)?;
        let (micros, id) = raw.split_once(':').ok_or(ClinicError::InvalidCursor)?;
        let micros: i64 = micros.parse().map_err(|_| ClinicError::InvalidCursor)?;
        let created_at =
            DateTime::from_timestamp_micros(micros).ok_or(ClinicError::InvalidCursor)?;
        let id = Uuid::parse_str(id).map_err(|_| ClinicError::InvalidCursor)?;
        Ok(Self { created_at, id })
    }
}

/// One page of events plus the cursor for the next page, if any.
#[derive(Clone, Debug)]
pub struct TimelinePage {
    pub events: Vec<TimelineEvent>,
    pub next_cursor: Option<TimelineCursor>,
}

impl TimelinePage {
    /// Builds a page from up to `limit + 1` rows fetched in descending order.
    pub(crate) fn from_overfetch(mut events: Vec<TimelineEvent>, limit: usize) -> Self {
        let next_cursor = if events.len() > limit {
            events.truncate(limit);
            events.last().map(TimelineEvent::cursor)
        } else {
            None
        };
        Self {
            events,
            next_cursor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(created_at: DateTime<Utc>) -> TimelineEvent {
        TimelineEvent {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_id: None,
            actor_role: Role::Admin,
            actor_id: Uuid::new_v4(),
            event_type: EventType::NoteAdded,
            details: json!({}),
            summary: String::new(),
            created_at,
        }
    }

    #[test]
    fn test_event_type_names_round_trip() {
        for event_type in EventType::ALL {
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), *event_type);
            assert_eq!(
                serde_json::to_value(event_type).unwrap(),
                json!(event_type.as_str())
            );
        }
        assert_eq!(EventType::ALL.len(), 18);
        assert!("group_exploded".parse::<EventType>().is_err());
    }

    #[test]
    fn test_cursor_round_trip() {
        let cursor = TimelineCursor {
            created_at: DateTime::from_timestamp_micros(1_760_000_000_123_456).unwrap(),
            id: Uuid::new_v4(),
        };
        assert_eq!(TimelineCursor::decode(&cursor.encode()).unwrap(), cursor);
    }

    #[test]
    fn test_cursor_rejects_garbage() {
        let bad_uuid = URL_SAFE_NO_PAD.encode("123:not-a-uuid");
        let bad_micros = URL_SAFE_NO_PAD.encode(format!("abc:{}", Uuid::new_v4()));
        for bad in ["", "%%%", "bm9jb2xvbg", bad_uuid.as_str(), bad_micros.as_str()] {
            assert!(
                matches!(TimelineCursor::decode(bad), Err(ClinicError::InvalidCursor)),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_page_from_overfetch() {
        let now = Utc::now();
        let events: Vec<_> = (0..4)
            .map(|i| event(now - chrono::Duration::seconds(i)))
            .collect();
        let third = events[2].cursor();

        let page = TimelinePage::from_overfetch(events.clone(), 3);
        assert_eq!(page.events.len(), 3);
        assert_eq!(page.next_cursor, Some(third));

        let page = TimelinePage::from_overfetch(events, 4);
        assert_eq!(page.events.len(), 4);
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_summary_uses_details() {
        assert_eq!(
            render_summary(
                EventType::TreatmentItemStatusChanged,
                &json!({"procedureCode": "D2740", "tooth": 36, "from": "approved", "to": "done"})
            ),
            "D2740 on tooth 36 moved from approved to done"
        );
        assert_eq!(
            render_summary(
                EventType::TreatmentGroupCancelled,
                &json!({"groupName": "Crowns", "cancelledItems": 3})
            ),
            "Treatment group \"Crowns\" was cancelled (3 items cancelled)"
        );
        assert_eq!(
            render_summary(
                EventType::DoctorAssigned,
                &json!({"doctorName": "Dr Ames", "groupName": "Implants", "isPrimary": true})
            ),
            "Dr Ames was assigned to treatment group \"Implants\" as primary doctor"
        );
        assert_eq!(
            render_summary(EventType::DiagnosisAdded, &json!({"icd10Code": "K02.1", "tooth": 11})),
            "Diagnosis K02.1 on tooth 11 was added"
        );
        assert_eq!(
            render_summary(EventType::TreatmentPlanCreated, &json!({"title": "Restore 36"})),
            "Treatment plan \"Restore 36\" was created"
        );
    }

    #[test]
    fn test_summary_falls_back_when_details_missing() {
        for event_type in EventType::ALL {
            let summary = render_summary(*event_type, &json!({}));
            assert!(!summary.is_empty(), "{event_type} rendered nothing");
        }
        assert_eq!(
            render_summary(EventType::TreatmentGroupCreated, &json!(null)),
            "A treatment group was created"
        );
    }

    #[test]
    fn test_note_preview_is_truncated() {
        let long = "x".repeat(200);
        let summary = render_summary(EventType::NoteAdded, &json!({ "preview": long }));
        assert!(summary.ends_with('…'));
        assert!(summary.chars().count() < 100);
    }

    #[test]
    fn test_row_conversion_renders_summary() {
        let row = TimelineRow {
            id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            patient_id: Some(Uuid::new_v4()),
            actor_role: "doctor".into(),
            actor_id: Uuid::new_v4(),
            event_type: "file_uploaded".into(),
            details: json!({"filename": "xray.png"}),
            created_at: Utc::now(),
        };
        let event = TimelineEvent::try_from(row).unwrap();
        assert_eq!(event.actor_role, Role::Doctor);
        assert_eq!(event.summary, "File xray.png was uploaded");
    }
}
