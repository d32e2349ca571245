//! HTTP handlers, grouped by audience.

pub mod admin;
pub mod auth;
pub mod doctor;
pub mod groups;
pub mod icd10;
pub mod patient;
pub mod push;
pub mod system;

use api_shared::{TimelineParams, TimelineRes};
use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clinic_core::repositories::{PatientFile, TimelineQuery};
use clinic_core::validation::page_limit;
use clinic_core::{
    ClinicError, TimelineCursor, TimelinePage, DEFAULT_TIMELINE_LIMIT, MAX_TIMELINE_LIMIT,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Builds a timeline read from query parameters.
pub(crate) fn timeline_query(
    params: TimelineParams,
    patient_id: Option<Uuid>,
    patient_facing: bool,
) -> ApiResult<TimelineQuery> {
    let cursor = params
        .cursor
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(TimelineCursor::decode)
        .transpose()?;
    Ok(TimelineQuery {
        patient_id,
        patient_facing,
        limit: page_limit(params.limit, DEFAULT_TIMELINE_LIMIT, MAX_TIMELINE_LIMIT),
        cursor,
    })
}

pub(crate) fn timeline_res(page: TimelinePage) -> TimelineRes {
    TimelineRes {
        ok: true,
        events: page.events.into_iter().map(Into::into).collect(),
        next_cursor: page.next_cursor.map(|c| c.encode()),
    }
}

/// Reads the `file` field of a multipart upload.
pub(crate) async fn read_upload(mut multipart: Multipart) -> ApiResult<(String, Bytes)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(upload_error)?;
        return Ok((filename, bytes));
    }
    Err(ClinicError::MissingFields.into())
}

/// A body cut off by the request limit is an oversized file, anything else is bad framing.
fn upload_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ClinicError::invalid("file", err.body_text()).into()
    } else {
        ApiError::InvalidMultipart(err.body_text())
    }
}

/// Serves stored bytes with the recorded media type.
pub(crate) fn file_response(file: PatientFile, bytes: Vec<u8>) -> Response {
    let disposition = format!(
        "inline; filename=\"{}\"",
        header_safe_filename(&file.original_filename)
    );
    (
        [(CONTENT_TYPE, file.media_type), (CONTENT_DISPOSITION, disposition)],
        bytes,
    )
        .into_response()
}

fn header_safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_timeline_query_clamps_and_decodes() {
        let cursor = TimelineCursor {
            created_at: Utc::now(),
            id: Uuid::new_v4(),
        };
        let params = TimelineParams {
            patient_id: None,
            limit: Some(500),
            cursor: Some(cursor.encode()),
        };
        let query = timeline_query(params, None, false).unwrap();
        assert_eq!(query.limit, MAX_TIMELINE_LIMIT);
        assert_eq!(query.cursor.map(|c| c.id), Some(cursor.id));

        let query = timeline_query(TimelineParams::default(), None, true).unwrap();
        assert_eq!(query.limit, DEFAULT_TIMELINE_LIMIT);
        assert!(query.patient_facing);
    }

    #[test]
    fn test_timeline_query_rejects_bad_cursor() {
        let params = TimelineParams {
            cursor: Some("not-a-cursor".into()),
            ..TimelineParams::default()
        };
        let err = timeline_query(params, None, false).err().unwrap();
        assert_eq!(err.code(), "invalid_cursor");
    }

    #[test]
    fn test_header_safe_filename() {
        assert_eq!(header_safe_filename("x-ray 36.png"), "x-ray 36.png");
        assert_eq!(header_safe_filename("a\"b\r\n.pdf"), "a_b__.pdf");
        assert_eq!(header_safe_filename("zahn\u{e4}rztlich.pdf"), "zahn_rztlich.pdf");
    }
}
