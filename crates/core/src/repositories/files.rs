//! Patient file uploads: bytes in the clinic's storage bucket, metadata in Postgres.

use super::patients::require_patient;
use super::timeline::insert_event;
use crate::timeline::NewTimelineEvent;
use crate::{ClinicError, ClinicResult, EventType, Principal};
use chrono::{DateTime, Utc};
use clinic_files::{FilesError, FilesService};
use serde::Serialize;
use serde_json::json;
use sqlx::PgPool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PatientFile {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub hash: String,
    pub media_type: String,
    pub size_bytes: i64,
    pub original_filename: String,
    pub uploaded_by_role: String,
    pub uploaded_by: Uuid,
    pub created_at: DateTime<Utc>,
}

const FILE_COLUMNS: &str = "id, patient_id, hash, media_type, size_bytes, original_filename,
    uploaded_by_role, uploaded_by, created_at";

#[derive(Clone, Debug)]
pub struct PatientFileService {
    pool: PgPool,
    storage_root: Arc<PathBuf>,
    max_upload_bytes: usize,
}

impl PatientFileService {
    pub fn new(pool: PgPool, storage_root: &Path, max_upload_bytes: usize) -> Self {
        Self {
            pool,
            storage_root: Arc::new(storage_root.to_path_buf()),
            max_upload_bytes,
        }
    }

    /// One bucket per clinic, named by the clinic id.
    fn bucket(&self, clinic_id: Uuid) -> ClinicResult<FilesService> {
        Ok(FilesService::open(
            &self.storage_root,
            &clinic_id.simple().to_string(),
        )?)
    }

    pub async fn upload(
        &self,
        actor: &Principal,
        patient_id: Uuid,
        bytes: Vec<u8>,
        filename: &str,
    ) -> ClinicResult<PatientFile> {
        if bytes.len() > self.max_upload_bytes {
            return Err(ClinicError::invalid(
                "file",
                format!("larger than {} bytes", self.max_upload_bytes),
            ));
        }
        {
            let mut conn = self.pool.acquire().await?;
            require_patient(&mut conn, actor.clinic_id, patient_id).await?;
        }

        let bucket = self.bucket(actor.clinic_id)?;
        let filename = filename.to_string();
        let stored =
            tokio::task::spawn_blocking(move || bucket.add_bytes(&bytes, &filename)).await??;

        let mut tx = self.pool.begin().await?;
        let file = sqlx::query_as::<_, PatientFile>(&format!(
            "INSERT INTO patient_files
                 (id, clinic_id, patient_id, hash, media_type, size_bytes, original_filename,
                  uploaded_by_role, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {FILE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(actor.clinic_id)
        .bind(patient_id)
        .bind(stored.hash.as_str())
        .bind(stored.media_type.as_str())
        .bind(i64::try_from(stored.size_bytes).unwrap_or(i64::MAX))
        .bind(stored.original_filename.as_str())
        .bind(actor.role.as_str())
        .bind(actor.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ClinicError::from_foreign_key_violation(e, "patient"))?;

        insert_event(
            &mut tx,
            &NewTimelineEvent::new(
                actor,
                EventType::FileUploaded,
                json!({
                    "fileId": file.id,
                    "filename": file.original_filename,
                    "mediaType": file.media_type,
                }),
            )
            .for_patient(patient_id),
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            file_id = %file.id,
            hash = %file.hash,
            newly_stored = stored.newly_stored,
            "patient file uploaded"
        );
        Ok(file)
    }

    pub async fn list(&self, clinic_id: Uuid, patient_id: Uuid) -> ClinicResult<Vec<PatientFile>> {
        Ok(sqlx::query_as::<_, PatientFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM patient_files
             WHERE clinic_id = $1 AND patient_id = $2
             ORDER BY created_at DESC, id"
        ))
        .bind(clinic_id)
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<PatientFile> {
        sqlx::query_as::<_, PatientFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM patient_files WHERE clinic_id = $1 AND id = $2"
        ))
        .bind(clinic_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ClinicError::NotFound("file"))
    }

    /// Metadata and bytes of one file.
    pub async fn read(&self, clinic_id: Uuid, id: Uuid) -> ClinicResult<(PatientFile, Vec<u8>)> {
        let file = self.get(clinic_id, id).await?;
        let bucket = self.bucket(clinic_id)?;
        let hash = file.hash.clone();
        let bytes = tokio::task::spawn_blocking(move || bucket.read(&hash))
            .await?
            .map_err(|e| match e {
                FilesError::NotFound(_) => ClinicError::NotFound("file"),
                other => ClinicError::Files(other),
            })?;
        Ok((file, bytes))
    }
}
