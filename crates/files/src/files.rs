//! Bucket-scoped file storage service implementation
//!
//! [`FilesService`] stores uploaded bytes under their SHA-256 digest inside a
//! single bucket directory and reports [`FileMetadata`] for the caller to
//! persist. The service never deletes files: database rows referencing a hash
//! may be removed, the bytes stay.
//!
//! Storage path: `<root>/<bucket>/sha256/<h[0..2]>/<h[2..4]>/<h>`

use crate::constants::ACCEPTED_MEDIA_TYPES;
use crate::{FilesError, HASH_FOLDER_NAME, MAX_FILENAME_CHARS};
use chrono::{DateTime, Utc};
use clinic_types::NonEmptyText;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Lowercase hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Hash(String);

impl Sha256Hash {
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn parse(input: &str) -> Result<Self, FilesError> {
        let ok = input.len() == 64
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !ok {
            return Err(FilesError::InvalidHash(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Sha256Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Sha256Hash {
    type Error = FilesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Sha256Hash> for String {
    fn from(value: Sha256Hash) -> Self {
        value.0
    }
}

/// Metadata for a stored file
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct FileMetadata {
    /// Hexadecimal digest of the file content
    pub hash: Sha256Hash,

    /// Path relative to the bucket root
    pub relative_path: NonEmptyText,

    /// Size of the file in bytes
    pub size_bytes: u64,

    /// Detected media type (MIME type)
    pub media_type: NonEmptyText,

    /// Original filename as supplied by the uploader, stripped of any directories
    pub original_filename: NonEmptyText,

    /// UTC timestamp when the file was stored
    pub stored_at: DateTime<Utc>,

    /// `false` when identical content was already present in the bucket
    pub newly_stored: bool,
}

/// Service for managing files within one storage bucket
#[derive(Debug)]
pub struct FilesService {
    bucket_root: PathBuf,
}

impl FilesService {
    /// Opens (creating on first use) the bucket directory under `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - the root directory does not exist or is not a directory,
    /// - `bucket` is not 32 lowercase hex characters,
    /// - the bucket directory cannot be created.
    pub fn open(root_directory: &Path, bucket: &str) -> Result<Self, FilesError> {
        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        let bucket_ok = bucket.len() == 32
            && bucket
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if !bucket_ok {
            return Err(FilesError::InvalidBucket(bucket.to_string()));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        let bucket_root = root_directory.join(bucket);
        fs::create_dir_all(&bucket_root)?;

        Ok(Self { bucket_root })
    }

    /// Stores `bytes` under their SHA-256 digest.
    ///
    /// Uploading content that is already present returns the existing location
    /// with `newly_stored = false`; the stored bytes are never rewritten.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `bytes` is empty,
    /// - the detected media type is not an accepted image/document type,
    /// - directory creation or the write fails.
    pub fn add_bytes(
        &self,
        bytes: &[u8],
        original_filename: &str,
    ) -> Result<FileMetadata, FilesError> {
        if bytes.is_empty() {
            return Err(FilesError::Empty);
        }

        let media_type = match infer::get(bytes) {
            Some(kind) if ACCEPTED_MEDIA_TYPES.contains(&kind.mime_type()) => kind.mime_type(),
            Some(kind) => {
                return Err(FilesError::UnsupportedMediaType(
                    kind.mime_type().to_string(),
                ))
            }
            None => return Err(FilesError::UnsupportedMediaType("unknown".into())),
        };

        let digest: [u8; 32] = Sha256::digest(bytes).into();
        let hash = Sha256Hash::from_bytes(&digest);

        let relative_path = Self::relative_path(&hash);
        let storage_path = self.bucket_root.join(relative_path.as_str());
        if let Some(parent) = storage_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let newly_stored = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&storage_path)
        {
            Ok(file) => {
                use std::io::Write;
                let mut file = file;
                file.write_all(bytes)?;
                file.sync_all()?;
                true
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(hash = %hash, "upload already present in bucket");
                false
            }
            Err(e) => return Err(FilesError::Io(e)),
        };

        Ok(FileMetadata {
            hash,
            relative_path,
            size_bytes: bytes.len() as u64,
            media_type: NonEmptyText::new(media_type)
                .map_err(|_| FilesError::UnsupportedMediaType("unknown".into()))?,
            original_filename: sanitise_filename(original_filename),
            stored_at: Utc::now(),
            newly_stored,
        })
    }

    /// Reads a stored file by its hash.
    ///
    /// # Errors
    ///
    /// Returns `FilesError` if:
    /// - `hash` is not a lowercase hex SHA-256 digest,
    /// - no file is stored under that hash,
    /// - the file cannot be read.
    pub fn read(&self, hash: &str) -> Result<Vec<u8>, FilesError> {
        let hash = Sha256Hash::parse(hash)?;
        let storage_path = self.bucket_root.join(Self::relative_path(&hash).as_str());

        match fs::read(&storage_path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FilesError::NotFound(hash.0)),
            Err(e) => Err(FilesError::Io(e)),
        }
    }

    /// Path relative to the bucket root: `sha256/<shard1>/<shard2>/<hash>`
    fn relative_path(hash: &Sha256Hash) -> NonEmptyText {
        let hex = hash.as_str();
        NonEmptyText::new(format!(
            "{}/{}/{}/{}",
            HASH_FOLDER_NAME,
            &hex[0..2],
            &hex[2..4],
            hex
        ))
        .unwrap_or_else(|_| unreachable!("hash digests are never empty"))
    }

    #[cfg(test)]
    fn bucket_root(&self) -> &Path {
        &self.bucket_root
    }
}

/// Keeps only the final path component of an uploaded filename.
fn sanitise_filename(original: &str) -> NonEmptyText {
    let name = original
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect::<String>();
    NonEmptyText::new(name)
        .or_else(|_| NonEmptyText::new("upload"))
        .unwrap_or_else(|_| unreachable!("fallback filename is non-empty"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const BUCKET: &str = "550e8400e29b41d4a716446655440000";
    const PNG_HEADER: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00];

    #[test]
    fn test_open_creates_bucket() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();
        assert!(service.bucket_root().is_dir());
        assert!(service.bucket_root().ends_with(BUCKET));
    }

    #[test]
    fn test_open_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing");
        let result = FilesService::open(&missing, BUCKET);
        assert!(matches!(result, Err(FilesError::InvalidRootDirectory(_))));
    }

    #[test]
    fn test_open_rejects_traversal_bucket_names() {
        let temp = TempDir::new().unwrap();
        for bad in ["../etc", "UPPERCASE00000000000000000000000", "short"] {
            let result = FilesService::open(temp.path(), bad);
            assert!(matches!(result, Err(FilesError::InvalidBucket(_))), "{bad}");
        }
    }

    #[test]
    fn test_add_png_detects_media_type_and_shards_path() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();

        let metadata = service.add_bytes(PNG_HEADER, "panoramic.png").unwrap();

        assert_eq!(metadata.media_type.as_str(), "image/png");
        assert_eq!(metadata.size_bytes, PNG_HEADER.len() as u64);
        assert!(metadata.newly_stored);
        let hex = metadata.hash.as_str();
        assert_eq!(
            metadata.relative_path.as_str(),
            format!("sha256/{}/{}/{}", &hex[0..2], &hex[2..4], hex)
        );
        assert!(service
            .bucket_root()
            .join(metadata.relative_path.as_str())
            .is_file());
    }

    #[test]
    fn test_add_same_content_twice_is_deduplicated() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();

        let first = service.add_bytes(PNG_HEADER, "a.png").unwrap();
        let second = service.add_bytes(PNG_HEADER, "b.png").unwrap();

        assert_eq!(first.hash, second.hash);
        assert!(first.newly_stored);
        assert!(!second.newly_stored);
        assert_eq!(second.original_filename.as_str(), "b.png");
    }

    #[test]
    fn test_add_rejects_unknown_content() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();

        let result = service.add_bytes(b"plain text notes", "notes.txt");
        assert!(matches!(result, Err(FilesError::UnsupportedMediaType(_))));

        let result = service.add_bytes(b"", "empty.png");
        assert!(matches!(result, Err(FilesError::Empty)));
    }

    #[test]
    fn test_read_returns_stored_bytes() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();
        let metadata = service.add_bytes(PNG_HEADER, "x.png").unwrap();

        let bytes = service.read(metadata.hash.as_str()).unwrap();
        assert_eq!(bytes, PNG_HEADER);
    }

    #[test]
    fn test_read_missing_and_invalid_hash() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();

        let missing = "a".repeat(64);
        assert!(matches!(service.read(&missing), Err(FilesError::NotFound(_))));
        assert!(matches!(
            service.read("../../etc/passwd"),
            Err(FilesError::InvalidHash(_))
        ));
    }

    #[test]
    fn test_filename_is_stripped_of_directories() {
        assert_eq!(sanitise_filename("C:\\scans\\bite.jpg").as_str(), "bite.jpg");
        assert_eq!(sanitise_filename("../../x.png").as_str(), "x.png");
        assert_eq!(sanitise_filename("dir/").as_str(), "upload");
    }

    #[test]
    fn test_metadata_serialises_hash_as_string() {
        let temp = TempDir::new().unwrap();
        let service = FilesService::open(temp.path(), BUCKET).unwrap();
        let metadata = service.add_bytes(PNG_HEADER, "x.png").unwrap();

        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["hash"], metadata.hash.as_str());
        assert_eq!(json["media_type"], "image/png");
    }
}
