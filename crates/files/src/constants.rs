/// Folder under each bucket that holds content-addressed files.
pub const HASH_FOLDER_NAME: &str = "sha256";

/// Longest original filename kept in metadata; longer names are truncated.
pub const MAX_FILENAME_CHARS: usize = 255;

/// Media types accepted for upload.
pub(crate) const ACCEPTED_MEDIA_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/heif",
    "image/tiff",
    "application/pdf",
];
