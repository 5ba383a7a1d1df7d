use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart},
};
use image::ImageFormat;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Form field names accepted for the uploaded image, in priority order.
pub const FILE_FIELDS: [&str; 2] = ["file", "image"];

const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Failed to read multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("Uploaded file is empty")]
    EmptyPayload,
    #[error("Uploaded file is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("Unsupported image format, expected JPEG or PNG")]
    UnsupportedMediaType,
    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// A file field pulled from the form, not yet validated or written.
#[derive(Debug)]
pub struct PendingUpload {
    pub file_name: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRecord {
    pub id: String,
    pub extension: String,
    pub path: PathBuf,
}

impl UploadRecord {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.id, self.extension)
    }
}

/// Returns the first accepted file field, or `None` when the form has no
/// such field or its filename is empty.
pub async fn read_upload_field(
    multipart: &mut Multipart,
) -> Result<Option<PendingUpload>, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        let is_file_field = field
            .name()
            .is_some_and(|name| FILE_FIELDS.contains(&name));
        if !is_file_field {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        if file_name.trim().is_empty() {
            tracing::debug!("Upload field present without a filename");
            return Ok(None);
        }

        let bytes = field.bytes().await?;
        return Ok(Some(PendingUpload { file_name, bytes }));
    }

    Ok(None)
}

/// Keeps `jpg`, `jpeg` and `png` extensions (lowercased), anything else
/// becomes `jpg`.
pub fn extension_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension {
        Some(ext) => ALLOWED_EXTENSIONS
            .iter()
            .find(|allowed| **allowed == ext)
            .copied()
            .unwrap_or(DEFAULT_EXTENSION),
        None => DEFAULT_EXTENSION,
    }
}

pub fn new_upload_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[derive(Debug, Clone)]
pub struct UploadReceiver {
    upload_dir: PathBuf,
    max_bytes: usize,
}

impl UploadReceiver {
    pub fn new(upload_dir: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            max_bytes,
        }
    }

    pub fn validate(&self, upload: &PendingUpload) -> Result<(), UploadError> {
        if upload.bytes.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(UploadError::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_bytes,
            });
        }
        match image::guess_format(&upload.bytes) {
            Ok(ImageFormat::Jpeg) | Ok(ImageFormat::Png) => Ok(()),
            _ => Err(UploadError::UnsupportedMediaType),
        }
    }

    /// Validates the payload and writes it unchanged under a fresh id.
    pub async fn store(&self, upload: PendingUpload) -> Result<UploadRecord, UploadError> {
        self.validate(&upload)?;

        let id = new_upload_id();
        let extension = extension_for(&upload.file_name).to_string();
        let path = self.upload_dir.join(format!("{}.{}", id, extension));

        tokio::fs::write(&path, &upload.bytes).await?;
        tracing::info!(
            upload_id = %id,
            bytes = upload.bytes.len(),
            "Stored upload {:?}",
            path
        );

        Ok(UploadRecord {
            id,
            extension,
            path,
        })
    }
}
