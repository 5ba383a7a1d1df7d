use crate::upload::UploadRecord;
use image::{ImageFormat, RgbImage};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("Failed to encode annotated image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Annotated image missing after write: {0:?}")]
    Missing(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputArtifact {
    pub path: PathBuf,
    pub file_name: String,
}

/// Writes annotated pixel buffers to `output_dir/{id}.{ext}`.
#[derive(Debug, Clone)]
pub struct OutputMaterializer {
    output_dir: PathBuf,
}

impl OutputMaterializer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn write(
        &self,
        record: &UploadRecord,
        annotated: &RgbImage,
    ) -> Result<OutputArtifact, MaterializeError> {
        let file_name = record.file_name();
        let path = self.output_dir.join(&file_name);
        let format = match record.extension.as_str() {
            "png" => ImageFormat::Png,
            _ => ImageFormat::Jpeg,
        };

        annotated.save_with_format(&path, format)?;

        if !path.is_file() {
            return Err(MaterializeError::Missing(path));
        }
        tracing::debug!(upload_id = %record.id, "Wrote annotated image {:?}", path);

        Ok(OutputArtifact { path, file_name })
    }
}
