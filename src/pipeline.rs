use crate::{
    annotate::Annotator,
    detection::InferenceResult,
    labels::ClassLabels,
    materialize::{MaterializeError, OutputArtifact, OutputMaterializer},
    model_service::{ModelError, ModelService},
    upload::UploadRecord,
};
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to decode uploaded image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Failed to read uploaded image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Inference failed: {0}")]
    Model(#[from] ModelError),
    #[error("Failed to write annotated image: {0}")]
    Materialize(#[from] MaterializeError),
    #[error("Detection task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub record: UploadRecord,
    pub artifact: OutputArtifact,
    pub result: InferenceResult,
}

struct PipelineInner<M: ModelService> {
    model_service: M,
    labels: ClassLabels,
    annotator: Annotator,
    materializer: OutputMaterializer,
}

/// Decode, detect, annotate and write, for one stored upload at a time.
pub struct DetectionPipeline<M: ModelService> {
    inner: Arc<PipelineInner<M>>,
}

impl<M: ModelService> Clone for DetectionPipeline<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: ModelService> DetectionPipeline<M> {
    pub fn new(
        model_service: M,
        labels: ClassLabels,
        annotator: Annotator,
        materializer: OutputMaterializer,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                model_service,
                labels,
                annotator,
                materializer,
            }),
        }
    }

    #[instrument(skip(self, record), fields(upload_id = %record.id))]
    pub async fn run(&self, record: UploadRecord) -> Result<PipelineOutput, PipelineError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.run_blocking(record)).await?
    }
}

impl<M: ModelService> PipelineInner<M> {
    fn run_blocking(&self, record: UploadRecord) -> Result<PipelineOutput, PipelineError> {
        let mut decoder = ImageReader::open(&record.path)?
            .with_guessed_format()?
            .into_decoder()?;
        // Same frame the browser shows for the stored original.
        let orientation = decoder.orientation()?;
        let mut image = DynamicImage::from_decoder(decoder)?;
        image.apply_orientation(orientation);
        let (width, height) = image.dimensions();

        let raw = self.model_service.predict(&image)?;
        tracing::debug!("Model returned {} raw detections", raw.len());

        let result = InferenceResult::resolve(raw, &self.labels, width, height);
        for (i, detection) in result.detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_name,
                detection.confidence,
                detection.bbox.x1,
                detection.bbox.y1,
                detection.bbox.x2,
                detection.bbox.y2
            );
        }

        let annotated = self
            .annotator
            .annotate(&image, &result.detections, &self.labels);
        let artifact = self.materializer.write(&record, &annotated)?;

        Ok(PipelineOutput {
            record,
            artifact,
            result,
        })
    }
}
