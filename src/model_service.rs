use crate::detection::RawDetection;
use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("Unexpected model output shape {0:?}")]
    UnexpectedOutputShape(Vec<usize>),
    #[error("Invalid tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// A loaded detector. `predict` is blocking and CPU bound; async callers run
/// it on the blocking pool.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, image: &DynamicImage) -> Result<Vec<RawDetection>, ModelError>;
}
