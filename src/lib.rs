mod annotate;
mod materialize;
mod ort_service;
mod pipeline;
mod presenter;
mod routes;
mod server;
mod storage;
mod telemetry;
mod upload;

pub mod app;
pub mod config;
pub mod detection;
pub mod labels;
pub mod model_service;

pub use annotate::Annotator;
pub use app::start_app;
pub use materialize::{OutputArtifact, OutputMaterializer};
pub use pipeline::{DetectionPipeline, PipelineError, PipelineOutput};
pub use routes::PredictError;
pub use server::{build_router, HttpServer, SharedState};
pub use telemetry::Metrics;
pub use upload::{UploadError, UploadReceiver, UploadRecord};
