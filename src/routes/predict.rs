use crate::{
    model_service::ModelService,
    pipeline::{PipelineError, PipelineOutput},
    presenter::{render_error, render_result},
    server::SharedState,
    upload::{read_upload_field, UploadError},
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("{0}")]
    Upload(#[from] UploadError),
    #[error("{0}")]
    Pipeline(#[from] PipelineError),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::Upload(UploadError::Multipart(e)) => e.status(),
            PredictError::Upload(UploadError::EmptyPayload) => StatusCode::BAD_REQUEST,
            PredictError::Upload(UploadError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            PredictError::Upload(UploadError::UnsupportedMediaType) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            PredictError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            PredictError::Pipeline(PipelineError::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            PredictError::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn outcome(&self) -> &'static str {
        match self {
            PredictError::Upload(_) => "rejected",
            PredictError::Pipeline(_) => "failed",
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Html(render_error(status.as_u16(), &self.to_string()))).into_response()
    }
}

async fn store_and_run<M: ModelService>(
    state: &SharedState<M>,
    multipart: &mut Multipart,
) -> Result<Option<PipelineOutput>, PredictError> {
    let Some(pending) = read_upload_field(multipart).await? else {
        return Ok(None);
    };
    let record = state.receiver.store(pending).await?;
    let output = state.pipeline.run(record).await?;
    Ok(Some(output))
}

/// Stores the upload and runs it through the pipeline. `Ok(None)` means the
/// form carried no usable file field and nothing was written.
pub(super) async fn run_upload<M: ModelService>(
    state: &SharedState<M>,
    multipart: &mut Multipart,
    route: &str,
) -> Result<Option<PipelineOutput>, PredictError> {
    let started = Instant::now();
    let result = store_and_run(state, multipart).await;

    match &result {
        Ok(Some(output)) => {
            state.metrics.record_upload("ok");
            state
                .metrics
                .record_prediction_duration(started.elapsed().as_millis() as u64, route);
            for detection in &output.result.detections {
                state.metrics.record_detection(&detection.class_name);
            }
            tracing::info!(
                upload_id = %output.record.id,
                detections = output.result.detections.len(),
                "Prediction complete"
            );
        }
        Ok(None) => {
            state.metrics.record_upload("missing");
            tracing::debug!("No file in upload form");
        }
        Err(e) => {
            state.metrics.record_upload(e.outcome());
            if e.status().is_server_error() {
                tracing::error!("Prediction failed: {}", e);
            } else {
                tracing::warn!("Upload rejected: {}", e);
            }
        }
    }

    result
}

/// POST /predict
#[instrument(skip(state, multipart))]
pub async fn predict<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, PredictError> {
    let Ok(mut multipart) = multipart else {
        return Ok(Redirect::to("/").into_response());
    };

    match run_upload(&state, &mut multipart, "/predict").await? {
        Some(output) => Ok(Html(render_result(&output)).into_response()),
        None => Ok(Redirect::to("/").into_response()),
    }
}
