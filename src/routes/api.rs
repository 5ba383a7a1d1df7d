use super::predict::run_upload;
use crate::{
    detection::Detection,
    model_service::ModelService,
    presenter::{OUTPUTS_ROUTE, UPLOADS_ROUTE},
    server::SharedState,
};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::instrument;

#[derive(Serialize)]
pub struct DetectionBody {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [u32; 4],
}

impl From<&Detection> for DetectionBody {
    fn from(detection: &Detection) -> Self {
        Self {
            class_id: detection.class_id,
            class_name: detection.class_name.clone(),
            confidence: (detection.confidence * 100.).round() / 100.,
            bbox: detection.bbox.to_pixels(),
        }
    }
}

#[derive(Serialize)]
pub struct PredictionBody {
    pub id: String,
    pub uploaded_image: String,
    pub predicted_image: String,
    pub detections: Vec<DetectionBody>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// POST /api/predict
#[instrument(skip(state, multipart))]
pub async fn predict_json<M: ModelService>(
    State(state): State<SharedState<M>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => return json_error(rejection.status(), rejection.body_text()),
    };

    match run_upload(&state, &mut multipart, "/api/predict").await {
        Ok(Some(output)) => Json(PredictionBody {
            id: output.record.id.clone(),
            uploaded_image: format!("{}/{}", UPLOADS_ROUTE, output.record.file_name()),
            predicted_image: format!("{}/{}", OUTPUTS_ROUTE, output.artifact.file_name),
            detections: output.result.detections.iter().map(Into::into).collect(),
        })
        .into_response(),
        Ok(None) => json_error(StatusCode::BAD_REQUEST, "missing `file` or `image` field"),
        Err(e) => json_error(e.status(), e.to_string()),
    }
}
