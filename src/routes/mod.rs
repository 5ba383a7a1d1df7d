mod api;
mod health;
mod index;
mod metrics;
mod predict;

use crate::{model_service::ModelService, server::SharedState};
use axum::{
    routing::{get, post},
    Router,
};

pub use predict::PredictError;

pub fn api_routes<M: ModelService>() -> Router<SharedState<M>> {
    Router::new()
        .route("/", get(index::index))
        .route("/predict", post(predict::predict::<M>))
        .route("/api/predict", post(api::predict_json::<M>))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler::<M>))
}
