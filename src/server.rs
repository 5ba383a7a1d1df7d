use crate::{
    config::{Config, StorageConfig},
    model_service::ModelService,
    pipeline::DetectionPipeline,
    presenter::{OUTPUTS_ROUTE, UPLOADS_ROUTE},
    routes::api_routes,
    telemetry::Metrics,
    upload::UploadReceiver,
};
use axum::{extract::DefaultBodyLimit, Router};
use axum_otel_metrics::HttpMetricsLayerBuilder;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast::Receiver, task::JoinHandle};
use tower_http::{services::ServeDir, trace::TraceLayer};

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub struct SharedState<M: ModelService> {
    pub pipeline: DetectionPipeline<M>,
    pub receiver: UploadReceiver,
    pub metrics: Arc<Metrics>,
}

impl<M: ModelService> Clone for SharedState<M> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            receiver: self.receiver.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn build_router<M: ModelService>(
    state: SharedState<M>,
    storage_cfg: &StorageConfig,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .merge(api_routes::<M>())
        .nest_service(UPLOADS_ROUTE, ServeDir::new(&storage_cfg.upload_dir))
        .nest_service(OUTPUTS_ROUTE, ServeDir::new(&storage_cfg.output_dir))
        .layer(DefaultBodyLimit::max(
            max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        ))
        .with_state(state)
}

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(state: SharedState<M>, config: &Config) -> anyhow::Result<Self> {
        let addr = config.server.get_address();
        let metrics_layer = HttpMetricsLayerBuilder::new().build();

        let router = build_router(state, &config.storage, config.server.max_upload_bytes)
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer);

        let listener = TcpListener::bind(&addr).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(
        self,
        shutdown_rx: Receiver<()>,
    ) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let listener = self.listener;
        let router = self.router;
        let server_handle = tokio::spawn({
            let mut shutdown_rx = shutdown_rx.resubscribe();
            async move {
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown_rx.recv().await.ok();
                    })
                    .await?;
                Ok(())
            }
        });

        Ok(server_handle)
    }
}
