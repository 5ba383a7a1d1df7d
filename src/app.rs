use crate::{
    annotate::Annotator,
    config::Config,
    labels::ClassLabels,
    materialize::OutputMaterializer,
    ort_service::OrtModelService,
    pipeline::DetectionPipeline,
    server::{HttpServer, SharedState},
    storage::{ensure_dirs, StoragePurger},
    telemetry::Metrics,
    upload::UploadReceiver,
};
use std::sync::Arc;
use tokio::{signal, sync::broadcast};

pub async fn start_app(config: Config) -> anyhow::Result<()> {
    ensure_dirs(&config.storage)?;

    let model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize model service: {:?}", e);
            return Err(e.into());
        }
    };
    let labels = ClassLabels::from_config(&config.labels)?;
    let annotator = Annotator::new(&config.annotation);

    let pipeline = DetectionPipeline::new(
        model_service,
        labels,
        annotator,
        OutputMaterializer::new(&config.storage.output_dir),
    );
    let state = SharedState {
        pipeline,
        receiver: UploadReceiver::new(&config.storage.upload_dir, config.server.max_upload_bytes),
        metrics: Arc::new(Metrics::new()?),
    };

    let server = HttpServer::new(state, &config).await?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let server_shutdown_rx = shutdown_tx.subscribe();
    let purger_handle = StoragePurger::new(&config.storage).spawn(shutdown_tx.subscribe());

    let server_handle = server.run(server_shutdown_rx).await?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown.");

    let _ = shutdown_tx.send(());
    if let Some(handle) = purger_handle {
        let _ = handle.await;
    }
    server_handle.await??;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
