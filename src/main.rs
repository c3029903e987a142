//! Main entry point for the image-to-3D raw mesh server

use img_to_3d_serving::{api, config::Settings, logging, AppState};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;
    settings.validate()?;

    logging::init_tracing(&settings.logging)?;
    info!("Starting image-to-3D serving core");
    info!(
        "Loaded configuration: server={}:{}, model_dir={}, device={}",
        settings.server.host,
        settings.server.port,
        settings.model.dir.display(),
        settings.model.device
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let preload = settings.model.preload;

    // Create application state
    let app_state = Arc::new(AppState::from_settings(settings));

    // Warm the pipeline in the background; the lazy path retries on failure
    if preload {
        let handle = app_state.pipeline.clone();
        tokio::spawn(async move {
            match handle.acquire().await {
                Ok(pipeline) => info!(pipeline = %pipeline.name(), "Pipeline preloaded"),
                Err(e) => warn!(error = %e, "Pipeline preload failed"),
            }
        });
    }

    // Build the router
    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
