//! Live Tracker
//!
//! Main entry point for the tracking client.

use live_tracker::{
    backend_client::BackendClient,
    camera_resource::build_device,
    display_hub::DisplayHub,
    mode_controller::{self, ModeController},
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_tracker=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Live Tracker v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(
        backend_url = %config.backend_url,
        camera_source = %config.camera_source,
        initial_mode = %config.initial_mode,
        capture_interval_ms = config.capture_interval.as_millis() as u64,
        playback_interval_ms = config.playback_interval.as_millis() as u64,
        total_frames = config.playback_total_frames,
        "Configuration loaded"
    );

    // Initialize components
    let backend = Arc::new(BackendClient::with_timeout(
        config.backend_url.clone(),
        config.http_timeout,
    )?);
    if !backend.health_check().await {
        tracing::warn!(backend_url = %config.backend_url, "Backend not reachable yet, continuing");
    }

    let device = build_device(&config.camera_source);
    let hub = Arc::new(DisplayHub::new());

    // Start tracking controller (enters the initial mode)
    let (controller, events) = ModeController::new(
        config.controller_config(),
        device,
        backend.clone(),
        hub.clone(),
    );
    let (controller, controller_task) = mode_controller::spawn(controller, events);
    tracing::info!(mode = %config.initial_mode, "Tracking controller started");

    let state = AppState {
        config: config.clone(),
        controller: controller.clone(),
        hub,
        backend,
    };

    let mut app = web_api::create_router(state);

    if let Some(static_dir) = &config.static_dir {
        let serve_dir = ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");
    }

    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Page-teardown equivalent: stop timers, release the camera
    if let Err(e) = controller.shutdown().await {
        tracing::warn!(error = %e, "Controller already stopped");
    }
    if let Err(e) = controller_task.await {
        tracing::error!(error = %e, "Controller task failed");
    }

    tracing::info!("Live Tracker stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
