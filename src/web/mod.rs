pub mod extractors;
pub mod handlers;
pub mod middleware;

use crate::{models::ModelManager, Config, Result};
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer};

pub async fn serve(config: Config) -> Result<()> {
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        crate::utils::error::VisionError::Config(format!(
            "Invalid bind address {}: {}",
            config.bind_addr, e
        ))
    })?;

    // Model loading is blocking and can take a while
    let init_config = config.clone();
    tokio::task::spawn_blocking(move || ModelManager::init(init_config))
        .await
        .map_err(|e| {
            crate::utils::error::VisionError::Internal(format!("Model loading task failed: {}", e))
        })??;

    let app = create_app(config);

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /classify        - JSON base64 upload");
    tracing::info!("  POST /classify/upload - Multipart file upload");
    tracing::info!("  POST /classify/batch  - Multipart batch upload");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/info        - Service information");

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        crate::utils::error::VisionError::Internal(format!(
            "Failed to bind to address {}: {}",
            addr, e
        ))
    })?;

    axum::serve(listener, app).await.map_err(|e| {
        crate::utils::error::VisionError::Internal(format!("Server failed: {}", e))
    })?;

    Ok(())
}

pub fn create_app(config: Config) -> Router {
    Router::new()
        .route("/classify", post(handlers::classify_json_handler))
        .route("/classify/upload", post(handlers::classify_upload_handler))
        .route("/classify/batch", post(handlers::classify_batch_handler))
        .route("/health", get(health_handler))
        .route("/api/info", get(info_handler))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_logging))
        // The explicit limit below replaces axum's 2MB extractor default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.server_config.max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server_config.request_timeout,
        )))
        .layer(CorsLayer::permissive())
        .with_state(config)
}

async fn health_handler() -> Result<Json<serde_json::Value>> {
    let manager = ModelManager::instance()?;
    tokio::task::spawn_blocking(move || manager.health_check())
        .await
        .map_err(|e| crate::utils::error::VisionError::Internal(e.to_string()))??;

    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn info_handler() -> Result<Json<serde_json::Value>> {
    let stats = crate::models::get_model_stats()?;
    Ok(Json(json!({
        "service": "ONNX Vision Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "model": stats,
        "features": {
            "dual_upload_modes": true,
            "batch_processing": true,
            "top_k": stats.top_k
        }
    })))
}
