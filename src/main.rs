mod app_state;
mod config;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::AppConfig;
use services::{
    lifecycle::{JobManager, LifecyclePolicy},
    ocr::{OcrEngine, RemoteOcrEngine},
    storage::JobStore,
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing slip-scan server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_histogram!(
        "slip_processing_seconds",
        "Time to run OCR and parsing for one slip job"
    );
    metrics::describe_counter!("slip_jobs_submitted_total", "Total slip jobs submitted");
    metrics::describe_counter!("slip_jobs_completed_total", "Total slip jobs completed");
    metrics::describe_counter!("slip_jobs_failed_total", "Total slip jobs that failed");
    metrics::describe_gauge!(
        "slip_queue_depth",
        "Current number of jobs waiting for a worker"
    );

    // Open the job store on the mounted data volume
    tracing::info!(root = %config.data_root, "Opening job store");
    let store = Arc::new(
        JobStore::open(&config.data_root)
            .await
            .expect("Failed to open job store"),
    );

    // Initialize the OCR engine client
    tracing::info!(url = %config.ocr_url, "Initializing OCR engine client");
    let engine: Arc<dyn OcrEngine> =
        Arc::new(RemoteOcrEngine::new(&config.ocr_url, config.languages()));

    // Start the lifecycle manager: recovery pass, hydration, worker pool
    let policy = LifecyclePolicy {
        worker_count: config.worker_count,
        job_timeout: Duration::from_secs(config.job_timeout_secs),
        max_retries: config.max_retries,
        retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        min_confidence: config.ocr_min_confidence,
    };
    tracing::info!(workers = policy.worker_count, "Starting job lifecycle manager");
    let manager = JobManager::start(Arc::clone(&store), Arc::clone(&engine), policy)
        .await
        .expect("Failed to start job lifecycle manager");

    // Create shared application state
    let state = AppState {
        manager,
        store,
        engine,
    };

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/slips", post(routes::jobs::submit_slip))
        .route(
            "/api/v1/slips/{job_id}",
            get(routes::jobs::get_job_status).delete(routes::jobs::cancel_job),
        )
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(10 * 1024 * 1024)); // 10 MB limit

    tracing::info!("Starting slip-scan on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
