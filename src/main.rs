//! Migraine Forecast Backend Server
//!
//! Orchestrates next-hour migraine risk predictions for the mobile app.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MIGRAINE CLOUD                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────────┐  ┌─────────────────────┐ │
//! │  │  API      │  │  Prediction   │  │  Scheduler          │ │
//! │  │  (Axum)   │─▶│  Pipeline     │◀─│  (interval task)    │ │
//! │  └───────────┘  └───┬───────┬───┘  └─────────────────────┘ │
//! │                     │       │                               │
//! │          ┌──────────▼─┐   ┌─▼──────────────────┐            │
//! │          │ PostgreSQL │   │ ML predictor /     │            │
//! │          │            │   │ Gemini (HTTP)      │            │
//! │          └────────────┘   └────────────────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod error;
mod handlers;
mod models;
mod pipeline;
mod scheduler;
mod store;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::net::SocketAddr;
use std::sync::Arc;

pub use error::{AppError, AppResult};

use pipeline::PredictionPipeline;
use store::{DataStore, PgStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    let config = config::Config::from_env();

    tracing::info!("Migraine Cloud Server starting ({})...", config.environment);
    tracing::info!("Database: {}", db::redact_url(&config.database_url));
    tracing::info!("Predictor: {}", config.ml_url);
    tracing::info!("Window: {} rows, mode {:?}", config.window_size, config.window_mode);

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let store: Arc<dyn DataStore> = Arc::new(PgStore::new(pool));
    let pipeline = Arc::new(
        PredictionPipeline::from_config(&config, store.clone())
            .context("Failed to build HTTP clients")?,
    );

    // Scheduled predictions
    tokio::spawn(scheduler::start_prediction_loop(
        pipeline.clone(),
        config.default_user_id.clone(),
        config.predict_interval_secs,
    ));

    // Build application state
    let state = AppState {
        store,
        pipeline,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "migraine_cloud=debug,tower_http=debug".into());

    let json = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DataStore>,
    pub pipeline: Arc<PredictionPipeline>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health::root))
        .route("/health", get(handlers::health::check))
        .route("/api/predict", post(handlers::predict::run))
        .route("/api/v1/latest", get(handlers::predict::latest))
        .route("/api/register-token", post(handlers::users::register_token))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
