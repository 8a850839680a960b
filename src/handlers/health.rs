//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    window_mode: String,
    generative_recommendations: bool,
    timestamp: i64,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.config.environment.clone(),
        window_mode: format!("{:?}", state.config.window_mode),
        generative_recommendations: state.config.gemini_api_key.is_some(),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

pub async fn root() -> &'static str {
    "Migraine forecast backend is running"
}
