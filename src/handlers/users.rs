//! User handlers

use axum::{extract::State, Json};
use validator::Validate;

use crate::{AppState, AppResult};
use crate::models::{RegisterTokenRequest, RegisterTokenResponse};

/// Associate a push token with a user
pub async fn register_token(
    State(state): State<AppState>,
    Json(req): Json<RegisterTokenRequest>,
) -> AppResult<Json<RegisterTokenResponse>> {
    req.validate()?;

    state.store.save_push_token(&req.user_id, &req.fcm_token).await?;

    tracing::info!("Push token saved for user {}", req.user_id);

    Ok(Json(RegisterTokenResponse {
        success: true,
        message: "FCM token saved".to_string(),
    }))
}
