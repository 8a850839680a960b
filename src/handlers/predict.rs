//! Prediction handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::{AppState, AppError, AppResult};
use crate::models::{LatestPredictionResponse, LatestQuery, PredictRequest, PredictResponse};

/// Run the full prediction pipeline
pub async fn run(
    State(state): State<AppState>,
    body: Option<Json<PredictRequest>>,
) -> AppResult<Response> {
    let user_id = body
        .and_then(|Json(req)| req.user_id)
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.config.default_user_id.clone());

    let outcome = match state.pipeline.run(&user_id).await? {
        Some(outcome) => outcome,
        None => return Ok(StatusCode::NO_CONTENT.into_response()),
    };

    let prediction = outcome.prediction;
    Ok(Json(PredictResponse {
        user_id: prediction.user_id,
        p_next_hour: prediction.p_next_hour,
        recommendation: outcome.recommendation.summary,
        top_factors: prediction.top_factors,
        recommended_actions: outcome.recommendation.actions,
        generated_at: prediction.timestamp,
    })
    .into_response())
}

/// Latest stored prediction with fresh recommendations
pub async fn latest(
    State(state): State<AppState>,
    Query(query): Query<LatestQuery>,
) -> AppResult<Json<LatestPredictionResponse>> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| state.config.default_user_id.clone());

    let outcome = state
        .pipeline
        .latest(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No prediction found for the user.".to_string()))?;

    let prediction = outcome.prediction;
    Ok(Json(LatestPredictionResponse {
        p_next_hour: prediction.p_next_hour,
        top_factors: prediction.top_factors,
        recommendation: outcome.recommendation.summary,
        recommended_actions: outcome.recommendation.actions,
        timestamp: prediction.timestamp,
    }))
}
