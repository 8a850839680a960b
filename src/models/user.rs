//! User push-token model

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterTokenRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "user_id is required"))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "fcm_token is required"))]
    pub fcm_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterTokenResponse {
    pub success: bool,
    pub message: String,
}

/// Store the push token for a user, creating the user row if needed.
pub async fn save_fcm_token(pool: &PgPool, user_id: &str, fcm_token: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO users (id, fcm_token)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET fcm_token = EXCLUDED.fcm_token
        "#
    )
    .bind(user_id)
    .bind(fcm_token)
    .execute(pool)
    .await?;
    Ok(())
}
