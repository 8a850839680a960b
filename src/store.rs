//! Data access - the two logical tables the pipeline touches
//!
//! `features` is read, `predictions` is appended to and read back. Users only
//! carry a push token. Nothing here caches rows beyond a single call.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::{self, FeatureRow, PredictionResult};

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError(err.to_string())
    }
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// The `limit` most recent feature rows for a user, ascending by timestamp.
    async fn recent_features(&self, user_id: &str, limit: usize) -> Result<Vec<FeatureRow>, StoreError>;

    /// Every feature row for a user, ascending by timestamp.
    async fn feature_history(&self, user_id: &str) -> Result<Vec<FeatureRow>, StoreError>;

    async fn insert_prediction(&self, prediction: &PredictionResult) -> Result<(), StoreError>;

    async fn latest_prediction(&self, user_id: &str) -> Result<Option<PredictionResult>, StoreError>;

    async fn save_push_token(&self, user_id: &str, fcm_token: &str) -> Result<(), StoreError>;
}

/// Postgres-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DataStore for PgStore {
    async fn recent_features(&self, user_id: &str, limit: usize) -> Result<Vec<FeatureRow>, StoreError> {
        Ok(FeatureRow::recent(&self.pool, user_id, limit).await?)
    }

    async fn feature_history(&self, user_id: &str) -> Result<Vec<FeatureRow>, StoreError> {
        Ok(FeatureRow::history(&self.pool, user_id).await?)
    }

    async fn insert_prediction(&self, prediction: &PredictionResult) -> Result<(), StoreError> {
        Ok(prediction.insert(&self.pool).await?)
    }

    async fn latest_prediction(&self, user_id: &str) -> Result<Option<PredictionResult>, StoreError> {
        Ok(PredictionResult::find_latest(&self.pool, user_id).await?)
    }

    async fn save_push_token(&self, user_id: &str, fcm_token: &str) -> Result<(), StoreError> {
        Ok(models::save_fcm_token(&self.pool, user_id, fcm_token).await?)
    }
}
