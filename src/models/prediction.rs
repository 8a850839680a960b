//! Prediction model

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, PgPool};
use chrono::{DateTime, Utc};

/// Which way a factor pushes the risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    RiskUp,
    RiskDown,
}

/// A contributing factor reported by the predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopFactor {
    pub feature: String,
    pub score: f64,
    pub direction: Direction,
}

impl TopFactor {
    pub fn new(feature: impl Into<String>, score: f64, direction: Direction) -> Self {
        Self {
            feature: feature.into(),
            score,
            direction,
        }
    }

    pub fn raises_risk(&self) -> bool {
        self.direction == Direction::RiskUp
    }
}

/// Prediction as returned by the predictor and stored verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub user_id: String,
    pub p_next_hour: f64,
    pub top_factors: Vec<TopFactor>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct PredictionRow {
    user_id: String,
    p_next_hour: f64,
    top_factors: Json<Vec<TopFactor>>,
    timestamp: DateTime<Utc>,
}

impl From<PredictionRow> for PredictionResult {
    fn from(row: PredictionRow) -> Self {
        Self {
            user_id: row.user_id,
            p_next_hour: row.p_next_hour,
            top_factors: row.top_factors.0,
            timestamp: row.timestamp,
        }
    }
}

impl PredictionResult {
    /// Append to the predictions table
    pub async fn insert(&self, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO predictions (user_id, p_next_hour, top_factors, timestamp)
            VALUES ($1, $2, $3, $4)
            "#
        )
        .bind(&self.user_id)
        .bind(self.p_next_hour)
        .bind(Json(&self.top_factors))
        .bind(self.timestamp)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_latest(pool: &PgPool, user_id: &str) -> Result<Option<Self>, sqlx::Error> {
        let row = sqlx::query_as::<_, PredictionRow>(
            r#"
            SELECT user_id, p_next_hour, top_factors, timestamp
            FROM predictions
            WHERE user_id = $1
            ORDER BY timestamp DESC
            LIMIT 1
            "#
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

/// Optional body of `POST /api/predict`
#[derive(Debug, Default, Deserialize)]
pub struct PredictRequest {
    pub user_id: Option<String>,
}

/// Query of `GET /api/v1/latest`
#[derive(Debug, Default, Deserialize)]
pub struct LatestQuery {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub user_id: String,
    pub p_next_hour: f64,
    pub recommendation: String,
    pub top_factors: Vec<TopFactor>,
    pub recommended_actions: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LatestPredictionResponse {
    pub p_next_hour: f64,
    pub top_factors: Vec<TopFactor>,
    pub recommendation: String,
    pub recommended_actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
}
