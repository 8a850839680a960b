//! Feature row model

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use chrono::{DateTime, Utc};

/// One row of per-user sensor features, written by the upstream collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FeatureRow {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub workload: f64,
    pub stress: f64,
    pub hrv: f64,
}

impl FeatureRow {
    /// The `limit` most recent rows for a user, oldest first.
    pub async fn recent(
        pool: &PgPool,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut rows = sqlx::query_as::<_, FeatureRow>(
            r#"
            SELECT user_id, timestamp, workload, stress, hrv
            FROM features
            WHERE user_id = $1
            ORDER BY timestamp DESC
            LIMIT $2
            "#
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;

        rows.reverse();
        Ok(rows)
    }

    /// Full feature history for a user, oldest first.
    pub async fn history(pool: &PgPool, user_id: &str) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, FeatureRow>(
            r#"
            SELECT user_id, timestamp, workload, stress, hrv
            FROM features
            WHERE user_id = $1
            ORDER BY timestamp ASC
            "#
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}
