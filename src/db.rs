//! Database module - PostgreSQL connection and schema bootstrap

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Create tables if missing
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Multi-statement script, so it goes through the simple query protocol.
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Strip credentials from a connection URL for logging
pub fn redact_url(database_url: &str) -> &str {
    database_url.rsplit('@').next().unwrap_or("***")
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Sensor features (written by the upstream collector)
CREATE TABLE IF NOT EXISTS features (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    workload DOUBLE PRECISION NOT NULL,
    stress DOUBLE PRECISION NOT NULL,
    hrv DOUBLE PRECISION NOT NULL
);

-- Predictions (append-only)
CREATE TABLE IF NOT EXISTS predictions (
    id BIGSERIAL PRIMARY KEY,
    user_id TEXT NOT NULL,
    p_next_hour DOUBLE PRECISION NOT NULL,
    top_factors JSONB NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ DEFAULT NOW()
);

-- Users (push token only)
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    fcm_token TEXT,
    updated_at TIMESTAMPTZ DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_features_user_time ON features(user_id, timestamp);
CREATE INDEX IF NOT EXISTS idx_predictions_user_time ON predictions(user_id, timestamp);
"#;
