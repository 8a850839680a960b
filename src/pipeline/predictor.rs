//! Prediction client
//!
//! HTTP client for the external ML predictor with bounded retry.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::window::PredictionWindow;
use super::PipelineError;
use crate::models::{FeatureRow, PredictionResult, TopFactor};

/// Delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// base, 2*base, 4*base...
    Exponential { base: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Fixed(Duration::from_secs(5)),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before attempt number `attempt` (1-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base } => base.saturating_mul(1 << (attempt - 2).min(16)),
        }
    }

    #[cfg(test)]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }
}

/// Outcome of a single attempt
#[derive(Debug, Clone)]
pub enum AttemptError {
    /// Timeout, connection failure or non-2xx status. Retried.
    Transport(String),
    /// The service answered but the body is unusable. Not retried.
    Format(String),
}

/// Run `attempt` until it succeeds, fails with a format error, or the policy
/// runs out of attempts.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> Result<T, PipelineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_cause = String::new();

    for n in 1..=max_attempts {
        let delay = policy.delay_before(n);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Format(msg)) => return Err(PipelineError::PredictionFormat(msg)),
            Err(AttemptError::Transport(msg)) => {
                tracing::warn!("Predictor attempt {}/{} failed: {}", n, max_attempts, msg);
                last_cause = msg;
            }
        }
    }

    Err(PipelineError::PredictionUnavailable {
        attempts: max_attempts,
        last_cause,
    })
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, user_id: &str, window: &PredictionWindow) -> Result<PredictionResult, PipelineError>;
}

// Wire types

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowEntry {
    pub workload_0_10: f64,
    pub stress_0_10: f64,
    pub hrv_rmssd_ms: f64,
}

impl From<&FeatureRow> for WindowEntry {
    fn from(row: &FeatureRow) -> Self {
        Self {
            workload_0_10: row.workload,
            stress_0_10: row.stress,
            hrv_rmssd_ms: row.hrv,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictorRequest {
    pub window: Vec<WindowEntry>,
    pub timestamp: DateTime<Utc>,
}

impl PredictorRequest {
    pub fn from_window(window: &PredictionWindow) -> Self {
        Self {
            window: window.rows().iter().map(WindowEntry::from).collect(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictorResponse {
    pub p_next_hour: Option<f64>,
    pub top_factors: Option<Vec<TopFactor>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// RFC 3339, or a naive ISO datetime taken as UTC. Anything else is dropped
/// and the receipt time is used instead.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    let parsed = match &raw {
        Some(serde_json::Value::String(s)) => parse_timestamp(s),
        _ => None,
    };
    if parsed.is_none() {
        if let Some(value) = raw.filter(|v| !v.is_null()) {
            tracing::warn!("Unparseable predictor timestamp {}, using receipt time", value);
        }
    }
    Ok(parsed)
}

impl PredictorResponse {
    /// Check required fields and build the result.
    pub fn into_result(self, user_id: &str) -> Result<PredictionResult, AttemptError> {
        let p_next_hour = self
            .p_next_hour
            .ok_or_else(|| AttemptError::Format("missing p_next_hour".to_string()))?;

        if !(0.0..=1.0).contains(&p_next_hour) {
            return Err(AttemptError::Format(format!(
                "p_next_hour out of range: {}",
                p_next_hour
            )));
        }

        let top_factors = self
            .top_factors
            .ok_or_else(|| AttemptError::Format("missing top_factors".to_string()))?;

        Ok(PredictionResult {
            user_id: user_id.to_string(),
            p_next_hour,
            top_factors,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
        })
    }
}

/// Predictor configuration
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub url: String,
    pub timeout_seconds: u64,
    pub retry: RetryPolicy,
}

/// HTTP predictor client
pub struct HttpPredictor {
    config: PredictorConfig,
    http_client: reqwest::Client,
}

impl HttpPredictor {
    pub fn new(config: PredictorConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, http_client })
    }

    async fn attempt(&self, user_id: &str, request: &PredictorRequest) -> Result<PredictionResult, AttemptError> {
        let response = self
            .http_client
            .post(&self.config.url)
            .json(request)
            .send()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AttemptError::Transport(format!("status {}: {}", status.as_u16(), body)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AttemptError::Transport(e.to_string()))?;

        let parsed: PredictorResponse = serde_json::from_slice(&body)
            .map_err(|e| AttemptError::Format(e.to_string()))?;

        parsed.into_result(user_id)
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(&self, user_id: &str, window: &PredictionWindow) -> Result<PredictionResult, PipelineError> {
        let request = PredictorRequest::from_window(window);

        tracing::debug!("Calling predictor {} with {} rows", self.config.url, request.window.len());

        with_retry(self.config.retry, |_| self.attempt(user_id, &request)).await
    }
}
