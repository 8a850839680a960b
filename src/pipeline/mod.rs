//! Prediction orchestration
//!
//! ```text
//! WindowSelector ──▶ Predictor ──▶ DataStore (append) ──▶ RecommendationComposer
//!   (features)       (HTTP+retry)    (predictions)          (generative | static)
//! ```
//!
//! `latest` skips the first two stages and re-derives the text from the most
//! recently stored prediction.

pub mod error;
pub mod predictor;
pub mod recommend;
pub mod window;

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::models::PredictionResult;
use crate::store::DataStore;

pub use error::PipelineError;
use predictor::{HttpPredictor, Predictor, PredictorConfig};
use recommend::{GeminiClient, GeminiConfig, GenerativeStrategy, RecommendationBundle, RecommendationComposer};
use window::WindowSelector;

/// A prediction together with its derived text
#[derive(Debug, Clone, Serialize)]
pub struct PredictionOutcome {
    pub prediction: PredictionResult,
    pub recommendation: RecommendationBundle,
}

pub struct PredictionPipeline {
    store: Arc<dyn DataStore>,
    selector: WindowSelector,
    predictor: Arc<dyn Predictor>,
    composer: RecommendationComposer,
}

impl PredictionPipeline {
    pub fn new(
        store: Arc<dyn DataStore>,
        selector: WindowSelector,
        predictor: Arc<dyn Predictor>,
        composer: RecommendationComposer,
    ) -> Self {
        Self {
            store,
            selector,
            predictor,
            composer,
        }
    }

    /// Wire the HTTP predictor and, when a key is configured, the Gemini strategy.
    pub fn from_config(config: &Config, store: Arc<dyn DataStore>) -> Result<Self, reqwest::Error> {
        let predictor = HttpPredictor::new(PredictorConfig {
            url: config.ml_url.clone(),
            timeout_seconds: config.ml_timeout_secs,
            retry: config.retry_policy(),
        })?;

        let composer = match &config.gemini_api_key {
            Some(key) => {
                let client = GeminiClient::new(GeminiConfig {
                    base_url: config.gemini_url.clone(),
                    model: config.gemini_model.clone(),
                    api_key: key.clone(),
                    timeout_seconds: config.gemini_timeout_secs,
                })?;
                tracing::info!("Generative recommendations enabled ({})", config.gemini_model);
                RecommendationComposer::with_primary(Box::new(GenerativeStrategy::new(
                    Box::new(client),
                    config.generative_min_risk,
                )))
            }
            None => {
                tracing::info!("GEMINI_API_KEY not set, using static recommendations");
                RecommendationComposer::static_only()
            }
        };

        Ok(Self::new(
            store,
            WindowSelector::new(config.window_size, config.window_mode),
            Arc::new(predictor),
            composer,
        ))
    }

    /// Full run: select window, predict, persist, compose.
    /// `Ok(None)` means sliding mode has nothing left to replay.
    #[tracing::instrument(name = "prediction_run", skip(self), fields(run_id = %Uuid::new_v4()))]
    pub async fn run(&self, user_id: &str) -> Result<Option<PredictionOutcome>, PipelineError> {
        let window = match self.selector.select(self.store.as_ref(), user_id).await? {
            Some(w) => w,
            None => {
                tracing::info!("Window budget exhausted, skipping prediction");
                return Ok(None);
            }
        };

        tracing::debug!(rows = window.len(), "Window ready");
        let prediction = self.predictor.predict(user_id, &window).await?;
        tracing::info!(p_next_hour = prediction.p_next_hour, "Prediction received");

        self.store
            .insert_prediction(&prediction)
            .await
            .map_err(PipelineError::Persistence)?;

        let recommendation = self.composer.compose(&prediction).await;

        Ok(Some(PredictionOutcome {
            prediction,
            recommendation,
        }))
    }

    /// Most recent stored prediction with freshly derived text.
    pub async fn latest(&self, user_id: &str) -> Result<Option<PredictionOutcome>, PipelineError> {
        let prediction = match self
            .store
            .latest_prediction(user_id)
            .await
            .map_err(PipelineError::DataAccess)?
        {
            Some(p) => p,
            None => return Ok(None),
        };

        let recommendation = self.composer.compose(&prediction).await;

        Ok(Some(PredictionOutcome {
            prediction,
            recommendation,
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Direction, TopFactor};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use predictor::{with_retry, AttemptError, RetryPolicy};
    use recommend::rules;
    use std::sync::atomic::{AtomicU32, Ordering};
    use window::{tests::history, PredictionWindow, WindowMode};

    /// Fails with a transport error `failures` times, then answers.
    pub struct FlakyPredictor {
        pub failures: u32,
        pub calls: AtomicU32,
        pub p_next_hour: f64,
    }

    impl FlakyPredictor {
        pub fn new(failures: u32, p_next_hour: f64) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                p_next_hour,
            }
        }
    }

    #[async_trait]
    impl Predictor for FlakyPredictor {
        async fn predict(&self, user_id: &str, window: &PredictionWindow) -> Result<PredictionResult, PipelineError> {
            assert_eq!(window.len(), 24);
            with_retry(RetryPolicy::immediate(3), |_| async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= self.failures {
                    return Err(AttemptError::Transport("connection refused".to_string()));
                }
                Ok(PredictionResult {
                    user_id: user_id.to_string(),
                    p_next_hour: self.p_next_hour,
                    top_factors: vec![
                        TopFactor::new("stress", 0.5, Direction::RiskUp),
                        TopFactor::new("hrv", 0.2, Direction::RiskDown),
                    ],
                    timestamp: Utc::now(),
                })
            })
            .await
        }
    }

    pub fn pipeline(store: Arc<MemoryStore>, predictor: Arc<FlakyPredictor>, mode: WindowMode) -> PredictionPipeline {
        PredictionPipeline::new(
            store,
            WindowSelector::new(24, mode),
            predictor,
            RecommendationComposer::static_only(),
        )
    }

    #[tokio::test]
    async fn test_run_persists_and_recommends() {
        let store = Arc::new(MemoryStore::with_features(history("u1", 24)));
        let predictor = Arc::new(FlakyPredictor::new(2, 0.75));
        let pipeline = pipeline(store.clone(), predictor.clone(), WindowMode::Latest);

        let outcome = pipeline.run("u1").await.unwrap().unwrap();

        assert_eq!(predictor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.recommendation.summary, rules::HIGH_RISK_MESSAGE);
        assert_eq!(outcome.recommendation.actions, rules::STRESS_ACTIONS.map(String::from).to_vec());
        assert_eq!(store.predictions.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_history_never_calls_predictor() {
        let store = Arc::new(MemoryStore::with_features(history("u1", 23)));
        let predictor = Arc::new(FlakyPredictor::new(0, 0.5));
        let pipeline = pipeline(store.clone(), predictor.clone(), WindowMode::Latest);

        let err = pipeline.run("u1").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(predictor.calls.load(Ordering::SeqCst), 0);
        assert!(store.predictions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_predictor_exhaustion_persists_nothing() {
        let store = Arc::new(MemoryStore::with_features(history("u1", 24)));
        let predictor = Arc::new(FlakyPredictor::new(3, 0.5));
        let pipeline = pipeline(store.clone(), predictor, WindowMode::Latest);

        let err = pipeline.run("u1").await.unwrap_err();
        assert!(matches!(err, PipelineError::PredictionUnavailable { attempts: 3, .. }));
        assert!(store.predictions.lock().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_run() {
        let store = Arc::new(MemoryStore {
            fail_writes: true,
            ..MemoryStore::with_features(history("u1", 24))
        });
        let pipeline = pipeline(store, Arc::new(FlakyPredictor::new(0, 0.5)), WindowMode::Latest);

        let err = pipeline.run("u1").await.unwrap_err();
        assert!(matches!(err, PipelineError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_block_mode_reuses_single_block() {
        let store = Arc::new(MemoryStore::with_features(history("u1", 24)));
        let predictor = Arc::new(FlakyPredictor::new(0, 0.3));
        let pipeline = pipeline(store.clone(), predictor, WindowMode::Block);

        assert!(pipeline.run("u1").await.unwrap().is_some());
        assert!(pipeline.run("u1").await.unwrap().is_some());
        assert_eq!(store.predictions.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_sliding_mode_exhausts_quietly() {
        let store = Arc::new(MemoryStore::with_features(history("u1", 25)));
        let predictor = Arc::new(FlakyPredictor::new(0, 0.3));
        let pipeline = pipeline(store.clone(), predictor, WindowMode::Sliding { max_runs: 10 });

        assert!(pipeline.run("u1").await.unwrap().is_some());
        assert!(pipeline.run("u1").await.unwrap().is_some());
        assert!(pipeline.run("u1").await.unwrap().is_none());
        assert_eq!(store.predictions.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_latest_rederives_text() {
        let store = Arc::new(MemoryStore::default());
        let pipeline = pipeline(store.clone(), Arc::new(FlakyPredictor::new(0, 0.5)), WindowMode::Latest);

        assert!(pipeline.latest("u1").await.unwrap().is_none());

        store.predictions.lock().push(PredictionResult {
            user_id: "u1".to_string(),
            p_next_hour: 0.45,
            top_factors: vec![TopFactor::new("workload", 0.4, Direction::RiskUp)],
            timestamp: Utc::now(),
        });

        let outcome = pipeline.latest("u1").await.unwrap().unwrap();
        assert_eq!(outcome.recommendation.summary, rules::MODERATE_RISK_MESSAGE);
        assert_eq!(outcome.recommendation.actions.len(), 3);
    }
}
