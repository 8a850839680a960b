//! Recommendation composer
//!
//! Two strategies behind one trait: the static rule table and an optional
//! generative model. The composer tries the primary strategy and falls back to
//! the rules on any failure, so callers always get a bundle with at least one
//! action.

pub mod generative;
pub mod rules;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::PredictionResult;

pub use generative::{GeminiClient, GeminiConfig, GenerativeStrategy, TextGenerator};
pub use rules::StaticRules;

/// User-facing text derived from a prediction. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendationBundle {
    pub summary: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Error)]
pub enum RecommendError {
    #[error("strategy not applicable")]
    Skipped,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RecommendationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn recommend(&self, prediction: &PredictionResult) -> Result<RecommendationBundle, RecommendError>;
}

/// Attempt-then-fallback composition
pub struct RecommendationComposer {
    primary: Option<Box<dyn RecommendationStrategy>>,
    fallback: Box<dyn RecommendationStrategy>,
}

impl RecommendationComposer {
    /// Rules only
    pub fn static_only() -> Self {
        Self {
            primary: None,
            fallback: Box::new(StaticRules),
        }
    }

    pub fn with_primary(primary: Box<dyn RecommendationStrategy>) -> Self {
        Self {
            primary: Some(primary),
            fallback: Box::new(StaticRules),
        }
    }

    pub async fn compose(&self, prediction: &PredictionResult) -> RecommendationBundle {
        if let Some(primary) = &self.primary {
            match primary.recommend(prediction).await {
                Ok(bundle) if !bundle.actions.is_empty() => {
                    tracing::debug!("Recommendations from {} strategy", primary.name());
                    return bundle;
                }
                Ok(_) => {
                    tracing::warn!("{} strategy returned no actions, using static rules", primary.name());
                }
                Err(RecommendError::Skipped) => {}
                Err(e) => {
                    tracing::warn!("{} strategy failed, using static rules: {}", primary.name(), e);
                }
            }
        }

        match self.fallback.recommend(prediction).await {
            Ok(bundle) => {
                tracing::debug!("Recommendations from {} strategy", self.fallback.name());
                bundle
            }
            Err(e) => {
                tracing::warn!("{} strategy failed: {}", self.fallback.name(), e);
                rules::bundle(prediction)
            }
        }
    }
}
