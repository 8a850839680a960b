//! Generative recommendations via an external text model (Gemini)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{RecommendError, RecommendationBundle, RecommendationStrategy};
use crate::models::{Direction, PredictionResult, TopFactor};

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RecommendError>;
}

/// Gemini configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    pub timeout_seconds: u64,
}

/// Gemini `generateContent` client
pub struct GeminiClient {
    config: GeminiConfig,
    http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { config, http_client })
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, RecommendError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RecommendError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RecommendError::Network(format!("status {}", response.status().as_u16())));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| RecommendError::Malformed(e.to_string()))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(RecommendError::Malformed("empty completion".to_string()));
        }
        Ok(text)
    }
}

#[derive(Debug, Serialize)]
struct PromptFactor<'a> {
    feature: &'a str,
    label: &'static str,
    score: f64,
    direction: Direction,
}

fn feature_label(feature: &str) -> &'static str {
    match feature {
        "stress" => "stress level (0-10)",
        "workload" => "workload (0-10)",
        "hrv" => "heart rate variability (RMSSD, ms)",
        _ => "other signal",
    }
}

fn prompt_factors(factors: &[TopFactor]) -> Vec<PromptFactor<'_>> {
    factors
        .iter()
        .map(|f| PromptFactor {
            feature: &f.feature,
            label: feature_label(&f.feature),
            score: f.score,
            direction: f.direction,
        })
        .collect()
}

pub fn build_prompt(prediction: &PredictionResult) -> String {
    let factors = serde_json::to_string(&prompt_factors(&prediction.top_factors))
        .unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are a wellness assistant helping someone manage migraine risk.\n\
         Probability of a migraine in the next hour: {:.2}\n\
         Top contributing factors (risk_up raises risk, risk_down lowers it): {}\n\n\
         Reply with a single JSON object and nothing else, shaped as\n\
         {{\"summary\": \"<one or two sentences on today's risk>\", \"actions\": [\"<short concrete action>\", ...]}}\n\
         Give 3 to 5 actions. Do not give medical diagnoses.",
        prediction.p_next_hour, factors
    )
}

#[derive(Debug, Deserialize)]
struct RawBundle {
    summary: String,
    actions: Vec<String>,
}

/// Pull the JSON object out of free text: first `{` through last `}`.
pub fn parse_bundle(text: &str) -> Result<RecommendationBundle, RecommendError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => return Err(RecommendError::Malformed("no JSON object in response".to_string())),
    };

    let raw: RawBundle =
        serde_json::from_str(json).map_err(|e| RecommendError::Malformed(e.to_string()))?;

    let actions: Vec<String> = raw
        .actions
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();

    if raw.summary.trim().is_empty() {
        return Err(RecommendError::Malformed("empty summary".to_string()));
    }
    if actions.is_empty() {
        return Err(RecommendError::Malformed("empty actions".to_string()));
    }

    Ok(RecommendationBundle {
        summary: raw.summary.trim().to_string(),
        actions,
    })
}

/// Asks a text model for the bundle. Skipped below `min_risk` to bound cost.
pub struct GenerativeStrategy {
    generator: Box<dyn TextGenerator>,
    min_risk: f64,
}

impl GenerativeStrategy {
    pub fn new(generator: Box<dyn TextGenerator>, min_risk: f64) -> Self {
        Self { generator, min_risk }
    }
}

#[async_trait]
impl RecommendationStrategy for GenerativeStrategy {
    fn name(&self) -> &'static str {
        "generative"
    }

    async fn recommend(&self, prediction: &PredictionResult) -> Result<RecommendationBundle, RecommendError> {
        if prediction.p_next_hour <= self.min_risk {
            return Err(RecommendError::Skipped);
        }

        let prompt = build_prompt(prediction);
        let text = self.generator.generate(&prompt).await?;
        parse_bundle(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::predictor::tests::serve_stub;
    use axum::http::{HeaderMap, StatusCode, Uri};
    use axum::response::IntoResponse;
    use axum::Router;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn prediction(p: f64) -> PredictionResult {
        PredictionResult {
            user_id: "u1".to_string(),
            p_next_hour: p,
            top_factors: vec![TopFactor::new("stress", 0.6, Direction::RiskUp)],
            timestamp: Utc::now(),
        }
    }

    /// Stub Gemini endpoint; records `(path, api key)` of each request.
    async fn stub_gemini(
        status: StatusCode,
        reply: serde_json::Value,
    ) -> (GeminiClient, Arc<Mutex<Vec<(String, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let router = Router::new().fallback(move |uri: Uri, headers: HeaderMap| {
            let log = log.clone();
            let reply = reply.clone();
            async move {
                let key = headers
                    .get("x-goog-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                log.lock().push((uri.path().to_string(), key));
                (status, axum::Json(reply)).into_response()
            }
        });
        let base = serve_stub(router).await;

        let client = GeminiClient::new(GeminiConfig {
            base_url: format!("{}/v1beta/", base),
            model: "gemini-test".to_string(),
            api_key: "secret".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();
        (client, seen)
    }

    #[tokio::test]
    async fn test_gemini_reply_through_strategy() {
        let reply = json!({
            "candidates": [{
                "content": {
                    "parts": [
                        { "text": "```json\n{\"summary\": \"Risk is climbing.\"," },
                        { "text": " \"actions\": [\"Dim the lights\", \" Drink water \"]}\n```" }
                    ]
                }
            }]
        });
        let (client, seen) = stub_gemini(StatusCode::OK, reply).await;
        let strategy = GenerativeStrategy::new(Box::new(client), 0.2);

        let bundle = strategy.recommend(&prediction(0.8)).await.unwrap();
        assert_eq!(bundle.summary, "Risk is climbing.");
        assert_eq!(bundle.actions, vec!["Dim the lights", "Drink water"]);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "/v1beta/models/gemini-test:generateContent");
        assert_eq!(seen[0].1, "secret");
    }

    #[tokio::test]
    async fn test_gemini_error_status_is_network_error() {
        let (client, _) = stub_gemini(StatusCode::SERVICE_UNAVAILABLE, json!({})).await;
        let result = client.generate("prompt").await;
        assert!(matches!(result, Err(RecommendError::Network(msg)) if msg == "status 503"));
    }

    #[tokio::test]
    async fn test_gemini_without_candidates_is_malformed() {
        let (client, _) = stub_gemini(StatusCode::OK, json!({ "candidates": [] })).await;
        assert!(matches!(client.generate("prompt").await, Err(RecommendError::Malformed(_))));
    }

    #[test]
    fn test_parse_bundle_from_fenced_text() {
        let text = "Sure! ```json\n{\"summary\": \"Elevated risk.\", \"actions\": [\"Rest\", \"Hydrate\"]}\n```";
        let bundle = parse_bundle(text).unwrap();
        assert_eq!(bundle.summary, "Elevated risk.");
        assert_eq!(bundle.actions, vec!["Rest", "Hydrate"]);
    }

    #[test]
    fn test_parse_bundle_rejects_bad_shapes() {
        assert!(parse_bundle("no braces at all").is_err());
        assert!(parse_bundle("} backwards {").is_err());
        assert!(parse_bundle("{\"summary\": \"x\", \"actions\": []}").is_err());
        assert!(parse_bundle("{\"summary\": \"x\", \"actions\": [1, 2]}").is_err());
        assert!(parse_bundle("{\"summary\": \"x\"").is_err());
    }

    #[test]
    fn test_prompt_mentions_probability_and_factors() {
        let prompt = build_prompt(&prediction(0.734));
        assert!(prompt.contains("0.73"));
        assert!(prompt.contains("stress level (0-10)"));
        assert!(prompt.contains("risk_up"));
    }
}
