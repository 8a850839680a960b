//! Static recommendation rules

use async_trait::async_trait;

use super::{RecommendError, RecommendationBundle, RecommendationStrategy};
use crate::models::{PredictionResult, TopFactor};

pub const HIGH_RISK_THRESHOLD: f64 = 0.7;
pub const MODERATE_RISK_THRESHOLD: f64 = 0.4;

pub const HIGH_RISK_MESSAGE: &str = "High migraine risk today. Consider taking preventive measures such as resting, staying hydrated, and avoiding known triggers.";
pub const MODERATE_RISK_MESSAGE: &str = "Moderate migraine risk today. Stay alert to your symptoms, take short breaks and consider light activities that help reduce stress.";
pub const LOW_RISK_MESSAGE: &str = "Low migraine risk today. Maintain your current routine and continue monitoring your metrics.";

pub const NO_RISK_FACTORS_MESSAGE: &str = "No high-risk indicators detected. Keep maintaining a healthy lifestyle and continue monitoring your metrics.";

pub const STRESS_ACTIONS: [&str; 3] = [
    "10-min deep breathing or guided meditation",
    "Take 15-min short breaks during work",
    "15-min light physical activity like walking, yoga or stretching",
];

pub const WORKLOAD_ACTIONS: [&str; 3] = [
    "Break tasks into smaller chunks and focus on one at a time",
    "Set realistic goals for the day and prioritize high-impact tasks",
    "Take 5-min break after completing each major task",
];

pub const HRV_ACTIONS: [&str; 3] = [
    "Drink 1 glass of water every hour to stay hydrated",
    "Maintain a consistent sleep schedule of 7-9 hours per night",
    "Include light movement or relaxation before bedtime",
];

fn actions_for(feature: &str) -> Option<&'static [&'static str; 3]> {
    match feature {
        "stress" => Some(&STRESS_ACTIONS),
        "workload" => Some(&WORKLOAD_ACTIONS),
        "hrv" => Some(&HRV_ACTIONS),
        _ => None,
    }
}

/// Narrative for a probability. Lower bounds are inclusive.
pub fn risk_narrative(p_next_hour: f64) -> &'static str {
    if p_next_hour >= HIGH_RISK_THRESHOLD {
        HIGH_RISK_MESSAGE
    } else if p_next_hour >= MODERATE_RISK_THRESHOLD {
        MODERATE_RISK_MESSAGE
    } else {
        LOW_RISK_MESSAGE
    }
}

/// Canned actions for each risk-raising factor, in factor order, duplicates kept.
pub fn recommended_actions(top_factors: &[TopFactor]) -> Vec<String> {
    let mut actions: Vec<String> = top_factors
        .iter()
        .filter(|f| f.raises_risk())
        .filter_map(|f| actions_for(&f.feature))
        .flat_map(|list| list.iter().map(|a| a.to_string()))
        .collect();

    if actions.is_empty() {
        actions.push(NO_RISK_FACTORS_MESSAGE.to_string());
    }
    actions
}

pub fn bundle(prediction: &PredictionResult) -> RecommendationBundle {
    RecommendationBundle {
        summary: risk_narrative(prediction.p_next_hour).to_string(),
        actions: recommended_actions(&prediction.top_factors),
    }
}

/// Rule lookup keyed by contributing factor. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRules;

#[async_trait]
impl RecommendationStrategy for StaticRules {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn recommend(&self, prediction: &PredictionResult) -> Result<RecommendationBundle, RecommendError> {
        Ok(bundle(prediction))
    }
}
