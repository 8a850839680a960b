//! Scheduled predictions
//!
//! Background task that runs the pipeline for the default user on a fixed
//! period. Failures are logged and the loop keeps going.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::pipeline::PredictionPipeline;

/// Start the prediction loop. Returns immediately when `interval_secs` is 0.
pub async fn start_prediction_loop(pipeline: Arc<PredictionPipeline>, user_id: String, interval_secs: u64) {
    if interval_secs == 0 {
        tracing::info!("Scheduled predictions are disabled");
        return;
    }

    tracing::info!("Starting scheduled predictions every {}s for user {}", interval_secs, user_id);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately; wait one period before the first run.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        run_once(&pipeline, &user_id).await;
    }
}

/// One scheduled invocation. Never panics on pipeline errors.
pub async fn run_once(pipeline: &PredictionPipeline, user_id: &str) -> bool {
    tracing::debug!("Running scheduled prediction task");

    match pipeline.run(user_id).await {
        Ok(Some(outcome)) => {
            tracing::info!(
                p_next_hour = outcome.prediction.p_next_hour,
                factors = outcome.prediction.top_factors.len(),
                timestamp = %outcome.prediction.timestamp,
                "Scheduled prediction stored"
            );
            true
        }
        Ok(None) => {
            tracing::info!("Scheduled prediction skipped, window budget exhausted");
            false
        }
        Err(e) => {
            tracing::error!("Scheduled prediction failed: {}", e);
            false
        }
    }
}
