//! Pipeline errors

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("not enough feature data for user {user_id}: need {required} rows, found {available}")]
    InsufficientData {
        user_id: String,
        required: usize,
        available: usize,
    },

    #[error("data store query failed: {0}")]
    DataAccess(#[source] StoreError),

    #[error("predictor unavailable after {attempts} attempts: {last_cause}")]
    PredictionUnavailable { attempts: u32, last_cause: String },

    #[error("malformed predictor response: {0}")]
    PredictionFormat(String),

    #[error("failed to persist prediction: {0}")]
    Persistence(#[source] StoreError),
}

impl PipelineError {
    /// Caller-side problem rather than a server fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::InsufficientData { .. })
    }
}
