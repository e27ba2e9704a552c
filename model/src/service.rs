use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PolicyRef, TrainingBatch};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    pub prompt: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub seed: u64,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode service response: {0}")]
    Decode(String),
    #[error("request timed out")]
    Timeout,
}

impl ServiceError {
    /// Transport failures, timeouts, throttling and server errors are transient; other statuses and
    /// malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Transport(_) | ServiceError::Timeout => true,
            ServiceError::Status { status, .. } => *status == 429 || *status >= 500,
            ServiceError::Decode(_) => false,
        }
    }
}

/// The remote inference/training collaborator.
#[allow(async_fn_in_trait)]
pub trait PolicyService {
    /// Samples one completion for `request.prompt` under `policy`.
    async fn sample(&self, policy: &PolicyRef, request: &SampleRequest) -> Result<String, ServiceError>;

    /// Applies one gradient step on `batch` and returns the updated policy.
    async fn train(&self, batch: &TrainingBatch) -> Result<PolicyRef, ServiceError>;
}
