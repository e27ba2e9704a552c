use serde::{Deserialize, Serialize};

use super::PolicyRef;

/// One policy-gradient sample: the completion the policy produced for `prompt`, weighted by its return.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub prompt: String,
    pub completion: String,
    pub weight: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingBatch {
    pub iteration: usize,
    /// The policy the examples were sampled from; the update is applied on top of it.
    pub policy: PolicyRef,
    pub examples: Vec<TrainingExample>,
}

impl TrainingBatch {
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}
