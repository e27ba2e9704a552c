use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one immutable snapshot of policy weights. A training step never changes a `PolicyRef`; it
/// returns a new one with a higher version.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyRef {
    run_name: String,
    version: usize,
    model_id: String,
}

impl PolicyRef {
    pub fn new(run_name: String, version: usize, model_id: String) -> Self {
        Self {
            run_name,
            version,
            model_id,
        }
    }

    /// The starting policy of a run.
    pub fn base(run_name: String, model_id: String) -> Self {
        Self::new(run_name, 0, model_id)
    }

    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    pub fn version(&self) -> usize {
        self.version
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn name(&self) -> String {
        format!("{}_{:0>5}", self.run_name, self.version)
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.model_id)
    }
}
