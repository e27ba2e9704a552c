mod batcher;
mod checkpoint;
mod metrics;
mod options;
mod reward;
mod self_learn;

pub use batcher::*;
pub use checkpoint::*;
pub use metrics::*;
pub use options::*;
pub use reward::*;
pub use self_learn::*;
