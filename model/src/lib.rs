mod http;
mod options;
mod policy_ref;
mod service;
mod training_example;

pub use http::*;
pub use options::*;
pub use policy_ref::*;
pub use service::*;
pub use training_example::*;
