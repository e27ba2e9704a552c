pub mod backoff;
pub mod config;
pub mod env;
pub mod fs;
pub mod rng;

pub use backoff::*;
pub use config::*;
pub use env::*;
pub use fs::*;
pub use rng::*;
