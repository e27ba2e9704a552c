use anyhow::Result;
use common::Config;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ServiceOptions {
    pub service_url: String,
    pub base_model: String,
    pub request_timeout_ms: u64,
    pub learning_rate: f32,
}

impl Config for ServiceOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        Ok(Self {
            service_url: config.get_string("service_url")?,
            base_model: config.get_string("base_model")?,
            request_timeout_ms: config
                .get("request_timeout_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(120_000),
            learning_rate: config
                .get("learning_rate")
                .and_then(|v| v.as_f32())
                .unwrap_or(1e-5),
        })
    }
}
