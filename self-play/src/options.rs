use std::time::Duration;

use anyhow::Result;
use common::{Backoff, Config};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RolloutOptions {
    /// Plies a rollout may play past its opening before it is adjudicated a draw.
    pub max_plies: usize,
    /// Extra samples granted after an invalid completion before the side forfeits.
    pub invalid_move_retries: usize,
    pub history_plies: usize,
    pub sample_timeout_ms: u64,
    pub sample_retries: usize,
    pub engine_retries: usize,
    pub retry_base_delay_ms: u64,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl RolloutOptions {
    pub fn sample_timeout(&self) -> Duration {
        Duration::from_millis(self.sample_timeout_ms)
    }

    pub fn sample_backoff(&self) -> Backoff {
        Backoff::new(self.sample_retries, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn engine_backoff(&self) -> Backoff {
        Backoff::new(self.engine_retries, Duration::from_millis(self.retry_base_delay_ms))
    }
}

impl Default for RolloutOptions {
    fn default() -> Self {
        Self {
            max_plies: 200,
            invalid_move_retries: 3,
            history_plies: 8,
            sample_timeout_ms: 30_000,
            sample_retries: 3,
            engine_retries: 2,
            retry_base_delay_ms: 250,
            temperature: 1.0,
            max_tokens: 16,
        }
    }
}

impl Config for RolloutOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        let default = Self::default();

        Ok(Self {
            max_plies: config
                .get("max_plies")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.max_plies),
            invalid_move_retries: config
                .get("invalid_move_retries")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.invalid_move_retries),
            history_plies: config
                .get("history_plies")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.history_plies),
            sample_timeout_ms: config
                .get("sample_timeout_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(default.sample_timeout_ms),
            sample_retries: config
                .get("sample_retries")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.sample_retries),
            engine_retries: config
                .get("engine_retries")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.engine_retries),
            retry_base_delay_ms: config
                .get("retry_base_delay_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(default.retry_base_delay_ms),
            temperature: config
                .get("temperature")
                .and_then(|v| v.as_f32())
                .unwrap_or(default.temperature),
            max_tokens: config
                .get("max_tokens")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.max_tokens),
        })
    }
}
