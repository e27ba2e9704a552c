use std::time::Duration;

use anyhow::Result;
use common::Config;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct OracleOptions {
    pub engine_path: String,
    pub engine_args: Vec<String>,
    pub engine_pool_size: usize,
    pub engine_threads: usize,
    pub engine_hash_mb: usize,
    pub engine_depth: Option<u32>,
    pub engine_movetime_ms: u64,
    pub engine_timeout_ms: u64,
    pub engine_startup_timeout_ms: u64,
}

impl OracleOptions {
    pub fn budget(&self) -> SearchBudget {
        SearchBudget {
            depth: self.engine_depth,
            movetime: Duration::from_millis(self.engine_movetime_ms),
            timeout: Duration::from_millis(self.engine_timeout_ms),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_startup_timeout_ms)
    }
}

impl Default for OracleOptions {
    fn default() -> Self {
        Self {
            engine_path: "stockfish".to_string(),
            engine_args: vec![],
            engine_pool_size: 4,
            engine_threads: 1,
            engine_hash_mb: 16,
            engine_depth: None,
            engine_movetime_ms: 100,
            engine_timeout_ms: 2_000,
            engine_startup_timeout_ms: 10_000,
        }
    }
}

impl Config for OracleOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            engine_path: config
                .get("engine_path")
                .and_then(|v| v.as_string())
                .unwrap_or(defaults.engine_path),
            engine_args: config
                .get("engine_args")
                .and_then(|v| v.as_string())
                .map(|args| args.split_whitespace().map(|a| a.to_owned()).collect())
                .unwrap_or(defaults.engine_args),
            engine_pool_size: config
                .get("engine_pool_size")
                .and_then(|v| v.as_usize())
                .unwrap_or(defaults.engine_pool_size),
            engine_threads: config
                .get("engine_threads")
                .and_then(|v| v.as_usize())
                .unwrap_or(defaults.engine_threads),
            engine_hash_mb: config
                .get("engine_hash_mb")
                .and_then(|v| v.as_usize())
                .unwrap_or(defaults.engine_hash_mb),
            engine_depth: config
                .get("engine_depth")
                .and_then(|v| v.as_usize())
                .and_then(|d| u32::try_from(d).ok()),
            engine_movetime_ms: config
                .get("engine_movetime_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.engine_movetime_ms),
            engine_timeout_ms: config
                .get("engine_timeout_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.engine_timeout_ms),
            engine_startup_timeout_ms: config
                .get("engine_startup_timeout_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(defaults.engine_startup_timeout_ms),
        })
    }
}

/// Search effort for one evaluation. `timeout` is the hard ceiling, enforced outside the engine.
#[derive(Clone, Debug)]
pub struct SearchBudget {
    pub depth: Option<u32>,
    pub movetime: Duration,
    pub timeout: Duration,
}

impl SearchBudget {
    pub fn go_command(&self) -> String {
        match self.depth {
            Some(depth) => format!("go depth {} movetime {}", depth, self.movetime.as_millis()),
            None => format!("go movetime {}", self.movetime.as_millis()),
        }
    }
}
