use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use common::{Backoff, Config};
use oracle::OracleOptions;
use self_play::RolloutOptions;
use serde::{Deserialize, Serialize};

use super::{BatchOptions, RewardOptions};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SelfLearnOptions {
    pub run_name: String,
    pub run_dir: PathBuf,
    pub iterations: usize,
    pub rollouts_per_iteration: usize,
    pub concurrency: usize,
    /// Aborted rollouts a single round may replace before the run is failed.
    pub max_replacement_rollouts: usize,
    pub discount: f32,
    pub shaping_weight: f32,
    pub shaping_clip: f32,
    pub invalid_move_penalty: f32,
    pub train_on_invalid: bool,
    pub normalize_returns: bool,
    pub shuffle_examples: bool,
    pub train_retries: usize,
    pub train_retry_base_delay_ms: u64,
    pub seed: u64,
    pub opening_book: Option<PathBuf>,
}

impl SelfLearnOptions {
    pub fn new(run_name: String, run_dir: PathBuf) -> Self {
        Self {
            run_name,
            run_dir,
            iterations: 10,
            rollouts_per_iteration: 8,
            concurrency: 4,
            max_replacement_rollouts: 8,
            discount: 0.99,
            shaping_weight: 0.01,
            shaping_clip: 0.5,
            invalid_move_penalty: -1.0,
            train_on_invalid: true,
            normalize_returns: false,
            shuffle_examples: false,
            train_retries: 5,
            train_retry_base_delay_ms: 1_000,
            seed: 0,
            opening_book: None,
        }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.run_dir.join("checkpoints")
    }

    pub fn rollout_dir(&self) -> PathBuf {
        self.run_dir.join("rollouts")
    }

    pub fn train_backoff(&self) -> Backoff {
        Backoff::new(
            self.train_retries,
            Duration::from_millis(self.train_retry_base_delay_ms),
        )
    }

    pub fn reward_options(&self) -> RewardOptions {
        RewardOptions {
            discount: self.discount,
            shaping_weight: self.shaping_weight,
            shaping_clip: self.shaping_clip,
            invalid_move_penalty: self.invalid_move_penalty,
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            train_on_invalid: self.train_on_invalid,
            normalize_returns: self.normalize_returns,
            shuffle_examples: self.shuffle_examples,
            seed: self.seed,
        }
    }

    /// Rejects configurations that cannot produce a meaningful run. Checked before any rollout is played.
    pub fn validate(&self, rollout: &RolloutOptions, oracle: &OracleOptions) -> Result<()> {
        if self.run_name.trim().is_empty() {
            bail!("run_name must not be empty");
        }

        if self.iterations == 0 {
            bail!("iterations must be at least 1");
        }

        if self.rollouts_per_iteration == 0 {
            bail!("rollouts_per_iteration must be at least 1");
        }

        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }

        if self.concurrency > self.rollouts_per_iteration {
            bail!(
                "concurrency ({}) exceeds rollouts_per_iteration ({})",
                self.concurrency,
                self.rollouts_per_iteration
            );
        }

        if !(0.0..=1.0).contains(&self.discount) {
            bail!("discount must be within [0, 1], got {}", self.discount);
        }

        if !(0.0..1.0).contains(&self.shaping_clip) {
            bail!(
                "shaping_clip must be within [0, 1) so a terminal reward keeps its sign, got {}",
                self.shaping_clip
            );
        }

        if self.invalid_move_penalty >= 0.0 {
            bail!(
                "invalid_move_penalty must be negative, got {}",
                self.invalid_move_penalty
            );
        }

        if rollout.max_plies == 0 {
            bail!("max_plies must be at least 1");
        }

        if oracle.engine_pool_size == 0 {
            bail!("engine_pool_size must be at least 1");
        }

        Ok(())
    }
}

impl Config for SelfLearnOptions {
    fn load(config: &common::ConfigLoader) -> Result<Self> {
        let default = Self::new(
            config.get_string("run_name")?,
            config.get_relative_path("run_dir")?,
        );

        let opening_book = match config.get("opening_book") {
            Some(_) => Some(config.get_relative_path("opening_book")?),
            None => None,
        };

        Ok(Self {
            iterations: config
                .get("iterations")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.iterations),
            rollouts_per_iteration: config
                .get("rollouts_per_iteration")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.rollouts_per_iteration),
            concurrency: config
                .get("concurrency")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.concurrency),
            max_replacement_rollouts: config
                .get("max_replacement_rollouts")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.max_replacement_rollouts),
            discount: config
                .get("discount")
                .and_then(|v| v.as_f32())
                .unwrap_or(default.discount),
            shaping_weight: config
                .get("shaping_weight")
                .and_then(|v| v.as_f32())
                .unwrap_or(default.shaping_weight),
            shaping_clip: config
                .get("shaping_clip")
                .and_then(|v| v.as_f32())
                .unwrap_or(default.shaping_clip),
            invalid_move_penalty: config
                .get("invalid_move_penalty")
                .and_then(|v| v.as_f32())
                .unwrap_or(default.invalid_move_penalty),
            train_on_invalid: config
                .get("train_on_invalid")
                .and_then(|v| v.as_bool())
                .unwrap_or(default.train_on_invalid),
            normalize_returns: config
                .get("normalize_returns")
                .and_then(|v| v.as_bool())
                .unwrap_or(default.normalize_returns),
            shuffle_examples: config
                .get("shuffle_examples")
                .and_then(|v| v.as_bool())
                .unwrap_or(default.shuffle_examples),
            train_retries: config
                .get("train_retries")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.train_retries),
            train_retry_base_delay_ms: config
                .get("train_retry_base_delay_ms")
                .and_then(|v| v.as_u64())
                .unwrap_or(default.train_retry_base_delay_ms),
            seed: config
                .get("seed")
                .and_then(|v| v.as_u64())
                .unwrap_or(default.seed),
            opening_book,
            ..default
        })
    }
}
