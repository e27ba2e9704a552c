use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use common::{create_rng_from_seed, derive_seed, retry_with_backoff};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use model::{PolicyRef, PolicyService, TrainingBatch};
use oracle::{Evaluator, SearchBudget};
use self_play::{
    AbortReason, OpeningBook, Outcome, RolloutOptions, RolloutPersistance, RolloutPlayer,
    Trajectory,
};

use super::{
    build_batch, shape, CheckpointPersistance, IterationMetrics, IterationRecord,
    SelfLearnOptions,
};

/// The rollouts gathered for one iteration.
pub struct RoundResult {
    /// Finished rollouts ordered by rollout id; exactly `rollouts_per_iteration` of them.
    pub trajectories: Vec<Trajectory>,
    pub aborted: usize,
    /// Rollouts started, replacements included.
    pub issued: usize,
}

/// Drives the training loop: play a round of rollouts under the current policy, score and batch them, apply one
/// update, checkpoint, and continue from the policy the update returned.
pub struct SelfLearn<'a, S, E> {
    service: &'a S,
    evaluator: &'a E,
    options: &'a SelfLearnOptions,
    rollout_options: &'a RolloutOptions,
    budget: SearchBudget,
    opening_book: OpeningBook,
    base_policy: PolicyRef,
    checkpoints: CheckpointPersistance,
    rollouts: RolloutPersistance,
}

impl<'a, S, E> SelfLearn<'a, S, E>
where
    S: PolicyService,
    E: Evaluator,
{
    pub fn new(
        service: &'a S,
        evaluator: &'a E,
        options: &'a SelfLearnOptions,
        rollout_options: &'a RolloutOptions,
        budget: SearchBudget,
        opening_book: OpeningBook,
        base_model: String,
    ) -> Result<Self> {
        let checkpoints =
            CheckpointPersistance::new(options.checkpoint_dir(), options.run_name.clone())?;
        let rollouts = RolloutPersistance::new(options.rollout_dir(), options.run_name.clone())?;

        Ok(Self {
            service,
            evaluator,
            options,
            rollout_options,
            budget,
            opening_book,
            base_policy: PolicyRef::base(options.run_name.clone(), base_model),
            checkpoints,
            rollouts,
        })
    }

    /// Runs the remaining iterations, resuming after the latest checkpoint. Returns the record of the last
    /// completed iteration.
    pub async fn learn(&self) -> Result<Option<IterationRecord>> {
        let mut last = self.checkpoints.latest()?;
        let (start, mut policy) = match &last {
            Some(record) => {
                info!(
                    "Resuming {} after iteration {} with policy {}",
                    self.options.run_name, record.iteration, record.policy
                );
                (record.iteration + 1, record.policy.clone())
            }
            None => (1, self.base_policy.clone()),
        };

        if start > self.options.iterations {
            info!(
                "{} already completed {} iterations",
                self.options.run_name, self.options.iterations
            );
        }

        for iteration in start..=self.options.iterations {
            match self.run_iteration(iteration, &policy).await {
                Ok(record) => {
                    policy = record.policy.clone();
                    last = Some(record);
                }
                Err(err) => {
                    error!(
                        "Iteration {} failed: {:#}. Last completed iteration: {}",
                        iteration,
                        err,
                        last.as_ref().map_or(0, |r| r.iteration)
                    );
                    return Err(err);
                }
            }
        }

        Ok(last)
    }

    /// The iteration of the latest checkpoint, or 0 for a fresh run.
    pub fn last_completed_iteration(&self) -> Result<usize> {
        Ok(self.checkpoints.latest()?.map_or(0, |r| r.iteration))
    }

    pub async fn run_iteration(
        &self,
        iteration: usize,
        policy: &PolicyRef,
    ) -> Result<IterationRecord> {
        let started = Instant::now();
        info!("Iteration {} with policy {}", iteration, policy);

        let round = self.play_round(iteration, policy).await?;

        let reward_options = self.options.reward_options();
        let scored = round
            .trajectories
            .into_iter()
            .map(|t| shape(t, &reward_options))
            .collect::<Result<Vec<_>>>()?;

        let batch = build_batch(iteration, policy, &scored, &self.options.batch_options());
        if batch.is_empty() {
            bail!("Iteration {} produced no training examples", iteration);
        }

        if let Err(err) = self.rollouts.write(iteration, &scored) {
            warn!("Failed to archive rollouts of iteration {}: {:#}", iteration, err);
        }

        let updated = self
            .train(&batch)
            .await
            .with_context(|| format!("Training step of iteration {} failed", iteration))?;

        if updated.version() <= policy.version() {
            bail!(
                "Training returned policy {} which does not supersede {}",
                updated,
                policy
            );
        }

        let metrics = IterationMetrics::new(&scored, round.aborted, batch.len(), started.elapsed());
        let record = IterationRecord {
            iteration,
            policy: updated,
            metrics,
            timestamp: Utc::now(),
        };

        self.checkpoints.write(&record)?;

        info!(
            "Iteration {} complete, Policy: {}, {}",
            iteration, record.policy, record.metrics
        );

        Ok(record)
    }

    /// Plays rollouts under `policy` with at most `concurrency` in flight until `rollouts_per_iteration` have
    /// finished. Each aborted rollout is replaced by a new one; failing more than `max_replacement_rollouts`
    /// times fails the round, dropping whatever is still in flight.
    pub async fn play_round(&self, iteration: usize, policy: &PolicyRef) -> Result<RoundResult> {
        let player = RolloutPlayer::new(
            self.service,
            self.evaluator,
            self.rollout_options,
            self.budget.clone(),
        );
        let target = self.options.rollouts_per_iteration;
        let concurrency = self.options.concurrency;

        let mut in_flight = FuturesUnordered::new();
        let mut trajectories = Vec::with_capacity(target);
        let mut aborted = 0;
        let mut issued = 0;

        loop {
            while trajectories.len() + in_flight.len() < target && in_flight.len() < concurrency {
                in_flight.push(self.rollout(&player, iteration, issued, policy));
                issued += 1;
            }

            let Some(trajectory) = in_flight.next().await else {
                break;
            };

            if let Outcome::Aborted(reason) = &trajectory.outcome {
                aborted += 1;
                if aborted > self.options.max_replacement_rollouts {
                    return Err(anyhow!(
                        "Iteration {} aborted {} rollouts, more than the {} replacements allowed. Last: {}",
                        iteration,
                        aborted,
                        self.options.max_replacement_rollouts,
                        reason
                    ));
                }

                warn!(
                    "Replacing rollout {} of iteration {} ({} aborted so far)",
                    trajectory.rollout_id, iteration, aborted
                );
                continue;
            }

            trajectories.push(trajectory);
        }

        trajectories.sort_by_key(|t| t.rollout_id);

        Ok(RoundResult {
            trajectories,
            aborted,
            issued,
        })
    }

    async fn rollout(
        &self,
        player: &RolloutPlayer<'_, S, E>,
        iteration: usize,
        rollout_id: usize,
        policy: &PolicyRef,
    ) -> Trajectory {
        let stream = [iteration as u64, rollout_id as u64];
        let seed = derive_seed(self.options.seed, &stream);

        let mut rng = create_rng_from_seed(self.options.seed, &stream);
        match self.opening_book.choose(&mut rng) {
            Ok(opening) => player.play_rollout(rollout_id, policy, opening, seed).await,
            Err(err) => Trajectory {
                rollout_id,
                policy: policy.clone(),
                opening: Vec::new(),
                plies: Vec::new(),
                outcome: Outcome::Aborted(AbortReason::Setup(format!("{:#}", err))),
                degraded_evaluations: 0,
            },
        }
    }

    async fn train(&self, batch: &TrainingBatch) -> Result<PolicyRef> {
        let service = self.service;

        let updated = retry_with_backoff(
            &self.options.train_backoff(),
            "Training step",
            |_| true,
            move |_| async move { service.train(batch).await },
        )
        .await?;

        Ok(updated)
    }
}
