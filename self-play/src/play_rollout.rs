use common::{derive_seed, retry_with_backoff};
use engine::{
    decode_move, encode_move, BoardState, ChessEngine, GameEngine, InvalidMove, InvalidReason,
    Terminal, Termination,
};
use log::{debug, warn};
use model::{PolicyRef, PolicyService, SampleRequest, ServiceError};
use oracle::{EngineError, Evaluation, Evaluator, SearchBudget};

use super::{build_prompt, AbortReason, Decoded, Outcome, PlyRecord, RolloutOptions, Trajectory};

/// Plays rollouts against a policy service, scoring every position with an evaluator.
///
/// A player holds no per-game state, so any number of rollouts may be driven through one instance
/// concurrently.
pub struct RolloutPlayer<'a, S, E> {
    service: &'a S,
    evaluator: &'a E,
    options: &'a RolloutOptions,
    budget: SearchBudget,
    engine: ChessEngine,
}

impl<'a, S, E> RolloutPlayer<'a, S, E>
where
    S: PolicyService,
    E: Evaluator,
{
    pub fn new(
        service: &'a S,
        evaluator: &'a E,
        options: &'a RolloutOptions,
        budget: SearchBudget,
    ) -> Self {
        Self {
            service,
            evaluator,
            options,
            budget,
            engine: ChessEngine::new(options.max_plies),
        }
    }

    /// Plays one game from `opening` to a terminal state. Infrastructure failures that outlast their retries
    /// end the game as [`Outcome::Aborted`]; everything else, including a forfeit, is a finished game.
    pub async fn play_rollout(
        &self,
        rollout_id: usize,
        policy: &PolicyRef,
        opening: BoardState,
        seed: u64,
    ) -> Trajectory {
        let mut plies = Vec::new();
        let mut degraded_evaluations = 0;
        let opening_moves = opening.prefix_moves().to_vec();

        let outcome = match self
            .play_to_end(policy, opening, seed, &mut plies, &mut degraded_evaluations)
            .await
        {
            Ok(terminal) => Outcome::Finished(terminal),
            Err(reason) => {
                warn!(
                    "Rollout {} aborted after {} records: {}",
                    rollout_id,
                    plies.len(),
                    reason
                );
                Outcome::Aborted(reason)
            }
        };

        let trajectory = Trajectory {
            rollout_id,
            policy: policy.clone(),
            opening: opening_moves,
            plies,
            outcome,
            degraded_evaluations,
        };

        debug!(
            "Rollout {}: {}, moves: {}, invalid attempts: {}, degraded evaluations: {}",
            rollout_id,
            trajectory.outcome,
            trajectory.moves_played(),
            trajectory.invalid_attempts(),
            trajectory.degraded_evaluations
        );

        trajectory
    }

    async fn play_to_end(
        &self,
        policy: &PolicyRef,
        opening: BoardState,
        seed: u64,
        plies: &mut Vec<PlyRecord>,
        degraded: &mut usize,
    ) -> Result<Terminal, AbortReason> {
        let mut state = opening;
        let mut evaluation = self.evaluate(&state, degraded).await?;

        loop {
            if let Some(terminal) = self.engine.terminal_state(&state) {
                return Ok(terminal);
            }

            match self
                .play_ply(policy, &state, evaluation, seed, plies, degraded)
                .await?
            {
                Some((next, next_evaluation)) => {
                    state = next;
                    evaluation = next_evaluation;
                }
                None => {
                    return Ok(Terminal::decisive(
                        self.engine.player_to_move(&state).opposite(),
                        Termination::Forfeit,
                    ))
                }
            }
        }
    }

    /// Samples until the policy produces a legal move or runs out of attempts. Returns the next state and its
    /// evaluation, or `None` when the side to move forfeits.
    async fn play_ply(
        &self,
        policy: &PolicyRef,
        state: &BoardState,
        eval_before: Evaluation,
        seed: u64,
        plies: &mut Vec<PlyRecord>,
        degraded: &mut usize,
    ) -> Result<Option<(BoardState, Evaluation)>, AbortReason> {
        let side = self.engine.player_to_move(state);
        let ply = state.rollout_plies();
        let fen_before = state.fen();
        let mut rejected: Vec<InvalidMove> = Vec::new();

        for attempt in 1..=self.options.invalid_move_retries + 1 {
            let request = SampleRequest {
                prompt: build_prompt(state, self.options.history_plies, &rejected),
                max_tokens: self.options.max_tokens,
                temperature: self.options.temperature,
                seed: derive_seed(seed, &[ply as u64, attempt as u64]),
            };

            let completion = self.sample(policy, &request).await?;

            let decoded = decode_move(&completion, state).and_then(|mv| {
                self.engine
                    .take_action(state, &mv)
                    .map(|next| (mv, next))
                    .map_err(|_| InvalidMove {
                        reason: InvalidReason::IllegalForPosition,
                        text: completion.clone(),
                    })
            });

            match decoded {
                Ok((mv, next)) => {
                    let next_evaluation = self.evaluate(&next, degraded).await?;

                    plies.push(PlyRecord {
                        ply,
                        side,
                        fen_before: fen_before.clone(),
                        prompt: request.prompt,
                        completion,
                        decoded: Decoded::Legal {
                            uci: encode_move(&mv),
                        },
                        attempt,
                        eval_before,
                        eval_after: Some(next_evaluation.flip()),
                    });

                    return Ok(Some((next, next_evaluation)));
                }
                Err(invalid) => {
                    debug!(
                        "Ply {} attempt {} by {}: {}",
                        ply,
                        attempt,
                        side.name(),
                        invalid
                    );

                    plies.push(PlyRecord {
                        ply,
                        side,
                        fen_before: fen_before.clone(),
                        prompt: request.prompt,
                        completion,
                        decoded: Decoded::Invalid(invalid.clone()),
                        attempt,
                        eval_before,
                        eval_after: None,
                    });

                    rejected.push(invalid);
                }
            }
        }

        Ok(None)
    }

    async fn sample(
        &self,
        policy: &PolicyRef,
        request: &SampleRequest,
    ) -> Result<String, AbortReason> {
        let service = self.service;
        let timeout = self.options.sample_timeout();

        retry_with_backoff(
            &self.options.sample_backoff(),
            "Policy sample",
            ServiceError::is_retryable,
            move |_| async move {
                match tokio::time::timeout(timeout, service.sample(policy, request)).await {
                    Ok(res) => res,
                    Err(_) => Err(ServiceError::Timeout),
                }
            },
        )
        .await
        .map_err(|err| AbortReason::PolicyUnavailable(err.to_string()))
    }

    async fn evaluate(
        &self,
        state: &BoardState,
        degraded: &mut usize,
    ) -> Result<Evaluation, AbortReason> {
        let evaluator = self.evaluator;
        let budget = &self.budget;

        let evaluation = retry_with_backoff(
            &self.options.engine_backoff(),
            "Engine evaluation",
            EngineError::is_retryable,
            move |_| async move { evaluator.evaluate(state, budget).await },
        )
        .await
        .map_err(|err| AbortReason::EngineUnavailable(err.to_string()))?;

        if evaluation.degraded {
            *degraded += 1;
        }

        Ok(evaluation)
    }
}
