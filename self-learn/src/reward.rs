use anyhow::{anyhow, Result};
use engine::{Side, Terminal, Value};
use model::PolicyRef;
use oracle::Evaluation;
use self_play::{PlyRecord, Trajectory};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug)]
pub struct RewardOptions {
    pub discount: f32,
    pub shaping_weight: f32,
    /// Bound on the magnitude of a single shaping term. Kept below the terminal reward of 1.
    pub shaping_clip: f32,
    pub invalid_move_penalty: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoredPly {
    pub record: PlyRecord,
    pub shaping: f32,
    pub terminal_reward: f32,
    /// Discounted reward-to-go for the side that made this decision.
    pub return_value: f32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoredTrajectory {
    pub rollout_id: usize,
    pub policy: PolicyRef,
    pub opening: Vec<String>,
    pub terminal: Terminal,
    pub plies: Vec<ScoredPly>,
    pub degraded_evaluations: usize,
}

impl ScoredTrajectory {
    pub fn invalid_attempts(&self) -> usize {
        self.plies.iter().filter(|p| !p.record.is_legal()).count()
    }
}

/// Evaluation delta of a move from the mover's point of view, weighted per pawn and clipped. Degraded
/// evaluations carry no information, so a move scored against one is unshaped.
pub fn shaping_term(before: Evaluation, after: Evaluation, options: &RewardOptions) -> f32 {
    if before.degraded || after.degraded {
        return 0.0;
    }

    let delta = after.pawns() - before.pawns();
    (options.shaping_weight * delta).clamp(-options.shaping_clip, options.shaping_clip)
}

/// Assigns exactly one return to every ply of a finished trajectory.
///
/// Legal moves earn their shaping term, and each side's last legal move also earns the terminal reward. Returns
/// are discounted back through the moves of the same side. Invalid attempts are fixed at the penalty and do not
/// take part in the backward pass.
pub fn shape(trajectory: Trajectory, options: &RewardOptions) -> Result<ScoredTrajectory> {
    let terminal = *trajectory.outcome.terminal().ok_or_else(|| {
        anyhow!(
            "Rollout {} was aborted and cannot be scored",
            trajectory.rollout_id
        )
    })?;

    let last_legal = [Side::White, Side::Black].map(|side| {
        trajectory
            .plies
            .iter()
            .rposition(|p| p.side == side && p.is_legal())
    });

    let mut plies = trajectory
        .plies
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let shaping = match (record.is_legal(), record.eval_after) {
                (true, Some(after)) => shaping_term(record.eval_before, after, options),
                _ => 0.0,
            };

            let terminal_reward = if last_legal[record.side.index()] == Some(i) {
                terminal.get_value_for_player(record.side)
            } else {
                0.0
            };

            ScoredPly {
                record,
                shaping,
                terminal_reward,
                return_value: 0.0,
            }
        })
        .collect::<Vec<_>>();

    let mut next_return = [0.0f32; 2];
    for ply in plies.iter_mut().rev() {
        if ply.record.is_legal() {
            let side = ply.record.side.index();
            let ret = ply.shaping + ply.terminal_reward + options.discount * next_return[side];
            next_return[side] = ret;
            ply.return_value = ret;
        } else {
            ply.return_value = options.invalid_move_penalty;
        }
    }

    Ok(ScoredTrajectory {
        rollout_id: trajectory.rollout_id,
        policy: trajectory.policy,
        opening: trajectory.opening,
        terminal,
        plies,
        degraded_evaluations: trajectory.degraded_evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use engine::{InvalidMove, InvalidReason, Termination};
    use self_play::{AbortReason, Decoded, Outcome};

    fn options() -> RewardOptions {
        RewardOptions {
            discount: 0.9,
            shaping_weight: 0.01,
            shaping_clip: 0.5,
            invalid_move_penalty: -1.0,
        }
    }

    fn record(ply: usize, side: Side, uci: Option<&str>, before: i32, after: i32) -> PlyRecord {
        let decoded = match uci {
            Some(uci) => Decoded::Legal {
                uci: uci.to_string(),
            },
            None => Decoded::Invalid(InvalidMove {
                reason: InvalidReason::Unparseable,
                text: "e9e1".to_string(),
            }),
        };

        PlyRecord {
            ply,
            side,
            fen_before: String::new(),
            prompt: String::new(),
            completion: uci.unwrap_or("e9e1").to_string(),
            eval_after: decoded.is_legal().then(|| Evaluation::from_centipawns(after)),
            decoded,
            attempt: 1,
            eval_before: Evaluation::from_centipawns(before),
        }
    }

    fn trajectory(plies: Vec<PlyRecord>, outcome: Outcome) -> Trajectory {
        Trajectory {
            rollout_id: 0,
            policy: PolicyRef::base("run".to_string(), "base".to_string()),
            opening: Vec::new(),
            plies,
            outcome,
            degraded_evaluations: 0,
        }
    }

    #[test]
    fn test_shaping_is_proportional_to_the_delta() {
        let before = Evaluation::from_centipawns(50);
        let after = Evaluation::from_centipawns(120);

        let term = shaping_term(before, after, &options());

        assert!(term > 0.0);
        assert_approx_eq!(term, 0.01 * 0.7);

        let doubled = RewardOptions {
            shaping_weight: 0.02,
            ..options()
        };
        assert_approx_eq!(shaping_term(before, after, &doubled), 2.0 * term);
    }

    #[test]
    fn test_shaping_is_clipped_and_ignores_degraded_evaluations() {
        let options = RewardOptions {
            shaping_weight: 0.05,
            ..options()
        };

        assert_approx_eq!(
            shaping_term(Evaluation::from_centipawns(-2_000), Evaluation::from_centipawns(2_000), &options),
            options.shaping_clip
        );
        assert_approx_eq!(
            shaping_term(Evaluation::from_centipawns(2_000), Evaluation::from_centipawns(-2_000), &options),
            -options.shaping_clip
        );
        assert_approx_eq!(
            shaping_term(Evaluation::from_centipawns(50), Evaluation::from_centipawns(120), &options),
            0.05 * 0.7
        );
        assert_eq!(
            shaping_term(Evaluation::unknown(), Evaluation::from_centipawns(300), &options),
            0.0
        );
    }

    #[test]
    fn test_shaping_does_not_depend_on_the_outcome() {
        let plies = || vec![record(0, Side::White, Some("e2e4"), 50, 120), record(1, Side::Black, Some("e7e5"), -120, -120)];

        let won = shape(trajectory(plies(), Outcome::Finished(Terminal::decisive(Side::White, Termination::Checkmate))), &options()).unwrap();
        let drawn = shape(trajectory(plies(), Outcome::Finished(Terminal::draw(Termination::MoveCap))), &options()).unwrap();

        assert_approx_eq!(won.plies[0].shaping, drawn.plies[0].shaping);
        assert_approx_eq!(won.plies[0].shaping, 0.007);
    }

    #[test]
    fn test_terminal_sign_matches_outcome() {
        let plies = || {
            vec![
                record(0, Side::White, Some("f2f3"), 0, -40),
                record(1, Side::Black, Some("e7e5"), 40, 60),
                record(2, Side::White, Some("g2g4"), -60, -2_000),
                record(3, Side::Black, Some("d8h4"), 2_000, 2_000),
            ]
        };

        let mate = shape(trajectory(plies(), Outcome::Finished(Terminal::decisive(Side::Black, Termination::Checkmate))), &options()).unwrap();
        assert!(mate.plies[3].return_value > 0.0);
        assert!(mate.plies[2].return_value < 0.0);
        assert_approx_eq!(mate.plies[3].terminal_reward, 1.0);
        assert_approx_eq!(mate.plies[2].terminal_reward, -1.0);
        assert_eq!(mate.plies[0].terminal_reward, 0.0);

        let draw = shape(trajectory(plies(), Outcome::Finished(Terminal::draw(Termination::Stalemate))), &options()).unwrap();
        assert!(draw.plies.iter().all(|p| p.terminal_reward == 0.0));
        assert!(draw.plies[3].return_value.abs() < 0.01);
    }

    #[test]
    fn test_returns_are_discounted_per_side() {
        let plies = vec![
            record(0, Side::White, Some("e2e4"), 0, 0),
            record(1, Side::Black, Some("e7e5"), 0, 0),
            record(2, Side::White, Some("d1h5"), 0, 0),
        ];

        let scored = shape(trajectory(plies, Outcome::Finished(Terminal::decisive(Side::White, Termination::Checkmate))), &options()).unwrap();

        assert_approx_eq!(scored.plies[2].return_value, 1.0);
        assert_approx_eq!(scored.plies[0].return_value, 0.9);
        assert_approx_eq!(scored.plies[1].return_value, -1.0);
    }

    #[test]
    fn test_every_ply_is_scored_once_and_invalid_plies_are_penalized() {
        let plies = vec![
            record(0, Side::White, None, 0, 0),
            record(0, Side::White, Some("e2e4"), 0, 0),
            record(1, Side::Black, None, 0, 0),
            record(1, Side::Black, None, 0, 0),
        ];

        let scored = shape(trajectory(plies, Outcome::Finished(Terminal::decisive(Side::White, Termination::Forfeit))), &options()).unwrap();

        assert_eq!(scored.plies.len(), 4);
        assert_approx_eq!(scored.plies[0].return_value, -1.0);
        assert_approx_eq!(scored.plies[1].return_value, 1.0);
        assert_approx_eq!(scored.plies[2].return_value, -1.0);
        assert_approx_eq!(scored.plies[3].return_value, -1.0);
        assert_eq!(scored.invalid_attempts(), 3);
    }

    #[test]
    fn test_aborted_rollouts_are_not_scored() {
        let aborted = trajectory(Vec::new(), Outcome::Aborted(AbortReason::EngineUnavailable("gone".to_string())));

        assert!(shape(aborted, &options()).is_err());
    }
}
