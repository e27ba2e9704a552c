use std::fmt::{self, Display};
use std::time::Duration;

use engine::{Side, Termination};
use serde::{Deserialize, Serialize};

use super::ScoredTrajectory;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationMetrics {
    pub rollouts: usize,
    pub white_win_rate: f32,
    pub black_win_rate: f32,
    pub draw_rate: f32,
    pub mean_return: f32,
    /// Share of sampling attempts that did not decode to a legal move.
    pub invalid_move_rate: f32,
    pub forfeits: usize,
    pub aborted: usize,
    pub examples: usize,
    pub degraded_evaluations: usize,
    pub elapsed_secs: f32,
}

impl IterationMetrics {
    pub fn new(
        trajectories: &[ScoredTrajectory],
        aborted: usize,
        examples: usize,
        elapsed: Duration,
    ) -> Self {
        let rollouts = trajectories.len();
        let rate = |count: usize| {
            if rollouts == 0 {
                0.0
            } else {
                count as f32 / rollouts as f32
            }
        };
        let wins = |side: Side| {
            trajectories
                .iter()
                .filter(|t| t.terminal.winner == Some(side))
                .count()
        };

        let attempts = trajectories.iter().map(|t| t.plies.len()).sum::<usize>();
        let invalid = trajectories.iter().map(|t| t.invalid_attempts()).sum::<usize>();
        let total_return = trajectories
            .iter()
            .flat_map(|t| t.plies.iter())
            .map(|p| p.return_value)
            .sum::<f32>();

        Self {
            rollouts,
            white_win_rate: rate(wins(Side::White)),
            black_win_rate: rate(wins(Side::Black)),
            draw_rate: rate(trajectories.iter().filter(|t| t.terminal.is_draw()).count()),
            mean_return: if attempts == 0 {
                0.0
            } else {
                total_return / attempts as f32
            },
            invalid_move_rate: if attempts == 0 {
                0.0
            } else {
                invalid as f32 / attempts as f32
            },
            forfeits: trajectories
                .iter()
                .filter(|t| t.terminal.termination == Termination::Forfeit)
                .count(),
            aborted,
            examples,
            degraded_evaluations: trajectories.iter().map(|t| t.degraded_evaluations).sum(),
            elapsed_secs: elapsed.as_secs_f32(),
        }
    }
}

impl Display for IterationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "W/D/B: {:.2}/{:.2}/{:.2}, Mean Return: {:.3}, Invalid Rate: {:.3}, Forfeits: {}, Aborted: {}, Examples: {}, Degraded: {}, Time: {:.1}s",
            self.white_win_rate,
            self.draw_rate,
            self.black_win_rate,
            self.mean_return,
            self.invalid_move_rate,
            self.forfeits,
            self.aborted,
            self.examples,
            self.degraded_evaluations,
            self.elapsed_secs
        )
    }
}
