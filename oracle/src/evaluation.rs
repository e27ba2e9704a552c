use engine::{BoardState, ChessEngine, GameEngine, Termination};
use serde::{Deserialize, Serialize};

use super::{EngineError, SearchBudget};

/// Every evaluation is clamped to +/- this many centipawns; forced mates saturate at the bound.
pub const EVALUATION_CEILING_CP: i32 = 2_000;

/// Raw score as reported by a UCI engine, relative to the side to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    /// Moves until mate; negative or zero when the side to move is being mated.
    Mate(i32),
}

/// A bounded evaluation from the perspective of the side to move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub centipawns: i32,
    /// Set when the engine could not produce a score in time and the value is a neutral placeholder.
    pub degraded: bool,
}

impl Evaluation {
    pub fn from_centipawns(centipawns: i32) -> Self {
        Self {
            centipawns: centipawns.clamp(-EVALUATION_CEILING_CP, EVALUATION_CEILING_CP),
            degraded: false,
        }
    }

    pub fn from_score(score: Score) -> Self {
        match score {
            Score::Centipawns(cp) => Self::from_centipawns(cp),
            Score::Mate(n) if n > 0 => Self::from_centipawns(EVALUATION_CEILING_CP),
            Score::Mate(_) => Self::from_centipawns(-EVALUATION_CEILING_CP),
        }
    }

    pub fn unknown() -> Self {
        Self {
            centipawns: 0,
            degraded: true,
        }
    }

    /// The same evaluation seen by the other side.
    pub fn flip(self) -> Self {
        Self {
            centipawns: -self.centipawns,
            degraded: self.degraded,
        }
    }

    pub fn pawns(&self) -> f32 {
        self.centipawns as f32 / 100.0
    }
}

/// Evaluations for game-over positions, which a UCI engine has no search for.
pub fn terminal_evaluation(state: &BoardState) -> Option<Evaluation> {
    let terminal = ChessEngine::new(usize::MAX).terminal_state(state)?;

    match terminal.termination {
        Termination::Checkmate => Some(Evaluation::from_centipawns(-EVALUATION_CEILING_CP)),
        _ => Some(Evaluation::from_centipawns(0)),
    }
}

#[allow(async_fn_in_trait)]
pub trait Evaluator {
    /// Evaluates `state` relative to its side to move. A search that exceeds `budget.timeout` yields
    /// [`Evaluation::unknown`]; an `Err` means the engine itself failed and the call may be retried.
    async fn evaluate(
        &self,
        state: &BoardState,
        budget: &SearchBudget,
    ) -> Result<Evaluation, EngineError>;
}
