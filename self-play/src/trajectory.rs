use std::fmt::{self, Display};

use engine::{InvalidMove, Side, Terminal, Termination};
use model::PolicyRef;
use oracle::Evaluation;
use serde::{Deserialize, Serialize};

/// What the codec made of a completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decoded {
    Legal { uci: String },
    Invalid(InvalidMove),
}

impl Decoded {
    pub fn is_legal(&self) -> bool {
        matches!(self, Decoded::Legal { .. })
    }
}

/// One sampling attempt at one decision point. Invalid attempts are recorded alongside the legal move
/// that eventually follows them, sharing its `ply`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlyRecord {
    /// Plies played in the rollout before this decision, excluding the opening.
    pub ply: usize,
    pub side: Side,
    pub fen_before: String,
    pub prompt: String,
    pub completion: String,
    pub decoded: Decoded,
    /// 1-based attempt number within the ply.
    pub attempt: usize,
    /// Evaluation of the position before the move, relative to `side`.
    pub eval_before: Evaluation,
    /// Evaluation of the position after the move, also relative to `side`. `None` when no move was applied.
    pub eval_after: Option<Evaluation>,
}

impl PlyRecord {
    pub fn is_legal(&self) -> bool {
        self.decoded.is_legal()
    }

    pub fn invalid(&self) -> Option<&InvalidMove> {
        match &self.decoded {
            Decoded::Invalid(invalid) => Some(invalid),
            Decoded::Legal { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    EngineUnavailable(String),
    PolicyUnavailable(String),
    /// The rollout could not be started, e.g. a corrupt opening line.
    Setup(String),
}

impl Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::EngineUnavailable(err) => write!(f, "engine unavailable: {}", err),
            AbortReason::PolicyUnavailable(err) => write!(f, "policy service unavailable: {}", err),
            AbortReason::Setup(err) => write!(f, "setup failed: {}", err),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Finished(Terminal),
    /// Infrastructure failure; never used for training.
    Aborted(AbortReason),
}

impl Outcome {
    pub fn terminal(&self) -> Option<&Terminal> {
        match self {
            Outcome::Finished(terminal) => Some(terminal),
            Outcome::Aborted(_) => None,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Outcome::Aborted(_))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Outcome::Finished(Terminal { winner: Some(Side::White), .. }) => "white_win",
            Outcome::Finished(Terminal { winner: Some(Side::Black), .. }) => "black_win",
            Outcome::Finished(_) => "draw",
            Outcome::Aborted(_) => "aborted",
        }
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Finished(terminal) => write!(f, "{} ({:?})", self.tag(), terminal.termination),
            Outcome::Aborted(reason) => write!(f, "aborted ({})", reason),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Trajectory {
    pub rollout_id: usize,
    pub policy: PolicyRef,
    pub opening: Vec<String>,
    pub plies: Vec<PlyRecord>,
    pub outcome: Outcome,
    pub degraded_evaluations: usize,
}

impl Trajectory {
    pub fn is_aborted(&self) -> bool {
        self.outcome.is_aborted()
    }

    pub fn moves_played(&self) -> usize {
        self.plies.iter().filter(|p| p.is_legal()).count()
    }

    pub fn invalid_attempts(&self) -> usize {
        self.plies.iter().filter(|p| !p.is_legal()).count()
    }

    pub fn is_forfeit(&self) -> bool {
        matches!(
            self.outcome.terminal(),
            Some(Terminal { termination: Termination::Forfeit, .. })
        )
    }
}
