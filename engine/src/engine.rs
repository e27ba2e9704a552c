use serde::{Deserialize, Serialize};
use shakmaty::{Move, Position};

use super::game_state::{BoardError, BoardState, Side};

pub trait GameEngine {
    type Action;
    type State;
    type Terminal;

    fn take_action(
        &self,
        game_state: &Self::State,
        action: &Self::Action,
    ) -> Result<Self::State, BoardError>;
    fn player_to_move(&self, game_state: &Self::State) -> Side;
    fn terminal_state(&self, game_state: &Self::State) -> Option<Self::Terminal>;
}

pub trait Value {
    fn get_value_for_player(&self, player: Side) -> f32;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
    MoveCap,
    /// The side to move exhausted its attempts to produce a legal move.
    Forfeit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Terminal {
    pub winner: Option<Side>,
    pub termination: Termination,
}

impl Terminal {
    pub fn decisive(winner: Side, termination: Termination) -> Self {
        Self {
            winner: Some(winner),
            termination,
        }
    }

    pub fn draw(termination: Termination) -> Self {
        Self {
            winner: None,
            termination,
        }
    }

    pub fn is_draw(&self) -> bool {
        self.winner.is_none()
    }
}

impl Value for Terminal {
    fn get_value_for_player(&self, player: Side) -> f32 {
        match self.winner {
            Some(winner) if winner == player => 1.0,
            Some(_) => -1.0,
            None => 0.0,
        }
    }
}

/// Chess rules over [`BoardState`] with a cap on the number of plies a rollout may play.
#[derive(Clone, Debug)]
pub struct ChessEngine {
    max_plies: usize,
}

impl ChessEngine {
    pub fn new(max_plies: usize) -> Self {
        Self { max_plies }
    }
}

impl GameEngine for ChessEngine {
    type Action = Move;
    type State = BoardState;
    type Terminal = Terminal;

    fn take_action(&self, game_state: &BoardState, action: &Move) -> Result<BoardState, BoardError> {
        game_state.play(action)
    }

    fn player_to_move(&self, game_state: &BoardState) -> Side {
        game_state.side_to_move()
    }

    fn terminal_state(&self, game_state: &BoardState) -> Option<Terminal> {
        let position = game_state.position();

        if position.is_checkmate() {
            return Some(Terminal::decisive(
                game_state.side_to_move().opposite(),
                Termination::Checkmate,
            ));
        }

        if position.is_stalemate() {
            return Some(Terminal::draw(Termination::Stalemate));
        }

        if position.is_insufficient_material() {
            return Some(Terminal::draw(Termination::InsufficientMaterial));
        }

        if game_state.halfmove_clock() >= 100 {
            return Some(Terminal::draw(Termination::FiftyMoveRule));
        }

        if game_state.repetition_count() >= 3 {
            return Some(Terminal::draw(Termination::ThreefoldRepetition));
        }

        if game_state.rollout_plies() >= self.max_plies {
            return Some(Terminal::draw(Termination::MoveCap));
        }

        None
    }
}
