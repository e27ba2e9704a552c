use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, MoveList, Position};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::White => 0,
            Side::Black => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid fen {0:?}")]
    InvalidFen(String),
    #[error("move {uci:?} at ply {ply} is not legal")]
    IllegalPrefixMove { ply: usize, uci: String },
    #[error("move {0} is not legal in this position")]
    IllegalMove(String),
}

/// A position plus the moves that led to it. Never mutated; playing a move yields a new state.
#[derive(Clone, Debug)]
pub struct BoardState {
    position: Chess,
    root_fen: Option<String>,
    moves: Vec<String>,
    start_ply: usize,
    repetition_keys: Vec<String>,
}

impl BoardState {
    pub fn initial() -> Self {
        Self::from_root(Chess::default(), None)
    }

    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let position: Chess = fen
            .parse::<Fen>()
            .map_err(|_| BoardError::InvalidFen(fen.to_owned()))?
            .into_position(CastlingMode::Standard)
            .map_err(|_| BoardError::InvalidFen(fen.to_owned()))?;

        Ok(Self::from_root(position, Some(fen.trim().to_owned())))
    }

    /// Replays a prefix of UCI moves from the initial position. The prefix does not count towards the
    /// plies of the rollout that starts from the returned state.
    pub fn from_uci_moves<S: AsRef<str>>(moves: &[S]) -> Result<Self, BoardError> {
        Self::initial().with_prefix(moves)
    }

    pub fn with_prefix<S: AsRef<str>>(self, moves: &[S]) -> Result<Self, BoardError> {
        let mut state = self;

        for (ply, uci) in moves.iter().enumerate() {
            let uci = uci.as_ref();
            let mv = uci
                .parse::<UciMove>()
                .ok()
                .and_then(|m| m.to_move(&state.position).ok())
                .ok_or_else(|| BoardError::IllegalPrefixMove {
                    ply,
                    uci: uci.to_owned(),
                })?;

            state = state.play(&mv)?;
        }

        state.start_ply = state.moves.len();

        Ok(state)
    }

    fn from_root(position: Chess, root_fen: Option<String>) -> Self {
        let key = repetition_key(&position);

        Self {
            position,
            root_fen,
            moves: Vec::new(),
            start_ply: 0,
            repetition_keys: vec![key],
        }
    }

    /// Returns the state after `mv`, leaving `self` untouched. Illegal moves are rejected.
    pub fn play(&self, mv: &Move) -> Result<Self, BoardError> {
        if !self.position.is_legal(mv) {
            return Err(BoardError::IllegalMove(
                mv.to_uci(CastlingMode::Standard).to_string(),
            ));
        }

        let mut position = self.position.clone();
        position.play_unchecked(mv);

        let mut moves = self.moves.clone();
        moves.push(mv.to_uci(CastlingMode::Standard).to_string());

        let mut repetition_keys = self.repetition_keys.clone();
        repetition_keys.push(repetition_key(&position));

        Ok(Self {
            position,
            root_fen: self.root_fen.clone(),
            moves,
            start_ply: self.start_ply,
            repetition_keys,
        })
    }

    pub fn position(&self) -> &Chess {
        &self.position
    }

    pub fn side_to_move(&self) -> Side {
        self.position.turn().into()
    }

    pub fn fullmove_number(&self) -> u32 {
        self.position.fullmoves().get()
    }

    pub fn halfmove_clock(&self) -> u32 {
        self.position.halfmoves()
    }

    pub fn legal_moves(&self) -> MoveList {
        self.position.legal_moves()
    }

    pub fn is_legal(&self, mv: &Move) -> bool {
        self.position.is_legal(mv)
    }

    /// Every move played from the root, including any opening prefix.
    pub fn moves(&self) -> &[String] {
        &self.moves
    }

    pub fn prefix_moves(&self) -> &[String] {
        &self.moves[..self.start_ply]
    }

    pub fn recent_moves(&self, count: usize) -> &[String] {
        let start = self.moves.len().saturating_sub(count);
        &self.moves[start..]
    }

    /// Plies played since the rollout started, excluding the opening prefix.
    pub fn rollout_plies(&self) -> usize {
        self.moves.len() - self.start_ply
    }

    pub fn repetition_count(&self) -> usize {
        match self.repetition_keys.last() {
            Some(current) => self.repetition_keys.iter().filter(|k| *k == current).count(),
            None => 0,
        }
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// The UCI `position` command that reproduces this state in an external engine.
    pub fn uci_position_command(&self) -> String {
        let mut cmd = match &self.root_fen {
            Some(fen) => format!("position fen {}", fen),
            None => "position startpos".to_string(),
        };

        if !self.moves.is_empty() {
            cmd.push_str(" moves ");
            cmd.push_str(&self.moves.join(" "));
        }

        cmd
    }
}

// Piece placement, side to move, castling rights and en passant square; the move counters are ignored.
fn repetition_key(position: &Chess) -> String {
    Fen::from_position(position.clone(), EnPassantMode::Legal)
        .to_string()
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}
