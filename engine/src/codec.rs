use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::san::{San, SanError};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Move};
use thiserror::Error;

use super::game_state::BoardState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    /// Nothing but whitespace was produced.
    Empty,
    Unparseable,
    Ambiguous,
    IllegalForPosition,
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            InvalidReason::Empty => "empty",
            InvalidReason::Unparseable => "unparseable",
            InvalidReason::Ambiguous => "ambiguous",
            InvalidReason::IllegalForPosition => "illegal",
        };

        f.write_str(reason)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{reason} move {text:?}")]
pub struct InvalidMove {
    pub reason: InvalidReason,
    pub text: String,
}

impl InvalidMove {
    fn new(reason: InvalidReason, text: &str) -> Self {
        Self {
            reason,
            text: text.to_owned(),
        }
    }
}

/// Canonical UCI text for a move. Castling is written king-to-destination (`e1g1`).
pub fn encode_move(mv: &Move) -> String {
    mv.to_uci(CastlingMode::Standard).to_string()
}

/// Decodes the first move-like token of a policy completion. Accepts UCI (any case) or SAN, with
/// leading move numbers, `Move:` style labels and trailing annotations ignored.
pub fn decode_move(text: &str, state: &BoardState) -> Result<Move, InvalidMove> {
    if text.trim().is_empty() {
        return Err(InvalidMove::new(InvalidReason::Empty, text));
    }

    let token = move_token(text).ok_or_else(|| InvalidMove::new(InvalidReason::Unparseable, text))?;

    if let Some(uci) = parse_uci(token) {
        return uci
            .to_move(state.position())
            .map_err(|_| InvalidMove::new(InvalidReason::IllegalForPosition, token));
    }

    match San::from_ascii(token.as_bytes()) {
        Ok(san) => san.to_move(state.position()).map_err(|err| match err {
            SanError::AmbiguousSan => InvalidMove::new(InvalidReason::Ambiguous, token),
            SanError::IllegalSan => InvalidMove::new(InvalidReason::IllegalForPosition, token),
        }),
        Err(_) => Err(InvalidMove::new(InvalidReason::Unparseable, token)),
    }
}

fn move_token(text: &str) -> Option<&str> {
    text.split_whitespace()
        .filter(|t| !t.ends_with(':'))
        .map(|t| {
            t.trim_matches(|c: char| {
                matches!(
                    c,
                    '.' | ',' | ';' | '!' | '?' | '"' | '\'' | '`' | '(' | ')' | '[' | ']' | '*' | '+' | '#'
                )
            })
        })
        .find(|t| !t.is_empty() && (*t == "0000" || !t.chars().all(|c| c.is_ascii_digit())))
}

fn parse_uci(token: &str) -> Option<UciMove> {
    let bytes = token.as_bytes();
    let looks_like_square = bytes.len() >= 2
        && matches!(bytes[0].to_ascii_lowercase(), b'a'..=b'h')
        && bytes[1].is_ascii_digit();

    if !(4..=5).contains(&bytes.len()) || !(looks_like_square || token == "0000") {
        return None;
    }

    UciMove::from_ascii(token.to_ascii_lowercase().as_bytes()).ok()
}
