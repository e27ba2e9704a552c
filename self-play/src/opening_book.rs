use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use engine::BoardState;
use log::{info, warn};
use rand::seq::SliceRandom;
use rand::Rng;

/// Lines of space separated UCI moves that seed rollouts with varied openings.
#[derive(Clone, Debug, Default)]
pub struct OpeningBook {
    lines: Vec<Vec<String>>,
}

impl OpeningBook {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read opening book {:?}", path))?;

        let book = Self::from_lines(contents.lines());
        info!("Loaded {} opening lines from {:?}", book.len(), path);

        Ok(book)
    }

    /// Blank lines and `#` comments are skipped. Lines that do not replay from the initial position are dropped.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut book = Vec::new();

        for (number, line) in lines.into_iter().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let moves = line.split_whitespace().map(str::to_owned).collect::<Vec<_>>();
            match BoardState::from_uci_moves(&moves) {
                Ok(_) => book.push(moves),
                Err(err) => warn!("Skipping opening line {}: {}", number + 1, err),
            }
        }

        Self { lines: book }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The starting position for a rollout. An empty book always yields the initial position.
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Result<BoardState> {
        match self.lines.choose(rng) {
            Some(line) => BoardState::from_uci_moves(line).context("Opening line no longer replays"),
            None => Ok(BoardState::initial()),
        }
    }
}
