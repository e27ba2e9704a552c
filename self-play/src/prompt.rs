use std::fmt::Write;

use engine::{board_ascii, BoardState, InvalidMove};

/// Builds the text shown to the policy for one sampling attempt.
///
/// Completions rejected earlier on the same ply are listed so the policy can correct itself.
pub fn build_prompt(state: &BoardState, history_plies: usize, rejected: &[InvalidMove]) -> String {
    let mut prompt = String::new();
    let side = state.side_to_move();

    // Writing to a String cannot fail.
    let _ = writeln!(
        prompt,
        "You are playing chess as {}. Move {}.",
        side.name(),
        state.fullmove_number()
    );

    let recent = state.recent_moves(history_plies);
    if recent.is_empty() {
        prompt.push_str("Recent moves: none\n");
    } else {
        let _ = writeln!(prompt, "Recent moves: {}", recent.join(" "));
    }

    prompt.push_str("Board:\n");
    prompt.push_str(&board_ascii(state.position()));
    if !prompt.ends_with('\n') {
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "FEN: {}", state.fen());

    if !rejected.is_empty() {
        prompt.push_str("Rejected moves:\n");
        for invalid in rejected {
            let _ = writeln!(prompt, "- {:?} ({})", invalid.text.trim(), invalid.reason);
        }
    }

    prompt.push_str("Reply with one legal move in UCI notation, for example e2e4.\n");

    prompt
}
