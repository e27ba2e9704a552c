use shakmaty::{Chess, File, Position, Rank, Square};

/// Eight ranks, rank 8 first, pieces as FEN letters and `.` for empty squares.
pub fn board_ascii(position: &Chess) -> String {
    let board = position.board();

    (0..8u32)
        .rev()
        .map(|rank| {
            (0..8u32)
                .map(|file| {
                    let square = Square::from_coords(File::new(file), Rank::new(rank));
                    board.piece_at(square).map_or('.', |p| p.char())
                })
                .map(String::from)
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
