use super::board::BoardState;
use super::movegen::{generate, legal_moves};
use super::moves::MoveList;

/// Counts leaf nodes of the legal move tree. Only the structural phase
/// of the apply runs here; hashes are irrelevant for counting.
pub fn perft(board: &BoardState, depth: u32) -> u64 {
    if depth == 0 {
        return 1;
    }

    let mut pseudo = MoveList::new();
    generate(board, &mut pseudo, false);

    let mut nodes = 0;

    for mv in pseudo {
        let mut child = board.clone();

        if child.partial_apply_move(mv) {
            nodes += if depth == 1 { 1 } else { perft(&child, depth - 1) };
        }
    }

    nodes
}

/// Per-root-move breakdown, for hunting generator discrepancies.
pub fn perft_split(board: &BoardState, depth: u32) -> u64 {
    let mut total = 0;

    for mv in legal_moves(board) {
        let mut child = board.clone();
        child.partial_apply_move(mv);

        let nodes = if depth <= 1 { 1 } else { perft(&child, depth - 1) };
        total += nodes;
        println!("{mv}: {nodes}");
    }

    println!("\n{total}");
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::util::{FEN_KIWIPETE, FEN_POS_3, FEN_POS_4, FEN_POS_5, FEN_START};

    #[test]
    fn test_perft_start() {
        let board = BoardState::try_from(FEN_START).unwrap();

        assert_eq!(perft(&board, 1), 20);
        assert_eq!(perft(&board, 2), 400);
        assert_eq!(perft(&board, 3), 8902);
        assert_eq!(perft(&board, 4), 197_281);
    }

    #[test]
    fn test_perft_kiwipete() {
        let board = BoardState::try_from(FEN_KIWIPETE).unwrap();

        assert_eq!(perft(&board, 1), 48);
        assert_eq!(perft(&board, 2), 2039);
        assert_eq!(perft(&board, 3), 97_862);
    }

    #[test]
    fn test_perft_endgame() {
        let board = BoardState::try_from(FEN_POS_3).unwrap();

        assert_eq!(perft(&board, 1), 14);
        assert_eq!(perft(&board, 2), 191);
        assert_eq!(perft(&board, 3), 2812);
        assert_eq!(perft(&board, 4), 43_238);
    }

    #[test]
    fn test_perft_promotion_heavy() {
        let board = BoardState::try_from(FEN_POS_4).unwrap();

        assert_eq!(perft(&board, 1), 6);
        assert_eq!(perft(&board, 2), 264);
        assert_eq!(perft(&board, 3), 9467);
    }

    #[test]
    fn test_perft_castling_rich() {
        let board = BoardState::try_from(FEN_POS_5).unwrap();

        assert_eq!(perft(&board, 1), 44);
        assert_eq!(perft(&board, 2), 1486);
        assert_eq!(perft(&board, 3), 62_379);
    }
}
