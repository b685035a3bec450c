use super::board::BoardState;
use super::movegen::legal_moves;
use super::moves::{Move, MoveList};
use super::types::Color;
use super::util::FEN_START;
use crate::Align64;
use crate::nn::evaluator::NnueEvaluator;
use delegate::delegate;

/// Hard bound on recorded positions; a game that somehow outlives it has
/// its further moves refused rather than silently wrapped.
pub const MAX_GAME_PLIES: usize = 800;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[rustfmt::skip]
pub enum Outcome {
    Draw = 0, BlackWins = 1, WhiteWins = 2
}

/// A playable game: the board plus its evaluator, the applied-move
/// history, the current legal moves, and a ring of position hashes
/// indexed by turn count for repetition detection.
#[derive(Clone)]
pub struct GameState {
    board: BoardState,
    nnue: NnueEvaluator,
    history: Vec<Move>,
    legal_moves: MoveList,
    hash_ring: Box<Align64<[u64; MAX_GAME_PLIES]>>,
    first_turn: u16,
}

impl TryFrom<&str> for GameState {
    type Error = String;

    fn try_from(fen: &str) -> Result<Self, Self::Error> {
        let board = BoardState::try_from(fen)?;
        let nnue = NnueEvaluator::from(&board);
        let legal = legal_moves(&board);

        let mut game = GameState {
            first_turn: board.turn_count(),
            board,
            nnue,
            history: Vec::with_capacity(MAX_GAME_PLIES),
            legal_moves: legal,
            hash_ring: Box::new(Align64([0; MAX_GAME_PLIES])),
        };

        if (game.board.turn_count() as usize) < MAX_GAME_PLIES {
            game.hash_ring.0[game.board.turn_count() as usize] = game.board.hash();
        }

        Ok(game)
    }
}

impl Default for GameState {
    fn default() -> Self {
        GameState::try_from(FEN_START).expect("the starting position parses")
    }
}

impl GameState {
    delegate! {
        to self.board {
            pub fn hash(&self) -> u64;
            pub fn side_to_move(&self) -> Color;
            pub fn white_to_move(&self) -> bool;
            pub fn in_check(&self) -> bool;
            pub fn halfmove_clock(&self) -> u8;
            pub fn turn_count(&self) -> u16;
            pub fn insufficient_mating_material(&self) -> bool;
            pub fn fen(&self) -> String;
            pub fn display(&self);
        }
    }

    pub fn board(&self) -> &BoardState {
        &self.board
    }

    pub fn legal_moves(&self) -> &MoveList {
        &self.legal_moves
    }

    pub fn history(&self) -> &[Move] {
        &self.history
    }

    pub fn find_move(&self, uci: &str) -> Option<Move> {
        self.legal_moves
            .iter()
            .copied()
            .find(|mv| mv.to_string() == uci)
    }

    /// Applies a move from the current legal list. Returns false without
    /// mutating when the move is not in the list or the hash ring is out
    /// of room.
    pub fn apply(&mut self, mv: Move) -> bool {
        if self.board.turn_count() as usize + 1 >= MAX_GAME_PLIES {
            return false;
        }

        if !self.legal_moves.contains(&mv) {
            return false;
        }

        let applied = self.board.apply(&mut self.nnue, mv);
        debug_assert!(applied, "legal moves must pass the apply probe");

        self.history.push(mv);
        self.hash_ring.0[self.board.turn_count() as usize] = self.board.hash();
        self.legal_moves = legal_moves(&self.board);
        true
    }

    /// How many earlier recorded positions share the current hash.
    pub fn repetitions(&self) -> usize {
        let turn = self.board.turn_count();
        let hash = self.board.hash();

        (self.first_turn..turn)
            .filter(|&t| self.hash_ring.0[t as usize] == hash)
            .count()
    }

    pub fn is_repetition(&self) -> bool {
        self.repetitions() >= 1
    }

    pub fn is_threefold(&self) -> bool {
        self.repetitions() >= 2
    }

    /// Terminal when no legal move exists, the fifty-move counter has run
    /// out, or neither side retains mating material.
    pub fn is_game_over(&self) -> bool {
        self.legal_moves.is_empty()
            || self.board.halfmove_clock() >= 100
            || self.board.insufficient_mating_material()
    }

    /// Result of a finished game: a side wins only by checkmate,
    /// everything else is a draw.
    pub fn outcome(&self) -> Outcome {
        if self.legal_moves.is_empty() && self.board.in_check() {
            if self.board.white_to_move() {
                Outcome::BlackWins
            } else {
                Outcome::WhiteWins
            }
        } else {
            Outcome::Draw
        }
    }

    pub fn evaluate(&mut self) -> i32 {
        self.nnue.evaluate(&self.board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::types::Square;

    fn play(game: &mut GameState, moves: &str) {
        for uci in moves.split_whitespace() {
            let mv = game
                .find_move(uci)
                .unwrap_or_else(|| panic!("move {uci} not legal in {}", game.fen()));
            assert!(game.apply(mv));
        }
    }

    #[test]
    fn test_new_game() {
        let game = GameState::default();

        assert_eq!(game.legal_moves().len(), 20);
        assert!(!game.is_game_over());
        assert_eq!(game.history().len(), 0);
        assert_eq!(game.turn_count(), 1);
    }

    #[test]
    fn test_illegal_moves_are_refused() {
        let mut game = GameState::default();
        let before = game.fen();

        // Pseudo-random junk and a pinned-piece move later on.
        assert!(game.find_move("e2e5").is_none());
        assert!(game.find_move("e7e5").is_none());

        let illegal = Move::new(
            Square::E2,
            Square::E5,
            crate::chess::types::Piece::WhitePawn,
            crate::chess::types::Piece::None,
            crate::chess::moves::MoveKind::Quiet,
        );

        assert!(!game.apply(illegal));
        assert_eq!(game.fen(), before);
    }

    #[test]
    fn test_fools_mate() {
        let mut game = GameState::default();
        play(&mut game, "f2f3 e7e5 g2g4 d8h4");

        assert!(game.in_check());
        assert!(game.legal_moves().is_empty());
        assert!(game.is_game_over());
        assert_eq!(game.outcome(), Outcome::BlackWins);
        assert_eq!(game.outcome() as u8, 1);
    }

    #[test]
    fn test_stalemate_is_a_draw() {
        let game = GameState::try_from("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();

        assert!(game.legal_moves().is_empty());
        assert!(!game.in_check());
        assert!(game.is_game_over());
        assert_eq!(game.outcome(), Outcome::Draw);
        assert_eq!(game.outcome() as u8, 0);
    }

    #[test]
    fn test_fifty_move_rule() {
        let game = GameState::try_from("8/8/4k3/8/8/3K4/8/7R w - - 100 80").unwrap();
        assert!(game.is_game_over());
        assert_eq!(game.outcome(), Outcome::Draw);

        let game = GameState::try_from("8/8/4k3/8/8/3K4/8/7R w - - 99 80").unwrap();
        assert!(!game.is_game_over());
    }

    #[test]
    fn test_insufficient_material_ends_the_game() {
        let game = GameState::try_from("8/8/5k2/8/8/3K4/8/8 w - - 0 1").unwrap();

        assert!(game.is_game_over());
        assert_eq!(game.outcome(), Outcome::Draw);
    }

    #[test]
    fn test_repetition_detection() {
        let mut game = GameState::default();

        assert!(!game.is_repetition());
        play(&mut game, "g1f3 g8f6 f3g1 f6g8");
        assert!(game.is_repetition());
        assert!(!game.is_threefold());

        play(&mut game, "g1f3 g8f6 f3g1 f6g8");
        assert!(game.is_threefold());

        // A pawn move reaches a position never seen before.
        play(&mut game, "e2e4");
        assert!(!game.is_repetition());
    }

    #[test]
    fn test_evaluation_runs() {
        let mut game = GameState::default();
        let eval = game.evaluate();

        // Deterministic network, deterministic value.
        assert_eq!(eval, game.clone().evaluate());
        play(&mut game, "e2e4");
        let _ = game.evaluate();
    }
}
