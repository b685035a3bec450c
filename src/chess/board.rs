use super::attacks::{bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks};
use super::bitboard::{Bitboard, EMPTY};
use super::moves::{Move, MoveKind};
use super::types::{Color, Piece, PieceType, Square};
use super::zobrist::{CASTLE_DELTA, EN_PASSANT_DELTA, ZOBRIST};
use crate::nn::evaluator::NnueEvaluator;
use strum::IntoEnumIterator;

pub const WHITE_KING_SIDE: u8 = 1;
pub const WHITE_QUEEN_SIDE: u8 = 2;
pub const BLACK_KING_SIDE: u8 = 4;
pub const BLACK_QUEEN_SIDE: u8 = 8;

/// En-passant files are 0..7; 8 means no capture is available.
pub const EP_NONE: u8 = 8;

/// Castle rights surviving a move touching each square. Covers king
/// moves, rook moves and rook captures in one table.
const CASTLE_MASKS: [u8; 64] = {
    let mut masks = [0b1111u8; 64];
    masks[0] = !WHITE_QUEEN_SIDE & 0b1111; // a1
    masks[4] = !(WHITE_KING_SIDE | WHITE_QUEEN_SIDE) & 0b1111; // e1
    masks[7] = !WHITE_KING_SIDE & 0b1111; // h1
    masks[56] = !BLACK_QUEEN_SIDE & 0b1111; // a8
    masks[60] = !(BLACK_KING_SIDE | BLACK_QUEEN_SIDE) & 0b1111; // e8
    masks[63] = !BLACK_KING_SIDE & 0b1111; // h8
    masks
};

/// Rook travel for a castle move, keyed on the king's destination.
pub const fn castle_rook_squares(king_to: Square) -> (Square, Square) {
    match king_to {
        Square::G1 => (Square::H1, Square::F1),
        Square::C1 => (Square::A1, Square::D1),
        Square::G8 => (Square::H8, Square::F8),
        Square::C8 => (Square::A8, Square::D8),
        _ => unreachable!(),
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BoardState {
    pieces: [Bitboard; 13],
    white_pieces: Bitboard,
    black_pieces: Bitboard,
    all_pieces: Bitboard,
    white_king: Square,
    black_king: Square,
    castle_rights: u8,
    en_passant_file: u8,
    white_to_move: bool,
    in_check: bool,
    halfmove_clock: u8,
    turn_count: u16,
    piece_count: u8,
    hash: u64,
    pawn_hash: u64,
    white_material_hash: u64,
    black_material_hash: u64,
}

impl TryFrom<&str> for BoardState {
    type Error = String;

    fn try_from(fen: &str) -> Result<Self, Self::Error> {
        let fields: Vec<&str> = fen.split_whitespace().collect();

        if fields.len() < 4 || fields.len() > 6 {
            return Err("FEN must have 4, 5 or 6 fields separated by space(s)".to_string());
        }

        let mut board = BoardState {
            pieces: [EMPTY; 13],
            white_pieces: EMPTY,
            black_pieces: EMPTY,
            all_pieces: EMPTY,
            white_king: Square::E1,
            black_king: Square::E8,
            castle_rights: 0,
            en_passant_file: EP_NONE,
            white_to_move: true,
            in_check: false,
            halfmove_clock: 0,
            turn_count: 1,
            piece_count: 0,
            hash: 0,
            pawn_hash: 0,
            white_material_hash: 0,
            black_material_hash: 0,
        };

        let ranks: Vec<&str> = fields[0].split('/').collect();

        if ranks.len() != 8 {
            return Err("FEN board must have 8 ranks separated by '/'".to_string());
        }

        for (rank_idx, rank_pieces) in ranks.iter().rev().enumerate() {
            let mut file = 0u8;

            for chr in rank_pieces.chars() {
                if let Some(digit) = chr.to_digit(10) {
                    file += digit as u8;
                    continue;
                }

                if file >= 8 {
                    return Err("FEN rank overflows 8 files".to_string());
                }

                let piece =
                    Piece::try_from(chr).map_err(|_| "Invalid piece character in FEN".to_string())?;

                let sq = Square::new(file, rank_idx as u8);
                board.toggle(piece, sq);

                match piece {
                    Piece::WhiteKing => board.white_king = sq,
                    Piece::BlackKing => board.black_king = sq,
                    _ => {}
                }

                file += 1;
            }
        }

        if board.pieces[Piece::WhiteKing].count() != 1 || board.pieces[Piece::BlackKing].count() != 1
        {
            return Err("FEN must place exactly one king per side".to_string());
        }

        board.white_to_move = match fields[1] {
            "w" | "W" => Ok(true),
            "b" | "B" => Ok(false),
            _ => Err("Error parsing side to move in FEN".to_string()),
        }?;

        for chr in fields[2].chars() {
            match chr {
                'K' => board.castle_rights |= WHITE_KING_SIDE,
                'Q' => board.castle_rights |= WHITE_QUEEN_SIDE,
                'k' => board.castle_rights |= BLACK_KING_SIDE,
                'q' => board.castle_rights |= BLACK_QUEEN_SIDE,
                '-' => {}
                _ => return Err("Error parsing castle rights in FEN".to_string()),
            }
        }

        if let Ok(ep_square) = Square::try_from(fields[3]) {
            board.en_passant_file = ep_square.file();
        }

        if fields.len() > 4 {
            board.halfmove_clock = fields[4]
                .parse()
                .map_err(|_| "Error parsing halfmove clock in FEN".to_string())?;
        }

        if fields.len() > 5 {
            board.turn_count = fields[5]
                .parse()
                .map_err(|_| "Error parsing fullmove counter in FEN".to_string())?;
        }

        board.all_pieces = board.white_pieces | board.black_pieces;
        board.piece_count = board.all_pieces.count() as u8;

        let (king, attacker_is_white) = if board.white_to_move {
            (board.white_king, false)
        } else {
            (board.black_king, true)
        };

        board.in_check = board.is_attacked(king, attacker_is_white);
        board.recompute_hashes();

        Ok(board)
    }
}

impl BoardState {
    pub const fn white_to_move(&self) -> bool {
        self.white_to_move
    }

    pub const fn side_to_move(&self) -> Color {
        if self.white_to_move {
            Color::White
        } else {
            Color::Black
        }
    }

    pub fn piece_bb(&self, piece: Piece) -> Bitboard {
        self.pieces[piece]
    }

    pub fn color_pieces(&self, color: Color) -> Bitboard {
        match color {
            Color::White => self.white_pieces,
            Color::Black => self.black_pieces,
        }
    }

    pub const fn white_pieces(&self) -> Bitboard {
        self.white_pieces
    }

    pub const fn black_pieces(&self) -> Bitboard {
        self.black_pieces
    }

    pub const fn occupancy(&self) -> Bitboard {
        self.all_pieces
    }

    pub const fn king_square(&self, color: Color) -> Square {
        match color {
            Color::White => self.white_king,
            Color::Black => self.black_king,
        }
    }

    pub const fn castle_rights(&self) -> u8 {
        self.castle_rights
    }

    pub const fn en_passant_file(&self) -> u8 {
        self.en_passant_file
    }

    pub const fn in_check(&self) -> bool {
        self.in_check
    }

    pub const fn halfmove_clock(&self) -> u8 {
        self.halfmove_clock
    }

    pub const fn turn_count(&self) -> u16 {
        self.turn_count
    }

    pub const fn piece_count(&self) -> u8 {
        self.piece_count
    }

    pub const fn hash(&self) -> u64 {
        self.hash
    }

    pub const fn pawn_hash(&self) -> u64 {
        self.pawn_hash
    }

    pub const fn material_hash(&self, color: Color) -> u64 {
        match color {
            Color::White => self.white_material_hash,
            Color::Black => self.black_material_hash,
        }
    }

    pub fn piece_at(&self, sq: Square) -> Piece {
        if !self.all_pieces.contains(sq) {
            return Piece::None;
        }

        let first: usize = if self.white_pieces.contains(sq) { 2 } else { 1 };

        for code in (first..13).step_by(2) {
            if self.pieces[code].contains(sq) {
                return unsafe { std::mem::transmute::<u8, Piece>(code as u8) };
            }
        }

        unreachable!("aggregate bitboards out of sync")
    }

    fn toggle(&mut self, piece: Piece, sq: Square) {
        let bb = Bitboard::from(sq);
        self.pieces[piece] ^= bb;

        match piece.color() {
            Color::White => self.white_pieces ^= bb,
            Color::Black => self.black_pieces ^= bb,
        }
    }

    /// True when `sq` is attacked by the given side on the current
    /// occupancy. This is the probe both legality filtering and the
    /// in-check flag are built on.
    pub fn is_attacked(&self, sq: Square, by_white: bool) -> bool {
        let (pawn, knight, bishop, rook, queen, king) = if by_white {
            (
                Piece::WhitePawn,
                Piece::WhiteKnight,
                Piece::WhiteBishop,
                Piece::WhiteRook,
                Piece::WhiteQueen,
                Piece::WhiteKing,
            )
        } else {
            (
                Piece::BlackPawn,
                Piece::BlackKnight,
                Piece::BlackBishop,
                Piece::BlackRook,
                Piece::BlackQueen,
                Piece::BlackKing,
            )
        };

        // A white pawn attacks sq exactly when it stands on a square a
        // black pawn on sq would attack.
        (pawn_attacks(!by_white, sq) & self.pieces[pawn]).any()
            || (knight_attacks(sq) & self.pieces[knight]).any()
            || (king_attacks(sq) & self.pieces[king]).any()
            || (bishop_attacks(sq, self.all_pieces) & (self.pieces[bishop] | self.pieces[queen]))
                .any()
            || (rook_attacks(sq, self.all_pieces) & (self.pieces[rook] | self.pieces[queen])).any()
    }

    /// Phase one of a move: edit the bitboards, flip the side to move and
    /// advance the clocks. Returns false when the mover left their own
    /// king in check; the caller is expected to discard the state then.
    pub fn partial_apply<const WHITE: bool>(&mut self, mv: Move) -> bool {
        debug_assert_eq!(self.white_to_move, WHITE);

        let (from, to, piece) = (mv.from(), mv.to(), mv.piece());
        let move_mask = Bitboard::from(from) | Bitboard::from(to);
        let old_en_passant_file = self.en_passant_file;

        match mv.kind() {
            MoveKind::Quiet => {
                if mv.is_capture() {
                    let to_bb = Bitboard::from(to);
                    self.pieces[mv.captured()] ^= to_bb;

                    if WHITE {
                        self.black_pieces ^= to_bb;
                    } else {
                        self.white_pieces ^= to_bb;
                    }

                    self.piece_count -= 1;
                }

                self.pieces[piece] ^= move_mask;

                if WHITE {
                    self.white_pieces ^= move_mask;
                } else {
                    self.black_pieces ^= move_mask;
                }

                if piece.piece_type() == PieceType::King {
                    if WHITE {
                        self.white_king = to;
                    } else {
                        self.black_king = to;
                    }
                }

                self.castle_rights &= CASTLE_MASKS[from as usize] & CASTLE_MASKS[to as usize];
                self.en_passant_file = EP_NONE;
            }
            MoveKind::DoublePush => {
                self.pieces[piece] ^= move_mask;

                if WHITE {
                    self.white_pieces ^= move_mask;
                } else {
                    self.black_pieces ^= move_mask;
                }

                self.en_passant_file = from.file();
            }
            MoveKind::Castle => {
                let (rook_from, rook_to) = castle_rook_squares(to);
                let rook_mask = Bitboard::from(rook_from) | Bitboard::from(rook_to);
                let rook = if WHITE {
                    Piece::WhiteRook
                } else {
                    Piece::BlackRook
                };

                self.pieces[piece] ^= move_mask;
                self.pieces[rook] ^= rook_mask;

                if WHITE {
                    self.white_pieces ^= move_mask;
                    self.white_pieces ^= rook_mask;
                    self.white_king = to;
                    self.castle_rights &= !(WHITE_KING_SIDE | WHITE_QUEEN_SIDE);
                } else {
                    self.black_pieces ^= move_mask;
                    self.black_pieces ^= rook_mask;
                    self.black_king = to;
                    self.castle_rights &= !(BLACK_KING_SIDE | BLACK_QUEEN_SIDE);
                }

                self.en_passant_file = EP_NONE;
            }
            MoveKind::EnPassant => {
                let captured_sq = Square::from((from as u8 & 56) + old_en_passant_file);
                let captured_bb = Bitboard::from(captured_sq);

                self.pieces[piece] ^= move_mask;

                if WHITE {
                    self.white_pieces ^= move_mask;
                    self.pieces[Piece::BlackPawn] ^= captured_bb;
                    self.black_pieces ^= captured_bb;
                } else {
                    self.black_pieces ^= move_mask;
                    self.pieces[Piece::WhitePawn] ^= captured_bb;
                    self.white_pieces ^= captured_bb;
                }

                self.piece_count -= 1;
                self.en_passant_file = EP_NONE;
            }
            _ => {
                // Promotions: the pawn leaves the board, the promoted
                // piece appears on the target square.
                let from_bb = Bitboard::from(from);
                let to_bb = Bitboard::from(to);

                self.pieces[piece] ^= from_bb;
                self.pieces[mv.resulting_piece()] ^= to_bb;

                if mv.is_capture() {
                    self.pieces[mv.captured()] ^= to_bb;
                    self.piece_count -= 1;

                    if WHITE {
                        self.black_pieces ^= to_bb;
                    } else {
                        self.white_pieces ^= to_bb;
                    }
                }

                if WHITE {
                    self.white_pieces ^= move_mask;
                } else {
                    self.black_pieces ^= move_mask;
                }

                self.castle_rights &= CASTLE_MASKS[to as usize];
                self.en_passant_file = EP_NONE;
            }
        }

        self.all_pieces = self.white_pieces | self.black_pieces;
        self.white_to_move = !WHITE;
        self.turn_count += 1;

        if mv.is_reset() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock = self.halfmove_clock.saturating_add(1);
        }

        let (our_king, their_king) = if WHITE {
            (self.white_king, self.black_king)
        } else {
            (self.black_king, self.white_king)
        };

        if self.is_attacked(our_king, !WHITE) {
            return false;
        }

        self.in_check = self.is_attacked(their_king, WHITE);
        true
    }

    pub fn partial_apply_move(&mut self, mv: Move) -> bool {
        if self.white_to_move {
            self.partial_apply::<true>(mv)
        } else {
            self.partial_apply::<false>(mv)
        }
    }

    fn xor_piece_hashes(&mut self, piece: Piece, sq: Square) {
        let key = ZOBRIST.pieces[piece][sq];
        self.hash ^= key;

        if piece.piece_type() == PieceType::Pawn {
            self.pawn_hash ^= key;
        }

        match piece.color() {
            Color::White => self.white_material_hash ^= key,
            Color::Black => self.black_material_hash ^= key,
        }
    }

    /// Phase two of a move: fold the differential into all four hashes
    /// and feed the evaluator its accumulator deltas.
    pub fn finish_apply<const WHITE: bool>(
        &mut self,
        nnue: &mut NnueEvaluator,
        mv: Move,
        old_en_passant_file: u8,
        old_castle_rights: u8,
    ) {
        self.hash ^= ZOBRIST.side_to_move;
        self.hash ^=
            EN_PASSANT_DELTA[old_en_passant_file as usize * 9 + self.en_passant_file as usize];
        self.hash ^= CASTLE_DELTA[(old_castle_rights ^ self.castle_rights) as usize];

        let (from, to, piece) = (mv.from(), mv.to(), mv.piece());

        match mv.kind() {
            MoveKind::Quiet | MoveKind::DoublePush => {
                self.xor_piece_hashes(piece, from);
                self.xor_piece_hashes(piece, to);

                let sub_from = nnue.feature_pair(piece, from);
                let add_to = nnue.feature_pair(piece, to);

                if mv.is_capture() {
                    self.xor_piece_hashes(mv.captured(), to);
                    let sub_captured = nnue.feature_pair(mv.captured(), to);
                    nnue.apply_capture(sub_from, add_to, sub_captured);
                } else {
                    nnue.apply_quiet(add_to, sub_from);
                }
            }
            MoveKind::Castle => {
                let (rook_from, rook_to) = castle_rook_squares(to);
                let rook = if WHITE {
                    Piece::WhiteRook
                } else {
                    Piece::BlackRook
                };

                self.xor_piece_hashes(piece, from);
                self.xor_piece_hashes(piece, to);
                self.xor_piece_hashes(rook, rook_from);
                self.xor_piece_hashes(rook, rook_to);

                let king_sub = nnue.feature_pair(piece, from);
                let king_add = nnue.feature_pair(piece, to);
                let rook_sub = nnue.feature_pair(rook, rook_from);
                let rook_add = nnue.feature_pair(rook, rook_to);
                nnue.apply_castle(king_sub, king_add, rook_sub, rook_add);
            }
            MoveKind::EnPassant => {
                let captured_sq = Square::from((from as u8 & 56) + old_en_passant_file);
                let captured = if WHITE {
                    Piece::BlackPawn
                } else {
                    Piece::WhitePawn
                };

                self.xor_piece_hashes(piece, from);
                self.xor_piece_hashes(piece, to);
                self.xor_piece_hashes(captured, captured_sq);

                let sub_from = nnue.feature_pair(piece, from);
                let add_to = nnue.feature_pair(piece, to);
                let sub_captured = nnue.feature_pair(captured, captured_sq);
                nnue.apply_capture(sub_from, add_to, sub_captured);
            }
            _ => {
                let promoted = mv.resulting_piece();

                self.xor_piece_hashes(piece, from);
                self.xor_piece_hashes(promoted, to);

                let sub_from = nnue.feature_pair(piece, from);
                let add_to = nnue.feature_pair(promoted, to);

                if mv.is_capture() {
                    self.xor_piece_hashes(mv.captured(), to);
                    let sub_captured = nnue.feature_pair(mv.captured(), to);
                    nnue.apply_capture(sub_from, add_to, sub_captured);
                } else {
                    nnue.apply_quiet(add_to, sub_from);
                }
            }
        }

        if piece.piece_type() == PieceType::King {
            let king_sq = if WHITE { self.white_king } else { self.black_king };
            nnue.track_king(piece.color(), king_sq);
        }
    }

    /// Both phases at once, dispatched on the side to move. On an illegal
    /// move the board is left mid-edit and must be discarded.
    pub fn apply(&mut self, nnue: &mut NnueEvaluator, mv: Move) -> bool {
        let old_en_passant_file = self.en_passant_file;
        let old_castle_rights = self.castle_rights;

        if self.white_to_move {
            if !self.partial_apply::<true>(mv) {
                return false;
            }
            self.finish_apply::<true>(nnue, mv, old_en_passant_file, old_castle_rights);
        } else {
            if !self.partial_apply::<false>(mv) {
                return false;
            }
            self.finish_apply::<false>(nnue, mv, old_en_passant_file, old_castle_rights);
        }

        true
    }

    /// Pass the move to the opponent. The caller is responsible for
    /// undoing this; the clocks other than the half-move clock are left
    /// untouched.
    pub fn apply_null_move(&mut self) {
        self.white_to_move = !self.white_to_move;
        self.hash ^= ZOBRIST.side_to_move;

        if self.en_passant_file != EP_NONE {
            self.hash ^= ZOBRIST.en_passant[self.en_passant_file as usize];
            self.en_passant_file = EP_NONE;
        }

        self.halfmove_clock = 0;
        self.in_check = false;
    }

    /// Full recomputation of all four hashes, used after FEN loads and by
    /// the incremental-consistency tests.
    pub fn recompute_hashes(&mut self) {
        self.hash = 0;
        self.pawn_hash = 0;
        self.white_material_hash = 0;
        self.black_material_hash = 0;

        for piece in Piece::iter() {
            if piece.is_none() {
                continue;
            }

            for sq in self.pieces[piece] {
                self.xor_piece_hashes(piece, sq);
            }
        }

        for right in 0..4 {
            if self.castle_rights & (1 << right) != 0 {
                self.hash ^= ZOBRIST.castling[right];
            }
        }

        if self.en_passant_file != EP_NONE {
            self.hash ^= ZOBRIST.en_passant[self.en_passant_file as usize];
        }

        if !self.white_to_move {
            self.hash ^= ZOBRIST.side_to_move;
        }
    }

    pub fn insufficient_mating_material(&self) -> bool {
        if self.piece_count == 2 {
            return true;
        }

        let majors = self.pieces[Piece::WhiteRook]
            | self.pieces[Piece::BlackRook]
            | self.pieces[Piece::WhiteQueen]
            | self.pieces[Piece::BlackQueen];

        if majors.any() {
            return false;
        }

        let knights = self.pieces[Piece::WhiteKnight] | self.pieces[Piece::BlackKnight];

        // King and up to two knights cannot force mate on a lone king.
        for (own, own_king, other) in [
            (self.white_pieces, self.pieces[Piece::WhiteKing], self.black_pieces),
            (self.black_pieces, self.pieces[Piece::BlackKing], self.white_pieces),
        ] {
            if other.count() == 1
                && (own ^ own_king ^ (knights & own)).is_empty()
                && (knights & own).count() <= 2
            {
                return true;
            }
        }

        self.white_pieces.count() <= 2 && self.black_pieces.count() <= 2
    }

    pub fn fen(&self) -> String {
        let mut rows: Vec<String> = Vec::with_capacity(8);

        for rank in (0..8).rev() {
            let mut row = String::new();
            let mut skipped = 0;

            for file in 0..8 {
                let piece = self.piece_at(Square::new(file, rank));

                if piece.is_none() {
                    skipped += 1;
                    continue;
                }

                if skipped > 0 {
                    row += &skipped.to_string();
                    skipped = 0;
                }

                row.push(piece.to_char());
            }

            if skipped > 0 {
                row += &skipped.to_string();
            }

            rows.push(row);
        }

        let castles = if self.castle_rights == 0 {
            "-".to_string()
        } else {
            [
                (WHITE_KING_SIDE, 'K'),
                (WHITE_QUEEN_SIDE, 'Q'),
                (BLACK_KING_SIDE, 'k'),
                (BLACK_QUEEN_SIDE, 'q'),
            ]
            .iter()
            .filter_map(|&(right, chr)| (self.castle_rights & right != 0).then_some(chr))
            .collect()
        };

        let en_passant = if self.en_passant_file == EP_NONE {
            "-".to_string()
        } else {
            let rank = if self.white_to_move { 5 } else { 2 };
            Square::new(self.en_passant_file, rank).to_string()
        };

        format!(
            "{} {} {} {} {} {}",
            rows.join("/"),
            if self.white_to_move { "w" } else { "b" },
            castles,
            en_passant,
            self.halfmove_clock,
            self.turn_count
        )
    }

    pub fn display(&self) {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let piece = self.piece_at(Square::new(file, rank));
                let chr = if piece.is_none() { '.' } else { piece.to_char() };
                print!("{chr}{}", if file == 7 { '\n' } else { ' ' });
            }
        }

        println!("\n{}", self.fen());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::movegen::legal_moves;
    use crate::chess::util::{FEN_KIWIPETE, FEN_START};
    use crate::chess::zobrist::CASTLE_MOVE_KEYS;

    fn assert_bitboards_consistent(board: &BoardState) {
        let mut union = EMPTY;
        for piece in Piece::iter() {
            if !piece.is_none() {
                union |= board.piece_bb(piece);
            }
        }

        assert_eq!(union, board.occupancy());
        assert_eq!(
            board.white_pieces() | board.black_pieces(),
            board.occupancy()
        );
        assert!((board.white_pieces() & board.black_pieces()).is_empty());
        assert_eq!(board.piece_count() as u32, board.occupancy().count());
        assert!(board.piece_bb(Piece::WhiteKing).contains(board.king_square(Color::White)));
        assert!(board.piece_bb(Piece::BlackKing).contains(board.king_square(Color::Black)));
    }

    fn assert_hashes_consistent(board: &BoardState) {
        let mut recomputed = board.clone();
        recomputed.recompute_hashes();
        assert_eq!(&recomputed, board);
    }

    fn apply_uci_moves(board: &mut BoardState, nnue: &mut NnueEvaluator, moves: &str) {
        for uci in moves.split_whitespace() {
            let mv = legal_moves(board)
                .into_iter()
                .find(|m| m.to_string() == uci)
                .unwrap_or_else(|| panic!("move {uci} not legal in {}", board.fen()));

            assert!(board.apply(nnue, mv));
            assert_bitboards_consistent(board);
            assert_hashes_consistent(board);
        }
    }

    #[test]
    fn test_fen_round_trip() {
        for fen in [
            FEN_START,
            FEN_KIWIPETE,
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "4k3/8/8/2Pp4/8/8/8/4K3 w - d6 0 1",
        ] {
            let board = BoardState::try_from(fen).unwrap();
            assert_eq!(board.fen(), fen);
            assert_bitboards_consistent(&board);
            assert_hashes_consistent(&board);
        }

        assert!(BoardState::try_from("only three fields").is_err());
        assert!(BoardState::try_from("8/8/8/8 w - -").is_err());
        assert!(BoardState::try_from("x7/8/8/8/8/8/8/8 w - - 0 1").is_err());
    }

    #[test]
    fn test_en_passant_file_from_fen() {
        let board = BoardState::try_from(
            "rnbqkbnr/pppp1ppp/8/4p3/8/5N2/PPPPPPPP/RNBQKB1R w KQkq e6 0 2",
        )
        .unwrap();

        assert_eq!(board.en_passant_file(), 4);

        let board = BoardState::try_from(FEN_START).unwrap();
        assert_eq!(board.en_passant_file(), EP_NONE);
    }

    #[test]
    fn test_start_position() {
        let board = BoardState::try_from(FEN_START).unwrap();

        assert!(board.white_to_move());
        assert!(!board.in_check());
        assert_eq!(board.piece_count(), 32);
        assert_eq!(board.castle_rights(), 0b1111);
        assert_eq!(board.king_square(Color::White), Square::E1);
        assert_eq!(board.king_square(Color::Black), Square::E8);
        assert_eq!(board.piece_at(Square::A1), Piece::WhiteRook);
        assert_eq!(board.piece_at(Square::D8), Piece::BlackQueen);
        assert_eq!(board.piece_at(Square::E4), Piece::None);
    }

    #[test]
    fn test_castle_apply() {
        let mut board = BoardState::try_from(
            "r1bqkbnr/ppp1pppp/2n5/1B1p4/4P3/5N2/PPPP1PPP/RNBQK2R w KQkq d6 0 4",
        )
        .unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        let old_hash = board.hash();
        let old_rights = board.castle_rights();

        let mv = Move::new(
            Square::E1,
            Square::G1,
            Piece::WhiteKing,
            Piece::None,
            MoveKind::Castle,
        );

        assert!(board.apply(&mut nnue, mv));

        assert_eq!(board.king_square(Color::White), Square::G1);
        assert!(board.piece_bb(Piece::WhiteRook).contains(Square::F1));
        assert!(!board.piece_bb(Piece::WhiteRook).contains(Square::H1));
        assert_eq!(
            board.castle_rights(),
            BLACK_KING_SIDE | BLACK_QUEEN_SIDE,
            "both white rights drop on castling"
        );

        // The incremental hash is exactly the combined castle key plus the
        // side, castle-rights and en-passant differentials.
        let expected = old_hash
            ^ CASTLE_MOVE_KEYS[0]
            ^ ZOBRIST.side_to_move
            ^ CASTLE_DELTA[(old_rights ^ board.castle_rights()) as usize]
            ^ EN_PASSANT_DELTA[3 * 9 + EP_NONE as usize];

        assert_eq!(board.hash(), expected);
        assert_hashes_consistent(&board);
        assert_bitboards_consistent(&board);
    }

    #[test]
    fn test_incremental_hash_matches_recomputation() {
        let mut board = BoardState::try_from(FEN_START).unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        // Ruy Lopez: every hash stays equal to a from-scratch recomputation.
        apply_uci_moves(&mut board, &mut nnue, "e2e4 e7e5 g1f3 b8c6 f1b5 a7a6");

        assert!(board.white_to_move());
        assert_eq!(board.halfmove_clock(), 0);
        assert_eq!(board.turn_count(), 7);
    }

    #[test]
    fn test_apply_covers_all_move_kinds() {
        let mut board = BoardState::try_from(FEN_START).unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        // Double pushes, captures, pins, castling on both wings.
        apply_uci_moves(
            &mut board,
            &mut nnue,
            "e2e4 d7d5 e4d5 g8f6 d5d6 c7d6 g1f3 b8c6 f1b5 c8g4 e1g1 d8d7 b2b4 e8c8",
        );

        assert_eq!(board.castle_rights(), 0);
    }

    #[test]
    fn test_en_passant_apply() {
        let mut board = BoardState::try_from("4k3/8/8/2Pp4/8/8/8/4K3 w - d6 0 1").unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        let mv = Move::new(
            Square::C5,
            Square::D6,
            Piece::WhitePawn,
            Piece::BlackPawn,
            MoveKind::EnPassant,
        );

        assert!(board.apply(&mut nnue, mv));
        assert_eq!(board.piece_at(Square::D5), Piece::None);
        assert_eq!(board.piece_at(Square::D6), Piece::WhitePawn);
        assert_eq!(board.piece_count(), 3);
        assert_eq!(board.en_passant_file(), EP_NONE);
        assert_hashes_consistent(&board);
        assert_bitboards_consistent(&board);
    }

    #[test]
    fn test_promotion_apply() {
        let mut board = BoardState::try_from("3n4/4P3/8/8/8/3k4/8/4K3 w - - 0 1").unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        let mv = Move::new(
            Square::E7,
            Square::D8,
            Piece::WhitePawn,
            Piece::BlackKnight,
            MoveKind::PromoQueen,
        );

        assert!(board.apply(&mut nnue, mv));
        assert_eq!(board.piece_at(Square::D8), Piece::WhiteQueen);
        assert!(board.piece_bb(Piece::WhitePawn).is_empty());
        assert_eq!(board.piece_count(), 3);
        assert_hashes_consistent(&board);
        assert_bitboards_consistent(&board);
    }

    #[test]
    fn test_rook_moves_and_captures_drop_castle_rights() {
        let mut board =
            BoardState::try_from("r3k2r/8/8/8/8/8/6p1/R3K2R b KQkq - 0 1").unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        // Black rook takes the h1 rook: white loses king-side castling.
        let mv = Move::new(
            Square::G2,
            Square::H1,
            Piece::BlackPawn,
            Piece::WhiteRook,
            MoveKind::PromoQueen,
        );

        assert!(board.apply(&mut nnue, mv));
        assert_eq!(
            board.castle_rights(),
            WHITE_QUEEN_SIDE | BLACK_KING_SIDE | BLACK_QUEEN_SIDE
        );
        assert_hashes_consistent(&board);

        // Moving the a8 rook drops black's queen-side right.
        let mut board = BoardState::try_from("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1").unwrap();
        let mut nnue = NnueEvaluator::from(&board);
        let mv = Move::new(
            Square::A1,
            Square::A5,
            Piece::WhiteRook,
            Piece::None,
            MoveKind::Quiet,
        );

        assert!(board.apply(&mut nnue, mv));
        assert_eq!(
            board.castle_rights(),
            WHITE_KING_SIDE | BLACK_KING_SIDE | BLACK_QUEEN_SIDE
        );
    }

    #[test]
    fn test_partial_apply_rejects_leaving_king_in_check() {
        // The e-file knight is pinned by the rook.
        let board = BoardState::try_from("k3r3/8/8/8/8/4N3/8/4K3 w - - 0 1").unwrap();

        let mut probe = board.clone();
        let pinned = Move::new(
            Square::E3,
            Square::C4,
            Piece::WhiteKnight,
            Piece::None,
            MoveKind::Quiet,
        );
        assert!(!probe.partial_apply_move(pinned));

        let mut probe = board.clone();
        let king_step = Move::new(
            Square::E1,
            Square::D1,
            Piece::WhiteKing,
            Piece::None,
            MoveKind::Quiet,
        );
        assert!(probe.partial_apply_move(king_step));
        assert!(!probe.in_check());
    }

    #[test]
    fn test_null_move() {
        // Without en passant the double null restores the exact hash.
        let mut board = BoardState::try_from(FEN_KIWIPETE).unwrap();
        let original = board.hash();

        board.apply_null_move();
        assert_ne!(board.hash(), original);
        board.apply_null_move();
        assert_eq!(board.hash(), original);
        assert_eq!(board.halfmove_clock(), 0);
        assert_hashes_consistent(&board);

        // A live en-passant file is cleared and stays cleared.
        let mut board = BoardState::try_from("4k3/8/8/2Pp4/8/8/8/4K3 w - d6 0 1").unwrap();
        board.apply_null_move();
        assert_eq!(board.en_passant_file(), EP_NONE);
        assert_hashes_consistent(&board);
        board.apply_null_move();
        assert_eq!(board.en_passant_file(), EP_NONE);
        assert_hashes_consistent(&board);
    }

    #[test]
    fn test_insufficient_mating_material() {
        for (fen, expected) in [
            ("8/8/8/8/8/4k3/4P3/4K3 w - - 0 1", true),
            ("8/8/8/8/8/4k3/8/R3K3 w Q - 0 1", false),
            ("8/8/5k2/8/8/3K4/8/8 w - - 0 1", true),
            ("8/2NNK3/8/8/8/3k4/8/8 w - - 0 1", true),
            ("8/3BK3/8/8/8/2nk4/8/8 w - - 0 1", true),
            ("8/2NNK3/8/8/8/2nk4/8/8 w - - 0 1", false),
            (FEN_START, false),
            ("8/4K3/8/8/8/2qk4/8/8 w - - 0 1", false),
        ] {
            let board = BoardState::try_from(fen).unwrap();
            assert_eq!(
                board.insufficient_mating_material(),
                expected,
                "wrong verdict for {fen}"
            );
        }
    }

    #[test]
    fn test_clone_is_independent() {
        let board = BoardState::try_from(FEN_KIWIPETE).unwrap();
        let mut nnue = NnueEvaluator::from(&board);

        let snapshot = board.clone();
        let mut child = board.clone();

        let mv = Move::new(
            Square::E2,
            Square::D3,
            Piece::WhiteBishop,
            Piece::None,
            MoveKind::Quiet,
        );

        assert!(child.apply(&mut nnue, mv));
        assert_ne!(child, snapshot);
        assert_eq!(board, snapshot);
    }
}
