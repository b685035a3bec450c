use super::attacks::{bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks};
use super::bitboard::Bitboard;
use super::board::{
    BoardState, BLACK_KING_SIDE, BLACK_QUEEN_SIDE, EP_NONE, WHITE_KING_SIDE, WHITE_QUEEN_SIDE,
};
use super::moves::{Move, MoveKind, MoveList};
use super::types::{Color, Piece, Square};

/// Appends pseudo-legal moves for the side to move. With `only_captures`
/// the list is restricted to captures and promotions (the quiescence
/// move set). Legality is the caller's problem; see [`legal_moves`].
pub fn generate(board: &BoardState, moves: &mut MoveList, only_captures: bool) {
    if board.white_to_move() {
        generate_for::<true>(board, moves, only_captures);
    } else {
        generate_for::<false>(board, moves, only_captures);
    }
}

/// The pseudo-legal list filtered through the same probe `partial_apply`
/// uses: a move survives iff it does not leave the mover's king in check.
pub fn legal_moves(board: &BoardState) -> MoveList {
    let mut pseudo = MoveList::new();
    generate(board, &mut pseudo, false);

    let mut legal = MoveList::new();

    for mv in pseudo {
        let mut probe = board.clone();
        if probe.partial_apply_move(mv) {
            legal.push(mv);
        }
    }

    legal
}

fn push_pawn_move(moves: &mut MoveList, from: Square, to: Square, pawn: Piece, captured: Piece) {
    if to.is_backrank() {
        for kind in [
            MoveKind::PromoQueen,
            MoveKind::PromoKnight,
            MoveKind::PromoRook,
            MoveKind::PromoBishop,
        ] {
            moves.push(Move::new(from, to, pawn, captured, kind));
        }
    } else {
        moves.push(Move::new(from, to, pawn, captured, MoveKind::Quiet));
    }
}

fn generate_for<const WHITE: bool>(board: &BoardState, moves: &mut MoveList, only_captures: bool) {
    let (pawn, knight, bishop, rook, queen, king) = if WHITE {
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

    let us = if WHITE {
        board.white_pieces()
    } else {
        board.black_pieces()
    };
    let them = if WHITE {
        board.black_pieces()
    } else {
        board.white_pieces()
    };
    let occ = board.occupancy();
    let targets = if only_captures { them } else { !us };

    // Pawns
    for from in board.piece_bb(pawn) {
        let push_sq = if WHITE {
            Square::from(from as u8 + 8)
        } else {
            Square::from(from as u8 - 8)
        };

        if !occ.contains(push_sq) {
            // Promotions stay in the capture set, plain pushes do not.
            if push_sq.is_backrank() {
                push_pawn_move(moves, from, push_sq, pawn, Piece::None);
            } else if !only_captures {
                moves.push(Move::new(from, push_sq, pawn, Piece::None, MoveKind::Quiet));

                let start_rank = if WHITE { 1 } else { 6 };

                if from.rank() == start_rank {
                    let double_sq = if WHITE {
                        Square::from(from as u8 + 16)
                    } else {
                        Square::from(from as u8 - 16)
                    };

                    if !occ.contains(double_sq) {
                        moves.push(Move::new(
                            from,
                            double_sq,
                            pawn,
                            Piece::None,
                            MoveKind::DoublePush,
                        ));
                    }
                }
            }
        }

        for to in pawn_attacks(WHITE, from) & them {
            push_pawn_move(moves, from, to, pawn, board.piece_at(to));
        }
    }

    // En passant
    if board.en_passant_file() != EP_NONE {
        let to = Square::from(if WHITE { 40 } else { 16 } + board.en_passant_file());
        let captured = if WHITE {
            Piece::BlackPawn
        } else {
            Piece::WhitePawn
        };

        for from in pawn_attacks(!WHITE, to) & board.piece_bb(pawn) {
            moves.push(Move::new(from, to, pawn, captured, MoveKind::EnPassant));
        }
    }

    // Knights
    for from in board.piece_bb(knight) {
        for to in knight_attacks(from) & targets {
            moves.push(Move::new(from, to, knight, board.piece_at(to), MoveKind::Quiet));
        }
    }

    // Sliders
    for from in board.piece_bb(bishop) {
        for to in bishop_attacks(from, occ) & targets {
            moves.push(Move::new(from, to, bishop, board.piece_at(to), MoveKind::Quiet));
        }
    }

    for from in board.piece_bb(rook) {
        for to in rook_attacks(from, occ) & targets {
            moves.push(Move::new(from, to, rook, board.piece_at(to), MoveKind::Quiet));
        }
    }

    for from in board.piece_bb(queen) {
        for to in (bishop_attacks(from, occ) | rook_attacks(from, occ)) & targets {
            moves.push(Move::new(from, to, queen, board.piece_at(to), MoveKind::Quiet));
        }
    }

    // King
    let king_sq = board.king_square(if WHITE { Color::White } else { Color::Black });

    for to in king_attacks(king_sq) & targets {
        moves.push(Move::new(king_sq, to, king, board.piece_at(to), MoveKind::Quiet));
    }

    // Castling. The transit square must not be attacked; the probe in
    // partial_apply rejects landing in check.
    if !only_captures && !board.in_check() {
        let rights = board.castle_rights();

        if WHITE {
            if rights & WHITE_KING_SIDE != 0
                && !(occ & Bitboard::from([Square::F1, Square::G1].as_slice())).any()
                && !board.is_attacked(Square::F1, false)
            {
                moves.push(Move::new(
                    Square::E1,
                    Square::G1,
                    king,
                    Piece::None,
                    MoveKind::Castle,
                ));
            }

            if rights & WHITE_QUEEN_SIDE != 0
                && !(occ & Bitboard::from([Square::B1, Square::C1, Square::D1].as_slice())).any()
                && !board.is_attacked(Square::D1, false)
            {
                moves.push(Move::new(
                    Square::E1,
                    Square::C1,
                    king,
                    Piece::None,
                    MoveKind::Castle,
                ));
            }
        } else {
            if rights & BLACK_KING_SIDE != 0
                && !(occ & Bitboard::from([Square::F8, Square::G8].as_slice())).any()
                && !board.is_attacked(Square::F8, true)
            {
                moves.push(Move::new(
                    Square::E8,
                    Square::G8,
                    king,
                    Piece::None,
                    MoveKind::Castle,
                ));
            }

            if rights & BLACK_QUEEN_SIDE != 0
                && !(occ & Bitboard::from([Square::B8, Square::C8, Square::D8].as_slice())).any()
                && !board.is_attacked(Square::D8, true)
            {
                moves.push(Move::new(
                    Square::E8,
                    Square::C8,
                    king,
                    Piece::None,
                    MoveKind::Castle,
                ));
            }
        }
    }
}
