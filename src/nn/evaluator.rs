use super::params::{
    BUCKET_DIVISOR, COLOR_STRIDE, EVAL_SCALE, LAYER1_SIZE, NETWORK, PIECE_STRIDE, QA, QAB,
};
use crate::Align64;
use crate::chess::board::BoardState;
use crate::chess::types::{Color, Piece, Square};
use strum::IntoEnumIterator;

/// One feature, seen from both perspectives at once. The white index
/// reads the square as-is, the black index reads it vertically flipped
/// with the enemy bit inverted; either side may additionally be
/// file-mirrored depending on where its king stands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FeaturePair {
    pub white: usize,
    pub black: usize,
}

pub fn feature_indices(
    piece: Piece,
    sq: Square,
    white_mirrored: bool,
    black_mirrored: bool,
) -> FeaturePair {
    let pt = piece.piece_type() as usize;
    let enemy_of_white = !piece.color().is_white();

    let white_sq = if white_mirrored {
        sq.file_flipped() as usize
    } else {
        sq as usize
    };

    let black_sq = sq as usize ^ 56 ^ if black_mirrored { 7 } else { 0 };

    FeaturePair {
        white: enemy_of_white as usize * COLOR_STRIDE + pt * PIECE_STRIDE + white_sq,
        black: !enemy_of_white as usize * COLOR_STRIDE + pt * PIECE_STRIDE + black_sq,
    }
}

/// Two incrementally maintained first-layer sums, one per perspective.
/// The `should_*` flags implement the lazy mirror refresh: they track
/// where each king stands, while the plain flags describe the basis the
/// accumulator currently holds. `evaluate` reconciles the two.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NnueEvaluator {
    white_acc: Align64<[i16; LAYER1_SIZE]>,
    black_acc: Align64<[i16; LAYER1_SIZE]>,
    white_mirrored: bool,
    black_mirrored: bool,
    should_white_mirrored: bool,
    should_black_mirrored: bool,
}

impl Default for NnueEvaluator {
    fn default() -> Self {
        NnueEvaluator {
            white_acc: Align64(NETWORK.feature_bias.0),
            black_acc: Align64(NETWORK.feature_bias.0),
            white_mirrored: false,
            black_mirrored: false,
            should_white_mirrored: false,
            should_black_mirrored: false,
        }
    }
}

impl From<&BoardState> for NnueEvaluator {
    fn from(board: &BoardState) -> Self {
        let mut nnue = NnueEvaluator::default();
        nnue.fill_accumulators(board);
        nnue
    }
}

impl NnueEvaluator {
    /// Rebuilds both perspectives from scratch: bias plus one feature per
    /// piece on the board.
    pub fn fill_accumulators(&mut self, board: &BoardState) {
        self.white_mirrored = board.king_square(Color::White).on_mirrored_half();
        self.black_mirrored = board.king_square(Color::Black).on_mirrored_half();
        self.should_white_mirrored = self.white_mirrored;
        self.should_black_mirrored = self.black_mirrored;

        self.white_acc.0 = NETWORK.feature_bias.0;
        self.black_acc.0 = NETWORK.feature_bias.0;

        for piece in Piece::iter() {
            if piece.is_none() {
                continue;
            }

            for sq in board.piece_bb(piece) {
                let pair = self.feature_pair(piece, sq);
                add(&mut self.white_acc, pair.white);
                add(&mut self.black_acc, pair.black);
            }
        }
    }

    /// Indices in the basis the accumulators currently hold.
    pub fn feature_pair(&self, piece: Piece, sq: Square) -> FeaturePair {
        feature_indices(piece, sq, self.white_mirrored, self.black_mirrored)
    }

    /// A non-capture: one replace per perspective.
    pub fn apply_quiet(&mut self, add_to: FeaturePair, sub_from: FeaturePair) {
        replace(&mut self.white_acc, add_to.white, sub_from.white);
        replace(&mut self.black_acc, add_to.black, sub_from.black);
    }

    pub fn apply_capture(
        &mut self,
        sub_from: FeaturePair,
        add_to: FeaturePair,
        sub_captured: FeaturePair,
    ) {
        capture(
            &mut self.white_acc,
            sub_from.white,
            add_to.white,
            sub_captured.white,
        );
        capture(
            &mut self.black_acc,
            sub_from.black,
            add_to.black,
            sub_captured.black,
        );
    }

    pub fn apply_castle(
        &mut self,
        king_sub: FeaturePair,
        king_add: FeaturePair,
        rook_sub: FeaturePair,
        rook_add: FeaturePair,
    ) {
        castle(
            &mut self.white_acc,
            king_sub.white,
            king_add.white,
            rook_sub.white,
            rook_add.white,
        );
        castle(
            &mut self.black_acc,
            king_sub.black,
            king_add.black,
            rook_sub.black,
            rook_add.black,
        );
    }

    /// Called after a king lands; flags the perspective for a mirror
    /// rebuild when the king changed board half.
    pub fn track_king(&mut self, color: Color, king_sq: Square) {
        match color {
            Color::White => self.should_white_mirrored = king_sq.on_mirrored_half(),
            Color::Black => self.should_black_mirrored = king_sq.on_mirrored_half(),
        }
    }

    fn mirror_white(&mut self, board: &BoardState) {
        self.white_mirrored = self.should_white_mirrored;
        self.white_acc.0 = NETWORK.feature_bias.0;

        for piece in Piece::iter() {
            if piece.is_none() {
                continue;
            }

            for sq in board.piece_bb(piece) {
                add(
                    &mut self.white_acc,
                    feature_indices(piece, sq, self.white_mirrored, false).white,
                );
            }
        }
    }

    fn mirror_black(&mut self, board: &BoardState) {
        self.black_mirrored = self.should_black_mirrored;
        self.black_acc.0 = NETWORK.feature_bias.0;

        for piece in Piece::iter() {
            if piece.is_none() {
                continue;
            }

            for sq in board.piece_bb(piece) {
                add(
                    &mut self.black_acc,
                    feature_indices(piece, sq, false, self.black_mirrored).black,
                );
            }
        }
    }

    /// Reconciles any pending mirror refresh, then runs the bucketed
    /// forward pass. Positive favors the side to move.
    pub fn evaluate(&mut self, board: &BoardState) -> i32 {
        if self.white_mirrored != self.should_white_mirrored {
            self.mirror_white(board);
        }

        if self.black_mirrored != self.should_black_mirrored {
            self.mirror_black(board);
        }

        let bucket = ((board.piece_count() as u32 - 2) / BUCKET_DIVISOR) as usize;

        let (us, them) = if board.white_to_move() {
            (&self.white_acc, &self.black_acc)
        } else {
            (&self.black_acc, &self.white_acc)
        };

        forward(us, them, bucket)
    }
}

fn add(acc: &mut Align64<[i16; LAYER1_SIZE]>, feature: usize) {
    let weights = &NETWORK.feature_weights[feature].0;

    for (x, w) in acc.0.iter_mut().zip(weights) {
        *x += *w;
    }
}

fn replace(acc: &mut Align64<[i16; LAYER1_SIZE]>, add_idx: usize, sub_idx: usize) {
    let add_w = &NETWORK.feature_weights[add_idx].0;
    let sub_w = &NETWORK.feature_weights[sub_idx].0;

    for i in 0..LAYER1_SIZE {
        acc.0[i] += add_w[i] - sub_w[i];
    }
}

fn capture(
    acc: &mut Align64<[i16; LAYER1_SIZE]>,
    sub_from: usize,
    add_to: usize,
    sub_captured: usize,
) {
    let sub_from_w = &NETWORK.feature_weights[sub_from].0;
    let add_to_w = &NETWORK.feature_weights[add_to].0;
    let sub_captured_w = &NETWORK.feature_weights[sub_captured].0;

    for i in 0..LAYER1_SIZE {
        acc.0[i] += add_to_w[i] - sub_from_w[i] - sub_captured_w[i];
    }
}

fn castle(
    acc: &mut Align64<[i16; LAYER1_SIZE]>,
    king_sub: usize,
    king_add: usize,
    rook_sub: usize,
    rook_add: usize,
) {
    let king_sub_w = &NETWORK.feature_weights[king_sub].0;
    let king_add_w = &NETWORK.feature_weights[king_add].0;
    let rook_sub_w = &NETWORK.feature_weights[rook_sub].0;
    let rook_add_w = &NETWORK.feature_weights[rook_add].0;

    for i in 0..LAYER1_SIZE {
        acc.0[i] += king_add_w[i] - king_sub_w[i] + rook_add_w[i] - rook_sub_w[i];
    }
}

fn crelu(x: i16) -> i32 {
    (x as i32).clamp(0, QA)
}

fn forward(
    us: &Align64<[i16; LAYER1_SIZE]>,
    them: &Align64<[i16; LAYER1_SIZE]>,
    bucket: usize,
) -> i32 {
    let [us_weights, them_weights] = &NETWORK.output_weights[bucket];
    let mut sum = 0i32;

    for i in 0..LAYER1_SIZE {
        sum += crelu(us.0[i]) * us_weights.0[i] as i32 + crelu(them.0[i]) * them_weights.0[i] as i32;
    }

    (sum + NETWORK.output_bias[bucket]) * EVAL_SCALE / QAB
}
