use super::tt::{Bound, TranspositionTable};
use super::{INF, MATE_BOUND, MAX_PLY};
use crate::chess::board::BoardState;
use crate::chess::movegen::generate;
use crate::chess::moves::{Move, MoveKind, MoveList};
use crate::chess::types::Piece;
use crate::chess::util::rand;
use crate::nn::evaluator::NnueEvaluator;
use arrayvec::ArrayVec;
use debug_unwraps::DebugUnwrapExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One thread's answer: principal move, expected reply, the depth the
/// iteration completed at, its score and the nodes visited.
#[derive(Copy, Clone, Debug)]
pub struct SearchResult {
    pub best: Move,
    pub ponder: Move,
    pub depth: i32,
    pub score: i32,
    pub nodes: u64,
}

#[derive(Clone)]
struct Node {
    board: BoardState,
    nnue: NnueEvaluator,
}

type ScoredMoves = ArrayVec<(Move, i32), 256>;

/// Single-thread iterative-deepening alpha-beta driver. Owns its board
/// and evaluator stack outright; the transposition table is the only
/// state it shares with its siblings, plus the stop flag it polls.
pub struct Searcher {
    tt: Arc<TranspositionTable>,
    stop: Arc<AtomicBool>,
    seed: u64,
    stack: Vec<Node>,
    pv: Vec<ArrayVec<Move, MAX_PLY>>,
    nodes: u64,
    node_limit: u64,
    root_depth: i32,
    stopped: bool,
}

impl Searcher {
    pub fn new(tt: Arc<TranspositionTable>, stop: Arc<AtomicBool>) -> Self {
        Searcher {
            tt,
            stop,
            seed: 0,
            stack: Vec::with_capacity(MAX_PLY + 2),
            pv: vec![ArrayVec::new(); MAX_PLY + 2],
            nodes: 0,
            node_limit: u64::MAX,
            root_depth: 1,
            stopped: false,
        }
    }

    /// Resets counters and bootstraps the evaluator against this board.
    /// The seed de-correlates helper threads through ordering jitter.
    pub fn init(&mut self, seed: u64, board: &BoardState) {
        self.seed = seed;
        self.nodes = 0;
        self.stopped = false;
        self.stack.clear();
        self.stack.push(Node {
            board: board.clone(),
            nnue: NnueEvaluator::from(board),
        });

        for line in &mut self.pv {
            line.clear();
        }
    }

    /// Idempotent, thread-safe halt request; observed between nodes.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn depth_bound_search(&mut self, depth: i32) -> SearchResult {
        self.search(None, Some(depth))
    }

    /// Iterative deepening until the stop flag, the node cap or the depth
    /// cap fires. Depth 1 always completes, so a cancelled search still
    /// carries a valid move.
    pub fn search(&mut self, node_limit: Option<u64>, max_depth: Option<i32>) -> SearchResult {
        self.node_limit = node_limit.unwrap_or(u64::MAX);
        let max_depth = max_depth
            .unwrap_or(MAX_PLY as i32 - 1)
            .clamp(1, MAX_PLY as i32 - 1);

        let mut result = SearchResult {
            best: Move::NULL,
            ponder: Move::NULL,
            depth: 0,
            score: 0,
            nodes: 0,
        };

        for depth in 1..=max_depth {
            self.root_depth = depth;
            let score = self.negamax(depth, 0, -INF, INF);

            if self.stopped {
                break;
            }

            if self.pv[0].is_empty() {
                // No legal moves at the root; report the terminal score.
                result.score = score;
                break;
            }

            result.best = unsafe { self.pv[0].first().copied().debug_unwrap_unchecked() };
            result.ponder = self.pv[0].get(1).copied().unwrap_or(Move::NULL);
            result.depth = depth;
            result.score = score;

            if self.nodes >= self.node_limit {
                break;
            }
        }

        result.nodes = self.nodes;
        result
    }

    fn negamax(&mut self, depth: i32, ply: usize, mut alpha: i32, beta: i32) -> i32 {
        if self.halted() {
            return 0;
        }

        let board = &self.stack[ply].board;
        let hash = board.hash();
        let in_check = board.in_check();

        if ply > 0
            && (board.halfmove_clock() >= 100
                || board.insufficient_mating_material()
                || self.seen_in_branch(ply, hash))
        {
            return 0;
        }

        if ply >= MAX_PLY - 1 {
            return self.static_eval(ply);
        }

        let mut tt_move = Move::NULL;

        if let Some(entry) = self.tt.probe(hash, ply as u32) {
            tt_move = entry.mv;

            if ply > 0 && entry.depth >= depth {
                match entry.bound {
                    Bound::Exact => return entry.score,
                    Bound::Lower if entry.score >= beta => return entry.score,
                    Bound::Upper if entry.score <= alpha => return entry.score,
                    _ => {}
                }
            }
        }

        if depth <= 0 {
            return self.quiescence(ply, alpha, beta);
        }

        // Null move: hand the opponent a free tempo; a fail-high with
        // reduced depth is trusted outside pawn endings and checks.
        if ply > 0 && depth >= 3 && !in_check && self.has_non_pawn_material(ply) {
            self.make_null(ply);
            let score = -self.negamax(depth - 3, ply + 1, -beta, -beta + 1);
            self.unmake(ply);

            if self.stopped {
                return 0;
            }

            if score >= beta {
                return beta;
            }
        }

        let mut pseudo = MoveList::new();
        generate(&self.stack[ply].board, &mut pseudo, false);
        let mut scored = self.score_moves(&pseudo, tt_move);

        let original_alpha = alpha;
        let mut best_score = -INF;
        let mut best_move = Move::NULL;
        let mut any_legal = false;

        while let Some(mv) = take_best(&mut scored) {
            if !self.make(ply, mv) {
                continue;
            }

            any_legal = true;
            self.nodes += 1;

            let score = -self.negamax(depth - 1, ply + 1, -beta, -alpha);
            self.unmake(ply);

            if self.stopped {
                return 0;
            }

            if score > best_score {
                best_score = score;

                if score > alpha {
                    alpha = score;
                    best_move = mv;
                    self.update_pv(ply, mv);

                    if score >= beta {
                        break;
                    }
                }
            }
        }

        if !any_legal {
            return if in_check { -INF + ply as i32 } else { 0 };
        }

        let bound = if best_score >= beta {
            Bound::Lower
        } else if best_score > original_alpha {
            Bound::Exact
        } else {
            Bound::Upper
        };

        self.tt.store(hash, best_move, depth, best_score, bound, ply as u32);
        best_score
    }

    fn quiescence(&mut self, ply: usize, mut alpha: i32, beta: i32) -> i32 {
        if self.halted() {
            return 0;
        }

        let stand_pat = self.static_eval(ply);

        if ply >= MAX_PLY - 1 || stand_pat >= beta {
            return stand_pat;
        }

        alpha = alpha.max(stand_pat);

        let mut pseudo = MoveList::new();
        generate(&self.stack[ply].board, &mut pseudo, true);
        let mut scored = self.score_moves(&pseudo, Move::NULL);

        let mut best_score = stand_pat;

        while let Some(mv) = take_best(&mut scored) {
            if !self.make(ply, mv) {
                continue;
            }

            self.nodes += 1;
            let score = -self.quiescence(ply + 1, -beta, -alpha);
            self.unmake(ply);

            if self.stopped {
                return 0;
            }

            if score > best_score {
                best_score = score;

                if score > alpha {
                    alpha = score;

                    if score >= beta {
                        break;
                    }
                }
            }
        }

        best_score
    }

    /// Stop and node caps are polled at every node, but never while the
    /// first iteration is still running; that one is always carried home.
    fn halted(&mut self) -> bool {
        if self.stopped {
            return true;
        }

        if self.root_depth > 1
            && (self.nodes >= self.node_limit || self.stop.load(Ordering::Relaxed))
        {
            self.stopped = true;
        }

        self.stopped
    }

    fn make(&mut self, ply: usize, mv: Move) -> bool {
        debug_assert_eq!(self.stack.len(), ply + 1);

        let mut node = self.stack[ply].clone();

        if !node.board.apply(&mut node.nnue, mv) {
            return false;
        }

        self.stack.push(node);
        self.pv[ply + 1].clear();
        true
    }

    fn make_null(&mut self, ply: usize) {
        let mut node = self.stack[ply].clone();
        node.board.apply_null_move();
        self.stack.push(node);
        self.pv[ply + 1].clear();
    }

    fn unmake(&mut self, ply: usize) {
        self.stack.truncate(ply + 1);
    }

    /// Static evaluations stay strictly inside the mate-score range.
    fn static_eval(&mut self, ply: usize) -> i32 {
        let Node { board, nnue } = &mut self.stack[ply];
        nnue.evaluate(board).clamp(-MATE_BOUND + 1, MATE_BOUND - 1)
    }

    fn seen_in_branch(&self, ply: usize, hash: u64) -> bool {
        self.stack[..ply]
            .iter()
            .rev()
            .skip(1)
            .step_by(2)
            .any(|node| node.board.hash() == hash)
    }

    fn has_non_pawn_material(&self, ply: usize) -> bool {
        let board = &self.stack[ply].board;

        let (own, pawn, king) = if board.white_to_move() {
            (board.white_pieces(), Piece::WhitePawn, Piece::WhiteKing)
        } else {
            (board.black_pieces(), Piece::BlackPawn, Piece::BlackKing)
        };

        (own ^ board.piece_bb(pawn) ^ board.piece_bb(king)).any()
    }

    fn update_pv(&mut self, ply: usize, mv: Move) {
        let child = self.pv[ply + 1].clone();
        let line = &mut self.pv[ply];

        line.clear();
        line.push(mv);

        for follow_up in child {
            if line.is_full() {
                break;
            }
            line.push(follow_up);
        }
    }

    fn score_moves(&self, moves: &MoveList, tt_move: Move) -> ScoredMoves {
        let mut jitter = self.seed;
        let mut scored = ScoredMoves::new();

        for &mv in moves {
            let score = if mv == tt_move {
                1_000_000
            } else if mv.is_capture() {
                // MVV-LVA: victims first, cheapest attacker first.
                100_000 + mv.captured().piece_type() as i32 * 16 - mv.piece().piece_type() as i32
            } else if mv.kind() == MoveKind::PromoQueen {
                90_000
            } else if self.seed != 0 {
                // Helper threads shuffle their quiet ordering a little so
                // the pool does not explore identical trees.
                jitter = rand(jitter);
                (jitter & 0xf) as i32
            } else {
                0
            };

            scored.push((mv, score));
        }

        scored
    }

    #[cfg(test)]
    pub(crate) fn root_board(&self) -> &BoardState {
        &self.stack[0].board
    }

    #[cfg(test)]
    pub(crate) fn nodes(&self) -> u64 {
        self.nodes
    }
}

fn take_best(scored: &mut ScoredMoves) -> Option<Move> {
    if scored.is_empty() {
        return None;
    }

    let mut best = 0;

    for i in 1..scored.len() {
        if scored[i].1 > scored[best].1 {
            best = i;
        }
    }

    Some(scored.swap_remove(best).0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::util::FEN_START;
    use crate::search::MATE_BOUND;

    fn searcher_with_table() -> Searcher {
        let tt = Arc::new(TranspositionTable::new(1 << 14));
        let stop = Arc::new(AtomicBool::new(false));
        Searcher::new(tt, stop)
    }

    fn init_from(searcher: &mut Searcher, fen: &str) {
        let board = BoardState::try_from(fen).unwrap();
        searcher.init(0, &board);
    }

    #[test]
    fn test_finds_mate_in_one() {
        let mut searcher = searcher_with_table();
        init_from(&mut searcher, "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");

        let result = searcher.depth_bound_search(3);

        assert_eq!(result.best.to_string(), "a1a8");
        assert!(result.score >= MATE_BOUND);
        assert!(result.nodes > 0);
        assert_eq!(result.depth, 3);
    }

    #[test]
    fn test_finds_mate_in_two() {
        let mut searcher = searcher_with_table();

        // Rook ladder: 1.Kg6 Kg8 2.Ra8# is the only forced mate.
        init_from(&mut searcher, "7k/8/5K2/8/8/8/8/R7 w - - 0 1");
        let result = searcher.depth_bound_search(4);

        assert_eq!(result.best.to_string(), "f6g6");
        assert_eq!(result.score, INF - 3);
    }

    #[test]
    fn test_no_legal_moves_reports_mate_score() {
        let mut searcher = searcher_with_table();

        // Back-rank mate already on the board; black has no move.
        init_from(&mut searcher, "R5k1/5ppp/8/8/8/8/8/K7 b - - 0 1");
        let result = searcher.depth_bound_search(3);

        assert!(result.best.is_null());
        assert!(result.score <= -MATE_BOUND);
    }

    #[test]
    fn test_stop_before_start_still_yields_a_move() {
        let mut searcher = searcher_with_table();
        init_from(&mut searcher, FEN_START);

        searcher.stop();
        let result = searcher.search(None, None);

        // Depth 1 ignores the flag, so the result is shallow but valid.
        assert!(!result.best.is_null());
        assert_eq!(result.depth, 1);
    }

    #[test]
    fn test_node_bound_is_respected() {
        let mut searcher = searcher_with_table();
        init_from(&mut searcher, FEN_START);

        let result = searcher.search(Some(5_000), None);

        assert!(!result.best.is_null());
        assert!(result.nodes >= 5_000 || result.depth >= MAX_PLY as i32 - 1);
        // The cap is polled per node, so the overshoot stays small
        // relative to a full extra iteration.
        assert!(result.nodes < 5_000_000);
    }

    #[test]
    fn test_search_is_deterministic_for_same_seed() {
        let board = BoardState::try_from(FEN_START).unwrap();

        let mut first = searcher_with_table();
        first.init(0, &board);
        let a = first.depth_bound_search(4);

        let mut second = searcher_with_table();
        second.init(0, &board);
        let b = second.depth_bound_search(4);

        assert_eq!(a.best, b.best);
        assert_eq!(a.score, b.score);
        assert_eq!(a.nodes, b.nodes);
    }

    #[test]
    fn test_init_resets_state() {
        let mut searcher = searcher_with_table();
        init_from(&mut searcher, FEN_START);
        let _ = searcher.depth_bound_search(3);
        assert!(searcher.nodes() > 0);

        init_from(&mut searcher, "4k3/8/8/3q4/8/8/8/3QK3 b - - 0 1");
        assert_eq!(searcher.nodes(), 0);
        assert!(!searcher.root_board().white_to_move());
    }
}
