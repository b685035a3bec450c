use super::searcher::{SearchResult, Searcher};
use super::tt::{DEFAULT_TT_ENTRIES, TranspositionTable};
use crate::chess::game::GameState;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Coordinates a pool of searchers over one shared transposition table.
/// Each search clones the board into every thread; the table and the
/// stop flag are the only shared state. Deadlines run on a timer thread
/// holding a nonce, so a late timer can never cancel a newer search.
pub struct ParallelSearcher {
    searchers: Vec<Searcher>,
    tt: Arc<TranspositionTable>,
    stop: Arc<AtomicBool>,
    prev_search_id: Arc<AtomicU64>,
}

impl Default for ParallelSearcher {
    fn default() -> Self {
        ParallelSearcher::new()
    }
}

impl ParallelSearcher {
    pub fn new() -> Self {
        Self::with_table_entries(DEFAULT_TT_ENTRIES)
    }

    pub fn with_table_entries(entries: usize) -> Self {
        let tt = Arc::new(TranspositionTable::new(entries));
        let stop = Arc::new(AtomicBool::new(false));
        let searchers = vec![Searcher::new(Arc::clone(&tt), Arc::clone(&stop))];

        ParallelSearcher {
            searchers,
            tt,
            stop,
            prev_search_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Pool size is clamped to the machine; at least one searcher lives.
    pub fn set_threads(&mut self, threads: usize) {
        let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
        let threads = threads.clamp(1, cores);

        self.searchers = (0..threads)
            .map(|_| Searcher::new(Arc::clone(&self.tt), Arc::clone(&self.stop)))
            .collect();
    }

    pub fn thread_count(&self) -> usize {
        self.searchers.len()
    }

    /// Replaces the shared table; the searchers are rebuilt around it.
    pub fn set_table_entries(&mut self, entries: usize) {
        self.tt = Arc::new(TranspositionTable::new(entries));
        let threads = self.searchers.len();

        self.searchers = (0..threads)
            .map(|_| Searcher::new(Arc::clone(&self.tt), Arc::clone(&self.stop)))
            .collect();
    }

    pub fn clear_table(&self) {
        self.tt.clear();
    }

    pub fn hashfull(&self) -> usize {
        self.tt.hashfull()
    }

    /// Idempotent halt broadcast; every searcher observes it at its next
    /// node boundary.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Search until the deadline. A detached timer raises the stop flag
    /// when `think_millis` elapses, but only if its nonce still matches
    /// the current search.
    pub fn time_bound_search(&mut self, state: &GameState, think_millis: u64) -> SearchResult {
        let id = self.begin_search();
        let stop = Arc::clone(&self.stop);
        let prev_search_id = Arc::clone(&self.prev_search_id);

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(think_millis));

            if prev_search_id.load(Ordering::Relaxed) == id {
                stop.store(true, Ordering::Relaxed);
            }
        });

        self.run(state, None, None)
    }

    pub fn depth_bound_search(&mut self, state: &GameState, depth: i32) -> SearchResult {
        self.begin_search();
        self.run(state, None, Some(depth))
    }

    /// With a single thread this short-circuits past the broadcast and
    /// aggregation entirely.
    pub fn node_bound_search(
        &mut self,
        state: &GameState,
        node_limit: u64,
        max_depth: i32,
    ) -> SearchResult {
        self.begin_search();

        if self.searchers.len() == 1 {
            let searcher = &mut self.searchers[0];
            searcher.init(0, state.board());
            return searcher.search(Some(node_limit), Some(max_depth));
        }

        self.run(state, Some(node_limit), Some(max_depth))
    }

    /// Mints the nonce that invalidates any timer still in flight from an
    /// earlier search, then arms the stop flag for this one.
    fn begin_search(&mut self) -> u64 {
        let id = self.prev_search_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.stop.store(false, Ordering::Relaxed);
        id
    }

    fn run(
        &mut self,
        state: &GameState,
        node_limit: Option<u64>,
        max_depth: Option<i32>,
    ) -> SearchResult {
        let board = state.board().clone();

        let results: Vec<SearchResult> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .searchers
                .iter_mut()
                .enumerate()
                .map(|(seed, searcher)| {
                    let board = &board;

                    scope.spawn(move || {
                        searcher.init(seed as u64, board);
                        searcher.search(node_limit, max_depth)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| handle.join().expect("searcher thread panicked"))
                .collect()
        });

        reconcile(&results)
    }
}

/// Picks the final answer across threads by vote: each thread adds
/// `(score − worst) · depth` to its move's slot, and the thread whose
/// move gathered the most weight wins. Ties keep the earliest thread.
/// Node counts are summed over the whole pool.
pub fn reconcile(results: &[SearchResult]) -> SearchResult {
    assert!(!results.is_empty());

    let worst = results.iter().map(|r| r.score).min().unwrap_or(0);
    let mut votes = [0i64; 64 * 64];

    for result in results {
        if !result.best.is_null() {
            votes[result.best.from_to_index()] +=
                i64::from(result.score - worst) * i64::from(result.depth);
        }
    }

    let mut winner = &results[0];

    for result in &results[1..] {
        if result.best.is_null() {
            continue;
        }

        if winner.best.is_null()
            || votes[result.best.from_to_index()] > votes[winner.best.from_to_index()]
        {
            winner = result;
        }
    }

    SearchResult {
        nodes: results.iter().map(|r| r.nodes).sum(),
        ..*winner
    }
}
