use super::MATE_BOUND;
use crate::chess::moves::Move;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default slot count, a power of two so indexing is a mask.
pub const DEFAULT_TT_ENTRIES: usize = 1 << 24;

#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[rustfmt::skip]
pub enum Bound {
    Exact = 0, Lower = 1, Upper = 2
}

#[derive(Copy, Clone, Debug)]
pub struct TtEntry {
    pub mv: Move,
    pub score: i32,
    pub depth: i32,
    pub bound: Bound,
}

#[derive(Default)]
struct Slot {
    key: AtomicU64,
    data: AtomicU64,
}

/// Shared, lock-free transposition table. All searchers read and write
/// concurrently with relaxed atomics; a slot stores `hash ^ data` as its
/// key, so a torn or raced pair fails verification and reads as a miss.
/// That check runs on every probe; nothing derived from a slot is used
/// without it.
pub struct TranspositionTable {
    slots: Box<[Slot]>,
    mask: usize,
}

impl TranspositionTable {
    pub fn new(entries: usize) -> Self {
        let len = entries.next_power_of_two().max(1024);
        let slots: Vec<Slot> = (0..len).map(|_| Slot::default()).collect();

        TranspositionTable {
            slots: slots.into_boxed_slice(),
            mask: len - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot(&self, hash: u64) -> &Slot {
        unsafe { self.slots.get_unchecked(hash as usize & self.mask) }
    }

    pub fn probe(&self, hash: u64, ply: u32) -> Option<TtEntry> {
        let slot = self.slot(hash);
        let key = slot.key.load(Ordering::Relaxed);
        let data = slot.data.load(Ordering::Relaxed);

        if key ^ data != hash {
            return None;
        }

        let bound = match data >> 40 & 0b11 {
            0 => Bound::Exact,
            1 => Bound::Lower,
            2 => Bound::Upper,
            _ => return None,
        };

        Some(TtEntry {
            mv: Move::from_bits(data as u32),
            score: score_from_tt((data >> 48) as u16 as i16 as i32, ply),
            depth: (data >> 32 & 0xff) as i32,
            bound,
        })
    }

    pub fn store(&self, hash: u64, mv: Move, depth: i32, score: i32, bound: Bound, ply: u32) {
        let slot = self.slot(hash);

        // Depth-preferred replacement; exact entries always land.
        if bound != Bound::Exact {
            let key = slot.key.load(Ordering::Relaxed);
            let data = slot.data.load(Ordering::Relaxed);

            if key ^ data == hash && (data >> 32 & 0xff) as i32 > depth {
                return;
            }
        }

        let depth = depth.clamp(0, 255) as u64;
        let score = score_to_tt(score, ply).clamp(i16::MIN as i32, i16::MAX as i32);

        let data = mv.bits() as u64
            | depth << 32
            | (bound as u64) << 40
            | ((score as i16 as u16) as u64) << 48;

        slot.key.store(hash ^ data, Ordering::Relaxed);
        slot.data.store(data, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for slot in &self.slots {
            slot.key.store(0, Ordering::Relaxed);
            slot.data.store(0, Ordering::Relaxed);
        }
    }

    /// Occupancy of the first thousand slots, in permille.
    pub fn hashfull(&self) -> usize {
        self.slots
            .iter()
            .take(1000)
            .filter(|slot| slot.data.load(Ordering::Relaxed) != 0)
            .count()
    }
}

/// Mate scores are stored relative to the probing node, not the root.
fn score_to_tt(score: i32, ply: u32) -> i32 {
    if score >= MATE_BOUND {
        score + ply as i32
    } else if score <= -MATE_BOUND {
        score - ply as i32
    } else {
        score
    }
}

fn score_from_tt(score: i32, ply: u32) -> i32 {
    if score >= MATE_BOUND {
        score - ply as i32
    } else if score <= -MATE_BOUND {
        score + ply as i32
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chess::moves::MoveKind;
    use crate::chess::types::{Piece, Square};
    use crate::search::INF;

    fn some_move() -> Move {
        Move::new(
            Square::E2,
            Square::E4,
            Piece::WhitePawn,
            Piece::None,
            MoveKind::DoublePush,
        )
    }

    #[test]
    fn test_store_and_probe() {
        let tt = TranspositionTable::new(1 << 12);
        let hash = 0xdead_beef_cafe_f00d;

        assert!(tt.probe(hash, 0).is_none());

        tt.store(hash, some_move(), 7, 42, Bound::Exact, 0);

        let entry = tt.probe(hash, 0).expect("stored entry must probe back");
        assert_eq!(entry.mv, some_move());
        assert_eq!(entry.depth, 7);
        assert_eq!(entry.score, 42);
        assert_eq!(entry.bound, Bound::Exact);

        // A different hash mapping to the same slot fails verification.
        let aliased = hash ^ (1 << 60);
        assert!(tt.probe(aliased, 0).is_none());
    }

    #[test]
    fn test_depth_preferred_replacement() {
        let tt = TranspositionTable::new(1 << 12);
        let hash = 0x1234_5678_9abc_def0;

        tt.store(hash, some_move(), 9, 10, Bound::Lower, 0);
        tt.store(hash, Move::NULL, 3, -5, Bound::Upper, 0);

        // The shallower non-exact entry must not replace the deeper one.
        let entry = tt.probe(hash, 0).unwrap();
        assert_eq!(entry.depth, 9);

        // An exact entry always replaces.
        tt.store(hash, some_move(), 2, 1, Bound::Exact, 0);
        assert_eq!(tt.probe(hash, 0).unwrap().depth, 2);
    }

    #[test]
    fn test_mate_score_ply_adjustment() {
        let tt = TranspositionTable::new(1 << 12);
        let hash = 0x0bad_cafe_0bad_cafe;
        let mate_in_3 = INF - 3;

        // Stored from ply 2, probed from ply 4: the distance shifts.
        tt.store(hash, some_move(), 12, mate_in_3, Bound::Exact, 2);
        let entry = tt.probe(hash, 4).unwrap();
        assert_eq!(entry.score, mate_in_3 + 2 - 4);

        // Non-mate scores pass through untouched.
        tt.store(hash, some_move(), 12, 37, Bound::Exact, 2);
        assert_eq!(tt.probe(hash, 6).unwrap().score, 37);
    }

    #[test]
    fn test_clear() {
        let tt = TranspositionTable::new(1 << 12);
        let hash = 0x5555_aaaa_5555_aaaa;

        tt.store(hash, some_move(), 5, 0, Bound::Exact, 0);
        assert!(tt.probe(hash, 0).is_some());
        assert!(tt.hashfull() <= 1000);

        tt.clear();
        assert!(tt.probe(hash, 0).is_none());
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_rounds_to_power_of_two() {
        assert_eq!(TranspositionTable::new(5000).len(), 8192);
        assert_eq!(TranspositionTable::new(1 << 14).len(), 1 << 14);
    }
}
