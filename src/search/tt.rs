//! The shared transposition table.
//!
//! Entries are 16 bytes and live in 64-byte clusters of four. Each entry
//! is a pair of relaxed atomics, so an optional lazy-SMP extension can
//! share the table without locks; a torn read produces a key mismatch
//! and is simply ignored. Mate scores are stored relative to the probing
//! node so they stay meaningful across paths of different lengths.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::board::Move;
use crate::search::{MATE, MATE_THRESHOLD};

/// How a stored score bounds the true value
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Bound {
    Invalid,
    Exact,
    UpperBound,
    LowerBound,
}

impl Bound {
    const fn from_bits(bits: u64) -> Bound {
        match bits & 0b11 {
            1 => Bound::Exact,
            2 => Bound::UpperBound,
            3 => Bound::LowerBound,
            _ => Bound::Invalid,
        }
    }

    const fn bits(self) -> u64 {
        match self {
            Bound::Invalid => 0,
            Bound::Exact => 1,
            Bound::UpperBound => 2,
            Bound::LowerBound => 3,
        }
    }
}

/// A decoded table hit
#[derive(Clone, Copy, Debug)]
pub struct TtHit {
    pub mv: Move,
    pub score: i32,
    pub raw_eval: i32,
    pub depth: i32,
    pub bound: Bound,
    pub tt_pv: bool,
}

impl TtHit {
    /// Does this entry alone justify a cutoff at `depth` in `(alpha, beta)`?
    #[must_use]
    pub fn cutoff_permitted(&self, depth: i32, alpha: i32, beta: i32) -> bool {
        if self.depth < depth {
            return false;
        }
        match self.bound {
            Bound::Exact => true,
            Bound::UpperBound => self.score <= alpha,
            Bound::LowerBound => self.score >= beta,
            Bound::Invalid => false,
        }
    }
}

/// One 16-byte entry as two atomics:
/// - `meta`: key32 << 32 | move16 << 16 | depth8 << 8 | ttpv << 2 | bound2
/// - `data`: generation16 << 32 | raw_eval16 << 16 | score16
#[derive(Default)]
struct Entry {
    meta: AtomicU64,
    data: AtomicU64,
}

#[repr(align(64))]
#[derive(Default)]
struct Cluster {
    entries: [Entry; 4],
}

const CLUSTER_BYTES: usize = 64;

pub struct TranspositionTable {
    clusters: Vec<Cluster>,
    mask: usize,
    generation: u16,
}

impl TranspositionTable {
    /// Allocate a table of roughly `megabytes`; the cluster count is
    /// rounded down to a power of two
    #[must_use]
    pub fn new(megabytes: usize) -> Self {
        let mut tt = TranspositionTable {
            clusters: Vec::new(),
            mask: 0,
            generation: 0,
        };
        tt.resize(megabytes).expect("initial table allocation fits");
        tt
    }

    /// Resize to `megabytes`, clearing contents. On allocation failure
    /// the previous table is kept and an error returned.
    pub fn resize(&mut self, megabytes: usize) -> Result<(), ()> {
        // Round the cluster budget down to a power of two; an exact
        // power-of-two budget is kept as is
        let budget = megabytes.max(1) * 1024 * 1024 / CLUSTER_BYTES;
        let count = (1usize << budget.ilog2()).max(1024);

        let mut clusters = Vec::new();
        if clusters.try_reserve_exact(count).is_err() {
            return Err(());
        }
        clusters.resize_with(count, Cluster::default);

        self.clusters = clusters;
        self.mask = count - 1;
        self.generation = 0;
        Ok(())
    }

    /// Size of the current allocation in megabytes
    #[must_use]
    pub fn size_megabytes(&self) -> usize {
        self.clusters.len() * CLUSTER_BYTES / (1024 * 1024)
    }

    /// Bump the generation; called once per search
    pub fn new_search(&mut self) {
        self.generation = self.generation.saturating_add(1);
    }

    /// Zero every cluster, split across `threads` workers
    pub fn clear(&mut self, threads: usize) {
        let threads = threads.max(1);
        let chunk = self.clusters.len().div_ceil(threads);
        std::thread::scope(|scope| {
            for slice in self.clusters.chunks(chunk) {
                scope.spawn(move || {
                    for cluster in slice {
                        for entry in &cluster.entries {
                            entry.meta.store(0, Ordering::Relaxed);
                            entry.data.store(0, Ordering::Relaxed);
                        }
                    }
                });
            }
        });
        self.generation = 0;
    }

    #[inline]
    fn cluster_index(&self, hash: u64) -> usize {
        (hash as usize) & self.mask
    }

    #[inline]
    const fn stored_key(hash: u64) -> u64 {
        hash >> 32
    }

    /// Hint the CPU to pull the cluster for `hash` into cache
    #[inline]
    pub fn prefetch(&self, hash: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let ptr = std::ptr::addr_of!(self.clusters[self.cluster_index(hash)]);
            _mm_prefetch(ptr.cast::<i8>(), _MM_HINT_T0);
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = hash;
        }
    }

    /// Look up `hash`; `ply` re-bases stored mate scores onto this node
    #[must_use]
    pub fn probe(&self, hash: u64, ply: usize) -> Option<TtHit> {
        let cluster = &self.clusters[self.cluster_index(hash)];
        let key = Self::stored_key(hash);

        for entry in &cluster.entries {
            let meta = entry.meta.load(Ordering::Relaxed);
            if meta >> 32 != key || Bound::from_bits(meta) == Bound::Invalid {
                continue;
            }
            let data = entry.data.load(Ordering::Relaxed);

            let mut score = i32::from(data as u16 as i16);
            if score > MATE_THRESHOLD {
                score -= ply as i32;
            } else if score < -MATE_THRESHOLD {
                score += ply as i32;
            }

            return Some(TtHit {
                mv: Move::unpack((meta >> 16) as u16),
                score,
                raw_eval: i32::from((data >> 16) as u16 as i16),
                depth: ((meta >> 8) & 0xFF) as i32,
                bound: Bound::from_bits(meta),
                tt_pv: meta & 0b100 != 0,
            });
        }
        None
    }

    /// Store a search result. The slot is the key match, an invalid
    /// entry, or the lowest-quality occupant; it is only overwritten when
    /// the key differs, the new bound is exact, or the new depth is close
    /// enough (`depth + 3 + 2*ttPv >= old depth`).
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        hash: u64,
        depth: i32,
        score: i32,
        bound: Bound,
        raw_eval: i32,
        mv: Move,
        ply: usize,
        tt_pv: bool,
    ) {
        debug_assert!(score.abs() < MATE);
        let cluster = &self.clusters[self.cluster_index(hash)];
        let key = Self::stored_key(hash);

        // Choose the victim slot
        let mut candidate = 0;
        let mut worst_quality = i64::MAX;
        for (i, entry) in cluster.entries.iter().enumerate() {
            let meta = entry.meta.load(Ordering::Relaxed);
            if Bound::from_bits(meta) == Bound::Invalid || meta >> 32 == key {
                candidate = i;
                break;
            }
            let data = entry.data.load(Ordering::Relaxed);
            let quality = 2 * i64::from((data >> 32) as u16) + ((meta >> 8) & 0xFF) as i64;
            if quality < worst_quality {
                worst_quality = quality;
                candidate = i;
            }
        }

        let entry = &cluster.entries[candidate];
        let old_meta = entry.meta.load(Ordering::Relaxed);
        let same_key = old_meta >> 32 == key && Bound::from_bits(old_meta) != Bound::Invalid;
        let replaceable = !same_key
            || bound == Bound::Exact
            || depth + 3 + 2 * i32::from(tt_pv) >= ((old_meta >> 8) & 0xFF) as i32;
        if !replaceable {
            return;
        }

        // Keep the old move when refreshing the same position moveless
        let stored_move = if mv.is_empty() && same_key {
            (old_meta >> 16) as u16
        } else {
            mv.pack()
        };

        // Re-base mate scores: distance from this node, not from the root
        let stored_score = if score > MATE_THRESHOLD {
            score + ply as i32
        } else if score < -MATE_THRESHOLD {
            score - ply as i32
        } else {
            score
        };

        let meta = (key << 32)
            | (u64::from(stored_move) << 16)
            | ((depth.clamp(0, 255) as u64) << 8)
            | (u64::from(tt_pv) << 2)
            | bound.bits();
        let data = (u64::from(self.generation) << 32)
            | (u64::from(raw_eval.clamp(-32768, 32767) as i16 as u16) << 16)
            | u64::from(stored_score as i16 as u16);

        entry.meta.store(meta, Ordering::Relaxed);
        entry.data.store(data, Ordering::Relaxed);
    }

    /// Permille of sampled slots holding an entry from this search
    #[must_use]
    pub fn hashfull(&self) -> u32 {
        let sample = self.clusters.len().min(1000);
        let mut used: u32 = 0;
        for cluster in &self.clusters[..sample] {
            for entry in &cluster.entries {
                let meta = entry.meta.load(Ordering::Relaxed);
                if Bound::from_bits(meta) == Bound::Invalid {
                    continue;
                }
                let data = entry.data.load(Ordering::Relaxed);
                if (data >> 32) as u16 == self.generation {
                    used += 1;
                }
            }
        }
        used * 1000 / (sample as u32 * 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;

    #[test]
    fn test_store_probe_roundtrip() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        let mv = Move::new(Square::E1, Square::G1);
        tt.store(0xDEAD_BEEF_1234_5678, 9, 42, Bound::LowerBound, 17, mv, 0, true);

        let hit = tt.probe(0xDEAD_BEEF_1234_5678, 0).expect("stored entry");
        assert_eq!(hit.mv, mv);
        assert_eq!(hit.score, 42);
        assert_eq!(hit.raw_eval, 17);
        assert_eq!(hit.depth, 9);
        assert_eq!(hit.bound, Bound::LowerBound);
        assert!(hit.tt_pv);
    }

    #[test]
    fn test_probe_miss() {
        let tt = TranspositionTable::new(1);
        assert!(tt.probe(0x1234, 0).is_none());
    }

    #[test]
    fn test_negative_scores_roundtrip() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        tt.store(99, 3, -511, Bound::UpperBound, -78, Move::EMPTY, 0, false);
        let hit = tt.probe(99, 0).unwrap();
        assert_eq!(hit.score, -511);
        assert_eq!(hit.raw_eval, -78);
    }

    #[test]
    fn test_mate_scores_rebased_by_ply() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        // Mate found at ply 6: from the root the score is MATE - 10
        let score_at_store = MATE - 10;
        tt.store(7, 12, score_at_store, Bound::Exact, 0, Move::EMPTY, 6, false);

        // Probing from ply 2 must report the mate relative to that node
        let hit = tt.probe(7, 2).unwrap();
        assert_eq!(hit.score, MATE - 10 + 6 - 2);
    }

    #[test]
    fn test_same_key_keeps_move_on_moveless_store() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        let mv = Move::new(Square::E1, Square::F1);
        tt.store(55, 5, 10, Bound::Exact, 0, mv, 0, false);
        tt.store(55, 9, 20, Bound::Exact, 0, Move::EMPTY, 0, false);
        let hit = tt.probe(55, 0).unwrap();
        assert_eq!(hit.mv, mv);
        assert_eq!(hit.depth, 9);
    }

    #[test]
    fn test_shallow_store_does_not_evict_deep_same_key() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        tt.store(55, 20, 10, Bound::LowerBound, 0, Move::EMPTY, 0, false);
        // depth 5 + 3 < 20: not replaceable with a non-exact bound
        tt.store(55, 5, -5, Bound::LowerBound, 0, Move::EMPTY, 0, false);
        assert_eq!(tt.probe(55, 0).unwrap().depth, 20);
        // ... but an exact result always replaces
        tt.store(55, 5, -5, Bound::Exact, 0, Move::EMPTY, 0, false);
        assert_eq!(tt.probe(55, 0).unwrap().depth, 5);
    }

    #[test]
    fn test_clear_wipes_entries() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        tt.store(123, 4, 1, Bound::Exact, 0, Move::EMPTY, 0, false);
        tt.clear(4);
        assert!(tt.probe(123, 0).is_none());
        assert_eq!(tt.hashfull(), 0);
    }

    #[test]
    fn test_hashfull_grows() {
        let mut tt = TranspositionTable::new(1);
        tt.new_search();
        assert_eq!(tt.hashfull(), 0);
        for i in 0..4000u64 {
            tt.store(
                i.wrapping_mul(0x9E37_79B9_7F4A_7C15),
                2,
                0,
                Bound::Exact,
                0,
                Move::EMPTY,
                0,
                false,
            );
        }
        let fill = tt.hashfull();
        assert!(fill > 0 && fill <= 1000);
    }

    #[test]
    fn test_cutoff_rules() {
        let hit = TtHit {
            mv: Move::EMPTY,
            score: 50,
            raw_eval: 0,
            depth: 8,
            bound: Bound::LowerBound,
            tt_pv: false,
        };
        assert!(hit.cutoff_permitted(8, 0, 40)); // score >= beta
        assert!(!hit.cutoff_permitted(8, 0, 60)); // score below beta
        assert!(!hit.cutoff_permitted(9, 0, 40)); // too shallow

        let upper = TtHit {
            bound: Bound::UpperBound,
            ..hit
        };
        assert!(upper.cutoff_permitted(8, 60, 100)); // score <= alpha
        assert!(!upper.cutoff_permitted(8, 40, 100));
    }
}
