//! The accumulator stack and lazy evaluation driver.
//!
//! Each search push allocates a frame recording the move and marks both
//! perspectives stale; the actual hidden-layer work happens on the next
//! `evaluate` call, which walks up from the most recent correct frame
//! per side. A king move that crosses the horizontal mirror line or
//! changes input bucket cannot be patched incrementally; those frames
//! refresh from a per-(side, bucket, half) cache holding the last full
//! accumulator and the piece bitboards that produced it, so the refresh
//! costs only the symmetric difference.

use super::network::NETWORK;
use super::{feature_index, input_bucket, output_bucket, simd, HIDDEN_SIZE, INPUT_BUCKETS};
use crate::board::position::Position;
use crate::board::state::Board;
use crate::board::types::{
    castling_destinations, Color, Move, Piece, PieceKind, Square, MAX_PLY,
};

#[derive(Clone)]
struct Accumulator {
    values: [[i16; HIDDEN_SIZE]; 2],
    correct: [bool; 2],
    king_square: [Square; 2],
    bucket: [usize; 2],
    mv: Move,
    moved: Option<Piece>,
    captured: Option<Piece>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator {
            values: [[0; HIDDEN_SIZE]; 2],
            correct: [false; 2],
            king_square: [Square::E1; 2],
            bucket: [0; 2],
            mv: Move::EMPTY,
            moved: None,
            captured: None,
        }
    }
}

#[derive(Clone)]
struct BucketCacheEntry {
    values: [i16; HIDDEN_SIZE],
    piece_bits: [u64; 12],
}

impl BucketCacheEntry {
    fn fresh() -> Self {
        BucketCacheEntry {
            values: NETWORK.feature_bias.0,
            piece_bits: [0; 12],
        }
    }
}

/// Accumulator stack plus bucket cache; owned by one search worker
pub struct EvaluationState {
    stack: Vec<Accumulator>,
    current: usize,
    /// Indexed by `[side][bucket + mirrored_half * INPUT_BUCKETS]`
    cache: [Vec<BucketCacheEntry>; 2],
}

impl EvaluationState {
    #[must_use]
    pub fn new() -> Self {
        EvaluationState {
            stack: vec![Accumulator::default(); MAX_PLY + 1],
            current: 0,
            cache: [
                vec![BucketCacheEntry::fresh(); 2 * INPUT_BUCKETS],
                vec![BucketCacheEntry::fresh(); 2 * INPUT_BUCKETS],
            ],
        }
    }

    /// Reset to the position's current board; called at the search root
    pub fn reset(&mut self, pos: &Position) {
        self.current = 0;
        for side in [Color::White, Color::Black] {
            Self::refresh_direct(&mut self.stack[0], side, pos.board());
        }
        self.stack[0].mv = Move::EMPTY;
        self.stack[0].moved = None;
        self.stack[0].captured = None;
    }

    /// Record the move just pushed onto `pos`; no hidden-layer work yet
    pub fn push(&mut self, pos: &Position) {
        debug_assert!(self.current + 1 < self.stack.len());
        let (m, moved) = pos
            .previous_move(1)
            .expect("push called after Position::push");
        let before = pos.board_at(1);
        let after = pos.board();

        let captured = if m.is_null() || m.is_castling() {
            None
        } else if m.is_en_passant() {
            Some(Piece::new(PieceKind::Pawn, after.side_to_move()))
        } else {
            before.piece_at(m.to())
        };

        self.current += 1;
        let frame = &mut self.stack[self.current];
        frame.mv = m;
        frame.moved = moved;
        frame.captured = captured;
        frame.correct = [false, false];
        for side in [Color::White, Color::Black] {
            let king = after.king_square(side);
            frame.king_square[side.index()] = king;
            frame.bucket[side.index()] = input_bucket(king, side);
        }
    }

    pub fn pop(&mut self) {
        debug_assert!(self.current > 0);
        self.current -= 1;
    }

    /// Evaluate the current position, catching up both perspectives first.
    /// Infallible: always returns a centipawn-scaled integer.
    #[must_use]
    pub fn evaluate(&mut self, pos: &Position) -> i32 {
        for side in [Color::White, Color::Black] {
            self.make_correct(side, pos);
        }

        let board = pos.board();
        let frame = &self.stack[self.current];
        let (ours, theirs) = match board.side_to_move() {
            Color::White => (&frame.values[0], &frame.values[1]),
            Color::Black => (&frame.values[1], &frame.values[0]),
        };
        NETWORK.forward(
            ours,
            theirs,
            output_bucket(board.occupancy_all().popcount()),
            board.game_phase(),
        )
    }

    /// Reference evaluation from a from-scratch refresh; the incremental
    /// path must agree with this exactly
    #[must_use]
    pub fn evaluate_fresh(pos: &Position) -> i32 {
        let mut frame = Accumulator::default();
        for side in [Color::White, Color::Black] {
            Self::refresh_direct(&mut frame, side, pos.board());
        }
        let board = pos.board();
        let (ours, theirs) = match board.side_to_move() {
            Color::White => (&frame.values[0], &frame.values[1]),
            Color::Black => (&frame.values[1], &frame.values[0]),
        };
        NETWORK.forward(
            ours,
            theirs,
            output_bucket(board.occupancy_all().popcount()),
            board.game_phase(),
        )
    }

    // =========================================================================
    // Catch-up machinery
    // =========================================================================

    fn make_correct(&mut self, side: Color, pos: &Position) {
        if self.stack[self.current].correct[side.index()] {
            return;
        }

        // Walk down to the most recent usable frame: either one that is
        // still correct for this side, or one whose own king move forces
        // a bucket-cache refresh at that height
        let mut start = self.current;
        loop {
            if self.stack[start].correct[side.index()] {
                break;
            }
            if self.refresh_required(start, side) {
                break;
            }
            debug_assert!(start > 0, "frame 0 is always correct after reset");
            start -= 1;
        }

        if !self.stack[start].correct[side.index()] {
            let board = pos.board_at(self.current - start);
            self.refresh_from_cache(start, side, board);
        }
        for i in (start + 1)..=self.current {
            self.update_incrementally(i, side);
        }
    }

    /// Did frame `i`'s move displace this side's king across the mirror
    /// line or into another input bucket?
    fn refresh_required(&self, i: usize, side: Color) -> bool {
        let frame = &self.stack[i];
        match frame.moved {
            Some(p) if p.kind() == PieceKind::King && p.color() == side => {
                let prev = &self.stack[i - 1];
                let si = side.index();
                frame.bucket[si] != prev.bucket[si]
                    || frame.king_square[si].on_left_half() != prev.king_square[si].on_left_half()
            }
            _ => false,
        }
    }

    /// Full refresh of one side straight from the board
    fn refresh_direct(frame: &mut Accumulator, side: Color, board: &Board) {
        let si = side.index();
        let king = board.king_square(side);
        let bucket = input_bucket(king, side);
        frame.values[si] = NETWORK.feature_bias.0;
        for color in [Color::White, Color::Black] {
            for kind in PieceKind::ALL {
                let piece = Piece::new(kind, color);
                for sq in board.pieces(piece) {
                    simd::add_weights(
                        &mut frame.values[si],
                        NETWORK.feature_row(bucket, feature_index(side, king, piece, sq)),
                    );
                }
            }
        }
        frame.king_square[si] = king;
        frame.bucket[si] = bucket;
        frame.correct[si] = true;
    }

    /// Refresh one side of frame `idx` via the bucket cache: patch the
    /// cached accumulator by the symmetric difference against the cached
    /// piece bitboards, then copy it into the frame
    fn refresh_from_cache(&mut self, idx: usize, side: Color, board: &Board) {
        let si = side.index();
        let king = board.king_square(side);
        let bucket = input_bucket(king, side);
        let half = usize::from(!king.on_left_half());
        let entry = &mut self.cache[si][bucket + half * INPUT_BUCKETS];

        let mut piece_index = 0;
        for color in [Color::White, Color::Black] {
            for kind in PieceKind::ALL {
                let piece = Piece::new(kind, color);
                let now = board.pieces(piece).0;
                let cached = entry.piece_bits[piece_index];

                let mut to_add = now & !cached;
                while to_add != 0 {
                    let sq = Square::from_index(to_add.trailing_zeros() as usize);
                    to_add &= to_add - 1;
                    simd::add_weights(
                        &mut entry.values,
                        NETWORK.feature_row(bucket, feature_index(side, king, piece, sq)),
                    );
                }
                let mut to_sub = cached & !now;
                while to_sub != 0 {
                    let sq = Square::from_index(to_sub.trailing_zeros() as usize);
                    to_sub &= to_sub - 1;
                    simd::sub_weights(
                        &mut entry.values,
                        NETWORK.feature_row(bucket, feature_index(side, king, piece, sq)),
                    );
                }
                entry.piece_bits[piece_index] = now;
                piece_index += 1;
            }
        }

        let frame = &mut self.stack[idx];
        frame.values[si] = entry.values;
        frame.king_square[si] = king;
        frame.bucket[si] = bucket;
        frame.correct[si] = true;
    }

    /// Patch frame `i` for one side from its parent using the recorded
    /// move; the parent must already be correct for that side
    fn update_incrementally(&mut self, i: usize, side: Color) {
        let si = side.index();
        let (below, above) = self.stack.split_at_mut(i);
        let prev = &below[i - 1];
        let frame = &mut above[0];
        debug_assert!(prev.correct[si]);

        frame.values[si] = prev.values[si];
        frame.correct[si] = true;

        let m = frame.mv;
        if m.is_null() {
            return;
        }
        let moved = frame.moved.expect("non-null move has a mover");
        let mover_color = moved.color();
        let king = frame.king_square[si];
        let bucket = frame.bucket[si];

        fn add(
            values: &mut [i16; HIDDEN_SIZE],
            bucket: usize,
            side: Color,
            king: Square,
            piece: Piece,
            sq: Square,
        ) {
            simd::add_weights(
                values,
                NETWORK.feature_row(bucket, feature_index(side, king, piece, sq)),
            );
        }
        fn sub(
            values: &mut [i16; HIDDEN_SIZE],
            bucket: usize,
            side: Color,
            king: Square,
            piece: Piece,
            sq: Square,
        ) {
            simd::sub_weights(
                values,
                NETWORK.feature_row(bucket, feature_index(side, king, piece, sq)),
            );
        }

        let values = &mut frame.values[si];
        if m.is_castling() {
            let rook = Piece::new(PieceKind::Rook, mover_color);
            let (king_to, rook_to) = castling_destinations(mover_color, m.is_short_castle());
            sub(values, bucket, side, king, moved, m.from());
            add(values, bucket, side, king, moved, king_to);
            sub(values, bucket, side, king, rook, m.to());
            add(values, bucket, side, king, rook, rook_to);
        } else if let Some(kind) = m.promotion_kind() {
            sub(values, bucket, side, king, moved, m.from());
            if let Some(victim) = frame.captured {
                sub(values, bucket, side, king, victim, m.to());
            }
            add(values, bucket, side, king, Piece::new(kind, mover_color), m.to());
        } else if m.is_en_passant() {
            let victim = frame.captured.expect("en passant captures a pawn");
            let victim_sq = m.to().offset(-mover_color.forward());
            sub(values, bucket, side, king, moved, m.from());
            sub(values, bucket, side, king, victim, victim_sq);
            add(values, bucket, side, king, moved, m.to());
        } else if let Some(victim) = frame.captured {
            sub(values, bucket, side, king, moved, m.from());
            sub(values, bucket, side, king, victim, m.to());
            add(values, bucket, side, king, moved, m.to());
        } else {
            sub(values, bucket, side, king, moved, m.from());
            add(values, bucket, side, king, moved, m.to());
        }
    }
}

impl Default for EvaluationState {
    fn default() -> Self {
        EvaluationState::new()
    }
}
