//! Move-ordering heuristics and the evaluation correction history.
//!
//! Quiet history is bucketed by whether the origin and destination
//! squares are currently threatened; continuation history chains the
//! moves 1, 2 and 4 plies back. Every table uses the same gravity update
//! `v += amount - v*|amount|/16384`, which bounds values and decays
//! stale entries as new information arrives.

use crate::board::{Board, Move, Piece, Position, Square, MAX_PLY};

const HISTORY_GRAVITY: i32 = 16384;

/// Correction history resolution: one centipawn is `GRAIN` table units
const CORRECTION_GRAIN: i32 = 256;
const MATERIAL_CORRECTION_SIZE: usize = 32768;
const PAWN_CORRECTION_SIZE: usize = 16384;

/// Continuation-history plies: previous move, our previous move, and the
/// move four plies back
const CONTINUATION_PLIES: [usize; 3] = [1, 2, 4];

/// Bonus for the move that caused a beta cutoff, malus for the quiets
/// tried before it
#[inline]
#[must_use]
pub(crate) fn history_delta(depth: i32) -> i32 {
    (300 * depth - 250).min(2500)
}

#[inline]
fn gravity_update(value: &mut i16, amount: i32) {
    let v = i32::from(*value);
    *value = (v + amount - v * amount.abs() / HISTORY_GRAVITY) as i16;
}

pub struct Histories {
    /// `[piece][to][from_threatened][to_threatened]`
    quiet: Box<[[[[i16; 2]; 2]; 64]; 12]>,
    /// `[attacker][to][victim]`
    capture: Box<[[[i16; 12]; 64]; 12]>,
    /// `[previous piece][previous to][piece][to]`
    continuation: Box<[[[[i16; 64]; 12]; 64]; 12]>,
    /// Indexed by side and material key
    material_correction: Box<[[i32; MATERIAL_CORRECTION_SIZE]; 2]>,
    /// Indexed by side and pawn-structure key
    pawn_correction: Box<[[i32; PAWN_CORRECTION_SIZE]; 2]>,
    killers: [Move; MAX_PLY],
    counters: [[Move; 64]; 64],
}

impl Histories {
    #[must_use]
    pub fn new() -> Self {
        Histories {
            quiet: crate::board::nnue::network::boxed_zeroed(),
            capture: crate::board::nnue::network::boxed_zeroed(),
            continuation: crate::board::nnue::network::boxed_zeroed(),
            material_correction: crate::board::nnue::network::boxed_zeroed(),
            pawn_correction: crate::board::nnue::network::boxed_zeroed(),
            killers: [Move::EMPTY; MAX_PLY],
            counters: [[Move::EMPTY; 64]; 64],
        }
    }

    /// Zero everything; used on `ucinewgame`
    pub fn clear(&mut self) {
        *self = Histories::new();
    }

    /// Killers and counters go stale between searches; the graded
    /// histories are kept and decay on their own
    pub fn clear_killers_and_counters(&mut self) {
        self.killers = [Move::EMPTY; MAX_PLY];
        self.counters = [[Move::EMPTY; 64]; 64];
    }

    // =========================================================================
    // Quiet history (threat-bucketed + continuation)
    // =========================================================================

    #[inline]
    fn quiet_slot(&mut self, board: &Board, piece: Piece, m: Move) -> &mut i16 {
        let from_threatened = usize::from(board.is_threatened(m.from()));
        let to_threatened = usize::from(board.is_threatened(m.to()));
        &mut self.quiet[piece.index()][m.to().index()][from_threatened][to_threatened]
    }

    /// Combined ordering score of a quiet move: threat-bucketed history
    /// plus the continuation entries for the configured plies back
    #[must_use]
    pub fn quiet_score(&self, pos: &Position, piece: Piece, m: Move) -> i32 {
        let board = pos.board();
        let from_threatened = usize::from(board.is_threatened(m.from()));
        let to_threatened = usize::from(board.is_threatened(m.to()));
        let mut score = i32::from(
            self.quiet[piece.index()][m.to().index()][from_threatened][to_threatened],
        );

        for plies in CONTINUATION_PLIES {
            if let Some((prev_move, Some(prev_piece))) = pos.previous_move(plies) {
                score += i32::from(
                    self.continuation[prev_piece.index()][prev_move.to().index()][piece.index()]
                        [m.to().index()],
                );
            }
        }
        score
    }

    /// Gravity-update the quiet tables for one move
    pub fn update_quiet(&mut self, pos: &Position, piece: Piece, m: Move, amount: i32) {
        gravity_update(self.quiet_slot(pos.board(), piece, m), amount);

        for plies in CONTINUATION_PLIES {
            if let Some((prev_move, Some(prev_piece))) = pos.previous_move(plies) {
                let slot = &mut self.continuation[prev_piece.index()][prev_move.to().index()]
                    [piece.index()][m.to().index()];
                gravity_update(slot, amount);
            }
        }
    }

    // =========================================================================
    // Capture history
    // =========================================================================

    #[must_use]
    pub fn capture_score(&self, attacker: Piece, to: Square, victim: Piece) -> i32 {
        i32::from(self.capture[attacker.index()][to.index()][victim.index()])
    }

    pub fn update_capture(&mut self, attacker: Piece, to: Square, victim: Piece, amount: i32) {
        gravity_update(
            &mut self.capture[attacker.index()][to.index()][victim.index()],
            amount,
        );
    }

    // =========================================================================
    // Killers and counter-moves
    // =========================================================================

    #[inline]
    #[must_use]
    pub fn killer(&self, ply: usize) -> Move {
        self.killers[ply]
    }

    pub fn set_killer(&mut self, ply: usize, m: Move) {
        self.killers[ply] = m;
    }

    /// The stored refutation of the move just played, if any
    #[must_use]
    pub fn counter(&self, pos: &Position) -> Move {
        match pos.previous_move(1) {
            Some((prev, _)) if !prev.is_null() => {
                self.counters[prev.from().index()][prev.to().index()]
            }
            _ => Move::EMPTY,
        }
    }

    pub fn set_counter(&mut self, pos: &Position, m: Move) {
        if let Some((prev, _)) = pos.previous_move(1) {
            if !prev.is_null() {
                self.counters[prev.from().index()][prev.to().index()] = m;
            }
        }
    }

    // =========================================================================
    // Static evaluation correction
    // =========================================================================

    /// Raw NNUE output adjusted by the material and pawn-structure
    /// correction terms learned for the side to move
    #[must_use]
    pub fn corrected_eval(&self, pos: &Position, raw_eval: i32) -> i32 {
        let board = pos.board();
        let side = board.side_to_move().index();
        let material =
            self.material_correction[side][board.material_key() as usize % MATERIAL_CORRECTION_SIZE];
        let pawns = self.pawn_correction[side][board.pawn_hash() as usize % PAWN_CORRECTION_SIZE];
        raw_eval + (material + pawns) / CORRECTION_GRAIN
    }

    /// Feed the observed gap between the search result and the static
    /// eval back into the correction tables, weighted by depth
    pub fn update_correction(&mut self, pos: &Position, raw_eval: i32, score: i32, depth: i32) {
        let board = pos.board();
        let side = board.side_to_move().index();
        let weight = (depth + 1).min(16);
        let amount = ((score - raw_eval) * CORRECTION_GRAIN / 2).clamp(-4096, 4096) * weight / 16;

        let material = &mut self.material_correction[side]
            [board.material_key() as usize % MATERIAL_CORRECTION_SIZE];
        *material += amount - *material * amount.abs() / HISTORY_GRAVITY;

        let pawns =
            &mut self.pawn_correction[side][board.pawn_hash() as usize % PAWN_CORRECTION_SIZE];
        *pawns += amount - *pawns * amount.abs() / HISTORY_GRAVITY;
    }
}

impl Default for Histories {
    fn default() -> Self {
        Histories::new()
    }
}
