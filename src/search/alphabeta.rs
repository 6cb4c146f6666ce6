//! The recursive fail-soft negamax with quiescence.
//!
//! Control flow at every node: abort check, quiescence drop at depth 0,
//! draw detection, mate-distance pruning, transposition probe, static
//! eval with correction, the pre-move pruning block (reverse futility,
//! razoring, null move), internal iterative reduction, then the move
//! loop with late-move pruning, futility, SEE and history pruning,
//! singular extensions and late-move reductions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

use crate::board::nnue::network::boxed_zeroed;
use crate::board::{
    EvaluationState, Move, MoveGen, Piece, PieceKind, Position, MAX_PLY,
};

use super::history::{history_delta, Histories};
use super::movepick::MovePicker;
use super::timeman::{SearchLimits, TimeBudget};
use super::tt::{Bound, TranspositionTable};
use super::{is_mate_score, SearchState, MATE, MATE_THRESHOLD, SCORE_INFINITE};

/// Reverse futility margins per depth
const RFP_MARGINS: [i32; 8] = [0, 70, 150, 240, 340, 450, 580, 720];

/// Futility margins per depth for skipping hopeless quiets
const FUTILITY_MARGINS: [i32; 6] = [0, 100, 200, 300, 400, 500];

/// Razoring margin per depth
const RAZOR_MARGIN: i32 = 300;

/// Reduction table indexed by depth and move number:
/// `0.25 * ln(depth) * ln(moves) + 0.7`
static LMR_TABLE: Lazy<[[i32; 64]; 64]> = Lazy::new(|| {
    let mut table = [[0i32; 64]; 64];
    for (depth, row) in table.iter_mut().enumerate().skip(1) {
        for (moves, cell) in row.iter_mut().enumerate().skip(1) {
            let value = 0.25 * (depth as f64).ln() * (moves as f64).ln() + 0.7;
            *cell = value as i32;
        }
    }
    table
});

/// How many nodes may pass between hard-limit clock checks
const CLOCK_CHECK_MASK: u64 = 2047;

pub(crate) struct RootMove {
    pub mv: Move,
    pub nodes: u64,
}

pub struct Searcher<'a> {
    pub(crate) pos: Position,
    tt: &'a TranspositionTable,
    histories: &'a mut Histories,
    eval: &'a mut EvaluationState,
    stop: &'a AtomicBool,
    pub(crate) limits: SearchLimits,
    pub(crate) budget: TimeBudget,
    pub(crate) start: Instant,
    pub(crate) nodes: u64,
    pub(crate) seldepth: usize,
    pub(crate) aborted: bool,
    pv_table: Box<[[Move; MAX_PLY + 2]; MAX_PLY + 2]>,
    pv_len: [usize; MAX_PLY + 2],
    static_evals: [i32; MAX_PLY + 2],
    excluded: [Move; MAX_PLY + 2],
    double_extensions: [i32; MAX_PLY + 2],
    /// Null-move pruning is disabled below this ply during verification
    nmp_min_ply: usize,
    pub(crate) root_moves: Vec<RootMove>,
}

impl<'a> Searcher<'a> {
    pub fn new(
        pos: Position,
        state: &'a mut SearchState,
        stop: &'a AtomicBool,
        limits: SearchLimits,
    ) -> Searcher<'a> {
        state.tt.new_search();
        state.histories.clear_killers_and_counters();
        state.eval_state.reset(&pos);

        let budget = limits.budget(pos.side_to_move() == crate::board::Color::White);

        let SearchState {
            tt,
            histories,
            eval_state,
        } = state;

        Searcher {
            pos,
            tt,
            histories,
            eval: eval_state,
            stop,
            limits,
            budget,
            start: Instant::now(),
            nodes: 0,
            seldepth: 0,
            aborted: false,
            pv_table: boxed_zeroed(),
            pv_len: [0; MAX_PLY + 2],
            static_evals: [0; MAX_PLY + 2],
            excluded: [Move::EMPTY; MAX_PLY + 2],
            double_extensions: [0; MAX_PLY + 2],
            nmp_min_ply: 0,
            root_moves: Vec::new(),
        }
    }

    /// The principal variation of the last completed iteration
    #[must_use]
    pub(crate) fn root_pv(&self) -> Vec<Move> {
        self.pv_table[0][..self.pv_len[0]].to_vec()
    }

    #[must_use]
    pub(crate) fn tt_hashfull(&self) -> u32 {
        self.tt.hashfull()
    }

    /// Game ply at the root, derived from the move clocks; feeds the
    /// WDL normalization
    #[must_use]
    pub(crate) fn root_game_ply(&self) -> usize {
        let board = self.pos.board();
        (board.fullmove_clock() as usize).saturating_sub(1) * 2
            + usize::from(board.side_to_move() == crate::board::Color::Black)
    }

    // =========================================================================
    // Abort handling
    // =========================================================================

    #[inline]
    pub(crate) fn should_abort(&mut self) -> bool {
        if self.aborted {
            return true;
        }
        if self.stop.load(Ordering::Relaxed) {
            self.aborted = true;
            return true;
        }
        if let Some(max_nodes) = self.limits.nodes {
            if self.nodes >= max_nodes {
                self.aborted = true;
                return true;
            }
        }
        if self.nodes & CLOCK_CHECK_MASK == 0 {
            if let Some(hard_ms) = self.budget.hard_ms {
                if self.start.elapsed().as_millis() as u64 >= hard_ms {
                    self.aborted = true;
                    return true;
                }
            }
        }
        false
    }

    /// Draw value; jittered by node parity near the root to nudge the
    /// engine out of repetition plateaus without destabilizing deeper
    /// search
    #[inline]
    fn draw_score(&self, ply: usize) -> i32 {
        if ply <= 2 {
            1 - 2 * ((self.nodes & 1) as i32)
        } else {
            0
        }
    }

    fn make_move(&mut self, m: Move) {
        self.pos.push(m);
        self.eval.push(&self.pos);
        self.tt.prefetch(self.pos.hash());
    }

    fn undo_move(&mut self) {
        self.pos.pop();
        self.eval.pop();
    }

    // =========================================================================
    // The negamax
    // =========================================================================

    #[allow(clippy::too_many_lines)]
    pub(crate) fn alphabeta(
        &mut self,
        depth: i32,
        ply: usize,
        mut alpha: i32,
        mut beta: i32,
        cut_node: bool,
    ) -> i32 {
        debug_assert!(alpha < beta);
        let root_node = ply == 0;
        let pv_node = beta - alpha > 1;
        self.pv_len[ply] = 0;

        // 1. Abort
        if self.should_abort() {
            return 0;
        }

        // 2. Horizon: drop into quiescence
        if depth <= 0 {
            return self.quiescence(ply, alpha, beta);
        }

        self.nodes += 1;
        self.seldepth = self.seldepth.max(ply);

        let in_check = self.pos.in_check();
        if ply >= MAX_PLY {
            return if in_check { 0 } else { self.raw_eval() };
        }

        let excluded = self.excluded[ply];
        let singular_node = !excluded.is_empty();

        // 3. Draws
        if !root_node && self.pos.is_draw(false) {
            return self.draw_score(ply);
        }

        // 4. Mate distance pruning
        if !root_node {
            alpha = alpha.max(-MATE + ply as i32);
            beta = beta.min(MATE - ply as i32 - 1);
            if alpha >= beta {
                return alpha;
            }
        }

        // 5. Transposition probe (suppressed in singular verification)
        let mut tt_move = Move::EMPTY;
        let mut tt_score = -SCORE_INFINITE;
        let mut tt_depth = -1;
        let mut tt_bound = Bound::Invalid;
        let mut tt_pv = pv_node;
        let mut tt_raw_eval = None;
        if !singular_node {
            if let Some(hit) = self.tt.probe(self.pos.hash(), ply) {
                // PV nodes re-search instead of cutting so the reported
                // principal variation stays intact end to end
                if !root_node && !pv_node && hit.cutoff_permitted(depth, alpha, beta) {
                    return hit.score;
                }
                if self.pos.is_pseudo_legal(hit.mv) {
                    tt_move = hit.mv;
                }
                tt_score = hit.score;
                tt_depth = hit.depth;
                tt_bound = hit.bound;
                tt_pv |= hit.tt_pv;
                tt_raw_eval = Some(hit.raw_eval);
            }
        }

        // 6. Static evaluation, corrected by the material/pawn histories
        let raw_eval = if in_check {
            -SCORE_INFINITE
        } else {
            tt_raw_eval.unwrap_or_else(|| self.raw_eval())
        };
        let static_eval = if in_check {
            -SCORE_INFINITE
        } else {
            self.histories.corrected_eval(&self.pos, raw_eval)
        };
        self.static_evals[ply] = static_eval;
        let improving = !in_check && ply >= 2 && static_eval > self.static_evals[ply - 2];

        // 7. Pre-move pruning
        if !pv_node && !in_check && !singular_node {
            // Reverse futility: a static eval far above beta fails high
            if depth <= 7 {
                let margin = RFP_MARGINS[depth as usize] / if tt_pv { 2 } else { 1 };
                if static_eval - margin >= beta {
                    return static_eval;
                }
            }

            // Razoring: a hopeless static eval must prove itself tactically
            if depth <= 3 && static_eval + RAZOR_MARGIN * depth <= alpha {
                let score = self.quiescence(ply, alpha, alpha + 1);
                if score <= alpha {
                    return score;
                }
            }

            // Null move: hand over the move and search reduced
            let prev_was_null = self
                .pos
                .previous_move(1)
                .is_some_and(|(m, _)| m.is_null());
            if depth >= 3
                && static_eval >= beta
                && !prev_was_null
                && ply >= self.nmp_min_ply
                && self.pos.board().has_non_pawn_material(self.pos.side_to_move())
            {
                let r = 3 + depth / 4 + ((static_eval - beta) / 200).min(3);
                self.pos.push_null();
                self.eval.push(&self.pos);
                let null_score =
                    -self.alphabeta(depth - 1 - r, ply + 1, -beta, -beta + 1, !cut_node);
                self.undo_move();

                if self.aborted {
                    return 0;
                }
                if null_score >= beta && !is_mate_score(null_score) {
                    if depth < 12 || self.nmp_min_ply > 0 {
                        return beta;
                    }
                    // Verification at high depth: repeat without null
                    // moves available in the subtree
                    self.nmp_min_ply = ply + 3 * (depth - r) as usize / 4;
                    let verified = self.alphabeta(depth - 1 - r, ply, beta - 1, beta, false);
                    self.nmp_min_ply = 0;
                    if verified >= beta {
                        return beta;
                    }
                }
            }
        }

        // 8. Internal iterative reduction
        let mut depth = depth;
        if (pv_node || cut_node) && depth >= 4 && tt_move.is_empty() && !singular_node {
            depth -= 1;
        }

        // 9. Move loop
        let killer = self.histories.killer(ply);
        let counter = self.histories.counter(&self.pos);
        let mut picker = MovePicker::new(
            &self.pos,
            self.histories,
            MoveGen::All,
            tt_move,
            killer,
            counter,
        );

        let original_alpha = alpha;
        let mut best_score = -SCORE_INFINITE;
        let mut best_move = Move::EMPTY;
        let mut legal_moves = 0u32;
        // Tried-move lists for the history updates; fixed capacity keeps
        // the node allocation-free
        let mut quiets_tried = [(Move::EMPTY, Piece::WhitePawn); 64];
        let mut quiets_count = 0usize;
        let mut noisies_tried = [(Move::EMPTY, Piece::WhitePawn, Piece::WhitePawn); 32];
        let mut noisies_count = 0usize;
        let mut skip_remaining_quiets = false;

        while let Some(picked) = picker.next() {
            let m = picked.mv;
            if m == excluded {
                continue;
            }
            if !self.pos.is_legal(m) {
                continue;
            }

            let moved = self
                .pos
                .board()
                .piece_at(m.from())
                .expect("legal move has a mover");
            let victim = self.capture_victim(m);
            // Under-promotions count as quiet; only captures and queen
            // promotions are noisy
            let is_quiet = victim.is_none() && m.promotion_kind() != Some(PieceKind::Queen);

            if is_quiet && skip_remaining_quiets {
                continue;
            }

            // Shallow pruning of late, weak moves; never at the root and
            // never once a mate is on the board
            if !root_node && best_score > -MATE_THRESHOLD {
                if is_quiet && !pv_node && !in_check {
                    // Late move pruning
                    let lmp_limit = (3 + depth * depth) / if improving { 1 } else { 2 };
                    if quiets_count as i32 >= lmp_limit {
                        skip_remaining_quiets = true;
                        continue;
                    }
                    // Futility
                    if depth <= 5 && static_eval + FUTILITY_MARGINS[depth as usize] <= alpha {
                        continue;
                    }
                    // History pruning
                    if depth <= 4 && picked.score < -2048 * depth {
                        continue;
                    }
                }
                // SEE pruning for both classes
                if depth <= 7 && legal_moves > 0 {
                    let margin = if is_quiet { -50 * depth } else { -100 * depth };
                    if !self.pos.static_exchange_eval(m, margin) {
                        continue;
                    }
                }
            }

            legal_moves += 1;

            // Singular extension: is the TT move forced?
            let mut extension = 0;
            if !root_node
                && !singular_node
                && m == tt_move
                && depth >= 8
                && tt_depth >= depth - 3
                && tt_bound == Bound::LowerBound
                && !is_mate_score(tt_score)
            {
                let singular_beta = tt_score - depth;
                self.excluded[ply] = m;
                let singular_score = self.alphabeta(
                    depth / 2 - 1,
                    ply,
                    singular_beta - 1,
                    singular_beta,
                    cut_node,
                );
                self.excluded[ply] = Move::EMPTY;

                if self.aborted {
                    return 0;
                }
                if singular_score < singular_beta {
                    extension = 1;
                    if !pv_node
                        && singular_score <= singular_beta - 25
                        && self.double_extensions[ply] < 8
                    {
                        extension = 2;
                    }
                }
            }

            let nodes_before = self.nodes;
            self.double_extensions[ply + 1] =
                self.double_extensions[ply] + i32::from(extension == 2);
            self.make_move(m);
            let gives_check = self.pos.in_check();
            let new_depth = depth - 1 + extension;

            let mut score;
            if legal_moves == 1 {
                score = -self.alphabeta(new_depth, ply + 1, -beta, -alpha, false);
            } else {
                // Late move reductions for quiet, calm moves
                let mut reduction = 0;
                if depth >= 3
                    && is_quiet
                    && !in_check
                    && !gives_check
                    && legal_moves >= if pv_node { 6 } else { 4 }
                {
                    reduction = LMR_TABLE[depth.min(63) as usize][legal_moves.min(63) as usize];
                    if pv_node {
                        reduction -= 1;
                    }
                    if tt_pv {
                        reduction -= 1;
                    }
                    if m != tt_move && depth >= 8 {
                        reduction += 1;
                    }
                    reduction -= (picked.score / 8192).clamp(-2, 2);
                    reduction = reduction.clamp(0, new_depth - 1);
                }

                score =
                    -self.alphabeta(new_depth - reduction, ply + 1, -alpha - 1, -alpha, true);
                if score > alpha && reduction > 0 {
                    score =
                        -self.alphabeta(new_depth, ply + 1, -alpha - 1, -alpha, !cut_node);
                }
                if score > alpha && score < beta {
                    score = -self.alphabeta(new_depth, ply + 1, -beta, -alpha, false);
                }
            }

            self.undo_move();
            if self.aborted {
                return 0;
            }

            if root_node {
                if let Some(entry) = self.root_moves.iter_mut().find(|rm| rm.mv == m) {
                    entry.nodes += self.nodes - nodes_before;
                }
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    best_move = m;
                    alpha = score;
                    if pv_node {
                        self.record_pv(ply, m);
                    }
                    if score >= beta {
                        self.on_beta_cutoff(
                            m,
                            moved,
                            victim,
                            ply,
                            depth,
                            &quiets_tried[..quiets_count],
                            &noisies_tried[..noisies_count],
                        );
                        if !singular_node {
                            self.tt.store(
                                self.pos.hash(),
                                depth,
                                score,
                                Bound::LowerBound,
                                raw_eval,
                                m,
                                ply,
                                tt_pv,
                            );
                        }
                        return score;
                    }
                }
            }

            if is_quiet {
                if quiets_count < quiets_tried.len() {
                    quiets_tried[quiets_count] = (m, moved);
                    quiets_count += 1;
                }
            } else if let Some(victim) = victim {
                if noisies_count < noisies_tried.len() {
                    noisies_tried[noisies_count] = (m, moved, victim);
                    noisies_count += 1;
                }
            }
        }

        // 10. No legal moves: checkmated or stalemated (unless a move
        // was excluded, in which case the singular search just failed low)
        if legal_moves == 0 {
            if singular_node {
                return alpha;
            }
            return if in_check { -MATE + ply as i32 } else { 0 };
        }

        // 11. Store the result and teach the correction history
        let bound = if alpha > original_alpha {
            Bound::Exact
        } else {
            Bound::UpperBound
        };
        if !singular_node && !self.aborted {
            self.tt.store(
                self.pos.hash(),
                depth,
                best_score,
                bound,
                raw_eval,
                best_move,
                ply,
                tt_pv,
            );

            let best_is_quiet = best_move.is_empty()
                || quiets_tried[..quiets_count]
                    .iter()
                    .any(|&(m, _)| m == best_move);
            let usable = !in_check
                && !is_mate_score(best_score)
                && best_is_quiet
                && !(bound == Bound::UpperBound && best_score >= static_eval);
            if usable {
                self.histories
                    .update_correction(&self.pos, raw_eval, best_score, depth);
            }
        }

        best_score
    }

    // =========================================================================
    // Quiescence
    // =========================================================================

    pub(crate) fn quiescence(&mut self, ply: usize, mut alpha: i32, beta: i32) -> i32 {
        self.pv_len[ply] = 0;
        if self.should_abort() {
            return 0;
        }

        self.nodes += 1;
        self.seldepth = self.seldepth.max(ply);

        if self.pos.is_draw(false) {
            return self.draw_score(ply);
        }

        // Stand pat
        let raw_eval = self.raw_eval();
        let static_eval = self.histories.corrected_eval(&self.pos, raw_eval);
        if ply >= MAX_PLY {
            return static_eval;
        }
        if static_eval >= beta {
            return static_eval;
        }
        alpha = alpha.max(static_eval);

        // The table is probed with zero depth: any stored entry is deep
        // enough to stand in for a quiescence result
        let mut tt_move = Move::EMPTY;
        if let Some(hit) = self.tt.probe(self.pos.hash(), ply) {
            if hit.cutoff_permitted(0, alpha, beta) {
                return hit.score;
            }
            if self.pos.is_pseudo_legal(hit.mv) {
                tt_move = hit.mv;
            }
        }

        let mut picker = MovePicker::new(
            &self.pos,
            self.histories,
            MoveGen::Noisy,
            tt_move,
            Move::EMPTY,
            Move::EMPTY,
        );

        let mut best_score = static_eval;
        let mut best_move = Move::EMPTY;

        while let Some(picked) = picker.next() {
            let m = picked.mv;
            if !self.pos.is_legal(m) {
                continue;
            }
            // Exchanges that lose material cannot beat the stand pat
            if !self.pos.static_exchange_eval(m, 0) {
                continue;
            }

            self.make_move(m);
            let score = -self.quiescence(ply + 1, -beta, -alpha);
            self.undo_move();
            if self.aborted {
                return 0;
            }

            if score > best_score {
                best_score = score;
                if score > alpha {
                    alpha = score;
                    best_move = m;
                    if score >= beta {
                        break;
                    }
                }
            }
        }

        if !self.aborted {
            let bound = if best_score >= beta {
                Bound::LowerBound
            } else {
                Bound::UpperBound
            };
            self.tt.store(
                self.pos.hash(),
                0,
                best_score,
                bound,
                raw_eval,
                best_move,
                ply,
                false,
            );
        }

        best_score
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    #[inline]
    fn raw_eval(&mut self) -> i32 {
        self.eval.evaluate(&self.pos)
    }

    fn capture_victim(&self, m: Move) -> Option<Piece> {
        if m.is_castling() {
            None
        } else if m.is_en_passant() {
            Some(Piece::new(
                PieceKind::Pawn,
                self.pos.side_to_move().opponent(),
            ))
        } else {
            self.pos.board().piece_at(m.to())
        }
    }

    fn record_pv(&mut self, ply: usize, m: Move) {
        let child_len = self.pv_len[ply + 1];
        let (head, tail) = self.pv_table.split_at_mut(ply + 1);
        head[ply][0] = m;
        head[ply][1..=child_len].copy_from_slice(&tail[0][..child_len]);
        self.pv_len[ply] = child_len + 1;
    }

    #[allow(clippy::too_many_arguments)]
    fn on_beta_cutoff(
        &mut self,
        m: Move,
        moved: Piece,
        victim: Option<Piece>,
        ply: usize,
        depth: i32,
        quiets_tried: &[(Move, Piece)],
        noisies_tried: &[(Move, Piece, Piece)],
    ) {
        let delta = history_delta(depth);

        match victim {
            None if m.promotion_kind() != Some(PieceKind::Queen) => {
                self.histories.set_killer(ply, m);
                self.histories.set_counter(&self.pos, m);
                self.histories.update_quiet(&self.pos, moved, m, delta);
            }
            Some(victim) => {
                self.histories.update_capture(moved, m.to(), victim, delta);
            }
            // A non-capture queen promotion has no victim to index the
            // capture history with
            None => {}
        }

        // The moves tried before the cutoff wasted effort: push them down
        for &(tried, tried_piece) in quiets_tried {
            self.histories
                .update_quiet(&self.pos, tried_piece, tried, -delta);
        }
        for &(tried, tried_piece, tried_victim) in noisies_tried {
            self.histories
                .update_capture(tried_piece, tried.to(), tried_victim, -delta);
        }
    }
}
