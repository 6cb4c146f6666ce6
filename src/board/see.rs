//! Static exchange evaluation.
//!
//! Decides whether the capture sequence a move starts on its destination
//! square nets at least `threshold` centipawns for the mover, without
//! playing any moves. Attackers are consumed least-valuable-first, with
//! x-ray attackers joining as sliders leave their batteries.

use super::attack_tables;
use super::position::Position;
use super::types::{Bitboard, Color, Move, PieceKind};

/// Exchange values per piece kind; the king never gets captured
const SEE_VALUES: [i32; 6] = [100, 300, 300, 500, 1000, 999_999];

#[inline]
#[must_use]
pub(crate) const fn see_value(kind: PieceKind) -> i32 {
    SEE_VALUES[kind.index()]
}

impl Position {
    /// True when the exchanges started by `m` gain at least `threshold`
    /// centipawns for the side to move
    #[must_use]
    pub fn static_exchange_eval(&self, m: Move, threshold: i32) -> bool {
        // Castling never initiates an exchange
        if m.is_castling() {
            return threshold <= 0;
        }

        let board = self.board();
        let us = board.side_to_move();

        let mut next_victim = match m.promotion_kind() {
            Some(kind) => kind,
            None => board
                .piece_at(m.from())
                .map(|p| p.kind())
                .unwrap_or(PieceKind::Pawn),
        };

        let mut balance = match board.piece_at(m.to()) {
            Some(captured) => see_value(captured.kind()),
            None if m.is_en_passant() => see_value(PieceKind::Pawn),
            None => 0,
        };
        if let Some(kind) = m.promotion_kind() {
            balance += see_value(kind) - see_value(PieceKind::Pawn);
        }

        // Even winning the target for free falls short
        balance -= threshold;
        if balance < 0 {
            return false;
        }
        // Even losing the mover outright keeps us above the threshold
        balance -= see_value(next_victim);
        if balance >= 0 {
            return true;
        }

        let diagonals = board.pieces_of_kind(PieceKind::Bishop)
            | board.pieces_of_kind(PieceKind::Queen);
        let parallels =
            board.pieces_of_kind(PieceKind::Rook) | board.pieces_of_kind(PieceKind::Queen);

        let mut occupancy = board.occupancy_all() ^ Bitboard::from_square(m.from());
        occupancy |= Bitboard::from_square(m.to());
        if m.is_en_passant() {
            occupancy ^= Bitboard::from_square(m.to().offset(-us.forward()));
        }

        let mut attackers = (board.attackers_of(m.to(), Color::White)
            | board.attackers_of(m.to(), Color::Black))
            & occupancy
            & !self.pinned_nonparticipants(m);

        let mut turn = us.opponent();

        loop {
            let own_attackers = attackers & board.occupancy(turn);
            if own_attackers.is_empty() {
                break;
            }

            // Least valuable attacker first
            let (sq, kind) = PieceKind::ALL
                .iter()
                .find_map(|&kind| {
                    let candidates = own_attackers & board.pieces_of(turn, kind);
                    (!candidates.is_empty()).then(|| (candidates.lsb(), kind))
                })
                .expect("attacker set is non-empty");

            occupancy ^= Bitboard::from_square(sq);

            // Sliders leaving the battery reveal x-ray attackers behind them
            if matches!(kind, PieceKind::Pawn | PieceKind::Bishop | PieceKind::Queen) {
                attackers |= attack_tables::bishop_attacks(m.to(), occupancy) & diagonals;
            }
            if matches!(kind, PieceKind::Rook | PieceKind::Queen) {
                attackers |= attack_tables::rook_attacks(m.to(), occupancy) & parallels;
            }
            attackers &= occupancy;

            turn = turn.opponent();
            next_victim = kind;

            balance = -balance - 1 - see_value(next_victim);
            if balance >= 0 {
                // A king "capture" only stands when the opponent has no
                // reply left
                if next_victim == PieceKind::King
                    && !(attackers & board.occupancy(turn)).is_empty()
                {
                    turn = turn.opponent();
                }
                break;
            }
        }

        // Whoever is left to move could not improve: the other side won
        turn != us
    }

    /// Absolutely pinned pieces that do not attack along their pin ray
    /// toward the exchange square; these can never join the exchange
    fn pinned_nonparticipants(&self, m: Move) -> Bitboard {
        let board = self.board();
        let mut excluded = Bitboard::EMPTY;
        for color in [Color::White, Color::Black] {
            let king_sq = board.king_square(color);
            let pin_ray = attack_tables::long_ray_through(m.to(), king_sq);
            excluded |= self.pinned_pieces(color) & !pin_ray;
        }
        excluded
    }

    /// Pieces of `color` absolutely pinned to their king
    #[must_use]
    pub fn pinned_pieces(&self, color: Color) -> Bitboard {
        let board = self.board();
        let king_sq = board.king_square(color);
        let them = color.opponent();
        let queens = board.pieces_of(them, PieceKind::Queen);

        // Sliders that would see the king if only enemy pieces blocked
        let candidates = (attack_tables::rook_attacks(king_sq, board.occupancy(them))
            & (board.pieces_of(them, PieceKind::Rook) | queens))
            | (attack_tables::bishop_attacks(king_sq, board.occupancy(them))
                & (board.pieces_of(them, PieceKind::Bishop) | queens));

        let mut pinned = Bitboard::EMPTY;
        for sq in candidates {
            let between =
                attack_tables::short_connecting_ray(sq, king_sq) & board.occupancy(color);
            if between.popcount() == 1 {
                pinned |= between;
            }
        }
        pinned
    }
}
