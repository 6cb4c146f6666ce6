//! Legality checking without make/unmake.
//!
//! Pseudo-legal moves pass through `is_legal`, which exploits pins and
//! checker counts instead of applying the move. `is_pseudo_legal`
//! validates transposition-table moves cheaply so they can be tried
//! without regenerating a move list.

use std::fmt;

use super::attack_tables;
use super::position::Position;
use super::state::Board;
use super::types::{Bitboard, Color, Move, Piece, PieceKind, Square};

impl Board {
    /// True when `by` attacks `sq` under the given occupancy. Passing a
    /// modified occupancy lets callers "lift" pieces off the board.
    #[must_use]
    pub fn is_square_attacked(&self, sq: Square, by: Color, occupancy: Bitboard) -> bool {
        if (attack_tables::knight_attacks(sq) & self.pieces_of(by, PieceKind::Knight)).0 != 0 {
            return true;
        }
        if (attack_tables::king_attacks(sq) & self.pieces_of(by, PieceKind::King)).0 != 0 {
            return true;
        }
        // A pawn of `by` attacks sq exactly when a pawn of the other color
        // on sq would attack it
        if (attack_tables::pawn_attacks(by.opponent(), sq) & self.pieces_of(by, PieceKind::Pawn)).0
            != 0
        {
            return true;
        }
        let queens = self.pieces_of(by, PieceKind::Queen);
        if (attack_tables::rook_attacks(sq, occupancy)
            & (self.pieces_of(by, PieceKind::Rook) | queens))
            .0
            != 0
        {
            return true;
        }
        (attack_tables::bishop_attacks(sq, occupancy)
            & (self.pieces_of(by, PieceKind::Bishop) | queens))
            .0
            != 0
    }

    /// All pieces of `by` attacking `sq` under the current occupancy
    #[must_use]
    pub fn attackers_of(&self, sq: Square, by: Color) -> Bitboard {
        let occupancy = self.occupancy_all();
        let queens = self.pieces_of(by, PieceKind::Queen);
        (attack_tables::knight_attacks(sq) & self.pieces_of(by, PieceKind::Knight))
            | (attack_tables::king_attacks(sq) & self.pieces_of(by, PieceKind::King))
            | (attack_tables::pawn_attacks(by.opponent(), sq) & self.pieces_of(by, PieceKind::Pawn))
            | (attack_tables::rook_attacks(sq, occupancy)
                & (self.pieces_of(by, PieceKind::Rook) | queens))
            | (attack_tables::bishop_attacks(sq, occupancy)
                & (self.pieces_of(by, PieceKind::Bishop) | queens))
    }

    /// True when `color`'s king is attacked
    #[must_use]
    pub fn in_check(&self, color: Color) -> bool {
        self.is_square_attacked(
            self.king_square(color),
            color.opponent(),
            self.occupancy_all(),
        )
    }
}

impl Position {
    /// True when the side to move is in check
    #[inline]
    #[must_use]
    pub fn in_check(&self) -> bool {
        self.board().in_check(self.side_to_move())
    }

    /// Final legality filter for pseudo-legal moves. Castling moves are
    /// verified at generation time and pass through unconditionally.
    #[must_use]
    pub fn is_legal(&self, m: Move) -> bool {
        debug_assert!(!m.is_null());
        if m.is_castling() {
            return true;
        }

        let board = self.board();
        let us = board.side_to_move();
        let them = us.opponent();
        let king_sq = board.king_square(us);
        let occupancy = board.occupancy_all();
        let moved = board.piece_at(m.from());

        if moved.map(Piece::kind) == Some(PieceKind::King) {
            // The destination must be safe with the king lifted off the
            // board, so backward slider attacks count
            let without_king = occupancy ^ Bitboard::from_square(king_sq);
            return !board.is_square_attacked(m.to(), them, without_king);
        }

        if m.is_en_passant() {
            // Remove both the capturing and the captured pawn, then look
            // for sliders on the king's rays; this catches the horizontal
            // pin through both pawns
            let victim_sq = m.to().offset(-us.forward());
            let after = (occupancy
                ^ Bitboard::from_square(m.from())
                ^ Bitboard::from_square(victim_sq))
                | Bitboard::from_square(m.to());
            return !self.slider_attacks_king(king_sq, them, after, Bitboard::EMPTY);
        }

        let checkers = board.attackers_of(king_sq, them);
        match checkers.popcount() {
            0 => {}
            1 => {
                let checker_sq = checkers.lsb();
                if m.to() != checker_sq {
                    // Must block: the destination has to lie on the ray
                    // between a sliding checker and the king
                    let is_slider = !checkers
                        .intersects(
                            board.pieces_of_kind(PieceKind::Pawn)
                                | board.pieces_of_kind(PieceKind::Knight)
                                | board.pieces_of_kind(PieceKind::King),
                        );
                    if !is_slider {
                        return false;
                    }
                    let block_ray = attack_tables::short_connecting_ray(checker_sq, king_sq);
                    if !block_ray.contains(m.to()) {
                        return false;
                    }
                }
            }
            _ => return false, // double check demands a king move
        }

        // Pin check: after hypothetically moving, no slider may newly
        // attack the king. A capture on `to` also removes that defender
        // from the attacking set.
        let after = (occupancy ^ Bitboard::from_square(m.from())) | Bitboard::from_square(m.to());
        !self.slider_attacks_king(king_sq, them, after, Bitboard::from_square(m.to()))
    }

    fn slider_attacks_king(
        &self,
        king_sq: Square,
        them: Color,
        occupancy: Bitboard,
        captured: Bitboard,
    ) -> bool {
        let board = self.board();
        let queens = board.pieces_of(them, PieceKind::Queen);
        let parallel = (board.pieces_of(them, PieceKind::Rook) | queens) & !captured;
        let diagonal = (board.pieces_of(them, PieceKind::Bishop) | queens) & !captured;
        (attack_tables::rook_attacks(king_sq, occupancy) & parallel).0 != 0
            || (attack_tables::bishop_attacks(king_sq, occupancy) & diagonal).0 != 0
    }

    /// Cheap validation of an externally supplied move (typically from the
    /// transposition table) against the current position
    #[must_use]
    pub fn is_pseudo_legal(&self, m: Move) -> bool {
        if m.is_empty() || m.is_null() || m.from() == m.to() && !m.is_castling() {
            return false;
        }
        let board = self.board();
        let us = board.side_to_move();
        let Some(piece) = board.piece_at(m.from()) else {
            return false;
        };
        if piece.color() != us {
            return false;
        }

        let kind = piece.kind();
        // Flag consistency
        if kind != PieceKind::Pawn
            && (m.is_promotion() || m.is_en_passant() || m.is_double_push())
        {
            return false;
        }
        if kind != PieceKind::King && m.is_castling() {
            return false;
        }

        let occupancy = board.occupancy_all();
        let captured = board.piece_at(m.to());
        if !m.is_castling() {
            if let Some(victim) = captured {
                if victim.color() == us || victim.kind() == PieceKind::King {
                    return false;
                }
            }
        }

        match kind {
            PieceKind::King => {
                if m.is_castling() {
                    self.is_pseudo_legal_castling(m, us)
                } else {
                    attack_tables::king_attacks(m.from()).contains(m.to())
                }
            }
            PieceKind::Pawn => self.is_pseudo_legal_pawn_move(m, piece, captured.is_some()),
            PieceKind::Knight => attack_tables::knight_attacks(m.from()).contains(m.to()),
            PieceKind::Bishop => {
                attack_tables::bishop_attacks(m.from(), occupancy).contains(m.to())
            }
            PieceKind::Rook => attack_tables::rook_attacks(m.from(), occupancy).contains(m.to()),
            PieceKind::Queen => attack_tables::queen_attacks(m.from(), occupancy).contains(m.to()),
        }
    }

    fn is_pseudo_legal_castling(&self, m: Move, us: Color) -> bool {
        let board = self.board();
        // Encoded as king takes own rook
        if board.piece_at(m.to()) != Some(Piece::new(PieceKind::Rook, us)) {
            return false;
        }
        if m.from().rank() != us.back_rank() || m.to().rank() != us.back_rank() {
            return false;
        }
        if m.is_short_castle() != (m.from() < m.to()) {
            return false;
        }
        let short = m.is_short_castle();
        if !board.castling_rights().has(us, short) {
            return false;
        }
        if m.to() != self.castling_config().rook_square(us, short) {
            return false;
        }

        let (king_to, rook_to) = super::types::castling_destinations(us, short);
        let path = attack_tables::short_connecting_ray(m.from(), king_to)
            | Bitboard::from_square(king_to)
            | attack_tables::short_connecting_ray(m.to(), rook_to)
            | Bitboard::from_square(rook_to);
        let mock_occupancy = board.occupancy_all()
            ^ Bitboard::from_square(m.from())
            ^ Bitboard::from_square(m.to());
        if path.intersects(mock_occupancy) {
            return false;
        }

        let king_path = attack_tables::short_connecting_ray(m.from(), king_to)
            | Bitboard::from_square(m.from())
            | Bitboard::from_square(king_to);
        !king_path.intersects(board.threats)
    }

    fn is_pseudo_legal_pawn_move(&self, m: Move, piece: Piece, is_capture: bool) -> bool {
        let board = self.board();
        let us = piece.color();
        let forward = us.forward();
        let relative_to_rank = match us {
            Color::White => m.to().rank(),
            Color::Black => 7 - m.to().rank(),
        };

        if m.is_en_passant() {
            return board.en_passant_square() == Some(m.to())
                && attack_tables::pawn_attacks(us, m.from()).contains(m.to());
        }

        if m.is_double_push() {
            let relative_from_rank = match us {
                Color::White => m.from().rank(),
                Color::Black => 7 - m.from().rank(),
            };
            if relative_from_rank != 1 {
                return false;
            }
            let step = m.from().offset(forward);
            return m.to() == step.offset(forward)
                && board.piece_at(step).is_none()
                && board.piece_at(m.to()).is_none();
        }

        // Promotion exactly on the last rank
        if (relative_to_rank == 7) != m.is_promotion() {
            return false;
        }

        if is_capture {
            attack_tables::pawn_attacks(us, m.from()).contains(m.to())
        } else {
            m.to() == m.from().offset(forward)
        }
    }

    // =========================================================================
    // UCI move input
    // =========================================================================

    /// Parse a UCI move string against this position and play it.
    /// Standard castling input (`e1g1`) is normalized to the internal
    /// king-takes-rook encoding; in Chess960 mode the input already is
    /// king-takes-rook.
    pub fn push_uci(&mut self, s: &str, chess960: bool) -> Result<Move, MoveParseError> {
        let m = self.parse_uci_move(s, chess960)?;
        self.push(m);
        Ok(m)
    }

    /// Parse and validate a UCI move string without playing it
    pub fn parse_uci_move(&self, s: &str, chess960: bool) -> Result<Move, MoveParseError> {
        if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
            return Err(MoveParseError::new(s));
        }
        let from: Square = s[0..2].parse().map_err(|_| MoveParseError::new(s))?;
        let to: Square = s[2..4].parse().map_err(|_| MoveParseError::new(s))?;
        let promotion = match s.len() {
            5 => Some(
                PieceKind::from_char(s.as_bytes()[4] as char).ok_or_else(|| MoveParseError::new(s))?,
            ),
            _ => None,
        };

        let board = self.board();
        let us = board.side_to_move();
        let piece = board.piece_at(from).ok_or_else(|| MoveParseError::new(s))?;

        let mut m = match promotion {
            Some(kind) => Move::promotion(from, to, kind),
            None => Move::new(from, to),
        };

        if piece.kind() == PieceKind::King {
            if chess960 {
                // King takes own rook
                if board.piece_at(to) == Some(Piece::new(PieceKind::Rook, us)) {
                    m = if from < to {
                        Move::short_castle(from, to)
                    } else {
                        Move::long_castle(from, to)
                    };
                }
            } else if from.file() == 4 && to.file() == 6 && from.rank() == us.back_rank() {
                m = Move::short_castle(from, self.castling_config().rook_square(us, true));
            } else if from.file() == 4 && to.file() == 2 && from.rank() == us.back_rank() {
                m = Move::long_castle(from, self.castling_config().rook_square(us, false));
            }
        }

        if piece.kind() == PieceKind::Pawn {
            let rank_delta = from.rank().abs_diff(to.rank());
            if rank_delta == 2 {
                m = Move::double_push(from, to);
            } else if from.file() != to.file() && board.piece_at(to).is_none() {
                m = Move::en_passant(from, to);
            }
        }

        if self.generate_legal_moves().contains(m) {
            Ok(m)
        } else {
            Err(MoveParseError::new(s))
        }
    }
}

/// Error from parsing or validating a UCI move string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveParseError {
    input: String,
}

impl MoveParseError {
    fn new(s: &str) -> Self {
        MoveParseError {
            input: s.to_string(),
        }
    }
}

impl fmt::Display for MoveParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal or malformed move '{}'", self.input)
    }
}

impl std::error::Error for MoveParseError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::movegen::MoveGen;

    fn legal_matches_filtered(fen: &str) {
        let pos = Position::from_fen(fen, false).unwrap();
        let mut filtered = Vec::new();
        for m in pos.generate_pseudo_legal_moves(MoveGen::All).iter() {
            if pos.is_legal(m) {
                filtered.push(m);
            }
        }
        let legal: Vec<Move> = pos.generate_legal_moves().iter().collect();
        assert_eq!(filtered, legal, "fen: {fen}");

        // Cross-check against make/verify
        let mut probe = pos.clone();
        for m in probe
            .generate_pseudo_legal_moves(MoveGen::All)
            .iter()
            .collect::<Vec<_>>()
        {
            let us = probe.side_to_move();
            probe.push(m);
            let leaves_king_safe = !probe.board().in_check(us);
            probe.pop();
            assert_eq!(
                probe.is_legal(m),
                leaves_king_safe,
                "move {m:?} in {fen}"
            );
        }
    }

    #[test]
    fn test_legality_matches_make_unmake() {
        for fen in [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            // In check
            "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
        ] {
            legal_matches_filtered(fen);
        }
    }

    #[test]
    fn test_en_passant_pin_rejected() {
        // White king a5, white pawn b5, black pawn c5 (just double-pushed),
        // black rook h5: bxc6 e.p. would expose the king along the rank
        let pos = Position::from_fen("4k3/8/8/KPp4r/8/8/8/8 w - c6 0 2", false).unwrap();
        let ep = Move::en_passant(Square::new(4, 1), Square::new(5, 2));
        assert!(pos.is_pseudo_legal(ep));
        assert!(!pos.is_legal(ep));
        assert!(!pos.generate_legal_moves().contains(ep));
    }

    #[test]
    fn test_double_check_only_king_moves() {
        // Knight f6 and bishop b4 both check the e1 king... use a real
        // double check position
        let pos = Position::from_fen(
            "rnbqk1nr/pppp1ppp/8/4p3/1b6/3P1P2/PPP1PK1P/RNBQ1BNR w kq - 3 4",
            false,
        )
        .unwrap();
        if pos.in_check() {
            for m in pos.generate_legal_moves().iter() {
                let moved = pos.board().piece_at(m.from()).unwrap();
                let checkers = pos.board().attackers_of(
                    pos.board().king_square(Color::White),
                    Color::Black,
                );
                if checkers.popcount() >= 2 {
                    assert_eq!(moved.kind(), PieceKind::King);
                }
            }
        }
    }

    #[test]
    fn test_pseudo_legal_rejects_garbage() {
        let pos = Position::new();
        // No piece on e4
        assert!(!pos.is_pseudo_legal(Move::new(Square::new(3, 4), Square::new(4, 4))));
        // Black piece while white to move
        assert!(!pos.is_pseudo_legal(Move::new(Square::new(6, 0), Square::new(5, 0))));
        // Knight jump to an unreachable square
        assert!(!pos.is_pseudo_legal(Move::new(Square::new(0, 1), Square::new(3, 1))));
        // Blocked rook slide
        assert!(!pos.is_pseudo_legal(Move::new(Square::A1, Square::new(4, 0))));
        // Legal-looking moves pass
        assert!(pos.is_pseudo_legal(Move::new(Square::new(0, 6), Square::new(2, 5))));
        assert!(pos.is_pseudo_legal(Move::double_push(Square::new(1, 4), Square::new(3, 4))));
    }

    #[test]
    fn test_pseudo_legal_accepts_generated_moves() {
        for fen in [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
        ] {
            let pos = Position::from_fen(fen, false).unwrap();
            for m in pos.generate_pseudo_legal_moves(MoveGen::All).iter() {
                assert!(pos.is_pseudo_legal(m), "generated move {m:?} in {fen}");
            }
        }
    }

    #[test]
    fn test_uci_castling_normalization() {
        let mut pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", false).unwrap();
        let m = pos.push_uci("e1g1", false).unwrap();
        assert!(m.is_castling());
        assert_eq!(m.to(), Square::H1);

        // 960 style: king takes rook
        let mut pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", true).unwrap();
        let m = pos.push_uci("e1h1", true).unwrap();
        assert!(m.is_short_castle());
    }

    #[test]
    fn test_uci_rejects_illegal() {
        let mut pos = Position::new();
        assert!(pos.push_uci("e2e5", false).is_err());
        assert!(pos.push_uci("zzzz", false).is_err());
        assert!(pos.push_uci("e7e5", false).is_err());
    }
}
