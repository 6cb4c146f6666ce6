//! Pseudo-legal move generation.
//!
//! Moves are generated in two classes: `Noisy` (captures, queen
//! promotions, en passant) and `Quiet` (everything else, including
//! under-promotions and castling). Castling legality is fully checked at
//! generation time, so castling moves coming out of the generator never
//! need the legality filter.

use super::attack_tables;
use super::position::Position;
use super::types::{
    castling_destinations, Bitboard, Color, Move, MoveList, PieceKind, Square,
};

/// Which class of moves to generate
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MoveGen {
    Noisy,
    Quiet,
    All,
}

impl Position {
    /// Generate pseudo-legal moves of the requested class
    #[must_use]
    pub fn generate_pseudo_legal_moves(&self, gen: MoveGen) -> MoveList {
        let mut moves = MoveList::new();
        match gen {
            MoveGen::Noisy => self.generate_class(&mut moves, true),
            MoveGen::Quiet => self.generate_class(&mut moves, false),
            MoveGen::All => {
                self.generate_class(&mut moves, true);
                self.generate_class(&mut moves, false);
            }
        }
        moves
    }

    /// Generate fully legal moves
    #[must_use]
    pub fn generate_legal_moves(&self) -> MoveList {
        let pseudo = self.generate_pseudo_legal_moves(MoveGen::All);
        let mut legal = MoveList::new();
        for m in pseudo.iter() {
            if self.is_legal(m) {
                legal.push(m);
            }
        }
        legal
    }

    fn generate_class(&self, moves: &mut MoveList, noisy: bool) {
        let board = self.board();
        let us = board.side_to_move();
        let friends = board.occupancy(us);
        let enemies = board.occupancy(us.opponent());
        let occupancy = friends | enemies;

        self.generate_pawn_moves(moves, noisy);

        // The class filter for leapers and sliders: captures or empties
        let filter = if noisy { enemies } else { !occupancy };

        for from in board.pieces_of(us, PieceKind::Knight) {
            let targets = attack_tables::knight_attacks(from) & filter;
            push_targets(moves, from, targets);
        }

        let king_sq = board.king_square(us);
        let targets = attack_tables::king_attacks(king_sq) & filter;
        push_targets(moves, king_sq, targets);
        if !noisy {
            self.generate_castling_moves(moves);
        }

        for from in board.pieces_of(us, PieceKind::Bishop) {
            let targets = attack_tables::bishop_attacks(from, occupancy) & !friends & filter;
            push_targets(moves, from, targets);
        }
        for from in board.pieces_of(us, PieceKind::Rook) {
            let targets = attack_tables::rook_attacks(from, occupancy) & !friends & filter;
            push_targets(moves, from, targets);
        }
        for from in board.pieces_of(us, PieceKind::Queen) {
            let targets = attack_tables::queen_attacks(from, occupancy) & !friends & filter;
            push_targets(moves, from, targets);
        }
    }

    fn generate_pawn_moves(&self, moves: &mut MoveList, noisy: bool) {
        let board = self.board();
        let us = board.side_to_move();
        let enemies = board.occupancy(us.opponent());
        let occupancy = board.occupancy_all();
        let forward = us.forward();
        let promotion_rank = us.opponent().back_rank();
        let start_rank = match us {
            Color::White => 1,
            Color::Black => 6,
        };

        for from in board.pieces_of(us, PieceKind::Pawn) {
            let push_to = from.offset(forward);

            // Pushes and push-promotions
            if !occupancy.contains(push_to) {
                if push_to.rank() == promotion_rank {
                    if noisy {
                        moves.push(Move::promotion(from, push_to, PieceKind::Queen));
                    } else {
                        for kind in [PieceKind::Knight, PieceKind::Bishop, PieceKind::Rook] {
                            moves.push(Move::promotion(from, push_to, kind));
                        }
                    }
                } else if !noisy {
                    moves.push(Move::new(from, push_to));
                    if from.rank() == start_rank {
                        let double_to = push_to.offset(forward);
                        if !occupancy.contains(double_to) {
                            moves.push(Move::double_push(from, double_to));
                        }
                    }
                }
            }

            // Captures, capture-promotions and en passant
            let attacks = attack_tables::pawn_attacks(us, from);
            if noisy {
                for to in attacks & enemies {
                    if to.rank() == promotion_rank {
                        for kind in [
                            PieceKind::Queen,
                            PieceKind::Knight,
                            PieceKind::Bishop,
                            PieceKind::Rook,
                        ] {
                            moves.push(Move::promotion(from, to, kind));
                        }
                    } else {
                        moves.push(Move::new(from, to));
                    }
                }
                if let Some(target) = board.en_passant_square() {
                    if attacks.contains(target) {
                        moves.push(Move::en_passant(from, target));
                    }
                }
            }
        }
    }

    /// Castling, emitted as king-takes-own-rook. The emptiness and safety
    /// conditions are verified here, so generated castling moves are legal.
    fn generate_castling_moves(&self, moves: &mut MoveList) {
        let board = self.board();
        let us = board.side_to_move();
        if !board.castling_rights().has_any(us) {
            return;
        }

        let king_sq = board.king_square(us);
        let occupancy = board.occupancy_all();

        for short in [true, false] {
            if !board.castling_rights().has(us, short) {
                continue;
            }
            let rook_sq = self.castling_config().rook_square(us, short);
            let (king_to, rook_to) = castling_destinations(us, short);

            // Squares that must be empty, treating the king and rook
            // themselves as absent (they may cross each other in 960)
            let path = attack_tables::short_connecting_ray(king_sq, king_to)
                | Bitboard::from_square(king_to)
                | attack_tables::short_connecting_ray(rook_sq, rook_to)
                | Bitboard::from_square(rook_to);
            let mock_occupancy =
                occupancy ^ Bitboard::from_square(king_sq) ^ Bitboard::from_square(rook_sq);
            if path.intersects(mock_occupancy) {
                continue;
            }

            // No square the king stands on or crosses may be attacked
            let king_path = attack_tables::short_connecting_ray(king_sq, king_to)
                | Bitboard::from_square(king_sq)
                | Bitboard::from_square(king_to);
            if king_path.intersects(board.threats) {
                continue;
            }

            moves.push(if short {
                Move::short_castle(king_sq, rook_sq)
            } else {
                Move::long_castle(king_sq, rook_sq)
            });
        }
    }
}

#[inline]
fn push_targets(moves: &mut MoveList, from: Square, targets: Bitboard) {
    for to in targets {
        moves.push(Move::new(from, to));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startpos_move_count() {
        let pos = Position::new();
        assert_eq!(pos.generate_legal_moves().len(), 20);
        // 16 pawn moves + 4 knight moves, all quiet
        assert_eq!(
            pos.generate_pseudo_legal_moves(MoveGen::Quiet).len(),
            20
        );
        assert!(pos.generate_pseudo_legal_moves(MoveGen::Noisy).is_empty());
    }

    #[test]
    fn test_noisy_quiet_partition() {
        let fens = [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
        ];
        for fen in fens {
            let pos = Position::from_fen(fen, false).unwrap();
            let all = pos.generate_pseudo_legal_moves(MoveGen::All);
            let noisy = pos.generate_pseudo_legal_moves(MoveGen::Noisy);
            let quiet = pos.generate_pseudo_legal_moves(MoveGen::Quiet);
            assert_eq!(all.len(), noisy.len() + quiet.len(), "fen: {fen}");
            for m in noisy.iter() {
                assert!(!quiet.contains(m));
            }
        }
    }

    #[test]
    fn test_castling_generated_when_legal() {
        let pos =
            Position::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", false).unwrap();
        let moves = pos.generate_legal_moves();
        let castles: Vec<Move> = moves.iter().filter(|m| m.is_castling()).collect();
        assert_eq!(castles.len(), 2);
    }

    #[test]
    fn test_castling_blocked_by_attack() {
        // Black rook on e8-g8 line attacks f1: no short castle for white
        let pos =
            Position::from_fen("4k1r1/8/8/8/8/8/8/R3K2R w KQ - 0 1", false).unwrap();
        let moves = pos.generate_legal_moves();
        let castles: Vec<Move> = moves.iter().filter(|m| m.is_castling()).collect();
        assert_eq!(castles.len(), 1);
        assert!(!castles[0].is_short_castle());
    }

    #[test]
    fn test_castling_not_out_of_check() {
        let pos =
            Position::from_fen("4r1k1/8/8/8/8/8/8/R3K2R w KQ - 0 1", false).unwrap();
        let moves = pos.generate_legal_moves();
        assert!(moves.iter().all(|m| !m.is_castling()));
    }

    #[test]
    fn test_960_castling_king_takes_rook() {
        let pos = Position::from_fen(
            "brnqnbkr/pppppppp/8/8/8/8/PPPPPPPP/BRNQNBKR w KQkq - 0 1",
            true,
        )
        .unwrap();
        // King g1, short rook h1: needs f1/g1 clear for king, g1/f1 for
        // rook; blocked here by the f1 bishop
        let moves = pos.generate_legal_moves();
        assert!(moves.iter().all(|m| !m.is_castling()));
    }

    #[test]
    fn test_promotions_split_by_class() {
        let pos = Position::from_fen("8/4P3/8/8/8/1k6/8/4K3 w - - 0 1", false).unwrap();
        let noisy = pos.generate_pseudo_legal_moves(MoveGen::Noisy);
        let quiet = pos.generate_pseudo_legal_moves(MoveGen::Quiet);
        assert_eq!(
            noisy
                .iter()
                .filter(|m| m.promotion_kind() == Some(PieceKind::Queen))
                .count(),
            1
        );
        assert_eq!(quiet.iter().filter(|m| m.is_promotion()).count(), 3);
    }

    #[test]
    fn test_en_passant_generated() {
        let pos = Position::from_fen(
            "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
            false,
        )
        .unwrap();
        let noisy = pos.generate_pseudo_legal_moves(MoveGen::Noisy);
        assert_eq!(noisy.iter().filter(|m| m.is_en_passant()).count(), 1);
    }
}
