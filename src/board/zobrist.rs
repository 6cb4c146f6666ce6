//! Zobrist keys for incremental position hashing.
//!
//! 781 constants: 12x64 piece-square terms, one side-to-move term, four
//! castling terms and eight en-passant file terms. Generated once from a
//! fixed-seed RNG so that builds are reproducible.

use once_cell::sync::Lazy;
use rand::prelude::*;

pub(crate) struct ZobristKeys {
    /// Indexed by `Piece::index()` (0-11) and square
    pub(crate) piece_square: [[u64; 64]; 12],
    pub(crate) side_to_move: u64,
    /// Indexed by castling-right bit position (0-3)
    pub(crate) castling: [u64; 4],
    /// Indexed by en-passant file
    pub(crate) en_passant: [u64; 8],
}

impl ZobristKeys {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(0x5645_4E47_5541_5244);
        let mut piece_square = [[0u64; 64]; 12];
        for piece in &mut piece_square {
            for key in piece.iter_mut() {
                *key = rng.gen();
            }
        }
        let side_to_move = rng.gen();
        let mut castling = [0u64; 4];
        for key in &mut castling {
            *key = rng.gen();
        }
        let mut en_passant = [0u64; 8];
        for key in &mut en_passant {
            *key = rng.gen();
        }

        ZobristKeys {
            piece_square,
            side_to_move,
            castling,
            en_passant,
        }
    }
}

pub(crate) static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_keys_are_distinct() {
        let mut seen = HashSet::new();
        for piece in &ZOBRIST.piece_square {
            for &key in piece {
                assert!(seen.insert(key));
            }
        }
        assert!(seen.insert(ZOBRIST.side_to_move));
        for &key in &ZOBRIST.castling {
            assert!(seen.insert(key));
        }
        for &key in &ZOBRIST.en_passant {
            assert!(seen.insert(key));
        }
        assert_eq!(seen.len(), 12 * 64 + 1 + 4 + 8);
    }

    #[test]
    fn test_keys_are_deterministic() {
        let again = ZobristKeys::new();
        assert_eq!(again.side_to_move, ZOBRIST.side_to_move);
        assert_eq!(again.piece_square[3][17], ZOBRIST.piece_square[3][17]);
    }
}
