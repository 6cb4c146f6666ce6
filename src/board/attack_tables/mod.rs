//! Process-wide immutable attack tables.
//!
//! Leaper attacks are simple per-square lookups; sliding attacks go
//! through magic bitboards. The connecting-ray tables support castling
//! legality, check evasion and the pin-aware parts of SEE.

mod leapers;
mod magics;

use once_cell::sync::Lazy;

use super::types::{Bitboard, Color, Square};
use leapers::{KING_ATTACKS, KNIGHT_ATTACKS, PAWN_ATTACKS};
use magics::Magics;

static MAGICS: Lazy<Magics> = Lazy::new(Magics::new);

/// Strictly-between squares for every aligned square pair, empty otherwise
static BETWEEN: Lazy<Box<[[u64; 64]; 64]>> = Lazy::new(|| {
    let mut table = vec![[0u64; 64]; 64];
    for a in 0..64 {
        for b in 0..64 {
            if a == b {
                continue;
            }
            let b_bit = 1u64 << b;
            if MAGICS.rook_attacks(a, 0) & b_bit != 0 {
                table[a][b] = MAGICS.rook_attacks(a, b_bit) & MAGICS.rook_attacks(b, 1 << a);
            } else if MAGICS.bishop_attacks(a, 0) & b_bit != 0 {
                table[a][b] = MAGICS.bishop_attacks(a, b_bit) & MAGICS.bishop_attacks(b, 1 << a);
            }
        }
    }
    table.into_boxed_slice().try_into().unwrap()
});

/// Full line through every aligned square pair (both endpoints included),
/// empty otherwise
static LINE: Lazy<Box<[[u64; 64]; 64]>> = Lazy::new(|| {
    let mut table = vec![[0u64; 64]; 64];
    for a in 0..64 {
        for b in 0..64 {
            if a == b {
                continue;
            }
            let ends = (1u64 << a) | (1u64 << b);
            if MAGICS.rook_attacks(a, 0) & (1u64 << b) != 0 {
                table[a][b] = (MAGICS.rook_attacks(a, 0) & MAGICS.rook_attacks(b, 0)) | ends;
            } else if MAGICS.bishop_attacks(a, 0) & (1u64 << b) != 0 {
                table[a][b] = (MAGICS.bishop_attacks(a, 0) & MAGICS.bishop_attacks(b, 0)) | ends;
            }
        }
    }
    table.into_boxed_slice().try_into().unwrap()
});

/// Force initialization of every attack table. Called once at startup so
/// the first search does not pay the magic-search cost.
pub fn init() {
    Lazy::force(&MAGICS);
    Lazy::force(&BETWEEN);
    Lazy::force(&LINE);
    Lazy::force(&KNIGHT_ATTACKS);
    Lazy::force(&KING_ATTACKS);
    Lazy::force(&PAWN_ATTACKS);
}

#[inline]
#[must_use]
pub fn knight_attacks(sq: Square) -> Bitboard {
    Bitboard(KNIGHT_ATTACKS[sq.index()])
}

#[inline]
#[must_use]
pub fn king_attacks(sq: Square) -> Bitboard {
    Bitboard(KING_ATTACKS[sq.index()])
}

/// Squares a pawn of `color` on `sq` attacks
#[inline]
#[must_use]
pub fn pawn_attacks(color: Color, sq: Square) -> Bitboard {
    Bitboard(PAWN_ATTACKS[color.index()][sq.index()])
}

#[inline]
#[must_use]
pub fn bishop_attacks(sq: Square, occupancy: Bitboard) -> Bitboard {
    Bitboard(MAGICS.bishop_attacks(sq.index(), occupancy.0))
}

#[inline]
#[must_use]
pub fn rook_attacks(sq: Square, occupancy: Bitboard) -> Bitboard {
    Bitboard(MAGICS.rook_attacks(sq.index(), occupancy.0))
}

#[inline]
#[must_use]
pub fn queen_attacks(sq: Square, occupancy: Bitboard) -> Bitboard {
    bishop_attacks(sq, occupancy) | rook_attacks(sq, occupancy)
}

/// Squares strictly between `a` and `b` when they share a rank, file or
/// diagonal; empty otherwise
#[inline]
#[must_use]
pub fn short_connecting_ray(a: Square, b: Square) -> Bitboard {
    Bitboard(BETWEEN[a.index()][b.index()])
}

/// The full line through `a` and `b` (endpoints included) when they are
/// aligned; empty otherwise
#[inline]
#[must_use]
pub fn long_ray_through(a: Square, b: Square) -> Bitboard {
    Bitboard(LINE[a.index()][b.index()])
}
