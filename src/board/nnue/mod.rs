//! NNUE evaluation.
//!
//! A horizontally mirrored perspective net with input buckets chosen by
//! the king's position and output buckets chosen by the remaining piece
//! count. The first layer is maintained incrementally in an accumulator
//! stack; king moves that cross the mirror line or change input bucket
//! trigger a refresh backed by a per-bucket cache of the last seen board.
//!
//! Architecture: (768 -> 1600) x 2 perspectives -> 1, `SCReLU` activation.

pub mod accumulator;
pub mod network;
pub mod simd;

pub use accumulator::EvaluationState;
pub use network::{Network, NETWORK};

use super::types::{Color, Piece, Square};

/// Input features per perspective: 64 squares x 6 kinds x 2 colors
pub const FEATURE_SIZE: usize = 768;

/// First-layer width per perspective
pub const HIDDEN_SIZE: usize = 1600;

/// Number of king-position input buckets
pub const INPUT_BUCKETS: usize = 14;

/// Number of piece-count output buckets
pub const OUTPUT_BUCKETS: usize = 8;

/// Feature weight quantization factor
pub const QA: i32 = 255;

/// Output weight quantization factor
pub const QB: i32 = 64;

/// Evaluation scale factor
pub const SCALE: i32 = 400;

/// King-position to input-bucket map over the left half-board,
/// king's-side-relative (rank-major, 4 files per rank)
const INPUT_BUCKET_MAP: [usize; 32] = [
    0, 1, 2, 3, //
    4, 5, 6, 7, //
    8, 8, 9, 9, //
    10, 10, 11, 11, //
    10, 10, 11, 11, //
    12, 12, 13, 13, //
    12, 12, 13, 13, //
    12, 12, 13, 13,
];

/// Input bucket for a king square, seen from `side`'s perspective
#[inline]
#[must_use]
pub fn input_bucket(king_sq: Square, side: Color) -> usize {
    let relative = match side {
        Color::White => king_sq,
        Color::Black => king_sq.flip_rank(),
    };
    let file = if relative.file() < 4 {
        relative.file()
    } else {
        relative.file() ^ 7
    };
    INPUT_BUCKET_MAP[relative.rank() * 4 + file]
}

/// Output bucket from the total piece count
#[inline]
#[must_use]
pub fn output_bucket(piece_count: u32) -> usize {
    const DIVISOR: usize = 32usize.div_ceil(OUTPUT_BUCKETS);
    (piece_count as usize - 2) / DIVISOR
}

/// First-layer feature index of `piece` on `sq` from `side`'s view.
/// The board is mirrored horizontally whenever that perspective's king
/// stands on the right half (files e-h).
#[inline]
#[must_use]
pub fn feature_index(side: Color, king_sq: Square, piece: Piece, sq: Square) -> usize {
    let color_term = if piece.color() == side { 0 } else { 384 };
    let mirrored = if king_sq.on_left_half() { sq } else { sq.mirror_file() };
    let relative = match side {
        Color::White => mirrored,
        Color::Black => mirrored.flip_rank(),
    };
    color_term + piece.kind().index() * 64 + relative.index()
}
