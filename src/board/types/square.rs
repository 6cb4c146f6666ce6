//! Square type and utilities.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::board::fen::SquareParseError;

/// A square on the chess board, stored as a compact 0-63 index.
///
/// Little-endian rank-file layout: a1=0, b1=1, ..., h8=63.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Square(u8);

impl Square {
    pub const A1: Square = Square(0);
    pub const B1: Square = Square(1);
    pub const C1: Square = Square(2);
    pub const D1: Square = Square(3);
    pub const E1: Square = Square(4);
    pub const F1: Square = Square(5);
    pub const G1: Square = Square(6);
    pub const H1: Square = Square(7);
    pub const A8: Square = Square(56);
    pub const B8: Square = Square(57);
    pub const C8: Square = Square(58);
    pub const D8: Square = Square(59);
    pub const E8: Square = Square(60);
    pub const F8: Square = Square(61);
    pub const G8: Square = Square(62);
    pub const H8: Square = Square(63);

    /// Create a square from rank and file (both 0-7). No bounds checking.
    #[inline]
    #[must_use]
    pub const fn new(rank: usize, file: usize) -> Self {
        Square((rank * 8 + file) as u8)
    }

    /// Create a square from an index (0-63)
    #[inline]
    #[must_use]
    pub const fn from_index(idx: usize) -> Self {
        debug_assert!(idx < 64);
        Square(idx as u8)
    }

    /// Get the square's index (0-63)
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the rank (0-7, where 0 = rank 1)
    #[inline]
    #[must_use]
    pub const fn rank(self) -> usize {
        (self.0 >> 3) as usize
    }

    /// Get the file (0-7, where 0 = file a)
    #[inline]
    #[must_use]
    pub const fn file(self) -> usize {
        (self.0 & 7) as usize
    }

    /// Flip the square vertically (a1 <-> a8)
    #[inline]
    #[must_use]
    pub const fn flip_rank(self) -> Self {
        Square(self.0 ^ 56)
    }

    /// Mirror the square horizontally (a1 <-> h1)
    #[inline]
    #[must_use]
    pub const fn mirror_file(self) -> Self {
        Square(self.0 ^ 7)
    }

    /// Offset the square index by a signed delta. No bounds checking;
    /// callers must guarantee the result stays on the board.
    #[inline]
    #[must_use]
    pub const fn offset(self, delta: i8) -> Self {
        Square((self.0 as i8 + delta) as u8)
    }

    /// True when the square lies on the left half of the board (files a-d)
    #[inline]
    #[must_use]
    pub const fn on_left_half(self) -> bool {
        self.file() < 4
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            (self.file() as u8 + b'a') as char,
            self.rank() + 1
        )
    }
}

impl FromStr for Square {
    type Err = SquareParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(file_ch), Some(rank_ch), None) = (chars.next(), chars.next(), chars.next())
        else {
            return Err(SquareParseError::new(s));
        };

        let file = match file_ch {
            'a'..='h' => file_ch as usize - 'a' as usize,
            _ => return Err(SquareParseError::new(s)),
        };
        let rank = match rank_ch {
            '1'..='8' => rank_ch as usize - '1' as usize,
            _ => return Err(SquareParseError::new(s)),
        };

        Ok(Square::new(rank, file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_new() {
        let sq = Square::new(0, 0);
        assert_eq!(sq.rank(), 0);
        assert_eq!(sq.file(), 0);

        let sq = Square::new(7, 7);
        assert_eq!(sq.index(), 63);
    }

    #[test]
    fn test_square_flips() {
        assert_eq!(Square::A1.flip_rank(), Square::A8);
        assert_eq!(Square::A1.mirror_file(), Square::H1);
        assert_eq!(Square::E1.mirror_file(), Square::D1);
    }

    #[test]
    fn test_square_offset() {
        assert_eq!(Square::E1.offset(8), Square::new(1, 4));
        assert_eq!(Square::new(1, 4).offset(-8), Square::E1);
    }

    #[test]
    fn test_square_display() {
        assert_eq!(Square::A1.to_string(), "a1");
        assert_eq!(Square::H8.to_string(), "h8");
        assert_eq!(Square::new(3, 4).to_string(), "e4");
    }

    #[test]
    fn test_square_from_str() {
        let sq: Square = "e4".parse().unwrap();
        assert_eq!(sq, Square::new(3, 4));
        assert!("z1".parse::<Square>().is_err());
        assert!("a9".parse::<Square>().is_err());
        assert!("a".parse::<Square>().is_err());
        assert!("a1b".parse::<Square>().is_err());
    }

    #[test]
    fn test_left_half() {
        assert!(Square::D1.on_left_half());
        assert!(!Square::E1.on_left_half());
    }
}
