//! FEN parsing and formatting.
//!
//! Standard six-field FEN. For Chess960 the castling field names the
//! castling rooks by file letter (`A-H`/`a-h`, Shredder style); `KQkq`
//! is also accepted and resolves to the outermost rooks. The en-passant
//! field is only honored when a pawn stands ready to capture, and only
//! emitted when such a capture is actually legal.

use std::fmt;

use super::position::Position;
use super::state::Board;
use super::types::{CastlingConfiguration, Color, Piece, PieceKind, Square};

/// Error from parsing a square name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquareParseError {
    notation: String,
}

impl SquareParseError {
    pub(crate) fn new(s: &str) -> Self {
        SquareParseError {
            notation: s.to_string(),
        }
    }
}

impl fmt::Display for SquareParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid square '{}'", self.notation)
    }
}

impl std::error::Error for SquareParseError {}

/// Error from parsing a FEN string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    /// Wrong number of whitespace-separated fields
    FieldCount { found: usize },
    /// Bad character or geometry in the piece placement field
    BadPlacement(String),
    /// A side has no king or more than one
    KingCount,
    /// Side-to-move field is not `w` or `b`
    BadSideToMove(String),
    /// Unrecognized castling field
    BadCastling(String),
    /// Castling right without a matching rook
    MissingCastlingRook(char),
    /// Bad en-passant field
    BadEnPassant(String),
    /// Unparseable halfmove or fullmove clock
    BadClock(String),
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenError::FieldCount { found } => {
                write!(f, "expected 6 FEN fields, found {found}")
            }
            FenError::BadPlacement(s) => write!(f, "bad piece placement: {s}"),
            FenError::KingCount => write!(f, "each side needs exactly one king"),
            FenError::BadSideToMove(s) => write!(f, "bad side to move '{s}'"),
            FenError::BadCastling(s) => write!(f, "bad castling field '{s}'"),
            FenError::MissingCastlingRook(c) => {
                write!(f, "castling right '{c}' has no matching rook")
            }
            FenError::BadEnPassant(s) => write!(f, "bad en passant field '{s}'"),
            FenError::BadClock(s) => write!(f, "bad clock field '{s}'"),
        }
    }
}

impl std::error::Error for FenError {}

/// Parse a FEN into a position
pub(crate) fn parse(fen: &str, chess960: bool) -> Result<Position, FenError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    if fields.len() != 6 {
        return Err(FenError::FieldCount {
            found: fields.len(),
        });
    }

    let mut board = Board::empty();
    parse_placement(&mut board, fields[0])?;

    for color in [Color::White, Color::Black] {
        if board.pieces_of(color, PieceKind::King).popcount() != 1 {
            return Err(FenError::KingCount);
        }
    }

    let side = match fields[1] {
        "w" => Color::White,
        "b" => Color::Black,
        other => return Err(FenError::BadSideToMove(other.to_string())),
    };
    board.set_side_to_move(side);

    let config = parse_castling(&mut board, fields[2], chess960)?;

    if fields[3] != "-" {
        let target: Square = fields[3]
            .parse()
            .map_err(|_| FenError::BadEnPassant(fields[3].to_string()))?;
        let expected_rank = match side {
            Color::White => 5,
            Color::Black => 2,
        };
        if target.rank() != expected_rank {
            return Err(FenError::BadEnPassant(fields[3].to_string()));
        }
        // The pushed pawn sits one square beyond the target from the
        // capturer's point of view
        let pushed_to = target.offset(-side.forward());
        board.set_en_passant_if_capturable(target, pushed_to, side);
    }

    let halfmove: u8 = fields[4]
        .parse()
        .map_err(|_| FenError::BadClock(fields[4].to_string()))?;
    let fullmove: u16 = fields[5]
        .parse()
        .map_err(|_| FenError::BadClock(fields[5].to_string()))?;
    board.set_clocks(halfmove, fullmove);

    board.threats = board.compute_threats(side.opponent());
    Ok(Position::from_parts(board, config))
}

fn parse_placement(board: &mut Board, field: &str) -> Result<(), FenError> {
    let mut rank = 7i32;
    let mut file = 0i32;
    for c in field.chars() {
        match c {
            '/' => {
                if file != 8 {
                    return Err(FenError::BadPlacement(field.to_string()));
                }
                rank -= 1;
                file = 0;
            }
            '1'..='8' => file += c as i32 - '0' as i32,
            _ => {
                let piece =
                    Piece::from_char(c).ok_or_else(|| FenError::BadPlacement(field.to_string()))?;
                if rank < 0 || file > 7 {
                    return Err(FenError::BadPlacement(field.to_string()));
                }
                board.add_piece(piece, Square::new(rank as usize, file as usize));
                file += 1;
            }
        }
        if file > 8 || rank < 0 {
            return Err(FenError::BadPlacement(field.to_string()));
        }
    }
    if rank != 0 || file != 8 {
        return Err(FenError::BadPlacement(field.to_string()));
    }
    Ok(())
}

fn parse_castling(
    board: &mut Board,
    field: &str,
    chess960: bool,
) -> Result<CastlingConfiguration, FenError> {
    let mut config = CastlingConfiguration::default();
    if field == "-" {
        return Ok(config);
    }

    for c in field.chars() {
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        let king_file = board.king_square(color).file();
        let back_rank = color.back_rank();

        let rook_square = match c.to_ascii_uppercase() {
            'A'..='H' if chess960 => Square::new(back_rank, c.to_ascii_uppercase() as usize - 'A' as usize),
            'K' => outermost_rook(board, color, true).ok_or(FenError::MissingCastlingRook(c))?,
            'Q' => outermost_rook(board, color, false).ok_or(FenError::MissingCastlingRook(c))?,
            _ => return Err(FenError::BadCastling(field.to_string())),
        };

        if !board.pieces_of(color, PieceKind::Rook).contains(rook_square) {
            return Err(FenError::MissingCastlingRook(c));
        }

        let short = rook_square.file() > king_file;
        config.set_rook_square(color, short, rook_square);
        board.grant_castling_right(color, short);
    }
    Ok(config)
}

/// The outermost back-rank rook on the king's short or long side
fn outermost_rook(board: &Board, color: Color, short: bool) -> Option<Square> {
    let back_rank = color.back_rank();
    let king_file = board.king_square(color).file();
    let rooks = board.pieces_of(color, PieceKind::Rook);
    let candidates: Vec<Square> = (0..8)
        .map(|f| Square::new(back_rank, f))
        .filter(|&sq| rooks.contains(sq))
        .filter(|&sq| (sq.file() > king_file) == short)
        .collect();
    if short {
        candidates.last().copied()
    } else {
        candidates.first().copied()
    }
}

/// Format the current position as a FEN string
#[must_use]
pub(crate) fn format(pos: &Position, chess960: bool) -> String {
    let board = pos.board();
    let mut fen = String::new();

    for rank in (0..8).rev() {
        let mut empty = 0;
        for file in 0..8 {
            match board.piece_at(Square::new(rank, file)) {
                Some(piece) => {
                    if empty > 0 {
                        fen.push(char::from_digit(empty, 10).expect("digit"));
                        empty = 0;
                    }
                    fen.push(piece.to_char());
                }
                None => empty += 1,
            }
        }
        if empty > 0 {
            fen.push(char::from_digit(empty, 10).expect("digit"));
        }
        if rank > 0 {
            fen.push('/');
        }
    }

    fen.push(' ');
    fen.push(match board.side_to_move() {
        Color::White => 'w',
        Color::Black => 'b',
    });

    fen.push(' ');
    let rights = board.castling_rights();
    if rights.is_empty() {
        fen.push('-');
    } else {
        for (color, short, standard) in [
            (Color::White, true, 'K'),
            (Color::White, false, 'Q'),
            (Color::Black, true, 'k'),
            (Color::Black, false, 'q'),
        ] {
            if rights.has(color, short) {
                if chess960 {
                    let file = pos.castling_config().rook_square(color, short).file();
                    let letter = (b'A' + file as u8) as char;
                    fen.push(match color {
                        Color::White => letter,
                        Color::Black => letter.to_ascii_lowercase(),
                    });
                } else {
                    fen.push(standard);
                }
            }
        }
    }

    fen.push(' ');
    match legal_en_passant_target(pos) {
        Some(sq) => fen.push_str(&sq.to_string()),
        None => fen.push('-'),
    }

    fen.push_str(&format!(
        " {} {}",
        board.halfmove_clock(),
        board.fullmove_clock()
    ));
    fen
}

/// The en-passant target, but only when capturing it is actually legal
fn legal_en_passant_target(pos: &Position) -> Option<Square> {
    let target = pos.board().en_passant_square()?;
    let moves = pos.generate_legal_moves();
    let has_en_passant = moves.iter().any(|m| m.is_en_passant());
    has_en_passant.then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::position::STARTPOS_FEN;

    #[test]
    fn test_startpos_roundtrip() {
        let pos = Position::from_fen(STARTPOS_FEN, false).unwrap();
        assert_eq!(format(&pos, false), STARTPOS_FEN);
    }

    #[test]
    fn test_kiwipete_roundtrip() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let pos = Position::from_fen(fen, false).unwrap();
        assert_eq!(format(&pos, false), fen);
    }

    #[test]
    fn test_ep_field_kept_when_capturable() {
        let fen = "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3";
        let pos = Position::from_fen(fen, false).unwrap();
        assert_eq!(pos.board().en_passant_square(), Some("f6".parse().unwrap()));
        assert_eq!(format(&pos, false), fen);
    }

    #[test]
    fn test_ep_field_dropped_when_no_capturer() {
        // e3 target but no black pawn on d4/f4
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1";
        let pos = Position::from_fen(fen, false).unwrap();
        assert_eq!(pos.board().en_passant_square(), None);
        assert!(format(&pos, false).contains(" - "));
    }

    #[test]
    fn test_ep_field_dropped_when_pinned() {
        // The only capturing pawn is pinned horizontally: b5xc6 would
        // expose the white king on a5 to the h5 rook
        let fen = "4k3/8/8/KPp4r/8/8/8/8 w - c6 0 2";
        let pos = Position::from_fen(fen, false).unwrap();
        assert!(format(&pos, false).contains(" - "));
    }

    #[test]
    fn test_shredder_castling_960() {
        let fen = "1rqbkrbn/1ppppp1p/1n6/p1N3p1/8/2P4P/PP1PPPP1/1RQBKRBN w FBfb - 0 9";
        let pos = Position::from_fen(fen, true).unwrap();
        let config = pos.castling_config();
        assert_eq!(config.rook_square(Color::White, true).file(), 5);
        assert_eq!(config.rook_square(Color::White, false).file(), 1);
        assert_eq!(format(&pos, true), fen);
    }

    #[test]
    fn test_kqkq_in_960_mode_finds_outer_rooks() {
        let pos = Position::from_fen(STARTPOS_FEN, true).unwrap();
        let config = pos.castling_config();
        assert_eq!(config.rook_square(Color::White, true), Square::H1);
        assert_eq!(config.rook_square(Color::Black, false), Square::A8);
    }

    #[test]
    fn test_bad_fens_rejected() {
        assert!(Position::from_fen("invalid", false).is_err());
        assert!(Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0",
            false
        )
        .is_err());
        assert!(Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX w KQkq - 0 1",
            false
        )
        .is_err());
        // Two white kings
        assert!(Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNK w - - 0 1",
            false
        )
        .is_err());
        assert!(Position::from_fen(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1",
            false
        )
        .is_err());
    }
}
