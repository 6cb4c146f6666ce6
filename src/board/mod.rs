//! Position representation, move generation and evaluation.

pub mod attack_tables;
pub mod fen;
pub mod legality;
pub mod movegen;
pub mod nnue;
pub mod position;
pub mod see;
pub mod state;
pub mod types;
pub mod zobrist;

pub use fen::FenError;
pub use legality::MoveParseError;
pub use movegen::MoveGen;
pub use nnue::EvaluationState;
pub use position::{Position, STARTPOS_FEN};
pub use state::Board;
pub use types::{
    Bitboard, CastlingConfiguration, CastlingRights, Color, Move, MoveList, Piece, PieceKind,
    ScoredMove, Square, MAX_MOVES, MAX_PLY,
};
