//! The position: an append-only stack of board snapshots.
//!
//! Pushing a move copies the top board, applies the move and recomputes
//! the threat map; popping truncates. A parallel stack records each move
//! together with the piece that made it, which feeds the continuation
//! history and the lazy NNUE updates.

use super::fen::FenError;
use super::state::Board;
use super::types::{CastlingConfiguration, Color, Move, Piece, PieceKind, Square};

/// The classical starting position
pub const STARTPOS_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone)]
pub struct Position {
    states: Vec<Board>,
    /// Move history; `None` piece marks a null move
    moves: Vec<(Move, Option<Piece>)>,
    castling_config: CastlingConfiguration,
}

impl Position {
    /// The standard starting position
    #[must_use]
    pub fn new() -> Self {
        Self::from_fen(STARTPOS_FEN, false).expect("startpos FEN is valid")
    }

    pub(crate) fn from_parts(board: Board, castling_config: CastlingConfiguration) -> Self {
        let mut states = Vec::with_capacity(512);
        states.push(board);
        Position {
            states,
            moves: Vec::with_capacity(512),
            castling_config,
        }
    }

    /// Parse a FEN string. With `chess960` the castling field may name
    /// rook files (`A-H`/`a-h`); see [`super::fen`].
    pub fn from_fen(fen: &str, chess960: bool) -> Result<Self, FenError> {
        super::fen::parse(fen, chess960)
    }

    /// Format the current position as FEN. With `chess960` the castling
    /// field uses rook file letters.
    #[must_use]
    pub fn to_fen(&self, chess960: bool) -> String {
        super::fen::format(self, chess960)
    }

    /// A Chess960 (or DFRC) start position from scharnagl indices, each
    /// in `0..960`. Equal indices give a regular FRC start.
    #[must_use]
    pub fn from_frc(white_index: usize, black_index: usize) -> Self {
        assert!(white_index < 960 && black_index < 960);
        let mut board = Board::empty();

        let white_layout = frc_back_rank(white_index);
        let black_layout = frc_back_rank(black_index);
        for (file, &kind) in white_layout.iter().enumerate() {
            board.add_piece(Piece::new(kind, Color::White), Square::new(0, file));
            board.add_piece(Piece::new(PieceKind::Pawn, Color::White), Square::new(1, file));
        }
        for (file, &kind) in black_layout.iter().enumerate() {
            board.add_piece(Piece::new(kind, Color::Black), Square::new(7, file));
            board.add_piece(Piece::new(PieceKind::Pawn, Color::Black), Square::new(6, file));
        }

        let mut config = CastlingConfiguration::default();
        for color in [Color::White, Color::Black] {
            let rooks = board.pieces_of(color, PieceKind::Rook);
            config.set_rook_square(color, false, rooks.lsb());
            config.set_rook_square(color, true, rooks.msb());
            board.grant_castling_right(color, true);
            board.grant_castling_right(color, false);
        }

        board.threats = board.compute_threats(Color::Black);
        Position::from_parts(board, config)
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// The current (topmost) board
    #[inline]
    #[must_use]
    pub fn board(&self) -> &Board {
        self.states.last().expect("position stack is never empty")
    }

    #[inline]
    #[must_use]
    pub fn castling_config(&self) -> &CastlingConfiguration {
        &self.castling_config
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.board().hash()
    }

    #[inline]
    #[must_use]
    pub fn side_to_move(&self) -> Color {
        self.board().side_to_move()
    }

    /// Number of moves pushed since the base position
    #[inline]
    #[must_use]
    pub fn stack_height(&self) -> usize {
        self.moves.len()
    }

    /// The move made `plies_back` plies ago with its mover, if any.
    /// Null moves report `None` as the piece.
    #[must_use]
    pub fn previous_move(&self, plies_back: usize) -> Option<(Move, Option<Piece>)> {
        if plies_back == 0 || plies_back > self.moves.len() {
            return None;
        }
        Some(self.moves[self.moves.len() - plies_back])
    }

    /// Board snapshot `plies_back` plies ago (0 = current)
    #[must_use]
    pub(crate) fn board_at(&self, plies_back: usize) -> &Board {
        &self.states[self.states.len() - 1 - plies_back]
    }

    // =========================================================================
    // Push / pop
    // =========================================================================

    /// Apply a pseudo-legal move on a copy of the current board and push it
    pub fn push(&mut self, m: Move) {
        debug_assert!(!m.is_null());
        let moved = self.board().piece_at(m.from());
        let mut board = self.board().clone();
        board.apply_move(m, &self.castling_config);
        board.threats = board.compute_threats(board.side_to_move().opponent());
        self.states.push(board);
        self.moves.push((m, moved));
    }

    /// Push a null move (a pass)
    pub fn push_null(&mut self) {
        let mut board = self.board().clone();
        board.apply_null_move();
        board.threats = board.compute_threats(board.side_to_move().opponent());
        self.states.push(board);
        self.moves.push((Move::NULL, None));
    }

    /// Undo the most recent push
    pub fn pop(&mut self) {
        debug_assert!(self.states.len() > 1);
        self.states.pop();
        self.moves.pop();
    }

    // =========================================================================
    // Draw detection
    // =========================================================================

    /// Draw by the fifty-move rule, repetition or insufficient material.
    ///
    /// Inside the search (`at_root == false`) a single earlier occurrence
    /// of the current position counts; at the root a true threefold is
    /// required.
    #[must_use]
    pub fn is_draw(&self, at_root: bool) -> bool {
        let board = self.board();
        if board.halfmove_clock() >= 100 {
            return true;
        }
        if board.is_insufficient_material() {
            return true;
        }

        let hash = board.hash();
        let reach = (board.halfmove_clock() as usize).min(self.states.len() - 1);
        let mut repetitions = 0;
        // Positions with the other side to move can never repeat this one,
        // so step back two plies at a time
        let mut idx = self.states.len().wrapping_sub(3);
        let floor = self.states.len() - 1 - reach;
        while idx >= floor && idx < self.states.len() {
            if self.states[idx].hash() == hash {
                repetitions += 1;
                if !at_root || repetitions >= 2 {
                    return true;
                }
            }
            idx = idx.wrapping_sub(2);
        }
        false
    }

    // =========================================================================
    // Perft
    // =========================================================================

    /// Count leaf nodes of the legal move tree to `depth`
    #[must_use]
    pub fn perft(&mut self, depth: usize) -> u64 {
        if depth == 0 {
            return 1;
        }
        let moves = self.generate_pseudo_legal_moves(super::movegen::MoveGen::All);
        let mut nodes = 0;
        for m in moves.iter() {
            if !self.is_legal(m) {
                continue;
            }
            if depth == 1 {
                nodes += 1;
            } else {
                self.push(m);
                nodes += self.perft(depth - 1);
                self.pop();
            }
        }
        nodes
    }

    /// Perft with a per-move breakdown printed to stdout
    pub fn perft_divide(&mut self, depth: usize) -> u64 {
        let moves = self.generate_legal_moves();
        let mut total = 0;
        for m in moves.iter() {
            self.push(m);
            let count = if depth > 1 { self.perft(depth - 1) } else { 1 };
            self.pop();
            println!("{m}: {count}");
            total += count;
        }
        total
    }
}

impl Default for Position {
    fn default() -> Self {
        Position::new()
    }
}

/// Back-rank piece layout for a scharnagl index
/// (<https://en.wikipedia.org/wiki/Fischer_random_chess_numbering_scheme>)
fn frc_back_rank(index: usize) -> [PieceKind; 8] {
    use PieceKind::{Bishop, King, Knight, Queen, Rook};

    let mut layout: [Option<PieceKind>; 8] = [None; 8];

    // Bishops on opposite square colors
    let (rest, light) = (index / 4, index % 4);
    layout[light * 2 + 1] = Some(Bishop);
    let (rest, dark) = (rest / 4, rest % 4);
    layout[dark * 2] = Some(Bishop);

    // Queen on the n-th free square
    let (knights, queen) = (rest / 6, rest % 6);
    set_nth_free(&mut layout, queen, Queen);

    // The remaining five squares get N N R K R; the knight pair layout is
    // indexed 0-9 over the C(5,2) placements
    let (first, second) = match knights {
        0 => (0, 0),
        1 => (0, 1),
        2 => (0, 2),
        3 => (0, 3),
        4 => (1, 0),
        5 => (1, 1),
        6 => (1, 2),
        7 => (2, 0),
        8 => (2, 1),
        _ => (3, 0),
    };
    set_nth_free(&mut layout, first, Knight);
    set_nth_free(&mut layout, second + first, Knight);

    set_nth_free(&mut layout, 0, Rook);
    set_nth_free(&mut layout, 0, King);
    set_nth_free(&mut layout, 0, Rook);

    layout.map(|kind| kind.expect("all eight files are filled"))
}

fn set_nth_free(layout: &mut [Option<PieceKind>; 8], nth: usize, kind: PieceKind) {
    let mut free = 0;
    for slot in layout.iter_mut() {
        if slot.is_none() {
            if free == nth {
                *slot = Some(kind);
                return;
            }
            free += 1;
        }
    }
    unreachable!("fewer free squares than expected");
}
