//! A single ply's board state and move application.
//!
//! `Board` is a self-contained snapshot: piece bitboards, a mailbox,
//! clocks, castling rights, the threat map and the incrementally
//! maintained zobrist hashes. `Position` stacks these snapshots; applying
//! a move copies the top and mutates the copy.

use super::attack_tables;
use super::types::{
    castling_destinations, Bitboard, CastlingConfiguration, CastlingRights, Color, Move, Piece,
    PieceKind, Square,
};
use super::zobrist::ZOBRIST;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    /// Piece bitboards indexed by `Piece::index()`
    piece_bits: [Bitboard; 12],
    /// Per-color occupancy
    occupied: [Bitboard; 2],
    mailbox: [Option<Piece>; 64],
    side_to_move: Color,
    en_passant: Option<Square>,
    halfmove_clock: u8,
    fullmove_clock: u16,
    castling_rights: CastlingRights,
    /// Squares attacked by the side not to move
    pub(crate) threats: Bitboard,
    hash: u64,
    /// Zobrist of each side's non-pawn pieces, for correction history
    nonpawn_hash: [u64; 2],
}

impl Board {
    pub(crate) fn empty() -> Self {
        Board {
            piece_bits: [Bitboard::EMPTY; 12],
            occupied: [Bitboard::EMPTY; 2],
            mailbox: [None; 64],
            side_to_move: Color::White,
            en_passant: None,
            halfmove_clock: 0,
            fullmove_clock: 1,
            castling_rights: CastlingRights::NONE,
            threats: Bitboard::EMPTY,
            hash: 0,
            nonpawn_hash: [0; 2],
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    #[must_use]
    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    #[inline]
    #[must_use]
    pub fn en_passant_square(&self) -> Option<Square> {
        self.en_passant
    }

    #[inline]
    #[must_use]
    pub fn halfmove_clock(&self) -> u8 {
        self.halfmove_clock
    }

    #[inline]
    #[must_use]
    pub fn fullmove_clock(&self) -> u16 {
        self.fullmove_clock
    }

    #[inline]
    #[must_use]
    pub fn castling_rights(&self) -> CastlingRights {
        self.castling_rights
    }

    #[inline]
    #[must_use]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    #[inline]
    #[must_use]
    pub fn nonpawn_hash(&self, color: Color) -> u64 {
        self.nonpawn_hash[color.index()]
    }

    #[inline]
    #[must_use]
    pub fn piece_at(&self, sq: Square) -> Option<Piece> {
        self.mailbox[sq.index()]
    }

    /// Bitboard of one piece
    #[inline]
    #[must_use]
    pub fn pieces(&self, piece: Piece) -> Bitboard {
        self.piece_bits[piece.index()]
    }

    #[inline]
    #[must_use]
    pub fn pieces_of(&self, color: Color, kind: PieceKind) -> Bitboard {
        self.pieces(Piece::new(kind, color))
    }

    /// Both colors' pieces of a kind
    #[inline]
    #[must_use]
    pub fn pieces_of_kind(&self, kind: PieceKind) -> Bitboard {
        self.pieces_of(Color::White, kind) | self.pieces_of(Color::Black, kind)
    }

    #[inline]
    #[must_use]
    pub fn occupancy(&self, color: Color) -> Bitboard {
        self.occupied[color.index()]
    }

    #[inline]
    #[must_use]
    pub fn occupancy_all(&self) -> Bitboard {
        self.occupied[0] | self.occupied[1]
    }

    #[inline]
    #[must_use]
    pub fn king_square(&self, color: Color) -> Square {
        self.pieces_of(color, PieceKind::King).lsb()
    }

    /// Squares attacked by the side not to move
    #[inline]
    #[must_use]
    pub fn threats(&self) -> Bitboard {
        self.threats
    }

    /// True when a square is attacked by the side not to move
    #[inline]
    #[must_use]
    pub fn is_threatened(&self, sq: Square) -> bool {
        self.threats.contains(sq)
    }

    /// Piece count based game phase: minors + 2 * rooks + 4 * queens
    #[must_use]
    pub fn game_phase(&self) -> i32 {
        let minors = (self.pieces_of_kind(PieceKind::Knight) | self.pieces_of_kind(PieceKind::Bishop))
            .popcount() as i32;
        let rooks = self.pieces_of_kind(PieceKind::Rook).popcount() as i32;
        let queens = self.pieces_of_kind(PieceKind::Queen).popcount() as i32;
        minors + 2 * rooks + 4 * queens
    }

    /// Zugzwang guard for null-move pruning
    #[must_use]
    pub fn has_non_pawn_material(&self, color: Color) -> bool {
        !(self.occupancy(color)
            ^ self.pieces_of(color, PieceKind::Pawn)
            ^ self.pieces_of(color, PieceKind::King))
        .is_empty()
    }

    // =========================================================================
    // Piece placement
    // =========================================================================

    pub(crate) fn add_piece(&mut self, piece: Piece, sq: Square) {
        let bit = Bitboard::from_square(sq);
        debug_assert!(!self.occupancy_all().contains(sq));
        self.piece_bits[piece.index()] |= bit;
        self.occupied[piece.color().index()] |= bit;
        self.mailbox[sq.index()] = Some(piece);

        let key = ZOBRIST.piece_square[piece.index()][sq.index()];
        self.hash ^= key;
        if piece.kind() != PieceKind::Pawn {
            self.nonpawn_hash[piece.color().index()] ^= key;
        }
    }

    pub(crate) fn remove_piece(&mut self, piece: Piece, sq: Square) {
        let bit = Bitboard::from_square(sq);
        debug_assert_eq!(self.mailbox[sq.index()], Some(piece));
        self.piece_bits[piece.index()] ^= bit;
        self.occupied[piece.color().index()] ^= bit;
        self.mailbox[sq.index()] = None;

        let key = ZOBRIST.piece_square[piece.index()][sq.index()];
        self.hash ^= key;
        if piece.kind() != PieceKind::Pawn {
            self.nonpawn_hash[piece.color().index()] ^= key;
        }
    }

    pub(crate) fn grant_castling_right(&mut self, color: Color, short: bool) {
        if !self.castling_rights.has(color, short) {
            self.castling_rights.grant(color, short);
            self.hash ^= ZOBRIST.castling[castling_zobrist_index(color, short)];
        }
    }

    fn revoke_castling_right(&mut self, color: Color, short: bool) {
        if self.castling_rights.has(color, short) {
            self.castling_rights.revoke(color, short);
            self.hash ^= ZOBRIST.castling[castling_zobrist_index(color, short)];
        }
    }

    pub(crate) fn set_side_to_move(&mut self, color: Color) {
        if self.side_to_move != color {
            self.side_to_move = color;
            self.hash ^= ZOBRIST.side_to_move;
        }
    }

    pub(crate) fn set_clocks(&mut self, halfmove: u8, fullmove: u16) {
        self.halfmove_clock = halfmove;
        self.fullmove_clock = fullmove;
    }

    /// Set the en-passant target, but only when an enemy pawn actually
    /// stands next to the pushed pawn; a dead target would make transposed
    /// positions hash differently.
    pub(crate) fn set_en_passant_if_capturable(
        &mut self,
        target: Square,
        pushed_to: Square,
        capturer: Color,
    ) {
        let capturer = Piece::new(PieceKind::Pawn, capturer);
        let mut adjacent = Bitboard::EMPTY;
        if pushed_to.file() != 0 {
            adjacent |= Bitboard::from_square(pushed_to.offset(-1));
        }
        if pushed_to.file() != 7 {
            adjacent |= Bitboard::from_square(pushed_to.offset(1));
        }
        if self.pieces(capturer).intersects(adjacent) {
            self.en_passant = Some(target);
            self.hash ^= ZOBRIST.en_passant[target.file()];
        }
    }

    fn clear_en_passant(&mut self) {
        if let Some(old) = self.en_passant.take() {
            self.hash ^= ZOBRIST.en_passant[old.file()];
        }
    }

    // =========================================================================
    // Move application
    // =========================================================================

    /// Apply a move to this snapshot. The move must be pseudo-legal.
    /// Threats are not updated here; `Position::push` recomputes them.
    pub(crate) fn apply_move(&mut self, m: Move, config: &CastlingConfiguration) {
        debug_assert!(!m.is_null() && !m.is_empty());

        let us = self.side_to_move;
        let piece = self.mailbox[m.from().index()].expect("apply_move: from square empty");

        self.clear_en_passant();

        if m.is_castling() {
            self.apply_castling(m, us);
            self.halfmove_clock = self.halfmove_clock.saturating_add(1);
        } else {
            let captured = self.capture_target(m, us);
            if let Some((victim, victim_sq)) = captured {
                self.remove_piece(victim, victim_sq);
                self.update_rights_after_rook_capture(victim, victim_sq, config);
            }

            self.remove_piece(piece, m.from());
            let placed = match m.promotion_kind() {
                Some(kind) => Piece::new(kind, us),
                None => piece,
            };
            self.add_piece(placed, m.to());

            self.update_rights_after_move(piece, m.from(), config);

            if m.is_double_push() {
                let target = Square::from_index((m.from().index() + m.to().index()) / 2);
                self.set_en_passant_if_capturable(target, m.to(), us.opponent());
            }

            if piece.kind() == PieceKind::Pawn || captured.is_some() {
                self.halfmove_clock = 0;
            } else {
                self.halfmove_clock = self.halfmove_clock.saturating_add(1);
            }
        }

        self.side_to_move = us.opponent();
        self.hash ^= ZOBRIST.side_to_move;
        if self.side_to_move == Color::White {
            self.fullmove_clock += 1;
        }

        debug_assert_eq!(self.pieces_of(Color::White, PieceKind::King).popcount(), 1);
        debug_assert_eq!(self.pieces_of(Color::Black, PieceKind::King).popcount(), 1);
    }

    /// Apply a null move: flip the side and drop the en-passant target
    pub(crate) fn apply_null_move(&mut self) {
        self.clear_en_passant();
        self.side_to_move = self.side_to_move.opponent();
        self.hash ^= ZOBRIST.side_to_move;
        if self.side_to_move == Color::White {
            self.fullmove_clock += 1;
        }
    }

    /// The piece a move captures and where it stands, if any
    fn capture_target(&self, m: Move, us: Color) -> Option<(Piece, Square)> {
        if m.is_en_passant() {
            let victim_sq = m.to().offset(-us.forward());
            return Some((Piece::new(PieceKind::Pawn, us.opponent()), victim_sq));
        }
        self.mailbox[m.to().index()].map(|p| (p, m.to()))
    }

    /// Materialize castling: the move is encoded king-takes-own-rook, so
    /// the rook comes off its recorded starting square rather than an
    /// assumed corner (Chess960).
    fn apply_castling(&mut self, m: Move, us: Color) {
        let short = m.is_short_castle();
        let king = Piece::new(PieceKind::King, us);
        let rook = Piece::new(PieceKind::Rook, us);
        let (king_to, rook_to) = castling_destinations(us, short);

        self.remove_piece(king, m.from());
        self.remove_piece(rook, m.to());
        self.add_piece(king, king_to);
        self.add_piece(rook, rook_to);

        self.revoke_castling_right(us, true);
        self.revoke_castling_right(us, false);
    }

    fn update_rights_after_move(
        &mut self,
        piece: Piece,
        from: Square,
        config: &CastlingConfiguration,
    ) {
        match piece.kind() {
            PieceKind::King => {
                self.revoke_castling_right(piece.color(), true);
                self.revoke_castling_right(piece.color(), false);
            }
            PieceKind::Rook => {
                for short in [true, false] {
                    if from == config.rook_square(piece.color(), short) {
                        self.revoke_castling_right(piece.color(), short);
                    }
                }
            }
            _ => {}
        }
    }

    fn update_rights_after_rook_capture(
        &mut self,
        victim: Piece,
        victim_sq: Square,
        config: &CastlingConfiguration,
    ) {
        if victim.kind() != PieceKind::Rook {
            return;
        }
        for short in [true, false] {
            if victim_sq == config.rook_square(victim.color(), short) {
                self.revoke_castling_right(victim.color(), short);
            }
        }
    }

    // =========================================================================
    // Derived keys and threat recomputation
    // =========================================================================

    /// All squares attacked by `color`, ignoring pins
    #[must_use]
    pub fn compute_threats(&self, color: Color) -> Bitboard {
        let occupancy = self.occupancy_all();
        let mut threats = Bitboard::EMPTY;

        let pawns = self.pieces_of(color, PieceKind::Pawn);
        threats |= match color {
            Color::White => pawns.north().east() | pawns.north().west(),
            Color::Black => pawns.south().east() | pawns.south().west(),
        };

        for sq in self.pieces_of(color, PieceKind::Knight) {
            threats |= attack_tables::knight_attacks(sq);
        }
        threats |= attack_tables::king_attacks(self.king_square(color));
        for sq in self.pieces_of(color, PieceKind::Bishop) | self.pieces_of(color, PieceKind::Queen)
        {
            threats |= attack_tables::bishop_attacks(sq, occupancy);
        }
        for sq in self.pieces_of(color, PieceKind::Rook) | self.pieces_of(color, PieceKind::Queen) {
            threats |= attack_tables::rook_attacks(sq, occupancy);
        }
        threats
    }

    /// Pawn-structure key, derived on demand for the correction history
    #[must_use]
    pub fn pawn_hash(&self) -> u64 {
        murmur_mix(self.pieces_of(Color::White, PieceKind::Pawn).0)
            ^ murmur_mix(self.pieces_of(Color::Black, PieceKind::Pawn).0 ^ ZOBRIST.side_to_move)
    }

    /// Material key: packed piece counts, mixed
    #[must_use]
    pub fn material_key(&self) -> u64 {
        let mut packed = 0u64;
        let mut shift = 0;
        for color in [Color::White, Color::Black] {
            for kind in [
                PieceKind::Pawn,
                PieceKind::Knight,
                PieceKind::Bishop,
                PieceKind::Rook,
                PieceKind::Queen,
            ] {
                packed |= u64::from(self.pieces_of(color, kind).popcount()) << shift;
                shift += 6;
            }
        }
        murmur_mix(packed)
    }

    /// Recompute the full zobrist hash from scratch; the incremental hash
    /// must always equal this
    #[must_use]
    pub fn compute_hash_from_scratch(&self) -> u64 {
        let mut hash = 0u64;
        for sq in 0..64 {
            if let Some(piece) = self.mailbox[sq] {
                hash ^= ZOBRIST.piece_square[piece.index()][sq];
            }
        }
        if self.side_to_move == Color::Black {
            hash ^= ZOBRIST.side_to_move;
        }
        for idx in self.castling_rights.iter_indices() {
            hash ^= ZOBRIST.castling[idx];
        }
        if let Some(ep) = self.en_passant {
            hash ^= ZOBRIST.en_passant[ep.file()];
        }
        hash
    }

    /// K vs K, K+minor vs K, and same-colored-bishop KB vs KB are dead draws
    #[must_use]
    pub fn is_insufficient_material(&self) -> bool {
        let majors_or_pawns = self.pieces_of_kind(PieceKind::Pawn)
            | self.pieces_of_kind(PieceKind::Rook)
            | self.pieces_of_kind(PieceKind::Queen);
        if !majors_or_pawns.is_empty() {
            return false;
        }

        let knights = self.pieces_of_kind(PieceKind::Knight);
        let bishops = self.pieces_of_kind(PieceKind::Bishop);
        let minors = knights.popcount() + bishops.popcount();
        if minors <= 1 {
            return true;
        }
        if knights.is_empty() && bishops.popcount() == 2 {
            // One bishop each, same square color
            return self.pieces_of(Color::White, PieceKind::Bishop).popcount() == 1
                && (!bishops.intersects(Bitboard::LIGHT_SQUARES)
                    || !bishops.intersects(Bitboard::DARK_SQUARES));
        }
        false
    }
}

#[inline]
const fn castling_zobrist_index(color: Color, short: bool) -> usize {
    color.index() * 2 + if short { 0 } else { 1 }
}

/// Murmur3 finalizer, used for the derived pawn and material keys
#[inline]
#[must_use]
pub(crate) const fn murmur_mix(mut x: u64) -> u64 {
    x ^= x >> 33;
    x = x.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    x ^= x >> 33;
    x = x.wrapping_mul(0xC4CE_B9FE_1A85_EC53);
    x ^= x >> 33;
    x
}
