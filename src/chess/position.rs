//! Provides fully-specified [Chess Position] implementation: stores
//! information about the board and tracks the state of castling, 50-move rule
//! draw, etc.
//!
//! Move making and the legal move generator are also implemented here as the
//! way of producing new [`Position`]s.
//!
//! [Chess Position]: https://www.chessprogramming.org/Chess_Position

use std::fmt::{self, Write};

use anyhow::{bail, Context};

use crate::chess::attacks::{self, file_mask, rank_mask};
use crate::chess::bitboard::Bitboard;
use crate::chess::core::{
    Color, File, Move, MoveList, Piece, PieceKind, Rank, Square, BOARD_WIDTH,
};
use crate::chess::zobrist;

/// FEN of the standard chess starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Piece-centric implementation of the chess position: piece placement as one
/// bitboard per color and per piece kind, castling state as the set of rooks
/// that retain castling rights, plus all non-board state the rules need (side
/// to move, en passant, 50-move counter).
///
/// Three derived bitboards (`attacked`, `checkers`, `pins`) are recomputed
/// after every move so that the legal move generator and the game driver can
/// read them for free.
///
/// A `Position` is immutable once created: [`Position::play`] produces the
/// successor position and leaves the original untouched, which keeps the whole
/// game history alive for repetition scanning and PGN emission.
#[derive(Clone)]
pub struct Position {
    by_color: [Bitboard; 2],
    by_piece: [Bitboard; 6],
    /// Rooks that still have castling rights; in standard chess a subset of
    /// A1/H1/A8/H8.
    castle_rooks: Bitboard,
    /// Hash key of the position, covering everything except the 50-move
    /// counter.
    key: zobrist::Key,
    /// Squares attacked by the opponent of the side to move.
    attacked: Bitboard,
    /// Opponent pieces currently giving check.
    checkers: Bitboard,
    /// Our pieces pinned against our king.
    pins: Bitboard,
    last_move: Option<Move>,
    full_move: u16,
    turn: Color,
    en_passant: Option<Square>,
    /// Ply counter for the 50-move rule, ranging from 0 to 100 = draw (unless
    /// mated on the last ply).
    rule50: u8,
    /// Changes move<->string conversions ("e1h1" instead of "e1g1") and
    /// castling legality geometry.
    chess960: bool,
}

impl Position {
    /// Creates the starting position of standard chess.
    ///
    /// ```
    /// use gauntlet::chess::position::Position;
    ///
    /// assert_eq!(
    ///     &Position::starting().to_string(),
    ///     "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"
    /// );
    /// ```
    #[must_use]
    pub fn starting() -> Self {
        Self::from_fen(STARTING_FEN, false).expect("starting position is valid")
    }

    /// Parses a position from Forsyth-Edwards Notation and checks its
    /// correctness.
    ///
    /// FEN ::=
    ///       Piece Placement
    ///   ' ' Side to move
    ///   ' ' Castling ability
    ///   ' ' En passant target square
    ///  [' ' Halfmove clock
    ///  [' ' Fullmove counter]]
    ///
    /// The halfmove clock and fullmove counter are optional and default to
    /// "0 1": opening books commonly store trimmed EPD-style lines, and those
    /// should be playable.
    ///
    /// The castling field accepts standard `KQkq` letters and Chess960
    /// (Shredder-FEN) per-file letters `A`-`H`/`a`-`h`. Chess960 is
    /// auto-detected from the castling geometry unless `force960` is set:
    /// detection fires when a castle rook is not on file A/H or the king is
    /// not on file E.
    ///
    /// # Errors
    ///
    /// Malformed input and positions violating the structural invariants
    /// (piece counts, pawns on back ranks, impossible en passant squares,
    /// 50-move counter at or past 100) are rejected.
    pub fn from_fen(input: &str, force960: bool) -> anyhow::Result<Self> {
        let mut pos = Self {
            by_color: [Bitboard::empty(); 2],
            by_piece: [Bitboard::empty(); 6],
            castle_rooks: Bitboard::empty(),
            key: 0,
            attacked: Bitboard::empty(),
            checkers: Bitboard::empty(),
            pins: Bitboard::empty(),
            last_move: None,
            full_move: 1,
            turn: Color::White,
            en_passant: None,
            rule50: 0,
            chess960: force960,
        };

        let mut parts = input.split_whitespace();

        // Piece placement.
        let placement = parts.next().context("missing piece placement")?;
        let (mut rank, mut file) = (7i8, 0u8);
        for symbol in placement.chars() {
            match symbol {
                '0' => bail!("empty-square run can not be 0"),
                '1'..='8' => {
                    file += symbol as u8 - b'0';
                    if file > BOARD_WIDTH {
                        bail!("rank {} exceeds {BOARD_WIDTH} files", rank + 1);
                    }
                }
                '/' => {
                    if file != BOARD_WIDTH {
                        bail!("rank {} has {file} files instead of {BOARD_WIDTH}", rank + 1);
                    }
                    rank -= 1;
                    if rank < 0 {
                        bail!("expected 8 ranks, got more: {placement}");
                    }
                    file = 0;
                }
                _ => {
                    let piece = Piece::try_from(symbol)?;
                    if file >= BOARD_WIDTH {
                        bail!("rank {} exceeds {BOARD_WIDTH} files", rank + 1);
                    }
                    let square = Square::new(file.try_into()?, (rank as u8).try_into()?);
                    if pos.occupied().contains(square) {
                        bail!("square {square} occupied twice");
                    }
                    pos.set_square(piece.color, piece.kind, square);
                    file += 1;
                }
            }
        }
        if rank != 0 || file != BOARD_WIDTH {
            bail!("expected 8 full ranks, got {placement}");
        }

        // Side to move.
        pos.turn = parts.next().context("missing side to move")?.try_into()?;
        if pos.turn == Color::Black {
            pos.key ^= zobrist::side_to_move();
        }

        // The castling field needs the kings in place to resolve K/Q and to
        // auto-detect Chess960.
        for color in [Color::White, Color::Black] {
            if pos.pieces(color, PieceKind::King).count() != 1 {
                bail!(
                    "expected one {color} king, got {}",
                    pos.pieces(color, PieceKind::King).count()
                );
            }
        }

        // Castling rights.
        let castling = parts.next().context("missing castling rights")?;
        if castling != "-" {
            for symbol in castling.chars() {
                let color = if symbol.is_ascii_uppercase() {
                    Color::White
                } else {
                    Color::Black
                };
                let back = rank_mask(Rank::back_rank(color));
                let our_rooks = pos.pieces(color, PieceKind::Rook) & back;
                let rook = match symbol.to_ascii_uppercase() {
                    'K' => {
                        if our_rooks.is_empty() {
                            bail!("no castle rook for '{symbol}'");
                        }
                        our_rooks.msb()
                    }
                    'Q' => {
                        if our_rooks.is_empty() {
                            bail!("no castle rook for '{symbol}'");
                        }
                        our_rooks.lsb()
                    }
                    'A'..='H' => Square::new(
                        File::try_from(symbol.to_ascii_lowercase())?,
                        Rank::back_rank(color),
                    ),
                    _ => bail!("unknown castling symbol '{symbol}'"),
                };
                if pos.castle_rooks.contains(rook) {
                    bail!("duplicated castling right '{symbol}'");
                }
                pos.castle_rooks.set(rook);
            }
            if pos.castle_rooks.is_empty() {
                bail!("malformed castling rights '{castling}'");
            }
        }
        pos.key ^= zobrist::castling(pos.castle_rooks);

        // Chess960 auto-detection.
        for rook in pos.castle_rooks.iter() {
            if pos.chess960 {
                break;
            }
            let color = pos.color_on(rook).expect("castle rook is on the board");
            let king = pos.king_square(color);
            if !matches!(rook.file(), File::A | File::H) || king.file() != File::E {
                pos.chess960 = true;
            }
        }

        // En passant square.
        let en_passant = parts.next().context("missing en passant square")?;
        pos.en_passant = match en_passant {
            "-" => None,
            square => Some(Square::try_from(square)?),
        };
        pos.key ^= zobrist::en_passant(pos.en_passant);

        // Optional: 50-move counter (in plies, starts at 0).
        if let Some(value) = parts.next() {
            pos.rule50 = value
                .parse()
                .with_context(|| format!("halfmove clock can not be parsed: {value}"))?;
            if pos.rule50 >= 100 {
                bail!("halfmove clock must stay below 100, got {}", pos.rule50);
            }

            // Optional: full move counter (in moves, starts at 1).
            if let Some(value) = parts.next() {
                pos.full_move = value
                    .parse()
                    .with_context(|| format!("fullmove counter can not be parsed: {value}"))?;
                if pos.full_move == 0 {
                    bail!("fullmove counter starts at 1");
                }
            }
        }

        if parts.next().is_some() {
            bail!("trailing symbols in FEN: {input}");
        }

        validate(&pos)?;
        pos.finish();
        debug_assert_eq!(pos.key, pos.compute_key());
        Ok(pos)
    }

    /// The side to move.
    #[must_use]
    pub const fn us(&self) -> Color {
        self.turn
    }

    pub(crate) fn them(&self) -> Color {
        !self.us()
    }

    /// Hash key of the position. Covers piece placement, castling rights, the
    /// en-passant square and the side to move; the 50-move counter is
    /// deliberately excluded so repetitions compare equal.
    #[must_use]
    pub const fn key(&self) -> zobrist::Key {
        self.key
    }

    /// Ply counter of the 50-move rule (0..=100).
    #[must_use]
    pub const fn rule50(&self) -> u8 {
        self.rule50
    }

    /// Full move number, starting at 1 and incremented after Black's move.
    #[must_use]
    pub const fn full_move(&self) -> u16 {
        self.full_move
    }

    /// The move that produced this position, if any.
    #[must_use]
    pub const fn last_move(&self) -> Option<Move> {
        self.last_move
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn is_chess960(&self) -> bool {
        self.chess960
    }

    /// Opponent pieces giving check to the side to move.
    #[must_use]
    pub const fn checkers(&self) -> Bitboard {
        self.checkers
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn in_check(&self) -> bool {
        self.checkers.has_any()
    }

    pub(crate) fn pieces(&self, color: Color, kind: PieceKind) -> Bitboard {
        self.by_color[color as usize] & self.by_piece[kind as usize]
    }

    fn pieces2(&self, color: Color, kind1: PieceKind, kind2: PieceKind) -> Bitboard {
        self.by_color[color as usize]
            & (self.by_piece[kind1 as usize] | self.by_piece[kind2 as usize])
    }

    /// All occupied squares.
    #[must_use]
    pub fn occupied(&self) -> Bitboard {
        debug_assert!((self.by_color[0] & self.by_color[1]).is_empty());
        self.by_color[0] | self.by_color[1]
    }

    pub(crate) fn king_square(&self, color: Color) -> Square {
        self.pieces(color, PieceKind::King).single()
    }

    /// Kind of the piece standing on `square`, if any.
    #[must_use]
    pub fn piece_kind_on(&self, square: Square) -> Option<PieceKind> {
        for (index, pieces) in self.by_piece.iter().enumerate() {
            if pieces.contains(square) {
                return Some(match index {
                    0 => PieceKind::Knight,
                    1 => PieceKind::Bishop,
                    2 => PieceKind::Rook,
                    3 => PieceKind::Queen,
                    4 => PieceKind::King,
                    _ => PieceKind::Pawn,
                });
            }
        }
        None
    }

    fn color_on(&self, square: Square) -> Option<Color> {
        if self.by_color[Color::White as usize].contains(square) {
            Some(Color::White)
        } else if self.by_color[Color::Black as usize].contains(square) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Piece standing on `square`, if any.
    #[must_use]
    pub fn piece_on(&self, square: Square) -> Option<Piece> {
        Some(Piece {
            color: self.color_on(square)?,
            kind: self.piece_kind_on(square)?,
        })
    }

    /// Draw by the rules of chess alone: neither side can possibly deliver
    /// checkmate (at most 3 pieces on the board with no pawn, rook or queen).
    #[must_use]
    pub fn insufficient_material(&self) -> bool {
        self.occupied().count() <= 3
            && (self.by_piece[PieceKind::Pawn as usize]
                | self.by_piece[PieceKind::Rook as usize]
                | self.by_piece[PieceKind::Queen as usize])
                .is_empty()
    }

    /// True when the move captures the mover's own rook, which is how castling
    /// is encoded.
    #[must_use]
    pub fn move_is_castling(&self, m: Move) -> bool {
        self.by_color[self.turn as usize].contains(m.to())
    }

    fn set_square(&mut self, color: Color, kind: PieceKind, square: Square) {
        self.by_color[color as usize].set(square);
        self.by_piece[kind as usize].set(square);
        self.key ^= zobrist::piece(color, kind, square);
    }

    fn clear_square(&mut self, color: Color, kind: PieceKind, square: Square) {
        self.by_color[color as usize].clear(square);
        self.by_piece[kind as usize].clear(square);
        self.key ^= zobrist::piece(color, kind, square);
    }

    /// Recomputes the derived bitboards: `pins`, `attacked` and `checkers`.
    fn finish(&mut self) {
        let (us, them) = (self.us(), self.them());
        let king = self.king_square(us);

        self.pins = Bitboard::empty();
        let pinners = (self.pieces2(them, PieceKind::Rook, PieceKind::Queen)
            & attacks::rook_attacks(king, Bitboard::empty()))
            | (self.pieces2(them, PieceKind::Bishop, PieceKind::Queen)
                & attacks::bishop_attacks(king, Bitboard::empty()));
        for pinner in pinners.iter() {
            let mut skewered = attacks::segment(king, pinner) & self.occupied();
            skewered.clear(king);
            skewered.clear(pinner);
            if !skewered.several() && (skewered & self.by_color[us as usize]).has_any() {
                self.pins |= skewered;
            }
        }

        // Slider attacks are computed with our king removed from the
        // occupancy, so that attacks along a checking ray extend behind the
        // king and king retreats along the ray are not generated.
        let mut attacked = attacks::king_attacks(self.king_square(them));
        for knight in self.pieces(them, PieceKind::Knight).iter() {
            attacked |= attacks::knight_attacks(knight);
        }
        let pawns = self.pieces(them, PieceKind::Pawn);
        attacked |= (pawns - file_mask(File::A)).shift(them.push() - 1);
        attacked |= (pawns - file_mask(File::H)).shift(them.push() + 1);
        let occ = self.occupied() ^ self.pieces(us, PieceKind::King);
        for rook in self.pieces2(them, PieceKind::Rook, PieceKind::Queen).iter() {
            attacked |= attacks::rook_attacks(rook, occ);
        }
        for bishop in self
            .pieces2(them, PieceKind::Bishop, PieceKind::Queen)
            .iter()
        {
            attacked |= attacks::bishop_attacks(bishop, occ);
        }
        self.attacked = attacked;

        self.checkers = if attacked.contains(king) {
            (self.pieces(them, PieceKind::Pawn) & attacks::pawn_attacks(us, king))
                | (self.pieces(them, PieceKind::Knight) & attacks::knight_attacks(king))
                | (self.pieces2(them, PieceKind::Rook, PieceKind::Queen)
                    & attacks::rook_attacks(king, self.occupied()))
                | (self.pieces2(them, PieceKind::Bishop, PieceKind::Queen)
                    & attacks::bishop_attacks(king, self.occupied()))
        } else {
            Bitboard::empty()
        };
        debug_assert!(self.checkers.count() <= 2);
    }

    /// Plays `m` and returns the successor position, leaving `self`
    /// untouched. `m` must be legal in this position.
    #[must_use]
    pub fn play(&self, m: Move) -> Self {
        let mut pos = self.clone();

        pos.rule50 += 1;
        pos.en_passant = None;

        let (us, them) = (pos.turn, !pos.turn);
        let (from, to) = (m.from(), m.to());
        let piece = self
            .piece_kind_on(from)
            .expect("moved piece is on the board");

        if piece == PieceKind::King && self.by_color[us as usize].contains(to) {
            // Capturing our own piece can only be castling, encoded KxR.
            debug_assert_eq!(self.piece_kind_on(to), Some(PieceKind::Rook));
            let rank = from.rank();
            let (king_file, rook_file) = if to > from {
                (File::G, File::F)
            } else {
                (File::C, File::D)
            };
            pos.clear_square(us, PieceKind::Rook, to);
            pos.clear_square(us, PieceKind::King, from);
            pos.set_square(us, PieceKind::King, Square::new(king_file, rank));
            pos.set_square(us, PieceKind::Rook, Square::new(rook_file, rank));
            pos.castle_rooks -= rank_mask(Rank::back_rank(us));
        } else {
            if let Some(captured) = self.piece_kind_on(to) {
                debug_assert!(captured != PieceKind::King);
                pos.rule50 = 0;
                pos.clear_square(them, captured, to);
                // Capturing a rook removes the corresponding castling right.
                pos.castle_rooks -= Bitboard::from(to);
            }

            pos.clear_square(us, piece, from);
            pos.set_square(us, piece, to);
            // A rook leaving its starting square drops that specific right
            // (no-op for squares outside the castle-rook set).
            pos.castle_rooks -= Bitboard::from(from);

            match piece {
                PieceKind::Pawn => {
                    pos.rule50 = 0;
                    let push = us.push();

                    // A double push sets the en-passant square only if the
                    // landing pawn is actually capturable by an enemy pawn;
                    // this keeps hash keys of transpositions identical.
                    if from.rank() == Rank::Two.relative_to(us)
                        && to == from.offset(2 * push)
                        && (attacks::pawn_attacks(us, from.offset(push))
                            & self.pieces(them, PieceKind::Pawn))
                        .has_any()
                    {
                        pos.en_passant = Some(from.offset(push));
                    }

                    if self.en_passant == Some(to) {
                        // En-passant capture: the captured pawn is one square
                        // behind the landing square.
                        pos.clear_square(them, PieceKind::Pawn, to.offset(-push));
                    } else if matches!(to.rank(), Rank::One | Rank::Eight) {
                        let promotion = m.promotion().expect("promotion move carries a piece");
                        pos.clear_square(us, PieceKind::Pawn, to);
                        pos.set_square(us, promotion, to);
                    }
                }
                PieceKind::King => {
                    pos.castle_rooks -= rank_mask(Rank::back_rank(us));
                }
                _ => (),
            }
        }

        pos.turn = them;
        pos.key ^= zobrist::side_to_move();
        pos.key ^= zobrist::en_passant(self.en_passant) ^ zobrist::en_passant(pos.en_passant);
        pos.key ^= zobrist::castling(self.castle_rooks ^ pos.castle_rooks);
        if pos.turn == Color::White {
            pos.full_move += 1;
        }
        pos.last_move = Some(m);

        pos.finish();
        debug_assert_eq!(pos.key, pos.compute_key());
        pos
    }

    /// Calculates the list of legal moves (bounded by
    /// [`crate::chess::core::MAX_MOVES`]).
    #[must_use]
    pub fn legal_moves(&self) -> MoveList {
        debug_assert!(self.is_legal());
        let mut moves = MoveList::new();
        if self.checkers.has_any() {
            self.generate_check_escapes(&mut moves);
        } else {
            let filter = !self.by_color[self.turn as usize];
            self.generate_pawn_moves(&mut moves, filter);
            self.generate_piece_moves(&mut moves, filter, true);
            self.generate_castling_moves(&mut moves);
        }
        moves
    }

    /// Pushes moves of the piece on `from` to every square of `targets`,
    /// honoring a pin: a pinned piece may only move along its pin ray.
    fn serialize_piece_moves(
        &self,
        from: Square,
        king: Square,
        mut targets: Bitboard,
        moves: &mut MoveList,
    ) {
        if self.pins.contains(from) {
            targets &= attacks::ray(king, from);
        }
        for to in targets.iter() {
            moves.push(Move::new(from, to, None));
        }
    }

    /// Pushes one move per pawn in `pawns`, each shifted by `shift` board
    /// steps.
    fn serialize_pawn_moves(&self, pawns: Bitboard, king: Square, shift: i8, moves: &mut MoveList) {
        for from in pawns.iter() {
            if !self.pins.contains(from) || attacks::ray(king, from).contains(from.offset(shift)) {
                moves.push(Move::new(from, from.offset(shift), None));
            }
        }
    }

    fn generate_pawn_moves(&self, moves: &mut MoveList, filter: Bitboard) {
        let (us, them) = (self.us(), self.them());
        let king = self.king_square(us);
        let push = us.push();
        let capturable = self.by_color[them as usize] & filter;
        let empty = !self.occupied();

        let non_promoting =
            self.pieces(us, PieceKind::Pawn) - rank_mask(Rank::Seven.relative_to(us));

        // Left and right captures.
        let left_captures =
            (non_promoting - file_mask(File::A)) & capturable.shift(-(push - 1));
        self.serialize_pawn_moves(left_captures, king, push - 1, moves);
        let right_captures =
            (non_promoting - file_mask(File::H)) & capturable.shift(-(push + 1));
        self.serialize_pawn_moves(right_captures, king, push + 1, moves);

        // Single and double pushes.
        let single_pushes = non_promoting & (empty & filter).shift(-push);
        self.serialize_pawn_moves(single_pushes, king, push, moves);
        let double_pushes = non_promoting
            & rank_mask(Rank::Two.relative_to(us))
            & empty.shift(-push)
            & (empty & filter).shift(-2 * push);
        self.serialize_pawn_moves(double_pushes, king, 2 * push, moves);

        // En passant. The captured pawn and the capturing pawn leave two
        // adjacent squares of the same rank simultaneously, so an ordinary
        // pin check is not enough: rebuild the occupancy after the capture
        // and probe for a discovered slider check.
        if let Some(ep) = self.en_passant {
            let capturers = attacks::pawn_attacks(them, ep) & non_promoting;
            for from in capturers.iter() {
                let mut occ = self.occupied();
                occ.clear(from);
                occ.set(ep);
                occ.clear(ep.offset(them.push()));
                if (attacks::rook_attacks(king, occ)
                    & self.pieces2(them, PieceKind::Rook, PieceKind::Queen))
                .is_empty()
                    && (attacks::bishop_attacks(king, occ)
                        & self.pieces2(them, PieceKind::Bishop, PieceKind::Queen))
                    .is_empty()
                {
                    moves.push(Move::new(from, ep, None));
                }
            }
        }

        // Promotions: captures and single pushes from the 7th rank, queen
        // first.
        let promoting = self.pieces(us, PieceKind::Pawn) & rank_mask(Rank::Seven.relative_to(us));
        for from in promoting.iter() {
            let mut targets = attacks::pawn_attacks(us, from) & capturable;
            if (filter & empty).contains(from.offset(push)) {
                targets.set(from.offset(push));
            }
            for to in targets.iter() {
                if !self.pins.contains(from) || attacks::ray(king, from).contains(to) {
                    for promotion in [
                        PieceKind::Queen,
                        PieceKind::Rook,
                        PieceKind::Bishop,
                        PieceKind::Knight,
                    ] {
                        moves.push(Move::new(from, to, Some(promotion)));
                    }
                }
            }
        }
    }

    fn generate_piece_moves(&self, moves: &mut MoveList, filter: Bitboard, king_moves: bool) {
        let us = self.us();
        let king = self.king_square(us);
        let occ = self.occupied();

        if king_moves {
            self.serialize_piece_moves(
                king,
                king,
                (attacks::king_attacks(king) & filter) - self.attacked,
                moves,
            );
        }

        for from in self.pieces(us, PieceKind::Knight).iter() {
            self.serialize_piece_moves(from, king, attacks::knight_attacks(from) & filter, moves);
        }
        for from in self.pieces2(us, PieceKind::Rook, PieceKind::Queen).iter() {
            self.serialize_piece_moves(from, king, attacks::rook_attacks(from, occ) & filter, moves);
        }
        for from in self
            .pieces2(us, PieceKind::Bishop, PieceKind::Queen)
            .iter()
        {
            self.serialize_piece_moves(
                from,
                king,
                attacks::bishop_attacks(from, occ) & filter,
                moves,
            );
        }
    }

    /// Castling, encoded king-takes-rook. Legal when the squares between king
    /// and rook are empty (except for the two of them), no square the king
    /// walks over (inclusive) is attacked, and the rook is not pinned.
    fn generate_castling_moves(&self, moves: &mut MoveList) {
        debug_assert!(self.checkers.is_empty());
        let us = self.us();
        let king = self.king_square(us);
        let rooks = self.castle_rooks & self.by_color[us as usize];

        for rook in rooks.iter() {
            let rank = rook.rank();
            let (king_to, rook_to) = if rook > king {
                (Square::new(File::G, rank), Square::new(File::F, rank))
            } else {
                (Square::new(File::C, rank), Square::new(File::D, rank))
            };
            let king_walk = attacks::segment(king, king_to);
            let rook_walk = attacks::segment(rook, rook_to);
            if ((king_walk | rook_walk) & self.occupied()).count() == 2
                && (self.attacked & king_walk).is_empty()
                && !self.pins.contains(rook)
            {
                moves.push(Move::new(king, rook, None));
            }
        }
    }

    fn generate_check_escapes(&self, moves: &mut MoveList) {
        debug_assert!(self.checkers.has_any());
        let us = self.us();
        let king = self.king_square(us);
        let ours = self.by_color[us as usize];

        // Moving the king to safety is always worth trying. `attacked` is
        // computed against occupancy with this king removed, so retreats
        // along the checking ray are correctly excluded.
        self.serialize_piece_moves(
            king,
            king,
            (attacks::king_attacks(king) - ours) - self.attacked,
            moves,
        );

        // Double check can only be evaded by a king move.
        if self.checkers.several() {
            return;
        }

        // Single checker: block the checking segment or capture the checker.
        let checker = self.checkers.single();
        let checker_kind = self
            .piece_kind_on(checker)
            .expect("checker is on the board");
        let mut targets = match checker_kind {
            PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen => {
                attacks::segment(king, checker)
            }
            _ => self.checkers,
        };
        self.generate_piece_moves(moves, targets - ours, false);

        // A checking pawn that just double-pushed can also be captured en
        // passant.
        if checker_kind == PieceKind::Pawn {
            if let Some(ep) = self.en_passant {
                targets.set(ep);
            }
        }
        self.generate_pawn_moves(moves, targets);
    }

    /// Converts a move to [Standard Algebraic Notation]. The `+`/`#` suffixes
    /// are appended by the PGN writer, which knows the successor position.
    ///
    /// [Standard Algebraic Notation]: https://www.chessprogramming.org/Algebraic_Chess_Notation
    #[must_use]
    pub fn move_to_san(&self, m: Move) -> String {
        let us = self.us();
        let (from, to) = (m.from(), m.to());
        let piece = self
            .piece_kind_on(from)
            .expect("moved piece is on the board");
        let is_capture = self.by_color[self.them() as usize].contains(to);
        let mut san = String::new();

        match piece {
            PieceKind::Pawn => {
                san.push((b'a' + from.file() as u8) as char);
                if is_capture || self.en_passant == Some(to) {
                    san.push('x');
                    san.push((b'a' + to.file() as u8) as char);
                }
                san.push((b'1' + to.rank() as u8) as char);
                if let Some(promotion) = m.promotion() {
                    san.push('=');
                    san.push(promotion.letter());
                }
            }
            PieceKind::King if self.move_is_castling(m) => {
                san.push_str(if to > from { "O-O" } else { "O-O-O" });
            }
            PieceKind::King => {
                san.push('K');
                if is_capture {
                    san.push('x');
                }
                let _ = write!(san, "{to}");
            }
            _ => {
                san.push(piece.letter());

                // Disambiguation: find the "contesters", same-color pieces of
                // the same kind that could pseudo-legally reach `to` and are
                // not pinned off the ray.
                let mut contesters = self.pieces(us, piece);
                contesters.clear(from);
                if piece == PieceKind::Knight {
                    contesters &= attacks::knight_attacks(to) - self.pins;
                } else {
                    let occ = self.occupied();
                    contesters &= match piece {
                        PieceKind::Bishop => attacks::bishop_attacks(to, occ),
                        PieceKind::Rook => attacks::rook_attacks(to, occ),
                        _ => attacks::bishop_attacks(to, occ) | attacks::rook_attacks(to, occ),
                    };
                    for pinned in (contesters & self.pins).iter() {
                        if !attacks::ray(self.king_square(us), pinned).contains(to) {
                            contesters.clear(pinned);
                        }
                    }
                }

                if contesters.has_any() {
                    if (attacks::rook_attacks(from, Bitboard::empty()) & contesters).has_any() {
                        // A contester shares the rank: disambiguate by file; a
                        // contester shares the file: disambiguate by rank.
                        if (rank_mask(from.rank()) & contesters).has_any() {
                            san.push((b'a' + from.file() as u8) as char);
                        }
                        if (file_mask(from.file()) & contesters).has_any() {
                            san.push((b'1' + from.rank() as u8) as char);
                        }
                    } else {
                        san.push((b'a' + from.file() as u8) as char);
                    }
                }

                if is_capture {
                    san.push('x');
                }
                let _ = write!(san, "{to}");
            }
        }

        san
    }

    /// Serializes a move in the Long Algebraic Notation the UCI protocol
    /// speaks. In standard chess castling serializes as king-to-king±2
    /// ("e1g1"); in Chess960 it stays king-to-rook ("e1h1").
    #[must_use]
    pub fn move_to_lan(&self, m: Move) -> String {
        let from = m.from();
        let mut to = m.to();
        if !self.chess960 && self.move_is_castling(m) {
            to = if to > from {
                from.offset(2)
            } else {
                from.offset(-2)
            };
        }
        let mut lan = format!("{from}{to}");
        if let Some(promotion) = m.promotion() {
            lan.push(promotion.letter().to_ascii_lowercase());
        }
        lan
    }

    /// Parses Long Algebraic Notation into the internal move encoding,
    /// translating standard-chess castling back to king-takes-rook.
    ///
    /// # Errors
    ///
    /// Rejects syntactically malformed input; it does *not* check the move
    /// for legality.
    pub fn lan_to_move(&self, lan: &str) -> anyhow::Result<Move> {
        let from: Square = lan
            .get(0..2)
            .with_context(|| format!("malformed move: {lan}"))?
            .try_into()?;
        let mut to: Square = lan
            .get(2..4)
            .with_context(|| format!("malformed move: {lan}"))?
            .try_into()?;
        let promotion = match lan.get(4..) {
            None | Some("") => None,
            Some("n") => Some(PieceKind::Knight),
            Some("b") => Some(PieceKind::Bishop),
            Some("r") => Some(PieceKind::Rook),
            Some("q") => Some(PieceKind::Queen),
            Some(tail) => bail!("malformed promotion '{tail}' in: {lan}"),
        };

        if !self.chess960 && self.piece_kind_on(from) == Some(PieceKind::King) {
            // e1g1 -> e1h1, e1c1 -> e1a1. A translation landing off the board
            // can only come from an illegal move; keep it as-is and let the
            // legality check reject it.
            let translated = if to as i8 == from as i8 + 2 {
                from as i8 + 3
            } else if to as i8 == from as i8 - 2 {
                from as i8 - 4
            } else {
                to as i8
            };
            if let Ok(square) = Square::try_from(translated as u8) {
                to = square;
            }
        }

        Ok(Move::new(from, to, promotion))
    }

    /// Checks whether the position state is consistent. Only used as a sanity
    /// check in debug builds.
    #[must_use]
    pub(crate) fn is_legal(&self) -> bool {
        validate(self).is_ok()
    }

    /// Computes the hash from scratch. The incrementally maintained key must
    /// always match this; used when creating a position and in tests.
    pub(crate) fn compute_key(&self) -> zobrist::Key {
        let mut key = match self.turn {
            Color::White => 0,
            Color::Black => zobrist::side_to_move(),
        };
        key ^= zobrist::castling(self.castle_rooks);
        key ^= zobrist::en_passant(self.en_passant);
        for square in self.occupied().iter() {
            let piece = self.piece_on(square).expect("occupied square");
            key ^= zobrist::piece(piece.color, piece.kind, square);
        }
        key
    }
}

impl fmt::Display for Position {
    /// Returns the position in Forsyth-Edwards Notation.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rank_index in (0..BOARD_WIDTH).rev() {
            let rank = Rank::try_from(rank_index).unwrap();
            let mut empty_squares = 0;
            for file_index in 0..BOARD_WIDTH {
                let square = Square::new(File::try_from(file_index).unwrap(), rank);
                if let Some(piece) = self.piece_on(square) {
                    if empty_squares != 0 {
                        write!(f, "{empty_squares}")?;
                        empty_squares = 0;
                    }
                    write!(f, "{piece}")?;
                } else {
                    empty_squares += 1;
                }
            }
            if empty_squares != 0 {
                write!(f, "{empty_squares}")?;
            }
            write!(f, "{}", if rank == Rank::One { ' ' } else { '/' })?;
        }

        write!(f, "{} ", self.turn)?;

        if self.castle_rooks.is_empty() {
            write!(f, "-")?;
        } else {
            for color in [Color::White, Color::Black] {
                let rooks = self.castle_rooks & self.by_color[color as usize];
                if rooks.is_empty() {
                    continue;
                }
                if self.chess960 {
                    for rook in rooks.iter() {
                        write!(f, "{}", rook.file().castling_symbol(color))?;
                    }
                } else {
                    let king = self.king_square(color);
                    let right = if king.file() == File::H {
                        Bitboard::empty()
                    } else {
                        rooks & attacks::ray(king, king.offset(1))
                    };
                    let left = if king.file() == File::A {
                        Bitboard::empty()
                    } else {
                        rooks & attacks::ray(king, king.offset(-1))
                    };
                    if right.has_any() {
                        write!(f, "{}", PieceKind::King.letter_for(color))?;
                    }
                    if left.has_any() {
                        write!(f, "{}", PieceKind::Queen.letter_for(color))?;
                    }
                }
            }
        }

        match self.en_passant {
            Some(square) => write!(f, " {square} ")?,
            None => write!(f, " - ")?,
        }
        write!(f, "{} {}", self.rule50, self.full_move)
    }
}

impl fmt::Debug for Position {
    /// Dumps the board in a human readable format ('.' for an empty square,
    /// FEN symbol for a piece), followed by the FEN line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank_index in (0..BOARD_WIDTH).rev() {
            let rank = Rank::try_from(rank_index).unwrap();
            for file_index in 0..BOARD_WIDTH {
                let square = Square::new(File::try_from(file_index).unwrap(), rank);
                match self.piece_on(square) {
                    Some(piece) => write!(f, "{piece}")?,
                    None => f.write_char('.')?,
                }
                if file_index != BOARD_WIDTH - 1 {
                    f.write_char(' ')?;
                }
            }
            writeln!(f)?;
        }
        writeln!(f, "{self}")
    }
}

impl PieceKind {
    fn letter_for(self, color: Color) -> char {
        Piece { color, kind: self }.algebraic_symbol()
    }
}

/// Checks the structural invariants of a parsed position. Reachability from
/// the starting position is not decidable in reasonable time; these
/// heuristics reject the positions that would break the move generator.
fn validate(pos: &Position) -> anyhow::Result<()> {
    for color in [Color::White, Color::Black] {
        if pos.pieces(color, PieceKind::King).count() != 1 {
            bail!(
                "expected one {color} king, got {}",
                pos.pieces(color, PieceKind::King).count()
            );
        }
        if pos.pieces(color, PieceKind::Pawn).count() > 8 {
            bail!("more than 8 {color} pawns");
        }
        // Bounds implied by promotions: each extra piece costs a pawn.
        if pos.pieces2(color, PieceKind::Knight, PieceKind::Pawn).count() > 10
            || pos.pieces2(color, PieceKind::Bishop, PieceKind::Pawn).count() > 10
            || pos.pieces2(color, PieceKind::Rook, PieceKind::Pawn).count() > 10
            || pos.pieces2(color, PieceKind::Queen, PieceKind::Pawn).count() > 9
        {
            bail!("{color} piece counts exceed promotion bounds");
        }
        if pos.by_color[color as usize].count() > 16 {
            bail!("more than 16 {color} pieces");
        }
    }

    if (pos.by_piece[PieceKind::Pawn as usize] & (rank_mask(Rank::One) | rank_mask(Rank::Eight)))
        .has_any()
    {
        bail!("pawns can not be placed on back ranks");
    }

    if pos.rule50 > 100 {
        bail!("halfmove clock above 100");
    }

    if pos.castle_rooks.has_any() {
        let legal_rooks = (rank_mask(Rank::One) & pos.pieces(Color::White, PieceKind::Rook))
            | (rank_mask(Rank::Eight) & pos.pieces(Color::Black, PieceKind::Rook));
        if (pos.castle_rooks - legal_rooks).has_any() {
            bail!("castle rooks must be rooks on their color's back rank");
        }
        for color in [Color::White, Color::Black] {
            let rooks = pos.castle_rooks & pos.by_color[color as usize];
            let king = pos.king_square(color);
            match rooks.count() {
                0 => (),
                1 => {
                    if matches!(king.file(), File::A | File::H) {
                        bail!("no room for a king between the edge and its castle rook");
                    }
                }
                2 => {
                    if !attacks::segment(rooks.lsb(), rooks.msb()).contains(king) {
                        bail!("{color} king is not between its two castle rooks");
                    }
                }
                _ => bail!("more than two {color} castle rooks"),
            }
        }
    }

    if let Some(ep) = pos.en_passant {
        let color = match ep.rank() {
            Rank::Three => Color::White,
            Rank::Six => Color::Black,
            _ => bail!("en passant square on impossible rank {}", ep.rank()),
        };
        if color == pos.turn {
            bail!("en passant square for the side to move");
        }
        if pos.occupied().contains(ep) {
            bail!("en passant square is occupied");
        }
        if !pos
            .pieces(color, PieceKind::Pawn)
            .contains(ep.offset(color.push()))
        {
            bail!("no pushed pawn beyond the en passant square");
        }
        if pos.occupied().contains(ep.offset(-color.push())) {
            bail!("pre-push square of the en passant pawn is occupied");
        }
    }

    Ok(())
}

/// [Perft] (**per**formance **t**esting) walks the tree of legal moves to a
/// fixed depth and counts the leaves; the canonical way to validate a move
/// generator against known-good counts.
///
/// [Perft]: https://www.chessprogramming.org/Perft
#[must_use]
pub fn perft(position: &Position, depth: u8) -> u64 {
    if depth == 0 {
        return 1;
    }
    let moves = position.legal_moves();
    if depth == 1 {
        return moves.len() as u64;
    }
    moves
        .iter()
        .map(|m| perft(&position.play(*m), depth - 1))
        .sum()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn setup(fen: &str) -> Position {
        Position::from_fen(fen, false).expect("parsing a legal position")
    }

    fn moves_of(position: &Position) -> Vec<String> {
        let mut moves: Vec<_> = position
            .legal_moves()
            .iter()
            .map(|m| position.move_to_lan(*m))
            .collect();
        moves.sort();
        moves
    }

    fn sorted(moves: &[&str]) -> Vec<String> {
        let mut moves: Vec<_> = moves.iter().map(|m| (*m).to_string()).collect();
        moves.sort();
        moves
    }

    #[test]
    fn starting_position() {
        let position = Position::starting();
        assert_eq!(position.to_string(), STARTING_FEN);
        assert_eq!(position.us(), Color::White);
        assert!(!position.in_check());
        assert!(!position.is_chess960());
        assert_eq!(position.occupied().count(), 32);
    }

    #[test]
    fn starting_moves() {
        assert_eq!(
            moves_of(&Position::starting()),
            sorted(&[
                "a2a3", "a2a4", "b1a3", "b1c3", "b2b3", "b2b4", "c2c3", "c2c4", "d2d3", "d2d4",
                "e2e3", "e2e4", "f2f3", "f2f4", "g1f3", "g1h3", "g2g3", "g2g4", "h2h3", "h2h4",
            ])
        );
    }

    #[test]
    fn double_check_evasions() {
        assert_eq!(
            moves_of(&setup("3kn3/R2p1N2/8/8/7B/6K1/3R4/8 b - - 0 1")),
            sorted(&["d8c8"])
        );
    }

    #[test]
    fn check_evasions() {
        assert_eq!(
            moves_of(&setup("3kn3/R2p4/8/6B1/8/6K1/3R4/8 b - - 0 1")),
            sorted(&["e8f6", "d8c8"])
        );
        assert_eq!(
            moves_of(&setup("2R5/8/6k1/8/8/8/PPn5/KR6 w - - 0 1")),
            sorted(&["c8c2"])
        );
    }

    #[test]
    fn pins() {
        // The pawn is pinned but can capture en passant towards the pinner.
        assert_eq!(
            moves_of(&setup("6qk/8/8/3Pp3/8/8/K7/8 w - e6 0 1")),
            sorted(&["a2a1", "a2a3", "a2b1", "a2b2", "a2b3", "d5e6"])
        );
        // Without the en passant square the pinned pawn can not move at all.
        assert_eq!(
            moves_of(&setup("6qk/8/8/3Pp3/8/8/K7/8 w - - 0 1")),
            sorted(&["a2a1", "a2a3", "a2b1", "a2b2", "a2b3"])
        );
    }

    #[test]
    fn en_passant_discovered_check() {
        // Capturing en passant would expose the king along the 5th rank.
        let position = setup("8/8/8/KPp4r/8/8/8/4k3 w - c6 0 1");
        assert!(!moves_of(&position).contains(&"b5c6".to_string()));
    }

    #[test]
    fn castling_through_attack() {
        // f1 is covered by the rook: no short castling.
        let position = setup("5rk1/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        let moves = moves_of(&position);
        assert!(moves.contains(&"e1c1".to_string()));
        assert!(!moves.contains(&"e1g1".to_string()));
    }

    #[test]
    fn fen_round_trip() {
        for fen in [
            STARTING_FEN,
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
            "4k3/8/8/8/8/8/8/4K3 w - - 42 99",
        ] {
            assert_eq!(setup(fen).to_string(), fen);
        }
    }

    #[test]
    fn trimmed_fen_defaults() {
        let position = setup("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - -");
        assert_eq!(position.rule50(), 0);
        assert_eq!(position.full_move(), 1);
    }

    #[test]
    fn rejects_malformed() {
        for fen in [
            "",
            "8/8/8/8/8/8/8/8 w - - 0 1",                       // no kings
            "8/2k5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",       // two black kings
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 100 1", // rule50 clamp
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0",   // fullmove 0
            "rnbqkbnr/pppppppp/7/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",   // short rank
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1",   // bad side
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e6 0 1",  // bad ep
            "Pnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",   // pawn on rank 8
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkqx - 0 1",  // bad castling
        ] {
            assert!(Position::from_fen(fen, false).is_err(), "accepted: {fen}");
        }
    }

    #[test]
    fn chess960_detection() {
        // King on f1, rooks on b1 and g1.
        let position = setup("1r3kr1/8/8/8/8/8/8/1R3KR1 w KQkq - 0 1");
        assert!(position.is_chess960());
        assert_eq!(position.to_string(), "1r3kr1/8/8/8/8/8/8/1R3KR1 w BGbg - 0 1");
        assert!(!setup(STARTING_FEN).is_chess960());
    }

    #[test]
    fn incremental_key_matches_recomputation() {
        let mut position = Position::starting();
        for lan in ["e2e4", "c7c5", "g1f3", "d7d6", "f1b5", "c8d7", "e1g1"] {
            let m = position.lan_to_move(lan).unwrap();
            assert!(position.legal_moves().contains(&m), "illegal {lan}");
            position = position.play(m);
            assert_eq!(position.key(), position.compute_key());
        }
    }

    #[test]
    fn en_passant_key_only_when_capturable() {
        // e2e4 with no black pawn nearby must not set the en passant square,
        // so the key must equal the position reached by e2e3, e7e6, e3e4.
        let direct = Position::starting()
            .play(Position::starting().lan_to_move("e2e4").unwrap());
        assert_eq!(direct.to_string().split(' ').nth(3), Some("-"));
    }

    #[test]
    fn castling_moves_both_pieces() {
        let position = setup("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        let castle = position.lan_to_move("e1g1").unwrap();
        assert!(position.move_is_castling(castle));
        let after = position.play(castle);
        assert_eq!(after.piece_kind_on(Square::G1), Some(PieceKind::King));
        assert_eq!(after.piece_kind_on(Square::F1), Some(PieceKind::Rook));
        assert_eq!(after.piece_kind_on(Square::E1), None);
        assert_eq!(after.piece_kind_on(Square::H1), None);
        // White lost both rights, black kept them.
        assert_eq!(after.to_string().split(' ').nth(2), Some("kq"));
    }

    #[test]
    fn promotion_with_capture() {
        let position = setup("rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8");
        let promotion = position.lan_to_move("d7c8q").unwrap();
        assert!(position.legal_moves().contains(&promotion));
        let after = position.play(promotion);
        assert_eq!(after.piece_kind_on(Square::C8), Some(PieceKind::Queen));
        assert_eq!(after.rule50(), 0);
    }

    #[test]
    fn san_disambiguation() {
        // Two knights can reach d2: file disambiguation.
        let position = setup("4k3/8/8/8/8/5N2/8/1N2K3 w - - 0 1");
        let b1d2 = position.lan_to_move("b1d2").unwrap();
        let f3d2 = position.lan_to_move("f3d2").unwrap();
        assert_eq!(position.move_to_san(b1d2), "Nbd2");
        assert_eq!(position.move_to_san(f3d2), "Nfd2");

        // Rooks on the same file: rank disambiguation.
        let position = setup("4k3/8/7r/8/8/7r/8/4K3 b - - 0 1");
        let h6h5 = position.lan_to_move("h6h5").unwrap();
        assert_eq!(position.move_to_san(h6h5), "R6h5");
    }

    #[test]
    fn san_basics() {
        let position = Position::starting();
        let e2e4 = position.lan_to_move("e2e4").unwrap();
        assert_eq!(position.move_to_san(e2e4), "e4");
        let g1f3 = position.lan_to_move("g1f3").unwrap();
        assert_eq!(position.move_to_san(g1f3), "Nf3");

        let position = setup("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        assert_eq!(
            position.move_to_san(position.lan_to_move("e1g1").unwrap()),
            "O-O"
        );
        assert_eq!(
            position.move_to_san(position.lan_to_move("e1c1").unwrap()),
            "O-O-O"
        );
    }

    #[test]
    fn insufficient_material() {
        assert!(setup("4k3/8/8/8/8/8/8/4K3 w - - 0 1").insufficient_material());
        assert!(setup("4k3/8/8/8/8/8/4N3/4K3 w - - 0 1").insufficient_material());
        assert!(!setup("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").insufficient_material());
        assert!(!setup("4k3/8/8/8/8/8/4R3/4K3 w - - 0 1").insufficient_material());
    }

    #[test]
    fn fifty_move_capture_reset() {
        let position = setup("4k3/8/8/3p4/4P3/8/8/4K3 w - - 42 50");
        let capture = position.lan_to_move("e4d5").unwrap();
        assert_eq!(position.play(capture).rule50(), 0);
        let king_move = position.lan_to_move("e1e2").unwrap();
        assert_eq!(position.play(king_move).rule50(), 43);
    }
}
