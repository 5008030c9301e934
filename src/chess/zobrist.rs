//! [Zobrist hashing] of chess positions: every hashed feature (piece on a
//! square, a rook retaining castling rights, the en-passant square, the side
//! to move) gets a pseudo-random 64-bit key, and a position's hash is the XOR
//! of the keys of its features. Playing a move updates the hash incrementally
//! by XOR-ing the difference.
//!
//! The keys come from a SplitMix64 stream with a fixed seed, so they are
//! stable across builds and the incremental hash can always be checked against
//! a from-scratch recomputation.
//!
//! [Zobrist hashing]: https://www.chessprogramming.org/Zobrist_Hashing

use std::sync::LazyLock;

use crate::chess::bitboard::Bitboard;
use crate::chess::core::{Color, PieceKind, Square};

/// Zobrist key is a 64-bit integer.
pub type Key = u64;

/// Key of a `color` piece of `kind` standing on `square`.
#[must_use]
pub fn piece(color: Color, kind: PieceKind, square: Square) -> Key {
    KEYS.pieces[color as usize][kind as usize][square as usize]
}

/// Combined key of all rooks in `rooks` that retain castling rights. Hashing
/// per-rook makes the incremental update a single XOR of the pre/post rook-set
/// difference.
#[must_use]
pub fn castling(rooks: Bitboard) -> Key {
    rooks
        .iter()
        .fold(0, |key, square| key ^ KEYS.castling[square as usize])
}

/// Key of the en-passant state, including a dedicated key for "none" so that
/// the hash always commits to the field.
#[must_use]
pub fn en_passant(square: Option<Square>) -> Key {
    match square {
        Some(square) => KEYS.en_passant[square as usize],
        None => KEYS.en_passant[64],
    }
}

/// Key flipped in and out as the turn passes.
#[must_use]
pub fn side_to_move() -> Key {
    KEYS.turn
}

struct Keys {
    pieces: [[[Key; 64]; 6]; 2],
    castling: [Key; 64],
    en_passant: [Key; 65],
    turn: Key,
}

static KEYS: LazyLock<Keys> = LazyLock::new(|| {
    let mut state = 0;
    let mut pieces = [[[0; 64]; 6]; 2];
    for color in &mut pieces {
        for kind in color.iter_mut() {
            for square in kind.iter_mut() {
                *square = split_mix(&mut state);
            }
        }
    }
    Keys {
        pieces,
        castling: std::array::from_fn(|_| split_mix(&mut state)),
        en_passant: std::array::from_fn(|_| split_mix(&mut state)),
        turn: split_mix(&mut state),
    }
});

// SplitMix64, based on http://xoroshiro.di.unimi.it/splitmix64.c
fn split_mix(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut key = *state;
    key = (key ^ (key >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    key = (key ^ (key >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    key ^ (key >> 31)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn keys_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for color in [Color::White, Color::Black] {
            for kind in [
                PieceKind::Knight,
                PieceKind::Bishop,
                PieceKind::Rook,
                PieceKind::Queen,
                PieceKind::King,
                PieceKind::Pawn,
            ] {
                for square_index in 0..64 {
                    let square = Square::try_from(square_index).unwrap();
                    assert!(seen.insert(piece(color, kind, square)));
                }
            }
        }
        assert!(seen.insert(side_to_move()));
        assert!(seen.insert(en_passant(None)));
    }

    #[test]
    fn castling_is_per_rook() {
        let a1 = castling(Bitboard::from(Square::A1));
        let h1 = castling(Bitboard::from(Square::H1));
        let both = castling(Bitboard::from(Square::A1) | Bitboard::from(Square::H1));
        assert_eq!(a1 ^ h1, both);
        assert_eq!(castling(Bitboard::empty()), 0);
    }
}
