//! Implementation of the chess environment: board representation, rules and
//! move generation.

pub mod attacks;
pub mod bitboard;
pub mod core;
pub mod position;
pub mod zobrist;
