//! Runs matches between UCI chess engines to measure which one is stronger.
//!
//! The crate splits into two halves: [`chess`] is a complete legal-move
//! generator and position state machine built on bitboards, and [`tournament`]
//! is the runtime that spawns engine processes, drives games under time
//! control, adjudicates outcomes and writes PGN/training output in a
//! deterministic order.

#![warn(missing_docs, variant_size_differences)]
// Rustc lints.
#![warn(
    absolute_paths_not_starting_with_crate,
    keyword_idents,
    macro_use_extern_crate,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_lifetimes,
    unused_qualifications
)]
// Clippy lints.
#![warn(
    clippy::correctness,
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf
)]

pub mod chess;
pub mod tournament;
