//! Drives one game between two engine sessions: alternates plies, enforces
//! the rules of chess, maintains both clocks, applies draw/resign
//! adjudication, and renders the PGN block and training samples.

use std::fmt::Write;

use anyhow::Context;
use rand::Rng;

use crate::chess::core::{Color, MoveList};
use crate::chess::position::Position;
use crate::tournament::engine::{format_score, Engine, Info};
use crate::tournament::options::{EngineOptions, GameOptions};
use crate::tournament::workers::Worker;

/// How a game ended. Ordered so that every way to lose precedes every way to
/// draw; [`GameState::is_loss`] is the classification the scoring code uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    /// Still being played.
    InProgress,
    /// Lost by being checkmated.
    Checkmate,
    /// Lost on time.
    TimeLoss,
    /// Lost by playing an illegal move.
    IllegalMove,
    /// Resigned on behalf of the engine by adjudication.
    Resign,
    /// Draw by stalemate.
    Stalemate,
    /// Draw by threefold repetition.
    Threefold,
    /// Draw by the 50-move rule.
    FiftyMoves,
    /// Draw because neither side can deliver checkmate.
    InsufficientMaterial,
    /// Draw by adjudication.
    DrawAdjudication,
}

impl GameState {
    /// True for the states where the side to move at detection has lost.
    #[must_use]
    pub fn is_loss(self) -> bool {
        matches!(
            self,
            Self::Checkmate | Self::TimeLoss | Self::IllegalMove | Self::Resign
        )
    }
}

/// Game outcome from some fixed point of view; the discriminants index
/// win/loss/draw counter arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    #[allow(missing_docs)]
    Loss = 0,
    #[allow(missing_docs)]
    Draw = 1,
    #[allow(missing_docs)]
    Win = 2,
}

impl Outcome {
    const fn flip(self) -> Self {
        match self {
            Self::Loss => Self::Win,
            Self::Draw => Self::Draw,
            Self::Win => Self::Loss,
        }
    }
}

/// One sampled position for training output.
struct Sample {
    pos: Position,
    score: i32,
    result: Outcome,
}

/// One game of the tournament: the full position history (ply 0 is the
/// opening FEN), per-ply search info, and the terminal state.
pub struct Game {
    round: usize,
    game: usize,
    names: [String; 2],
    pos: Vec<Position>,
    info: Vec<Info>,
    samples: Vec<Sample>,
    state: GameState,
}

impl Game {
    /// Creates a game starting from `fen` (round/game only label the PGN).
    pub fn new(round: usize, game: usize, fen: &str) -> anyhow::Result<Self> {
        let start = Position::from_fen(fen, false)
            .with_context(|| format!("bad opening line '{fen}'"))?;
        Ok(Self {
            round,
            game,
            names: [String::new(), String::new()],
            pos: vec![start],
            info: Vec::new(),
            samples: Vec::new(),
            state: GameState::InProgress,
        })
    }

    /// Number of plies played.
    #[must_use]
    pub fn ply(&self) -> usize {
        self.pos.len() - 1
    }

    /// Display name of the engine playing `color`.
    #[must_use]
    pub fn name(&self, color: Color) -> &str {
        &self.names[color as usize]
    }

    /// Checks the rules of chess on the current position: generates the legal
    /// moves and derives the game state (mate/stalemate when there are none,
    /// then the rule-based draws).
    fn apply_chess_rules(&self) -> (GameState, MoveList) {
        let pos = self.pos.last().expect("game holds at least the opening");
        let moves = pos.legal_moves();

        if moves.is_empty() {
            let state = if pos.in_check() {
                GameState::Checkmate
            } else {
                GameState::Stalemate
            };
            return (state, moves);
        }
        if pos.rule50() >= 100 {
            debug_assert_eq!(pos.rule50(), 100);
            return (GameState::FiftyMoves, moves);
        }
        if pos.insufficient_material() {
            return (GameState::InsufficientMaterial, moves);
        }

        // Scan for a third occurrence of this position: stride 2 over
        // same-side plies, bounded by the 50-move window (any earlier
        // position differs by pawn structure or material).
        let ply = self.ply();
        let mut repetitions = 1;
        let mut back = 4;
        while back <= pos.rule50() as usize && back <= ply {
            if self.pos[ply - back].key() == pos.key() {
                repetitions += 1;
                if repetitions >= 3 {
                    return (GameState::Threefold, moves);
                }
            }
            back += 2;
        }

        (GameState::InProgress, moves)
    }

    /// Replays the PV from the current position to find the last position in
    /// it that is not in check. An illegal PV move is logged as a warning and
    /// truncates the PV; the game goes on regardless.
    fn resolve_pv(&self, worker: &Worker, pv: &str) -> anyhow::Result<Position> {
        let current = self.pos.last().expect("game holds at least the opening");
        let mut resolved = current.clone();
        let mut walker = current.clone();

        for token in pv.split_whitespace() {
            let legal = walker
                .lan_to_move(token)
                .ok()
                .filter(|m| walker.legal_moves().contains(m));
            let Some(m) = legal else {
                let mover = self.name(current.us());
                println!(
                    "[{}] WARNING: Illegal move in PV '{token}' from {mover}",
                    worker.id
                );
                if let Some(log) = &worker.log {
                    log.line(&format!("WARNING: illegal move in PV '{token}'"))?;
                }
                break;
            };
            walker = walker.play(m);
            if !walker.in_check() {
                resolved = walker.clone();
            }
        }
        Ok(resolved)
    }

    /// Plays the game out. `engines[reverse as usize]` plays the first move
    /// (which side that is depends on the opening FEN). Returns the outcome
    /// from `engines[0]`'s point of view.
    pub fn play(
        &mut self,
        worker: &mut Worker,
        engines: [&mut Engine; 2],
        options: &[EngineOptions; 2],
        game_options: &GameOptions,
        reverse: bool,
    ) -> anyhow::Result<Outcome> {
        let mut engines = engines;

        let first_mover = self.pos[0].us();
        for color in [Color::White, Color::Black] {
            let index = color as usize ^ first_mover as usize ^ reverse as usize;
            self.names[color as usize] = engines[index].name.clone();
        }

        for engine in engines.iter_mut() {
            if self.pos[0].is_chess960() {
                engine.write_line("setoption name UCI_Chess960 value true")?;
            }
            engine.write_line("ucinewgame")?;
            engine.sync(&worker.deadline)?;
        }

        let mut mover = reverse as usize;
        let mut time_left = [options[0].time, options[1].time];
        let mut draw_plies = 0;
        let mut resign_plies = [0, 0];

        loop {
            let (state, legal_moves) = self.apply_chess_rules();
            self.state = state;
            if state != GameState::InProgress {
                break;
            }
            let ply = self.ply();

            let engine = &mut engines[mover];
            engine.send_position(&self.pos)?;
            engine.sync(&worker.deadline)?;

            // Prepare the mover's clock. A fixed movetime overrides the
            // clock; with neither, nodes/depth still bound the search and the
            // deadline is effectively infinite.
            let limits = &options[mover];
            if limits.movetime != 0 {
                time_left[mover] = limits.movetime;
            } else if limits.time != 0 || limits.increment != 0 {
                time_left[mover] += limits.increment;
                if limits.movestogo != 0
                    && ply > 1
                    && (ply as i32 / 2) % limits.movestogo == 0
                {
                    time_left[mover] += limits.time;
                }
            } else {
                time_left[mover] = i64::MAX / 2;
            }

            let turn = self.pos[ply].us();
            engine.send_go(options, mover, ply, turn, &time_left)?;
            let (best, info) = engine.best_move(&worker.deadline, &mut time_left[mover])?;
            let resolved = self.resolve_pv(worker, &info.pv)?;
            self.info.push(info.clone());

            let Some(best) = best else {
                self.state = GameState::TimeLoss;
                break;
            };

            let position = &self.pos[ply];
            let played = position
                .lan_to_move(&best)
                .ok()
                .filter(|m| legal_moves.contains(m));
            let Some(played) = played else {
                self.state = GameState::IllegalMove;
                break;
            };

            if (limits.time != 0 || limits.increment != 0 || limits.movetime != 0)
                && time_left[mover] < 0
            {
                self.state = GameState::TimeLoss;
                break;
            }

            // Draw adjudication: both sides must report a near-zero score for
            // `draw_count` consecutive plies each.
            if game_options.draw_count > 0
                && (info.score as i64).abs() <= game_options.draw_score as i64
            {
                draw_plies += 1;
                if draw_plies >= 2 * game_options.draw_count {
                    self.state = GameState::DrawAdjudication;
                    break;
                }
            } else {
                draw_plies = 0;
            }

            // Resign adjudication: one side hopeless for `resign_count`
            // consecutive plies of its own.
            if game_options.resign_count > 0
                && (info.score as i64) <= -(game_options.resign_score as i64)
            {
                resign_plies[mover] += 1;
                if resign_plies[mover] >= game_options.resign_count {
                    self.state = GameState::Resign;
                    break;
                }
            } else {
                resign_plies[mover] = 0;
            }

            if game_options.sample_frequency > 0.0
                && worker.rng.gen::<f64>() <= game_options.sample_frequency
            {
                let sample_pos = if game_options.sample_resolve_pv {
                    resolved
                } else {
                    self.pos[ply].clone()
                };
                // With PV resolution a sample still in check could not be
                // resolved; discard it.
                if !(game_options.sample_resolve_pv && sample_pos.in_check()) {
                    self.samples.push(Sample {
                        pos: sample_pos,
                        score: info.score,
                        result: Outcome::Draw,
                    });
                }
            }

            let next = self.pos[ply].play(played);
            self.pos.push(next);
            mover = 1 - mover;
        }

        debug_assert!(self.state != GameState::InProgress);

        // Resolve the samples' results now that the outcome is known.
        let loser = self.pos.last().expect("nonempty history").us();
        let white_pov = if self.state.is_loss() {
            if loser == Color::White {
                Outcome::Loss
            } else {
                Outcome::Win
            }
        } else {
            Outcome::Draw
        };
        for sample in &mut self.samples {
            sample.result = if sample.pos.us() == Color::White {
                white_pov
            } else {
                white_pov.flip()
            };
        }

        Ok(if self.state.is_loss() {
            // The engine on the move at detection has lost.
            if mover == 0 {
                Outcome::Loss
            } else {
                Outcome::Win
            }
        } else {
            Outcome::Draw
        })
    }

    /// PGN `Result` tag and free-text `Termination` reason.
    #[must_use]
    pub fn result_strings(&self) -> (&'static str, &'static str) {
        let loser_is_white = self.pos.last().expect("nonempty history").us() == Color::White;
        let decisive = if loser_is_white { "0-1" } else { "1-0" };
        match self.state {
            GameState::InProgress => ("*", "unterminated"),
            GameState::Checkmate => (decisive, "checkmate"),
            GameState::TimeLoss => (decisive, "time forfeit"),
            GameState::IllegalMove => (decisive, "rules infraction"),
            GameState::Resign => (decisive, "adjudication"),
            GameState::Stalemate => ("1/2-1/2", "stalemate"),
            GameState::Threefold => ("1/2-1/2", "3-fold repetition"),
            GameState::FiftyMoves => ("1/2-1/2", "50 moves rule"),
            GameState::InsufficientMaterial => ("1/2-1/2", "insufficient material"),
            GameState::DrawAdjudication => ("1/2-1/2", "adjudication"),
        }
    }

    /// Renders the PGN block for this game. Verbosity 0 emits tags only, 1
    /// adds the move text, 2 adds `{score/depth}` comments, 3 adds the
    /// per-move time.
    #[must_use]
    pub fn pgn(&self, verbosity: u8) -> String {
        let (result, reason) = self.result_strings();

        let mut out = format!("[Round \"{}.{}\"]\n", self.round + 1, self.game + 1);
        let _ = writeln!(out, "[White \"{}\"]", self.name(Color::White));
        let _ = writeln!(out, "[Black \"{}\"]", self.name(Color::Black));
        let _ = writeln!(out, "[Result \"{result}\"]");
        let _ = writeln!(out, "[Termination \"{reason}\"]");
        let _ = writeln!(out, "[FEN \"{}\"]", self.pos[0]);
        if self.pos[0].is_chess960() {
            out.push_str("[Variant \"Chess960\"]\n");
        }
        let _ = writeln!(out, "[PlyCount \"{}\"]", self.ply());

        if verbosity > 0 {
            out.push('\n');
            let plies_per_line = match verbosity {
                2 => 6,
                3 => 5,
                _ => 16,
            };

            for ply in 1..=self.ply() {
                let before = &self.pos[ply - 1];
                if before.us() == Color::White || ply == 1 {
                    let _ = write!(
                        out,
                        "{}{} ",
                        before.full_move(),
                        if before.us() == Color::White { "." } else { "..." }
                    );
                }

                let m = self.pos[ply].last_move().expect("played ply records its move");
                out.push_str(&before.move_to_san(m));
                if self.pos[ply].in_check() {
                    out.push(if ply == self.ply() && self.state == GameState::Checkmate {
                        '#'
                    } else {
                        '+'
                    });
                }

                if verbosity >= 2 {
                    let info = &self.info[ply - 1];
                    let _ = write!(out, " {{{}/{}", format_score(info.score), info.depth);
                    if verbosity >= 3 {
                        let _ = write!(out, " {}ms", info.time_msec);
                    }
                    out.push('}');
                }

                out.push(if ply % plies_per_line == 0 { '\n' } else { ' ' });
            }
        }

        out.push_str(result);
        out.push_str("\n\n");
        out
    }

    /// Renders the training samples: one `fen,score,result` line per sampled
    /// ply, with the result from the sampled side to move's point of view
    /// (0 = loss, 1 = draw, 2 = win).
    #[must_use]
    pub fn samples_csv(&self) -> String {
        let mut out = String::new();
        for sample in &self.samples {
            let _ = writeln!(
                out,
                "{},{},{}",
                sample.pos, sample.score, sample.result as usize
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn game_from(fen: &str, moves: &[&str]) -> Game {
        let mut game = Game::new(0, 0, fen).expect("valid opening");
        for lan in moves {
            let position = game.pos.last().unwrap();
            let m = position.lan_to_move(lan).expect("valid move");
            assert!(position.legal_moves().contains(&m), "illegal {lan}");
            let next = position.play(m);
            game.pos.push(next);
            game.info.push(Info::default());
        }
        game
    }

    #[test]
    fn checkmate_detection() {
        // Fool's mate.
        let game = game_from(
            crate::chess::position::STARTING_FEN,
            &["f2f3", "e7e5", "g2g4", "d8h4"],
        );
        let (state, moves) = game.apply_chess_rules();
        assert_eq!(state, GameState::Checkmate);
        assert!(moves.is_empty());
    }

    #[test]
    fn stalemate_detection() {
        let game = game_from("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", &[]);
        let (state, _) = game.apply_chess_rules();
        assert_eq!(state, GameState::Stalemate);
    }

    #[test]
    fn fifty_move_detection() {
        let game = game_from("4k3/8/8/8/8/8/8/4K3 w - - 99 80", &["e1e2"]);
        let (state, _) = game.apply_chess_rules();
        assert_eq!(state, GameState::FiftyMoves);
    }

    #[test]
    fn insufficient_material_detection() {
        let game = game_from("4k3/8/8/8/8/8/4N3/4K3 w - - 0 1", &[]);
        let (state, _) = game.apply_chess_rules();
        assert_eq!(state, GameState::InsufficientMaterial);
    }

    #[test]
    fn threefold_detection() {
        // Shuffle the knights back and forth twice: the starting position
        // occurs for the third time.
        let game = game_from(
            crate::chess::position::STARTING_FEN,
            &[
                "g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1", "f6g8",
            ],
        );
        let (state, _) = game.apply_chess_rules();
        assert_eq!(state, GameState::Threefold);
    }

    #[test]
    fn repetition_window_is_bounded_by_rule50() {
        // Same shuffle, but a pawn push in the middle resets the window.
        let game = game_from(
            crate::chess::position::STARTING_FEN,
            &[
                "g1f3", "g8f6", "f3g1", "f6g8", "e2e4", "g8f6", "g1f3", "f6g8", "f3g1",
            ],
        );
        let (state, _) = game.apply_chess_rules();
        assert_eq!(state, GameState::InProgress);
    }

    #[test]
    fn pgn_block_shape() {
        let mut game = game_from(
            crate::chess::position::STARTING_FEN,
            &["f2f3", "e7e5", "g2g4", "d8h4"],
        );
        game.state = GameState::Checkmate;
        game.names = ["alpha".to_string(), "beta".to_string()];

        let pgn = game.pgn(1);
        assert!(pgn.starts_with("[Round \"1.1\"]\n"));
        assert!(pgn.contains("[White \"alpha\"]\n"));
        assert!(pgn.contains("[Black \"beta\"]\n"));
        assert!(pgn.contains("[Result \"0-1\"]\n"));
        assert!(pgn.contains("[Termination \"checkmate\"]\n"));
        assert!(pgn.contains("[PlyCount \"4\"]\n"));
        assert!(pgn.contains("1. f3 e5 2. g4 Qh4#"));
        assert!(pgn.ends_with("0-1\n\n"));

        // Tags only at verbosity 0.
        assert!(!game.pgn(0).contains("1. f3"));
        // Comments at verbosity 2.
        assert!(game.pgn(2).contains("{0/0}"));
        assert!(game.pgn(3).contains("{0/0 0ms}"));
    }

    #[test]
    fn loss_states_blame_the_side_to_move() {
        let mut game = game_from(crate::chess::position::STARTING_FEN, &["e2e4"]);
        game.state = GameState::TimeLoss;
        // Black is to move and loses.
        assert_eq!(game.result_strings(), ("1-0", "time forfeit"));
        game.state = GameState::IllegalMove;
        assert_eq!(game.result_strings(), ("1-0", "rules infraction"));
        game.state = GameState::DrawAdjudication;
        assert_eq!(game.result_strings(), ("1/2-1/2", "adjudication"));
    }

    #[test]
    fn outcome_flip() {
        assert_eq!(Outcome::Win.flip(), Outcome::Loss);
        assert_eq!(Outcome::Draw.flip(), Outcome::Draw);
    }
}
