//! Minimal UCI engine that plays a uniformly random legal move. Used to
//! smoke-test the tournament runner against a deterministic, instant
//! opponent.
//!
//! Options:
//! - `Seed` (spin): seeds the move picker, so identically-seeded games are
//!   reproducible.
//! - `Sleep` (spin): milliseconds to stall before answering `go`, to
//!   exercise time forfeits.
//! - `Illegal` (check): reply `bestmove e9e9` to every `go`, to exercise the
//!   rules-infraction path.

use std::io::BufRead;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use gauntlet::chess::position::Position;

struct RandMover {
    position: Position,
    rng: StdRng,
    sleep_msec: u64,
    illegal: bool,
}

impl RandMover {
    fn set_option(&mut self, name: &str, value: &str) {
        match name {
            "Seed" => {
                if let Ok(seed) = value.parse() {
                    self.rng = StdRng::seed_from_u64(seed);
                }
            }
            "Sleep" => {
                if let Ok(msec) = value.parse() {
                    self.sleep_msec = msec;
                }
            }
            "Illegal" => self.illegal = value == "true",
            _ => (),
        }
    }

    fn set_position(&mut self, tokens: &[&str]) {
        let mut position = match tokens.first() {
            Some(&"startpos") => Position::starting(),
            Some(&"fen") => {
                let fen_len = tokens[1..]
                    .iter()
                    .position(|&token| token == "moves")
                    .unwrap_or(tokens.len() - 1);
                match Position::from_fen(&tokens[1..=fen_len].join(" "), false) {
                    Ok(position) => position,
                    Err(_) => return,
                }
            }
            _ => return,
        };
        if let Some(at) = tokens.iter().position(|&token| token == "moves") {
            for lan in &tokens[at + 1..] {
                match position.lan_to_move(lan) {
                    Ok(m) if position.legal_moves().contains(&m) => {
                        position = position.play(m);
                    }
                    _ => return,
                }
            }
        }
        self.position = position;
    }

    fn go(&mut self) {
        if self.sleep_msec > 0 {
            std::thread::sleep(std::time::Duration::from_millis(self.sleep_msec));
        }
        if self.illegal {
            println!("info depth 1 score cp 0");
            println!("bestmove e9e9");
            return;
        }
        let moves = self.position.legal_moves();
        if moves.is_empty() {
            println!("bestmove 0000");
            return;
        }
        let pick = moves[self.rng.gen_range(0..moves.len())];
        let lan = self.position.move_to_lan(pick);
        println!("info depth 1 score cp 0 pv {lan}");
        println!("bestmove {lan}");
    }
}

fn main() {
    let mut engine = RandMover {
        position: Position::starting(),
        rng: StdRng::seed_from_u64(0),
        sleep_msec: 0,
        illegal: false,
    };

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.first() {
            Some(&"uci") => {
                println!("id name randmover");
                println!("option name Seed type spin default 0 min 0 max 1000000");
                println!("option name Sleep type spin default 0 min 0 max 60000");
                println!("option name Illegal type check default false");
                println!("uciok");
            }
            Some(&"isready") => println!("readyok"),
            Some(&"setoption") => {
                // setoption name <id> value <x>
                if let (Some(name_at), Some(value_at)) = (
                    tokens.iter().position(|&token| token == "name"),
                    tokens.iter().position(|&token| token == "value"),
                ) {
                    let name = tokens[name_at + 1..value_at].join(" ");
                    let value = tokens[value_at + 1..].join(" ");
                    engine.set_option(&name, &value);
                }
            }
            Some(&"ucinewgame") => (),
            Some(&"position") => engine.set_position(&tokens[1..]),
            Some(&"go") => engine.go(),
            Some(&"stop") => println!("bestmove 0000"),
            Some(&"quit") => break,
            _ => (),
        }
    }
}
