//! One engine session: a child process speaking a line protocol, the
//! handshake that names and configures it, and the `position`/`go`/`bestmove`
//! cycle of a game, all under deadline protection.

use anyhow::{bail, Context};

use crate::chess::core::Color;
use crate::chess::position::Position;
use crate::tournament::deadline::{now_msec, Deadline};
use crate::tournament::options::EngineOptions;
use crate::tournament::process::EngineProcess;
use crate::tournament::Transcript;

/// Headroom for the `uci` handshake and `isready` synchronization.
const SYNC_HEADROOM_MSEC: i64 = 1000;
/// Grace added to the engine's clock before the deadline fires: the engine
/// gets a window to answer the `stop` after its time ran out.
const GO_HEADROOM_MSEC: i64 = 1000;

/// Elements remembered from the engine's `info` lines, for adjudication, PGN
/// comments and training samples.
#[derive(Clone, Debug, Default)]
pub struct Info {
    /// Score in centipawns from the mover's point of view. Mate-in-N maps to
    /// the outer bands of the `i32` range; see [`mate_in`].
    pub score: i32,
    #[allow(missing_docs)]
    pub depth: i32,
    /// Wall-clock time the engine spent on the move, in milliseconds.
    pub time_msec: i64,
    /// Last principal variation received, as space-separated LAN moves.
    pub pv: String,
}

/// Maps `score mate N` to a sentinel near the edge of the `i32` range, with
/// the sign of `N`. The mate distance survives, so PGN comments can render
/// "M3" instead of a meaningless number.
#[must_use]
pub fn mate_in(moves: i32) -> i32 {
    if moves >= 0 {
        i32::MAX - moves
    } else {
        i32::MIN - moves
    }
}

/// Renders a score the way PGN comments expect it: mate sentinels as `M3` /
/// `-M3`, everything else as the plain centipawn number.
#[must_use]
pub fn format_score(score: i32) -> String {
    if score > i32::MAX / 2 {
        format!("M{}", i32::MAX - score)
    } else if score < i32::MIN / 2 {
        format!("-M{}", score as i64 - i32::MIN as i64)
    } else {
        score.to_string()
    }
}

/// What the protocol extracted from one engine line.
pub enum Reply {
    /// `bestmove X` — the move in the protocol's move notation.
    BestMove(String),
    /// Anything else: `info` lines update the [`Info`] in place.
    Other,
}

/// The capability set an engine protocol must provide: building the position
/// and go commands, and recognizing the best-move reply. UCI is the primary
/// (and currently only) implementation.
pub trait Protocol: Send {
    /// Command transferring the game so far to the engine.
    fn position_command(&self, history: &[Position]) -> String;

    /// Command starting the search, with every configured limit attached.
    fn go_command(
        &self,
        options: &[EngineOptions; 2],
        mover: usize,
        ply: usize,
        turn: Color,
        time_left: &[i64; 2],
    ) -> String;

    /// Parses one engine line, folding `info` content into `info`.
    fn parse_line(&self, line: &str, info: &mut Info) -> anyhow::Result<Reply>;
}

/// The [Universal Chess Interface] protocol.
///
/// [Universal Chess Interface]: https://www.chessprogramming.org/UCI
pub struct Uci;

impl Protocol for Uci {
    /// Builds `position fen ... [moves ...]` with rule-50 truncation: the
    /// command starts from the last position where the 50-move counter reset
    /// and lists only the tail moves. Identical information, shorter command.
    fn position_command(&self, history: &[Position]) -> String {
        let ply = history.len() - 1;
        let start = ply - (history[ply].rule50() as usize).min(ply);

        let mut cmd = format!("position fen {}", history[start]);
        if start < ply {
            cmd.push_str(" moves");
            for i in start + 1..=ply {
                cmd.push(' ');
                let m = history[i].last_move().expect("played positions record their move");
                cmd.push_str(&history[i - 1].move_to_lan(m));
            }
        }
        cmd
    }

    fn go_command(
        &self,
        options: &[EngineOptions; 2],
        mover: usize,
        ply: usize,
        turn: Color,
        time_left: &[i64; 2],
    ) -> String {
        use std::fmt::Write;

        let limits = &options[mover];
        let mut cmd = String::from("go");
        if limits.nodes != 0 {
            let _ = write!(cmd, " nodes {}", limits.nodes);
        }
        if limits.depth != 0 {
            let _ = write!(cmd, " depth {}", limits.depth);
        }
        if limits.movetime != 0 {
            let _ = write!(cmd, " movetime {}", limits.movetime);
        }
        if limits.time != 0 || limits.increment != 0 {
            let white = mover ^ turn as usize;
            let black = white ^ 1;
            let _ = write!(
                cmd,
                " wtime {} winc {} btime {} binc {}",
                time_left[white], options[white].increment, time_left[black], options[black].increment
            );
        }
        if limits.movestogo != 0 {
            let _ = write!(
                cmd,
                " movestogo {}",
                limits.movestogo - ((ply as i32 / 2) % limits.movestogo)
            );
        }
        cmd
    }

    fn parse_line(&self, line: &str, info: &mut Info) -> anyhow::Result<Reply> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("info") => {
                while let Some(token) = tokens.next() {
                    match token {
                        "depth" => {
                            if let Some(value) = tokens.next() {
                                info.depth = value
                                    .parse()
                                    .with_context(|| format!("bad depth in '{line}'"))?;
                            }
                        }
                        "score" => match (tokens.next(), tokens.next()) {
                            (Some("cp"), Some(value)) => {
                                info.score = value
                                    .parse()
                                    .with_context(|| format!("bad score in '{line}'"))?;
                            }
                            (Some("mate"), Some(value)) => {
                                let moves: i32 = value
                                    .parse()
                                    .with_context(|| format!("bad mate score in '{line}'"))?;
                                info.score = mate_in(moves);
                            }
                            _ => bail!("illegal syntax after 'score' in '{line}'"),
                        },
                        "pv" => {
                            info.pv = tokens.by_ref().collect::<Vec<_>>().join(" ");
                            break;
                        }
                        _ => (),
                    }
                }
                Ok(Reply::Other)
            }
            Some("bestmove") => match tokens.next() {
                Some(best) => Ok(Reply::BestMove(best.to_string())),
                None => bail!("bestmove without a move: '{line}'"),
            },
            _ => Ok(Reply::Other),
        }
    }
}

/// One live engine session, bound to a worker's deadline and transcript.
pub struct Engine {
    process: EngineProcess,
    /// Display name: user-provided, or taken from the engine's `id name`
    /// reply, or the command itself.
    pub name: String,
    protocol: Box<dyn Protocol>,
    log: Option<Transcript>,
}

impl Engine {
    /// Spawns the engine and runs the `uci`..`uciok` handshake under a
    /// 1-second deadline, applying every configured `setoption`.
    pub fn spawn(
        options: &EngineOptions,
        deadline: &Deadline,
        log: Option<Transcript>,
    ) -> anyhow::Result<Self> {
        let process = EngineProcess::spawn(&options.cmd)?;
        let mut engine = Self {
            process,
            name: if options.name.is_empty() {
                options.cmd.clone()
            } else {
                options.name.clone()
            },
            protocol: Box::new(Uci),
            log,
        };

        deadline.arm(&engine.name, now_msec() + SYNC_HEADROOM_MSEC)?;
        engine.write_line("uci")?;
        loop {
            let line = engine.read_line()?;
            if line == "uciok" {
                break;
            }
            // Let the engine name itself, unless the user already did.
            if options.name.is_empty() {
                if let Some(name) = line.strip_prefix("id name ") {
                    engine.name = name.trim().to_string();
                }
            }
        }
        for (name, value) in &options.options {
            engine.write_line(&format!("setoption name {name} value {value}"))?;
        }
        deadline.disarm()?;

        Ok(engine)
    }

    /// Sends one line to the engine, recording it in the transcript.
    pub fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.process.write_line(line)?;
        if let Some(log) = &self.log {
            log.line(&format!("{} <- {line}", self.name))?;
        }
        Ok(())
    }

    fn read_line(&mut self) -> anyhow::Result<String> {
        let line = self
            .process
            .read_line()
            .with_context(|| format!("could not read from {}", self.name))?
            .to_string();
        if let Some(log) = &self.log {
            log.line(&format!("{} -> {line}", self.name))?;
        }
        Ok(line)
    }

    /// `isready`/`readyok` synchronization under a 1-second deadline.
    pub fn sync(&mut self, deadline: &Deadline) -> anyhow::Result<()> {
        deadline.arm(&self.name, now_msec() + SYNC_HEADROOM_MSEC)?;
        self.write_line("isready")?;
        loop {
            if self.read_line()? == "readyok" {
                break;
            }
        }
        deadline.disarm()
    }

    /// Transfers the game history with the protocol's position command.
    pub fn send_position(&mut self, history: &[Position]) -> anyhow::Result<()> {
        let cmd = self.protocol.position_command(history);
        self.write_line(&cmd)
    }

    /// Starts the search with every applicable limit.
    pub fn send_go(
        &mut self,
        options: &[EngineOptions; 2],
        mover: usize,
        ply: usize,
        turn: Color,
        time_left: &[i64; 2],
    ) -> anyhow::Result<()> {
        let cmd = self
            .protocol
            .go_command(options, mover, ply, turn, time_left);
        self.write_line(&cmd)
    }

    /// Reads engine output until `bestmove` arrives or `time_left` runs out,
    /// decrementing `time_left` by the elapsed wall clock. On expiry the
    /// engine is sent `stop` and must still produce a `bestmove` line (under
    /// the same deadline), but the result is `None`: the move no longer
    /// counts.
    pub fn best_move(
        &mut self,
        deadline: &Deadline,
        time_left: &mut i64,
    ) -> anyhow::Result<(Option<String>, Info)> {
        let start = now_msec();
        let limit = start + *time_left;
        deadline.arm(&self.name, limit + GO_HEADROOM_MSEC)?;

        let mut info = Info::default();
        let mut best = None;
        while *time_left >= 0 && best.is_none() {
            let line = self.read_line()?;
            *time_left = limit - now_msec();
            match self.protocol.parse_line(&line, &mut info)? {
                Reply::BestMove(m) => best = Some(m),
                Reply::Other => (),
            }
        }
        info.time_msec = now_msec() - start;

        if best.is_none() {
            self.write_line("stop")?;
            while !self.read_line()?.starts_with("bestmove ") {}
        }

        deadline.disarm()?;
        Ok((best, info))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Polite goodbye; the process teardown is the backstop.
        let _ = self.process.write_line("quit");
    }
}
