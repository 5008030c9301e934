//! Command-line option parsing. The grammar is free-form `-flag [value...]`
//! with compound `key=value` tokens for engines, openings and SPRT, so this
//! is a hand-written token walk rather than a declarative parser.

use std::path::PathBuf;

use anyhow::{bail, Context};

use crate::tournament::sprt::SprtParams;

/// Configuration of one engine: how to start it and how to limit its search.
/// A zero limit means "not set".
#[derive(Clone, Debug, Default)]
pub struct EngineOptions {
    /// Command line to execute (backslash-escaped spaces).
    pub cmd: String,
    /// Display name; defaults to what the engine reports in `id name`.
    pub name: String,
    /// UCI options to set after the handshake, as (name, value) pairs.
    pub options: Vec<(String, String)>,
    #[allow(missing_docs)]
    pub depth: i32,
    #[allow(missing_docs)]
    pub nodes: u64,
    /// Fixed time per move, in milliseconds (`st=` seconds on the CLI).
    pub movetime: i64,
    /// Base time of the clock, in milliseconds.
    pub time: i64,
    /// Increment per move, in milliseconds.
    pub increment: i64,
    /// Moves per time-control period; 0 for sudden death.
    pub movestogo: i32,
}

/// Adjudication and sampling knobs handed to every game.
#[derive(Clone, Debug, Default)]
pub struct GameOptions {
    /// Plies of |score| <= `draw_score` from *both* sides before a draw is
    /// adjudicated; 0 disables.
    pub draw_count: usize,
    #[allow(missing_docs)]
    pub draw_score: i32,
    /// Consecutive plies of score <= -`resign_score` by one side before the
    /// game is resigned on its behalf; 0 disables.
    pub resign_count: usize,
    #[allow(missing_docs)]
    pub resign_score: i32,
    /// Bernoulli probability of sampling a position for training output.
    pub sample_frequency: f64,
    /// Sample the end of the PV instead of the played position.
    pub sample_resolve_pv: bool,
}

/// Everything parsed from the command line except the engines themselves.
#[derive(Clone, Debug)]
pub struct Options {
    /// Opening book file (FEN/EPD lines); `None` plays every game from the
    /// starting position.
    pub openings: Option<PathBuf>,
    /// Shuffle the opening order with `srand` as the seed.
    pub random: bool,
    #[allow(missing_docs)]
    pub srand: u64,
    /// Give the same opening to both games of a color-swapped pair.
    pub repeat: bool,
    /// Gauntlet pairing (engine 0 against everyone) instead of round-robin.
    pub gauntlet: bool,
    /// Write one transcript log file per worker.
    pub log: bool,
    #[allow(missing_docs)]
    pub concurrency: usize,
    /// Games per encounter (pair and round).
    pub games: usize,
    #[allow(missing_docs)]
    pub rounds: usize,
    /// PGN output file.
    pub pgn: Option<PathBuf>,
    /// 0 = tags only .. 3 = moves with score/depth/time comments.
    pub pgn_verbosity: u8,
    /// Training sample output file.
    pub sample_file: Option<PathBuf>,
    /// Stop the match early once the SPRT reaches a decision.
    pub sprt: Option<SprtParams>,
    #[allow(missing_docs)]
    pub game: GameOptions,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            openings: None,
            random: false,
            srand: 0,
            repeat: false,
            gauntlet: false,
            log: false,
            concurrency: 1,
            games: 1,
            rounds: 1,
            pgn: None,
            pgn_verbosity: 3,
            sample_file: None,
            sprt: None,
            game: GameOptions::default(),
        }
    }
}

/// Parses the full argument list (without the program name).
///
/// # Errors
///
/// Any unknown flag, malformed value or inconsistent combination (fewer than
/// two engines, SPRT with more than two) is fatal.
pub fn parse(args: &[String]) -> anyhow::Result<(Options, Vec<EngineOptions>)> {
    let mut options = Options::default();
    let mut engines: Vec<EngineOptions> = Vec::new();
    let mut each: Option<EngineOptions> = None;

    let mut i = 0;
    let next_value = |i: &mut usize, flag: &str| -> anyhow::Result<String> {
        *i += 1;
        args.get(*i)
            .cloned()
            .with_context(|| format!("missing value for '{flag}'"))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-repeat" => options.repeat = true,
            "-gauntlet" => options.gauntlet = true,
            "-log" => options.log = true,
            "-concurrency" => {
                options.concurrency = next_value(&mut i, "-concurrency")?
                    .parse()
                    .context("bad -concurrency")?;
            }
            "-games" => {
                options.games = next_value(&mut i, "-games")?
                    .parse()
                    .context("bad -games")?;
            }
            "-rounds" => {
                options.rounds = next_value(&mut i, "-rounds")?
                    .parse()
                    .context("bad -rounds")?;
            }
            "-each" => {
                let mut engine = each.take().unwrap_or_default();
                i = parse_engine_tokens(args, i + 1, &mut engine)?;
                each = Some(engine);
            }
            "-engine" => {
                let mut engine = EngineOptions::default();
                i = parse_engine_tokens(args, i + 1, &mut engine)?;
                engines.push(engine);
            }
            "-openings" => i = parse_openings(args, i + 1, &mut options)?,
            "-pgn" => {
                options.pgn = Some(PathBuf::from(next_value(&mut i, "-pgn")?));
                if let Some(value) = args.get(i + 1) {
                    if !value.starts_with('-') {
                        i += 1;
                        options.pgn_verbosity = value.parse().context("bad -pgn verbosity")?;
                        if options.pgn_verbosity > 3 {
                            bail!("-pgn verbosity must be within 0..=3");
                        }
                    }
                }
            }
            "-draw" => {
                let (count, score) = parse_adjudication(args, &mut i, "-draw")?;
                options.game.draw_count = count;
                options.game.draw_score = score;
            }
            "-resign" => {
                let (count, score) = parse_adjudication(args, &mut i, "-resign")?;
                options.game.resign_count = count;
                options.game.resign_score = score;
            }
            "-sprt" => i = parse_sprt(args, i + 1, &mut options)?,
            "-sample" => {
                let value = next_value(&mut i, "-sample")?;
                parse_sample(&value, &mut options)?;
            }
            unknown => bail!("unknown option '{unknown}'"),
        }
        i += 1;
    }

    if let Some(each) = each {
        for engine in &mut engines {
            merge_each(engine, &each);
        }
    }

    if engines.len() < 2 {
        bail!("at least 2 engines are needed");
    }
    if engines.len() > 2 && options.sprt.is_some() {
        bail!("only 2 engines for SPRT");
    }
    for engine in &engines {
        if engine.cmd.is_empty() {
            bail!("missing cmd= for an engine");
        }
    }
    if options.concurrency == 0 || options.games == 0 || options.rounds == 0 {
        bail!("-concurrency, -games and -rounds must be at least 1");
    }

    Ok((options, engines))
}

/// Parses `key=value` tokens after `-engine`/`-each` until the next flag.
/// Returns the index of the last consumed token.
fn parse_engine_tokens(
    args: &[String],
    mut i: usize,
    engine: &mut EngineOptions,
) -> anyhow::Result<usize> {
    while i < args.len() && !args[i].starts_with('-') {
        let token = &args[i];
        if let Some(value) = token.strip_prefix("cmd=") {
            engine.cmd = value.to_string();
        } else if let Some(value) = token.strip_prefix("name=") {
            engine.name = value.to_string();
        } else if let Some(value) = token.strip_prefix("option.") {
            let (name, value) = value
                .split_once('=')
                .with_context(|| format!("option without value: '{token}'"))?;
            engine.options.push((name.to_string(), value.to_string()));
        } else if let Some(value) = token.strip_prefix("depth=") {
            engine.depth = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else if let Some(value) = token.strip_prefix("nodes=") {
            engine.nodes = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else if let Some(value) = token.strip_prefix("st=") {
            let seconds: f64 = value.parse().with_context(|| format!("bad '{token}'"))?;
            engine.movetime = (seconds * 1000.0) as i64;
        } else if let Some(value) = token.strip_prefix("tc=") {
            parse_time_control(value, engine)?;
        } else {
            bail!("illegal syntax '{token}'");
        }
        i += 1;
    }
    Ok(i - 1)
}

/// Time control syntax: `time+inc` or `movestogo/time+inc`, in seconds
/// (fractions allowed); the increment is optional.
fn parse_time_control(value: &str, engine: &mut EngineOptions) -> anyhow::Result<()> {
    let (left, increment) = match value.split_once('+') {
        Some((left, inc)) => (
            left,
            inc.parse::<f64>()
                .with_context(|| format!("bad increment in tc={value}"))?,
        ),
        None => (value, 0.0),
    };
    let time: f64 = match left.split_once('/') {
        Some((movestogo, time)) => {
            engine.movestogo = movestogo
                .parse()
                .with_context(|| format!("bad movestogo in tc={value}"))?;
            time.parse()
                .with_context(|| format!("bad time in tc={value}"))?
        }
        None => left
            .parse()
            .with_context(|| format!("bad time in tc={value}"))?,
    };
    engine.time = (time * 1000.0) as i64;
    engine.increment = (increment * 1000.0) as i64;
    Ok(())
}

fn parse_openings(args: &[String], mut i: usize, options: &mut Options) -> anyhow::Result<usize> {
    while i < args.len() && !args[i].starts_with('-') {
        let token = &args[i];
        if let Some(value) = token.strip_prefix("file=") {
            options.openings = Some(PathBuf::from(value));
        } else if let Some(value) = token.strip_prefix("order=") {
            match value {
                "random" => options.random = true,
                "sequential" => options.random = false,
                _ => bail!("invalid order for -openings: '{value}'"),
            }
        } else if let Some(value) = token.strip_prefix("srand=") {
            options.srand = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else {
            bail!("illegal token in -openings: '{token}'");
        }
        i += 1;
    }
    Ok(i - 1)
}

fn parse_adjudication(
    args: &[String],
    i: &mut usize,
    flag: &str,
) -> anyhow::Result<(usize, i32)> {
    let count = args
        .get(*i + 1)
        .with_context(|| format!("missing count for '{flag}'"))?
        .parse()
        .with_context(|| format!("bad count for '{flag}'"))?;
    let score = args
        .get(*i + 2)
        .with_context(|| format!("missing score for '{flag}'"))?
        .parse()
        .with_context(|| format!("bad score for '{flag}'"))?;
    *i += 2;
    Ok((count, score))
}

fn parse_sprt(args: &[String], mut i: usize, options: &mut Options) -> anyhow::Result<usize> {
    let mut params = SprtParams::default();
    while i < args.len() && !args[i].starts_with('-') {
        let token = &args[i];
        if let Some(value) = token.strip_prefix("elo0=") {
            params.elo0 = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else if let Some(value) = token.strip_prefix("elo1=") {
            params.elo1 = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else if let Some(value) = token.strip_prefix("alpha=") {
            params.alpha = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else if let Some(value) = token.strip_prefix("beta=") {
            params.beta = value.parse().with_context(|| format!("bad '{token}'"))?;
        } else {
            bail!("illegal token in -sprt: '{token}'");
        }
        i += 1;
    }
    params.validate()?;
    options.sprt = Some(params);
    Ok(i - 1)
}

/// `-sample rate[,y|n[,file]]`; the file defaults to `sample.csv`.
fn parse_sample(value: &str, options: &mut Options) -> anyhow::Result<()> {
    let mut fields = value.split(',');
    let rate = fields.next().context("missing sample rate")?;
    options.game.sample_frequency = rate
        .parse()
        .with_context(|| format!("bad sample rate '{rate}'"))?;
    if !(0.0..=1.0).contains(&options.game.sample_frequency) {
        bail!(
            "sample rate {} must be between 0 and 1",
            options.game.sample_frequency
        );
    }
    if let Some(resolve) = fields.next() {
        options.game.sample_resolve_pv = resolve == "y";
    }
    options.sample_file = Some(PathBuf::from(fields.next().unwrap_or("sample.csv")));
    Ok(())
}

/// Applies `-each` defaults to an engine: only the fields the user actually
/// set are copied, and options are appended.
fn merge_each(engine: &mut EngineOptions, each: &EngineOptions) {
    if !each.cmd.is_empty() {
        engine.cmd = each.cmd.clone();
    }
    if !each.name.is_empty() {
        engine.name = each.name.clone();
    }
    engine.options.extend(each.options.iter().cloned());
    if each.time != 0 {
        engine.time = each.time;
    }
    if each.increment != 0 {
        engine.increment = each.increment;
    }
    if each.movetime != 0 {
        engine.movetime = each.movetime;
    }
    if each.nodes != 0 {
        engine.nodes = each.nodes;
    }
    if each.depth != 0 {
        engine.depth = each.depth;
    }
    if each.movestogo != 0 {
        engine.movestogo = each.movestogo;
    }
}
