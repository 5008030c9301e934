use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gauntlet::chess::core::Color;
use gauntlet::tournament::deadline::Deadline;
use gauntlet::tournament::engine::Engine;
use gauntlet::tournament::game::Game;
use gauntlet::tournament::jobs::JobQueue;
use gauntlet::tournament::openings::Openings;
use gauntlet::tournament::options::{self, EngineOptions, Options};
use gauntlet::tournament::seqwriter::SeqWriter;
use gauntlet::tournament::sprt;
use gauntlet::tournament::workers::Worker;

/// Everything a worker thread needs to play its share of the tournament.
struct Run<'a> {
    options: &'a Options,
    engine_options: &'a [EngineOptions],
    openings: &'a Openings,
    queue: &'a JobQueue,
    pgn: Option<&'a SeqWriter>,
    samples: Option<&'a SeqWriter>,
    sprt_decided: &'a AtomicBool,
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (options, engine_options) = options::parse(&args)?;

    // Attack tables are immutable once built; force them before any worker
    // thread can race to be first.
    gauntlet::chess::attacks::init();

    let openings = Openings::open(
        options.openings.as_deref(),
        options.random,
        options.srand,
        options.repeat,
    )?;
    let pgn = options
        .pgn
        .as_deref()
        .map(SeqWriter::create)
        .transpose()?;
    let samples = options
        .sample_file
        .as_deref()
        .map(SeqWriter::create)
        .transpose()?;
    let queue = JobQueue::new(
        engine_options.len(),
        options.rounds,
        options.games,
        options.gauntlet,
    );

    let busy = AtomicUsize::new(options.concurrency);
    let sprt_decided = AtomicBool::new(false);

    let run = Run {
        options: &options,
        engine_options: &engine_options,
        openings: &openings,
        queue: &queue,
        pgn: pgn.as_ref(),
        samples: samples.as_ref(),
        sprt_decided: &sprt_decided,
    };

    let mut workers = Vec::with_capacity(options.concurrency);
    let mut deadlines: Vec<Arc<Deadline>> = Vec::with_capacity(options.concurrency);
    for id in 1..=options.concurrency {
        let worker = Worker::new(id, options.log)?;
        deadlines.push(Arc::clone(&worker.deadline));
        workers.push(worker);
    }

    std::thread::scope(|scope| {
        for mut worker in workers {
            let (run, busy) = (&run, &busy);
            let _ = scope.spawn(move || {
                if let Err(error) = worker_main(&mut worker, run) {
                    // Any worker failure (I/O, dead engine, bad opening) is
                    // fatal to the whole run.
                    eprintln!("[{}] error: {error:#}", worker.id);
                    std::process::exit(1);
                }
                let _ = busy.fetch_sub(1, Ordering::SeqCst);
            });
        }

        // Watchdog: poll every worker's deadline until all workers are done.
        while busy.load(Ordering::SeqCst) > 0 {
            std::thread::sleep(Duration::from_millis(100));
            for deadline in &deadlines {
                if let Some((engine, late)) = deadline.overdue() {
                    eprintln!("engine {engine} is unresponsive ({late}ms past its deadline)");
                    std::process::exit(1);
                }
            }
        }
    });

    let totals = queue.totals();
    println!(
        "Tournament finished: {} games ({} - {} - {})",
        totals.iter().sum::<u64>(),
        totals[2],
        totals[0],
        totals[1]
    );

    if sprt_decided.load(Ordering::SeqCst) {
        // The decision line was already printed by the worker that saw it.
        std::process::exit(1);
    }
    Ok(())
}

/// One worker: keep two engine sessions alive, pull jobs until the queue is
/// drained, play each game and report its outcome.
fn worker_main(worker: &mut Worker, run: &Run) -> anyhow::Result<()> {
    // Sessions are reused across games and respawned only when a job needs a
    // different engine in that seat.
    let mut sessions: [Option<(usize, Engine)>; 2] = [None, None];

    while let Some((job, index, _total)) = run.queue.pop() {
        let wanted = [job.engines.0, job.engines.1];
        for (slot, &config) in wanted.iter().enumerate() {
            if sessions[slot].as_ref().map(|(current, _)| *current) != Some(config) {
                sessions[slot] = None;
                let engine = Engine::spawn(
                    &run.engine_options[config],
                    &worker.deadline,
                    worker.log.clone(),
                )?;
                sessions[slot] = Some((config, engine));
            }
        }

        let fen = run.openings.fen_for(index)?;
        let mut game = Game::new(job.round, job.game, &fen)?;

        let pair_options = [
            run.engine_options[wanted[0]].clone(),
            run.engine_options[wanted[1]].clone(),
        ];
        let [first, second] = &mut sessions;
        let first = &mut first.as_mut().expect("session ensured above").1;
        let second = &mut second.as_mut().expect("session ensured above").1;
        let session_names = [first.name.clone(), second.name.clone()];

        let outcome = game.play(
            worker,
            [first, second],
            &pair_options,
            &run.options.game,
            job.reverse,
        )?;

        if let Some(writer) = run.pgn {
            writer.push(index, game.pgn(run.options.pgn_verbosity))?;
        }
        if let Some(writer) = run.samples {
            writer.push(index, game.samples_csv())?;
        }

        let counts = run.queue.add_result(job.pair, outcome);
        let games = counts.iter().sum::<u64>();
        let (result, reason) = game.result_strings();

        // Both progress lines go out under one stdout lock so concurrent
        // workers can not interleave them.
        {
            let mut out = std::io::stdout().lock();
            writeln!(
                out,
                "[{}] {} vs {}: {result} ({reason})",
                worker.id,
                game.name(Color::White),
                game.name(Color::Black),
            )?;
            writeln!(
                out,
                "Score of {} vs {}: {} - {} - {}  [{:.3}] {}",
                session_names[0],
                session_names[1],
                counts[2],
                counts[0],
                counts[1],
                (counts[2] as f64 + 0.5 * counts[1] as f64) / games as f64,
                games,
            )?;
        }

        if let Some(params) = &run.options.sprt {
            let (lower, upper) = sprt::bounds(params.alpha, params.beta);
            let llr = sprt::llr(&counts, params.elo0, params.elo1);
            if llr < lower || llr > upper {
                println!(
                    "SPRT: LLR = {llr:.3} [{lower:.3},{upper:.3}]. H{} accepted.",
                    i32::from(llr > upper)
                );
                run.queue.stop();
                run.sprt_decided.store(true, Ordering::SeqCst);
            } else if games % 2 == 0 {
                println!("SPRT: LLR = {llr:.3} [{lower:.3},{upper:.3}]");
            }
        }
    }

    Ok(())
}
