//! The job queue consumed by workers: every (pair, round, game) of the
//! tournament is enumerated up front, popped atomically, and the per-pair
//! win/loss/draw counters are updated as games finish.

use std::sync::Mutex;

use crate::tournament::game::Outcome;

/// Instruction to play a single game.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Job {
    /// Indices into the engine-options table; `engines.0` plays `engines.1`.
    pub engines: (usize, usize),
    /// Index of the pair in the results table.
    pub pair: usize,
    /// Round number, starting at 0.
    pub round: usize,
    /// Game number within the round, starting at 0.
    pub game: usize,
    /// When set, `engines.1` plays the first move of the opening.
    pub reverse: bool,
}

/// Outcome counters for one pair, from the first engine's point of view.
pub struct PairResult {
    /// The two engine-options indices of this pair.
    pub engines: (usize, usize),
    counts: Mutex<[u64; 3]>,
}

struct QueueState {
    jobs: Vec<Job>,
    next: usize,
}

/// Thread-safe queue of all games of the tournament.
pub struct JobQueue {
    state: Mutex<QueueState>,
    results: Vec<PairResult>,
}

impl JobQueue {
    /// Enumerates every job: round-robin plays all `E*(E-1)/2` pairs `(i, j)`
    /// with `i < j`, gauntlet plays the `E-1` pairs `(0, j)`. Each round and
    /// pair gets `games` jobs with colors alternating (`reverse = game % 2`).
    #[must_use]
    pub fn new(engines: usize, rounds: usize, games: usize, gauntlet: bool) -> Self {
        debug_assert!(engines >= 2 && rounds >= 1 && games >= 1);

        let mut pairs = Vec::new();
        if gauntlet {
            for challenger in 1..engines {
                pairs.push((0, challenger));
            }
        } else {
            for e1 in 0..engines - 1 {
                for e2 in e1 + 1..engines {
                    pairs.push((e1, e2));
                }
            }
        }

        let mut jobs = Vec::with_capacity(rounds * pairs.len() * games);
        for round in 0..rounds {
            let mut game = 0;
            for (pair, &engines) in pairs.iter().enumerate() {
                for g in 0..games {
                    jobs.push(Job {
                        engines,
                        pair,
                        round,
                        game,
                        reverse: g % 2 == 1,
                    });
                    game += 1;
                }
            }
        }

        Self {
            state: Mutex::new(QueueState { jobs, next: 0 }),
            results: pairs
                .into_iter()
                .map(|engines| PairResult {
                    engines,
                    counts: Mutex::new([0; 3]),
                })
                .collect(),
        }
    }

    /// Atomically takes the next job; returns the job, its global index and
    /// the total job count.
    #[must_use]
    pub fn pop(&self) -> Option<(Job, usize, usize)> {
        let mut state = self.state.lock().expect("job queue lock");
        if state.next < state.jobs.len() {
            let index = state.next;
            state.next += 1;
            Some((state.jobs[index], index, state.jobs.len()))
        } else {
            None
        }
    }

    /// Records a game outcome (first-engine point of view) for `pair` and
    /// returns the updated `[loss, draw, win]` triple for progress reporting.
    pub fn add_result(&self, pair: usize, outcome: Outcome) -> [u64; 3] {
        let mut counts = self.results[pair].counts.lock().expect("pair result lock");
        counts[outcome as usize] += 1;
        *counts
    }

    /// True once every job has been handed out.
    #[must_use]
    pub fn done(&self) -> bool {
        let state = self.state.lock().expect("job queue lock");
        state.next == state.jobs.len()
    }

    /// Moves the queue to its end, so no further jobs are handed out. Used by
    /// SPRT early termination.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("job queue lock");
        state.next = state.jobs.len();
    }

    /// The per-pair results table.
    #[must_use]
    pub fn results(&self) -> &[PairResult] {
        &self.results
    }

    /// Global `[loss, draw, win]` totals, summed over all pairs under their
    /// locks.
    #[must_use]
    pub fn totals(&self) -> [u64; 3] {
        let mut totals = [0; 3];
        for pair in &self.results {
            let counts = pair.counts.lock().expect("pair result lock");
            for (total, count) in totals.iter_mut().zip(counts.iter()) {
                *total += count;
            }
        }
        totals
    }
}
