//! Per-worker state. Each worker thread owns two engine sessions, a seeded
//! RNG for sampling, a deadline the watchdog polls, and (optionally) a
//! transcript log of everything its engines said.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::tournament::deadline::Deadline;
use crate::tournament::Transcript;

/// State owned by one worker thread.
pub struct Worker {
    /// Worker id, starting at 1 (0 is the main thread).
    pub id: usize,
    /// Deterministically seeded per-worker RNG (training-sample draws).
    pub rng: StdRng,
    /// Deadline protecting the engine currently being waited on. Shared with
    /// the watchdog on the main thread.
    pub deadline: Arc<Deadline>,
    /// Transcript of the engine dialogue, when `-log` is given.
    pub log: Option<Transcript>,
}

impl Worker {
    /// Creates worker `id`, opening `gauntlet.<id>.log` when logging is
    /// enabled.
    pub fn new(id: usize, logging: bool) -> anyhow::Result<Self> {
        let log = if logging {
            Some(Transcript::create(&PathBuf::from(format!(
                "gauntlet.{id}.log"
            )))?)
        } else {
            None
        };
        Ok(Self {
            id,
            rng: StdRng::seed_from_u64(id as u64),
            deadline: Arc::new(Deadline::new(log.clone())),
            log,
        })
    }
}
