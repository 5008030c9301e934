//! Tournament runtime: engine processes and sessions, per-game driver, the
//! job queue consumed by worker threads, and ordered output writers.

pub mod deadline;
pub mod engine;
pub mod game;
pub mod jobs;
pub mod openings;
pub mod options;
pub mod process;
pub mod seqwriter;
pub mod sprt;
pub mod workers;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;

/// Shared handle to a worker's transcript log file. Records every line sent to
/// and received from each engine (prefixed with direction and engine name)
/// plus deadline transitions. Cloned between the worker's two engine sessions
/// and its deadline.
#[derive(Clone)]
pub struct Transcript {
    file: Arc<Mutex<BufWriter<File>>>,
}

impl Transcript {
    /// Creates (truncating) the transcript file at `path`.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("can not create log file {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(BufWriter::new(file))),
        })
    }

    /// Appends one line and flushes, so the transcript stays useful when the
    /// run is aborted.
    pub fn line(&self, text: &str) -> anyhow::Result<()> {
        let mut file = self.file.lock().expect("transcript lock");
        writeln!(file, "{text}").context("transcript write failed")?;
        file.flush().context("transcript flush failed")
    }
}
