//! Thread-safe cursor over a file of opening lines. The file is scanned once
//! for line offsets; workers then address openings by logical index, so the
//! mapping from job to opening is deterministic regardless of concurrency.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::chess::position::STARTING_FEN;

struct Index {
    file: BufReader<File>,
    offsets: Vec<u64>,
}

/// Opening source: a line-oriented file whose first semicolon-separated field
/// is a FEN, or the standard starting position when no file is given.
pub struct Openings {
    index: Option<Mutex<Index>>,
    repeat: bool,
}

impl Openings {
    /// Opens and scans the file, optionally shuffling the line order with a
    /// seeded generator (shuffling the index instead of seeking randomly
    /// guarantees a full N-cycle without repeats).
    pub fn open(
        path: Option<&Path>,
        random: bool,
        srand: u64,
        repeat: bool,
    ) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self {
                index: None,
                repeat,
            });
        };

        let file = File::open(path)
            .with_context(|| format!("can not open openings file {}", path.display()))?;
        let mut file = BufReader::new(file);

        let mut offsets = Vec::new();
        let mut offset = 0u64;
        let mut line = String::new();
        loop {
            line.clear();
            let bytes = file.read_line(&mut line)?;
            if bytes == 0 {
                break;
            }
            if !line.trim().is_empty() {
                offsets.push(offset);
            }
            offset += bytes as u64;
        }
        if offsets.is_empty() {
            bail!("openings file {} has no lines", path.display());
        }

        if random {
            offsets.shuffle(&mut StdRng::seed_from_u64(srand));
        }

        Ok(Self {
            index: Some(Mutex::new(Index { file, offsets })),
            repeat,
        })
    }

    /// The opening for logical index `n`. Indices wrap around the file; with
    /// `repeat`, indices `2k` and `2k+1` return the same line so the two
    /// games of a color-swapped pair start from the same opening.
    pub fn fen_for(&self, n: usize) -> anyhow::Result<String> {
        let Some(index) = &self.index else {
            return Ok(STARTING_FEN.to_string());
        };

        let mut index = index.lock().expect("openings lock");
        let entry = if self.repeat { n / 2 } else { n } % index.offsets.len();
        let offset = index.offsets[entry];

        let _ = index
            .file
            .seek(SeekFrom::Start(offset))
            .context("seek in openings file failed")?;
        let mut line = String::new();
        let _ = index
            .file
            .read_line(&mut line)
            .context("read from openings file failed")?;

        let fen = line
            .split(';')
            .next()
            .expect("split always yields one field")
            .trim();
        if fen.is_empty() {
            bail!("empty opening line at offset {offset}");
        }
        Ok(fen.to_string())
    }
}
