//! Writer that restores job order: games finish in whatever order the
//! workers produce them, but the output file must read as if they were played
//! sequentially. Completed blocks are buffered until the next expected index
//! arrives, then flushed in one contiguous run.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;

struct State {
    queued: Vec<(usize, String)>,
    next: usize,
    out: BufWriter<File>,
}

/// Mutex-protected reorder buffer in front of an output file.
pub struct SeqWriter {
    state: Mutex<State>,
}

impl SeqWriter {
    /// Creates (truncating) the output file.
    pub fn create(path: &Path) -> anyhow::Result<Self> {
        let out = File::create(path)
            .with_context(|| format!("can not create output file {}", path.display()))?;
        Ok(Self {
            state: Mutex::new(State {
                queued: Vec::new(),
                next: 0,
                out: BufWriter::new(out),
            }),
        })
    }

    /// Queues `text` as the output block of job `index`, then flushes the
    /// longest contiguous run starting at the next expected index. Every job
    /// index must be pushed exactly once (with an empty string if the job
    /// produced nothing), or the writer stalls forever.
    pub fn push(&self, index: usize, text: String) -> anyhow::Result<()> {
        let mut guard = self.state.lock().expect("writer lock");
        let state = &mut *guard;
        debug_assert!(index >= state.next);

        let at = state
            .queued
            .binary_search_by_key(&index, |(queued, _)| *queued)
            .expect_err("job indices are unique");
        state.queued.insert(at, (index, text));

        let mut flushed = 0;
        while flushed < state.queued.len() && state.queued[flushed].0 == state.next + flushed {
            flushed += 1;
        }
        if flushed > 0 {
            for (_, text) in state.queued.drain(..flushed) {
                state.out.write_all(text.as_bytes()).context("output write failed")?;
            }
            state.next += flushed;
            state.out.flush().context("output flush failed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scratch(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("gauntlet-seqwriter-{}-{name}", std::process::id()));
        path
    }

    #[test]
    fn in_order_pushes_flush_immediately() {
        let path = scratch("in-order");
        let writer = SeqWriter::create(&path).unwrap();
        for (index, text) in ["a", "b", "c"].iter().enumerate() {
            writer.push(index, (*text).to_string()).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abc");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn out_of_order_pushes_restore_order() {
        let path = scratch("reorder");
        let writer = SeqWriter::create(&path).unwrap();
        writer.push(2, "2".to_string()).unwrap();
        writer.push(0, "0".to_string()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "0");
        writer.push(1, "1".to_string()).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "012");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn every_permutation_of_five() {
        // Brute force: any push order must produce the same file.
        let indices = [0usize, 1, 2, 3, 4];
        let mut orders = Vec::new();
        permutations(&mut indices.to_vec(), 0, &mut orders);
        for (run, order) in orders.iter().enumerate() {
            let path = scratch(&format!("perm-{run}"));
            let writer = SeqWriter::create(&path).unwrap();
            for &index in order {
                writer.push(index, index.to_string()).unwrap();
            }
            assert_eq!(std::fs::read_to_string(&path).unwrap(), "01234");
            let _ = std::fs::remove_file(path);
        }
    }

    fn permutations(values: &mut Vec<usize>, at: usize, out: &mut Vec<Vec<usize>>) {
        if at == values.len() {
            out.push(values.clone());
            return;
        }
        for i in at..values.len() {
            values.swap(at, i);
            permutations(values, at + 1, out);
            values.swap(at, i);
        }
    }
}
