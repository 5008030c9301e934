//! Per-worker wall-clock deadline. The worker arms the deadline around every
//! blocking engine operation; the watchdog on the main thread polls all
//! deadlines and treats a crossed one as fatal for the run. A deadline only
//! borrows the name of the engine it protects for the duration of one
//! blocking call.

use std::sync::{LazyLock, Mutex};
use std::time::Instant;

use crate::tournament::Transcript;

/// Milliseconds since process start. All deadline arithmetic happens in this
/// monotonic timescale, so `i64::MAX / 2` works as "effectively never".
#[must_use]
pub fn now_msec() -> i64 {
    static EPOCH: LazyLock<Instant> = LazyLock::new(Instant::now);
    EPOCH.elapsed().as_millis() as i64
}

#[derive(Default)]
struct State {
    engine: String,
    limit: i64,
    armed: bool,
}

/// Mutex-protected `{engine name, time limit, armed flag}` triple. One per
/// worker: a worker talks to one engine at a time.
pub struct Deadline {
    state: Mutex<State>,
    log: Option<Transcript>,
}

impl Deadline {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(log: Option<Transcript>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            log,
        }
    }

    /// Arms the deadline: `engine` must respond by `limit` (msec timescale of
    /// [`now_msec`]).
    pub fn arm(&self, engine: &str, limit: i64) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("deadline lock");
        state.armed = true;
        state.engine.clear();
        state.engine.push_str(engine);
        state.limit = limit;
        drop(state);

        if let Some(log) = &self.log {
            log.line(&format!("deadline: {engine} must respond by {limit}"))?;
        }
        Ok(())
    }

    /// Disarms the deadline after the engine responded in time.
    pub fn disarm(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().expect("deadline lock");
        state.armed = false;
        let (engine, limit) = (state.engine.clone(), state.limit);
        drop(state);

        if let Some(log) = &self.log {
            log.line(&format!("deadline: {engine} responded before {limit}"))?;
        }
        Ok(())
    }

    /// Polled by the watchdog: returns the name of the protected engine and
    /// how late it is, when an armed deadline lies in the past.
    #[must_use]
    pub fn overdue(&self) -> Option<(String, i64)> {
        let state = self.state.lock().expect("deadline lock");
        let (armed, limit, engine) = (state.armed, state.limit, state.engine.clone());
        drop(state);

        let now = now_msec();
        if armed && now > limit {
            if let Some(log) = &self.log {
                // The run is about to be aborted; the record is best-effort.
                let _ = log.line(&format!(
                    "deadline: {engine} failed to respond by {limit}, caught {}ms after",
                    now - limit
                ));
            }
            Some((engine, now - limit))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disarmed_deadline_never_fires() {
        let deadline = Deadline::new(None);
        assert!(deadline.overdue().is_none());
        deadline.arm("engine", now_msec() - 1).unwrap();
        deadline.disarm().unwrap();
        assert!(deadline.overdue().is_none());
    }

    #[test]
    fn armed_deadline_in_the_past_fires() {
        let deadline = Deadline::new(None);
        deadline.arm("laggard", now_msec() - 100).unwrap();
        let (engine, late) = deadline.overdue().expect("deadline crossed");
        assert_eq!(engine, "laggard");
        assert!(late >= 100);
    }

    #[test]
    fn armed_deadline_in_the_future_does_not_fire() {
        let deadline = Deadline::new(None);
        deadline.arm("engine", now_msec() + 60_000).unwrap();
        assert!(deadline.overdue().is_none());
    }
}
