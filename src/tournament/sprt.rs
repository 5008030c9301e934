//! Sequential Probability Ratio Test over the running win/draw/loss counts.
//! Pure functions: the tournament machinery feeds counts in and compares the
//! resulting log-likelihood ratio against the bounds.

use anyhow::bail;

/// Hypotheses and error rates of the test: H0 "the candidate is elo0 or
/// weaker" against H1 "the candidate is elo1 or stronger".
#[derive(Clone, Copy, Debug)]
pub struct SprtParams {
    #[allow(missing_docs)]
    pub elo0: f64,
    #[allow(missing_docs)]
    pub elo1: f64,
    /// Type I error rate (accepting H1 when H0 is true).
    pub alpha: f64,
    /// Type II error rate (accepting H0 when H1 is true).
    pub beta: f64,
}

impl Default for SprtParams {
    fn default() -> Self {
        Self {
            elo0: 0.0,
            elo1: 4.0,
            alpha: 0.05,
            beta: 0.05,
        }
    }
}

impl SprtParams {
    /// Rejects degenerate parameter combinations up front, before any game is
    /// played.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..1.0).contains(&self.alpha) || self.alpha == 0.0 {
            bail!("alpha must be in (0, 1), got {}", self.alpha);
        }
        if !(0.0..1.0).contains(&self.beta) || self.beta == 0.0 {
            bail!("beta must be in (0, 1), got {}", self.beta);
        }
        if self.alpha + self.beta >= 1.0 {
            bail!("alpha + beta must stay below 1");
        }
        if self.elo0 >= self.elo1 {
            bail!("elo0 must be below elo1, got [{}, {}]", self.elo0, self.elo1);
        }
        Ok(())
    }
}

/// Acceptance bounds `(lower, upper)` for the log-likelihood ratio: crossing
/// the lower bound accepts H0, crossing the upper accepts H1.
#[must_use]
pub fn bounds(alpha: f64, beta: f64) -> (f64, f64) {
    (
        (beta / (1.0 - alpha)).ln(),
        ((1.0 - beta) / alpha).ln(),
    )
}

fn elo_to_score(elo: f64) -> f64 {
    1.0 / (1.0 + (-elo * 10f64.ln() / 400.0).exp())
}

/// Log-likelihood ratio of the observed `[loss, draw, win]` counts, using the
/// [GSPRT approximation] by Michel Van Den Bergh.
///
/// [GSPRT approximation]: http://hardy.uhasselt.be/Toga/GSPRT_approximation.pdf
#[must_use]
pub fn llr(wld: &[u64; 3], elo0: f64, elo1: f64) -> f64 {
    // The variance is zero until at least two of the three outcomes have been
    // seen; no decision can be made yet.
    if wld.iter().filter(|&&count| count != 0).count() < 2 {
        return 0.0;
    }

    let n = (wld[0] + wld[1] + wld[2]) as f64;
    let wins = wld[2] as f64 / n;
    let losses = wld[0] as f64 / n;
    let draws = 1.0 - wins - losses;

    let score = wins + draws / 2.0;
    let variance = (wins + draws / 4.0) - score * score;
    let (score0, score1) = (elo_to_score(elo0), elo_to_score(elo1));

    (score1 - score0) * (2.0 * score - score0 - score1) / (2.0 * variance / n)
}
