//! Biased-randomised selection over a ranked list.
//!
//! Candidates are drawn without replacement following the quasi-geometric
//! weighting `f(x) = (1 - beta)^x`, so the best-ranked remaining candidates
//! are favoured. A `beta` close to 1 gives an almost greedy order, smaller
//! values spread the choice further down the list.
//!
//! The raw geometric draw is unbounded and is folded back onto the remaining
//! pool with `mod k` rather than clamped. For a large draw this wraps onto an
//! arbitrary rank, even with a greedy `beta`; the search relies on that
//! occasional jump for diversification.

use rand::Rng;
use rand::distributions::Open01;

use crate::error::SolverError;

/// Bias that makes the selection practically greedy.
pub const GREEDY_BETA: f64 = 0.9999;

/// Lazy permutation of a best-to-worst ranked sequence.
///
/// Consumes its input once and yields every element exactly once.
pub struct BiasedSelector<'r, T, R: Rng + ?Sized> {
    pool: Vec<T>,
    log_base: f64,
    rng: &'r mut R,
}

impl<'r, T, R: Rng + ?Sized> BiasedSelector<'r, T, R> {
    /// `beta` must lie strictly between 0 and 1.
    pub fn new(
        ranked: impl IntoIterator<Item = T>,
        beta: f64,
        rng: &'r mut R,
    ) -> Result<Self, SolverError> {
        if !(beta > 0.0 && beta < 1.0) {
            return Err(SolverError::InvalidBeta(beta));
        }
        Ok(Self {
            pool: ranked.into_iter().collect(),
            log_base: (1.0 - beta).ln(),
            rng,
        })
    }
}

impl<T, R: Rng + ?Sized> Iterator for BiasedSelector<'_, T, R> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.pool.is_empty() {
            return None;
        }
        let u: f64 = self.rng.sample(Open01);
        let idx = wrapped_index(u, self.log_base, self.pool.len());
        Some(self.pool.remove(idx))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.pool.len(), Some(self.pool.len()))
    }
}

impl<T, R: Rng + ?Sized> ExactSizeIterator for BiasedSelector<'_, T, R> {}

/// `floor(log(u) / log_base) mod k`.
///
/// Both logarithms are negative, so the quotient is non-negative and
/// truncation equals flooring. The modulo is taken on the float so that
/// draws beyond `usize::MAX` still wrap instead of saturating.
fn wrapped_index(u: f64, log_base: f64, k: usize) -> usize {
    let raw = (u.ln() / log_base).floor();
    raw.rem_euclid(k as f64) as usize
}
