//! Multistart search driver.
//!
//! A run first builds a greedy seed solution, then repeatedly calls the merge
//! heuristic with a random bias until the time budget is spent, keeping the
//! cheapest solution found. The deadline is only checked between two
//! heuristic passes, so a run may overshoot its budget by one pass.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::cost::solution_cost;
use crate::error::SolverError;
use crate::heuristic::merge_heuristic;
use crate::model::Problem;
use crate::packing::PackingOracle;
use crate::pallet::Pallet;
use crate::selection::GREEDY_BETA;

/// Interval the per-iteration bias is drawn from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BetaRange {
    low: f64,
    high: f64,
}

impl BetaRange {
    pub const DEFAULT_LOW: f64 = 0.1;
    pub const DEFAULT_HIGH: f64 = 0.3;

    /// Requires `0 < low <= high < 1`.
    pub fn new(low: f64, high: f64) -> Result<Self, SolverError> {
        let valid = low > 0.0 && high < 1.0 && low <= high;
        if !valid {
            return Err(SolverError::InvalidBetaRange { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        rng.gen_range(self.low..=self.high)
    }
}

impl Default for BetaRange {
    fn default() -> Self {
        Self {
            low: Self::DEFAULT_LOW,
            high: Self::DEFAULT_HIGH,
        }
    }
}

/// Result of `Solver::run`.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub best: Vec<Pallet>,
    pub best_cost: f64,
    pub iterations: usize,
}

/// Progress of a run, suitable for live streaming.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SearchEvent {
    /// The greedy seed solution is ready.
    Seeded { cost: f64, pallets: usize },
    /// An iteration found a strictly cheaper solution.
    Improved {
        iteration: usize,
        beta: f64,
        cost: f64,
        pallets: usize,
    },
    /// The time budget is spent.
    Finished {
        iterations: usize,
        best_cost: f64,
        elapsed_ms: u64,
    },
}

/// Search driver bound to one problem instance and one packing oracle.
pub struct Solver<O> {
    problem: Problem,
    oracle: O,
    rng: StdRng,
    history: Vec<f64>,
}

impl<O: PackingOracle> Solver<O> {
    /// Creates a solver whose random stream is seeded from `seed`, or from
    /// system entropy when no seed is given.
    pub fn new(problem: Problem, oracle: O, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            problem,
            oracle,
            rng,
            history: Vec::new(),
        }
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Best cost after every iteration of the last run.
    pub fn history(&self) -> &[f64] {
        &self.history
    }

    /// A single pass of the merge heuristic.
    pub fn heuristic(&mut self, beta: f64) -> Result<Vec<Pallet>, SolverError> {
        merge_heuristic(&self.problem, &self.oracle, beta, &mut self.rng)
    }

    /// The sequential baseline for the same instance.
    pub fn sequential(&self) -> Result<Vec<Pallet>, SolverError> {
        crate::sequential::sequential(&self.problem, &self.oracle)
    }

    pub fn cost(&self, pallets: &[Pallet]) -> f64 {
        solution_cost(pallets, self.problem.distances())
    }

    pub fn run(
        &mut self,
        max_time: Duration,
        beta_range: BetaRange,
    ) -> Result<SearchOutcome, SolverError> {
        self.run_with_progress(max_time, beta_range, |_| {})
    }

    /// Same as `run`, reporting progress through `on_event`.
    pub fn run_with_progress(
        &mut self,
        max_time: Duration,
        beta_range: BetaRange,
        on_event: impl FnMut(&SearchEvent),
    ) -> Result<SearchOutcome, SolverError> {
        self.run_until(max_time, beta_range, on_event, || false)
    }

    /// Same as `run_with_progress`, but stops before the budget is spent
    /// once `cancelled` returns true. Checked between passes, like the
    /// deadline.
    pub fn run_until(
        &mut self,
        max_time: Duration,
        beta_range: BetaRange,
        mut on_event: impl FnMut(&SearchEvent),
        cancelled: impl Fn() -> bool,
    ) -> Result<SearchOutcome, SolverError> {
        self.history.clear();

        let mut best = self.heuristic(GREEDY_BETA)?;
        let mut best_cost = self.cost(&best);
        on_event(&SearchEvent::Seeded {
            cost: best_cost,
            pallets: best.len(),
        });
        debug!(cost = best_cost, pallets = best.len(), "Seed solution built");

        let mut iterations = 0usize;
        let start = Instant::now();
        while start.elapsed() < max_time {
            if cancelled() {
                debug!(iterations, "Search cancelled");
                break;
            }
            iterations += 1;
            let beta = beta_range.sample(&mut self.rng);
            let candidate = self.heuristic(beta)?;
            let cost = self.cost(&candidate);

            if cost < best_cost {
                debug!(iteration = iterations, beta, cost, previous = best_cost, "Improved solution");
                on_event(&SearchEvent::Improved {
                    iteration: iterations,
                    beta,
                    cost,
                    pallets: candidate.len(),
                });
                best = candidate;
                best_cost = cost;
            }
            self.history.push(best_cost);
        }

        let elapsed = start.elapsed();
        info!(
            iterations,
            best_cost,
            pallets = best.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Search finished"
        );
        on_event(&SearchEvent::Finished {
            iterations,
            best_cost,
            elapsed_ms: elapsed.as_millis() as u64,
        });

        Ok(SearchOutcome {
            best,
            best_cost,
            iterations,
        })
    }
}
