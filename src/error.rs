//! Errors raised by the search engine.

use thiserror::Error;

use crate::model::Location;

/// Fatal outcomes of a heuristic run or of the search driver.
///
/// A packing attempt that fails during merging is not an error; it only
/// skips the candidate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    /// The cases of a single order line do not fit an empty pallet.
    #[error("order line {order_line} at {location} does not fit an empty pallet")]
    OrderLineDoesNotFit { order_line: usize, location: Location },
    #[error("beta must lie strictly between 0 and 1, got {0}")]
    InvalidBeta(f64),
    #[error("invalid beta range ({low}, {high}): expected 0 < low <= high < 1")]
    InvalidBetaRange { low: f64, high: f64 },
}
