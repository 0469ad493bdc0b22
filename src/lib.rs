//! Combined picker routing and 3D pallet loading.
//!
//! Order lines are merged onto shared pallets along routing edges with large
//! savings, as long as a packing oracle finds a feasible 3D arrangement. A
//! multistart driver repeats the biased-randomised merge heuristic within a
//! time budget and keeps the solution with the shortest picking tours.

pub mod api;
pub mod config;
pub mod cost;
pub mod error;
pub mod geometry;
pub mod heuristic;
pub mod model;
pub mod packing;
pub mod pallet;
pub mod selection;
pub mod sequential;
pub mod solver;
pub mod types;

#[cfg(test)]
mod testing;
